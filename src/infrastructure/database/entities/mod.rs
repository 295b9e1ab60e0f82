//! SeaORM entity definitions mapping the index's four tables.

pub mod cloud_config;
pub mod file_link;
pub mod file_record;
pub mod metadata;

pub use cloud_config::Entity as CloudConfig;
pub use file_link::Entity as FileLink;
pub use file_record::Entity as FileRecord;
pub use metadata::Entity as Metadata;
