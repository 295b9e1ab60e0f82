//! The synchronization kernel: DTOs, the command/chain model, changes, the expected-events
//! registry, both storage adapters, and the orchestrating sync manager.

pub mod change;
pub mod cloud;
pub mod command;
pub mod dto;
pub mod expected_events;
pub mod factory;
pub mod local;
pub mod manager;

pub use change::Change;
pub use command::Command;
pub use dto::{FileDeletedDto, FileMovedDto, FileRecordDto, FileUpdatedDto};
pub use manager::SyncManager;
