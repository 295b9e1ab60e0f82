//! The HTTP execution engine: request handles (C2) and the bounded-concurrency multiplexer
//! (C3) that drives them. Grounded on `examples/original_source/Networking.h`/`.cpp` and
//! `include/request-handle.h`.

pub mod handle;
pub mod multiplexer;

pub use handle::{BodySource, RequestHandle, ResponseSink};
pub use multiplexer::{HttpExecutable, HttpMultiplexer, Outcome};
