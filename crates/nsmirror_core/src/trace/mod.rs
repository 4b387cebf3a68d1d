//! Publishing and ordered replay of per-entity lifecycle events.

mod publish;
mod replay;
mod summary;

pub use publish::{Published, TracePublisher};
pub use replay::{TraceHandler, TraceLoop, TraceState};
pub use summary::FinishedSummary;
