//! Shard command implementation.

use nsmirror_core::{shard_of, Layout, TraceKind};

/// Runs the shard command.
pub fn run(entity: &str) {
    let layout = Layout::default();
    println!("shard: {}", shard_of(entity));
    println!("instance events: {}", layout.trace_shard_path(TraceKind::Instance, entity));
    println!("server events:   {}", layout.trace_shard_path(TraceKind::Server, entity));
}
