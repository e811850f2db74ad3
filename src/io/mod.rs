// src/io/mod.rs
//
// Transport abstraction for the simulated instrument.
// The dispatcher and the replay task share one transport; inbound bytes are
// delivered to a registered `DataHandler`.

mod memory;
pub mod serial;

pub use memory::MemoryTransport;

use std::sync::Arc;

use crate::error::{Result, SimError};

/// Byte channel the simulator talks over.
///
/// Implementations serialise writes internally, so a transport can be shared
/// as `Arc<dyn Transport>` between the dispatcher and a replay task.
pub trait Transport: Send + Sync {
    /// Port identifier (used in log lines and errors)
    fn port_name(&self) -> &str;

    /// Write all bytes and flush
    fn write(&self, data: &[u8]) -> Result<()>;

    /// Current line speed
    fn baud_rate(&self) -> Result<u32>;

    /// Change the line speed. Callers must make sure no replay write is in flight.
    fn set_baud_rate(&self, baud_rate: u32) -> Result<()>;
}

/// Callback invoked by a transport listener whenever bytes arrive.
/// Must return quickly; it runs on the listener thread.
pub trait DataHandler: Send {
    fn on_data(&mut self, chunk: &[u8]);
}

// ============================================================================
// Async bridges
// ============================================================================
// Serial writes flush to the wire and baud changes retune the line, so both
// run on the blocking pool rather than on a runtime worker.

/// Write `data` from async code without stalling a runtime worker
pub async fn write_async(transport: &Arc<dyn Transport>, data: Vec<u8>) -> Result<()> {
    let t = transport.clone();
    tokio::task::spawn_blocking(move || t.write(&data))
        .await
        .map_err(|e| SimError::transport(transport.port_name(), format!("Write task failed: {}", e)))?
}

/// Change the line speed from async code without stalling a runtime worker
pub async fn set_baud_rate_async(transport: &Arc<dyn Transport>, baud_rate: u32) -> Result<()> {
    let t = transport.clone();
    tokio::task::spawn_blocking(move || t.set_baud_rate(baud_rate))
        .await
        .map_err(|e| {
            SimError::transport(transport.port_name(), format!("Baud change task failed: {}", e))
        })?
}
