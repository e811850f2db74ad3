// src/io/memory.rs
//
// In-memory transport. Records every write (with the time it landed) and the
// current baud rate so the engine can be driven without a serial device.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::Transport;
use crate::error::{Result, SimError};

pub struct MemoryTransport {
    name: String,
    baud_rate: AtomicU32,
    writes: Mutex<Vec<(Instant, Vec<u8>)>>,
    reject_baud: AtomicBool,
}

impl MemoryTransport {
    pub fn new(name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            name: name.into(),
            baud_rate: AtomicU32::new(baud_rate),
            writes: Mutex::new(Vec::new()),
            reject_baud: AtomicBool::new(false),
        }
    }

    /// Make subsequent `set_baud_rate` calls fail
    pub fn reject_baud_changes(&self, reject: bool) {
        self.reject_baud.store(reject, Ordering::SeqCst);
    }

    /// Every write so far, decoded lossily as text
    pub fn written(&self) -> Vec<String> {
        self.written_at().into_iter().map(|(_, text)| text).collect()
    }

    /// Like `written`, paired with when each write was recorded
    pub fn written_at(&self) -> Vec<(Instant, String)> {
        self.writes
            .lock()
            .map(|w| {
                w.iter()
                    .map(|(at, b)| (*at, String::from_utf8_lossy(b).into_owned()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().map(|w| w.len()).unwrap_or(0)
    }

    /// Forget recorded writes
    pub fn clear(&self) {
        if let Ok(mut w) = self.writes.lock() {
            w.clear();
        }
    }

    /// Poll until at least `count` writes were recorded or `timeout` elapses.
    /// Returns whether the count was reached.
    pub async fn wait_for_writes(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.write_count() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        self.write_count() >= count
    }
}

impl Transport for MemoryTransport {
    fn port_name(&self) -> &str {
        &self.name
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        let mut writes = self
            .writes
            .lock()
            .map_err(|e| SimError::transport(&self.name, format!("Mutex poisoned: {}", e)))?;
        writes.push((Instant::now(), data.to_vec()));
        Ok(())
    }

    fn baud_rate(&self) -> Result<u32> {
        Ok(self.baud_rate.load(Ordering::SeqCst))
    }

    fn set_baud_rate(&self, baud_rate: u32) -> Result<()> {
        if self.reject_baud.load(Ordering::SeqCst) {
            return Err(SimError::transport(
                &self.name,
                format!("Unsupported baud rate {}", baud_rate),
            ));
        }
        self.baud_rate.store(baud_rate, Ordering::SeqCst);
        Ok(())
    }
}
