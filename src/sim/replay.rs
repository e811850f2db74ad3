// src/sim/replay.rs
//
// File replay task. Emits the data file one unit at a time on a timed loop,
// wrapping to the start at end of file, until it is told to stop.
//
// A task is one-shot: Stopped -> Running -> Stopped. Restarting means
// building a new task.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::error::{Result, SimError};
use crate::io::{write_async, Transport};

// ============================================================================
// Types
// ============================================================================

/// How the data file is cut into units and rendered on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// One line per unit, sent as `>` + line + `\n`
    Text,
    /// One byte per unit, sent as two lowercase hex digits
    Binary,
}

impl Encoding {
    /// Startup file type code: `1` text, `2` binary
    pub fn from_file_type(code: u8) -> Option<Self> {
        match code {
            1 => Some(Encoding::Text),
            2 => Some(Encoding::Binary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Stopped,
    Running,
}

/// What to replay. Fixed for a task's lifetime.
#[derive(Debug, Clone)]
pub struct ReplaySpec {
    pub sensor: String,
    pub path: PathBuf,
    pub encoding: Encoding,
}

/// Wait between replayed units, in milliseconds.
/// Shared by the dispatcher (writer) and every replay task (reader).
#[derive(Debug, Clone)]
pub struct Interval(Arc<AtomicU64>);

impl Interval {
    pub fn new(ms: u64) -> Self {
        Interval(Arc::new(AtomicU64::new(ms.max(1))))
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Zero is clamped to 1 ms; the interval is always positive
    pub fn set(&self, ms: u64) {
        self.0.store(ms.max(1), Ordering::SeqCst);
    }

    fn duration(&self) -> Duration {
        Duration::from_millis(self.get())
    }
}

/// Stop signal for one replay loop
#[derive(Clone)]
struct ReplayControl {
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl ReplayControl {
    fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn set_running(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    /// Clear the flag and cut short a pending wait.
    /// `notify_one` leaves a permit if the loop is not waiting yet.
    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// Sleep for one tick, returning early on stop
    async fn wait_tick(&self, tick: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(tick) => {}
            _ = self.wake.notified() => {}
        }
    }
}

// ============================================================================
// Replay Task
// ============================================================================

pub struct ReplayTask {
    spec: ReplaySpec,
    transport: Arc<dyn Transport>,
    interval: Interval,
    control: ReplayControl,
    started: bool,
    handle: Option<JoinHandle<()>>,
}

impl ReplayTask {
    /// New task in the Stopped state. Nothing is opened until `start`.
    pub fn new(spec: ReplaySpec, transport: Arc<dyn Transport>, interval: Interval) -> Self {
        ReplayTask {
            spec,
            transport,
            interval,
            control: ReplayControl::new(),
            started: false,
            handle: None,
        }
    }

    /// Running only while the flag is set and the loop has not exited on its own
    pub fn state(&self) -> TaskState {
        let loop_alive = self
            .handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false);
        if self.control.is_running() && loop_alive {
            TaskState::Running
        } else {
            TaskState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == TaskState::Running
    }

    /// Open the data file and spawn the emission loop.
    /// A missing file leaves the task Stopped. Must be called inside a tokio runtime.
    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(SimError::TaskSpent(self.spec.sensor.clone()));
        }
        self.started = true;

        let file = File::open(&self.spec.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SimError::FileNotFound(self.spec.path.clone())
            } else {
                SimError::Io {
                    path: self.spec.path.clone(),
                    source: e,
                }
            }
        })?;
        let end = file
            .metadata()
            .await
            .map_err(|e| SimError::Io {
                path: self.spec.path.clone(),
                source: e,
            })?
            .len();

        self.control.set_running();

        let spec = self.spec.clone();
        let transport = self.transport.clone();
        let interval = self.interval.clone();
        let control = self.control.clone();

        tlog!(
            "[replay:{}] Starting {:?} replay of {} ({} bytes, interval {} ms)",
            spec.sensor,
            spec.encoding,
            spec.path.display(),
            end,
            interval.get()
        );

        self.handle = Some(tokio::spawn(async move {
            let sensor = spec.sensor.clone();
            match run_replay(file, end, spec, transport, interval, control).await {
                Ok(units) => tlog!("[replay:{}] Stopped after {} units", sensor, units),
                Err(e) => tlog!("[replay:{}] Replay aborted: {}", sensor, e),
            }
        }));

        Ok(())
    }

    /// Cooperative stop: clear the running flag. The loop finishes its
    /// current unit and exits; use `join` to wait for that.
    pub fn signal_stop(&self) {
        self.control.stop();
    }

    /// Wait for the loop to exit (no-op if it never started)
    pub async fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tlog!("[replay:{}] Task panicked: {:?}", self.spec.sensor, e);
            }
        }
    }

    /// Signal and wait. After this returns no further unit is written.
    pub async fn stop(&mut self) {
        self.signal_stop();
        self.join().await;
    }
}

impl Drop for ReplayTask {
    fn drop(&mut self) {
        self.control.stop();
    }
}

// ============================================================================
// Emission Loop
// ============================================================================

/// Replay until stopped. Returns the number of units written.
async fn run_replay(
    file: File,
    end: u64,
    spec: ReplaySpec,
    transport: Arc<dyn Transport>,
    interval: Interval,
    control: ReplayControl,
) -> Result<u64> {
    let io_err = |source: std::io::Error| SimError::Io {
        path: spec.path.clone(),
        source,
    };

    let mut reader = BufReader::new(file);
    let mut offset: u64 = 0;
    let mut units: u64 = 0;
    let mut line = Vec::new();

    // An empty file has nothing to replay
    while control.is_running() && offset != end {
        let unit = match spec.encoding {
            Encoding::Text => {
                line.clear();
                let n = reader.read_until(b'\n', &mut line).await.map_err(io_err)?;
                if n == 0 {
                    // File shrank underneath us
                    return Err(io_err(std::io::ErrorKind::UnexpectedEof.into()));
                }
                offset += n as u64;
                format_text_unit(&line)
            }
            Encoding::Binary => {
                let byte = reader.read_u8().await.map_err(io_err)?;
                offset += 1;
                format_binary_unit(byte)
            }
        };

        write_async(&transport, unit).await?;
        units += 1;

        control.wait_tick(interval.duration()).await;

        if offset >= end {
            reader.seek(SeekFrom::Start(0)).await.map_err(io_err)?;
            offset = 0;
        }
    }

    Ok(units)
}

/// `>` + line + `\n`, with the line's own terminator removed
pub fn format_text_unit(line: &[u8]) -> Vec<u8> {
    let mut body = line;
    if let Some(stripped) = body.strip_suffix(b"\n") {
        body = stripped;
        if let Some(stripped) = body.strip_suffix(b"\r") {
            body = stripped;
        }
    }
    let mut unit = Vec::with_capacity(body.len() + 2);
    unit.push(b'>');
    unit.extend_from_slice(body);
    unit.push(b'\n');
    unit
}

/// Two lowercase hex digits, no separator
pub fn format_binary_unit(byte: u8) -> Vec<u8> {
    hex::encode([byte]).into_bytes()
}

// ============================================================================
// Tests
// ============================================================================
