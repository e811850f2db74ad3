// src/sim/dispatcher.rs
//
// Single consumer of the command queue. Applies each command to the replay
// task and answers over the transport. Commands run strictly one at a time;
// a `br` restart sequence completes before the next command is popped.

use std::sync::Arc;
use std::time::Duration;

use super::command::{parse_command, ParsedCommand};
use super::queue::CommandReceiver;
use super::replay::{Interval, ReplaySpec, ReplayTask, TaskState};
use crate::error::Result;
use crate::io::{set_baud_rate_async, write_async, Transport};
use crate::settings::SimSettings;

pub const REPLY_UNRECOGNIZED: &str = "Can't recognize this command\n";
pub const REPLY_ACK: &str = "\n";

// ============================================================================
// Context
// ============================================================================

/// All mutable simulator state, owned by the dispatcher
pub struct SimContext {
    spec: ReplaySpec,
    transport: Arc<dyn Transport>,
    interval: Interval,
    interval_scale: u64,
    settle: Duration,
    task: ReplayTask,
}

impl SimContext {
    /// Build the context with a Stopped initial task
    pub fn new(spec: ReplaySpec, transport: Arc<dyn Transport>, settings: &SimSettings) -> Self {
        let interval = Interval::new(settings.interval_ms);
        let task = ReplayTask::new(spec.clone(), transport.clone(), interval.clone());
        SimContext {
            spec,
            transport,
            interval,
            interval_scale: settings.interval_scale.max(1),
            settle: Duration::from_millis(settings.settle_ms),
            task,
        }
    }

    pub fn sensor(&self) -> &str {
        &self.spec.sensor
    }

    pub fn task_state(&self) -> TaskState {
        self.task.state()
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval.get()
    }

    /// Parse and apply one framed command
    pub async fn handle_command(&mut self, raw: &str) {
        tlog!("[dispatch:{}] About to respond cmd: {}", self.spec.sensor, raw.escape_debug());

        match parse_command(raw) {
            ParsedCommand::On => self.turn_on().await,
            ParsedCommand::Off => self.turn_off().await,
            ParsedCommand::BaudRate(rate) => self.change_baud_rate(rate).await,
            ParsedCommand::SetInterval(n) => self.set_interval(n),
            ParsedCommand::BadArgument { verb, argument } => {
                tlog!(
                    "[dispatch:{}] Invalid {} argument {:?}, ignoring",
                    self.spec.sensor,
                    verb,
                    argument
                );
            }
            ParsedCommand::Unrecognized => self.reply(REPLY_UNRECOGNIZED).await,
        }
    }

    /// Start a fresh task unless one is already running
    pub async fn turn_on(&mut self) {
        if self.task.is_running() {
            let msg = format!("{} is running\n", self.spec.sensor);
            self.reply(&msg).await;
            return;
        }
        self.restart_task().await;
    }

    async fn turn_off(&mut self) {
        if self.task.is_running() {
            self.task.stop().await;
        }
        // Same reply whether or not anything was running
        let msg = format!("{} has Stopped\n", self.spec.sensor);
        self.reply(&msg).await;
    }

    /// Stop, retune, and restart if the task had been running.
    /// A rejected baud rate leaves the task stopped.
    async fn change_baud_rate(&mut self, rate: u32) {
        let was_running = self.task.is_running();
        self.task.stop().await;

        self.reply(REPLY_ACK).await;

        let before = self.transport.baud_rate().ok();
        if let Err(e) = set_baud_rate_async(&self.transport, rate).await {
            tlog!("[dispatch:{}] Change baudrate error: {}", self.spec.sensor, e);
            return;
        }
        tlog!(
            "[dispatch:{}] BaudRate on {} before: {:?}, after: {}",
            self.spec.sensor,
            self.transport.port_name(),
            before,
            rate
        );

        self.reply(REPLY_ACK).await;

        if was_running {
            tokio::time::sleep(self.settle).await;
            self.restart_task().await;
        }
    }

    fn set_interval(&mut self, n: u64) {
        match n.checked_mul(self.interval_scale) {
            Some(ms) => {
                self.interval.set(ms);
                tlog!("[dispatch:{}] Interval set to {} ms", self.spec.sensor, ms);
            }
            None => {
                tlog!("[dispatch:{}] Interval {} out of range, ignoring", self.spec.sensor, n);
            }
        }
    }

    /// Reap the previous loop, then replace it with a new running task
    async fn restart_task(&mut self) {
        self.task.stop().await;
        self.task = ReplayTask::new(self.spec.clone(), self.transport.clone(), self.interval.clone());
        if let Err(e) = self.task.start().await {
            tlog!("[dispatch:{}] Failed to start replay: {}", self.spec.sensor, e);
        }
    }

    async fn reply(&self, msg: &str) {
        if let Err(e) = self.send(msg).await {
            tlog!("[dispatch:{}] Reply failed: {}", self.spec.sensor, e);
        }
    }

    async fn send(&self, msg: &str) -> Result<()> {
        write_async(&self.transport, msg.as_bytes().to_vec()).await
    }

    /// Stop the current task (used when the command stream ends)
    pub async fn shutdown(&mut self) {
        self.task.stop().await;
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

pub struct Dispatcher {
    ctx: SimContext,
    queue: CommandReceiver,
}

impl Dispatcher {
    pub fn new(ctx: SimContext, queue: CommandReceiver) -> Self {
        Dispatcher { ctx, queue }
    }

    /// Consume commands until every producer is gone.
    /// Parks while the queue is empty.
    pub async fn run(mut self) -> SimContext {
        while let Some(raw) = self.queue.pop().await {
            self.ctx.handle_command(&raw).await;
        }
        tlog!("[dispatch:{}] Command stream closed", self.ctx.sensor());
        self.ctx.shutdown().await;
        self.ctx
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryTransport;
    use crate::sim::replay::Encoding;
    use std::io::Write as _;

    const WAIT: Duration = Duration::from_secs(5);

    struct Fixture {
        ctx: SimContext,
        transport: Arc<MemoryTransport>,
        _file: tempfile::NamedTempFile,
    }

    fn fixture(interval_ms: u64) -> Fixture {
        fixture_with(SimSettings {
            interval_ms,
            settle_ms: 5,
            ..SimSettings::default()
        })
    }

    fn fixture_with(settings: SimSettings) -> Fixture {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(b"A\nB\n").unwrap();
        file.flush().unwrap();

        let transport = Arc::new(MemoryTransport::new("P1", 9600));
        let spec = ReplaySpec {
            sensor: "CTD".to_string(),
            path: file.path().to_path_buf(),
            encoding: Encoding::Text,
        };
        let ctx = SimContext::new(spec, transport.clone(), &settings);
        Fixture {
            ctx,
            transport,
            _file: file,
        }
    }

    fn replies(transport: &MemoryTransport) -> Vec<String> {
        transport
            .written()
            .into_iter()
            .filter(|w| !w.starts_with('>'))
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_on_off_state_machine() {
        let mut f = fixture(60_000);
        assert_eq!(f.ctx.task_state(), TaskState::Stopped);

        f.ctx.handle_command("on").await;
        assert_eq!(f.ctx.task_state(), TaskState::Running);
        assert!(replies(&f.transport).is_empty());

        f.ctx.handle_command("on").await;
        assert_eq!(f.ctx.task_state(), TaskState::Running);
        assert_eq!(replies(&f.transport), vec!["CTD is running\n"]);

        f.ctx.handle_command("off").await;
        assert_eq!(f.ctx.task_state(), TaskState::Stopped);
        f.ctx.handle_command("off").await;
        assert_eq!(f.ctx.task_state(), TaskState::Stopped);
        assert_eq!(
            replies(&f.transport),
            vec!["CTD is running\n", "CTD has Stopped\n", "CTD has Stopped\n"]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_on_after_off_starts_new_task() {
        let mut f = fixture(60_000);
        f.ctx.handle_command("on").await;
        assert!(f.transport.wait_for_writes(1, WAIT).await);
        f.ctx.handle_command("off").await;
        f.transport.clear();

        f.ctx.handle_command("on").await;
        assert_eq!(f.ctx.task_state(), TaskState::Running);
        assert!(f.transport.wait_for_writes(1, WAIT).await);
        // A new task replays from the top of the file
        assert_eq!(f.transport.written()[0], ">A\n");
        f.ctx.shutdown().await;
    }

    #[tokio::test]
    async fn test_unrecognized_reply() {
        let mut f = fixture(60_000);
        f.ctx.handle_command("reset").await;
        f.ctx.handle_command("on please").await;
        assert_eq!(
            f.transport.written(),
            vec![REPLY_UNRECOGNIZED, REPLY_UNRECOGNIZED]
        );
        assert_eq!(f.ctx.task_state(), TaskState::Stopped);
    }

    #[tokio::test]
    async fn test_set_interval_scales() {
        let mut f = fixture(300);
        f.ctx.handle_command("setInterval 5").await;
        assert_eq!(f.ctx.interval_ms(), 500);

        f.ctx.handle_command("setInterval abc").await;
        f.ctx.handle_command("setInterval 0").await;
        assert_eq!(f.ctx.interval_ms(), 500);
        assert!(f.transport.written().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_set_interval_speeds_up_running_task() {
        let mut f = fixture_with(SimSettings {
            interval_ms: 200,
            interval_scale: 1,
            ..SimSettings::default()
        });
        f.ctx.handle_command("on").await;
        assert!(f.transport.wait_for_writes(1, WAIT).await);

        f.ctx.handle_command("setInterval 2").await;
        assert_eq!(f.ctx.interval_ms(), 2);

        // At most the pending 200 ms wait plus 2 ms ticks afterwards
        tokio::time::sleep(Duration::from_millis(600)).await;
        let count = f.transport.write_count();
        f.ctx.shutdown().await;
        assert!(count > 20, "only {} units in 600 ms after setInterval 2", count);
    }

    #[tokio::test]
    async fn test_set_interval_overflow_ignored() {
        let mut f = fixture(300);
        f.ctx.handle_command(&format!("setInterval {}", u64::MAX)).await;
        assert_eq!(f.ctx.interval_ms(), 300);
    }

    #[tokio::test]
    async fn test_baud_change_while_stopped() {
        let mut f = fixture(60_000);
        f.ctx.handle_command("br 19200").await;
        assert_eq!(f.transport.baud_rate().unwrap(), 19200);
        assert_eq!(f.ctx.task_state(), TaskState::Stopped);
        assert_eq!(f.transport.written(), vec!["\n", "\n"]);
    }

    #[tokio::test]
    async fn test_baud_change_bad_argument_ignored() {
        let mut f = fixture(60_000);
        f.ctx.handle_command("br abc").await;
        assert_eq!(f.transport.baud_rate().unwrap(), 9600);
        assert_eq!(f.ctx.task_state(), TaskState::Stopped);
        assert!(f.transport.written().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_baud_change_while_running_restarts() {
        let mut f = fixture(60_000);
        f.ctx.handle_command("on").await;
        assert!(f.transport.wait_for_writes(1, WAIT).await);

        f.ctx.handle_command("br 4800").await;
        assert_eq!(f.transport.baud_rate().unwrap(), 4800);
        assert_eq!(f.ctx.task_state(), TaskState::Running);
        assert!(f.transport.wait_for_writes(4, WAIT).await);

        let written = f.transport.written();
        assert_eq!(&written[..4], &[">A\n", "\n", "\n", ">A\n"]);
        f.ctx.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_baud_change_waits_settle_before_restart() {
        let settle = Duration::from_millis(150);
        let mut f = fixture_with(SimSettings {
            interval_ms: 60_000,
            settle_ms: 150,
            ..SimSettings::default()
        });
        f.ctx.handle_command("on").await;
        assert!(f.transport.wait_for_writes(1, WAIT).await);

        let sent = std::time::Instant::now();
        f.ctx.handle_command("br 4800").await;
        assert!(sent.elapsed() >= settle);
        assert!(f.transport.wait_for_writes(4, WAIT).await);
        f.ctx.shutdown().await;

        let stamped = f.transport.written_at();
        assert_eq!(stamped[2].1, "\n");
        assert_eq!(stamped[3].1, ">A\n");
        // Nothing replayed between the second ack and the end of the settle delay
        let gap = stamped[3].0.duration_since(stamped[2].0);
        assert!(gap >= settle, "replay resumed {:?} after the ack", gap);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rejected_baud_change_leaves_task_stopped() {
        let mut f = fixture(60_000);
        f.ctx.handle_command("on").await;
        assert!(f.transport.wait_for_writes(1, WAIT).await);

        f.transport.reject_baud_changes(true);
        f.ctx.handle_command("br 1234").await;
        assert_eq!(f.transport.baud_rate().unwrap(), 9600);
        assert_eq!(f.ctx.task_state(), TaskState::Stopped);
        assert_eq!(f.transport.written(), vec![">A\n", "\n"]);
    }

    #[tokio::test]
    async fn test_missing_file_on_stays_stopped() {
        let transport = Arc::new(MemoryTransport::new("P1", 9600));
        let spec = ReplaySpec {
            sensor: "CTD".to_string(),
            path: std::path::PathBuf::from("/nonexistent/serialsim/ctd.dat"),
            encoding: Encoding::Text,
        };
        let mut ctx = SimContext::new(spec, transport.clone(), &SimSettings::default());

        ctx.handle_command("on").await;
        assert_eq!(ctx.task_state(), TaskState::Stopped);
        // Still accepts commands afterwards
        ctx.handle_command("off").await;
        assert_eq!(transport.written(), vec!["CTD has Stopped\n"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dispatcher_processes_in_order() {
        let f = fixture(60_000);
        let transport = f.transport.clone();
        let (tx, rx) = crate::sim::queue::command_queue();
        for cmd in ["bogus", "off", "br 2400", "setInterval 2"] {
            tx.push(cmd.to_string());
        }
        drop(tx);

        let ctx = Dispatcher::new(f.ctx, rx).run().await;
        assert_eq!(
            transport.written(),
            vec![REPLY_UNRECOGNIZED, "CTD has Stopped\n", "\n", "\n"]
        );
        assert_eq!(transport.baud_rate().unwrap(), 2400);
        assert_eq!(ctx.interval_ms(), 200);
    }
}
