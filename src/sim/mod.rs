// src/sim/mod.rs
//
// The replay-and-command engine: command grammar, queue, dispatcher and
// replay task, plus the wiring that connects them to a transport.

pub mod command;
pub mod dispatcher;
pub mod queue;
pub mod replay;

use std::sync::Arc;

pub use command::{parse_command, Command, ParsedCommand};
pub use dispatcher::{Dispatcher, SimContext};
pub use queue::{command_queue, CommandReceiver, CommandSender};
pub use replay::{Encoding, Interval, ReplaySpec, ReplayTask, TaskState};

use crate::io::serial::CommandFramer;
use crate::io::Transport;
use crate::settings::SimSettings;

/// One simulated sensor bound to one transport
pub struct Simulator {
    ctx: SimContext,
    sender: CommandSender,
    receiver: CommandReceiver,
}

impl Simulator {
    pub fn new(spec: ReplaySpec, transport: Arc<dyn Transport>, settings: &SimSettings) -> Self {
        let (sender, receiver) = command_queue();
        Simulator {
            ctx: SimContext::new(spec, transport, settings),
            sender,
            receiver,
        }
    }

    /// Framer feeding this simulator's queue; register it as the transport's data handler
    pub fn framer(&self) -> CommandFramer<CommandSender> {
        CommandFramer::new(self.sender.clone())
    }

    pub fn context_mut(&mut self) -> &mut SimContext {
        &mut self.ctx
    }

    /// Hand over to the dispatcher. The queue closes once every framer is dropped.
    pub fn into_dispatcher(self) -> Dispatcher {
        let Simulator { ctx, receiver, .. } = self;
        Dispatcher::new(ctx, receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{DataHandler, MemoryTransport};
    use std::io::Write as _;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    async fn wait_for_reply(transport: &MemoryTransport, reply: &str) -> bool {
        let deadline = std::time::Instant::now() + WAIT;
        while std::time::Instant::now() < deadline {
            if transport.written().iter().any(|w| w == reply) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        false
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_end_to_end_text_sensor() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(b"A\nB\n").unwrap();
        file.flush().unwrap();

        let transport = Arc::new(MemoryTransport::new("P1", 9600));
        assert_eq!(transport.baud_rate().unwrap(), 9600);

        let spec = ReplaySpec {
            sensor: "CTD".to_string(),
            path: file.path().to_path_buf(),
            encoding: Encoding::from_file_type(1).unwrap(),
        };
        let settings = SimSettings {
            interval_ms: 3,
            ..SimSettings::default()
        };
        let sim = Simulator::new(spec, transport.clone(), &settings);
        let mut framer = sim.framer();
        let dispatcher = tokio::spawn(sim.into_dispatcher().run());

        // Nothing is replayed before `on`
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(transport.write_count(), 0);

        framer.on_data(b"on\r\n");
        assert!(transport.wait_for_writes(5, WAIT).await);
        assert_eq!(
            &transport.written()[..5],
            &[">A\n", ">B\n", ">A\n", ">B\n", ">A\n"]
        );

        // Terminator split across deliveries
        framer.on_data(b"off\r");
        framer.on_data(b"\n");
        assert!(wait_for_reply(&transport, "CTD has Stopped\n").await);

        let written = transport.written();
        assert_eq!(written.last().map(String::as_str), Some("CTD has Stopped\n"));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(transport.write_count(), written.len());

        drop(framer);
        let ctx = dispatcher.await.unwrap();
        assert_eq!(ctx.task_state(), TaskState::Stopped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_commands_dispatched_in_framer_order() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(&[0x0A]).unwrap();
        file.flush().unwrap();

        let transport = Arc::new(MemoryTransport::new("P1", 9600));
        let spec = ReplaySpec {
            sensor: "ADCP".to_string(),
            path: file.path().to_path_buf(),
            encoding: Encoding::Binary,
        };
        let sim = Simulator::new(spec, transport.clone(), &SimSettings::default());
        let mut framer = sim.framer();

        framer.on_data(b"nope\r\noff\r\nbr 1920");
        framer.on_data(b"0\r\nsetInterval 1\r\n");
        drop(framer);

        let ctx = sim.into_dispatcher().run().await;
        assert_eq!(
            transport.written(),
            vec![
                "Can't recognize this command\n",
                "ADCP has Stopped\n",
                "\n",
                "\n"
            ]
        );
        assert_eq!(transport.baud_rate().unwrap(), 19200);
        assert_eq!(ctx.interval_ms(), 100);
    }
}
