// src/sim/queue.rs
//
// Ordered hand-off between the framer (listener thread) and the dispatcher.

use tokio::sync::mpsc;

use crate::io::serial::CommandSink;

/// Create an unbounded FIFO command queue.
pub fn command_queue() -> (CommandSender, CommandReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CommandSender { tx }, CommandReceiver { rx })
}

/// Producer half. Pushing never blocks and works from any thread.
#[derive(Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<String>,
}

impl CommandSender {
    pub fn push(&self, command: String) {
        if self.tx.send(command).is_err() {
            tlog!("[queue] Dispatcher gone, dropping command");
        }
    }
}

impl CommandSink for CommandSender {
    fn push_command(&mut self, command: String) {
        tlog!("[queue] Send command \"{}\" to the queue", command.escape_debug());
        self.push(command);
    }
}

/// Consumer half, owned by the dispatcher.
pub struct CommandReceiver {
    rx: mpsc::UnboundedReceiver<String>,
}

impl CommandReceiver {
    /// Wait for the next command. `None` once every sender is gone.
    pub async fn pop(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}
