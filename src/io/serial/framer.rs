// src/io/serial/framer.rs
//
// CRLF command framing for the inbound control channel.
// Bytes arrive in arbitrary chunks; a terminator may be split across two
// chunks, so the "saw CR" state is carried between calls.

use crate::io::DataHandler;

const CR: u8 = 0x0D;
const LF: u8 = 0x0A;

// =============================================================================
// Sink
// =============================================================================

/// Receives each completed command, in arrival order.
pub trait CommandSink: Send {
    fn push_command(&mut self, command: String);
}

impl CommandSink for Vec<String> {
    fn push_command(&mut self, command: String) {
        self.push(command);
    }
}

// =============================================================================
// Framer
// =============================================================================

/// Splits a raw byte stream on CR LF and hands each command to a sink.
/// The terminator never appears in an emitted command.
pub struct CommandFramer<S: CommandSink> {
    buffer: Vec<u8>,
    /// Last byte seen was CR, and it has not been placed in `buffer` yet
    pending_cr: bool,
    sink: S,
}

impl<S: CommandSink> CommandFramer<S> {
    pub fn new(sink: S) -> Self {
        CommandFramer {
            buffer: Vec::new(),
            pending_cr: false,
            sink,
        }
    }

    /// Feed one delivered chunk. Never blocks.
    pub fn feed(&mut self, data: &[u8]) {
        for &byte in data {
            if self.pending_cr {
                self.pending_cr = false;
                if byte == LF {
                    self.complete();
                    continue;
                }
                // Lone CR is ordinary data
                self.buffer.push(CR);
            }

            if byte == CR {
                self.pending_cr = true;
            } else {
                self.buffer.push(byte);
            }
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn complete(&mut self) {
        // Each byte maps to one char, so arbitrary line noise never fails to decode
        let command: String = self.buffer.drain(..).map(char::from).collect();
        self.sink.push_command(command);
    }
}

impl<S: CommandSink> DataHandler for CommandFramer<S> {
    fn on_data(&mut self, chunk: &[u8]) {
        self.feed(chunk);
    }
}

// =============================================================================
// Tests
// =============================================================================
