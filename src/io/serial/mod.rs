// src/io/serial/mod.rs
//
// Serial port transport and the CRLF command framer that sits on its
// data-arrival callback.

pub mod framer;
pub mod port;
pub(crate) mod line;

pub use framer::{CommandFramer, CommandSink};
pub use port::{list_ports, ListenerHandle, SerialConfig, SerialPortInfo, SerialTransport};
pub use line::{LineSettings, Parity};
