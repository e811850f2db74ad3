// src/io/serial/port.rs
//
// Serial port transport backed by the serialport crate.
// One handle is kept for writes and baud changes; a cloned handle feeds a
// blocking listener thread that forwards received bytes to a DataHandler.

use std::io::{Read, Write};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use serialport::SerialPort;

use super::line::{LineSettings, Parity};
use crate::error::{Result, SimError};
use crate::io::{DataHandler, Transport};
use crate::settings::SimSettings;

// ============================================================================
// Types and Configuration
// ============================================================================

/// Serial port configuration
#[derive(Clone, Debug)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    /// Read timeout for the listener; timeouts are not errors
    pub read_timeout: Duration,
}

impl SerialConfig {
    pub fn from_settings(port: &str, baud_rate: u32, settings: &SimSettings) -> Self {
        SerialConfig {
            port: port.to_string(),
            baud_rate,
            data_bits: settings.data_bits,
            stop_bits: settings.stop_bits,
            parity: settings.parity,
            read_timeout: Duration::from_millis(settings.read_timeout_ms.max(1)),
        }
    }

    pub fn line(&self) -> LineSettings {
        LineSettings {
            data_bits: self.data_bits,
            parity: self.parity,
            stop_bits: self.stop_bits,
        }
    }
}

/// Information about an available serial port
#[derive(Clone, Debug)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub port_type: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

// ============================================================================
// Serial Transport
// ============================================================================

pub struct SerialTransport {
    config: SerialConfig,
    port: Mutex<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Open the port. Failure here is fatal for the simulator.
    pub fn open(config: SerialConfig) -> Result<Self> {
        let port = config
            .line()
            .apply(serialport::new(&config.port, config.baud_rate))
            .timeout(config.read_timeout)
            .open()
            .map_err(|e| SimError::transport(&config.port, describe_open_error(&e)))?;

        tlog!(
            "[Serial:{}] Opened at {} baud ({})",
            config.port,
            config.baud_rate,
            config.line()
        );

        Ok(SerialTransport {
            config,
            port: Mutex::new(port),
        })
    }

    /// Register `handler` as the data-arrival callback.
    /// Reading happens on a dedicated blocking thread over a cloned handle.
    pub fn listen<H: DataHandler + 'static>(&self, mut handler: H) -> Result<ListenerHandle> {
        let mut reader = {
            let guard = self.lock_port()?;
            guard
                .try_clone()
                .map_err(|e| SimError::transport(&self.config.port, format!("Failed to clone port: {}", e)))?
        };

        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_for_thread = stop_flag.clone();
        let port_name = self.config.port.clone();

        let thread = std::thread::Builder::new()
            .name(format!("serial-listen-{}", port_name))
            .spawn(move || {
                let mut buf = [0u8; 256];
                while !stop_for_thread.load(Ordering::SeqCst) {
                    match reader.read(&mut buf) {
                        Ok(n) if n > 0 => handler.on_data(&buf[..n]),
                        Ok(_) => {
                            tlog!("[Serial:{}] Port closed, listener exiting", port_name);
                            break;
                        }
                        Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                            // Timeout is expected for serial reads
                        }
                        Err(e) => {
                            tlog!("[Serial:{}] Read error, listener exiting: {}", port_name, e);
                            break;
                        }
                    }
                }
            })
            .map_err(|e| SimError::transport(&self.config.port, format!("Failed to spawn listener: {}", e)))?;

        Ok(ListenerHandle {
            stop_flag,
            thread: Some(thread),
        })
    }

    fn lock_port(&self) -> Result<std::sync::MutexGuard<'_, Box<dyn SerialPort>>> {
        self.port
            .lock()
            .map_err(|e| SimError::transport(&self.config.port, format!("Port mutex poisoned: {}", e)))
    }
}

impl Transport for SerialTransport {
    fn port_name(&self) -> &str {
        &self.config.port
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        let mut port = self.lock_port()?;
        port.write_all(data)
            .and_then(|_| port.flush())
            .map_err(|e| SimError::transport(&self.config.port, format!("Serial write error: {}", e)))
    }

    fn baud_rate(&self) -> Result<u32> {
        let port = self.lock_port()?;
        port.baud_rate()
            .map_err(|e| SimError::transport(&self.config.port, e.to_string()))
    }

    fn set_baud_rate(&self, baud_rate: u32) -> Result<()> {
        let mut port = self.lock_port()?;
        port.set_baud_rate(baud_rate)
            .map_err(|e| SimError::transport(&self.config.port, format!("Failed to set baud rate {}: {}", baud_rate, e)))
    }
}

/// Stops and joins the listener thread when dropped.
pub struct ListenerHandle {
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl ListenerHandle {
    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn describe_open_error(e: &serialport::Error) -> String {
    match e.kind() {
        serialport::ErrorKind::NoDevice => format!("No such port exists ({})", e),
        serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            format!("This port is in use or not accessible ({})", e)
        }
        _ => format!("Failed to open: {}", e),
    }
}

// ============================================================================
// Port Enumeration
// ============================================================================

/// List available serial ports
///
/// On macOS only /dev/cu.* devices are returned; the tty devices block on
/// open waiting for carrier detect.
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports()
        .map_err(|e| SimError::transport("*", format!("Failed to enumerate ports: {}", e)))?;

    Ok(ports
        .into_iter()
        .filter(|_p| {
            #[cfg(target_os = "macos")]
            {
                !_p.port_name.starts_with("/dev/tty.")
            }
            #[cfg(not(target_os = "macos"))]
            {
                true
            }
        })
        .map(|p| {
            let (port_type, manufacturer, product) = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => {
                    ("USB".to_string(), info.manufacturer, info.product)
                }
                serialport::SerialPortType::BluetoothPort => ("Bluetooth".to_string(), None, None),
                serialport::SerialPortType::PciPort => ("PCI".to_string(), None, None),
                serialport::SerialPortType::Unknown => ("Unknown".to_string(), None, None),
            };
            SerialPortInfo {
                port_name: p.port_name,
                port_type,
                manufacturer,
                product,
            }
        })
        .collect())
}
