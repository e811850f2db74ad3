// src/cli.rs
//
// Startup arguments: `serialsim <PORT> <SENSOR> <FILE> <BAUD> <FILE_TYPE>`.

use std::path::PathBuf;

use clap::Parser;

use crate::error::{Result, SimError};
use crate::sim::Encoding;

#[derive(Parser, Debug)]
#[command(
    name = "serialsim",
    version,
    about = "Replay a recorded sensor data file over a serial port",
    after_help = "e.g. serialsim COM2 CTD ctd.dat 9600 1"
)]
pub struct SimArgs {
    /// Serial port to open (e.g. /dev/ttyUSB0, COM2)
    #[arg(required_unless_present = "list_ports")]
    pub port: Option<String>,

    /// Name of the simulated sensor, used in replies
    #[arg(required_unless_present = "list_ports")]
    pub sensor: Option<String>,

    /// Recorded data file to replay
    #[arg(required_unless_present = "list_ports")]
    pub file: Option<PathBuf>,

    /// Initial baud rate
    #[arg(required_unless_present = "list_ports")]
    pub baud: Option<u32>,

    /// Data file type: 1 = text (line per unit), 2 = binary (byte per unit)
    #[arg(required_unless_present = "list_ports", value_parser = parse_file_type)]
    pub file_type: Option<Encoding>,

    /// Settings file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Start replaying immediately instead of waiting for `on`
    #[arg(long)]
    pub start: bool,

    /// Print available serial ports and exit
    #[arg(long)]
    pub list_ports: bool,
}

/// Validated startup parameters
#[derive(Debug, Clone)]
pub struct Launch {
    pub port: String,
    pub sensor: String,
    pub file: PathBuf,
    pub baud: u32,
    pub encoding: Encoding,
}

impl SimArgs {
    /// Check the positional arguments. The data file must exist.
    pub fn launch(&self) -> Result<Launch> {
        let missing = |name: &str| SimError::Config(format!("missing <{}> argument", name));

        let launch = Launch {
            port: self.port.clone().ok_or_else(|| missing("PORT"))?,
            sensor: self.sensor.clone().ok_or_else(|| missing("SENSOR"))?,
            file: self.file.clone().ok_or_else(|| missing("FILE"))?,
            baud: self.baud.ok_or_else(|| missing("BAUD"))?,
            encoding: self.file_type.ok_or_else(|| missing("FILE_TYPE"))?,
        };

        if !launch.file.is_file() {
            return Err(SimError::Config(format!(
                "No such file: {}",
                launch.file.display()
            )));
        }
        if launch.baud == 0 {
            return Err(SimError::Config("baud rate must be positive".to_string()));
        }
        Ok(launch)
    }
}

fn parse_file_type(s: &str) -> std::result::Result<Encoding, String> {
    s.parse::<u8>()
        .ok()
        .and_then(Encoding::from_file_type)
        .ok_or_else(|| format!("file type must be 1 (text) or 2 (binary), got {:?}", s))
}
