// src/io/serial/line.rs
//
// Character framing on the wire (data bits, parity, stop bits). The settings
// file stores these as plain numbers; the serialport builder wants its own enums.

use std::fmt;

use serde::{Deserialize, Serialize};
use serialport::{DataBits, SerialPortBuilder, StopBits};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl From<Parity> for serialport::Parity {
    fn from(p: Parity) -> Self {
        match p {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

/// Framing applied when the port is opened. Baud rate is kept apart because
/// it changes at runtime and framing does not.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineSettings {
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
}

impl LineSettings {
    /// Out-of-range counts fall back to 8 data bits and 1 stop bit
    fn serial_data_bits(&self) -> DataBits {
        match self.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        }
    }

    fn serial_stop_bits(&self) -> StopBits {
        if self.stop_bits == 2 {
            StopBits::Two
        } else {
            StopBits::One
        }
    }

    pub fn apply(&self, builder: SerialPortBuilder) -> SerialPortBuilder {
        builder
            .data_bits(self.serial_data_bits())
            .parity(self.parity.into())
            .stop_bits(self.serial_stop_bits())
    }
}

/// Short `8-N-1` form
impl fmt::Display for LineSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        };
        write!(f, "{}-{}-{}", self.data_bits, parity, self.stop_bits)
    }
}
