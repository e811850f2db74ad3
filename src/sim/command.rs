// src/sim/command.rs
//
// Control command grammar: `<verb>[ <argument>]`.

use std::fmt;

/// One framed command, split on its first space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub verb: String,
    pub argument: Option<String>,
}

impl Command {
    pub fn split(raw: &str) -> Self {
        match raw.split_once(' ') {
            Some((verb, argument)) => Command {
                verb: verb.to_string(),
                argument: Some(argument.to_string()),
            },
            None => Command {
                verb: raw.to_string(),
                argument: None,
            },
        }
    }
}

/// Verbs that take a numeric argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgVerb {
    BaudRate,
    SetInterval,
}

impl fmt::Display for ArgVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgVerb::BaudRate => write!(f, "br"),
            ArgVerb::SetInterval => write!(f, "setInterval"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand {
    On,
    Off,
    BaudRate(u32),
    /// Raw `setInterval` argument, before scaling
    SetInterval(u64),
    /// Known verb whose argument is not a positive integer
    BadArgument { verb: ArgVerb, argument: String },
    Unrecognized,
}

/// Parse one framed command.
pub fn parse_command(raw: &str) -> ParsedCommand {
    let Command { verb, argument } = Command::split(raw);

    match (verb.as_str(), argument) {
        ("on", None) => ParsedCommand::On,
        ("off", None) => ParsedCommand::Off,
        ("br", Some(arg)) => match parse_positive::<u32>(&arg) {
            Some(rate) => ParsedCommand::BaudRate(rate),
            None => ParsedCommand::BadArgument {
                verb: ArgVerb::BaudRate,
                argument: arg,
            },
        },
        ("setInterval", Some(arg)) => match parse_positive::<u64>(&arg) {
            Some(n) => ParsedCommand::SetInterval(n),
            None => ParsedCommand::BadArgument {
                verb: ArgVerb::SetInterval,
                argument: arg,
            },
        },
        _ => ParsedCommand::Unrecognized,
    }
}

fn parse_positive<T>(arg: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    arg.parse::<T>().ok().filter(|v| *v > T::default())
}
