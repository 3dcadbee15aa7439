//! Module `command`
//!
//! Defines the FTP command parsing logic and the data structures used to
//! represent commands and the outcome of handling them.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::error::ParseError;
use crate::transfer::{DataType, FileStructure, TransferMode};

/// Verbs shorter than this are treated as line noise and skipped.
pub const MIN_VERB_LEN: usize = 4;

/// Represents an FTP command parsed from a control connection line.
///
/// Each variant corresponds to one verb; parameters are already typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    User(String),
    Pass(String),
    Quit,
    Noop,
    Port(SocketAddrV4),
    Pasv,
    Mode(TransferMode),
    Type(DataType),
    Stru(FileStructure),
    Retr(String),
    Stor(String),
    /// Unrecognized verb, kept verbatim for logging.
    Unknown(String),
}

/// Represents the outcome status of executing a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    Failure(String),
    /// Reply has been flushed, end the connection loop.
    CloseConnection,
}

impl Command {
    pub fn verb(&self) -> &str {
        match self {
            Command::User(_) => "USER",
            Command::Pass(_) => "PASS",
            Command::Quit => "QUIT",
            Command::Noop => "NOOP",
            Command::Port(_) => "PORT",
            Command::Pasv => "PASV",
            Command::Mode(_) => "MODE",
            Command::Type(_) => "TYPE",
            Command::Stru(_) => "STRU",
            Command::Retr(_) => "RETR",
            Command::Stor(_) => "STOR",
            Command::Unknown(verb) => verb,
        }
    }

    /// Wire form with the password masked, for logging.
    pub fn redacted(&self) -> String {
        match self {
            Command::Pass(_) => "PASS ****".to_string(),
            other => other.to_string(),
        }
    }
}

/// Parses a raw line received on the control connection.
///
/// Returns `Ok(None)` for noise: blank lines and verbs shorter than
/// [`MIN_VERB_LEN`]. The verb is split off at the first space and matched
/// case-insensitively; the remainder is the raw parameter.
pub fn parse_command(raw: &str) -> Result<Option<Command>, ParseError> {
    let line = raw.trim_end_matches(['\r', '\n']);
    let (verb, param) = match line.split_once(' ') {
        Some((verb, param)) => (verb, param),
        None => (line, ""),
    };

    if verb.len() < MIN_VERB_LEN {
        return Ok(None);
    }

    let command = match verb.to_ascii_uppercase().as_str() {
        "USER" => Command::User(required("USER", param)?),
        "PASS" => Command::Pass(required("PASS", param)?),
        "QUIT" => Command::Quit,
        "NOOP" => Command::Noop,
        "PORT" => Command::Port(parse_host_port(required("PORT", param)?.as_str())?),
        "PASV" => Command::Pasv,
        "MODE" => {
            let param = required("MODE", param)?;
            let mode = TransferMode::from_code(&param).ok_or(ParseError::InvalidParameter {
                verb: "MODE",
                param,
            })?;
            Command::Mode(mode)
        }
        "TYPE" => Command::Type(parse_type(&required("TYPE", param)?)?),
        "STRU" => {
            let param = required("STRU", param)?;
            let stru = FileStructure::from_code(&param).ok_or(ParseError::InvalidParameter {
                verb: "STRU",
                param,
            })?;
            Command::Stru(stru)
        }
        "RETR" => Command::Retr(required("RETR", param)?),
        "STOR" => Command::Stor(required("STOR", param)?),
        _ => Command::Unknown(verb.to_string()),
    };
    Ok(Some(command))
}

fn required(verb: &'static str, param: &str) -> Result<String, ParseError> {
    let param = param.trim();
    if param.is_empty() {
        Err(ParseError::MissingParameter(verb))
    } else {
        Ok(param.to_string())
    }
}

/// `A`, `A N` -> ASCII; `I`, `L 8` -> binary. EBCDIC and other byte sizes are
/// recognized but unsupported.
fn parse_type(param: &str) -> Result<DataType, ParseError> {
    let upper = param.to_ascii_uppercase();
    let mut tokens = upper.split_whitespace();
    let unsupported = || ParseError::UnsupportedParameter {
        verb: "TYPE",
        param: param.to_string(),
    };
    let invalid = || ParseError::InvalidParameter {
        verb: "TYPE",
        param: param.to_string(),
    };

    let data_type = match (tokens.next(), tokens.next()) {
        (Some("A"), None | Some("N")) => DataType::Ascii,
        (Some("A"), Some("T" | "C")) => return Err(unsupported()),
        (Some("I"), None) => DataType::Binary,
        (Some("L"), Some("8")) => DataType::Binary,
        (Some("L"), Some(_)) => return Err(unsupported()),
        (Some("E"), _) => return Err(unsupported()),
        _ => return Err(invalid()),
    };
    if tokens.next().is_some() {
        return Err(invalid());
    }
    Ok(data_type)
}

/// Parses `h1,h2,h3,h4,p1,p2` into an IPv4 socket address with port
/// `p1 * 256 + p2`.
pub fn parse_host_port(param: &str) -> Result<SocketAddrV4, ParseError> {
    let invalid = || ParseError::InvalidHostPort(param.to_string());
    let octets = param
        .split(',')
        .map(|part| part.trim().parse::<u8>())
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|_| invalid())?;
    let [h1, h2, h3, h4, p1, p2] = octets[..] else {
        return Err(invalid());
    };
    Ok(SocketAddrV4::new(
        Ipv4Addr::new(h1, h2, h3, h4),
        u16::from(p1) * 256 + u16::from(p2),
    ))
}

/// Formats an IPv4 socket address as `h1,h2,h3,h4,p1,p2`.
pub fn format_host_port(addr: SocketAddrV4) -> String {
    let [h1, h2, h3, h4] = addr.ip().octets();
    let [p1, p2] = addr.port().to_be_bytes();
    format!("{h1},{h2},{h3},{h4},{p1},{p2}")
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::User(name) => write!(f, "USER {name}"),
            Command::Pass(password) => write!(f, "PASS {password}"),
            Command::Port(addr) => write!(f, "PORT {}", format_host_port(*addr)),
            Command::Mode(mode) => write!(f, "MODE {mode}"),
            Command::Type(data_type) => write!(f, "TYPE {data_type}"),
            Command::Stru(stru) => write!(f, "STRU {stru}"),
            Command::Retr(path) => write!(f, "RETR {path}"),
            Command::Stor(path) => write!(f, "STOR {path}"),
            other => write!(f, "{}", other.verb()),
        }
    }
}
