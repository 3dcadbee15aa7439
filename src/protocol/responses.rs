//! FTP Response handling
//!
//! Maps semantic outcomes to their three-digit reply code and canonical text,
//! and parses reply lines received by the client driver.

use std::fmt;

use crate::error::ParseError;

/// Every outcome the server can report on the control connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ready,
    UsernameOk,
    LoginProceed,
    NeedAccount,
    NeedAccountToStore,
    NotLoggedIn,
    BadSequence,
    CommandOk,
    SyntaxError,
    CommandTooLong,
    ParameterSyntaxError,
    NotImplemented,
    ModeNotSupported,
    AboutToOpen,
    AlreadyOpen,
    TransferComplete,
    Closing,
    EnteringPassive,
    ServiceUnavailable,
    CantOpenData,
    TransferAborted,
    FileUnavailable,
}

impl Outcome {
    pub const fn code(self) -> u16 {
        match self {
            Outcome::AlreadyOpen => 125,
            Outcome::AboutToOpen => 150,
            Outcome::CommandOk => 200,
            Outcome::Ready => 220,
            Outcome::Closing => 221,
            Outcome::EnteringPassive => 227,
            Outcome::LoginProceed => 230,
            Outcome::TransferComplete => 250,
            Outcome::UsernameOk => 331,
            Outcome::NeedAccount => 332,
            Outcome::ServiceUnavailable => 421,
            Outcome::CantOpenData => 425,
            Outcome::TransferAborted => 426,
            Outcome::SyntaxError | Outcome::CommandTooLong => 500,
            Outcome::ParameterSyntaxError => 501,
            Outcome::NotImplemented => 502,
            Outcome::BadSequence => 503,
            Outcome::ModeNotSupported => 504,
            Outcome::NotLoggedIn => 530,
            Outcome::NeedAccountToStore => 532,
            Outcome::FileUnavailable => 550,
        }
    }

    pub const fn text(self) -> &'static str {
        match self {
            Outcome::Ready => "Service ready for new user.",
            Outcome::UsernameOk => "User name okay, need password.",
            Outcome::LoginProceed => "User logged in, proceed.",
            Outcome::NeedAccount => "Need account for login.",
            Outcome::NeedAccountToStore => "Need account for storing files.",
            Outcome::NotLoggedIn => "Not logged in.",
            Outcome::BadSequence => "Bad sequence of commands.",
            Outcome::CommandOk => "Command okay.",
            Outcome::SyntaxError => "Syntax error, command unrecognized.",
            Outcome::CommandTooLong => "Command line too long.",
            Outcome::ParameterSyntaxError => "Syntax error in parameters or arguments.",
            Outcome::NotImplemented => "Command not implemented.",
            Outcome::ModeNotSupported => "Command not implemented for that parameter.",
            Outcome::AboutToOpen => "File status okay; about to open data connection.",
            Outcome::AlreadyOpen => "Data connection already open; transfer starting.",
            Outcome::TransferComplete => "Requested file action okay, completed.",
            Outcome::Closing => "Service closing control connection.",
            Outcome::EnteringPassive => "Entering Passive Mode.",
            Outcome::ServiceUnavailable => "Too many connections. Try again later.",
            Outcome::CantOpenData => "Can't open data connection.",
            Outcome::TransferAborted => "Connection closed; transfer aborted.",
            Outcome::FileUnavailable => "Requested action not taken. File unavailable.",
        }
    }
}

/// Looks up the reply code and canonical text for an outcome.
pub fn code_for(outcome: Outcome) -> (u16, &'static str) {
    (outcome.code(), outcome.text())
}

/// A single reply line: `<code> <text>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub text: String,
}

impl Reply {
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }

    /// Reply with the outcome's code but a custom text (e.g. the PASV address).
    pub fn with_text(outcome: Outcome, text: impl Into<String>) -> Self {
        Self::new(outcome.code(), text)
    }

    /// First digit of the code: 1 preliminary, 2 completion, 3 intermediate,
    /// 4 transient negative, 5 permanent negative.
    pub fn class(&self) -> u16 {
        self.code / 100
    }

    pub fn is(&self, outcome: Outcome) -> bool {
        self.code == outcome.code()
    }

    /// Parses a reply line. A dash after the code marks the first line of a
    /// multi-line reply; the caller keeps reading until the closing line.
    pub fn parse(line: &str) -> Result<(Reply, bool), ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let malformed = || ParseError::MalformedReply(line.to_string());

        let code_str = line.get(0..3).ok_or_else(malformed)?;
        if !code_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let code: u16 = code_str.parse().map_err(|_| malformed())?;
        if !(100..=599).contains(&code) {
            return Err(malformed());
        }

        let continued = match line.as_bytes().get(3) {
            None | Some(b' ') => false,
            Some(b'-') => true,
            Some(_) => return Err(malformed()),
        };
        let text = line.get(4..).unwrap_or("").to_string();
        Ok((Reply { code, text }, continued))
    }
}

impl From<Outcome> for Reply {
    fn from(outcome: Outcome) -> Self {
        Reply::new(outcome.code(), outcome.text())
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.text.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} {}", self.code, self.text)
        }
    }
}
