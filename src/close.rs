use std::fmt;

/// Symbolic close codes this core knows the name of.
///
/// Per the RFC 6455 status code registry this intentionally omits 1004,
/// 1005, 1006 and 1015 — those are reserved/pseudo codes that never appear
/// on the wire. An unknown wire value decodes to [`CloseCode::Other`],
/// which still carries the numeric value forward; no attempt is made to
/// validate it against the IANA registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// 1000 — normal closure.
    Normal,
    /// 1001 — endpoint going away.
    GoingAway,
    /// 1002 — protocol error.
    ProtocolError,
    /// 1003 — received a data type it cannot accept.
    Unacceptable,
    /// 1007 — received data inconsistent with the message type (e.g. non-UTF-8 text).
    Malformed,
    /// 1008 — generic policy violation.
    PolicyViolation,
    /// 1009 — message too big to process.
    TooBig,
    /// 1010 — client expected an extension the server didn't negotiate.
    MissingExtension,
    /// 1011 — server encountered an unexpected condition.
    UnexpectedError,
    /// Any other numeric close code, named or not.
    Other(u16),
}

impl CloseCode {
    /// The wire value for this code.
    pub fn as_u16(self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::Unacceptable => 1003,
            CloseCode::Malformed => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::TooBig => 1009,
            CloseCode::MissingExtension => 1010,
            CloseCode::UnexpectedError => 1011,
            CloseCode::Other(code) => code,
        }
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::Unacceptable,
            1007 => CloseCode::Malformed,
            1008 => CloseCode::PolicyViolation,
            1009 => CloseCode::TooBig,
            1010 => CloseCode::MissingExtension,
            1011 => CloseCode::UnexpectedError,
            other => CloseCode::Other(other),
        }
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> u16 {
        code.as_u16()
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CloseCode::Normal => "NORMAL",
            CloseCode::GoingAway => "GOING_AWAY",
            CloseCode::ProtocolError => "PROTOCOL_ERROR",
            CloseCode::Unacceptable => "UNACCEPTABLE",
            CloseCode::Malformed => "MALFORMED",
            CloseCode::PolicyViolation => "POLICY_VIOLATION",
            CloseCode::TooBig => "TOO_BIG",
            CloseCode::MissingExtension => "MISSING_EXTENSION",
            CloseCode::UnexpectedError => "UNEXPECTED_ERROR",
            CloseCode::Other(code) => return write!(f, "{code}"),
        };
        write!(f, "{name}")
    }
}
