use std::{fmt, io, num::{ParseFloatError, ParseIntError}, str::Utf8Error};
use quick_xml::events::attributes::AttrError;

/// The two failure kinds callers are expected to report, plus everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Place could not be geocoded, no network exists, or no POIs were found.
    Lookup,
    /// Structurally impossible input, e.g. an empty graph.
    InvalidArgument,
    Other,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
}

impl Error {
    pub fn lookup(message: impl Into<String>) -> Self {
        Error {
            kind: ErrorKind::Lookup,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error {
            kind: ErrorKind::InvalidArgument,
            message: message.into(),
        }
    }

    /// Lookup and invalid-argument failures are user-facing; the rest is unexpected.
    pub fn is_user_facing(&self) -> bool {
        self.kind != ErrorKind::Other
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        value.to_string().into()
    }
}

impl From<quick_xml::Error> for Error {
    fn from(value: quick_xml::Error) -> Self {
        value.to_string().into()
    }
}

impl From<ParseFloatError> for Error {
    fn from(value: ParseFloatError) -> Self {
        value.to_string().into()
    }
}

impl From<ParseIntError> for Error {
    fn from(value: ParseIntError) -> Self {
        value.to_string().into()
    }
}

impl From<AttrError> for Error {
    fn from(value: AttrError) -> Self {
        value.to_string().into()
    }
}

impl From<Utf8Error> for Error {
    fn from(value: Utf8Error) -> Self {
        value.to_string().into()
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        value.to_string().into()
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        value.to_string().into()
    }
}

impl From<regex::Error> for Error {
    fn from(value: regex::Error) -> Self {
        value.to_string().into()
    }
}

impl From<&str> for Error {
    fn from(value: &str) -> Self {
        value.to_string().into()
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Error {
            kind: ErrorKind::Other,
            message: value,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreign_errors_are_unexpected() {
        let err: Error = "boom".parse::<f64>().unwrap_err().into();
        assert_eq!(err.kind, ErrorKind::Other);
        assert!(!err.is_user_facing());
    }

    #[test]
    fn lookup_and_invalid_argument_are_user_facing() {
        assert!(Error::lookup("no such place").is_user_facing());
        assert!(Error::invalid_argument("empty graph").is_user_facing());
        assert_eq!(Error::lookup("no such place").to_string(), "no such place");
    }
}
