//! Central error types for the XBIS codec.
//!
//! Alle Fehler werden synchron an den Aufrufer gemeldet; der Codec macht
//! keine Retries. Nach einem Fehler ist der Instanz-Zustand undefiniert,
//! bis `reset()` aufgerufen wird.

use core::fmt;
use std::borrow::Cow;

/// All error conditions surfaced by the encoder and decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The underlying byte sink or source failed.
    Io(String),
    /// The stream does not start with the XBIS magic sequence.
    InvalidMagic([u8; 4]),
    /// The format version byte is not one this codec understands.
    UnsupportedVersion(u8),
    /// A lead byte matched none of the node flag families and no discrete
    /// node type.
    UnknownNodeType(u8),
    /// A handle reference points past the end of its dictionary.
    ///
    /// Handles werden strikt in Definitionsreihenfolge vergeben; eine
    /// Referenz vor der Definition ist immer ein Stream-Fehler.
    HandleOutOfRange { handle: u64, defined: usize },
    /// The input ended in the middle of a node record.
    PrematureEndOfStream,
    /// A variable-length value does not fit in 64 bits.
    IntegerOverflow,
    /// A string length prefix decoded to the reserved zero value.
    InvalidStringLength,
    /// A string payload is not valid UTF-8.
    InvalidUtf8,
    /// A reader accessor or writer operation was invoked in a state where it
    /// is undefined (e.g. attribute queries outside START_TAG).
    IllegalState(Cow<'static, str>),
    /// The push-writer surface was asked to emit a node kind outside this
    /// codec's event surface (entity refs, doctype, PI).
    UnsupportedOperation(Cow<'static, str>),
    /// XML parsing failed in the adapter layer.
    XmlParse(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::InvalidMagic(bytes) => {
                write!(f, "not an XBIS stream (magic {bytes:02x?})")
            }
            Self::UnsupportedVersion(v) => write!(f, "unsupported XBIS version {v}"),
            Self::UnknownNodeType(lead) => write!(f, "unknown node type {lead}"),
            Self::HandleOutOfRange { handle, defined } => {
                write!(f, "handle {handle} out of range ({defined} defined)")
            }
            Self::PrematureEndOfStream => write!(f, "premature end of XBIS stream"),
            Self::IntegerOverflow => write!(f, "variable-length value overflow"),
            Self::InvalidStringLength => write!(f, "invalid string length prefix"),
            Self::InvalidUtf8 => write!(f, "string payload is not valid UTF-8"),
            Self::IllegalState(msg) => write!(f, "illegal state: {msg}"),
            Self::UnsupportedOperation(msg) => write!(f, "unsupported operation: {msg}"),
            Self::XmlParse(msg) => write!(f, "XML parse error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl Error {
    /// Erstellt einen `IllegalState` Fehler mit Kontext.
    pub fn illegal_state(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::IllegalState(msg.into())
    }

    /// Erstellt einen `UnsupportedOperation` Fehler mit Kontext.
    pub fn unsupported(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedOperation(msg.into())
    }
}

/// A convenience `Result` type alias using [`Error`].
pub type Result<T> = core::result::Result<T, Error>;
