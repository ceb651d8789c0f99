//! Crate-wide error type.
//!
//! Parsing and rewriting can fail for a lot of unrelated reasons -- a
//! truncated file, a container that claims a size it doesn't have, an I/O
//! error from the filesystem -- so `Error` stays a flat enum rather than a
//! tree of per-format error types. Specific, low-level detail about *why*
//! a parse failed belongs in [`crate::diag`], not in this type.

use crate::core::io::StreamError;
use std::error;
use std::fmt::{self, Display, Formatter};
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Generic I/O failure opening, reading, or writing a file.
    Io(io::Error),
    /// The file's contents did not match the expected container format.
    MalformedData,
    /// The element or field is valid but not something this crate parses.
    Unsupported,
    /// No tag of the requested kind was found in the container.
    NotFound,
    /// A rewrite could not be completed because the new tag did not fit
    /// within the limits the caller configured (e.g. `max_padding`).
    WontFit,
    /// The operation was cancelled via a [`crate::progress::AbortToken`].
    Aborted,
    /// A value could not be converted into a form the tag format can store
    /// (e.g. text that can't be represented in any encoding a given ID3v2
    /// version supports).
    Conversion,
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<StreamError> for Error {
    fn from(_: StreamError) -> Self {
        Error::MalformedData
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => err.fmt(f),
            Error::MalformedData => write!(f, "malformed container data"),
            Error::Unsupported => write!(f, "unsupported element or field"),
            Error::NotFound => write!(f, "no tag found"),
            Error::WontFit => write!(f, "new tag does not fit within the configured padding limits"),
            Error::Aborted => write!(f, "operation aborted"),
            Error::Conversion => write!(f, "value could not be converted into a form this tag format supports"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}
