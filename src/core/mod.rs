//! Shared, format-agnostic byte plumbing used by every codec in [`crate::formats`].

#[macro_use]
pub(crate) mod macros;
pub(crate) mod io;
pub(crate) mod raw;

pub use io::{write_replaced, BufStream, StreamError};
