//! tagkit is a format-neutral library for reading and rewriting metadata tags
//! embedded in media container files.
//!
//! The crate is built around three layers:
//!
//! - A generic [`element`] tree that models the nested, length-prefixed
//!   structures found in MP4/ISOBMFF, Matroska/EBML, Ogg, FLAC, and ID3v2,
//!   specialized per format in [`formats`].
//! - A format-neutral [`tag`] and [`value`] model, so callers can read and
//!   write "the artist" without caring whether the underlying bytes are an
//!   ID3v2 `TPE1` frame, an MP4 `©ART` atom, or a Vorbis `ARTIST` comment.
//! - A [`rewriter`] that knows how to patch a tag back into a file in place
//!   when there is room, or perform a full rewrite when there is not,
//!   honoring padding and tag-position policy along the way.
//!
//! [`file::MediaFile`] ties these together into the main entry point most
//! callers will want.

#![forbid(unsafe_code)]

#[macro_use]
mod core;

pub mod chapter;
pub mod container;
pub mod diag;
pub mod element;
pub mod error;
pub mod file;
pub mod formats;
pub mod progress;
pub mod rewriter;
pub mod string;
pub mod tag;
pub mod track;
pub mod value;

pub use chapter::{Attachment, Chapter, Edition};
pub use error::{Error, Result};
pub use file::MediaFile;
pub use tag::{Tag, TagTarget};
pub use value::{KnownField, TagValue};
