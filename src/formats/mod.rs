//! Per-format element specializations and tag codecs.
//!
//! Every submodule here implements [`crate::element::ElementCodec`] (where
//! the format has a nested tree at all) and a concrete [`crate::tag::Tag`],
//! plus a `parse`/`render` pair the top-level [`crate::container`] module
//! dispatches to once it has sniffed which format it's looking at.

pub mod flac;
pub mod id3v1;
pub mod id3v2;
pub mod mkv;
pub mod mp4;
pub mod ogg;
pub mod vorbis;
