//! Frame trait and parse/render dispatch.
//!
//! Frames are heterogeneous enough (plain text, key/value text, binary with
//! a description, pictures, counters...) that a trait object is a better
//! fit than one large enum, the same call the teacher codebase made. The
//! downcasting helpers on `dyn Frame` let [`crate::formats::id3v2::mod`]
//! bridge specific frame kinds onto the format-neutral [`crate::value::TagValue`]
//! model without every caller needing to match on frame kind themselves.

mod comments;
mod counter;
mod picture;
pub(crate) mod text;
mod url;

pub use comments::CommentsFrame;
pub use counter::{PlayCounterFrame, PopularimeterFrame};
pub use picture::AttachedPictureFrame;
pub use text::{TextFrame, UserTextFrame};
pub use url::{UrlFrame, UserUrlFrame};

use crate::formats::id3v2::frame::{FrameHeader, FrameId};
use crate::formats::id3v2::header::{TagHeader, Version};
use crate::formats::id3v2::syncdata;
use crate::string::Encoding;
use dyn_clone::DynClone;
use std::any::Any;
use std::fmt::{Debug, Display};

pub trait Frame: Display + Debug + DynClone {
    fn id(&self) -> FrameId;

    /// The "key" this frame occupies in a [`crate::formats::id3v2::collections::FrameMap`].
    /// Equal to the frame ID for singleton frame kinds; includes a
    /// description/language for frames that can legally repeat (`COMM`,
    /// `TXXX`, `APIC`, ...).
    fn key(&self) -> String;

    fn is_empty(&self) -> bool;

    fn render(&self, tag_header: &TagHeader) -> Vec<u8>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

dyn_clone::clone_trait_object!(Frame);

impl dyn Frame {
    pub fn is<T: Frame + 'static>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Frame + 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Frame + 'static>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

/// A frame this crate doesn't have a specialized type for, kept around
/// verbatim so a round-trip tag write doesn't silently drop it.
#[derive(Debug, Clone)]
pub struct UnknownFrame {
    id: FrameId,
    data: Vec<u8>,
}

impl UnknownFrame {
    pub fn new(id: FrameId, data: Vec<u8>) -> Self {
        UnknownFrame { id, data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Display for UnknownFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "<{} bytes>", self.data.len())
    }
}

impl Frame for UnknownFrame {
    fn id(&self) -> FrameId {
        self.id
    }

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn render(&self, _tag_header: &TagHeader) -> Vec<u8> {
        self.data.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The result of attempting to parse one frame out of a tag body.
pub enum ParsedFrame {
    Frame(Box<dyn Frame>),
    Unknown(UnknownFrame),
    /// A zero-size "frame" used as padding; the stream has already been
    /// advanced past it.
    Padding,
}

/// Parses one frame at the stream's current position. On success the
/// stream is left positioned right after the frame.
pub fn parse(
    tag_header: &TagHeader,
    stream: &mut crate::core::io::BufStream,
) -> crate::error::Result<ParsedFrame> {
    let version = tag_header.version();
    let remaining = stream.remaining_slice();

    if remaining.len() < 10 || remaining[0] == 0 {
        return Ok(ParsedFrame::Padding);
    }

    let header = FrameHeader::parse(version, remaining)?;
    stream.skip(10)?;

    let mut data = stream.slice(header.size())?.to_vec();

    if header.flags().unsync && version == Version::V24 {
        data = syncdata::decode(&mut crate::core::io::BufStream::new(&data));
    }

    let body = crate::core::io::BufStream::new(&data);
    let frame = build_frame(header.id(), body);

    Ok(match frame {
        Some(frame) => ParsedFrame::Frame(frame),
        None => ParsedFrame::Unknown(UnknownFrame::new(header.id(), data)),
    })
}

fn build_frame(id: FrameId, mut stream: crate::core::io::BufStream) -> Option<Box<dyn Frame>> {
    let id_bytes = id.as_bytes();

    if id.is_text() {
        return TextFrame::parse(id, &mut stream).ok().map(|f| Box::new(f) as Box<dyn Frame>);
    }

    if id.is_url() {
        return UrlFrame::parse(id, &mut stream).ok().map(|f| Box::new(f) as Box<dyn Frame>);
    }

    match id_bytes {
        b"TXXX" => UserTextFrame::parse(&mut stream).ok().map(|f| Box::new(f) as Box<dyn Frame>),
        b"WXXX" => UserUrlFrame::parse(&mut stream).ok().map(|f| Box::new(f) as Box<dyn Frame>),
        b"COMM" | b"USLT" => {
            CommentsFrame::parse(id, &mut stream).ok().map(|f| Box::new(f) as Box<dyn Frame>)
        }
        b"APIC" => {
            AttachedPictureFrame::parse(&mut stream).ok().map(|f| Box::new(f) as Box<dyn Frame>)
        }
        b"PCNT" => PlayCounterFrame::parse(&mut stream).ok().map(|f| Box::new(f) as Box<dyn Frame>),
        b"POPM" => PopularimeterFrame::parse(&mut stream).ok().map(|f| Box::new(f) as Box<dyn Frame>),
        _ => None,
    }
}

pub fn render_unknown(tag_header: &TagHeader, frame: &UnknownFrame) -> Vec<u8> {
    render_frame_bytes(tag_header, frame.id(), frame.data.clone())
}

pub fn render_frame(tag_header: &TagHeader, frame: &dyn Frame) -> Vec<u8> {
    render_frame_bytes(tag_header, frame.id(), frame.render(tag_header))
}

fn render_frame_bytes(tag_header: &TagHeader, id: FrameId, data: Vec<u8>) -> Vec<u8> {
    let mut header = FrameHeader::new(id);
    *header.size_mut() = data.len();

    let mut out = header.render(tag_header.version()).to_vec();
    out.extend(data);
    out
}

pub(super) fn default_encoding() -> Encoding {
    Encoding::Utf8
}
