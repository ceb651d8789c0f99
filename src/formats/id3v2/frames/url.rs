//! URL link frames (`W???`) and the user-defined `WXXX` frame.

use crate::core::io::BufStream;
use crate::error::Result;
use crate::formats::id3v2::frame::FrameId;
use crate::formats::id3v2::frames::Frame;
use crate::formats::id3v2::header::TagHeader;
use crate::string::{self, Encoding};
use std::any::Any;
use std::fmt::{self, Display, Formatter};

/// A URL link frame. Unlike text frames, these are always Latin1 and never
/// carry an encoding byte.
#[derive(Debug, Clone)]
pub struct UrlFrame {
    id: FrameId,
    pub url: String,
}

impl UrlFrame {
    pub fn new(id: FrameId) -> Self {
        UrlFrame { id, url: String::new() }
    }

    pub fn parse(id: FrameId, stream: &mut BufStream) -> Result<Self> {
        let url = string::read_utf8(stream.take_rest()).trim_end_matches('\0').to_string();
        Ok(UrlFrame { id, url })
    }
}

impl Display for UrlFrame {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

impl Frame for UrlFrame {
    fn id(&self) -> FrameId {
        self.id
    }

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn is_empty(&self) -> bool {
        self.url.is_empty()
    }

    fn render(&self, _tag_header: &TagHeader) -> Vec<u8> {
        self.url.as_bytes().to_vec()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A `WXXX` frame: a user-defined key, and a Latin1 URL.
#[derive(Debug, Clone)]
pub struct UserUrlFrame {
    pub encoding: Encoding,
    pub description: String,
    pub url: String,
}

impl UserUrlFrame {
    pub fn new(description: impl Into<String>) -> Self {
        UserUrlFrame { encoding: Encoding::default(), description: description.into(), url: String::new() }
    }

    pub fn parse(stream: &mut BufStream) -> Result<Self> {
        let encoding = match stream.read_u8()? {
            0 => Encoding::Latin1,
            1 => Encoding::Utf16,
            2 => Encoding::Utf16Be,
            3 => Encoding::Utf8,
            _ => Encoding::Latin1,
        };

        let description = string::read_terminated(encoding, stream);
        let url = string::read_utf8(stream.take_rest()).trim_end_matches('\0').to_string();

        Ok(UserUrlFrame { encoding, description, url })
    }
}

impl Display for UserUrlFrame {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

impl Frame for UserUrlFrame {
    fn id(&self) -> FrameId {
        FrameId::new(b"WXXX")
    }

    fn key(&self) -> String {
        format!("WXXX:{}", self.description)
    }

    fn is_empty(&self) -> bool {
        self.url.is_empty()
    }

    fn render(&self, _tag_header: &TagHeader) -> Vec<u8> {
        let mut out = vec![encoding_byte(self.encoding)];
        out.extend(string::render_terminated(self.encoding, &self.description));
        out.extend(self.url.as_bytes());
        out
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn encoding_byte(encoding: Encoding) -> u8 {
    match encoding {
        Encoding::Latin1 => 0,
        Encoding::Utf16 | Encoding::Utf16Le => 1,
        Encoding::Utf16Be => 2,
        Encoding::Utf8 => 3,
    }
}
