//! Text information frames (`T???`) and user-defined text frames (`TXXX`).

use crate::core::io::BufStream;
use crate::error::{Error, Result};
use crate::formats::id3v2::frame::FrameId;
use crate::formats::id3v2::frames::Frame;
use crate::formats::id3v2::header::{TagHeader, Version};
use crate::string::{self, Encoding};
use std::any::Any;
use std::fmt::{self, Display, Formatter};

/// A text information frame. ID3v2 allows a single text frame to carry
/// multiple null-separated values (ID3v2.4) or, more commonly in the wild,
/// just one.
#[derive(Debug, Clone)]
pub struct TextFrame {
    id: FrameId,
    pub encoding: Encoding,
    pub text: Vec<String>,
}

impl TextFrame {
    pub fn new(id: FrameId) -> Self {
        TextFrame { id, encoding: Encoding::default(), text: Vec::new() }
    }

    /// Changes this frame's ID in place, used when a frame is renamed
    /// across ID3v2 versions (e.g. `TORY` -> `TDOR`).
    pub fn set_id(&mut self, id: FrameId) {
        self.id = id;
    }

    pub fn parse(id: FrameId, stream: &mut BufStream) -> Result<Self> {
        let encoding = parse_encoding(stream)?;
        let raw = stream.take_rest().to_vec();
        let text = split_values(encoding, &raw);

        Ok(TextFrame { id, encoding, text })
    }
}

/// ID3v2.4 allows a text frame to carry several values, NUL-separated; in
/// practice most taggers write just one.
fn split_values(encoding: Encoding, raw: &[u8]) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }

    let mut values = Vec::new();
    let mut stream = BufStream::new(raw);

    while !stream.is_empty() {
        values.push(string::read_terminated(encoding, &mut stream));
    }

    values
}

fn parse_encoding(stream: &mut BufStream) -> Result<Encoding> {
    match stream.read_u8()? {
        0 => Ok(Encoding::Latin1),
        1 => Ok(Encoding::Utf16),
        2 => Ok(Encoding::Utf16Be),
        3 => Ok(Encoding::Utf8),
        _ => Err(Error::MalformedData),
    }
}

impl Display for TextFrame {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.text.join("/"))
    }
}

impl Frame for TextFrame {
    fn id(&self) -> FrameId {
        self.id
    }

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn is_empty(&self) -> bool {
        self.text.is_empty() || self.text.iter().all(|s| s.is_empty())
    }

    fn render(&self, tag_header: &TagHeader) -> Vec<u8> {
        let encoding = safe_encoding(self.encoding, tag_header.version());
        let mut out = vec![encoding_byte(encoding)];

        for (i, value) in self.text.iter().enumerate() {
            if i > 0 {
                out.extend(vec![0; encoding.nul_size()]);
            }
            out.extend(string::render(encoding, value));
        }

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
        Encoding::Utf16 => 1,
        Encoding::Utf16Be => 2,
        Encoding::Utf8 => 3,
        Encoding::Utf16Le => 1,
    }
}

/// The encoding that should actually be written for `encoding` at `version`.
/// ID3v2.2 and ID3v2.3 have no encoding byte for UTF-8 or big-endian UTF-16,
/// so both get promoted to `Utf16` (UTF-16LE with a leading BOM), the
/// widest encoding every version can represent.
pub(crate) fn safe_encoding(encoding: Encoding, version: Version) -> Encoding {
    if version <= Version::V23 && matches!(encoding, Encoding::Utf8 | Encoding::Utf16Be) {
        Encoding::Utf16
    } else {
        encoding
    }
}

/// A `TXXX` frame: a user-defined key, and one or more text values.
#[derive(Debug, Clone)]
pub struct UserTextFrame {
    pub encoding: Encoding,
    pub description: String,
    pub text: Vec<String>,
}

impl UserTextFrame {
    pub fn new(description: impl Into<String>) -> Self {
        UserTextFrame { encoding: Encoding::default(), description: description.into(), text: Vec::new() }
    }

    pub fn parse(stream: &mut BufStream) -> Result<Self> {
        let encoding = parse_encoding(stream)?;
        let description = string::read_terminated(encoding, stream);
        let raw = stream.take_rest().to_vec();
        let text = split_values(encoding, &raw);

        Ok(UserTextFrame { encoding, description, text })
    }
}

impl Display for UserTextFrame {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.text.join("/"))
    }
}

impl Frame for UserTextFrame {
    fn id(&self) -> FrameId {
        FrameId::new(b"TXXX")
    }

    fn key(&self) -> String {
        format!("TXXX:{}", self.description)
    }

    fn is_empty(&self) -> bool {
        self.text.is_empty() || self.text.iter().all(|s| s.is_empty())
    }

    fn render(&self, tag_header: &TagHeader) -> Vec<u8> {
        let encoding = safe_encoding(self.encoding, tag_header.version());
        let mut out = vec![encoding_byte(encoding)];
        out.extend(string::render_terminated(encoding, &self.description));

        for (i, value) in self.text.iter().enumerate() {
            if i > 0 {
                out.extend(vec![0; encoding.nul_size()]);
            }
            out.extend(string::render(encoding, value));
        }

        out
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
