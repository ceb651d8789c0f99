//! `APIC` (attached picture) frames.

use crate::core::io::BufStream;
use crate::error::Result;
use crate::formats::id3v2::frame::FrameId;
use crate::formats::id3v2::frames::Frame;
use crate::formats::id3v2::header::TagHeader;
use crate::string::{self, Encoding};
use crate::value::PictureType;
use std::any::Any;
use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone)]
pub struct AttachedPictureFrame {
    pub encoding: Encoding,
    pub mime: String,
    pub kind: PictureType,
    pub description: String,
    pub data: Vec<u8>,
}

impl AttachedPictureFrame {
    pub fn new() -> Self {
        AttachedPictureFrame {
            encoding: Encoding::default(),
            mime: "image/jpeg".to_string(),
            kind: PictureType::CoverFront,
            description: String::new(),
            data: Vec::new(),
        }
    }

    pub fn parse(stream: &mut BufStream) -> Result<Self> {
        let encoding = match stream.read_u8()? {
            0 => Encoding::Latin1,
            1 => Encoding::Utf16,
            2 => Encoding::Utf16Be,
            3 => Encoding::Utf8,
            _ => Encoding::Latin1,
        };

        let mime = string::read_terminated(Encoding::Latin1, stream);
        let kind = PictureType::parse(stream.read_u8()?);
        let description = string::read_terminated(encoding, stream);
        let data = stream.take_rest().to_vec();

        Ok(AttachedPictureFrame { encoding, mime, kind, description, data })
    }
}

impl Default for AttachedPictureFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for AttachedPictureFrame {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "<{} picture, {} bytes>", self.mime, self.data.len())
    }
}

impl Frame for AttachedPictureFrame {
    fn id(&self) -> FrameId {
        FrameId::new(b"APIC")
    }

    fn key(&self) -> String {
        format!("APIC:{}:{}", self.kind.as_byte(), self.description)
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn render(&self, _tag_header: &TagHeader) -> Vec<u8> {
        let mut out = vec![encoding_byte(self.encoding)];
        out.extend(string::render_terminated(Encoding::Latin1, &self.mime));
        out.push(self.kind.as_byte());
        out.extend(string::render_terminated(self.encoding, &self.description));
        out.extend(&self.data);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cover_art() {
        let mut data = vec![0u8]; // Latin1
        data.extend(b"image/png\0");
        data.push(3); // CoverFront
        data.extend(b"cover\0");
        data.extend(&[0x89, 0x50, 0x4E, 0x47]); // PNG magic, truncated

        let mut stream = BufStream::new(&data);
        let frame = AttachedPictureFrame::parse(&mut stream).unwrap();

        assert_eq!(frame.mime, "image/png");
        assert_eq!(frame.kind, PictureType::CoverFront);
        assert_eq!(frame.description, "cover");
        assert_eq!(frame.data, vec![0x89, 0x50, 0x4E, 0x47]);
    }

    #[test]
    fn round_trips_through_render() {
        let mut frame = AttachedPictureFrame::new();
        frame.description = "front".into();
        frame.data = vec![1, 2, 3, 4];

        let rendered = frame.render(&TagHeader::with_version(crate::formats::id3v2::header::Version::V24));
        let mut stream = BufStream::new(&rendered);
        let parsed = AttachedPictureFrame::parse(&mut stream).unwrap();

        assert_eq!(parsed.description, "front");
        assert_eq!(parsed.data, vec![1, 2, 3, 4]);
    }
}
