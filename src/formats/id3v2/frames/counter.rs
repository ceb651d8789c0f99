//! `PCNT` (play counter) and `POPM` (popularimeter) frames.

use crate::core::io::BufStream;
use crate::error::Result;
use crate::formats::id3v2::frame::FrameId;
use crate::formats::id3v2::frames::Frame;
use crate::formats::id3v2::header::TagHeader;
use crate::string;
use std::any::Any;
use std::fmt::{self, Display, Formatter};

/// `PCNT`: a single counter, stored as a variable-length big-endian
/// integer that is allowed to grow past 32 bits.
#[derive(Debug, Clone, Default)]
pub struct PlayCounterFrame {
    pub count: u64,
}

impl PlayCounterFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(stream: &mut BufStream) -> Result<Self> {
        let bytes = stream.take_rest();
        let mut count: u64 = 0;

        for &byte in bytes {
            count = (count << 8) | u64::from(byte);
        }

        Ok(PlayCounterFrame { count })
    }
}

impl Display for PlayCounterFrame {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.count)
    }
}

impl Frame for PlayCounterFrame {
    fn id(&self) -> FrameId {
        FrameId::new(b"PCNT")
    }

    fn key(&self) -> String {
        "PCNT".to_string()
    }

    fn is_empty(&self) -> bool {
        false
    }

    fn render(&self, _tag_header: &TagHeader) -> Vec<u8> {
        // Always render at least 4 bytes, growing only if the count
        // overflows a u32, per the format's variable-length rule.
        let mut bytes = self.count.to_be_bytes().to_vec();
        while bytes.len() > 4 && bytes[0] == 0 {
            bytes.remove(0);
        }
        bytes
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// `POPM`: an email identifying the rating source, a 0-255 rating, and an
/// optional play counter shared with `PCNT`'s semantics.
#[derive(Debug, Clone)]
pub struct PopularimeterFrame {
    pub email: String,
    pub rating: u8,
    pub count: u64,
}

impl PopularimeterFrame {
    pub fn new(email: impl Into<String>) -> Self {
        PopularimeterFrame { email: email.into(), rating: 0, count: 0 }
    }

    pub fn parse(stream: &mut BufStream) -> Result<Self> {
        let email = string::read_terminated(crate::string::Encoding::Latin1, stream);
        let rating = stream.read_u8()?;

        let remainder = stream.take_rest();
        let mut count: u64 = 0;
        for &byte in remainder {
            count = (count << 8) | u64::from(byte);
        }

        Ok(PopularimeterFrame { email, rating, count })
    }
}

impl Display for PopularimeterFrame {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}/255 ({})", self.rating, self.email)
    }
}

impl Frame for PopularimeterFrame {
    fn id(&self) -> FrameId {
        FrameId::new(b"POPM")
    }

    fn key(&self) -> String {
        format!("POPM:{}", self.email)
    }

    fn is_empty(&self) -> bool {
        self.email.is_empty() && self.rating == 0
    }

    fn render(&self, _tag_header: &TagHeader) -> Vec<u8> {
        let mut out = string::render_terminated(crate::string::Encoding::Latin1, &self.email);
        out.push(self.rating);

        if self.count > 0 {
            let mut bytes = self.count.to_be_bytes().to_vec();
            while bytes.len() > 4 && bytes[0] == 0 {
                bytes.remove(0);
            }
            out.extend(bytes);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_counter_reads_big_endian() {
        let data = [0x00, 0x00, 0x01, 0x2C];
        let mut stream = BufStream::new(&data);
        let frame = PlayCounterFrame::parse(&mut stream).unwrap();
        assert_eq!(frame.count, 300);
    }

    #[test]
    fn popularimeter_round_trips() {
        let mut frame = PopularimeterFrame::new("user@example.com");
        frame.rating = 196;
        frame.count = 42;

        let rendered = frame.render(&TagHeader::with_version(crate::formats::id3v2::header::Version::V24));
        let mut stream = BufStream::new(&rendered);
        let parsed = PopularimeterFrame::parse(&mut stream).unwrap();

        assert_eq!(parsed.email, "user@example.com");
        assert_eq!(parsed.rating, 196);
        assert_eq!(parsed.count, 42);
    }
}
