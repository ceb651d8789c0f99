//! `COMM` (comments) and `USLT` (unsynchronized lyrics) frames. Both share
//! the same layout: encoding byte, 3-byte language code, short description,
//! then the full text.

use crate::core::io::BufStream;
use crate::error::Result;
use crate::formats::id3v2::frame::FrameId;
use crate::formats::id3v2::frames::Frame;
use crate::formats::id3v2::header::TagHeader;
use crate::string::{self, Encoding};
use std::any::Any;
use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone)]
pub struct CommentsFrame {
    id: FrameId,
    pub encoding: Encoding,
    pub lang: [u8; 3],
    pub description: String,
    pub text: String,
}

impl CommentsFrame {
    pub fn new(id: FrameId) -> Self {
        CommentsFrame {
            id,
            encoding: Encoding::default(),
            lang: *b"eng",
            description: String::new(),
            text: String::new(),
        }
    }

    pub fn parse(id: FrameId, stream: &mut BufStream) -> Result<Self> {
        let encoding = match stream.read_u8()? {
            0 => Encoding::Latin1,
            1 => Encoding::Utf16,
            2 => Encoding::Utf16Be,
            3 => Encoding::Utf8,
            _ => Encoding::Latin1,
        };

        let mut lang = [0u8; 3];
        for byte in lang.iter_mut() {
            *byte = stream.read_u8()?;
        }

        let description = string::read_terminated(encoding, stream);
        let text = string::read(encoding, stream);

        Ok(CommentsFrame { id, encoding, lang, description, text })
    }

    pub fn lang_str(&self) -> String {
        String::from_utf8_lossy(&self.lang).to_string()
    }
}

impl Display for CommentsFrame {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl Frame for CommentsFrame {
    fn id(&self) -> FrameId {
        self.id
    }

    fn key(&self) -> String {
        format!("{}:{}:{}", self.id, self.lang_str(), self.description)
    }

    fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn render(&self, _tag_header: &TagHeader) -> Vec<u8> {
        let mut out = vec![encoding_byte(self.encoding)];
        out.extend(self.lang);
        out.extend(string::render_terminated(self.encoding, &self.description));
        out.extend(string::render(self.encoding, &self.text));
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
    fn parses_comment_body() {
        let mut data = vec![0u8]; // Latin1
        data.extend(b"eng");
        data.extend(b"short\0");
        data.extend(b"a longer comment body");

        let mut stream = BufStream::new(&data);
        let frame = CommentsFrame::parse(FrameId::new(b"COMM"), &mut stream).unwrap();

        assert_eq!(frame.lang_str(), "eng");
        assert_eq!(frame.description, "short");
        assert_eq!(frame.text, "a longer comment body");
    }

    #[test]
    fn key_disambiguates_by_language_and_description() {
        let mut a = CommentsFrame::new(FrameId::new(b"COMM"));
        a.description = "short".into();
        let mut b = CommentsFrame::new(FrameId::new(b"COMM"));
        b.lang = *b"deu";

        assert_ne!(a.key(), b.key());
    }
}
