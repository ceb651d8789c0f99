//! ID3v1, the 128-byte tag trailer appended to the end of MPEG audio files.
//!
//! Structurally this is the simplest format the crate supports: a fixed
//! layout with no length prefixes or nesting, so there's no [`crate::element`]
//! specialization here at all, just a direct parse/render pair.

use crate::error::{Error, Result};
use crate::string::Encoding;
use crate::tag::{Tag, TagTarget};
use crate::value::{genre_name, KnownField, TagValue};
use indexmap::IndexMap;

const TAG_SIZE: usize = 128;
const MAGIC: &[u8; 3] = b"TAG";

#[derive(Debug, Clone, Default)]
pub struct Id3v1Tag {
    fields: IndexMap<KnownField, TagValue>,
}

impl Id3v1Tag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a 128-byte ID3v1 trailer. `data` must be exactly [`TAG_SIZE`]
    /// bytes and start with the `"TAG"` magic, as callers are expected to
    /// have already located it at the end of the file.
    pub fn parse(data: &[u8; TAG_SIZE]) -> Result<Self> {
        if &data[0..3] != MAGIC {
            return Err(Error::NotFound);
        }

        let mut tag = Id3v1Tag::new();

        let title = trim_latin1(&data[3..33]);
        let artist = trim_latin1(&data[33..63]);
        let album = trim_latin1(&data[63..93]);
        let year = trim_latin1(&data[93..97]);
        let comment = trim_latin1(&data[97..125]);
        let genre = data[127];

        // ID3v1.1 stuffs a track number into the last two bytes of the
        // comment field when byte 125 is zero and byte 126 is nonzero.
        let track = if data[125] == 0 && data[126] != 0 {
            Some(data[126] as u32)
        } else {
            None
        };

        if !title.is_empty() {
            tag.set(KnownField::Title, TagValue::text(title));
        }
        if !artist.is_empty() {
            tag.set(KnownField::Artist, TagValue::text(artist));
        }
        if !album.is_empty() {
            tag.set(KnownField::Album, TagValue::text(album));
        }
        if !year.is_empty() {
            if let Ok(year) = year.parse::<i32>() {
                tag.set(
                    KnownField::Year,
                    TagValue::Timestamp {
                        year: Some(year),
                        month: None,
                        day: None,
                        hour: None,
                        minute: None,
                        second: None,
                    },
                );
            }
        }
        if !comment.is_empty() {
            tag.set(KnownField::Comment, TagValue::text(comment));
        }
        if let Some(track) = track {
            tag.set(
                KnownField::TrackNumber,
                TagValue::PositionInSet { position: Some(track), total: None },
            );
        }
        if genre != 0xFF {
            tag.set(KnownField::Genre, TagValue::StandardGenre(genre));
        }

        Ok(tag)
    }

    /// Renders this tag back into a 128-byte trailer. ID3v1.1 semantics are
    /// always used: a nonzero track number is written into the last two
    /// bytes of the comment field.
    pub fn render(&self) -> [u8; TAG_SIZE] {
        let mut out = [0u8; TAG_SIZE];
        out[0..3].copy_from_slice(MAGIC);

        write_latin1(&mut out[3..33], &self.display(&KnownField::Title));
        write_latin1(&mut out[33..63], &self.display(&KnownField::Artist));
        write_latin1(&mut out[63..93], &self.display(&KnownField::Album));
        write_latin1(&mut out[93..97], &self.year_string());

        let track = self.fields.get(&KnownField::TrackNumber).and_then(|value| match value {
            TagValue::PositionInSet { position: Some(p), .. } if *p <= 255 => Some(*p as u8),
            _ => None,
        });

        match track {
            Some(track) if track != 0 => {
                write_latin1(&mut out[97..125], &self.display(&KnownField::Comment));
                out[125] = 0;
                out[126] = track;
            }
            _ => write_latin1(&mut out[97..125], &self.display(&KnownField::Comment)),
        }

        out[127] = match self.fields.get(&KnownField::Genre) {
            Some(TagValue::StandardGenre(index)) => *index,
            _ => 0xFF,
        };

        out
    }

    fn display(&self, field: &KnownField) -> String {
        self.fields.get(field).map(TagValue::to_display_string).unwrap_or_default()
    }

    fn year_string(&self) -> String {
        match self.fields.get(&KnownField::Year) {
            Some(TagValue::Timestamp { year: Some(year), .. }) => format!("{:04}", year),
            _ => String::new(),
        }
    }
}

impl Tag for Id3v1Tag {
    fn format_name(&self) -> &'static str {
        "ID3v1"
    }

    fn target(&self) -> TagTarget {
        TagTarget::Global
    }

    fn fields(&self) -> Vec<KnownField> {
        self.fields.keys().cloned().collect()
    }

    fn get(&self, field: &KnownField) -> Option<&TagValue> {
        self.fields.get(field)
    }

    fn set(&mut self, field: KnownField, value: TagValue) {
        self.fields.insert(field, value);
    }

    fn remove(&mut self, field: &KnownField) -> Option<TagValue> {
        self.fields.remove(field)
    }

    fn clear(&mut self) {
        self.fields.clear();
    }
}

fn trim_latin1(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    crate::string::read(Encoding::Latin1, &mut crate::core::io::BufStream::new(&data[..end]))
}

fn write_latin1(dest: &mut [u8], value: &str) {
    let rendered = crate::string::render(Encoding::Latin1, value);
    let len = rendered.len().min(dest.len());
    dest[..len].copy_from_slice(&rendered[..len]);
}

/// Genre display helper re-exported for convenience; see
/// [`crate::value::genre_name`] for the full table.
pub fn genre_display(index: u8) -> &'static str {
    genre_name(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> [u8; TAG_SIZE] {
        let mut data = [0u8; TAG_SIZE];
        data[0..3].copy_from_slice(b"TAG");
        data[3..3 + 11].copy_from_slice(b"Test Title");
        data[33..33 + 6].copy_from_slice(b"Artis");
        data[93..97].copy_from_slice(b"2004");
        data[125] = 0;
        data[126] = 3;
        data[127] = 17; // Rock
        data
    }

    #[test]
    fn parses_v1_1_track_number() {
        let tag = Id3v1Tag::parse(&sample()).unwrap();
        assert_eq!(tag.get_text(&KnownField::Title).as_deref(), Some("Test Title"));
        assert_eq!(
            tag.get(&KnownField::TrackNumber),
            Some(&TagValue::PositionInSet { position: Some(3), total: None })
        );
        assert_eq!(tag.get(&KnownField::Genre), Some(&TagValue::StandardGenre(17)));
    }

    #[test]
    fn round_trips_through_render() {
        let tag = Id3v1Tag::parse(&sample()).unwrap();
        let rendered = tag.render();
        let reparsed = Id3v1Tag::parse(&rendered).unwrap();
        assert_eq!(reparsed.get_text(&KnownField::Title).as_deref(), Some("Test Title"));
        assert_eq!(
            reparsed.get(&KnownField::TrackNumber),
            Some(&TagValue::PositionInSet { position: Some(3), total: None })
        );
    }

    #[test]
    fn missing_magic_is_not_found() {
        let data = [0u8; TAG_SIZE];
        assert!(matches!(Id3v1Tag::parse(&data), Err(Error::NotFound)));
    }
}
