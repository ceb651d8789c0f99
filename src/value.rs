//! The format-neutral tag value model.
//!
//! Every codec in [`crate::formats`] ultimately produces and consumes
//! [`TagValue`]s, so a caller can ask for "the track number" without caring
//! whether it came from an ID3v2 `TRCK` text frame, an MP4 `trkn` atom, or a
//! Matroska `SimpleTag` with a `TrackNumber` name. The variants mirror the
//! richest of the formats involved (ID3v2) while staying representable in
//! the leaner ones (Vorbis comments, which are all key/value text).

use crate::string::Encoding;
use std::fmt;

/// A single tag value. This is a closed union rather than an open trait
/// object -- a new kind of value would mean a new tag field, which is rare
/// enough that exhaustive matches pull their weight.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    /// A field that is present but carries no data (an MP4 "compilation"
    /// flag atom with a zero-length payload, for instance).
    Empty,
    /// Human-readable text, carrying the encoding it was decoded with so a
    /// round-trip write can stay byte-for-byte when nothing changed.
    Text { encoding: Encoding, text: Vec<String> },
    /// A bare integer (play counter, BPM, compilation flag).
    Integer(i64),
    /// "Track 3 of 11" / "Disc 1 of 2".
    PositionInSet { position: Option<u32>, total: Option<u32> },
    /// An ID3v1-style numeric genre, resolved against the standard genre
    /// table when displayed.
    StandardGenre(u8),
    /// A partial or full release date/timestamp. Stored as the widest
    /// representation seen; formats that only support a bare year still
    /// round-trip through this by leaving the rest `None`.
    Timestamp {
        year: Option<i32>,
        month: Option<u8>,
        day: Option<u8>,
        hour: Option<u8>,
        minute: Option<u8>,
        second: Option<u8>,
    },
    /// Arbitrary binary data with a MIME-ish description (GEOB, a private
    /// frame, an unrecognized MP4 `data` atom flavor).
    Binary { description: String, data: Vec<u8> },
    /// Embedded artwork.
    Picture {
        mime: String,
        description: String,
        kind: PictureType,
        data: Vec<u8>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureType {
    Other,
    FileIcon,
    OtherFileIcon,
    CoverFront,
    CoverBack,
    Leaflet,
    Media,
    LeadArtist,
    Artist,
    Conductor,
    Band,
    Composer,
    Lyricist,
    RecordingLocation,
    DuringRecording,
    DuringPerformance,
    ScreenCapture,
    BrightColouredFish,
    Illustration,
    BandLogo,
    PublisherLogo,
}

impl PictureType {
    pub fn parse(byte: u8) -> Self {
        match byte {
            0x00 => Self::Other,
            0x01 => Self::FileIcon,
            0x02 => Self::OtherFileIcon,
            0x03 => Self::CoverFront,
            0x04 => Self::CoverBack,
            0x05 => Self::Leaflet,
            0x06 => Self::Media,
            0x07 => Self::LeadArtist,
            0x08 => Self::Artist,
            0x09 => Self::Conductor,
            0x0A => Self::Band,
            0x0B => Self::Composer,
            0x0C => Self::Lyricist,
            0x0D => Self::RecordingLocation,
            0x0E => Self::DuringRecording,
            0x0F => Self::DuringPerformance,
            0x10 => Self::ScreenCapture,
            0x11 => Self::BrightColouredFish,
            0x12 => Self::Illustration,
            0x13 => Self::BandLogo,
            0x14 => Self::PublisherLogo,
            _ => Self::Other,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TagValue {
    pub fn text(text: impl Into<String>) -> Self {
        TagValue::Text {
            encoding: Encoding::default(),
            text: vec![text.into()],
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            TagValue::Empty => true,
            TagValue::Text { text, .. } => text.is_empty() || text.iter().all(|s| s.is_empty()),
            TagValue::Binary { data, .. } => data.is_empty(),
            TagValue::Picture { data, .. } => data.is_empty(),
            _ => false,
        }
    }

    /// A best-effort rendering as a single display string, used by codecs
    /// that only understand flat text (Vorbis comments, ID3v1).
    pub fn to_display_string(&self) -> String {
        match self {
            TagValue::Empty => String::new(),
            TagValue::Text { text, .. } => text.join("\u{0}"),
            TagValue::Integer(n) => n.to_string(),
            TagValue::PositionInSet { position, total } => match (position, total) {
                (Some(p), Some(t)) => format!("{}/{}", p, t),
                (Some(p), None) => p.to_string(),
                _ => String::new(),
            },
            TagValue::StandardGenre(index) => genre_name(*index).to_string(),
            TagValue::Timestamp { year, month, day, .. } => {
                let mut out = year.map(|y| format!("{:04}", y)).unwrap_or_default();
                if let (Some(m), true) = (month, !out.is_empty()) {
                    out.push_str(&format!("-{:02}", m));
                    if let Some(d) = day {
                        out.push_str(&format!("-{:02}", d));
                    }
                }
                out
            }
            TagValue::Binary { description, .. } => description.clone(),
            TagValue::Picture { description, .. } => description.clone(),
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

/// The ID3v1 standard genre table (first 80 entries are the original
/// Winamp table; later entries are the widely-adopted Winamp extension).
pub const STANDARD_GENRES: &[&str] = &[
    "Blues", "Classic Rock", "Country", "Dance", "Disco", "Funk", "Grunge", "Hip-Hop", "Jazz",
    "Metal", "New Age", "Oldies", "Other", "Pop", "R&B", "Rap", "Reggae", "Rock", "Techno",
    "Industrial", "Alternative", "Ska", "Death Metal", "Pranks", "Soundtrack", "Euro-Techno",
    "Ambient", "Trip-Hop", "Vocal", "Jazz+Funk", "Fusion", "Trance", "Classical", "Instrumental",
    "Acid", "House", "Game", "Sound Clip", "Gospel", "Noise", "AlternRock", "Bass", "Soul",
    "Punk", "Space", "Meditative", "Instrumental Pop", "Instrumental Rock", "Ethnic", "Gothic",
    "Darkwave", "Techno-Industrial", "Electronic", "Pop-Folk", "Eurodance", "Dream",
    "Southern Rock", "Comedy", "Cult", "Gangsta", "Top 40", "Christian Rap", "Pop/Funk", "Jungle",
    "Native American", "Cabaret", "New Wave", "Psychedelic", "Rave", "Showtunes", "Trailer",
    "Lo-Fi", "Tribal", "Acid Punk", "Acid Jazz", "Polka", "Retro", "Musical", "Rock & Roll",
    "Hard Rock",
];

pub fn genre_name(index: u8) -> &'static str {
    STANDARD_GENRES.get(index as usize).copied().unwrap_or("Unknown")
}

/// A closed, well-known set of fields every format codec maps its native
/// field names onto, plus [`KnownField::Custom`] for the long tail of
/// less-common metadata (replaygain tags, user text frames, and the like).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KnownField {
    Title,
    Artist,
    AlbumArtist,
    Album,
    TrackNumber,
    DiscNumber,
    Genre,
    Year,
    Date,
    Composer,
    Comment,
    Lyrics,
    Picture,
    Bpm,
    Compilation,
    EncodedBy,
    Copyright,
    Grouping,
    /// An arbitrary field that doesn't map onto one of the above, keyed by
    /// the format's own native identifier (an ID3v2 frame ID plus
    /// description, a Vorbis comment key, ...).
    Custom(String),
}

impl fmt::Display for KnownField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KnownField::Custom(name) => write!(f, "{}", name),
            other => write!(f, "{:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genre_lookup_falls_back() {
        assert_eq!(genre_name(0), "Blues");
        assert_eq!(genre_name(255), "Unknown");
    }

    #[test]
    fn position_in_set_display() {
        let value = TagValue::PositionInSet { position: Some(3), total: Some(11) };
        assert_eq!(value.to_string(), "3/11");
    }

    #[test]
    fn empty_text_is_empty() {
        assert!(TagValue::Text { encoding: Encoding::Utf8, text: vec![] }.is_empty());
        assert!(!TagValue::text("x").is_empty());
    }
}
