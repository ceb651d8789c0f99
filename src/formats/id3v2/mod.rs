//! ID3v2 tag reading and writing.
//!
//! An ID3v2 tag is composed of a header (version, size, flags), an optional
//! extended header, and a list of frames. Frames are heterogeneous enough
//! (plain text, key/value text, binary with a description, pictures,
//! counters...) that [`frames::Frame`] is a trait object rather than one
//! large enum; [`collections::FrameMap`] indexes them by
//! [`frames::Frame::key`], which differs from the 4-character frame ID for
//! frame kinds the format allows to legally repeat (`COMM`, `TXXX`, `APIC`,
//! ...).
//!
//! ID3v2.2's 3-character frame IDs are upgraded to their ID3v2.3 analogue
//! while parsing; any frame with no sane analogue is dropped. The tag is
//! otherwise stored at whatever version it was read at until
//! [`Id3v2Tag::update`] or [`Tag::set`]/[`Tag::remove`] via the
//! format-neutral field API moves it.

pub mod collections;
pub mod compat;
pub mod frame;
pub mod frames;
pub mod header;
pub mod syncdata;

use crate::core::io::BufStream;
use crate::error::{Error, Result};
use crate::formats::id3v2::collections::{FrameMap, UnknownFrames};
use crate::formats::id3v2::frame::FrameId;
use crate::formats::id3v2::frames::{
    AttachedPictureFrame, CommentsFrame, Frame as _, ParsedFrame, TextFrame, UserTextFrame,
};
use crate::formats::id3v2::header::{ExtendedHeader, SaveVersion, TagHeader, Version};
use crate::string::Encoding;
use crate::tag::{Tag, TagTarget};
use crate::value::{PictureType, TagValue};
use crate::value::KnownField;
use indexmap::IndexMap;
use log::{info, warn};

/// An ID3v2 tag.
#[derive(Debug, Clone)]
pub struct Id3v2Tag {
    header: TagHeader,
    pub extended_header: Option<ExtendedHeader>,
    pub frames: FrameMap,
    pub unknown_frames: UnknownFrames,
    known: IndexMap<KnownField, TagValue>,
}

impl Id3v2Tag {
    pub fn new() -> Self {
        Self::with_version(SaveVersion::V24)
    }

    pub fn with_version(version: SaveVersion) -> Self {
        Id3v2Tag {
            header: TagHeader::with_version(Version::from(version)),
            extended_header: None,
            frames: FrameMap::new(),
            unknown_frames: UnknownFrames::new(Version::from(version), Vec::new()),
            known: IndexMap::new(),
        }
    }

    pub fn version(&self) -> Version {
        self.header.version()
    }

    pub fn size(&self) -> u32 {
        self.header.size()
    }

    /// Parses a tag out of its 10-byte header plus body, as found embedded
    /// at the start of an MP3/AIFF/WAV file.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < 10 {
            return Err(Error::NotFound);
        }

        let mut header_raw = [0u8; 10];
        header_raw.copy_from_slice(&raw[0..10]);

        let mut header = TagHeader::parse(header_raw).map_err(|err| match err {
            Error::MalformedData => Error::NotFound,
            err => err,
        })?;

        let body_end = usize::min(raw.len(), 10 + header.size() as usize);
        let mut tag_data = raw[10..body_end].to_vec();
        let mut stream = BufStream::new(&tag_data);

        if header.version() < Version::V24 && header.flags().unsync {
            tag_data = syncdata::decode(&mut stream);
            stream = BufStream::new(&tag_data);
        }

        let mut extended_header = None;

        if header.flags().extended {
            match ExtendedHeader::parse(&mut stream, header.version()) {
                Ok(ext) => extended_header = Some(ext),
                Err(_) => {
                    info!("resetting incorrectly-set extended header flag");
                    header.flags_mut().extended = false;
                }
            }
        }

        let mut frame_map = FrameMap::new();
        let mut unknowns = Vec::new();

        while stream.remaining() >= 10 {
            match frames::parse(&header, &mut stream) {
                Ok(ParsedFrame::Frame(frame)) => frame_map.add(frame),
                Ok(ParsedFrame::Unknown(unknown)) => {
                    info!("found unknown frame {}", unknown.id());
                    unknowns.push(unknown);
                }
                Ok(ParsedFrame::Padding) => break,
                Err(_) => break,
            }
        }

        let unknown_frames = UnknownFrames::new(header.version(), unknowns);
        let known = known_fields_from(&frame_map);

        Ok(Id3v2Tag { header, extended_header, frames: frame_map, unknown_frames, known })
    }

    /// Updates the tag's frames to `to`'s shape: renames/merges/splits
    /// version-specific frames and drops anything without a sane
    /// cross-version analogue.
    pub fn update(&mut self, to: SaveVersion) {
        match to {
            SaveVersion::V23 => compat::to_v3(&mut self.frames),
            SaveVersion::V24 => compat::to_v4(&mut self.frames),
        }

        *self.header.version_mut() = Version::from(to);
        self.known = known_fields_from(&self.frames);
    }

    /// Renders the full tag, header included, ready to be spliced into a
    /// host file in place of any previous tag.
    pub fn render(&mut self) -> Vec<u8> {
        match self.header.version() {
            Version::V22 | Version::V23 => self.update(SaveVersion::V23),
            Version::V24 => self.update(SaveVersion::V24),
        }

        let flags = self.header.flags_mut();
        flags.unsync = false;
        flags.extended = self.extended_header.is_some();
        flags.experimental = false;
        flags.footer = false;

        let mut body = match &self.extended_header {
            Some(ext) => ext.render(self.header.version()),
            None => Vec::new(),
        };

        for (_, frame) in &self.frames {
            body.extend(frames::render_frame(&self.header, frame.as_ref()));
        }

        if self.unknown_frames.version() == Some(self.version()) {
            for frame in self.unknown_frames.frames() {
                body.extend(frames::render_unknown(&self.header, frame));
            }
        } else if !self.unknown_frames.is_empty() {
            warn!("dropping unknown frames from a different tag version");
        }

        *self.header.size_mut() = body.len() as u32;

        let mut out = self.header.render().to_vec();
        out.extend(body);
        out
    }
}

impl Default for Id3v2Tag {
    fn default() -> Self {
        Self::new()
    }
}

impl Tag for Id3v2Tag {
    fn format_name(&self) -> &'static str {
        "ID3v2"
    }

    fn target(&self) -> TagTarget {
        TagTarget::Global
    }

    fn fields(&self) -> Vec<KnownField> {
        self.known.keys().cloned().collect()
    }

    fn get(&self, field: &KnownField) -> Option<&TagValue> {
        self.known.get(field)
    }

    fn set(&mut self, field: KnownField, value: TagValue) {
        if let Some(frame) = field_to_frame(&field, &value, self.version()) {
            self.frames.insert(frame);
        }
        self.known.insert(field, value);
    }

    fn remove(&mut self, field: &KnownField) -> Option<TagValue> {
        match field {
            KnownField::Comment => {
                self.frames.remove_all(FrameId::new(b"COMM"));
            }
            KnownField::Lyrics => {
                self.frames.remove_all(FrameId::new(b"USLT"));
            }
            KnownField::Picture => {
                self.frames.remove_all(FrameId::new(b"APIC"));
            }
            _ => {
                for key in field_keys(field) {
                    self.frames.remove(&key);
                }
            }
        }
        self.known.remove(field)
    }

    fn clear(&mut self) {
        self.frames.clear();
        self.unknown_frames = UnknownFrames::new(self.version(), Vec::new());
        self.extended_header = None;
        self.known.clear();
    }

    /// ID3v2.4 can write any of the four encodings; ID3v2.2/.3 only have
    /// encoding bytes for Latin-1 and UTF-16-with-BOM, so propose the
    /// narrowest one that's always safe.
    fn proposed_text_encoding(&self) -> Encoding {
        if self.version() == Version::V24 {
            Encoding::Utf8
        } else {
            Encoding::Utf16
        }
    }

    fn can_use_encoding(&self, encoding: Encoding) -> bool {
        match self.version() {
            Version::V24 => true,
            _ => matches!(encoding, Encoding::Latin1 | Encoding::Utf16),
        }
    }

    /// Walks every text frame and promotes any encoding this tag's current
    /// version can't represent to `Utf16`, matching what [`Self::render`]
    /// does at write time. Useful to call ahead of an [`Self::update`] to a
    /// lower version without waiting for a render to find out a frame no
    /// longer fits its encoding byte.
    fn ensure_text_values_properly_encoded(&mut self) {
        let version = self.version();
        for frame in self.frames.values_mut() {
            if let Some(text) = frame.downcast_mut::<TextFrame>() {
                text.encoding = frames::text::safe_encoding(text.encoding, version);
            } else if let Some(user) = frame.downcast_mut::<UserTextFrame>() {
                user.encoding = frames::text::safe_encoding(user.encoding, version);
            }
        }
    }

    fn native_id(&self, field: &KnownField) -> Option<String> {
        match field {
            KnownField::Custom(name) => Some(format!("TXXX:{}", name)),
            KnownField::Comment => Some("COMM".to_string()),
            KnownField::Lyrics => Some("USLT".to_string()),
            KnownField::Picture => Some("APIC".to_string()),
            other => field_keys(other).into_iter().next(),
        }
    }
}

/// When multiple ID3v2 tags are stacked back-to-back at the start of a file
/// (some encoders append a new tag rather than replacing the old one),
/// concatenates every frame from the later tags into the first and reports
/// the full byte span all of them together occupy, so the caller can splice
/// the merged tag back in over all of it. This is user-invoked -- nothing
/// in [`Id3v2Tag::parse`] does this automatically, since a second ID3v2
/// header that far into a file is just as likely to be coincidental.
pub fn merge_id3v2_tags(raw: &[u8]) -> Result<(Id3v2Tag, usize)> {
    let mut merged = Id3v2Tag::parse(raw)?;
    let mut span = tag_span(&merged);

    while raw.len() > span + 10 && &raw[span..span + 3] == b"ID3" {
        let next = match Id3v2Tag::parse(&raw[span..]) {
            Ok(tag) => tag,
            Err(_) => break,
        };

        for (_, frame) in &next.frames {
            merged.frames.add(frame.clone());
        }
        for (field, value) in next.known.clone() {
            merged.known.entry(field).or_insert(value);
        }

        span += tag_span(&next);
    }

    Ok((merged, span))
}

fn tag_span(tag: &Id3v2Tag) -> usize {
    10 + tag.size() as usize + if tag.header.flags().footer { 10 } else { 0 }
}

/// The keys in [`FrameMap`] that back a given singleton [`KnownField`].
/// Fields backed by a repeatable frame kind (`COMM`, `USLT`, `APIC`) are
/// handled separately in [`Tag::remove`] via [`FrameMap::remove_all`].
fn field_keys(field: &KnownField) -> Vec<String> {
    match field {
        KnownField::Title => vec!["TIT2".into()],
        KnownField::Artist => vec!["TPE1".into()],
        KnownField::AlbumArtist => vec!["TPE2".into()],
        KnownField::Album => vec!["TALB".into()],
        KnownField::TrackNumber => vec!["TRCK".into()],
        KnownField::DiscNumber => vec!["TPOS".into()],
        KnownField::Genre => vec!["TCON".into()],
        KnownField::Year => vec!["TYER".into(), "TDRC".into()],
        KnownField::Date => vec!["TYER".into(), "TDRC".into()],
        KnownField::Composer => vec!["TCOM".into()],
        KnownField::Comment | KnownField::Lyrics | KnownField::Picture => Vec::new(),
        KnownField::Bpm => vec!["TBPM".into()],
        KnownField::Compilation => vec!["TCMP".into()],
        KnownField::EncodedBy => vec!["TENC".into()],
        KnownField::Copyright => vec!["TCOP".into()],
        KnownField::Grouping => vec!["TIT1".into()],
        KnownField::Custom(name) => vec![format!("TXXX:{}", name)],
    }
}

fn field_to_frame(field: &KnownField, value: &TagValue, version: Version) -> Option<Box<dyn frames::Frame>> {
    let text = value.to_display_string();

    match field {
        KnownField::Title => Some(Box::new(text_frame(FrameId::new(b"TIT2"), &text))),
        KnownField::Artist => Some(Box::new(text_frame(FrameId::new(b"TPE1"), &text))),
        KnownField::AlbumArtist => Some(Box::new(text_frame(FrameId::new(b"TPE2"), &text))),
        KnownField::Album => Some(Box::new(text_frame(FrameId::new(b"TALB"), &text))),
        KnownField::TrackNumber => Some(Box::new(text_frame(FrameId::new(b"TRCK"), &text))),
        KnownField::DiscNumber => Some(Box::new(text_frame(FrameId::new(b"TPOS"), &text))),
        KnownField::Genre => Some(Box::new(text_frame(FrameId::new(b"TCON"), &text))),
        KnownField::Year | KnownField::Date => {
            let id = if version == Version::V24 { FrameId::new(b"TDRC") } else { FrameId::new(b"TYER") };
            Some(Box::new(text_frame(id, &text)))
        }
        KnownField::Composer => Some(Box::new(text_frame(FrameId::new(b"TCOM"), &text))),
        KnownField::Bpm => Some(Box::new(text_frame(FrameId::new(b"TBPM"), &text))),
        KnownField::Compilation => Some(Box::new(text_frame(FrameId::new(b"TCMP"), &text))),
        KnownField::EncodedBy => Some(Box::new(text_frame(FrameId::new(b"TENC"), &text))),
        KnownField::Copyright => Some(Box::new(text_frame(FrameId::new(b"TCOP"), &text))),
        KnownField::Grouping => Some(Box::new(text_frame(FrameId::new(b"TIT1"), &text))),
        KnownField::Comment => {
            let mut frame = CommentsFrame::new(FrameId::new(b"COMM"));
            frame.text = text;
            Some(Box::new(frame))
        }
        KnownField::Lyrics => {
            let mut frame = CommentsFrame::new(FrameId::new(b"USLT"));
            frame.text = text;
            Some(Box::new(frame))
        }
        KnownField::Picture => {
            if let TagValue::Picture { mime, description, kind, data } = value {
                let mut frame = AttachedPictureFrame::new();
                frame.mime = mime.clone();
                frame.description = description.clone();
                frame.kind = *kind;
                frame.data = data.clone();
                Some(Box::new(frame))
            } else {
                None
            }
        }
        KnownField::Custom(name) => {
            let mut frame = UserTextFrame::new(name.clone());
            frame.text = vec![text];
            Some(Box::new(frame))
        }
    }
}

fn text_frame(id: FrameId, value: &str) -> TextFrame {
    let mut frame = TextFrame::new(id);
    frame.encoding = Encoding::Utf8;
    frame.text = vec![value.to_string()];
    frame
}

fn known_fields_from(frames: &FrameMap) -> IndexMap<KnownField, TagValue> {
    let mut known = IndexMap::new();

    let mut text_field = |key: &str, field: KnownField| {
        if let Some(frame) = frames.get(key).and_then(|f| f.downcast_ref::<TextFrame>()) {
            if !frame.is_empty() {
                known.insert(field, TagValue::text(frame.text.join("/")));
            }
        }
    };

    text_field("TIT2", KnownField::Title);
    text_field("TPE1", KnownField::Artist);
    text_field("TPE2", KnownField::AlbumArtist);
    text_field("TALB", KnownField::Album);
    text_field("TRCK", KnownField::TrackNumber);
    text_field("TPOS", KnownField::DiscNumber);
    text_field("TCON", KnownField::Genre);
    text_field("TCOM", KnownField::Composer);
    text_field("TBPM", KnownField::Bpm);
    text_field("TCMP", KnownField::Compilation);
    text_field("TENC", KnownField::EncodedBy);
    text_field("TCOP", KnownField::Copyright);
    text_field("TIT1", KnownField::Grouping);

    if frames.contains_key("TDRC") {
        text_field("TDRC", KnownField::Year);
    } else {
        text_field("TYER", KnownField::Year);
    }

    if let Some(frame) = frames.values().find_map(|f| f.downcast_ref::<CommentsFrame>().filter(|c| c.id() == FrameId::new(b"COMM"))) {
        if !frame.is_empty() {
            known.insert(KnownField::Comment, TagValue::text(frame.text.clone()));
        }
    }

    if let Some(frame) = frames.values().find_map(|f| f.downcast_ref::<CommentsFrame>().filter(|c| c.id() == FrameId::new(b"USLT"))) {
        if !frame.is_empty() {
            known.insert(KnownField::Lyrics, TagValue::text(frame.text.clone()));
        }
    }

    if let Some(frame) = frames.values().find_map(|f| f.downcast_ref::<AttachedPictureFrame>()) {
        if !frame.is_empty() {
            known.insert(
                KnownField::Picture,
                TagValue::Picture {
                    mime: frame.mime.clone(),
                    description: frame.description.clone(),
                    kind: frame.kind,
                    data: frame.data.clone(),
                },
            );
        }
    }

    for (key, frame) in frames.iter() {
        if key.starts_with("TXXX:") {
            if let Some(user) = frame.downcast_ref::<UserTextFrame>() {
                if !user.is_empty() {
                    known.insert(KnownField::Custom(user.description.clone()), TagValue::text(user.text.join("/")));
                }
            }
        }
    }

    known
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tag_bytes() -> Vec<u8> {
        let mut tag = Id3v2Tag::new();
        tag.set_text(KnownField::Title, "Archangel");
        tag.set_text(KnownField::Artist, "Hundred Waters");
        tag.render()
    }

    #[test]
    fn round_trips_basic_fields() {
        let bytes = sample_tag_bytes();
        let tag = Id3v2Tag::parse(&bytes).unwrap();

        assert_eq!(tag.get_text(&KnownField::Title).as_deref(), Some("Archangel"));
        assert_eq!(tag.get_text(&KnownField::Artist).as_deref(), Some("Hundred Waters"));
    }

    #[test]
    fn missing_header_is_not_found() {
        let err = Id3v2Tag::parse(&[0u8; 4]).unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }

    #[test]
    fn clear_removes_known_and_unknown_frames() {
        let mut tag = Id3v2Tag::new();
        tag.set_text(KnownField::Title, "Archangel");
        tag.clear();

        assert!(tag.is_empty());
        assert!(tag.frames.is_empty());
    }

    #[test]
    fn merge_id3v2_tags_concatenates_a_second_stacked_tag() {
        let mut first = Id3v2Tag::new();
        first.set_text(KnownField::Title, "First Title");
        let mut bytes = first.render();

        let mut second = Id3v2Tag::new();
        second.set_text(KnownField::Artist, "Second Artist");
        bytes.extend(second.render());
        bytes.extend([0xFFu8; 16]); // fake audio data after both tags

        let (merged, span) = merge_id3v2_tags(&bytes).unwrap();
        assert_eq!(merged.get_text(&KnownField::Title).as_deref(), Some("First Title"));
        assert_eq!(merged.get_text(&KnownField::Artist).as_deref(), Some("Second Artist"));
        assert!(bytes[span..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn update_to_v3_splices_year_from_v4_timestamp() {
        let mut tag = Id3v2Tag::new();
        tag.set_text(KnownField::Year, "2020-10-10");
        tag.update(SaveVersion::V23);

        assert_eq!(tag.frames.get("TYER").unwrap().to_string(), "2020");
    }
}
