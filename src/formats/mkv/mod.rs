//! EBML variable-length integers, the Matroska element tree built on top of
//! them, and the `Tags`/`SimpleTag` metadata model.

use crate::chapter::{Attachment, Chapter, Edition};
use crate::core::io::BufStream;
use crate::element::{self, Element, ElementCodec, Id, Kind};
use crate::error::{Error, Result};
use crate::string;
use crate::tag::{MatroskaLevel, MatroskaTarget, Tag, TagTarget};
use crate::track::Track;
use crate::value::{KnownField, TagValue};
use indexmap::IndexMap;

/// Reads an EBML variable-length integer (ID or size) starting at the
/// stream's current position. `mask_marker` strips the leading length-marker
/// bit from the value, which size vints do but ID vints don't (an ID's
/// marker bit is part of its identity).
fn read_vint(stream: &mut BufStream, mask_marker: bool) -> Result<(u64, u8)> {
    let first = stream.read_u8()?;
    if first == 0 {
        return Err(Error::MalformedData);
    }

    let len = first.leading_zeros() as u8 + 1;
    if len > 8 {
        return Err(Error::MalformedData);
    }

    let mut value = if mask_marker { (first ^ (0x80 >> (len - 1))) as u64 } else { first as u64 };

    for _ in 1..len {
        value = (value << 8) | stream.read_u8()? as u64;
    }

    // All-ones payload is EBML's "unknown size" sentinel, regardless of vint
    // length; normalize it to u64::MAX so callers have one thing to check.
    let unknown = mask_marker && value == (1u64 << (7 * len)) - 1;

    Ok((if unknown { u64::MAX } else { value }, len))
}

fn render_vint(value: u64, min_len: Option<u8>) -> Vec<u8> {
    let mut len = 1u8;
    while len < 8 && value >= (1u64 << (7 * len)) - 1 {
        len += 1;
    }
    if let Some(min) = min_len {
        len = len.max(min);
    }

    let marker = 0x80u8 >> (len - 1);
    let mut bytes = value.to_be_bytes().to_vec();
    bytes = bytes[8 - len as usize..].to_vec();
    bytes[0] |= marker;
    bytes
}

/// Renders an EBML ID vint: unlike a size vint, the encoded bytes already
/// include the marker bit as part of the value, so it's emitted verbatim at
/// its natural width.
fn render_id(id: Id) -> Vec<u8> {
    id.as_bytes().to_vec()
}

pub struct EbmlCodec;

const MASTER_IDS: &[&[u8]] = &[
    &[0x18, 0x53, 0x80, 0x67], // Segment
    &[0x11, 0x4D, 0x9B, 0x74], // SeekHead
    &[0x4D, 0xBB],             // Seek
    &[0x15, 0x49, 0xA9, 0x66], // Info (technically not a master in spirit but nests DateUTC etc. -- harmless to over-include)
    &[0x10, 0x43, 0xA7, 0x70], // Tags
    &[0x73, 0x73],             // Tag
    &[0x63, 0xC0],             // Targets
    &[0x67, 0xC8],             // SimpleTag
    &[0x16, 0x54, 0xAE, 0x6B], // Tracks
    &[0xAE],                   // TrackEntry
    &[0xE1],                   // Audio
    &[0xE0],                   // Video
    &[0x10, 0x43, 0xA9, 0x70], // Chapters
    &[0x45, 0xB9],             // EditionEntry
    &[0xB6],                   // ChapterAtom
    &[0x80],                   // ChapterDisplay
    &[0x19, 0x41, 0xA4, 0x69], // Attachments
    &[0x61, 0xA7],             // AttachedFile
];

impl ElementCodec for EbmlCodec {
    fn read_header(&self, stream: &mut BufStream) -> Result<(Id, Kind, u64)> {
        let (id_value, id_len) = read_vint(stream, false)?;
        if id_len > 4 {
            return Err(Error::MalformedData);
        }
        let id_bytes = id_value.to_be_bytes();
        let id = Id::new(&id_bytes[8 - id_len as usize..]);

        let (size, _) = read_vint(stream, true)?;

        let kind = if self.is_master(id) { Kind::Master } else { Kind::Leaf };
        Ok((id, kind, size))
    }

    fn render_header(&self, id: Id, _kind: Kind, data_size: u64) -> Vec<u8> {
        let mut out = render_id(id);
        out.extend(render_vint(data_size, None));
        out
    }

    fn is_master(&self, id: Id) -> bool {
        MASTER_IDS.iter().any(|candidate| *candidate == id.as_bytes())
    }
}

pub fn parse_elements(data: &[u8]) -> Result<Vec<Element>> {
    let codec = EbmlCodec;
    let mut stream = BufStream::new(data);
    element::parse_tree(&codec, &mut stream, 0)
}

/// A single `SimpleTag`: a name, a UTF-8 value, the track (if any) it
/// targets via its enclosing `Targets`/`TagTrackUID`, and any nested
/// `SimpleTag`s (Matroska allows a `SimpleTag` to qualify another, e.g.
/// `SORT_WITH` nested under `ARTIST`).
#[derive(Debug, Clone)]
pub struct SimpleTag {
    pub name: String,
    pub value: String,
    pub target_track: Option<u64>,
    pub children: Vec<SimpleTag>,
}

#[derive(Debug, Clone, Default)]
pub struct MkvTag {
    pub simple_tags: Vec<SimpleTag>,
    target_level: Option<MatroskaLevel>,
    known: IndexMap<KnownField, TagValue>,
}

const TAG_NAME_MAP: &[(&str, KnownField)] = &[
    ("TITLE", KnownField::Title),
    ("ARTIST", KnownField::Artist),
    ("ALBUM", KnownField::Album),
    ("PART_NUMBER", KnownField::TrackNumber),
    ("GENRE", KnownField::Genre),
    ("DATE_RELEASED", KnownField::Date),
    ("COMPOSER", KnownField::Composer),
    ("COMMENT", KnownField::Comment),
    ("LYRICS", KnownField::Lyrics),
    ("BPM", KnownField::Bpm),
    ("ENCODED_BY", KnownField::EncodedBy),
    ("COPYRIGHT", KnownField::Copyright),
];

fn field_for_name(name: &str) -> Option<KnownField> {
    TAG_NAME_MAP.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, f)| f.clone())
}

fn name_for_field(field: &KnownField) -> Option<&'static str> {
    TAG_NAME_MAP.iter().find(|(_, f)| f == field).map(|(n, _)| *n)
}

impl MkvTag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses every `SimpleTag` found under the first top-level `Tags`
    /// element, recursing into nested `SimpleTag`s (Matroska lets one
    /// `SimpleTag` qualify another, e.g. `SORT_WITH` nested under `ARTIST`).
    pub fn parse(data: &[u8], root: &[Element]) -> Result<Self> {
        let tags_elem = root.iter().find_map(|e| e.find(Id::new(&TAGS_ID))).ok_or(Error::NotFound)?;

        let mut tag = MkvTag::new();

        for tag_elem in tags_elem.children_with_id(Id::new(&TAG_ID)) {
            let targets = tag_elem.find(Id::new(&TARGETS_ID));
            let target_track = targets.and_then(|t| t.find(Id::new(&TRACK_UID_ID))).and_then(|e| read_uint(data, e));
            let target_level = targets
                .and_then(|t| t.find(Id::new(&TARGET_TYPE_VALUE_ID)))
                .and_then(|e| read_uint(data, e))
                .and_then(MatroskaLevel::from_value);

            if tag.target_level.is_none() {
                tag.target_level = target_level;
            }

            for simple in tag_elem.children_with_id(Id::new(&SIMPLE_TAG_ID)) {
                if let Some(parsed) = parse_simple_tag(data, simple, target_track) {
                    tag.simple_tags.push(parsed);
                }
            }
        }

        tag.rebuild_known();
        Ok(tag)
    }

    fn rebuild_known(&mut self) {
        self.known.clear();
        for tag in &self.simple_tags {
            let value = TagValue::text(tag.value.clone());
            match field_for_name(&tag.name) {
                Some(field) => {
                    self.known.insert(field, value);
                }
                None => {
                    self.known.insert(KnownField::Custom(tag.name.clone()), value);
                }
            }
        }
    }
}

/// Recursively parses one `SimpleTag` element and its nested `SimpleTag`
/// children, carrying `target_track` down (nested tags share their parent's
/// target -- Matroska has no way to re-target a nested `SimpleTag`).
fn parse_simple_tag(data: &[u8], simple: &Element, target_track: Option<u64>) -> Option<SimpleTag> {
    let name = simple.find(Id::new(&TAG_NAME_ID)).map(|e| read_string(data, e))?;
    let value = simple.find(Id::new(&TAG_STRING_ID)).map(|e| read_string(data, e)).unwrap_or_default();

    let children = simple
        .children_with_id(Id::new(&SIMPLE_TAG_ID))
        .filter_map(|child| parse_simple_tag(data, child, target_track))
        .collect();

    Some(SimpleTag { name, value, target_track, children })
}

const TAGS_ID: [u8; 4] = [0x10, 0x43, 0xA7, 0x70];
const TAG_ID: [u8; 2] = [0x73, 0x73];
const TARGETS_ID: [u8; 2] = [0x63, 0xC0];
const TRACK_UID_ID: [u8; 2] = [0x63, 0xC5];
const TARGET_TYPE_VALUE_ID: [u8; 2] = [0x68, 0xCA];
const SIMPLE_TAG_ID: [u8; 2] = [0x67, 0xC8];
const TAG_NAME_ID: [u8; 2] = [0x45, 0xA3];
const TAG_STRING_ID: [u8; 2] = [0x44, 0x87];

const CHAPTERS_ID: [u8; 4] = [0x10, 0x43, 0xA9, 0x70];
const EDITION_ENTRY_ID: [u8; 2] = [0x45, 0xB9];
const EDITION_UID_ID: [u8; 2] = [0x45, 0xBC];
const EDITION_FLAG_HIDDEN_ID: [u8; 2] = [0x45, 0xBD];
const EDITION_FLAG_DEFAULT_ID: [u8; 2] = [0x45, 0xDB];
const CHAPTER_ATOM_ID: [u8; 1] = [0xB6];
const CHAPTER_UID_ID: [u8; 2] = [0x73, 0xC4];
const CHAPTER_TIME_START_ID: [u8; 1] = [0x91];
const CHAPTER_TIME_END_ID: [u8; 1] = [0x92];
const CHAPTER_DISPLAY_ID: [u8; 1] = [0x80];
const CHAP_STRING_ID: [u8; 1] = [0x85];

const ATTACHMENTS_ID: [u8; 4] = [0x19, 0x41, 0xA4, 0x69];
const ATTACHED_FILE_ID: [u8; 2] = [0x61, 0xA7];
const FILE_DESCRIPTION_ID: [u8; 2] = [0x46, 0x7E];
const FILE_NAME_ID: [u8; 2] = [0x46, 0x6E];
const FILE_MIME_TYPE_ID: [u8; 2] = [0x46, 0x60];
const FILE_DATA_ID: [u8; 2] = [0x46, 0x5C];
const FILE_UID_ID: [u8; 2] = [0x46, 0xAE];

const TRACKS_ID: [u8; 4] = [0x16, 0x54, 0xAE, 0x6B];
const TRACK_ENTRY_ID: [u8; 1] = [0xAE];
// TrackEntry's own TrackUID, distinct from TARGETS_ID's TagTrackUID above
// despite the similarly swapped-nibble IDs (0x73C5 vs 0x63C5).
const TRACK_ENTRY_UID_ID: [u8; 2] = [0x73, 0xC5];
const CODEC_ID_ID: [u8; 1] = [0x86];
const AUDIO_ID: [u8; 1] = [0xE1];
const SAMPLING_FREQUENCY_ID: [u8; 1] = [0xB5];
const CHANNELS_ID: [u8; 1] = [0x9F];
const BIT_DEPTH_ID: [u8; 2] = [0x62, 0x64];

/// Parses every `EditionEntry` under the first top-level `Chapters` element.
pub fn parse_chapters(data: &[u8], root: &[Element]) -> Vec<Edition> {
    let Some(chapters_elem) = root.iter().find_map(|e| e.find(Id::new(&CHAPTERS_ID))) else {
        return Vec::new();
    };

    chapters_elem
        .children_with_id(Id::new(&EDITION_ENTRY_ID))
        .map(|edition_elem| {
            let uid = edition_elem.find(Id::new(&EDITION_UID_ID)).and_then(|e| read_uint(data, e));
            let hidden =
                edition_elem.find(Id::new(&EDITION_FLAG_HIDDEN_ID)).and_then(|e| read_uint(data, e)) == Some(1);
            let default =
                edition_elem.find(Id::new(&EDITION_FLAG_DEFAULT_ID)).and_then(|e| read_uint(data, e)) == Some(1);

            let chapters = edition_elem
                .children_with_id(Id::new(&CHAPTER_ATOM_ID))
                .map(|atom| parse_chapter_atom(data, atom))
                .collect();

            Edition { uid, hidden, default, chapters }
        })
        .collect()
}

/// Converts `ChapterTimeStart`/`ChapterTimeEnd`, which Matroska stores in
/// nanoseconds, down to the milliseconds [`Chapter`] uses.
fn parse_chapter_atom(data: &[u8], atom: &Element) -> Chapter {
    let uid = atom.find(Id::new(&CHAPTER_UID_ID)).and_then(|e| read_uint(data, e));
    let start_ms = atom.find(Id::new(&CHAPTER_TIME_START_ID)).and_then(|e| read_uint(data, e)).map(|ns| ns / 1_000_000);
    let end_ms = atom.find(Id::new(&CHAPTER_TIME_END_ID)).and_then(|e| read_uint(data, e)).map(|ns| ns / 1_000_000);
    let title = atom
        .find(Id::new(&CHAPTER_DISPLAY_ID))
        .and_then(|display| display.find(Id::new(&CHAP_STRING_ID)))
        .map(|e| read_string(data, e));

    let children = atom.children_with_id(Id::new(&CHAPTER_ATOM_ID)).map(|child| parse_chapter_atom(data, child)).collect();

    Chapter { uid, start_ms, end_ms, title, children }
}

/// Parses every `AttachedFile` under the first top-level `Attachments`
/// element.
pub fn parse_attachments(data: &[u8], root: &[Element]) -> Vec<Attachment> {
    let Some(attachments_elem) = root.iter().find_map(|e| e.find(Id::new(&ATTACHMENTS_ID))) else {
        return Vec::new();
    };

    attachments_elem
        .children_with_id(Id::new(&ATTACHED_FILE_ID))
        .map(|file_elem| Attachment {
            uid: file_elem.find(Id::new(&FILE_UID_ID)).and_then(|e| read_uint(data, e)),
            filename: file_elem.find(Id::new(&FILE_NAME_ID)).map(|e| read_string(data, e)).unwrap_or_default(),
            mime_type: file_elem.find(Id::new(&FILE_MIME_TYPE_ID)).map(|e| read_string(data, e)).unwrap_or_default(),
            description: file_elem.find(Id::new(&FILE_DESCRIPTION_ID)).map(|e| read_string(data, e)),
            data: file_elem.find(Id::new(&FILE_DATA_ID)).map(|e| read_binary(data, e)).unwrap_or_default(),
        })
        .collect()
}

/// Parses every `TrackEntry` under the first top-level `Tracks` element.
/// `Track::id` is set from `TrackUID` rather than `TrackNumber` so it lines
/// up with the identifier [`SimpleTag::target_track`] (itself read from
/// `TagTrackUID`) uses to associate a tag with a track.
pub fn parse_tracks(data: &[u8], root: &[Element]) -> Vec<Track> {
    let Some(tracks_elem) = root.iter().find_map(|e| e.find(Id::new(&TRACKS_ID))) else {
        return Vec::new();
    };

    tracks_elem.children_with_id(Id::new(&TRACK_ENTRY_ID)).map(|entry| parse_track_entry(data, entry)).collect()
}

fn parse_track_entry(data: &[u8], entry: &Element) -> Track {
    let mut track = Track::new();

    track.id = entry.find(Id::new(&TRACK_ENTRY_UID_ID)).and_then(|e| read_uint(data, e));
    track.codec = entry.find(Id::new(&CODEC_ID_ID)).map(|e| read_string(data, e));

    if let Some(audio) = entry.find(Id::new(&AUDIO_ID)) {
        track.sample_rate =
            audio.find(Id::new(&SAMPLING_FREQUENCY_ID)).and_then(|e| read_float(data, e)).map(|hz| hz.round() as u32);
        track.channels = audio.find(Id::new(&CHANNELS_ID)).and_then(|e| read_uint(data, e)).map(|c| c as u8);
        track.bits_per_sample = audio.find(Id::new(&BIT_DEPTH_ID)).and_then(|e| read_uint(data, e)).map(|b| b as u8);
    }

    track
}

/// Reads an EBML `float` element: IEEE754, big-endian, either 4 or 8 bytes
/// wide (Matroska allows both for `SamplingFrequency`).
fn read_float(data: &[u8], element: &Element) -> Option<f64> {
    let start = element.data_offset() as usize;
    let end = start + element.data_size.unwrap_or(0) as usize;
    let bytes = data.get(start..end)?;
    match bytes.len() {
        4 => Some(f32::from_be_bytes(bytes.try_into().ok()?) as f64),
        8 => Some(f64::from_be_bytes(bytes.try_into().ok()?)),
        _ => None,
    }
}

fn read_binary(data: &[u8], element: &Element) -> Vec<u8> {
    let start = element.data_offset() as usize;
    let end = start + element.data_size.unwrap_or(0) as usize;
    data.get(start..end.min(data.len())).unwrap_or_default().to_vec()
}

/// Splices a freshly rendered `Tags` element into a full EBML byte buffer in
/// place of the existing one, patching every ancestor master element's size
/// vint for the length delta. An ancestor with EBML's "unknown size"
/// sentinel (common for a streamed `Segment`) needs no patch at all; an
/// ancestor whose size vint isn't wide enough to hold the new value without
/// growing fails with [`Error::WontFit`] rather than shifting the rest of
/// the header, which this rewrite -- unlike a full re-mux -- never does.
pub fn rewrite(data: &[u8], tag: &MkvTag) -> Result<Vec<u8>> {
    let root = parse_elements(data)?;
    let tags_elem = root.iter().find_map(|e| e.find(Id::new(&TAGS_ID))).ok_or(Error::NotFound)?;

    let old_start = tags_elem.offset as usize;
    let old_end = tags_elem.end_offset().ok_or(Error::MalformedData)? as usize;

    let new_tags = render_tags_element(tag);
    let delta = new_tags.len() as i64 - (old_end - old_start) as i64;

    let mut out = Vec::with_capacity(data.len() + delta.max(0) as usize);
    out.extend(&data[..old_start]);
    out.extend(&new_tags);
    out.extend(&data[old_end..]);

    for ancestor in element::ancestors_containing(&root, tags_elem.offset) {
        patch_ancestor_size(&mut out, ancestor, delta)?;
    }

    Ok(out)
}

fn patch_ancestor_size(out: &mut [u8], ancestor: &Element, delta: i64) -> Result<()> {
    let data_size = match ancestor.data_size {
        Some(size) => size,
        None => return Ok(()),
    };

    let id_len = ancestor.id.as_bytes().len() as u64;
    let size_start = (ancestor.offset + id_len) as usize;
    let size_len = (ancestor.header_size - id_len) as usize;

    let new_size = (data_size as i64 + delta) as u64;
    let rendered = render_vint(new_size, None);
    if rendered.len() != size_len {
        return Err(Error::WontFit);
    }

    out[size_start..size_start + size_len].copy_from_slice(&rendered);
    Ok(())
}

fn render_element(id: Id, body: &[u8]) -> Vec<u8> {
    let mut out = render_id(id);
    out.extend(render_vint(body.len() as u64, None));
    out.extend(body);
    out
}

fn minimal_be_bytes(mut value: u64) -> Vec<u8> {
    if value == 0 {
        return vec![0];
    }

    let mut bytes = Vec::new();
    while value > 0 {
        bytes.push((value & 0xff) as u8);
        value >>= 8;
    }
    bytes.reverse();
    bytes
}

fn render_simple_tag(tag: &SimpleTag) -> Vec<u8> {
    let mut body = render_element(Id::new(&TAG_NAME_ID), tag.name.as_bytes());
    body.extend(render_element(Id::new(&TAG_STRING_ID), tag.value.as_bytes()));
    for child in &tag.children {
        body.extend(render_simple_tag(child));
    }
    render_element(Id::new(&SIMPLE_TAG_ID), &body)
}

/// Groups consecutive `simple_tags` sharing the same target track into one
/// `Tag` element each, matching how a real muxer lays out per-track tags
/// rather than repeating a `Targets` element per `SimpleTag`.
fn render_tags_element(tag: &MkvTag) -> Vec<u8> {
    let mut tags_body = Vec::new();
    let mut i = 0;

    while i < tag.simple_tags.len() {
        let target = tag.simple_tags[i].target_track;

        let mut simple_body = Vec::new();
        while i < tag.simple_tags.len() && tag.simple_tags[i].target_track == target {
            simple_body.extend(render_simple_tag(&tag.simple_tags[i]));
            i += 1;
        }

        let mut tag_body = Vec::new();
        if let Some(track) = target {
            let uid = render_element(Id::new(&TRACK_UID_ID), &minimal_be_bytes(track));
            tag_body.extend(render_element(Id::new(&TARGETS_ID), &uid));
        }
        tag_body.extend(simple_body);

        tags_body.extend(render_element(Id::new(&TAG_ID), &tag_body));
    }

    render_element(Id::new(&TAGS_ID), &tags_body)
}

fn read_string(data: &[u8], element: &Element) -> String {
    let start = element.data_offset() as usize;
    let end = start + element.data_size.unwrap_or(0) as usize;
    string::read_utf8(&data[start..end.min(data.len())])
}

fn read_uint(data: &[u8], element: &Element) -> Option<u64> {
    let start = element.data_offset() as usize;
    let end = start + element.data_size.unwrap_or(0) as usize;
    let bytes = data.get(start..end)?;
    let mut value = 0u64;
    for &b in bytes {
        value = (value << 8) | b as u64;
    }
    Some(value)
}

impl Tag for MkvTag {
    fn format_name(&self) -> &'static str {
        "Matroska"
    }

    fn target(&self) -> TagTarget {
        let mut track_uids: Vec<u64> = self.simple_tags.iter().filter_map(|t| t.target_track).collect();
        track_uids.sort_unstable();
        track_uids.dedup();

        if self.target_level.is_none() && track_uids.is_empty() {
            return TagTarget::Global;
        }

        TagTarget::Matroska(MatroskaTarget { level: self.target_level, track_uids, ..Default::default() })
    }

    fn fields(&self) -> Vec<KnownField> {
        self.known.keys().cloned().collect()
    }

    fn get(&self, field: &KnownField) -> Option<&crate::value::TagValue> {
        self.known.get(field)
    }

    fn set(&mut self, field: KnownField, value: crate::value::TagValue) {
        let name = match &field {
            KnownField::Custom(name) => name.clone(),
            other => match name_for_field(other) {
                Some(n) => n.to_string(),
                None => return,
            },
        };

        let text = value.to_display_string();
        self.simple_tags.retain(|t| !t.name.eq_ignore_ascii_case(&name));
        self.simple_tags.push(SimpleTag { name, value: text, target_track: None, children: Vec::new() });
        self.known.insert(field, value);
    }

    fn remove(&mut self, field: &KnownField) -> Option<crate::value::TagValue> {
        let name = match field {
            KnownField::Custom(name) => name.clone(),
            other => name_for_field(other)?.to_string(),
        };

        self.simple_tags.retain(|t| !t.name.eq_ignore_ascii_case(&name));
        self.known.remove(field)
    }

    fn clear(&mut self) {
        self.simple_tags.clear();
        self.known.clear();
    }

    fn supports_field(&self, _field: &KnownField) -> bool {
        true
    }

    fn native_id(&self, field: &KnownField) -> Option<String> {
        match field {
            KnownField::Custom(name) => Some(name.clone()),
            other => name_for_field(other).map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vint_round_trips_small_value() {
        let rendered = render_vint(42, None);
        let mut stream = BufStream::new(&rendered);
        let (value, _) = read_vint(&mut stream, true).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn vint_round_trips_multi_byte_value() {
        let rendered = render_vint(100_000, None);
        let mut stream = BufStream::new(&rendered);
        let (value, _) = read_vint(&mut stream, true).unwrap();
        assert_eq!(value, 100_000);
    }

    fn element(id: &[u8], body: &[u8]) -> Vec<u8> {
        let mut out = id.to_vec();
        out.extend(render_vint(body.len() as u64, None));
        out.extend(body);
        out
    }

    #[test]
    fn parses_simple_tag_title() {
        let name_elem = element(&[0x45, 0xA3], b"TITLE");
        let string_elem = element(&[0x44, 0x87], b"Dopesmoker");
        let mut simple_body = name_elem;
        simple_body.extend(string_elem);
        let simple_tag = element(&[0x67, 0xC8], &simple_body);
        let tag_elem = element(&[0x73, 0x73], &simple_tag);
        let tags_elem = element(&[0x10, 0x43, 0xA7, 0x70], &tag_elem);

        let root = parse_elements(&tags_elem).unwrap();
        let tag = MkvTag::parse(&tags_elem, &root).unwrap();

        assert_eq!(tag.get_text(&KnownField::Title), Some("Dopesmoker".to_string()));
    }

    #[test]
    fn rewrite_replaces_tags_element_and_patches_segment_size() {
        let name_elem = element(&[0x45, 0xA3], b"TITLE");
        let string_elem = element(&[0x44, 0x87], b"Old Title");
        let mut simple_body = name_elem;
        simple_body.extend(string_elem);
        let simple_tag = element(&[0x67, 0xC8], &simple_body);
        let tag_elem = element(&[0x73, 0x73], &simple_tag);
        let tags_elem = element(&[0x10, 0x43, 0xA7, 0x70], &tag_elem);

        let mut segment_body = element(&[0x16, 0x54, 0xAE, 0x6B], &[]); // empty Tracks, just filler
        segment_body.extend(&tags_elem);
        let segment = element(&[0x18, 0x53, 0x80, 0x67], &segment_body);

        let root = parse_elements(&segment).unwrap();
        let seg_elem = &root[0];
        let sub_root = &seg_elem.children;
        let mut tag = MkvTag::parse(&segment, sub_root).unwrap();
        tag.set(KnownField::Title, crate::value::TagValue::text("A Considerably Longer New Title"));

        let rewritten = rewrite(&segment, &tag).unwrap();

        let new_root = parse_elements(&rewritten).unwrap();
        let new_segment = &new_root[0];
        assert_eq!(new_segment.total_size().unwrap(), rewritten.len() as u64 - new_segment.offset);

        let new_tag = MkvTag::parse(&rewritten, &new_root[0].children).unwrap();
        assert_eq!(new_tag.get_text(&KnownField::Title), Some("A Considerably Longer New Title".to_string()));
    }

    #[test]
    fn parses_nested_simple_tag_and_round_trips_it() {
        let inner_name = element(&[0x45, 0xA3], b"SORT_WITH");
        let inner_value = element(&[0x44, 0x87], b"Dopesmoker, The");
        let mut inner_body = inner_name;
        inner_body.extend(inner_value);
        let inner = element(&[0x67, 0xC8], &inner_body);

        let outer_name = element(&[0x45, 0xA3], b"ARTIST");
        let outer_value = element(&[0x44, 0x87], b"Sleep");
        let mut outer_body = outer_name;
        outer_body.extend(outer_value);
        outer_body.extend(inner);
        let outer = element(&[0x67, 0xC8], &outer_body);

        let tag_elem = element(&[0x73, 0x73], &outer);
        let tags_elem = element(&[0x10, 0x43, 0xA7, 0x70], &tag_elem);

        let root = parse_elements(&tags_elem).unwrap();
        let tag = MkvTag::parse(&tags_elem, &root).unwrap();

        assert_eq!(tag.simple_tags.len(), 1);
        assert_eq!(tag.simple_tags[0].name, "ARTIST");
        assert_eq!(tag.simple_tags[0].children.len(), 1);
        assert_eq!(tag.simple_tags[0].children[0].name, "SORT_WITH");
        assert_eq!(tag.simple_tags[0].children[0].value, "Dopesmoker, The");

        let rendered = render_tags_element(&tag);
        let rendered_root = parse_elements(&rendered).unwrap();
        let reparsed = MkvTag::parse(&rendered, &rendered_root).unwrap();
        assert_eq!(reparsed.simple_tags[0].children[0].name, "SORT_WITH");
    }

    #[test]
    fn target_collects_track_uids_and_level() {
        let targets_body = {
            let mut body = element(&[0x68, 0xCA], &30u64.to_be_bytes()[4..]); // TargetTypeValue = Track
            body.extend(element(&[0x63, 0xC5], &7u64.to_be_bytes()[4..])); // TagTrackUID = 7
            body
        };
        let name_elem = element(&[0x45, 0xA3], b"TITLE");
        let value_elem = element(&[0x44, 0x87], b"Dopesmoker");
        let mut simple_body = name_elem;
        simple_body.extend(value_elem);
        let simple_tag = element(&[0x67, 0xC8], &simple_body);

        let mut tag_body = element(&[0x63, 0xC0], &targets_body);
        tag_body.extend(simple_tag);
        let tag_elem = element(&[0x73, 0x73], &tag_body);
        let tags_elem = element(&[0x10, 0x43, 0xA7, 0x70], &tag_elem);

        let root = parse_elements(&tags_elem).unwrap();
        let tag = MkvTag::parse(&tags_elem, &root).unwrap();

        match tag.target() {
            TagTarget::Matroska(target) => {
                assert_eq!(target.level, Some(MatroskaLevel::Track));
                assert_eq!(target.track_uids, vec![7]);
            }
            other => panic!("expected Matroska target, got {:?}", other),
        }
    }

    #[test]
    fn parses_chapters_with_nested_atoms_and_millisecond_times() {
        let display = element(&[0x80], &element(&[0x85], b"Intro"));
        let inner_atom = {
            let mut body = element(&[0x91], &1_000_000_000u64.to_be_bytes()[4..]); // 1s
            body.extend(element(&[0x92], &2_000_000_000u64.to_be_bytes()[4..])); // 2s
            body.extend(&display);
            element(&[0xB6], &body)
        };
        let outer_atom = {
            let mut body = element(&[0x91], &0u64.to_be_bytes()[4..]);
            body.extend(inner_atom);
            element(&[0xB6], &body)
        };
        let edition = element(&[0x45, 0xB9], &outer_atom);
        let chapters = element(&[0x10, 0x43, 0xA9, 0x70], &edition);

        let root = parse_elements(&chapters).unwrap();
        let editions = parse_chapters(&chapters, &root);

        assert_eq!(editions.len(), 1);
        assert_eq!(editions[0].chapters.len(), 1);
        let outer = &editions[0].chapters[0];
        assert_eq!(outer.start_ms, Some(0));
        assert_eq!(outer.children.len(), 1);
        assert_eq!(outer.children[0].start_ms, Some(1000));
        assert_eq!(outer.children[0].end_ms, Some(2000));
        assert_eq!(outer.children[0].title, Some("Intro".to_string()));
    }

    #[test]
    fn parses_attachments() {
        let file = {
            let mut body = element(&[0x46, 0x6E], b"cover.jpg");
            body.extend(element(&[0x46, 0x60], b"image/jpeg"));
            body.extend(element(&[0x46, 0x5C], &[1, 2, 3, 4]));
            element(&[0x61, 0xA7], &body)
        };
        let attachments = element(&[0x19, 0x41, 0xA4, 0x69], &file);

        let root = parse_elements(&attachments).unwrap();
        let parsed = parse_attachments(&attachments, &root);

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].filename, "cover.jpg");
        assert_eq!(parsed[0].mime_type, "image/jpeg");
        assert_eq!(parsed[0].data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn parses_an_audio_track_entry() {
        let audio = {
            let mut body = element(&[0xB5], &48_000.0f32.to_be_bytes());
            body.extend(element(&[0x9F], &[2]));
            body.extend(element(&[0x62, 0x64], &[16]));
            element(&[0xE1], &body)
        };
        let entry = {
            let mut body = element(&[0x73, 0xC5], &[55]);
            body.extend(element(&[0x86], b"A_OPUS"));
            body.extend(audio);
            element(&[0xAE], &body)
        };
        let tracks = element(&[0x16, 0x54, 0xAE, 0x6B], &entry);

        let root = parse_elements(&tracks).unwrap();
        let parsed = parse_tracks(&tracks, &root);

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].id, Some(55));
        assert_eq!(parsed[0].codec.as_deref(), Some("A_OPUS"));
        assert_eq!(parsed[0].sample_rate, Some(48_000));
        assert_eq!(parsed[0].channels, Some(2));
        assert_eq!(parsed[0].bits_per_sample, Some(16));
    }

    #[test]
    fn tracks_are_empty_without_a_tracks_element() {
        assert_eq!(parse_tracks(&[], &[]), Vec::new());
    }
}
