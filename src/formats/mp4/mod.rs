//! The MP4/ISOBMFF box tree, the `ilst` iTunes-style metadata tag built on
//! top of it, and chunk-offset-table patching for when a tag rewrite
//! changes the size of `moov` and every chunk offset recorded in `stbl`
//! needs to shift to match.

use crate::core::io::BufStream;
use crate::element::{self, Element, ElementCodec, Id, Kind};
use crate::error::{Error, Result};
use crate::string;
use crate::tag::{Tag, TagTarget};
use crate::track::Track;
use crate::value::{KnownField, PictureType, TagValue};
use indexmap::IndexMap;

const MASTER_ATOMS: &[[u8; 4]] = &[
    *b"moov", *b"trak", *b"mdia", *b"minf", *b"stbl", *b"udta", *b"meta", *b"ilst", *b"moof", *b"traf", *b"edts",
    *b"dinf", *b"mvex", *b"stsd",
];

/// Atoms that carry a 4-byte full-box version/flags header before their
/// usual payload, even when they also have children (`meta` is the odd
/// one out in ISOBMFF: a full box that's also a container).
const FULL_BOX_ATOMS: &[[u8; 4]] = &[*b"meta"];

pub struct Mp4Codec;

impl ElementCodec for Mp4Codec {
    fn read_header(&self, stream: &mut BufStream) -> Result<(Id, Kind, u64)> {
        let size32 = stream.read_be_u32()?;
        let fourcc = stream.read_array::<4>()?;
        let id = Id::fourcc(fourcc);

        let data_size = match size32 {
            0 => u64::MAX,
            1 => {
                let large = stream.read_be_u64()?;
                large.checked_sub(16).ok_or(Error::MalformedData)?
            }
            n => (n as u64).checked_sub(8).ok_or(Error::MalformedData)?,
        };

        let kind = if self.is_master(id) { Kind::Master } else { Kind::Leaf };
        Ok((id, kind, data_size))
    }

    fn render_header(&self, id: Id, _kind: Kind, data_size: u64) -> Vec<u8> {
        let mut out = Vec::new();
        let total = data_size + 8;

        if total <= u32::MAX as u64 {
            out.extend((total as u32).to_be_bytes());
            out.extend(id.as_bytes());
        } else {
            out.extend(1u32.to_be_bytes());
            out.extend(id.as_bytes());
            out.extend((total + 8).to_be_bytes());
        }

        out
    }

    fn is_master(&self, id: Id) -> bool {
        MASTER_ATOMS.iter().any(|fourcc| id.as_bytes() == fourcc)
    }
}

/// Parses the top-level box tree of an MP4 file from its full byte buffer.
pub fn parse_boxes(data: &[u8]) -> Result<Vec<Element>> {
    let codec = Mp4Codec;
    let mut stream = BufStream::new(data);
    element::parse_tree(&codec, &mut stream, 0)
}

fn is_full_box(id: Id) -> bool {
    FULL_BOX_ATOMS.iter().any(|fourcc| id.as_bytes() == fourcc)
}

/// Extracts an atom's data payload, skipping the leading 4-byte
/// version/flags header on full boxes that also contain children.
fn element_payload<'a>(data: &'a [u8], element: &Element) -> &'a [u8] {
    let start = element.data_offset() as usize;
    let end = start + element.data_size.unwrap_or(0) as usize;
    let payload = &data[start..end];

    if is_full_box(element.id) && payload.len() >= 4 {
        &payload[4..]
    } else {
        payload
    }
}

/// Walks every `trak` under `moov`, pulling the id, duration, codec, and (for
/// audio tracks) channel count and sample rate out of `tkhd`/`mdia/mdhd`/
/// `mdia/hdlr`/`mdia/minf/stbl/stsd`. None of these four boxes are full
/// boxes this crate's `element_payload` already strips a version/flags
/// header from, so their leading 4 bytes are skipped by hand here instead.
pub fn parse_tracks(data: &[u8], root: &[Element]) -> Vec<Track> {
    let Some(moov) = root.iter().find(|e| e.id == Id::fourcc(*b"moov")) else {
        return Vec::new();
    };

    moov.children_with_id(Id::fourcc(*b"trak")).filter_map(|trak| parse_track(data, trak)).collect()
}

fn raw_payload<'a>(data: &'a [u8], element: &Element) -> &'a [u8] {
    let start = element.data_offset() as usize;
    let end = start + element.data_size.unwrap_or(0) as usize;
    &data[start..end.min(data.len())]
}

fn parse_track(data: &[u8], trak: &Element) -> Option<Track> {
    let mut track = Track::new();

    if let Some(tkhd) = trak.find(Id::fourcc(*b"tkhd")) {
        if let Some(track_id) = parse_tkhd_track_id(raw_payload(data, tkhd)) {
            track.id = Some(track_id as u64);
        }
    }

    let mdia = trak.find(Id::fourcc(*b"mdia"))?;

    if let Some(mdhd) = mdia.find(Id::fourcc(*b"mdhd")) {
        if let Some((scale, duration)) = parse_mdhd(raw_payload(data, mdhd)) {
            if scale > 0 {
                track.duration_ms = Some(duration.saturating_mul(1000) / scale as u64);
            }
        }
    }

    let is_audio = mdia
        .find(Id::fourcc(*b"hdlr"))
        .map(|hdlr| raw_payload(data, hdlr))
        .and_then(|payload| payload.get(8..12))
        == Some(b"soun".as_slice());

    if let Some(stsd) = mdia.walk().find(|e| e.id.as_bytes() == b"stsd") {
        if let Some((fourcc, entry_start)) = first_sample_entry(data, stsd) {
            track.codec = Some(String::from_utf8_lossy(&fourcc).into_owned());

            if is_audio {
                if let Some((channels, sample_rate)) = parse_audio_sample_entry(data, entry_start) {
                    track.channels = Some(channels as u8);
                    if sample_rate > 0 {
                        track.sample_rate = Some(sample_rate);
                    }
                }
            }
        }
    }

    Some(track)
}

fn parse_tkhd_track_id(payload: &[u8]) -> Option<u32> {
    let version = *payload.first()?;
    let track_id_offset = if version == 1 { 20 } else { 12 };
    Some(u32::from_be_bytes(payload.get(track_id_offset..track_id_offset + 4)?.try_into().ok()?))
}

fn parse_mdhd(payload: &[u8]) -> Option<(u32, u64)> {
    let version = *payload.first()?;
    if version == 1 {
        let timescale = u32::from_be_bytes(payload.get(20..24)?.try_into().ok()?);
        let duration = u64::from_be_bytes(payload.get(24..32)?.try_into().ok()?);
        Some((timescale, duration))
    } else {
        let timescale = u32::from_be_bytes(payload.get(12..16)?.try_into().ok()?);
        let duration = u32::from_be_bytes(payload.get(16..20)?.try_into().ok()?) as u64;
        Some((timescale, duration))
    }
}

/// `stsd`'s own payload is version(1)+flags(3)+entry_count(4) followed
/// directly by the first sample entry's own `size`+fourcc atom header --
/// `stsd` is walked as a master atom, but that leading 8-byte header isn't a
/// child atom, so the first entry's position is computed directly from
/// `data` rather than from `stsd.children`.
fn first_sample_entry(data: &[u8], stsd: &Element) -> Option<([u8; 4], usize)> {
    let start = stsd.data_offset() as usize;
    let entry_start = start + 8;
    let fourcc: [u8; 4] = data.get(entry_start + 4..entry_start + 8)?.try_into().ok()?;
    Some((fourcc, entry_start))
}

/// An audio sample entry's fixed fields, starting right after its own
/// 8-byte `size`+fourcc header: `reserved(6) + data_reference_index(2) +
/// version(2) + revision(2) + vendor(4) + channel_count(2) + sample_size(2)
/// + compression_id(2) + packet_size(2) + sample_rate(4, 16.16 fixed)`.
fn parse_audio_sample_entry(data: &[u8], entry_start: usize) -> Option<(u16, u32)> {
    let body = entry_start + 8;
    let channels_offset = body + 6 + 2 + 2 + 2 + 4;
    let sample_rate_offset = channels_offset + 2 + 2 + 2 + 2;

    let channels = u16::from_be_bytes(data.get(channels_offset..channels_offset + 2)?.try_into().ok()?);
    let rate_bits = u32::from_be_bytes(data.get(sample_rate_offset..sample_rate_offset + 4)?.try_into().ok()?);
    Some((channels, rate_bits >> 16))
}

/// One `ilst` entry: a FourCC (or, for freeform `----` tags, a
/// `mean:name` pair) paired with the decoded value of its `data` child.
#[derive(Debug, Clone)]
struct IlstEntry {
    fourcc: [u8; 4],
    freeform_name: Option<String>,
    value: TagValue,
}

#[derive(Debug, Clone, Default)]
pub struct Mp4Tag {
    entries: Vec<IlstEntry>,
    known: IndexMap<KnownField, TagValue>,
}

const TEXT_ATOMS: &[([u8; 4], KnownField)] = &[
    (*b"\xa9nam", KnownField::Title),
    (*b"\xa9ART", KnownField::Artist),
    (*b"aART", KnownField::AlbumArtist),
    (*b"\xa9alb", KnownField::Album),
    (*b"\xa9gen", KnownField::Genre),
    (*b"\xa9day", KnownField::Date),
    (*b"\xa9wrt", KnownField::Composer),
    (*b"\xa9cmt", KnownField::Comment),
    (*b"\xa9lyr", KnownField::Lyrics),
    (*b"\xa9too", KnownField::EncodedBy),
    (*b"cprt", KnownField::Copyright),
    (*b"\xa9grp", KnownField::Grouping),
];

fn field_for_fourcc(fourcc: &[u8; 4]) -> Option<KnownField> {
    TEXT_ATOMS.iter().find(|(fc, _)| fc == fourcc).map(|(_, f)| f.clone())
}

fn fourcc_for_field(field: &KnownField) -> Option<[u8; 4]> {
    match field {
        KnownField::TrackNumber => Some(*b"trkn"),
        KnownField::DiscNumber => Some(*b"disk"),
        KnownField::Bpm => Some(*b"tmpo"),
        KnownField::Compilation => Some(*b"cpil"),
        KnownField::Picture => Some(*b"covr"),
        other => TEXT_ATOMS.iter().find(|(_, f)| f == other).map(|(fc, _)| *fc),
    }
}

impl Mp4Tag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the `ilst` atom's children out of a full MP4 byte buffer
    /// already walked into a box tree.
    pub fn parse(data: &[u8], root: &[Element]) -> Result<Self> {
        let ilst = root
            .iter()
            .find_map(|e| e.find(Id::fourcc(*b"ilst")))
            .ok_or(Error::NotFound)?;

        let mut tag = Mp4Tag::new();

        for item in &ilst.children {
            if let Some(entry) = parse_ilst_item(data, item) {
                tag.push(entry);
            }
        }

        tag.rebuild_known();
        Ok(tag)
    }

    fn push(&mut self, entry: IlstEntry) {
        self.entries.push(entry);
    }

    fn rebuild_known(&mut self) {
        self.known.clear();

        for entry in &self.entries {
            let field = match (&entry.freeform_name, field_for_fourcc(&entry.fourcc)) {
                (Some(name), _) => KnownField::Custom(name.clone()),
                (None, Some(field)) => field,
                (None, None) => match &entry.fourcc {
                    b"trkn" => KnownField::TrackNumber,
                    b"disk" => KnownField::DiscNumber,
                    b"tmpo" => KnownField::Bpm,
                    b"cpil" => KnownField::Compilation,
                    b"covr" => KnownField::Picture,
                    _ => continue,
                },
            };

            self.known.insert(field, entry.value.clone());
        }
    }

    /// Renders the `ilst` atom's children (not the `ilst` wrapper itself)
    /// as raw box bytes.
    pub fn render_items(&self) -> Vec<u8> {
        let codec = Mp4Codec;
        let mut out = Vec::new();

        for entry in &self.entries {
            let data_atom = render_data_atom(&entry.value);
            let mut body = Vec::new();

            if let Some(name) = &entry.freeform_name {
                let (mean, name_part) = name.split_once(':').unwrap_or(("com.apple.iTunes", name.as_str()));
                body.extend(render_simple_atom(*b"mean", mean.as_bytes()));
                body.extend(render_simple_atom(*b"name", name_part.as_bytes()));
            }

            body.extend(&data_atom);

            out.extend(codec.render_header(Id::fourcc(entry.fourcc), Kind::Master, body.len() as u64));
            out.extend(body);
        }

        out
    }
}

fn render_simple_atom(fourcc: [u8; 4], data: &[u8]) -> Vec<u8> {
    let codec = Mp4Codec;
    let mut out = codec.render_header(Id::fourcc(fourcc), Kind::Leaf, data.len() as u64);
    out.extend(data);
    out
}

fn render_data_atom(value: &TagValue) -> Vec<u8> {
    let codec = Mp4Codec;
    let (type_flag, payload) = encode_value(value);

    let mut body = Vec::new();
    body.extend((type_flag as u32).to_be_bytes());
    body.extend(0u32.to_be_bytes()); // locale
    body.extend(&payload);

    let mut out = codec.render_header(Id::fourcc(*b"data"), Kind::Leaf, body.len() as u64);
    out.extend(body);
    out
}

const TYPE_UTF8: u32 = 1;
const TYPE_JPEG: u32 = 13;
const TYPE_PNG: u32 = 14;
const TYPE_INTEGER: u32 = 21;
const TYPE_BINARY: u32 = 0;

fn encode_value(value: &TagValue) -> (u32, Vec<u8>) {
    match value {
        TagValue::Text { text, .. } => (TYPE_UTF8, text.join(";").into_bytes()),
        TagValue::Integer(n) => (TYPE_INTEGER, (*n as u16).to_be_bytes().to_vec()),
        TagValue::PositionInSet { position, total } => {
            let mut data = vec![0u8, 0];
            data.extend((position.unwrap_or(0) as u16).to_be_bytes());
            data.extend((total.unwrap_or(0) as u16).to_be_bytes());
            data.extend([0u8, 0]);
            (TYPE_BINARY, data)
        }
        TagValue::Picture { mime, data, .. } => {
            let kind = if mime.contains("png") { TYPE_PNG } else { TYPE_JPEG };
            (kind, data.clone())
        }
        TagValue::Binary { data, .. } => (TYPE_BINARY, data.clone()),
        TagValue::StandardGenre(index) => (TYPE_INTEGER, ((*index as u16) + 1).to_be_bytes().to_vec()),
        TagValue::Timestamp { year, .. } => (TYPE_UTF8, year.map(|y| y.to_string()).unwrap_or_default().into_bytes()),
        TagValue::Empty => (TYPE_BINARY, Vec::new()),
    }
}

fn parse_ilst_item(data: &[u8], item: &Element) -> Option<IlstEntry> {
    let fourcc: [u8; 4] = item.id.as_bytes().try_into().ok()?;

    let data_child = item.children.iter().find(|c| c.id.as_bytes() == b"data")?;
    let payload = element_payload(data, data_child);
    if payload.len() < 8 {
        return None;
    }

    let type_flag = u32::from_be_bytes(payload[0..4].try_into().ok()?);
    let body = &payload[8..];

    let value = decode_value(&fourcc, type_flag, body);

    let freeform_name = if &fourcc == b"----" {
        let mean = item.children.iter().find(|c| c.id.as_bytes() == b"mean").map(|c| element_payload(data, c));
        let name = item.children.iter().find(|c| c.id.as_bytes() == b"name").map(|c| element_payload(data, c));

        match (mean, name) {
            (Some(mean), Some(name)) => {
                Some(format!("{}:{}", string::read_utf8(mean), string::read_utf8(name)))
            }
            _ => None,
        }
    } else {
        None
    };

    Some(IlstEntry { fourcc, freeform_name, value })
}

fn decode_value(fourcc: &[u8; 4], type_flag: u32, body: &[u8]) -> TagValue {
    match fourcc {
        b"trkn" | b"disk" if body.len() >= 6 => {
            let position = u16::from_be_bytes([body[2], body[3]]);
            let total = u16::from_be_bytes([body[4], body[5]]);
            TagValue::PositionInSet {
                position: (position != 0).then_some(position as u32),
                total: (total != 0).then_some(total as u32),
            }
        }
        b"tmpo" if body.len() >= 2 => TagValue::Integer(u16::from_be_bytes([body[0], body[1]]) as i64),
        b"cpil" if !body.is_empty() => TagValue::Integer(body[0] as i64),
        b"covr" => TagValue::Picture {
            mime: if type_flag == TYPE_PNG { "image/png".to_string() } else { "image/jpeg".to_string() },
            description: String::new(),
            kind: PictureType::CoverFront,
            data: body.to_vec(),
        },
        _ if type_flag == TYPE_UTF8 => TagValue::text(string::read_utf8(body)),
        _ if type_flag == TYPE_INTEGER => {
            let n = match body.len() {
                1 => body[0] as i64,
                2 => u16::from_be_bytes([body[0], body[1]]) as i64,
                4 => u32::from_be_bytes(body[0..4].try_into().unwrap()) as i64,
                _ => 0,
            };
            TagValue::Integer(n)
        }
        _ => TagValue::Binary { description: String::new(), data: body.to_vec() },
    }
}

impl Tag for Mp4Tag {
    fn format_name(&self) -> &'static str {
        "MP4"
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
        let (fourcc, freeform_name) = match &field {
            KnownField::Custom(name) => (*b"----", Some(name.clone())),
            other => match fourcc_for_field(other) {
                Some(fc) => (fc, None),
                None => return,
            },
        };

        self.entries.retain(|e| !(e.fourcc == fourcc && e.freeform_name == freeform_name));
        self.entries.push(IlstEntry { fourcc, freeform_name, value: value.clone() });
        self.known.insert(field, value);
    }

    fn remove(&mut self, field: &KnownField) -> Option<TagValue> {
        let (fourcc, freeform_name) = match field {
            KnownField::Custom(name) => (*b"----", Some(name.clone())),
            other => (fourcc_for_field(other)?, None),
        };

        self.entries.retain(|e| !(e.fourcc == fourcc && e.freeform_name == freeform_name));
        self.known.remove(field)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.known.clear();
    }

    fn supports_field(&self, field: &KnownField) -> bool {
        matches!(field, KnownField::Custom(_)) || fourcc_for_field(field).is_some()
    }

    fn native_id(&self, field: &KnownField) -> Option<String> {
        match field {
            KnownField::Custom(name) => Some(format!("----:{}", name)),
            other => fourcc_for_field(other).map(|fc| String::from_utf8_lossy(&fc).into_owned()),
        }
    }
}

/// Adjusts every entry of an `stco`/`co64` chunk-offset table in place by
/// `delta` bytes, used when a tag rewrite shifts the position of `mdat`
/// relative to `moov`.
pub fn shift_chunk_offsets(is_64bit: bool, payload: &mut [u8], delta: i64) -> Result<()> {
    if payload.len() < 8 {
        return Err(Error::MalformedData);
    }

    let count = u32::from_be_bytes(payload[4..8].try_into().unwrap()) as usize;
    let entry_size = if is_64bit { 8 } else { 4 };
    let needed = 8 + count * entry_size;

    if payload.len() < needed {
        return Err(Error::MalformedData);
    }

    for i in 0..count {
        let start = 8 + i * entry_size;

        if is_64bit {
            let bytes: [u8; 8] = payload[start..start + 8].try_into().unwrap();
            let shifted = (u64::from_be_bytes(bytes) as i64 + delta) as u64;
            payload[start..start + 8].copy_from_slice(&shifted.to_be_bytes());
        } else {
            let bytes: [u8; 4] = payload[start..start + 4].try_into().unwrap();
            let shifted = (u32::from_be_bytes(bytes) as i64 + delta) as u32;
            payload[start..start + 4].copy_from_slice(&shifted.to_be_bytes());
        }
    }

    Ok(())
}

/// Splices a new `ilst` payload into a full MP4 byte buffer: patches every
/// ancestor box's size field (`udta`, `meta`, `moov`) for the length delta,
/// and -- if `mdat` follows `moov` in the file, the common "non-faststart"
/// layout -- shifts every `stco`/`co64` chunk offset by the same delta so
/// sample data addresses stay correct.
pub fn rewrite(data: &[u8], tag: &Mp4Tag) -> Result<Vec<u8>> {
    let root = parse_boxes(data)?;

    let moov = root.iter().find(|e| e.id == Id::fourcc(*b"moov")).ok_or(Error::NotFound)?;
    let ilst = moov.find(Id::fourcc(*b"ilst")).ok_or(Error::NotFound)?;

    let old_start = ilst.data_offset() as usize;
    let old_end = old_start + ilst.data_size.unwrap_or(0) as usize;
    let new_items = tag.render_items();
    let delta = new_items.len() as i64 - (old_end - old_start) as i64;

    let mut out = Vec::with_capacity(data.len() + delta.max(0) as usize);
    out.extend(&data[..old_start]);
    out.extend(&new_items);
    out.extend(&data[old_end..]);

    for ancestor in crate::element::ancestors_containing(&root, ilst.offset) {
        patch_box_size(&mut out, ancestor, delta)?;
    }

    let mdat = root.iter().find(|e| e.id == Id::fourcc(*b"mdat"));
    if let Some(mdat) = mdat {
        if mdat.offset > moov.offset {
            for stbl in moov.walk().filter(|e| e.id.as_bytes() == b"stbl") {
                shift_stbl_offsets(&mut out, stbl, old_end, delta)?;
            }
        }
    }

    Ok(out)
}

/// Reorders the top-level `moov` box to sit immediately before or after
/// `mdat`, patching every `stco`/`co64` chunk offset for the resulting shift
/// in `mdat`'s file position. `moov` before `mdat` ("fast start") lets a
/// player begin decoding before the whole file has downloaded; some tools
/// prefer the opposite layout so a tag edit that doesn't change `mdat`'s
/// size never has to touch it at all. A no-op if `moov` is already on the
/// requested side.
pub fn relocate_moov(data: &[u8], want_before_mdat: bool) -> Result<Vec<u8>> {
    let root = parse_boxes(data)?;

    let moov_idx = root.iter().position(|e| e.id == Id::fourcc(*b"moov")).ok_or(Error::NotFound)?;
    let mdat_idx = root.iter().position(|e| e.id == Id::fourcc(*b"mdat")).ok_or(Error::NotFound)?;

    if (moov_idx < mdat_idx) == want_before_mdat {
        return Ok(data.to_vec());
    }

    let old_mdat_data_offset = root[mdat_idx].data_offset();

    let mut spans: Vec<&[u8]> = root
        .iter()
        .map(|e| {
            let end = e.end_offset().unwrap_or(data.len() as u64) as usize;
            &data[e.offset as usize..end]
        })
        .collect();

    let moov_span = spans.remove(moov_idx);
    let mdat_pos = if moov_idx < mdat_idx { mdat_idx - 1 } else { mdat_idx };
    let insert_at = if want_before_mdat { mdat_pos } else { mdat_pos + 1 };
    spans.insert(insert_at, moov_span);

    let mut out = Vec::with_capacity(data.len());
    for span in &spans {
        out.extend_from_slice(span);
    }

    let new_root = parse_boxes(&out)?;
    let new_mdat = new_root.iter().find(|e| e.id == Id::fourcc(*b"mdat")).ok_or(Error::MalformedData)?;
    let delta = new_mdat.data_offset() as i64 - old_mdat_data_offset as i64;

    if delta != 0 {
        let new_moov = new_root.iter().find(|e| e.id == Id::fourcc(*b"moov")).ok_or(Error::MalformedData)?;
        for stbl in new_moov.walk().filter(|e| e.id.as_bytes() == b"stbl") {
            for table in stbl.children.iter() {
                let is_64bit = match table.id.as_bytes() {
                    b"stco" => false,
                    b"co64" => true,
                    _ => continue,
                };

                let start = table.data_offset() as usize;
                let end = start + table.data_size.unwrap_or(0) as usize;
                shift_chunk_offsets(is_64bit, &mut out[start..end], delta)?;
            }
        }
    }

    Ok(out)
}

/// `element`'s offsets were computed against the pre-splice buffer; any box
/// that sits at or after the spliced-out `ilst` payload has shifted by
/// `delta` bytes in the output buffer.
fn remap(offset: u64, old_end: usize, delta: i64) -> usize {
    if offset as usize >= old_end {
        (offset as i64 + delta) as usize
    } else {
        offset as usize
    }
}

fn patch_box_size(out: &mut [u8], element: &Element, delta: i64) -> Result<()> {
    let size32 = u32::from_be_bytes(out[element.offset as usize..element.offset as usize + 4].try_into().unwrap());

    if size32 == 1 {
        let pos = element.offset as usize + 8;
        let old = u64::from_be_bytes(out[pos..pos + 8].try_into().unwrap());
        let new = (old as i64 + delta) as u64;
        out[pos..pos + 8].copy_from_slice(&new.to_be_bytes());
    } else if size32 != 0 {
        let new = (size32 as i64 + delta) as u32;
        out[element.offset as usize..element.offset as usize + 4].copy_from_slice(&new.to_be_bytes());
    }

    Ok(())
}

fn shift_stbl_offsets(out: &mut [u8], stbl: &Element, old_end: usize, delta: i64) -> Result<()> {
    for table in stbl.children.iter() {
        let is_64bit = match table.id.as_bytes() {
            b"stco" => false,
            b"co64" => true,
            _ => continue,
        };

        let start = remap(table.data_offset(), old_end, delta);
        let end = start + table.data_size.unwrap_or(0) as usize;
        shift_chunk_offsets(is_64bit, &mut out[start..end], delta)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(fourcc: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = ((body.len() + 8) as u32).to_be_bytes().to_vec();
        out.extend(fourcc);
        out.extend(body);
        out
    }

    #[test]
    fn reads_header_with_normal_size() {
        let bytes = atom(b"free", &[1, 2, 3]);
        let mut stream = BufStream::new(&bytes);
        let (id, kind, size) = Mp4Codec.read_header(&mut stream).unwrap();
        assert_eq!(id.as_bytes(), b"free");
        assert_eq!(kind, Kind::Leaf);
        assert_eq!(size, 3);
    }

    #[test]
    fn parses_nested_ilst_title() {
        let data_atom = {
            let mut body = 1u32.to_be_bytes().to_vec(); // type = utf8
            body.extend(0u32.to_be_bytes());
            body.extend(b"Hello");
            atom(b"data", &body)
        };
        let nam_atom = atom(b"\xa9nam", &data_atom);
        let ilst_atom = atom(b"ilst", &nam_atom);
        let moov_atom = atom(b"moov", &ilst_atom);

        let root = parse_boxes(&moov_atom).unwrap();
        let tag = Mp4Tag::parse(&moov_atom, &root).unwrap();

        assert_eq!(tag.get_text(&KnownField::Title), Some("Hello".to_string()));
    }

    #[test]
    fn shifts_stco_offsets_forward() {
        let mut payload = vec![0, 0, 0, 0, 0, 0, 0, 2];
        payload.extend(100u32.to_be_bytes());
        payload.extend(200u32.to_be_bytes());

        shift_chunk_offsets(false, &mut payload, 50).unwrap();

        assert_eq!(u32::from_be_bytes(payload[8..12].try_into().unwrap()), 150);
        assert_eq!(u32::from_be_bytes(payload[12..16].try_into().unwrap()), 250);
    }

    #[test]
    fn rewrite_shifts_stco_after_ilst_grows() {
        let data_atom = {
            let mut body = 1u32.to_be_bytes().to_vec();
            body.extend(0u32.to_be_bytes());
            body.extend(b"Hi");
            atom(b"data", &body)
        };
        let nam_atom = atom(b"\xa9nam", &data_atom);
        let ilst_atom = atom(b"ilst", &nam_atom);

        let mut stco_body = 0u32.to_be_bytes().to_vec();
        stco_body.extend(1u32.to_be_bytes());
        stco_body.extend(500u32.to_be_bytes());
        let stco_atom = atom(b"stco", &stco_body);
        let stbl_atom = atom(b"stbl", &stco_atom);
        let minf_atom = atom(b"minf", &stbl_atom);
        let mdia_atom = atom(b"mdia", &minf_atom);
        let trak_atom = atom(b"trak", &mdia_atom);

        let mut moov_body = ilst_atom.clone();
        moov_body.extend(&trak_atom);
        let moov_atom = atom(b"moov", &moov_body);

        let mdat_atom = atom(b"mdat", &[0u8; 16]);

        let mut file = moov_atom.clone();
        file.extend(&mdat_atom);

        let root = parse_boxes(&file).unwrap();
        let mut tag = Mp4Tag::parse(&file, &root).unwrap();
        tag.set(KnownField::Title, TagValue::text("Hello, much longer title"));

        let rewritten = rewrite(&file, &tag).unwrap();
        let new_root = parse_boxes(&rewritten).unwrap();
        let reparsed = Mp4Tag::parse(&rewritten, &new_root).unwrap();
        assert_eq!(reparsed.get_text(&KnownField::Title), Some("Hello, much longer title".to_string()));

        let new_moov = new_root.iter().find(|e| e.id == Id::fourcc(*b"moov")).unwrap();
        let new_stco = new_moov.walk().find(|e| e.id.as_bytes() == b"stco").unwrap();
        let start = new_stco.data_offset() as usize + 8;
        let new_offset = u32::from_be_bytes(rewritten[start..start + 4].try_into().unwrap());
        let delta = rewritten.len() as i64 - file.len() as i64;
        assert_eq!(new_offset as i64, 500 + delta);
    }

    #[test]
    fn parses_audio_track_codec_and_sample_rate() {
        let mut tkhd_body = vec![0u8; 4]; // version 0, flags 0
        tkhd_body.extend(0u32.to_be_bytes()); // creation
        tkhd_body.extend(0u32.to_be_bytes()); // modification
        tkhd_body.extend(7u32.to_be_bytes()); // track_id
        tkhd_body.extend(0u32.to_be_bytes()); // reserved
        tkhd_body.extend(48_000u32.to_be_bytes()); // duration
        let tkhd = atom(b"tkhd", &tkhd_body);

        let mut mdhd_body = vec![0u8; 4];
        mdhd_body.extend(0u32.to_be_bytes());
        mdhd_body.extend(0u32.to_be_bytes());
        mdhd_body.extend(48_000u32.to_be_bytes()); // timescale
        mdhd_body.extend(96_000u32.to_be_bytes()); // duration -> 2000ms
        mdhd_body.extend([0u8; 4]); // language + pre_defined
        let mdhd = atom(b"mdhd", &mdhd_body);

        let mut hdlr_body = vec![0u8; 4];
        hdlr_body.extend([0u8; 4]); // predefined
        hdlr_body.extend(b"soun");
        let hdlr = atom(b"hdlr", &hdlr_body);

        let mut sample_entry_body = vec![0u8; 6]; // reserved
        sample_entry_body.extend(1u16.to_be_bytes()); // data_reference_index
        sample_entry_body.extend([0u8; 2]); // version
        sample_entry_body.extend([0u8; 2]); // revision
        sample_entry_body.extend([0u8; 4]); // vendor
        sample_entry_body.extend(2u16.to_be_bytes()); // channel_count
        sample_entry_body.extend(16u16.to_be_bytes()); // sample_size
        sample_entry_body.extend([0u8; 2]); // compression_id
        sample_entry_body.extend([0u8; 2]); // packet_size
        sample_entry_body.extend((44_100u32 << 16).to_be_bytes()); // sample_rate, 16.16 fixed
        let sample_entry = atom(b"mp4a", &sample_entry_body);

        let mut stsd_body = vec![0u8; 4]; // version/flags
        stsd_body.extend(1u32.to_be_bytes()); // entry_count
        stsd_body.extend(&sample_entry);
        let stsd = atom(b"stsd", &stsd_body);

        let stbl = atom(b"stbl", &stsd);
        let minf = atom(b"minf", &stbl);
        let mut mdia_body = mdhd;
        mdia_body.extend(&hdlr);
        mdia_body.extend(&minf);
        let mdia = atom(b"mdia", &mdia_body);

        let mut trak_body = tkhd;
        trak_body.extend(&mdia);
        let trak = atom(b"trak", &trak_body);
        let moov = atom(b"moov", &trak);

        let root = parse_boxes(&moov).unwrap();
        let tracks = parse_tracks(&moov, &root);

        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].id, Some(7));
        assert_eq!(tracks[0].codec.as_deref(), Some("mp4a"));
        assert_eq!(tracks[0].channels, Some(2));
        assert_eq!(tracks[0].sample_rate, Some(44_100));
        assert_eq!(tracks[0].duration_ms, Some(2000));
    }

    #[test]
    fn relocate_moov_moves_moov_before_mdat_and_patches_stco() {
        let stco_body = {
            let mut body = vec![0u8; 4]; // version/flags
            body.extend(1u32.to_be_bytes()); // entry_count
            body.extend(500u32.to_be_bytes()); // chunk offset into mdat
            body
        };
        let stco = atom(b"stco", &stco_body);
        let stbl = atom(b"stbl", &stco);
        let minf = atom(b"minf", &stbl);
        let mdia = atom(b"mdia", &minf);
        let trak = atom(b"trak", &mdia);
        let moov = atom(b"moov", &trak);

        let ftyp = atom(b"ftyp", b"M4A ");
        let mdat = atom(b"mdat", &[0xAB; 100]);

        let mut file = ftyp;
        file.extend(&mdat); // moov after mdat, the "non-faststart" layout
        file.extend(&moov);

        let original_root = parse_boxes(&file).unwrap();
        let old_mdat_data_offset =
            original_root.iter().find(|e| e.id == Id::fourcc(*b"mdat")).unwrap().data_offset();

        let rewritten = relocate_moov(&file, true).unwrap();
        let root = parse_boxes(&rewritten).unwrap();

        let moov_idx = root.iter().position(|e| e.id == Id::fourcc(*b"moov")).unwrap();
        let mdat_idx = root.iter().position(|e| e.id == Id::fourcc(*b"mdat")).unwrap();
        assert!(moov_idx < mdat_idx);

        let new_mdat = &root[mdat_idx];
        let delta = new_mdat.data_offset() as i64 - old_mdat_data_offset as i64;

        let new_stco = root[moov_idx].walk().find(|e| e.id.as_bytes() == b"stco").unwrap();
        let start = new_stco.data_offset() as usize + 8;
        let new_offset = u32::from_be_bytes(rewritten[start..start + 4].try_into().unwrap());
        assert_eq!(new_offset as i64, 500 + delta);
    }

    #[test]
    fn relocate_moov_is_a_no_op_when_already_in_place() {
        let moov = atom(b"moov", b"");
        let mdat = atom(b"mdat", &[0u8; 10]);
        let mut file = moov;
        file.extend(&mdat);

        let rewritten = relocate_moov(&file, true).unwrap();
        assert_eq!(rewritten, file);
    }
}
