//! Frame identifiers and frame headers.

use crate::core::raw;
use crate::error::{Error, Result};
use crate::formats::id3v2::header::Version;
use crate::formats::id3v2::syncdata;
use std::fmt::{self, Display, Formatter};

/// A 4-character frame identifier (`TIT2`, `APIC`, ...). ID3v2.2's 3-byte
/// IDs are upgraded to their ID3v2.3 analogue before a `FrameId` is ever
/// constructed; see [`crate::formats::id3v2::compat`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId([u8; 4]);

impl FrameId {
    pub fn new(id: &[u8; 4]) -> Self {
        assert!(is_frame_id(id), "frame id must be 4 uppercase ASCII letters or digits");
        FrameId(*id)
    }

    pub fn parse(id: &[u8]) -> Result<Self> {
        if id.len() != 4 || !is_frame_id(id) {
            return Err(Error::MalformedData);
        }

        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(id);
        Ok(FrameId(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        // Safe: construction requires ASCII uppercase/digit bytes.
        std::str::from_utf8(&self.0).unwrap_or("????")
    }

    /// Text information frames all start with `T` except `TXXX`, which is
    /// handled separately as a key/value pair.
    pub fn is_text(&self) -> bool {
        self.0[0] == b'T' && self.0 != *b"TXXX"
    }

    pub fn is_url(&self) -> bool {
        self.0[0] == b'W' && self.0 != *b"WXXX"
    }
}

impl Display for FrameId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Debug for FrameId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "FrameId({})", self.as_str())
    }
}

fn is_frame_id(id: &[u8]) -> bool {
    id.iter().all(|&b| (b'A'..=b'Z').contains(&b) || (b'0'..=b'9').contains(&b))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags {
    pub tag_should_discard: bool,
    pub file_should_discard: bool,
    pub read_only: bool,
    pub has_group: bool,
    pub compressed: bool,
    pub encrypted: bool,
    pub unsync: bool,
    pub has_data_len: bool,
}

#[derive(Debug, Clone)]
pub struct FrameHeader {
    id: FrameId,
    size: usize,
    flags: FrameFlags,
}

impl FrameHeader {
    pub fn new(id: FrameId) -> Self {
        Self::with_flags(id, FrameFlags::default())
    }

    pub fn with_flags(id: FrameId, flags: FrameFlags) -> Self {
        FrameHeader { id, size: 0, flags }
    }

    /// Parses one frame header. `data` must start at the header and extend
    /// at least to the end of the tag, since the ID3v2.4 iTunes workaround
    /// needs to peek ahead to the following frame's identifier.
    pub fn parse(version: Version, data: &[u8]) -> Result<Self> {
        if data.len() < 10 {
            return Err(Error::MalformedData);
        }

        match version {
            Version::V22 => Err(Error::Unsupported),
            Version::V23 => parse_v3(data),
            Version::V24 => parse_v4(data),
        }
    }

    pub fn render(&self, version: Version) -> [u8; 10] {
        match version {
            Version::V24 => render_v4(self),
            _ => render_v3(self),
        }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn flags(&self) -> FrameFlags {
        self.flags
    }

    pub fn flags_mut(&mut self) -> &mut FrameFlags {
        &mut self.flags
    }

    pub fn size_mut(&mut self) -> &mut usize {
        &mut self.size
    }
}

fn parse_v3(data: &[u8]) -> Result<FrameHeader> {
    let id = FrameId::parse(&data[0..4])?;
    let size = raw::to_size(&data[4..8]);

    let stat_flags = data[8];
    let format_flags = data[9];

    Ok(FrameHeader {
        id,
        size,
        flags: FrameFlags {
            tag_should_discard: raw::bit_at(7, stat_flags),
            file_should_discard: raw::bit_at(6, stat_flags),
            read_only: raw::bit_at(5, stat_flags),
            compressed: raw::bit_at(7, format_flags),
            encrypted: raw::bit_at(6, format_flags),
            has_group: raw::bit_at(5, format_flags),
            unsync: false,
            has_data_len: false,
        },
    })
}

fn parse_v4(data: &[u8]) -> Result<FrameHeader> {
    let id = FrameId::parse(&data[0..4])?;

    let mut size = syncdata::to_u28(data[4..8].try_into().unwrap()) as usize;

    if size >= 0x80 {
        size = handle_itunes_v4_size(size, data);
    }

    let stat_flags = data[8];
    let format_flags = data[9];

    Ok(FrameHeader {
        id,
        size,
        flags: FrameFlags {
            tag_should_discard: raw::bit_at(6, stat_flags),
            file_should_discard: raw::bit_at(5, stat_flags),
            read_only: raw::bit_at(4, stat_flags),
            has_group: raw::bit_at(6, format_flags),
            compressed: raw::bit_at(3, format_flags),
            encrypted: raw::bit_at(2, format_flags),
            unsync: raw::bit_at(1, format_flags),
            has_data_len: raw::bit_at(0, format_flags),
        },
    })
}

/// ID3v2.4 sizes should be syncsafe, but iTunes wrote plain ID3v2.3-style
/// big-endian sizes for a time. If the syncsafe reading doesn't land on a
/// valid next frame ID (or padding) but the raw reading does, prefer the
/// raw reading.
fn handle_itunes_v4_size(sync_size: usize, data: &[u8]) -> usize {
    let next_id_start = sync_size + 10;
    let next_id_end = sync_size + 14;

    if data.len() < next_id_end || data[next_id_start] == 0 {
        return sync_size;
    }

    if FrameId::parse(&data[next_id_start..next_id_end]).is_err() {
        let raw_size = raw::to_size(&data[4..8]);
        let raw_next_start = raw_size + 10;
        let raw_next_end = raw_size + 14;

        if data.len() >= raw_next_end && FrameId::parse(&data[raw_next_start..raw_next_end]).is_ok() {
            return raw_size;
        }
    }

    sync_size
}

fn render_v3(header: &FrameHeader) -> [u8; 10] {
    let mut out = [0u8; 10];
    out[0..4].copy_from_slice(header.id.as_bytes());
    out[4..8].copy_from_slice(&(header.size as u32).to_be_bytes());

    let flags = header.flags;
    out[8] |= u8::from(flags.tag_should_discard) << 7;
    out[8] |= u8::from(flags.file_should_discard) << 6;
    out[8] |= u8::from(flags.read_only) << 5;
    out[9] |= u8::from(flags.compressed) << 7;
    out[9] |= u8::from(flags.encrypted) << 6;
    out[9] |= u8::from(flags.has_group) << 5;

    out
}

fn render_v4(header: &FrameHeader) -> [u8; 10] {
    let mut out = [0u8; 10];
    out[0..4].copy_from_slice(header.id.as_bytes());
    out[4..8].copy_from_slice(&syncdata::from_u28(header.size as u32));

    let flags = header.flags;
    out[8] |= u8::from(flags.tag_should_discard) << 6;
    out[8] |= u8::from(flags.file_should_discard) << 5;
    out[8] |= u8::from(flags.read_only) << 4;
    out[9] |= u8::from(flags.has_group) << 6;
    out[9] |= u8::from(flags.compressed) << 3;
    out[9] |= u8::from(flags.encrypted) << 2;
    out[9] |= u8::from(flags.unsync) << 1;
    out[9] |= u8::from(flags.has_data_len);

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_v3_frame_header() {
        let data = b"TXXX\x00\x0A\x71\x7B\xA0\x40";
        let header = FrameHeader::parse(Version::V23, &data[..]).unwrap();
        let flags = header.flags();

        assert_eq!(header.id().as_str(), "TXXX");
        assert_eq!(header.size(), 684411);
        assert!(flags.tag_should_discard);
        assert!(!flags.file_should_discard);
        assert!(flags.read_only);
        assert!(!flags.compressed);
        assert!(flags.encrypted);
        assert!(!flags.has_group);
    }

    #[test]
    fn parse_v4_frame_header() {
        let data = b"TXXX\x00\x34\x10\x2A\x50\x4B";
        let header = FrameHeader::parse(Version::V24, &data[..]).unwrap();
        let flags = header.flags();

        assert_eq!(header.id().as_str(), "TXXX");
        assert_eq!(header.size(), 854058);
        assert!(flags.tag_should_discard);
        assert!(!flags.file_should_discard);
        assert!(flags.read_only);
        assert!(flags.has_group);
        assert!(flags.compressed);
        assert!(!flags.encrypted);
        assert!(flags.unsync);
        assert!(flags.has_data_len);
    }

    #[test]
    fn itunes_v4_size_workaround_prefers_raw_size_when_valid() {
        // Syncsafe reading of 0x00 0x00 0x01 0x00 is 128, but the frame
        // that follows at +10 isn't a valid frame ID there; the raw
        // big-endian reading (256) does land on a valid next ID.
        let mut data = vec![0u8; 300];
        data[0..4].copy_from_slice(b"TIT2");
        data[4..8].copy_from_slice(&[0x00, 0x00, 0x01, 0x00]);
        // Garbage at the syncsafe-implied next frame (offset 138).
        data[138..142].copy_from_slice(b"\x00\x00\x00\x00");
        // A valid next frame ID at the raw-size-implied offset (266).
        data[266..270].copy_from_slice(b"TPE1");

        let header = FrameHeader::parse(Version::V24, &data).unwrap();
        assert_eq!(header.size(), 256);
    }
}
