//! A generic hierarchical element tree.
//!
//! MP4 atoms, EBML elements, Ogg-packet-bearing pages, FLAC metadata blocks,
//! and ID3v2 frames are all, at the byte level, the same shape: an
//! identifier, a length-prefixed span of data, and (for the container
//! formats) a nested list of children occupying that span. `Element`
//! captures that shape once so the per-format code in [`crate::formats`]
//! only has to describe how identifiers and sizes are encoded, not
//! reinvent tree bookkeeping.
//!
//! This mirrors the role `id3v2::frames::FrameHeader` plays for a single
//! frame in the ID3v2 codec, generalized to a whole tree and to identifiers
//! that aren't always 4 ASCII bytes (EBML IDs are variable-length vints).

use std::fmt;

/// An element identifier. Most formats use small fixed-width identifiers
/// (MP4's 4-byte FourCC, ID3v2's 4-byte frame ID), but EBML IDs are
/// variable-length vints that can be up to 4 bytes. `Id` stores up to 4
/// bytes plus a length so both cases fit without an allocation.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id {
    bytes: [u8; 4],
    len: u8,
}

impl Id {
    pub fn new(bytes: &[u8]) -> Self {
        assert!(!bytes.is_empty() && bytes.len() <= 4, "element id must be 1-4 bytes");
        let mut buf = [0u8; 4];
        buf[..bytes.len()].copy_from_slice(bytes);
        Id { bytes: buf, len: bytes.len() as u8 }
    }

    pub fn fourcc(bytes: [u8; 4]) -> Self {
        Id { bytes, len: 4 }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Renders the identifier as ASCII if it looks printable, which covers
    /// MP4 FourCCs and ID3v2 frame IDs; falls back to hex for EBML IDs.
    pub fn display_name(&self) -> String {
        let bytes = self.as_bytes();
        if bytes.iter().all(|&b| b.is_ascii_graphic() || b == b' ') {
            String::from_utf8_lossy(bytes).to_string()
        } else {
            bytes.iter().map(|b| format!("{:02x}", b)).collect()
        }
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Id({})", self.display_name())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Whether an element can contain children ("master"/"container" elements
/// in EBML and MP4 parlance) or only raw data ("leaf" elements).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Master,
    Leaf,
}

/// A node in the parsed element tree, carrying its position in the
/// underlying byte stream rather than a copy of its data. Leaf payloads are
/// read lazily by the per-format codec from `data_offset`/`data_size` so
/// that walking a tree to find one tag doesn't require buffering the whole
/// file.
#[derive(Debug, Clone)]
pub struct Element {
    pub id: Id,
    pub kind: Kind,
    /// Byte offset of the element's own header (identifier + size field).
    pub offset: u64,
    /// Size, in bytes, of the header alone.
    pub header_size: u64,
    /// Size, in bytes, of the element's data, not including the header.
    /// `None` for EBML "unknown size" elements, which run until a sibling
    /// or parent boundary is found.
    pub data_size: Option<u64>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn data_offset(&self) -> u64 {
        self.offset + self.header_size
    }

    /// Total span of this element (header + data), if known.
    pub fn total_size(&self) -> Option<u64> {
        self.data_size.map(|size| self.header_size + size)
    }

    pub fn end_offset(&self) -> Option<u64> {
        self.total_size().map(|size| self.offset + size)
    }

    /// Depth-first search for the first descendant (including self) with a
    /// matching identifier.
    pub fn find(&self, id: Id) -> Option<&Element> {
        if self.id == id {
            return Some(self);
        }

        self.children.iter().find_map(|child| child.find(id))
    }

    /// Depth-first, pre-order iterator over this element and all of its
    /// descendants.
    pub fn walk(&self) -> Walk<'_> {
        Walk { stack: vec![self] }
    }

    pub fn children_with_id(&self, id: Id) -> impl Iterator<Item = &Element> {
        self.children.iter().filter(move |child| child.id == id)
    }
}

/// Every element on the path from a top-level element down to
/// `target_offset`, not including the target itself. Used when rewriting a
/// tree in place: these are the elements whose recorded size must grow or
/// shrink by the same delta as whatever descendant changed size.
pub fn ancestors_containing(root: &[Element], target_offset: u64) -> Vec<&Element> {
    fn walk<'a>(element: &'a Element, target_offset: u64, path: &mut Vec<&'a Element>) -> bool {
        if element.offset == target_offset {
            return true;
        }

        for child in &element.children {
            path.push(element);
            if walk(child, target_offset, path) {
                return true;
            }
            path.pop();
        }

        false
    }

    for top in root {
        let mut path = Vec::new();
        if walk(top, target_offset, &mut path) {
            return path;
        }
    }

    Vec::new()
}

pub struct Walk<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        // Push in reverse so children are visited in their original order.
        for child in next.children.iter().rev() {
            self.stack.push(child);
        }
        Some(next)
    }
}

/// How to encode an identifier and a size for a specific container format.
/// Each format in [`crate::formats`] implements this once and gets tree
/// walking, rewriting, and offset bookkeeping for free from the rest of
/// this module.
pub trait ElementCodec {
    /// Reads one element header (identifier + size) at the stream's
    /// current position, without consuming any of its data.
    fn read_header(&self, stream: &mut crate::core::io::BufStream) -> crate::error::Result<(Id, Kind, u64)>;

    /// Renders an element header for a data payload of the given size.
    fn render_header(&self, id: Id, kind: Kind, data_size: u64) -> Vec<u8>;

    /// Whether an element with this identifier is expected to contain
    /// children rather than a flat data payload, when that can't be told
    /// from the size/flags alone (this is how MP4's `ftyp` vs `moov`
    /// distinction is usually made: a fixed per-identifier table).
    fn is_master(&self, id: Id) -> bool;
}

/// Builds an element tree by repeatedly reading headers from `stream` via
/// `codec`, recursing into master elements and skipping over leaf payloads
/// (which callers read lazily from the original buffer using
/// `data_offset`/`data_size`). `base_offset` is where `stream`'s position
/// zero falls within the buffer the caller will eventually index into, so
/// offsets recorded on nested elements stay absolute.
///
/// A header's size field reporting [`u64::MAX`] is treated as "unknown size,
/// runs to the end of the enclosing element" (EBML's convention for a
/// master element with no declared length), recorded as `data_size: None`.
pub fn parse_tree(
    codec: &dyn ElementCodec,
    stream: &mut crate::core::io::BufStream,
    base_offset: u64,
) -> crate::error::Result<Vec<Element>> {
    let mut elements = Vec::new();

    while !stream.is_empty() {
        let start_pos = stream.pos();
        let offset = base_offset + start_pos as u64;
        let (id, kind, size_field) = codec.read_header(stream)?;
        let header_size = (stream.pos() - start_pos) as u64;
        let data_size = if size_field == u64::MAX { None } else { Some(size_field) };
        let data_len = data_size.unwrap_or(stream.remaining() as u64) as usize;

        let children = if kind == Kind::Master {
            let mut sub = stream.slice_stream(data_len)?;
            parse_tree(codec, &mut sub, offset + header_size)?
        } else {
            stream.skip(data_len)?;
            Vec::new()
        };

        elements.push(Element { id, kind, offset, header_size, data_size, children });
    }

    Ok(elements)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_round_trips_display() {
        let id = Id::fourcc(*b"moov");
        assert_eq!(id.display_name(), "moov");
    }

    #[test]
    fn walk_is_pre_order() {
        let leaf_a = Element {
            id: Id::fourcc(*b"aaaa"),
            kind: Kind::Leaf,
            offset: 8,
            header_size: 8,
            data_size: Some(0),
            children: vec![],
        };
        let leaf_b = Element {
            id: Id::fourcc(*b"bbbb"),
            kind: Kind::Leaf,
            offset: 16,
            header_size: 8,
            data_size: Some(0),
            children: vec![],
        };
        let root = Element {
            id: Id::fourcc(*b"root"),
            kind: Kind::Master,
            offset: 0,
            header_size: 8,
            data_size: Some(16),
            children: vec![leaf_a, leaf_b],
        };

        let ids: Vec<String> = root.walk().map(|e| e.id.display_name()).collect();
        assert_eq!(ids, vec!["root", "aaaa", "bbbb"]);
    }

    #[test]
    fn find_descends_into_children() {
        let leaf = Element {
            id: Id::fourcc(*b"ilst"),
            kind: Kind::Master,
            offset: 8,
            header_size: 8,
            data_size: Some(0),
            children: vec![],
        };
        let root = Element {
            id: Id::fourcc(*b"moov"),
            kind: Kind::Master,
            offset: 0,
            header_size: 8,
            data_size: Some(8),
            children: vec![leaf],
        };

        assert!(root.find(Id::fourcc(*b"ilst")).is_some());
        assert!(root.find(Id::fourcc(*b"trak")).is_none());
    }
}
