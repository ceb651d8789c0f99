//! Ogg page framing and the packet-level tag codec built on top of it.
//!
//! Both Ogg Vorbis and Ogg Opus carry their tag as the second packet of the
//! logical stream (after the codec identification packet), prefixed with a
//! codec-specific magic (`\x03vorbis` or `OpusTags`) instead of a dedicated
//! framing byte the way FLAC's metadata blocks have one.

use crate::core::io::BufStream;
use crate::error::{Error, Result};
use crate::formats::vorbis::VorbisComments;

pub const MAGIC: &[u8; 4] = b"OggS";

const VORBIS_COMMENT_MAGIC: &[u8] = b"\x03vorbis";
const OPUS_COMMENT_MAGIC: &[u8] = b"OpusTags";

/// One Ogg page: a header plus the packet data it carries. Packet
/// boundaries within `data` are given by `segment_table`, matching the
/// format's own lacing scheme (each segment 0-255 bytes; a packet ends at
/// the first segment shorter than 255).
#[derive(Debug, Clone)]
pub struct Page {
    pub version: u8,
    pub header_type: u8,
    pub granule_position: i64,
    pub serial: u32,
    pub sequence: u32,
    pub segment_table: Vec<u8>,
    pub data: Vec<u8>,
}

impl Page {
    pub const CONTINUED: u8 = 0x01;
    pub const FIRST: u8 = 0x02;
    pub const LAST: u8 = 0x04;

    pub fn parse(stream: &mut BufStream) -> Result<Self> {
        let magic = stream.slice(4)?;
        if magic != MAGIC {
            return Err(Error::MalformedData);
        }

        let version = stream.read_u8()?;
        let header_type = stream.read_u8()?;
        let granule_position = stream.read_le_i64()?;
        let serial = stream.read_le_u32()?;
        let sequence = stream.read_le_u32()?;
        let _checksum = stream.read_le_u32()?;
        let segment_count = stream.read_u8()? as usize;
        let segment_table = stream.slice(segment_count)?.to_vec();

        let data_len: usize = segment_table.iter().map(|&b| b as usize).sum();
        let data = stream.slice(data_len)?.to_vec();

        Ok(Page { version, header_type, granule_position, serial, sequence, segment_table, data })
    }

    /// Renders the page with a freshly computed checksum, per the format's
    /// own "checksum field zeroed during the calculation" rule.
    pub fn render(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(MAGIC);
        out.push(self.version);
        out.push(self.header_type);
        out.extend(self.granule_position.to_le_bytes());
        out.extend(self.serial.to_le_bytes());
        out.extend(self.sequence.to_le_bytes());
        out.extend(0u32.to_le_bytes()); // checksum placeholder
        out.push(self.segment_table.len() as u8);
        out.extend(&self.segment_table);
        out.extend(&self.data);

        let checksum = crc32(&out);
        out[22..26].copy_from_slice(&checksum.to_le_bytes());
        out
    }

    /// Splits `data` into packets using `segment_table`'s lacing values.
    pub fn packets(&self) -> Vec<&[u8]> {
        let mut packets = Vec::new();
        let mut start = 0;
        let mut run = 0;

        for &seg in &self.segment_table {
            run += seg as usize;
            if seg < 255 {
                packets.push(&self.data[start..start + run]);
                start += run;
                run = 0;
            }
        }

        if run > 0 {
            packets.push(&self.data[start..start + run]);
        }

        packets
    }

    /// Builds the segment table + data for a set of packets, splitting runs
    /// of 255+ bytes across multiple lacing values as the format requires.
    pub fn from_packets(serial: u32, sequence: u32, header_type: u8, packets: &[Vec<u8>]) -> Self {
        let mut segment_table = Vec::new();
        let mut data = Vec::new();

        for packet in packets {
            let mut remaining = packet.len();
            while remaining >= 255 {
                segment_table.push(255);
                remaining -= 255;
            }
            segment_table.push(remaining as u8);
            data.extend(packet);
        }

        Page { version: 0, header_type, granule_position: 0, serial, sequence, segment_table, data }
    }
}

/// CRC-32 variant Ogg uses: unreflected, polynomial `0x04c11db7`, no final
/// XOR. This is not the configuration any common CRC crate ships by
/// default, so it's a small hand-rolled table instead of a dependency.
fn crc32(data: &[u8]) -> u32 {
    const POLY: u32 = 0x04c1_1db7;

    fn table_entry(mut byte: u32) -> u32 {
        byte <<= 24;
        for _ in 0..8 {
            byte = if byte & 0x8000_0000 != 0 { (byte << 1) ^ POLY } else { byte << 1 };
        }
        byte
    }

    let mut crc: u32 = 0;
    for &byte in data {
        let index = ((crc >> 24) ^ byte as u32) & 0xff;
        crc = (crc << 8) ^ table_entry(index);
    }
    crc
}

/// Reads every page of a logical Ogg bitstream from `stream` (which must
/// start exactly at a page boundary).
pub fn read_pages(stream: &mut BufStream) -> Result<Vec<Page>> {
    let mut pages = Vec::new();
    while !stream.is_empty() {
        pages.push(Page::parse(stream)?);
    }
    Ok(pages)
}

pub fn render_pages(pages: &[Page]) -> Vec<u8> {
    pages.iter().flat_map(|p| p.render()).collect()
}

/// Locates the comment packet across a page sequence and decodes it. Ogg
/// allows (and FLAC-in-Ogg / Opus commonly produce) the comment packet to
/// span multiple pages; this walks pages in order, concatenating
/// continuation data for the stream carrying `serial`.
pub fn find_comments(pages: &[Page], serial: u32) -> Option<VorbisComments> {
    let mut packet = Vec::new();
    let mut collecting = false;

    for page in pages {
        if page.serial != serial {
            continue;
        }

        for raw in page.packets() {
            if !collecting {
                if raw.starts_with(VORBIS_COMMENT_MAGIC) {
                    packet.extend(&raw[VORBIS_COMMENT_MAGIC.len()..]);
                    collecting = true;
                } else if raw.starts_with(OPUS_COMMENT_MAGIC) {
                    packet.extend(&raw[OPUS_COMMENT_MAGIC.len()..]);
                    collecting = true;
                }
            } else {
                packet.extend(raw);
            }
        }

        if collecting {
            break;
        }
    }

    if packet.is_empty() {
        return None;
    }

    let mut stream = BufStream::new(&packet);
    VorbisComments::parse(&mut stream).ok()
}

/// Replaces the comment packet of a logical Ogg bitstream, re-segmenting it
/// onto a single fresh page and renumbering every later page's sequence
/// number to stay contiguous. Handles the common layout real encoders
/// produce -- one packet per header page -- rather than a packed
/// multi-packet page carrying the comment alongside other header data.
pub fn rewrite(data: &[u8], tag: &VorbisComments) -> Result<Vec<u8>> {
    let mut stream = BufStream::new(data);
    let pages = read_pages(&mut stream)?;
    let serial = pages.first().ok_or(Error::NotFound)?.serial;

    let mut start = None;
    let mut end = None;
    let mut magic: &[u8] = VORBIS_COMMENT_MAGIC;

    for (i, page) in pages.iter().enumerate() {
        if page.serial != serial {
            continue;
        }

        if start.is_none() {
            if let Some(first) = page.packets().first() {
                if first.starts_with(VORBIS_COMMENT_MAGIC) {
                    magic = VORBIS_COMMENT_MAGIC;
                    start = Some(i);
                } else if first.starts_with(OPUS_COMMENT_MAGIC) {
                    magic = OPUS_COMMENT_MAGIC;
                    start = Some(i);
                }
            }
        }

        if start.is_some() && end.is_none() && page.segment_table.last().copied().unwrap_or(0) < 255 {
            end = Some(i);
        }
    }

    let (start, end) = match (start, end) {
        (Some(s), Some(e)) => (s, e),
        _ => return Err(Error::NotFound),
    };

    let mut new_packet = magic.to_vec();
    new_packet.extend(tag.render());
    let new_page = Page::from_packets(serial, pages[start].sequence, pages[start].header_type, &[new_packet]);

    let mut out_pages: Vec<Page> = pages[..start].to_vec();
    out_pages.push(new_page);
    out_pages.extend_from_slice(&pages[end + 1..]);

    let mut sequence = pages[start].sequence + 1;
    for page in out_pages.iter_mut().skip(start + 1) {
        if page.serial == serial {
            page.sequence = sequence;
            sequence += 1;
        }
    }

    Ok(render_pages(&out_pages))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_round_trips_through_render() {
        let page = Page::from_packets(1234, 0, Page::FIRST, &[b"hello".to_vec()]);
        let rendered = page.render();

        let mut stream = BufStream::new(&rendered);
        let parsed = Page::parse(&mut stream).unwrap();

        assert_eq!(parsed.serial, 1234);
        assert_eq!(parsed.packets(), vec![b"hello".as_slice()]);
    }

    #[test]
    fn packet_larger_than_255_bytes_splits_lacing() {
        let packet = vec![7u8; 300];
        let page = Page::from_packets(1, 0, 0, &[packet.clone()]);
        assert_eq!(page.segment_table, vec![255, 45]);
        assert_eq!(page.packets(), vec![packet.as_slice()]);
    }

    #[test]
    fn find_comments_locates_vorbis_comment_packet() {
        let mut comments = VorbisComments::new("tagkit");
        comments.push("TITLE", "Test");

        let mut packet = VORBIS_COMMENT_MAGIC.to_vec();
        packet.extend(comments.render());

        let ident = Page::from_packets(99, 0, Page::FIRST, &[b"\x01vorbis".to_vec()]);
        let comment_page = Page::from_packets(99, 1, 0, &[packet]);

        let found = find_comments(&[ident, comment_page], 99).unwrap();
        assert_eq!(found.get_first("TITLE"), Some("Test"));
    }

    #[test]
    fn rewrite_replaces_comment_packet_and_renumbers_later_pages() {
        let mut comments = VorbisComments::new("tagkit");
        comments.push("TITLE", "Old Title");

        let mut packet = VORBIS_COMMENT_MAGIC.to_vec();
        packet.extend(comments.render());

        let ident = Page::from_packets(7, 0, Page::FIRST, &[b"\x01vorbis".to_vec()]);
        let comment_page = Page::from_packets(7, 1, 0, &[packet]);
        let setup_page = Page::from_packets(7, 2, 0, &[b"\x05vorbis setup".to_vec()]);
        let audio_page = Page::from_packets(7, 3, Page::LAST, &[b"audio data".to_vec()]);

        let original = render_pages(&[ident, comment_page, setup_page, audio_page]);

        let mut new_comments = VorbisComments::new("tagkit");
        new_comments.push("TITLE", "A Considerably Longer New Title");
        let rewritten = rewrite(&original, &new_comments).unwrap();

        let mut stream = BufStream::new(&rewritten);
        let new_pages = read_pages(&mut stream).unwrap();

        assert_eq!(new_pages.len(), 4);
        assert_eq!(new_pages[1].sequence, 1);
        assert_eq!(new_pages[2].sequence, 2);
        assert_eq!(new_pages[3].sequence, 3);

        let found = find_comments(&new_pages, 7).unwrap();
        assert_eq!(found.get_first("TITLE"), Some("A Considerably Longer New Title"));
        assert_eq!(new_pages[3].packets(), vec![b"audio data".as_slice()]);
    }
}
