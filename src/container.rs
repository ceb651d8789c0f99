//! Container-format sniffing and the format-dispatch layer that ties a
//! detected container to its [`crate::tag::Tag`] implementation.
//!
//! [`crate::file::MediaFile`] is the only caller of this module in
//! practice; it exists on its own so format detection and per-format
//! read/rewrite glue stay separate from file-handle bookkeeping.

use crate::chapter::{Attachment, Edition};
use crate::core::io::BufStream;
use crate::diag::Diagnostics;
use crate::error::{Error, Result};
use crate::formats::id3v1::Id3v1Tag;
use crate::formats::id3v2::header::TagHeader;
use crate::formats::id3v2::{self, Id3v2Tag};
use crate::formats::mkv::{self, MkvTag};
use crate::formats::mp4::{self, Mp4Tag};
use crate::formats::ogg;
use crate::formats::{flac, vorbis};
use crate::tag::Tag;

pub const ID3V1_SIZE: usize = 128;
const ID3V1_MAGIC: &[u8; 3] = b"TAG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    Mp3,
    Mp4,
    Matroska,
    Ogg,
    Flac,
}

impl ContainerFormat {
    /// Sniffs a container format from the start of a file's bytes. Every
    /// format recognized here identifies itself within the first 12 bytes
    /// except MP4, whose leading box is a variable-size `ftyp` rather than a
    /// fixed magic at a fixed offset.
    pub fn sniff(data: &[u8]) -> Option<ContainerFormat> {
        if data.len() >= 4 && &data[0..4] == flac::MAGIC {
            return Some(ContainerFormat::Flac);
        }
        if data.len() >= 4 && &data[0..4] == ogg::MAGIC {
            return Some(ContainerFormat::Ogg);
        }
        if data.len() >= 4 && data[0..4] == [0x1A, 0x45, 0xDF, 0xA3] {
            return Some(ContainerFormat::Matroska);
        }
        if data.len() >= 12 && &data[4..8] == b"ftyp" {
            return Some(ContainerFormat::Mp4);
        }
        if data.len() >= 3 && &data[0..3] == b"ID3" {
            return Some(ContainerFormat::Mp3);
        }
        None
    }
}

/// The tag(s) found in a container, in the shape each format actually
/// stores them. MP3 is the only format where two independent tags can
/// coexist (a leading ID3v2 tag and/or a trailing ID3v1 tag); every other
/// format has exactly one tag location.
pub enum ParsedTags {
    Mp3 { id3v2: Option<Id3v2Tag>, id3v1: Option<Id3v1Tag> },
    Mp4(Mp4Tag),
    Matroska(MkvTag),
    Ogg(vorbis::VorbisComments),
    Flac(vorbis::VorbisComments),
}

impl ParsedTags {
    /// The tag callers should read from and write to by default: the
    /// leading ID3v2 tag for MP3 (falling back to the trailing ID3v1 tag if
    /// that's all there is), and the sole tag for every other format.
    pub fn primary(&self) -> Option<&dyn Tag> {
        match self {
            ParsedTags::Mp3 { id3v2: Some(tag), .. } => Some(tag),
            ParsedTags::Mp3 { id3v1: Some(tag), .. } => Some(tag),
            ParsedTags::Mp3 { .. } => None,
            ParsedTags::Mp4(tag) => Some(tag),
            ParsedTags::Matroska(tag) => Some(tag),
            ParsedTags::Ogg(tag) => Some(tag),
            ParsedTags::Flac(tag) => Some(tag),
        }
    }
}

/// Reads every tag a container holds out of its full file contents,
/// appending a record of anything noteworthy along the way to `diag`
/// (a missing tag, a second stacked ID3v2 tag getting merged in, ...).
pub fn read(format: ContainerFormat, data: &[u8], diag: &mut Diagnostics) -> Result<ParsedTags> {
    match format {
        ContainerFormat::Mp3 => {
            let id3v2 = match id3v2::merge_id3v2_tags(data) {
                Ok((tag, span)) => {
                    if id3v2_span(data).map_or(false, |leading| span > leading) {
                        diag.info("merged a second stacked ID3v2 tag into the leading one");
                    }
                    Some(tag)
                }
                Err(err) => {
                    diag.debug(format!("no leading ID3v2 tag found: {err}"));
                    None
                }
            };
            let id3v1 = read_id3v1(data);
            if id3v1.is_some() {
                diag.info("found a trailing ID3v1 tag");
            }
            if id3v2.is_none() && id3v1.is_none() {
                diag.warn("no tag found in MP3 file");
            }
            Ok(ParsedTags::Mp3 { id3v2, id3v1 })
        }
        ContainerFormat::Mp4 => {
            let root = mp4::parse_boxes(data)?;
            let tag = match Mp4Tag::parse(data, &root) {
                Ok(tag) => tag,
                Err(Error::NotFound) => {
                    diag.warn("no ilst atom found in MP4 file");
                    Mp4Tag::new()
                }
                Err(err) => return Err(err),
            };
            diag.debug(format!("parsed MP4 tag with {} field(s)", tag.field_count()));
            Ok(ParsedTags::Mp4(tag))
        }
        ContainerFormat::Matroska => {
            let root = mkv::parse_elements(data)?;
            let tag = match MkvTag::parse(data, &root) {
                Ok(tag) => tag,
                Err(Error::NotFound) => {
                    diag.warn("no Tags element found in Matroska file");
                    MkvTag::new()
                }
                Err(err) => return Err(err),
            };
            diag.debug(format!("parsed Matroska tag with {} field(s)", tag.field_count()));
            Ok(ParsedTags::Matroska(tag))
        }
        ContainerFormat::Ogg => {
            let mut stream = BufStream::new(data);
            let pages = ogg::read_pages(&mut stream)?;
            let serial = pages.first().ok_or(Error::NotFound)?.serial;
            match ogg::find_comments(&pages, serial) {
                Some(comments) => Ok(ParsedTags::Ogg(comments)),
                None => {
                    diag.warn("no Vorbis comment packet found in Ogg stream");
                    Ok(ParsedTags::Ogg(vorbis::VorbisComments::new("tagkit")))
                }
            }
        }
        ContainerFormat::Flac => {
            let mut stream = BufStream::new(&data[flac::MAGIC.len()..]);
            let blocks = flac::FlacStream::parse(&mut stream)?;
            match blocks.comments() {
                Some(comments) => Ok(ParsedTags::Flac(comments)),
                None => {
                    diag.warn("no VORBIS_COMMENT metadata block found in FLAC stream");
                    Ok(ParsedTags::Flac(vorbis::VorbisComments::new("tagkit")))
                }
            }
        }
    }
}

/// Reads the trailing 128-byte ID3v1 tag, if the file is at least that long
/// and the magic matches.
pub fn read_id3v1(data: &[u8]) -> Option<Id3v1Tag> {
    if data.len() < ID3V1_SIZE {
        return None;
    }

    let trailer = &data[data.len() - ID3V1_SIZE..];
    if &trailer[0..3] != ID3V1_MAGIC {
        return None;
    }

    let mut buf = [0u8; ID3V1_SIZE];
    buf.copy_from_slice(trailer);
    Id3v1Tag::parse(&buf).ok()
}

/// The byte span of a leading ID3v2 tag, if present at the start of `data`
/// (10-byte header size field, plus a 10-byte footer for formats that use
/// one).
pub fn id3v2_span(data: &[u8]) -> Option<usize> {
    if data.len() < 10 || &data[0..3] != b"ID3" {
        return None;
    }

    let mut header_raw = [0u8; 10];
    header_raw.copy_from_slice(&data[0..10]);
    let header = TagHeader::parse(header_raw).ok()?;

    let footer = if header.flags().footer { 10 } else { 0 };
    Some(10 + header.size() as usize + footer)
}

/// The chapter tree a container holds, if its format has one. Only
/// Matroska does today (see [`crate::chapter`]); every other format
/// returns an empty list rather than [`Error::Unsupported`], since "no
/// chapters" and "this format can't have chapters" look the same to a
/// caller that just wants to know what's there.
pub fn chapters(format: ContainerFormat, data: &[u8]) -> Result<Vec<Edition>> {
    match format {
        ContainerFormat::Matroska => {
            let root = mkv::parse_elements(data)?;
            Ok(mkv::parse_chapters(data, &root))
        }
        _ => Ok(Vec::new()),
    }
}

/// The embedded attachments a container holds, if its format has any. Same
/// Matroska-only scope as [`chapters`].
pub fn attachments(format: ContainerFormat, data: &[u8]) -> Result<Vec<Attachment>> {
    match format {
        ContainerFormat::Matroska => {
            let root = mkv::parse_elements(data)?;
            Ok(mkv::parse_attachments(data, &root))
        }
        _ => Ok(Vec::new()),
    }
}

/// The audio track headers a container describes, if its format exposes
/// them outside the tag itself (MP4's `trak` atoms, Matroska's
/// `TrackEntry`s). Empty for every other format.
pub fn tracks(format: ContainerFormat, data: &[u8]) -> Result<Vec<crate::track::Track>> {
    match format {
        ContainerFormat::Mp4 => {
            let root = mp4::parse_boxes(data)?;
            Ok(mp4::parse_tracks(data, &root))
        }
        ContainerFormat::Matroska => {
            let root = mkv::parse_elements(data)?;
            Ok(mkv::parse_tracks(data, &root))
        }
        _ => Ok(Vec::new()),
    }
}

/// Copies every field `src` has set into `dest`, skipping (and noting in
/// `diag`) fields `dest`'s format has no native representation for at all.
/// Separated out of [`rewrite`] since every format branch does the same
/// copy against its own freshly parsed tag.
fn copy_supported_fields(dest: &mut dyn Tag, src: &dyn Tag, diag: &mut Diagnostics) {
    for field in src.fields() {
        let Some(value) = src.get(&field).cloned() else { continue };

        if !dest.supports_field(&field) {
            diag.warn(format!("{} has no native field for {field:?}, dropping it", dest.format_name()));
            continue;
        }

        dest.set(field, value);
    }
}

/// Rewrites a container's tag in place, splicing the new tag bytes into
/// `data` and returning the complete new file contents. MP4 additionally
/// shifts `stco`/`co64` chunk offsets to account for `moov`'s size change;
/// Matroska patches ancestor EBML master sizes the same way (see
/// [`mkv::rewrite`]); Ogg re-pages the comment packet and renumbers later
/// pages (see [`ogg::rewrite`]). Anything skipped or worth noting along the
/// way is appended to `diag`.
pub fn rewrite(format: ContainerFormat, data: &[u8], tag: &dyn Tag, diag: &mut Diagnostics) -> Result<Vec<u8>> {
    match format {
        ContainerFormat::Mp3 => {
            let start = id3v2_span(data).unwrap_or(0);
            let mut new_tag = Id3v2Tag::new();
            copy_supported_fields(&mut new_tag, tag, diag);

            let mut out = new_tag.render();
            out.extend(&data[start..]);
            Ok(out)
        }
        ContainerFormat::Mp4 => {
            let root = mp4::parse_boxes(data)?;
            let mut new_tag = Mp4Tag::parse(data, &root)?;
            copy_supported_fields(&mut new_tag, tag, diag);
            mp4::rewrite(data, &new_tag)
        }
        ContainerFormat::Flac => {
            let mut stream = BufStream::new(&data[flac::MAGIC.len()..]);
            let mut stream_blocks = flac::FlacStream::parse(&mut stream)?;
            let mut comments = stream_blocks.comments().unwrap_or_else(|| vorbis::VorbisComments::new("tagkit"));
            copy_supported_fields(&mut comments, tag, diag);
            stream_blocks.set_comments(&comments);

            let mut out = flac::MAGIC.to_vec();
            out.extend(stream_blocks.render());
            Ok(out)
        }
        ContainerFormat::Matroska => {
            let root = mkv::parse_elements(data)?;
            let mut new_tag = MkvTag::parse(data, &root)?;
            copy_supported_fields(&mut new_tag, tag, diag);
            mkv::rewrite(data, &new_tag)
        }
        ContainerFormat::Ogg => {
            let mut stream = BufStream::new(data);
            let pages = ogg::read_pages(&mut stream)?;
            let serial = pages.first().ok_or(Error::NotFound)?.serial;
            let mut comments = ogg::find_comments(&pages, serial).unwrap_or_else(|| vorbis::VorbisComments::new("tagkit"));
            copy_supported_fields(&mut comments, tag, diag);
            ogg::rewrite(data, &comments)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_flac_magic() {
        let data = b"fLaC\x00\x00\x00\x00";
        assert_eq!(ContainerFormat::sniff(data), Some(ContainerFormat::Flac));
    }

    #[test]
    fn sniffs_id3_magic() {
        let mut data = vec![b'I', b'D', b'3', 3, 0, 0, 0, 0, 0, 0];
        data.extend([0u8; 10]);
        assert_eq!(ContainerFormat::sniff(&data), Some(ContainerFormat::Mp3));
    }

    #[test]
    fn sniffs_mp4_ftyp() {
        let mut data = 16u32.to_be_bytes().to_vec();
        data.extend(b"ftypM4A ");
        assert_eq!(ContainerFormat::sniff(&data), Some(ContainerFormat::Mp4));
    }

    #[test]
    fn unrecognized_bytes_sniff_to_none() {
        assert_eq!(ContainerFormat::sniff(b"not a media file"), None);
    }

    #[test]
    fn reads_trailing_id3v1_tag() {
        let mut data = vec![0u8; 50];
        let mut trailer = vec![b'T', b'A', b'G'];
        trailer.extend(b"Title".iter().chain(std::iter::repeat(&0u8)).take(30));
        trailer.resize(ID3V1_SIZE, 0);
        data.extend(&trailer);

        let tag = read_id3v1(&data).unwrap();
        assert_eq!(tag.get_text(&crate::value::KnownField::Title).as_deref(), Some("Title"));
    }

    #[test]
    fn reading_a_tagless_mp3_warns_and_reports_no_tag() {
        let mut diag = Diagnostics::new();
        let parsed = read(ContainerFormat::Mp3, &[0u8; 32], &mut diag).unwrap();
        assert!(parsed.primary().is_none());
        assert_eq!(diag.worst(), Some(crate::diag::Level::Warning));
    }

    #[test]
    fn rewriting_mp4_with_a_field_it_has_no_atom_for_is_noted_in_diagnostics() {
        use crate::formats::id3v1::Id3v1Tag;
        use crate::value::KnownField;

        let ftyp = {
            let mut out = 16u32.to_be_bytes().to_vec();
            out.extend(b"ftypM4A ");
            out
        };
        let ilst = {
            let mut out = 8u32.to_be_bytes().to_vec();
            out.extend(b"ilst");
            out
        };
        let moov = {
            let mut out = (8 + ilst.len() as u32).to_be_bytes().to_vec();
            out.extend(b"moov");
            out.extend(&ilst);
            out
        };
        let mut data = ftyp;
        data.extend(&moov);

        let mut src = Id3v1Tag::new();
        src.set_text(KnownField::Year, "1999");

        let mut diag = Diagnostics::new();
        rewrite(ContainerFormat::Mp4, &data, &src, &mut diag).unwrap();
        assert_eq!(diag.worst(), Some(crate::diag::Level::Warning));
    }

    #[test]
    fn reading_a_tagless_mp4_substitutes_an_empty_tag_and_warns() {
        let ftyp = {
            let mut out = 16u32.to_be_bytes().to_vec();
            out.extend(b"ftypM4A ");
            out
        };
        let moov = {
            let mut out = 8u32.to_be_bytes().to_vec();
            out.extend(b"moov");
            out
        };
        let mut data = ftyp;
        data.extend(&moov);

        let mut diag = Diagnostics::new();
        let parsed = read(ContainerFormat::Mp4, &data, &mut diag).unwrap();
        assert!(parsed.primary().is_some());
        assert_eq!(parsed.primary().unwrap().field_count(), 0);
        assert_eq!(diag.worst(), Some(crate::diag::Level::Warning));
    }

    #[test]
    fn chapters_and_attachments_are_empty_for_formats_without_them() {
        assert_eq!(chapters(ContainerFormat::Mp3, &[]).unwrap(), Vec::new());
        assert_eq!(attachments(ContainerFormat::Mp3, &[]).unwrap(), Vec::new());
    }

    #[test]
    fn tracks_are_empty_for_formats_without_a_track_list() {
        assert_eq!(tracks(ContainerFormat::Mp3, &[]).unwrap(), Vec::new());
        assert_eq!(tracks(ContainerFormat::Ogg, &[]).unwrap(), Vec::new());
    }

    #[test]
    fn chapters_reads_a_matroska_edition_with_one_chapter() {
        fn ebml(id: &[u8], body: &[u8]) -> Vec<u8> {
            let mut out = id.to_vec();
            out.push(0x80 | body.len() as u8);
            out.extend(body);
            out
        }

        let uid = ebml(&[0x73, 0xC4], &[5]);
        let start = ebml(&[0x91], &3_000_000_000u64.to_be_bytes()[4..]);
        let display = ebml(&[0x80], &ebml(&[0x85], b"Intro"));
        let mut atom_body = uid;
        atom_body.extend(start);
        atom_body.extend(display);
        let atom = ebml(&[0xB6], &atom_body);
        let entry = ebml(&[0x45, 0xB9], &atom);
        let chapters_elem = ebml(&[0x10, 0x43, 0xA9, 0x70], &entry);

        let editions = chapters(ContainerFormat::Matroska, &chapters_elem).unwrap();
        assert_eq!(editions.len(), 1);
        assert_eq!(editions[0].chapters[0].title.as_deref(), Some("Intro"));
        assert_eq!(editions[0].chapters[0].start_ms, Some(3_000));
    }
}
