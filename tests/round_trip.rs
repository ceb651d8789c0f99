//! End-to-end round trips through the public API, one per supported
//! container, using synthetic fixtures built in memory (no external test
//! files).

use std::fs;
use std::io::Write;
use tagkit::container::ContainerFormat;
use tagkit::diag::Diagnostics;
use tagkit::formats::id3v2::Id3v2Tag;
use tagkit::formats::mkv::{self, MkvTag};
use tagkit::formats::mp4::{self, Mp4Tag};
use tagkit::formats::ogg;
use tagkit::formats::vorbis::VorbisComments;
use tagkit::{KnownField, MediaFile, Tag, TagValue};

fn atom(fourcc: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = ((body.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend(fourcc);
    out.extend(body);
    out
}

fn ebml_element(id: &[u8], body: &[u8]) -> Vec<u8> {
    let mut out = id.to_vec();
    // size vint -- single byte form (body is always tiny in these fixtures).
    out.push(0x80 | body.len() as u8);
    out.extend(body);
    out
}

#[test]
fn mp3_round_trips_title_through_a_real_file() {
    let dir = std::env::temp_dir();
    let path = dir.join("tagkit_it_mp3.mp3");

    let mut tag = Id3v2Tag::new();
    tag.set_text(KnownField::Title, "Integration Title");
    tag.set_text(KnownField::Artist, "Integration Artist");

    let mut file = fs::File::create(&path).unwrap();
    file.write_all(&tag.render()).unwrap();
    file.write_all(&[0xFFu8; 64]).unwrap();
    drop(file);

    let mut opened = MediaFile::open(&path).unwrap();
    assert_eq!(opened.format(), ContainerFormat::Mp3);
    assert_eq!(opened.tag().unwrap().get_text(&KnownField::Title), Some("Integration Title".to_string()));

    let mut new_tag = Id3v2Tag::new();
    new_tag.set_text(KnownField::Title, "Renamed");
    opened.save_default(&new_tag).unwrap();

    let reopened = MediaFile::open(&path).unwrap();
    assert_eq!(reopened.tag().unwrap().get_text(&KnownField::Title), Some("Renamed".to_string()));
    // Everything past the original tag -- the fake audio bytes -- must survive.
    let final_bytes = fs::read(&path).unwrap();
    assert!(final_bytes.windows(4).any(|w| w == [0xFF, 0xFF, 0xFF, 0xFF]));

    fs::remove_file(&path).ok();
}

fn flac_comment_block(comments: &VorbisComments, is_last: bool) -> Vec<u8> {
    let payload = comments.render();
    let mut out = vec![(4u8) | if is_last { 0x80 } else { 0 }]; // type 4 = VORBIS_COMMENT
    let len = payload.len() as u32;
    out.extend(&len.to_be_bytes()[1..]);
    out.extend(payload);
    out
}

#[test]
fn flac_round_trips_comments_via_container_rewrite() {
    let mut comments = VorbisComments::new("tagkit");
    comments.push("ARTIST", "Flac Artist");

    let mut data = b"fLaC".to_vec();
    data.extend(flac_comment_block(&comments, true));

    let format = ContainerFormat::sniff(&data).unwrap();
    assert_eq!(format, ContainerFormat::Flac);

    let mut diag = Diagnostics::new();
    let parsed = tagkit::container::read(format, &data, &mut diag).unwrap();
    assert!(matches!(parsed, tagkit::container::ParsedTags::Flac(_)));
    assert_eq!(parsed.primary().unwrap().get_text(&KnownField::Artist), Some("Flac Artist".to_string()));

    let mut new_tag = VorbisComments::new("tagkit");
    new_tag.push("TITLE", "New Flac Title");
    let rewritten = tagkit::container::rewrite(format, &data, &new_tag, &mut diag).unwrap();

    let reparsed = tagkit::container::read(format, &rewritten, &mut diag).unwrap();
    assert_eq!(reparsed.primary().unwrap().get_text(&KnownField::Title), Some("New Flac Title".to_string()));
}

#[test]
fn mp4_round_trips_title_and_shifts_chunk_offsets() {
    let data_atom = {
        let mut body = 1u32.to_be_bytes().to_vec();
        body.extend(0u32.to_be_bytes());
        body.extend(b"Short");
        atom(b"data", &body)
    };
    let nam_atom = atom(b"\xa9nam", &data_atom);
    let ilst_atom = atom(b"ilst", &nam_atom);

    let mut stco_body = 0u32.to_be_bytes().to_vec();
    stco_body.extend(1u32.to_be_bytes());
    stco_body.extend(1000u32.to_be_bytes());
    let stco_atom = atom(b"stco", &stco_body);
    let stbl_atom = atom(b"stbl", &stco_atom);
    let minf_atom = atom(b"minf", &stbl_atom);
    let mdia_atom = atom(b"mdia", &minf_atom);
    let trak_atom = atom(b"trak", &mdia_atom);

    let mut moov_body = ilst_atom;
    moov_body.extend(&trak_atom);
    let moov_atom = atom(b"moov", &moov_body);
    let mdat_atom = atom(b"mdat", &[0u8; 32]);

    let mut file_bytes = moov_atom.clone();
    file_bytes.extend(&mdat_atom);

    let root = mp4::parse_boxes(&file_bytes).unwrap();
    let mut tag = Mp4Tag::parse(&file_bytes, &root).unwrap();
    assert_eq!(tag.get_text(&KnownField::Title), Some("Short".to_string()));

    tag.set(KnownField::Title, TagValue::text("A Very Much Longer Replacement Title"));
    let rewritten = mp4::rewrite(&file_bytes, &tag).unwrap();

    let new_root = mp4::parse_boxes(&rewritten).unwrap();
    let reparsed = Mp4Tag::parse(&rewritten, &new_root).unwrap();
    assert_eq!(reparsed.get_text(&KnownField::Title), Some("A Very Much Longer Replacement Title".to_string()));

    let delta = rewritten.len() as i64 - file_bytes.len() as i64;
    assert!(delta > 0);

    let new_moov = new_root.iter().find(|e| e.id.as_bytes() == b"moov").unwrap();
    let new_stco = new_moov.walk().find(|e| e.id.as_bytes() == b"stco").unwrap();
    let start = new_stco.data_offset() as usize + 8;
    let new_offset = u32::from_be_bytes(rewritten[start..start + 4].try_into().unwrap());
    assert_eq!(new_offset as i64, 1000 + delta);
}

#[test]
fn matroska_reads_simple_tags_with_track_target() {
    let name = ebml_element(&[0x45, 0xA3], b"ARTIST");
    let string = ebml_element(&[0x44, 0x87], b"Matroska Artist");
    let mut simple_body = name;
    simple_body.extend(string);
    let simple_tag = ebml_element(&[0x67, 0xC8], &simple_body);

    let track_uid = ebml_element(&[0x63, 0xC5], &[7]);
    let targets = ebml_element(&[0x63, 0xC0], &track_uid);

    let mut tag_body = targets;
    tag_body.extend(simple_tag);
    let tag_elem = ebml_element(&[0x73, 0x73], &tag_body);
    let tags_elem = ebml_element(&[0x10, 0x43, 0xA7, 0x70], &tag_elem);

    let root = mkv::parse_elements(&tags_elem).unwrap();
    let tag = MkvTag::parse(&tags_elem, &root).unwrap();

    assert_eq!(tag.get_text(&KnownField::Artist), Some("Matroska Artist".to_string()));
    assert_eq!(tag.simple_tags[0].target_track, Some(7));

    let mut new_tag = MkvTag::new();
    new_tag.set_text(KnownField::Artist, "Rewritten Matroska Artist");
    let rewritten = mkv::rewrite(&tags_elem, &new_tag).unwrap();
    let new_root = mkv::parse_elements(&rewritten).unwrap();
    let reparsed = MkvTag::parse(&rewritten, &new_root).unwrap();
    assert_eq!(reparsed.get_text(&KnownField::Artist), Some("Rewritten Matroska Artist".to_string()));
}

#[test]
fn ogg_finds_vorbis_comment_packet_across_a_page() {
    let mut comments = VorbisComments::new("tagkit");
    comments.push("TITLE", "Ogg Title");

    let mut packet = b"\x03vorbis".to_vec();
    packet.extend(comments.render());
    packet.push(1); // framing bit, per the Vorbis comment-header packet format

    let page = ogg::Page::from_packets(42, 1, ogg::Page::FIRST, &[packet]);
    let rendered = page.render();

    let format = ContainerFormat::sniff(&rendered).unwrap();
    assert_eq!(format, ContainerFormat::Ogg);

    let mut diag = Diagnostics::new();
    let parsed = tagkit::container::read(format, &rendered, &mut diag).unwrap();
    assert_eq!(parsed.primary().unwrap().get_text(&KnownField::Title), Some("Ogg Title".to_string()));

    let mut new_comments = VorbisComments::new("tagkit");
    new_comments.push("TITLE", "Rewritten Ogg Title");
    let rewritten = tagkit::container::rewrite(format, &rendered, &new_comments, &mut diag).unwrap();

    let reparsed = tagkit::container::read(format, &rewritten, &mut diag).unwrap();
    assert_eq!(reparsed.primary().unwrap().get_text(&KnownField::Title), Some("Rewritten Ogg Title".to_string()));
}
