//! ID3v2.2 <-> 2.3 <-> 2.4 frame ID and shape compatibility.

use crate::formats::id3v2::collections::FrameMap;
use crate::formats::id3v2::frame::FrameId;
use crate::formats::id3v2::frames::{Frame, TextFrame};
use crate::string::Encoding;
use log::info;

const V2_V3_CONV: &[(&[u8; 3], &[u8; 4])] = &[
    (b"BUF", b"RBUF"),
    (b"CNT", b"PCNT"),
    (b"COM", b"COMM"),
    (b"CRA", b"AENC"),
    (b"ETC", b"ETCO"),
    (b"EQU", b"EQUA"),
    (b"GEO", b"GEOB"),
    (b"IPL", b"IPLS"),
    (b"LNK", b"LINK"),
    (b"MCI", b"MCDI"),
    (b"MLL", b"MLLT"),
    (b"POP", b"POPM"),
    (b"REV", b"RVRB"),
    (b"RVA", b"RVAD"),
    (b"SLT", b"SYLT"),
    (b"STC", b"SYTC"),
    (b"TAL", b"TALB"),
    (b"TBP", b"TBPM"),
    (b"TCM", b"TCOM"),
    (b"TCO", b"TCON"),
    (b"TCR", b"TCOP"),
    (b"TDA", b"TDAT"),
    (b"TDY", b"TDLY"),
    (b"TFT", b"TFLT"),
    (b"TEN", b"TENC"),
    (b"TIM", b"TIME"),
    (b"TKE", b"TKEY"),
    (b"TLA", b"TLAN"),
    (b"TLE", b"TLEN"),
    (b"TMT", b"TMED"),
    (b"TOA", b"TOPE"),
    (b"TOF", b"TOFN"),
    (b"TOL", b"TOLY"),
    (b"TOR", b"TORY"),
    (b"TOT", b"TOAR"),
    (b"TP1", b"TPE1"),
    (b"TP2", b"TPE2"),
    (b"TP3", b"TPE3"),
    (b"TP4", b"TPE4"),
    (b"TPA", b"TPOS"),
    (b"TPB", b"TPUB"),
    (b"TRC", b"TSRC"),
    (b"TRD", b"TRDA"),
    (b"TRK", b"TRCK"),
    (b"TSI", b"TSIZ"),
    (b"TSS", b"TSSE"),
    (b"TT1", b"TIT1"),
    (b"TT2", b"TIT2"),
    (b"TT3", b"TIT3"),
    (b"TXT", b"TEXT"),
    (b"TXX", b"TXXX"),
    (b"TYE", b"TYER"),
    (b"UFI", b"UFID"),
    (b"ULT", b"USLT"),
    (b"WAF", b"WOAF"),
    (b"WAR", b"WOAR"),
    (b"WAS", b"WOAS"),
    (b"WCM", b"WCOM"),
    (b"WCP", b"WCOP"),
    (b"WPB", b"WPUB"),
    (b"WXX", b"WXXX"),
    (b"PCS", b"PCST"),
    (b"TCT", b"TCAT"),
    (b"TDR", b"TDRL"),
    (b"TDS", b"TDES"),
    (b"TID", b"TGID"),
    (b"WFD", b"WFED"),
    (b"MVN", b"MVNM"),
    (b"MVI", b"MVIN"),
    (b"GP1", b"GRP1"),
];

/// Upgrades a 3-character ID3v2.2 frame ID to its ID3v2.3/2.4 4-character
/// analogue. `PIC` (-> `APIC`) is handled by the frame-specific parser
/// since its body layout also changes, not just its ID.
pub fn upgrade_v2_id(id: &[u8; 3]) -> Option<FrameId> {
    V2_V3_CONV.iter().find(|(v2, _)| *v2 == id).map(|(_, v3)| FrameId::new(v3))
}

const V4_ONLY: &[&[u8; 4]] = &[
    b"EQU2", b"RVA2", b"ASPI", b"SEEK", b"SIGN", b"TDEN", b"TDRL", b"TDTG", b"TMOO", b"TPRO", b"TSST", b"TSOA",
    b"TSOP", b"TSOT",
];

const V3_ONLY: &[&[u8; 4]] = &[b"EQUA", b"RVAD", b"TSIZ", b"TRDA"];

/// Upgrades a tag's frames from ID3v2.3 shape to ID3v2.4 shape: splices
/// TYER/TDAT/TIME into a single TDRC timestamp, renames TORY to TDOR, and
/// drops frames with no sane v2.4 analogue.
pub fn to_v4(frames: &mut FrameMap) {
    let timestamp = to_timestamp(frames);

    if !timestamp.is_empty() {
        info!("spliced timestamp {} into TDRC", timestamp);
        frames.add(Box::new(text_frame(FrameId::new(b"TDRC"), &timestamp)));
    }

    if let Some(mut frame) = frames.remove("TORY") {
        info!("upgrading TORY to TDOR");
        rekey_text_frame(&mut frame, FrameId::new(b"TDOR"));
        frames.add(frame);
    }

    frames.retain(|_, frame| {
        if V3_ONLY.contains(&frame.id().as_bytes()) {
            info!("dropping ID3v2.4-incompatible frame {}", frame.id());
            false
        } else {
            true
        }
    });
}

/// Downgrades a tag's frames from ID3v2.4 shape to ID3v2.3 shape: the
/// inverse of [`to_v4`].
pub fn to_v3(frames: &mut FrameMap) {
    if let Some(mut frame) = frames.remove("TDOR") {
        info!("downgrading TDOR to TORY");

        if let Some(tory) = frame.downcast_ref::<TextFrame>() {
            if !tory.is_empty() {
                let year = tory.text[0].splitn(2, |ch: char| !ch.is_ascii_digit()).next().unwrap_or_default();
                if !year.is_empty() {
                    frames.add(Box::new(text_frame(FrameId::new(b"TORY"), year)));
                }
            }
        }
    }

    from_timestamp(frames);

    frames.retain(|_, frame| {
        if V4_ONLY.contains(&frame.id().as_bytes()) {
            info!("dropping ID3v2.3-incompatible frame {}", frame.id());
            false
        } else {
            true
        }
    });
}

fn rekey_text_frame(frame: &mut Box<dyn Frame>, new_id: FrameId) {
    if let Some(text) = frame.downcast_mut::<TextFrame>() {
        text.set_id(new_id);
    }
}

fn text_frame(id: FrameId, value: &str) -> TextFrame {
    let mut frame = TextFrame::new(id);
    frame.encoding = Encoding::Utf8;
    frame.text = vec![value.to_string()];
    frame
}

fn to_timestamp(frames: &mut FrameMap) -> String {
    let mut timestamp = String::new();
    let tyer_frame = frames.remove("TYER");
    let tdat_frame = frames.remove("TDAT");
    let time_frame = frames.remove("TIME");

    let tyer = match tyer_frame.as_ref().and_then(|f| f.downcast_ref::<TextFrame>()) {
        Some(f) if !f.is_empty() => f,
        _ => return timestamp,
    };

    let year = tyer.text[0].rsplitn(2, |ch: char| !ch.is_ascii_digit()).last().unwrap_or_default();
    if year.is_empty() {
        return timestamp;
    }
    timestamp.push_str(year);

    let tdat = match tdat_frame.as_ref().and_then(|f| f.downcast_ref::<TextFrame>()) {
        Some(f) if !f.is_empty() => f,
        _ => return timestamp,
    };

    match parse_date_pair(&tdat.text[0], '-', '-') {
        Some(date) => timestamp.push_str(&date),
        None => return timestamp,
    }

    let time = match time_frame.as_ref().and_then(|f| f.downcast_ref::<TextFrame>()) {
        Some(f) if !f.is_empty() => f,
        _ => return timestamp,
    };

    if let Some(time) = parse_date_pair(&time.text[0], 'T', ':') {
        timestamp.push_str(&time);
    }

    timestamp
}

fn from_timestamp(frames: &mut FrameMap) {
    let frame = match frames.remove("TDRC") {
        Some(f) => f,
        None => return,
    };

    let tdrc = match frame.downcast_ref::<TextFrame>() {
        Some(f) if !f.is_empty() => f,
        _ => return,
    };

    let mut split = tdrc.text[0].splitn(6, |ch: char| !ch.is_ascii_digit());

    let year = match split.next() {
        Some(year) if !year.is_empty() => year,
        _ => return,
    };
    frames.add(Box::new(text_frame(FrameId::new(b"TYER"), year)));

    match (split.next(), split.next()) {
        (Some(mm), Some(dd)) if mm.len() == 2 && dd.len() == 2 => {
            frames.add(Box::new(text_frame(FrameId::new(b"TDAT"), &format!("{}{}", mm, dd))));
        }
        _ => return,
    }

    if let (Some(hh), Some(mm)) = (split.next(), split.next()) {
        if hh.len() == 2 && mm.len() == 2 {
            frames.add(Box::new(text_frame(FrameId::new(b"TIME"), &format!("{}{}", hh, mm))));
        }
    }
}

fn parse_date_pair(string: &str, start: char, mid: char) -> Option<String> {
    let mut chars = string.chars();
    let mut result = String::with_capacity(6);
    result.push(start);

    for i in 0..4 {
        match chars.next() {
            Some(ch) if ch.is_ascii_digit() => {
                result.push(ch);
                if i == 1 {
                    result.push(mid);
                }
            }
            _ => return None,
        }
    }

    Some(result)
}
