//! Vorbis comments: the flat `KEY=VALUE` tag format shared by Ogg Vorbis,
//! Ogg Opus, Ogg FLAC, and native FLAC streams.
//!
//! A comment block is a vendor string followed by a list of UTF-8
//! `KEY=VALUE` pairs, keys matched case-insensitively. Pictures don't have
//! a dedicated slot; they're smuggled in as a `METADATA_BLOCK_PICTURE`
//! comment whose value is the base64 encoding of a FLAC `PICTURE` metadata
//! block (RFC reference: https://wiki.xiph.org/VorbisComment#METADATA_BLOCK_PICTURE).

use crate::core::io::BufStream;
use crate::error::Result;
use crate::string;
use crate::tag::{Tag, TagTarget};
use crate::value::{KnownField, PictureType, TagValue};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use indexmap::IndexMap;

/// A parsed Vorbis comment block, order-preserving and keyed
/// case-insensitively like the format requires.
#[derive(Debug, Clone, Default)]
pub struct VorbisComments {
    pub vendor: String,
    fields: IndexMap<String, Vec<String>>,
}

impl VorbisComments {
    pub fn new(vendor: impl Into<String>) -> Self {
        VorbisComments { vendor: vendor.into(), fields: IndexMap::new() }
    }

    /// Parses a comment block's body (vendor string onward, no leading
    /// framing byte as FLAC's `METADATA_BLOCK_HEADER` already stripped).
    pub fn parse(stream: &mut BufStream) -> Result<Self> {
        let vendor_len = stream.read_le_u32()? as usize;
        let vendor = string::read_utf8(stream.slice(vendor_len)?);

        let count = stream.read_le_u32()?;
        let mut comments = VorbisComments::new(vendor);

        for _ in 0..count {
            let len = stream.read_le_u32()? as usize;
            let raw = stream.slice(len)?;
            let text = string::read_utf8(raw);

            let (key, value) = match text.split_once('=') {
                Some((k, v)) => (k, v),
                None => continue,
            };

            comments.push(key, value);
        }

        Ok(comments)
    }

    pub fn render(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend((self.vendor.len() as u32).to_le_bytes());
        out.extend(self.vendor.as_bytes());

        let entries: Vec<(String, String)> = self
            .fields
            .iter()
            .flat_map(|(key, values)| values.iter().map(move |v| (key.clone(), v.clone())))
            .collect();

        out.extend((entries.len() as u32).to_le_bytes());

        for (key, value) in entries {
            let field = format!("{}={}", key, value);
            out.extend((field.len() as u32).to_le_bytes());
            out.extend(field.as_bytes());
        }

        out
    }

    fn canonical_key(key: &str) -> String {
        key.to_ascii_uppercase()
    }

    pub fn push(&mut self, key: &str, value: impl Into<String>) {
        self.fields.entry(Self::canonical_key(key)).or_default().push(value.into());
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.fields.insert(Self::canonical_key(key), vec![value.into()]);
    }

    pub fn get_first(&self, key: &str) -> Option<&str> {
        self.fields.get(&Self::canonical_key(key)).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        self.fields.get(&Self::canonical_key(key)).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.fields.remove(&Self::canonical_key(key))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Decodes the METADATA_BLOCK_PICTURE comment, if present, into its
    /// picture type, MIME type, description and raw image bytes.
    pub fn picture(&self) -> Option<(PictureType, String, String, Vec<u8>)> {
        let encoded = self.get_first("METADATA_BLOCK_PICTURE")?;
        let raw = STANDARD.decode(encoded).ok()?;
        decode_picture_block(&raw).ok()
    }

    pub fn set_picture(&mut self, kind: PictureType, mime: &str, description: &str, data: &[u8]) {
        let block = encode_picture_block(kind, mime, description, data);
        self.set("METADATA_BLOCK_PICTURE", STANDARD.encode(block));
    }
}

/// Encodes a FLAC `PICTURE` metadata block body (the same layout FLAC uses
/// natively, reused verbatim as the payload of `METADATA_BLOCK_PICTURE`).
fn encode_picture_block(kind: PictureType, mime: &str, description: &str, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend((kind.as_byte() as u32).to_be_bytes());
    out.extend((mime.len() as u32).to_be_bytes());
    out.extend(mime.as_bytes());
    out.extend((description.len() as u32).to_be_bytes());
    out.extend(description.as_bytes());
    out.extend(0u32.to_be_bytes()); // width
    out.extend(0u32.to_be_bytes()); // height
    out.extend(0u32.to_be_bytes()); // color depth
    out.extend(0u32.to_be_bytes()); // indexed colors
    out.extend((data.len() as u32).to_be_bytes());
    out.extend(data);
    out
}

fn decode_picture_block(raw: &[u8]) -> Result<(PictureType, String, String, Vec<u8>)> {
    let mut stream = BufStream::new(raw);
    let kind = PictureType::parse(stream.read_be_u32()? as u8);

    let mime_len = stream.read_be_u32()? as usize;
    let mime = string::read_utf8(stream.slice(mime_len)?);

    let desc_len = stream.read_be_u32()? as usize;
    let description = string::read_utf8(stream.slice(desc_len)?);

    stream.skip(16)?; // width, height, depth, indexed colors

    let data_len = stream.read_be_u32()? as usize;
    let data = stream.slice(data_len)?.to_vec();

    Ok((kind, mime, description, data))
}

const KNOWN_KEYS: &[(&str, KnownField)] = &[
    ("TITLE", KnownField::Title),
    ("ARTIST", KnownField::Artist),
    ("ALBUMARTIST", KnownField::AlbumArtist),
    ("ALBUM", KnownField::Album),
    ("TRACKNUMBER", KnownField::TrackNumber),
    ("DISCNUMBER", KnownField::DiscNumber),
    ("GENRE", KnownField::Genre),
    ("DATE", KnownField::Date),
    ("COMPOSER", KnownField::Composer),
    ("COMMENT", KnownField::Comment),
    ("LYRICS", KnownField::Lyrics),
    ("BPM", KnownField::Bpm),
    ("COMPILATION", KnownField::Compilation),
    ("ENCODED-BY", KnownField::EncodedBy),
    ("COPYRIGHT", KnownField::Copyright),
    ("GROUPING", KnownField::Grouping),
];

fn key_for(field: &KnownField) -> Option<&'static str> {
    KNOWN_KEYS.iter().find(|(_, f)| f == field).map(|(k, _)| *k)
}

impl Tag for VorbisComments {
    fn format_name(&self) -> &'static str {
        "Vorbis"
    }

    fn target(&self) -> TagTarget {
        TagTarget::Global
    }

    fn fields(&self) -> Vec<KnownField> {
        let mut out: Vec<KnownField> = KNOWN_KEYS
            .iter()
            .filter(|(key, _)| self.fields.contains_key(*key))
            .map(|(_, field)| field.clone())
            .collect();

        if self.picture().is_some() {
            out.push(KnownField::Picture);
        }

        for key in self.fields.keys() {
            if !KNOWN_KEYS.iter().any(|(k, _)| k == key) && key != "METADATA_BLOCK_PICTURE" {
                out.push(KnownField::Custom(key.clone()));
            }
        }

        out
    }

    fn get(&self, field: &KnownField) -> Option<&TagValue> {
        // Vorbis comments are flat strings; there's nowhere to stash a
        // constructed TagValue to return a reference to, so this codec only
        // supports read access through `get_text`/`picture`.
        let _ = field;
        None
    }

    fn set(&mut self, field: KnownField, value: TagValue) {
        if let KnownField::Picture = field {
            if let TagValue::Picture { mime, description, kind, data } = value {
                self.set_picture(kind, &mime, &description, &data);
            }
            return;
        }

        let key = match &field {
            KnownField::Custom(name) => name.clone(),
            other => match key_for(other) {
                Some(k) => k.to_string(),
                None => return,
            },
        };

        self.set(&key, value.to_display_string());
    }

    fn remove(&mut self, field: &KnownField) -> Option<TagValue> {
        let key = match field {
            KnownField::Picture => "METADATA_BLOCK_PICTURE".to_string(),
            KnownField::Custom(name) => name.clone(),
            other => key_for(other)?.to_string(),
        };

        self.remove(&key).map(|values| TagValue::Text { encoding: crate::string::Encoding::Utf8, text: values })
    }

    fn clear(&mut self) {
        self.fields.clear();
    }

    fn get_text(&self, field: &KnownField) -> Option<String> {
        match field {
            KnownField::Custom(name) => self.get_first(name).map(str::to_string),
            other => {
                let key = key_for(other)?;
                self.get_first(key).map(str::to_string)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_renders_round_trip() {
        let mut comments = VorbisComments::new("tagkit");
        comments.push("ARTIST", "Boards of Canada");
        comments.push("TITLE", "Roygbiv");

        let rendered = comments.render();
        let mut stream = BufStream::new(&rendered);
        let parsed = VorbisComments::parse(&mut stream).unwrap();

        assert_eq!(parsed.vendor, "tagkit");
        assert_eq!(parsed.get_first("ARTIST"), Some("Boards of Canada"));
        assert_eq!(parsed.get_first("artist"), Some("Boards of Canada"));
    }

    #[test]
    fn picture_round_trips_through_base64() {
        let mut comments = VorbisComments::new("tagkit");
        comments.set_picture(PictureType::CoverFront, "image/png", "cover", &[1, 2, 3, 4]);

        let (kind, mime, description, data) = comments.picture().unwrap();
        assert_eq!(kind, PictureType::CoverFront);
        assert_eq!(mime, "image/png");
        assert_eq!(description, "cover");
        assert_eq!(data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn keys_are_case_insensitive() {
        let mut comments = VorbisComments::new("tagkit");
        comments.set("Album", "Geogaddi");
        assert_eq!(comments.get_first("ALBUM"), Some("Geogaddi"));
    }
}
