//! FLAC's metadata-block stream: a `fLaC` marker followed by a sequence of
//! length-prefixed blocks, exactly one of which (`VORBIS_COMMENT`) carries
//! the tag this crate cares about, plus any number of `PICTURE` blocks.

use crate::core::io::BufStream;
use crate::error::{Error, Result};
use crate::formats::vorbis::VorbisComments;
use crate::value::PictureType;

pub const MAGIC: &[u8; 4] = b"fLaC";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    StreamInfo,
    Padding,
    Application,
    SeekTable,
    VorbisComment,
    CueSheet,
    Picture,
    Unknown(u8),
}

impl BlockType {
    fn from_byte(byte: u8) -> Self {
        match byte {
            0 => BlockType::StreamInfo,
            1 => BlockType::Padding,
            2 => BlockType::Application,
            3 => BlockType::SeekTable,
            4 => BlockType::VorbisComment,
            5 => BlockType::CueSheet,
            6 => BlockType::Picture,
            other => BlockType::Unknown(other),
        }
    }

    fn as_byte(self) -> u8 {
        match self {
            BlockType::StreamInfo => 0,
            BlockType::Padding => 1,
            BlockType::Application => 2,
            BlockType::SeekTable => 3,
            BlockType::VorbisComment => 4,
            BlockType::CueSheet => 5,
            BlockType::Picture => 6,
            BlockType::Unknown(byte) => byte,
        }
    }
}

/// One metadata block, kept as raw bytes unless it's one this crate
/// specializes (`VORBIS_COMMENT`, `PICTURE`).
#[derive(Debug, Clone)]
pub struct MetadataBlock {
    pub kind: BlockType,
    pub is_last: bool,
    pub data: Vec<u8>,
}

/// A FLAC stream's metadata-block chain, with `StreamInfo` always first per
/// the format's own requirement.
#[derive(Debug, Clone, Default)]
pub struct FlacStream {
    pub blocks: Vec<MetadataBlock>,
}

impl FlacStream {
    /// Parses the metadata-block chain, starting right after the `fLaC`
    /// marker has already been consumed by the caller.
    pub fn parse(stream: &mut BufStream) -> Result<Self> {
        let mut blocks = Vec::new();

        loop {
            let flags = stream.read_u8()?;
            let is_last = flags & 0x80 != 0;
            let kind = BlockType::from_byte(flags & 0x7f);

            let len = u32::from_be_bytes([0, stream.read_u8()?, stream.read_u8()?, stream.read_u8()?]) as usize;
            let data = stream.slice(len)?.to_vec();

            blocks.push(MetadataBlock { kind, is_last, data });

            if is_last {
                break;
            }
        }

        Ok(FlacStream { blocks })
    }

    pub fn render(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(MAGIC);

        let last_index = self.blocks.len().saturating_sub(1);
        for (i, block) in self.blocks.iter().enumerate() {
            let flags = block.kind.as_byte() | if i == last_index { 0x80 } else { 0 };
            out.push(flags);

            let len = block.data.len() as u32;
            out.extend(&len.to_be_bytes()[1..]);
            out.extend(&block.data);
        }

        out
    }

    pub fn comments(&self) -> Option<VorbisComments> {
        let block = self.blocks.iter().find(|b| b.kind == BlockType::VorbisComment)?;
        let mut stream = BufStream::new(&block.data);
        VorbisComments::parse(&mut stream).ok()
    }

    /// Replaces (or inserts) the `VORBIS_COMMENT` block with `comments`,
    /// keeping every other block -- including `PICTURE` blocks, which this
    /// crate leaves untouched since artwork is addressed through Vorbis's
    /// own `METADATA_BLOCK_PICTURE` convention only when no native
    /// `PICTURE` block exists.
    pub fn set_comments(&mut self, comments: &VorbisComments) {
        let rendered = comments.render();

        if let Some(block) = self.blocks.iter_mut().find(|b| b.kind == BlockType::VorbisComment) {
            block.data = rendered;
            return;
        }

        self.blocks.push(MetadataBlock { kind: BlockType::VorbisComment, is_last: false, data: rendered });
        self.relast();
    }

    pub fn pictures(&self) -> Vec<(PictureType, String, Vec<u8>)> {
        self.blocks
            .iter()
            .filter(|b| b.kind == BlockType::Picture)
            .filter_map(|b| parse_picture_block(&b.data).ok())
            .collect()
    }

    fn relast(&mut self) {
        let last = self.blocks.len().saturating_sub(1);
        for (i, block) in self.blocks.iter_mut().enumerate() {
            block.is_last = i == last;
        }
    }
}

fn parse_picture_block(data: &[u8]) -> Result<(PictureType, String, Vec<u8>)> {
    let mut stream = BufStream::new(data);
    let kind = PictureType::parse(stream.read_be_u32()? as u8);

    let mime_len = stream.read_be_u32()? as usize;
    let mime = crate::string::read_utf8(stream.slice(mime_len)?);

    let desc_len = stream.read_be_u32()? as usize;
    stream.skip(desc_len)?;
    stream.skip(16)?;

    let data_len = stream.read_be_u32()? as usize;
    let image = stream.slice(data_len)?.to_vec();

    if mime.is_empty() && image.is_empty() {
        return Err(Error::MalformedData);
    }

    Ok((kind, mime, image))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_stream() -> FlacStream {
        FlacStream {
            blocks: vec![
                MetadataBlock { kind: BlockType::StreamInfo, is_last: false, data: vec![0; 34] },
                MetadataBlock { kind: BlockType::Padding, is_last: true, data: vec![0; 10] },
            ],
        }
    }

    #[test]
    fn parses_block_chain_round_trip() {
        let original = sample_stream();
        let rendered = original.render();

        let mut stream = BufStream::new(&rendered[4..]);
        let parsed = FlacStream::parse(&mut stream).unwrap();

        assert_eq!(parsed.blocks.len(), 2);
        assert_eq!(parsed.blocks[0].kind, BlockType::StreamInfo);
        assert!(parsed.blocks[1].is_last);
    }

    #[test]
    fn set_comments_inserts_when_absent() {
        let mut stream = sample_stream();
        let mut comments = VorbisComments::new("tagkit");
        comments.push("ARTIST", "Boris");
        stream.set_comments(&comments);

        assert!(stream.blocks.iter().any(|b| b.kind == BlockType::VorbisComment));
        assert!(stream.blocks.last().unwrap().is_last);
    }

    #[test]
    fn set_comments_replaces_existing_block() {
        let mut stream = sample_stream();
        let mut comments = VorbisComments::new("tagkit");
        comments.push("ARTIST", "Boris");
        stream.set_comments(&comments);

        let mut updated = VorbisComments::new("tagkit");
        updated.push("ARTIST", "Melvins");
        stream.set_comments(&updated);

        let vc_blocks = stream.blocks.iter().filter(|b| b.kind == BlockType::VorbisComment).count();
        assert_eq!(vc_blocks, 1);

        let comments = stream.comments().unwrap();
        assert_eq!(comments.get_first("ARTIST"), Some("Melvins"));
    }
}
