//! ID3v2 tag header, extended header, and version handling.

use crate::core::io::BufStream;
use crate::error::{Error, Result};
use crate::formats::id3v2::syncdata;
use log::error;
use std::convert::TryInto;
use std::fmt::{self, Display, Formatter};

const ID: &[u8] = b"ID3";

#[derive(Clone, Debug)]
pub struct TagHeader {
    version: Version,
    tag_size: u32,
    flags: TagFlags,
}

impl TagHeader {
    pub fn parse(raw: [u8; 10]) -> Result<Self> {
        if &raw[0..3] != ID {
            return Err(Error::NotFound);
        }

        let version = match (raw[3], raw[4]) {
            (2, 0) => Version::V22,
            (3, 0) => Version::V23,
            (4, 0) => Version::V24,
            (m, _) => {
                error!("ID3v2.{} is not supported", m);
                return Err(Error::Unsupported);
            }
        };

        let flags = raw[5];

        if (version == Version::V22 && flags & 0x4F != 0)
            || (version == Version::V23 && flags & 0x1F != 0)
            || (version == Version::V24 && flags & 0x0f != 0)
        {
            error!("unused flags are set on the tag header");
            return Err(Error::MalformedData);
        }

        let flags = TagFlags {
            unsync: flags & 0x80 != 0,
            extended: flags & 0x40 != 0,
            experimental: flags & 0x20 != 0,
            footer: flags & 0x10 != 0,
        };

        let tag_size = syncdata::to_u28(raw[6..10].try_into().unwrap());

        if tag_size == 0 || tag_size > 256_000_000 {
            error!("tag size can only be 1b..256mb");
            return Err(Error::MalformedData);
        }

        Ok(Self { version, tag_size, flags })
    }

    pub fn render(&self) -> [u8; 10] {
        assert_ne!(self.version, Version::V22);

        let mut header = [b'I', b'D', b'3', 0, 0, 0, 0, 0, 0, 0];

        match self.version {
            Version::V24 => header[3] = 4,
            Version::V23 => header[3] = 3,
            Version::V22 => unreachable!(),
        };

        header[5] |= u8::from(self.flags.unsync) * 0x80;
        header[5] |= u8::from(self.flags.extended) * 0x40;
        header[5] |= u8::from(self.flags.experimental) * 0x20;
        header[5] |= u8::from(self.flags.footer) * 0x10;

        header[6..10].copy_from_slice(&syncdata::from_u28(self.tag_size));

        header
    }

    pub fn with_version(version: Version) -> Self {
        Self { version, tag_size: 0, flags: TagFlags::default() }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn size(&self) -> u32 {
        self.tag_size
    }

    pub fn flags(&self) -> TagFlags {
        self.flags
    }

    pub fn version_mut(&mut self) -> &mut Version {
        &mut self.version
    }

    pub fn size_mut(&mut self) -> &mut u32 {
        &mut self.tag_size
    }

    pub fn flags_mut(&mut self) -> &mut TagFlags {
        &mut self.flags
    }
}

#[derive(Default, Clone, Copy, Debug)]
pub struct TagFlags {
    pub unsync: bool,
    pub extended: bool,
    pub experimental: bool,
    pub footer: bool,
}

/// The version a parsed tag was found in.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Version {
    V22,
    V23,
    V24,
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::V22 => write!(f, "ID3v2.2"),
            Self::V23 => write!(f, "ID3v2.3"),
            Self::V24 => write!(f, "ID3v2.4"),
        }
    }
}

impl From<SaveVersion> for Version {
    fn from(other: SaveVersion) -> Self {
        match other {
            SaveVersion::V23 => Version::V23,
            SaveVersion::V24 => Version::V24,
        }
    }
}

/// The version a tag will be written in. ID3v2.2 is obsolete and cannot be
/// produced, only read and upgraded.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum SaveVersion {
    V23,
    V24,
}

#[derive(Default, Debug, Clone)]
pub struct ExtendedHeader {
    pub padding_size: Option<u32>,
    pub crc32: Option<u32>,
    pub is_update: bool,
    pub restrictions: Option<Restrictions>,
}

impl ExtendedHeader {
    pub fn parse(stream: &mut BufStream, version: Version) -> Result<Self> {
        match version {
            Version::V22 => Err(Error::Unsupported),
            Version::V23 => parse_ext_v3(stream),
            Version::V24 => parse_ext_v4(stream),
        }
    }

    pub fn render(&self, version: Version) -> Vec<u8> {
        assert_ne!(version, Version::V22);

        match version {
            Version::V24 => render_ext_v4(self),
            Version::V23 => render_ext_v3(self),
            Version::V22 => unreachable!(),
        }
    }

    pub fn update(&mut self, to: SaveVersion) {
        match to {
            SaveVersion::V23 => {
                self.padding_size = Some(0);
                self.is_update = false;
                self.restrictions = None;
            }
            SaveVersion::V24 => {
                self.padding_size = None;
            }
        }
    }
}

fn parse_ext_v3(stream: &mut BufStream) -> Result<ExtendedHeader> {
    let size = stream.read_be_u32()?;

    if size != 6 && size != 10 {
        error!("ID3v2.3 extended headers are 6 or 10 bytes, found {}", size);
        return Err(Error::MalformedData);
    }

    let flags = stream.read_be_u16()?;

    let mut header = ExtendedHeader {
        padding_size: Some(stream.read_be_u32()?),
        crc32: None,
        is_update: false,
        restrictions: None,
    };

    if flags & 0x8000 != 0 {
        header.crc32 = Some(stream.read_be_u32()?)
    }

    Ok(header)
}

fn parse_ext_v4(stream: &mut BufStream) -> Result<ExtendedHeader> {
    let size = syncdata::to_u28(stream.read_array()?);

    if !(6..=15).contains(&size) {
        error!("ID3v2.4 extended headers can only be 6 to 15 bytes long");
        return Err(Error::MalformedData);
    }

    if stream.read_u8()? != 1 {
        error!("ID3v2.4 extended headers must have a flag count of 1");
        return Err(Error::MalformedData);
    }

    let mut header = ExtendedHeader { padding_size: None, crc32: None, is_update: false, restrictions: None };

    let flags = stream.read_u8()?;

    if flags & 0x40 != 0 {
        if stream.read_u8()? != 0 {
            error!("invalid is_update length");
            return Err(Error::MalformedData);
        }

        header.is_update = true;
    }

    if flags & 0x20 != 0 {
        if stream.read_u8()? != 5 {
            error!("invalid CRC-32 length");
            return Err(Error::MalformedData);
        }

        header.crc32 = Some(syncdata::to_u35(stream.read_array()?));
    }

    if flags & 0x10 != 0 {
        if stream.read_u8()? != 1 {
            error!("invalid restrictions length");
            return Err(Error::MalformedData);
        }

        let restrictions = stream.read_u8()?;

        let tag_size = match restrictions >> 6 {
            0 => TagSizeRestriction::Max128Frames1Mb,
            1 => TagSizeRestriction::Max64Frames128Kb,
            2 => TagSizeRestriction::Max32Frames40Kb,
            3 => TagSizeRestriction::Max32Frames4Kb,
            _ => unreachable!(),
        };

        let text_encoding = match (restrictions & 0x20) >> 5 {
            0 => TextEncodingRestriction::None,
            1 => TextEncodingRestriction::Latin1OrUtf8,
            _ => unreachable!(),
        };

        let text_size = match (restrictions & 0x18) >> 3 {
            0 => TextSizeRestriction::None,
            1 => TextSizeRestriction::LessThan1024Chars,
            2 => TextSizeRestriction::LessThan128Chars,
            3 => TextSizeRestriction::LessThan30Chars,
            _ => unreachable!(),
        };

        let image_encoding = match (restrictions & 0x4) >> 2 {
            0 => ImageEncodingRestriction::None,
            1 => ImageEncodingRestriction::OnlyPngOrJpeg,
            _ => unreachable!(),
        };

        let image_size = match (restrictions & 0x3) >> 1 {
            0 => ImageSizeRestriction::None,
            1 => ImageSizeRestriction::LessThan256x256,
            2 => ImageSizeRestriction::LessThan64x64,
            3 => ImageSizeRestriction::Exactly64x64,
            _ => unreachable!(),
        };

        header.restrictions =
            Some(Restrictions { tag_size, text_encoding, text_size, image_encoding, image_size })
    }

    Ok(header)
}

fn render_ext_v3(header: &ExtendedHeader) -> Vec<u8> {
    let mut data = vec![0, 0, 0, 6, 0, 0];

    data.extend(header.padding_size.unwrap_or_default().to_be_bytes());

    if let Some(crc) = header.crc32 {
        data[3] = 10;
        data[4] = 0x80;
        data.extend(crc.to_be_bytes());
    }

    data
}

fn render_ext_v4(header: &ExtendedHeader) -> Vec<u8> {
    let mut data = vec![0, 0, 0, 6, 1, 0];

    if header.is_update {
        data[3] += 1;
        data[5] |= 0x40;
        data.push(0);
    }

    if let Some(crc) = header.crc32 {
        data[3] += 6;
        data[5] |= 0x20;
        data.push(5);
        data.extend(syncdata::from_u35(crc));
    }

    if let Some(restrictions) = header.restrictions {
        data[3] += 2;
        data[5] |= 0x10;
        data.push(1);

        let mut bits = 0;
        bits |= (restrictions.tag_size as u8) << 6;
        bits |= (restrictions.text_encoding as u8) << 5;
        bits |= (restrictions.text_size as u8) << 3;
        bits |= (restrictions.image_encoding as u8) << 2;
        bits |= (restrictions.image_size as u8) << 1;

        data.push(bits)
    }

    data
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Restrictions {
    pub tag_size: TagSizeRestriction,
    pub text_encoding: TextEncodingRestriction,
    pub text_size: TextSizeRestriction,
    pub image_encoding: ImageEncodingRestriction,
    pub image_size: ImageSizeRestriction,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TagSizeRestriction {
    Max128Frames1Mb = 0,
    Max64Frames128Kb = 1,
    Max32Frames40Kb = 2,
    Max32Frames4Kb = 3,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TextEncodingRestriction {
    None = 0,
    Latin1OrUtf8 = 1,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TextSizeRestriction {
    None = 0,
    LessThan1024Chars = 1,
    LessThan128Chars = 2,
    LessThan30Chars = 3,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImageEncodingRestriction {
    None = 0,
    OnlyPngOrJpeg = 1,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImageSizeRestriction {
    None = 0,
    LessThan256x256 = 1,
    LessThan64x64 = 2,
    Exactly64x64 = 3,
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXT_DATA_V3: &[u8] = b"\x00\x00\x00\x0A\x80\x00\xAB\xCD\xEF\x16\x16\x16\x16\x16";
    const EXT_DATA_V4: &[u8] = b"\x00\x00\x00\x0F\x01\x70\x00\x05\x07\x5E\x37\x5E\x16\x01\xB4";

    #[test]
    fn parse_v3_tag_header() {
        let data = b"\x49\x44\x33\x03\x00\xA0\x00\x08\x49\x30";
        let header = TagHeader::parse(*data).unwrap();
        let flags = header.flags();

        assert_eq!(header.size(), 140464);
        assert_eq!(header.version(), Version::V23);
        assert!(flags.unsync);
        assert!(!flags.extended);
        assert!(flags.experimental);
    }

    #[test]
    fn parse_v4_tag_header() {
        let data = b"\x49\x44\x33\x04\x00\x50\x00\x08\x49\x30";
        let header = TagHeader::parse(*data).unwrap();
        let flags = header.flags();

        assert_eq!(header.size(), 140464);
        assert_eq!(header.version(), Version::V24);
        assert!(!flags.unsync);
        assert!(flags.extended);
        assert!(!flags.experimental);
        assert!(flags.footer);
    }

    #[test]
    fn parse_v3_ext_header() {
        let header = ExtendedHeader::parse(&mut BufStream::new(EXT_DATA_V3), Version::V23).unwrap();

        assert_eq!(header.padding_size, Some(0xABCDEF16));
        assert_eq!(header.crc32, Some(0x16161616));
        assert!(!header.is_update);
        assert_eq!(header.restrictions, None);
    }

    #[test]
    fn parse_v4_ext_header() {
        let header = ExtendedHeader::parse(&mut BufStream::new(EXT_DATA_V4), Version::V24).unwrap();

        assert_eq!(header.padding_size, None);
        assert_eq!(header.crc32, Some(0x7BCDEF16));
        assert!(header.is_update);

        let restrictions = header.restrictions.unwrap();
        assert_eq!(restrictions.tag_size, TagSizeRestriction::Max32Frames40Kb);
        assert_eq!(restrictions.text_encoding, TextEncodingRestriction::Latin1OrUtf8);
        assert_eq!(restrictions.text_size, TextSizeRestriction::LessThan128Chars);
        assert_eq!(restrictions.image_encoding, ImageEncodingRestriction::OnlyPngOrJpeg);
        assert_eq!(restrictions.image_size, ImageSizeRestriction::None);
    }

    #[test]
    fn render_v3_ext_header() {
        let header =
            ExtendedHeader { padding_size: Some(0xABCDEF16), crc32: Some(0x16161616), ..Default::default() };

        assert_eq!(header.render(Version::V23), EXT_DATA_V3);
    }

    #[test]
    fn render_v4_ext_header() {
        let header = ExtendedHeader {
            crc32: Some(0x7BCDEF16),
            is_update: true,
            restrictions: Some(Restrictions {
                tag_size: TagSizeRestriction::Max32Frames40Kb,
                text_encoding: TextEncodingRestriction::Latin1OrUtf8,
                text_size: TextSizeRestriction::LessThan128Chars,
                image_encoding: ImageEncodingRestriction::OnlyPngOrJpeg,
                image_size: ImageSizeRestriction::None,
            }),
            ..Default::default()
        };

        assert_eq!(header.render(Version::V24), EXT_DATA_V4);
    }
}
