//! Format-neutral chapter tree and attachment models.
//!
//! Only Matroska exposes these today (`EditionEntry`/`ChapterAtom` and
//! `Attachments`/`AttachedFile`); the shapes live here, outside
//! `formats::mkv`, so a future format that also has chapters or attachments
//! (MP4 chapter tracks, for instance) can reuse them without the models
//! being tied to one container's element IDs.

/// One node of a chapter tree. Matroska lets a `ChapterAtom` nest further
/// `ChapterAtom`s, so `children` is recursive the same way
/// [`crate::formats::mkv::SimpleTag`] is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chapter {
    pub uid: Option<u64>,
    pub start_ms: Option<u64>,
    pub end_ms: Option<u64>,
    pub title: Option<String>,
    pub children: Vec<Chapter>,
}

impl Chapter {
    pub fn new() -> Self {
        Self::default()
    }
}

/// One edition: a named, selectable top-level chapter tree. Most files have
/// exactly one, ordinary edition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Edition {
    pub uid: Option<u64>,
    pub hidden: bool,
    pub default: bool,
    pub chapters: Vec<Chapter>,
}

/// An embedded file (cover art kept outside the tag's own picture slot,
/// a font, a `.cue` sheet) referenced by a Matroska `AttachedFile` element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attachment {
    pub uid: Option<u64>,
    pub filename: String,
    pub mime_type: String,
    pub description: Option<String>,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new() -> Self {
        Self::default()
    }
}
