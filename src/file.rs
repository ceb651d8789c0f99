//! [`MediaFile`], the top-level entry point: open a path, get back whatever
//! tag its container holds, edit it through the format-neutral [`Tag`] API,
//! and save.

use crate::chapter::{Attachment, Edition};
use crate::container::{self, ContainerFormat, ParsedTags};
use crate::diag::Diagnostics;
use crate::error::{Error, Result};
use crate::formats::id3v1::Id3v1Tag;
use crate::formats::id3v2::Id3v2Tag;
use crate::formats::mkv::MkvTag;
use crate::formats::mp4::Mp4Tag;
use crate::formats::vorbis::VorbisComments;
use crate::progress::AbortToken;
use crate::rewriter::{self, Backup, RewritePolicy};
use crate::tag::Tag;
use std::fs;
use std::path::{Path, PathBuf};

/// Which on-disk tag slot [`MediaFile::create_tag`]/[`MediaFile::remove_tag`]
/// should act on. Only MP3 has more than one kind coexisting in the same
/// file; every other variant names the one slot its format has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Id3v1,
    Id3v2,
    VorbisComment,
    Mp4,
    Matroska,
}

/// An opened media file: its sniffed container format plus whatever tags
/// [`container::read`] found in it, along with a running log of anything
/// [`container::read`]/[`container::rewrite`] noticed along the way.
pub struct MediaFile {
    path: PathBuf,
    format: ContainerFormat,
    data: Vec<u8>,
    tags: ParsedTags,
    diag: Diagnostics,
}

impl MediaFile {
    /// Opens `path`, reads its full contents, sniffs its container format,
    /// and parses whatever tag(s) it holds.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<MediaFile> {
        let path = path.as_ref().to_path_buf();
        let data = fs::read(&path)?;

        let format = ContainerFormat::sniff(&data).ok_or(Error::Unsupported)?;
        let mut diag = Diagnostics::new();
        let tags = container::read(format, &data, &mut diag)?;

        Ok(MediaFile { path, format, data, tags, diag })
    }

    pub fn format(&self) -> ContainerFormat {
        self.format
    }

    /// The tag callers should read from by default: see
    /// [`ParsedTags::primary`] for which one that is per format.
    pub fn tag(&self) -> Option<&dyn Tag> {
        self.tags.primary()
    }

    pub fn tags(&self) -> &ParsedTags {
        &self.tags
    }

    /// This file's chapter tree, if its format has one. Empty for every
    /// format but Matroska (see [`container::chapters`]).
    pub fn chapters(&self) -> Result<Vec<Edition>> {
        container::chapters(self.format, &self.data)
    }

    /// This file's embedded attachments, if its format has any. Empty for
    /// every format but Matroska (see [`container::attachments`]).
    pub fn attachments(&self) -> Result<Vec<Attachment>> {
        container::attachments(self.format, &self.data)
    }

    /// This file's audio track headers, if its format exposes them outside
    /// the tag itself. Empty for every format but MP4 and Matroska (see
    /// [`container::tracks`]).
    pub fn tracks(&self) -> Result<Vec<crate::track::Track>> {
        container::tracks(self.format, &self.data)
    }

    /// Everything noticed while opening this file and, after a [`save`]
    /// call, while rewriting it.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diag
    }

    /// Writes `tag` back into the file this [`MediaFile`] was opened from,
    /// with the given padding policy, checking `abort` before doing any
    /// file I/O. Anything the rewrite notices is appended to
    /// [`diagnostics`](MediaFile::diagnostics), and this [`MediaFile`]'s own
    /// tag/chapter/attachment view is refreshed from the rewritten file.
    pub fn save(&mut self, tag: &dyn Tag, policy: &RewritePolicy, abort: &AbortToken) -> Result<()> {
        rewriter::rewrite_file(&self.path, self.format, tag, policy, abort, &mut self.diag)?;
        self.reload()
    }

    /// Like [`save`](MediaFile::save), but saves the file's prior contents
    /// through `backup` first.
    pub fn save_with_backup(
        &mut self,
        tag: &dyn Tag,
        policy: &RewritePolicy,
        abort: &AbortToken,
        backup: &mut dyn Backup,
    ) -> Result<()> {
        rewriter::rewrite_file_with_backup(&self.path, self.format, tag, policy, abort, Some(backup), &mut self.diag)?;
        self.reload()
    }

    /// Re-reads this file's contents and reparses its tag(s) after a
    /// rewrite, so `tag()`/`chapters()`/`attachments()` reflect what was
    /// just written rather than what [`open`](MediaFile::open) first saw.
    fn reload(&mut self) -> Result<()> {
        self.data = fs::read(&self.path)?;
        self.tags = container::read(self.format, &self.data, &mut self.diag)?;
        Ok(())
    }

    /// Convenience over [`save`](MediaFile::save) using the default
    /// [`RewritePolicy`] and no cancellation.
    pub fn save_default(&mut self, tag: &dyn Tag) -> Result<()> {
        self.save(tag, &RewritePolicy::default(), &AbortToken::new())
    }

    /// Creates `target`'s tag slot if this file doesn't already have one,
    /// returning a mutable handle to it either way. Fails with
    /// [`Error::Unsupported`] if `target` doesn't name a slot this file's
    /// format has (e.g. [`TagKind::Id3v2`] on an MP4 file).
    pub fn create_tag(&mut self, target: TagKind) -> Result<&mut dyn Tag> {
        match (target, &mut self.tags) {
            (TagKind::Id3v1, ParsedTags::Mp3 { id3v1, .. }) => Ok(id3v1.get_or_insert_with(Id3v1Tag::new)),
            (TagKind::Id3v2, ParsedTags::Mp3 { id3v2, .. }) => Ok(id3v2.get_or_insert_with(Id3v2Tag::new)),
            (TagKind::VorbisComment, ParsedTags::Ogg(comments) | ParsedTags::Flac(comments)) => Ok(comments),
            (TagKind::Mp4, ParsedTags::Mp4(tag)) => Ok(tag),
            (TagKind::Matroska, ParsedTags::Matroska(tag)) => Ok(tag),
            _ => Err(Error::Unsupported),
        }
    }

    /// Shorthand for `create_tag(TagKind::Id3v1)` on an MP3 file.
    pub fn create_id3v1_tag(&mut self) -> Result<&mut Id3v1Tag> {
        match &mut self.tags {
            ParsedTags::Mp3 { id3v1, .. } => Ok(id3v1.get_or_insert_with(Id3v1Tag::new)),
            _ => Err(Error::Unsupported),
        }
    }

    /// Shorthand for `create_tag(TagKind::Id3v2)` on an MP3 file.
    pub fn create_id3v2_tag(&mut self) -> Result<&mut Id3v2Tag> {
        match &mut self.tags {
            ParsedTags::Mp3 { id3v2, .. } => Ok(id3v2.get_or_insert_with(Id3v2Tag::new)),
            _ => Err(Error::Unsupported),
        }
    }

    /// Shorthand for `create_tag(TagKind::VorbisComment)` on an Ogg/FLAC
    /// file.
    pub fn create_vorbis_comment(&mut self) -> Result<&mut VorbisComments> {
        match &mut self.tags {
            ParsedTags::Ogg(comments) | ParsedTags::Flac(comments) => Ok(comments),
            _ => Err(Error::Unsupported),
        }
    }

    /// Drops `target`'s tag slot, leaving this file's other tags (if any)
    /// untouched. Fails with [`Error::Unsupported`] the same way
    /// [`create_tag`](MediaFile::create_tag) does.
    pub fn remove_tag(&mut self, target: TagKind) -> Result<()> {
        match (target, &mut self.tags) {
            (TagKind::Id3v1, ParsedTags::Mp3 { id3v1, .. }) => {
                *id3v1 = None;
                Ok(())
            }
            (TagKind::Id3v2, ParsedTags::Mp3 { id3v2, .. }) => {
                *id3v2 = None;
                Ok(())
            }
            (TagKind::VorbisComment, ParsedTags::Ogg(comments) | ParsedTags::Flac(comments)) => {
                *comments = VorbisComments::new("tagkit");
                Ok(())
            }
            (TagKind::Mp4, ParsedTags::Mp4(tag)) => {
                *tag = Mp4Tag::new();
                Ok(())
            }
            (TagKind::Matroska, ParsedTags::Matroska(tag)) => {
                *tag = MkvTag::new();
                Ok(())
            }
            _ => Err(Error::Unsupported),
        }
    }

    /// Drops every tag this file's format can hold, leaving it with none at
    /// all. Unlike [`remove_tag`](MediaFile::remove_tag), this always
    /// succeeds regardless of what was actually present.
    pub fn remove_all_tags(&mut self) {
        self.tags = match self.format {
            ContainerFormat::Mp3 => ParsedTags::Mp3 { id3v2: None, id3v1: None },
            ContainerFormat::Mp4 => ParsedTags::Mp4(Mp4Tag::new()),
            ContainerFormat::Matroska => ParsedTags::Matroska(MkvTag::new()),
            ContainerFormat::Ogg => ParsedTags::Ogg(VorbisComments::new("tagkit")),
            ContainerFormat::Flac => ParsedTags::Flac(VorbisComments::new("tagkit")),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::id3v1::Id3v1Tag;
    use crate::value::KnownField;
    use std::io::Write;

    fn write_sample_mp3(path: &Path) {
        let mut tag = crate::formats::id3v2::Id3v2Tag::new();
        tag.set_text(KnownField::Title, "Test Title");
        let rendered = tag.render();

        let mut file = fs::File::create(path).unwrap();
        file.write_all(&rendered).unwrap();
        file.write_all(&[0u8; 32]).unwrap(); // stand-in audio data
    }

    #[test]
    fn opens_and_reads_id3v2_title() {
        let dir = std::env::temp_dir();
        let path = dir.join("tagkit_mediafile_test.mp3");
        write_sample_mp3(&path);

        let file = MediaFile::open(&path).unwrap();
        assert_eq!(file.format(), ContainerFormat::Mp3);
        assert_eq!(file.tag().unwrap().get_text(&KnownField::Title), Some("Test Title".to_string()));

        fs::remove_file(&path).ok();
    }

    #[test]
    fn unrecognized_file_is_unsupported() {
        let dir = std::env::temp_dir();
        let path = dir.join("tagkit_mediafile_unknown.bin");
        fs::write(&path, b"not a media container").unwrap();

        assert!(matches!(MediaFile::open(&path), Err(Error::Unsupported)));

        fs::remove_file(&path).ok();
    }

    #[test]
    fn save_round_trips_new_title() {
        let dir = std::env::temp_dir();
        let path = dir.join("tagkit_mediafile_save_test.mp3");
        write_sample_mp3(&path);

        let mut file = MediaFile::open(&path).unwrap();
        let mut tag = Id3v1Tag::new();
        tag.set_text(KnownField::Title, "Rewritten");
        file.save_default(&tag).unwrap();

        let reopened = MediaFile::open(&path).unwrap();
        assert_eq!(reopened.tag().unwrap().get_text(&KnownField::Title), Some("Rewritten".to_string()));

        fs::remove_file(&path).ok();
    }

    #[test]
    fn opening_a_tagless_mp3_warns_in_diagnostics() {
        let dir = std::env::temp_dir();
        let path = dir.join("tagkit_mediafile_tagless_test.mp3");
        fs::write(&path, [0u8; 64]).unwrap();

        let file = MediaFile::open(&path).unwrap();
        assert!(file.tag().is_none());
        assert_eq!(file.diagnostics().worst(), Some(crate::diag::Level::Warning));

        fs::remove_file(&path).ok();
    }

    #[test]
    fn save_with_backup_preserves_the_original_contents() {
        let dir = std::env::temp_dir();
        let path = dir.join("tagkit_mediafile_backup_test.mp3");
        write_sample_mp3(&path);
        let original = fs::read(&path).unwrap();

        let mut file = MediaFile::open(&path).unwrap();
        let mut tag = Id3v1Tag::new();
        tag.set_text(KnownField::Title, "Rewritten");
        let mut backup = crate::rewriter::FileBackup;
        file.save_with_backup(&tag, &RewritePolicy::default(), &AbortToken::new(), &mut backup).unwrap();

        let mut backup_path = path.clone().into_os_string();
        backup_path.push(".bak");
        assert_eq!(fs::read(&backup_path).unwrap(), original);

        fs::remove_file(&path).ok();
        fs::remove_file(&backup_path).ok();
    }

    #[test]
    fn mp3_has_no_chapters_or_attachments() {
        let dir = std::env::temp_dir();
        let path = dir.join("tagkit_mediafile_chapters_test.mp3");
        write_sample_mp3(&path);

        let file = MediaFile::open(&path).unwrap();
        assert_eq!(file.chapters().unwrap(), Vec::new());
        assert_eq!(file.attachments().unwrap(), Vec::new());
        assert_eq!(file.tracks().unwrap(), Vec::new());

        fs::remove_file(&path).ok();
    }

    #[test]
    fn create_id3v1_tag_adds_a_slot_a_tagless_mp3_did_not_have() {
        let dir = std::env::temp_dir();
        let path = dir.join("tagkit_mediafile_create_tag_test.mp3");
        fs::write(&path, [0u8; 64]).unwrap();

        let mut file = MediaFile::open(&path).unwrap();
        assert!(file.tag().is_none());

        let id3v1 = file.create_id3v1_tag().unwrap();
        id3v1.set_text(KnownField::Title, "Created");
        assert_eq!(file.tag().unwrap().get_text(&KnownField::Title), Some("Created".to_string()));

        fs::remove_file(&path).ok();
    }

    #[test]
    fn create_tag_rejects_a_kind_the_format_does_not_have() {
        let dir = std::env::temp_dir();
        let path = dir.join("tagkit_mediafile_wrong_kind_test.mp3");
        write_sample_mp3(&path);

        let mut file = MediaFile::open(&path).unwrap();
        assert!(matches!(file.create_tag(TagKind::Matroska), Err(Error::Unsupported)));

        fs::remove_file(&path).ok();
    }

    #[test]
    fn remove_tag_drops_just_the_requested_slot() {
        let dir = std::env::temp_dir();
        let path = dir.join("tagkit_mediafile_remove_tag_test.mp3");
        write_sample_mp3(&path);

        let mut file = MediaFile::open(&path).unwrap();
        assert!(file.tag().is_some());

        file.remove_tag(TagKind::Id3v2).unwrap();
        assert!(matches!(file.tags(), ParsedTags::Mp3 { id3v2: None, .. }));
    }

    #[test]
    fn remove_all_tags_leaves_a_fresh_default_tag_per_format() {
        let dir = std::env::temp_dir();
        let path = dir.join("tagkit_mediafile_remove_all_test.mp3");
        write_sample_mp3(&path);

        let mut file = MediaFile::open(&path).unwrap();
        file.remove_all_tags();
        assert!(file.tag().is_none());

        fs::remove_file(&path).ok();
    }
}
