//! Shared rewrite policy: how a freshly rendered tag gets spliced back into
//! a host file, how much padding to leave behind so a later edit that
//! doesn't grow the tag can be patched without moving the rest of the file,
//! and where a format that supports it (currently only MP4's `moov`) should
//! sit relative to the file's media data.
//!
//! [`container::rewrite`] only knows how to produce the new byte contents
//! for a given format; this module owns the file-level concerns sitting
//! around that (padding, positioning, backups, abort checks, the actual
//! write).

use crate::container::{self, ContainerFormat};
use crate::core::io::write_replaced;
use crate::diag::Diagnostics;
use crate::error::{Error, Result};
use crate::formats::id3v2::syncdata;
use crate::formats::mp4;
use crate::progress::AbortToken;
use crate::tag::Tag;
use std::fs;
use std::path::Path;

/// Where an element should sit relative to a container's media data.
/// `Keep` leaves whatever layout the file already has alone; the other two
/// only have an effect where a format actually supports moving the element
/// (MP4's `moov` relative to `mdat` today).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElementPosition {
    #[default]
    Keep,
    BeforeData,
    AfterData,
}

/// How much padding to reserve after a tag's real content, whether to force
/// a full rewrite even when an in-place patch would fit, and where the tag
/// and any index/metadata element should be positioned relative to media
/// data for formats that support moving them.
#[derive(Debug, Clone, Copy)]
pub struct RewritePolicy {
    /// Minimum padding to leave after the tag's real content on a rewrite
    /// that reuses the existing padding budget.
    pub min_padding: usize,
    /// Padding budget above which a growing tag can no longer be patched in
    /// place and must trigger a full rewrite.
    pub max_padding: usize,
    /// Padding to write when [`Self::force_rewrite`] discards whatever
    /// padding budget the file already had and starts over.
    pub preferred_padding: usize,
    /// Skip the in-place patch path entirely and always fully re-render,
    /// discarding the existing padding budget in favor of
    /// [`Self::preferred_padding`].
    pub force_rewrite: bool,
    /// Where the tag itself should sit relative to media data.
    pub tag_position: ElementPosition,
    /// Where the format's index/metadata element (MP4's `moov`) should sit
    /// relative to media data.
    pub index_position: ElementPosition,
    /// Move the tag to `tag_position` even if the file already has a
    /// consistent layout there; `false` only moves it when necessary.
    pub force_tag_position: bool,
    /// Same as [`Self::force_tag_position`], for [`Self::index_position`].
    pub force_index_position: bool,
}

impl Default for RewritePolicy {
    fn default() -> Self {
        RewritePolicy {
            min_padding: 1024,
            max_padding: 1024 * 64,
            preferred_padding: 1024,
            force_rewrite: false,
            tag_position: ElementPosition::Keep,
            index_position: ElementPosition::Keep,
            force_tag_position: false,
            force_index_position: false,
        }
    }
}

impl RewritePolicy {
    /// No padding at all, no forced repositioning: every rewrite is exactly
    /// as big as its content and keeps the file's existing layout.
    pub fn none() -> Self {
        RewritePolicy {
            min_padding: 0,
            max_padding: 0,
            preferred_padding: 0,
            force_rewrite: false,
            tag_position: ElementPosition::Keep,
            index_position: ElementPosition::Keep,
            force_tag_position: false,
            force_index_position: false,
        }
    }

    /// Pins the tag's position and marks it forced, so a format that
    /// supports moving its tag (MP4's `moov`) relocates it even if the
    /// file's current layout is already otherwise fine.
    pub fn set_tag_position(&mut self, position: ElementPosition) -> &mut Self {
        self.tag_position = position;
        self.force_tag_position = true;
        self
    }

    /// Same as [`Self::set_tag_position`], for the format's index/metadata
    /// element.
    pub fn set_index_position(&mut self, position: ElementPosition) -> &mut Self {
        self.index_position = position;
        self.force_index_position = true;
        self
    }

    pub fn set_force_rewrite(&mut self, force: bool) -> &mut Self {
        self.force_rewrite = force;
        self
    }

    pub fn set_preferred_padding(&mut self, padding: usize) -> &mut Self {
        self.preferred_padding = padding;
        self
    }

    pub fn set_min_padding(&mut self, padding: usize) -> &mut Self {
        self.min_padding = padding;
        self
    }

    pub fn set_max_padding(&mut self, padding: usize) -> &mut Self {
        self.max_padding = padding;
        self
    }
}

/// Whether a rewrite can patch the tag in place, reusing whatever padding
/// budget the file already has, or must fully re-render it. Only ID3v2 (via
/// [`pad_id3v2`]) has an in-place path today; every other format's
/// [`container::rewrite`] always fully re-renders its tag element already,
/// so `force_rewrite` only changes anything for MP3.
enum RewriteKind {
    InPlace,
    Full,
}

fn decide_rewrite_kind(format: ContainerFormat, policy: &RewritePolicy) -> RewriteKind {
    match format {
        ContainerFormat::Mp3 if !policy.force_rewrite => RewriteKind::InPlace,
        _ => RewriteKind::Full,
    }
}

/// Saves a copy of a file's prior contents somewhere a caller can recover
/// them from if a rewrite goes wrong. [`FileBackup`] is the only
/// implementation this crate ships; the trait exists so a caller embedding
/// this crate can swap in something else (versioned storage, a temp
/// directory outside the media library) without touching [`rewrite_file`].
pub trait Backup {
    fn save(&mut self, path: &Path, original: &[u8]) -> Result<()>;
}

/// Writes `original` to `path` with `.bak` appended, overwriting any
/// previous backup at that name.
#[derive(Debug, Default)]
pub struct FileBackup;

impl Backup for FileBackup {
    fn save(&mut self, path: &Path, original: &[u8]) -> Result<()> {
        let mut backup_name = path.as_os_str().to_os_string();
        backup_name.push(".bak");
        fs::write(backup_name, original)?;
        Ok(())
    }
}

/// Rewrites `tag` into the file at `path`: reads the whole file, renders
/// the new tag via [`container::rewrite`], applies the format's padding and
/// positioning policy, and writes the result back with [`write_replaced`].
///
/// Checks `abort` before starting and again before writing, so a caller
/// polling an [`AbortToken`] from another thread can cut a large rewrite
/// short without corrupting the file (nothing is written until the whole
/// new buffer is ready).
pub fn rewrite_file<P: AsRef<Path>>(
    path: P,
    format: ContainerFormat,
    tag: &dyn Tag,
    policy: &RewritePolicy,
    abort: &AbortToken,
    diag: &mut Diagnostics,
) -> Result<()> {
    rewrite_file_with_backup(path, format, tag, policy, abort, None, diag)
}

/// Like [`rewrite_file`], but saves `original`'s prior contents through
/// `backup` before the replaced file is written, if a backup is given.
pub fn rewrite_file_with_backup<P: AsRef<Path>>(
    path: P,
    format: ContainerFormat,
    tag: &dyn Tag,
    policy: &RewritePolicy,
    abort: &AbortToken,
    mut backup: Option<&mut dyn Backup>,
    diag: &mut Diagnostics,
) -> Result<()> {
    if abort.is_aborted() {
        return Err(Error::Aborted);
    }

    let path = path.as_ref();
    let original = fs::read(path)?;
    let mut rendered = container::rewrite(format, &original, tag, diag)?;

    match decide_rewrite_kind(format, policy) {
        RewriteKind::InPlace if format == ContainerFormat::Mp3 => pad_id3v2(&mut rendered, policy)?,
        RewriteKind::Full if format == ContainerFormat::Mp3 && policy.preferred_padding > 0 => {
            pad_with(&mut rendered, policy.preferred_padding)?
        }
        _ => {}
    }

    if format == ContainerFormat::Mp4 {
        rendered = apply_mp4_positioning(rendered, policy)?;
    }

    if abort.is_aborted() {
        return Err(Error::Aborted);
    }

    if let Some(backup) = backup.as_deref_mut() {
        backup.save(path, &original)?;
    }

    write_replaced(path, &rendered, original.len() as u64, abort).map_err(|err| {
        if err.kind() == std::io::ErrorKind::Interrupted {
            Error::Aborted
        } else {
            Error::Io(err)
        }
    })?;
    Ok(())
}

/// Moves MP4's `moov` relative to `mdat` when the policy asks for a specific
/// layout. A non-`Keep` position only takes effect unconditionally when
/// `force_tag_position`/`force_index_position` is set; otherwise it's a
/// no-op, since [`mp4::relocate_moov`] already treats "already there" as a
/// no-op regardless.
fn apply_mp4_positioning(rendered: Vec<u8>, policy: &RewritePolicy) -> Result<Vec<u8>> {
    let want = match (policy.tag_position, policy.index_position) {
        (ElementPosition::BeforeData, _) if policy.force_tag_position => Some(true),
        (_, ElementPosition::BeforeData) if policy.force_index_position => Some(true),
        (ElementPosition::AfterData, _) if policy.force_tag_position => Some(false),
        (_, ElementPosition::AfterData) if policy.force_index_position => Some(false),
        _ => None,
    };

    match want {
        Some(before_mdat) => mp4::relocate_moov(&rendered, before_mdat),
        None => Ok(rendered),
    }
}

/// Appends `padding` zero bytes inside a freshly rendered ID3v2 tag (within
/// its declared size, ahead of whatever follows) so a later edit that
/// doesn't grow the tag's real content past that amount can reuse the same
/// space.
fn pad_with(rendered: &mut Vec<u8>, padding: usize) -> Result<()> {
    if rendered.len() < 10 || padding == 0 {
        return Ok(());
    }

    let mut size_bytes = [0u8; 4];
    size_bytes.copy_from_slice(&rendered[6..10]);
    let body_len = syncdata::to_u28(size_bytes) as usize;

    let new_body_len = body_len + padding;
    rendered[6..10].copy_from_slice(&syncdata::from_u28(new_body_len as u32));

    let insert_at = 10 + body_len;
    rendered.splice(insert_at..insert_at, std::iter::repeat(0u8).take(padding));

    Ok(())
}

/// Appends `policy.min_padding` zero bytes inside a freshly rendered ID3v2
/// tag, matching a later edit that stays within `max_padding` bytes of the
/// original padded size against the space this rewrite reserved. Rejects an
/// inverted policy (`min_padding > max_padding`) with [`Error::WontFit`]
/// rather than silently clamping it.
fn pad_id3v2(rendered: &mut Vec<u8>, policy: &RewritePolicy) -> Result<()> {
    if policy.min_padding > policy.max_padding {
        return Err(Error::WontFit);
    }

    pad_with(rendered, policy.min_padding)
}
