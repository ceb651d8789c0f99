//! The format-neutral tag API.
//!
//! Each format in [`crate::formats`] has a concrete tag type (e.g.
//! [`crate::formats::id3v2::Id3v2Tag`]) that implements this trait. Callers
//! that don't care which format they're looking at can work purely in terms
//! of `dyn Tag`.

use crate::string::Encoding;
use crate::value::{KnownField, TagValue};
use std::fmt::Debug;

/// Matroska's `TargetTypeValue`: a numeric rung on the "how specific is this
/// tag" ladder, from a whole collection of files down to an individual shot
/// within a track. Higher is broader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatroskaLevel {
    Collection = 70,
    Edition = 60,
    Album = 50,
    Part = 40,
    Track = 30,
    Subtrack = 20,
    Shot = 10,
}

/// The full Matroska `Targets` element: the level plus every UID list it can
/// reference. A `Targets` element with no UIDs at all applies to the whole
/// segment at the given level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatroskaTarget {
    pub level: Option<MatroskaLevel>,
    pub track_uids: Vec<u64>,
    pub edition_uids: Vec<u64>,
    pub chapter_uids: Vec<u64>,
    pub attachment_uids: Vec<u64>,
}

/// Where a tag is conventionally stored within a container. Matroska and
/// MP4 both support attaching tags to a specific track rather than the
/// whole file; most formats only ever see `Global`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagTarget {
    Global,
    Track(u64),
    /// Matroska's richer targeting model, which can reference editions,
    /// chapters, and attachments in addition to tracks.
    Matroska(MatroskaTarget),
}

impl Default for TagTarget {
    fn default() -> Self {
        TagTarget::Global
    }
}

impl MatroskaLevel {
    /// Maps a raw `TargetTypeValue` onto the nearest defined rung. Matroska
    /// allows any value 1-70; values between the named rungs round down to
    /// the next lower one, matching how muxers that only know the named
    /// constants actually use the field.
    pub fn from_value(value: u64) -> Option<Self> {
        match value {
            70..=u64::MAX => Some(Self::Collection),
            60..=69 => Some(Self::Edition),
            50..=59 => Some(Self::Album),
            40..=49 => Some(Self::Part),
            30..=39 => Some(Self::Track),
            20..=29 => Some(Self::Subtrack),
            1..=19 => Some(Self::Shot),
            0 => None,
        }
    }
}

pub trait Tag: Debug {
    /// A short, stable name for the concrete tag format (`"ID3v2"`,
    /// `"Vorbis"`, ...), used in diagnostics messages.
    fn format_name(&self) -> &'static str;

    fn target(&self) -> TagTarget;

    /// Returns every known field this tag currently has a value for, in the
    /// codec's native order.
    fn fields(&self) -> Vec<KnownField>;

    fn get(&self, field: &KnownField) -> Option<&TagValue>;

    fn set(&mut self, field: KnownField, value: TagValue);

    fn remove(&mut self, field: &KnownField) -> Option<TagValue>;

    fn clear(&mut self);

    fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    fn get_text(&self, field: &KnownField) -> Option<String> {
        self.get(field).map(TagValue::to_display_string)
    }

    fn set_text(&mut self, field: KnownField, text: impl Into<String>)
    where
        Self: Sized,
    {
        self.set(field, TagValue::text(text.into()));
    }

    /// How many fields currently hold a value. Distinct from `fields().len()`
    /// only for formats (like ID3v2, with repeatable frames) where a caller
    /// might want a cheaper count without materializing the field list.
    fn field_count(&self) -> usize {
        self.fields().len()
    }

    /// Whether this format has any native representation for `field` at all,
    /// independent of whether a value is currently set. A `Custom` field is
    /// always supported (every format has some escape hatch for unmapped
    /// data); formats with a fixed, closed field map (MP4, Matroska) should
    /// override this to say no for fields they have no atom/element for.
    fn supports_field(&self, _field: &KnownField) -> bool {
        true
    }

    /// The text encoding this tag would choose if asked to write new text
    /// right now. Formats that only ever store UTF-8 (MP4, Matroska, Vorbis)
    /// never need to override this; ID3v2 picks based on its tag version.
    fn proposed_text_encoding(&self) -> Encoding {
        Encoding::Utf8
    }

    /// Whether `encoding` is one this tag's underlying format can actually
    /// store. Only ID3v2 has more than one real answer here.
    fn can_use_encoding(&self, encoding: Encoding) -> bool {
        encoding == Encoding::Utf8
    }

    /// Re-encodes any text values that are no longer valid for this tag's
    /// current state (for example after [`Tag::set_text`] calls followed by
    /// a version downgrade). A no-op for every format except ID3v2, which is
    /// the only one with more than one text encoding to reconcile.
    fn ensure_text_values_properly_encoded(&mut self) {}

    /// The underlying format's own identifier for `field` (an ID3v2 frame
    /// ID like `"TIT2"`, an MP4 atom fourcc like `"\xa9nam"`, a Matroska
    /// `SimpleTag` name like `"TITLE"`), if this format has one. Useful for
    /// diagnostics and for round-tripping fields this crate doesn't map to a
    /// [`KnownField`].
    fn native_id(&self, field: &KnownField) -> Option<String> {
        match field {
            KnownField::Custom(name) => Some(name.clone()),
            _ => None,
        }
    }
}

/// Convenience accessors shared by every [`Tag`] implementation, built only
/// on the trait's required methods.
pub trait TagExt: Tag {
    fn title(&self) -> Option<String> {
        self.get_text(&KnownField::Title)
    }

    fn artist(&self) -> Option<String> {
        self.get_text(&KnownField::Artist)
    }

    fn album(&self) -> Option<String> {
        self.get_text(&KnownField::Album)
    }
}

impl<T: Tag + ?Sized> TagExt for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::id3v1::Id3v1Tag;

    #[test]
    fn default_target_is_global() {
        assert_eq!(TagTarget::default(), TagTarget::Global);
    }

    #[test]
    fn blanket_ext_works_through_trait_object() {
        let mut tag = Id3v1Tag::new();
        tag.set_text(KnownField::Title, "Test");
        let boxed: Box<dyn Tag> = Box::new(tag);
        assert_eq!(boxed.title(), Some("Test".to_string()));
    }
}
