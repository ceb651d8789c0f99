//! Frame collection and management.

use crate::formats::id3v2::frame::FrameId;
use crate::formats::id3v2::frames::{Frame, TextFrame, UnknownFrame, UserTextFrame};
use crate::formats::id3v2::header::Version;
use indexmap::map::{Iter, IterMut, Keys};
use indexmap::IndexMap;
use std::ops::{Deref, DerefMut, Index, IndexMut};

/// An insertion-ordered map of frame "key" to frame, used as the body of
/// an in-memory tag. Keys are the frame ID for singleton frame kinds, or
/// `ID:description` / `ID:lang:description` for frame kinds ID3v2 allows
/// to legally repeat (`TXXX`, `WXXX`, `COMM`, `USLT`, `APIC`, `POPM`).
#[derive(Debug, Clone, Default)]
pub struct FrameMap {
    map: IndexMap<String, Box<dyn Frame>>,
}

impl FrameMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a frame, merging its text into an existing frame under the
    /// same key rather than overwriting it, for frame kinds where that is
    /// meaningful (plain and user text frames).
    pub fn add(&mut self, frame: Box<dyn Frame>) {
        match self.map.entry(frame.key()) {
            indexmap::map::Entry::Occupied(mut entry) => {
                let orig = entry.get_mut().deref_mut();

                if let (Some(orig_text), Some(new_text)) =
                    (orig.downcast_mut::<TextFrame>(), frame.downcast_ref::<TextFrame>())
                {
                    orig_text.text.extend(new_text.text.clone());
                } else if let (Some(orig_text), Some(new_text)) =
                    (orig.downcast_mut::<UserTextFrame>(), frame.downcast_ref::<UserTextFrame>())
                {
                    orig_text.text.extend(new_text.text.clone());
                }
            }
            indexmap::map::Entry::Vacant(entry) => {
                entry.insert(frame);
            }
        }
    }

    /// Inserts a frame, unconditionally replacing whatever was previously
    /// stored under the same key.
    pub fn insert(&mut self, frame: Box<dyn Frame>) {
        self.map.insert(frame.key(), frame);
    }

    pub fn get(&self, key: &str) -> Option<&(dyn Frame + 'static)> {
        Some(self.map.get(key)?.deref())
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut (dyn Frame + 'static)> {
        Some(self.map.get_mut(key)?.deref_mut())
    }

    pub fn get_all(&self, id: FrameId) -> Vec<&(dyn Frame + '_)> {
        self.values().filter(|frame| frame.id() == id).collect()
    }

    pub fn remove_all(&mut self, id: FrameId) -> Vec<Box<dyn Frame>> {
        let indices: Vec<usize> = self
            .map
            .values()
            .enumerate()
            .filter_map(|(i, frame)| if frame.id() == id { Some(i) } else { None })
            .collect();

        indices.iter().rev().map(|&i| self.map.swap_remove_index(i).unwrap().1).collect()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn contains_any(&self, id: FrameId) -> bool {
        self.values().any(|frame| frame.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &(dyn Frame + 'static))> + '_ {
        self.map.iter().map(|(k, v)| (k.as_str(), v.deref()))
    }

    pub fn values(&self) -> impl Iterator<Item = &(dyn Frame + 'static)> + '_ {
        self.map.values().map(|v| v.deref())
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut (dyn Frame + 'static)> + '_ {
        self.map.values_mut().map(move |v| v.deref_mut())
    }

    pub fn keys(&self) -> Keys<String, Box<dyn Frame>> {
        self.map.keys()
    }

    pub fn remove(&mut self, key: &str) -> Option<Box<dyn Frame>> {
        self.map.remove(key)
    }

    pub fn clear(&mut self) {
        self.map.clear()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&String, &mut dyn Frame) -> bool,
    {
        self.map.retain(|k, v| keep(k, v.deref_mut()))
    }
}

impl Index<&str> for FrameMap {
    type Output = dyn Frame;

    fn index(&self, key: &str) -> &Self::Output {
        self.map[key].deref()
    }
}

impl IndexMut<&str> for FrameMap {
    fn index_mut(&mut self, key: &str) -> &mut Self::Output {
        self.map[key].deref_mut()
    }
}

impl<'a> IntoIterator for &'a FrameMap {
    type Item = (&'a String, &'a Box<dyn Frame>);
    type IntoIter = Iter<'a, String, Box<dyn Frame>>;

    fn into_iter(self) -> Self::IntoIter {
        self.map.iter()
    }
}

impl<'a> IntoIterator for &'a mut FrameMap {
    type Item = (&'a String, &'a mut Box<dyn Frame>);
    type IntoIter = IterMut<'a, String, Box<dyn Frame>>;

    fn into_iter(self) -> Self::IntoIter {
        self.map.iter_mut()
    }
}

/// Frames that were read but have no specialized type, kept in file order
/// so a tag write round-trips them unchanged.
#[derive(Debug, Clone, Default)]
pub struct UnknownFrames {
    version: Option<Version>,
    frames: Vec<UnknownFrame>,
}

impl UnknownFrames {
    pub fn new(version: Version, frames: Vec<UnknownFrame>) -> Self {
        Self { version: Some(version), frames }
    }

    pub fn version(&self) -> Option<Version> {
        self.version
    }

    pub fn frames(&self) -> &[UnknownFrame] {
        &self.frames
    }

    pub fn push(&mut self, frame: UnknownFrame) {
        self.frames.push(frame);
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::id3v2::frame::FrameId;

    #[test]
    fn add_merges_repeated_text_frame() {
        let mut map = FrameMap::new();
        let mut a = TextFrame::new(FrameId::new(b"TPE1"));
        a.text = vec!["First".into()];
        let mut b = TextFrame::new(FrameId::new(b"TPE1"));
        b.text = vec!["Second".into()];

        map.add(Box::new(a));
        map.add(Box::new(b));

        assert_eq!(map.len(), 1);
        let frame = map.get("TPE1").unwrap().downcast_ref::<TextFrame>().unwrap();
        assert_eq!(frame.text, vec!["First".to_string(), "Second".to_string()]);
    }

    #[test]
    fn insert_replaces_existing_entry() {
        let mut map = FrameMap::new();
        map.insert(Box::new(TextFrame::new(FrameId::new(b"TIT2"))));
        map.insert(Box::new({
            let mut f = TextFrame::new(FrameId::new(b"TIT2"));
            f.text = vec!["New Title".into()];
            f
        }));

        assert_eq!(map.len(), 1);
        let frame = map.get("TIT2").unwrap().downcast_ref::<TextFrame>().unwrap();
        assert_eq!(frame.text, vec!["New Title".to_string()]);
    }
}
