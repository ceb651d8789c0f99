//! Format-neutral audio track header info.
//!
//! Parsed alongside a container's tag, but kept separate from it: a track's
//! sample rate and codec aren't tag fields, and most callers that want tags
//! don't need them. Per-format parsing lives next to each codec in
//! [`crate::formats`] (e.g. `formats::mp4::track`); this is just the shape
//! they all normalize into.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track {
    pub id: Option<u64>,
    pub codec: Option<String>,
    pub duration_ms: Option<u64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,
    pub bits_per_sample: Option<u8>,
    /// Average bitrate in bits per second, when known or computable from
    /// `duration_ms` and the stream size.
    pub bitrate_bps: Option<u32>,
}

impl Track {
    pub fn new() -> Self {
        Self::default()
    }
}
