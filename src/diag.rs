//! Append-only diagnostics collected during a parse or rewrite.
//!
//! Parsing code logs recoverable problems with `log::warn!`/`log::info!` at
//! the point they're noticed and moves on -- a tag with a flipped
//! extended-header flag, an unknown frame, a dropped frame during a version
//! update. That's fine for a human watching stderr, but a caller that wants
//! to know "did this file have problems" programmatically has nothing to
//! inspect. [`Diagnostics`] keeps doing the `log` calls (so behavior under
//! `RUST_LOG` is unchanged) but also appends each entry to an in-memory,
//! worst-level-tracking sink that callers can inspect after the fact.

use log::{debug, error, info, warn};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub level: Level,
    pub message: String,
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{:?}] {}", self.level, self.message)
    }
}

/// An append-only log of everything a parse or rewrite noticed along the
/// way, plus the worst level seen.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Entry>,
    worst: Option<Level>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, level: Level, message: impl Into<String>) {
        let message = message.into();

        match level {
            Level::Debug => debug!("{}", message),
            Level::Info => info!("{}", message),
            Level::Warning => warn!("{}", message),
            Level::Error => error!("{}", message),
        }

        self.worst = Some(match self.worst {
            Some(existing) if existing >= level => existing,
            _ => level,
        });

        self.entries.push(Entry { level, message });
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.push(Level::Debug, message);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(Level::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(Level::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Level::Error, message);
    }

    /// The worst level appended so far, if any entries have been recorded.
    pub fn worst(&self) -> Option<Level> {
        self.worst
    }

    pub fn is_clean(&self) -> bool {
        self.worst.is_none()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn extend(&mut self, other: Diagnostics) {
        for entry in other.entries {
            // Already logged once when it was first pushed; just merge bookkeeping.
            self.worst = Some(match self.worst {
                Some(existing) if existing >= entry.level => existing,
                _ => entry.level,
            });
            self.entries.push(entry);
        }
    }
}
