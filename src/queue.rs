//! Play queue and hold list bookkeeping.
//!
//! Pure data: nothing in here touches the filesystem, so every method is
//! safe to call while holding the bookkeeping lock.

use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, path::PathBuf};

/// Where the currently active stream came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// One-shot play queue, drained as it plays
    Queue,

    /// Hold list, rotated as it plays
    Hold,
}

/// Next entry chosen for playback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NextSource {
    pub origin: Origin,
    pub path: PathBuf,
}

#[derive(Clone, Debug, Default)]
pub struct PlayQueues {
    play: VecDeque<PathBuf>,
    hold: VecDeque<PathBuf>,
}

impl PlayQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_play(&mut self, path: PathBuf) {
        self.play.push_back(path);
    }

    /// Drops every queued one-shot entry, returns how many were dropped.
    pub fn clear_play(&mut self) -> usize {
        let len = self.play.len();
        self.play.clear();
        len
    }

    pub fn replace_hold<I: IntoIterator<Item = PathBuf>>(&mut self, paths: I) {
        self.hold = paths.into_iter().collect();
    }

    pub fn clear(&mut self) {
        self.play.clear();
        self.hold.clear();
    }

    /// Picks the next entry to open. The play queue always wins over the
    /// hold list. A hold entry is re-appended to the tail as soon as it is
    /// taken, which is what makes the hold list rotate.
    pub fn next_source(&mut self) -> Option<NextSource> {
        if let Some(path) = self.play.pop_front() {
            return Some(NextSource {
                origin: Origin::Queue,
                path,
            });
        }

        let path = self.hold.pop_front()?;
        self.hold.push_back(path.clone());

        Some(NextSource {
            origin: Origin::Hold,
            path,
        })
    }

    pub fn play_len(&self) -> usize {
        self.play.len()
    }

    pub fn hold_len(&self) -> usize {
        self.hold.len()
    }

    pub fn play_entries(&self) -> impl Iterator<Item = &PathBuf> {
        self.play.iter()
    }

    pub fn hold_entries(&self) -> impl Iterator<Item = &PathBuf> {
        self.hold.iter()
    }
}
