//! Session playback history.
//!
//! Two pieces of bookkeeping live here:
//!
//! * `played`: every URL handed out this session, cleared only when the
//!   selection pool runs dry.
//! * `stack` + `index`: a back stack.  Going back moves the
//!   cursor; pushing while behind the tail drops everything after the cursor.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Result, SednaError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaybackHistory {
    played: HashSet<String>,
    stack: Vec<String>,
    /// `None` while idle.  Otherwise always `< stack.len()`.
    index: Option<usize>,
}

impl PlaybackHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track under the cursor.
    pub fn current(&self) -> Option<&str> {
        self.index.map(|i| self.stack[i].as_str())
    }

    pub fn is_idle(&self) -> bool {
        self.index.is_none()
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn stack(&self) -> &[String] {
        &self.stack
    }

    pub fn played(&self) -> &HashSet<String> {
        &self.played
    }

    pub fn has_played(&self, url: &str) -> bool {
        self.played.contains(url)
    }

    /// Record a freshly selected track: truncate forward history, append,
    /// move the cursor to the tail and mark the URL played.
    pub fn push(&mut self, url: impl Into<String>) {
        let url = url.into();
        if let Some(i) = self.index {
            self.stack.truncate(i + 1);
        } else {
            self.stack.clear();
        }
        self.played.insert(url.clone());
        self.stack.push(url);
        self.index = Some(self.stack.len() - 1);
    }

    /// Step the cursor back one entry.  Leaves `played` and the stack alone.
    pub fn back(&mut self) -> Result<&str> {
        match self.index {
            Some(i) if i > 0 => {
                self.index = Some(i - 1);
                Ok(self.stack[i - 1].as_str())
            }
            _ => Err(SednaError::NoPrevious),
        }
    }

    /// Pool exhausted: forget everything except the current track.
    pub fn reset_played(&mut self) {
        self.played.clear();
        if let Some(i) = self.index {
            self.played.insert(self.stack[i].clone());
        }
    }
}
