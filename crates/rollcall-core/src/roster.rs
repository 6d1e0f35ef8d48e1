//! Names still waiting to be marked present.

use crate::gallery::Gallery;

/// Pending names for the current run, in enrollment order.
///
/// Built once from the gallery and only ever shrinks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    pending: Vec<String>,
}

impl Roster {
    pub fn from_gallery(gallery: &Gallery) -> Self {
        Self {
            pending: gallery.names().map(str::to_owned).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pending.iter().any(|n| n == name)
    }

    /// Remove `name` from the roster. Returns true if it was still pending.
    pub fn mark_present(&mut self, name: &str) -> bool {
        match self.pending.iter().position(|n| n == name) {
            Some(idx) => {
                self.pending.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
