//! The user's current selection.

use serde::{Deserialize, Serialize};

use crate::grid::{GridShape, Tile};
use crate::id::SubjectId;

/// Identity of one unit of comparison work: which subject is the base and
/// which of its tiles is selected.
///
/// Two equal consecutive keys describe the same work.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItemKey {
    pub subject: SubjectId,
    pub tile: Tile,
}

impl WorkItemKey {
    pub fn new(subject: SubjectId, tile: Tile) -> Self {
        Self { subject, tile }
    }
}

impl core::fmt::Display for WorkItemKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}-{}-{}", self.subject, self.tile.col, self.tile.row)
    }
}

/// The pinned ("last clicked") selection the view falls back to when the
/// pointer leaves a canvas.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    subject: Option<SubjectId>,
    tile: Tile,
}

impl Selection {
    pub fn subject(&self) -> Option<SubjectId> {
        self.subject
    }

    pub fn tile(&self) -> Tile {
        self.tile
    }

    pub fn key(&self) -> Option<WorkItemKey> {
        self.subject.map(|s| WorkItemKey::new(s, self.tile))
    }

    pub fn pin(&mut self, subject: SubjectId, tile: Tile) {
        self.subject = Some(subject);
        self.tile = tile;
    }

    /// Pin `subject` only if nothing is pinned yet.
    pub fn pin_if_empty(&mut self, subject: SubjectId) {
        if self.subject.is_none() {
            self.subject = Some(subject);
        }
    }

    /// Forget the subject if it is the pinned one; the tile is kept.
    pub fn release(&mut self, subject: SubjectId) {
        if self.subject == Some(subject) {
            self.subject = None;
        }
    }

    /// Carry the pinned tile over to a grid with a different side length.
    pub fn rescale(&mut self, from: GridShape, to: GridShape) {
        if from.n() != to.n() {
            self.tile = self.tile.rescale(from.n(), to.n());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_pin_wins_until_clicked() {
        let a = SubjectId::new();
        let b = SubjectId::new();
        let mut sel = Selection::default();

        sel.pin_if_empty(a);
        sel.pin_if_empty(b);
        assert_eq!(sel.subject(), Some(a));

        sel.pin(b, Tile::new(3, 1));
        assert_eq!(sel.key(), Some(WorkItemKey::new(b, Tile::new(3, 1))));
    }

    #[test]
    fn release_only_affects_pinned_subject() {
        let a = SubjectId::new();
        let b = SubjectId::new();
        let mut sel = Selection::default();
        sel.pin(a, Tile::new(1, 1));

        sel.release(b);
        assert_eq!(sel.subject(), Some(a));

        sel.release(a);
        assert_eq!(sel.key(), None);
        assert_eq!(sel.tile(), Tile::new(1, 1));
    }

    #[test]
    fn rescale_follows_spatial_side_only() {
        let mut sel = Selection::default();
        sel.pin(SubjectId::new(), Tile::new(6, 2));

        sel.rescale(GridShape::new(8, 320).unwrap(), GridShape::new(8, 640).unwrap());
        assert_eq!(sel.tile(), Tile::new(6, 2));

        sel.rescale(GridShape::new(8, 640).unwrap(), GridShape::new(32, 1280).unwrap());
        assert_eq!(sel.tile(), Tile::new(24, 8));
    }
}
