//! Drawing collaborator seam and the pure helpers feeding it.

use std::time::Duration;

use reprsim_core::{GridShape, SubjectId, Tile};

/// Receives everything the session wants on screen.
///
/// Implementations must not block; they are called from async tasks.
pub trait RenderSink: Send + Sync + 'static {
    /// Similarities of `target` against the selected tile of the base subject.
    fn draw_similarities(&self, target: SubjectId, frame: &SimilarityFrame);

    /// A placeholder message instead of similarities.
    fn draw_status(&self, target: SubjectId, status: StatusMessage);
}

/// Population mean and standard deviation of a similarity map.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SimilarityStats {
    pub mean: f32,
    pub std_dev: f32,
}

impl SimilarityStats {
    /// `None` for an empty slice.
    pub fn of(values: &[f32]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let len = values.len() as f32;
        let mean = values.iter().sum::<f32>() / len;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / len;
        Some(Self {
            mean,
            std_dev: variance.sqrt(),
        })
    }

    /// `mean±std`, three decimals each.
    pub fn summary(&self) -> String {
        format!("{:.3}±{:.3}", self.mean, self.std_dev)
    }
}

/// One computed similarity map, ready to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityFrame {
    pub base: SubjectId,
    /// Selected tile of the base subject.
    pub tile: Tile,
    pub shape: GridShape,
    /// `n * n` values, row-major.
    pub similarities: Vec<f32>,
    pub stats: SimilarityStats,
    /// Most similar tile of the target. `None` when the target is the base.
    pub best_match: Option<Tile>,
}

impl SimilarityFrame {
    /// Build a frame, or `None` if `similarities` does not cover the grid.
    pub fn new(
        base: SubjectId,
        target: SubjectId,
        tile: Tile,
        shape: GridShape,
        similarities: Vec<f32>,
    ) -> Option<Self> {
        if similarities.len() != shape.tile_count() {
            return None;
        }
        let stats = SimilarityStats::of(&similarities)?;
        let best_match = if target == base {
            None
        } else {
            best_match(shape, &similarities)
        };

        Some(Self {
            base,
            tile,
            shape,
            similarities,
            stats,
            best_match,
        })
    }

    /// Similarity at `tile`, if it is on the grid.
    pub fn at(&self, tile: Tile) -> Option<f32> {
        if !self.shape.contains(tile) {
            return None;
        }
        self.similarities.get(self.shape.index_of(tile)).copied()
    }
}

/// First tile holding the largest value.
pub fn best_match(shape: GridShape, similarities: &[f32]) -> Option<Tile> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &value) in similarities.iter().enumerate() {
        match best {
            Some((_, max)) if value <= max => {}
            _ if value.is_nan() => {}
            _ => best = Some((index, value)),
        }
    }
    best.and_then(|(index, _)| shape.tile_from_index(index))
}

/// Placeholder shown while similarities are unavailable.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StatusMessage {
    /// The subject's representation does not exist on the server yet.
    Generating,
    /// The worker has not cached the representation yet.
    Loading,
    Failed,
}

const DOT_PERIOD_MS: u128 = 1000;
const DOT_STEP_MS: u128 = 250;

impl StatusMessage {
    pub fn template(&self) -> &'static str {
        match self {
            StatusMessage::Generating => "Generating representations...",
            StatusMessage::Loading => "Loading...",
            StatusMessage::Failed => "Error calculating similarities...",
        }
    }

    /// Text with its trailing `...` animated: zero to three dots, padded
    /// to three characters, advancing every 250ms of `elapsed`.
    pub fn text(&self, elapsed: Duration) -> String {
        let count = ((elapsed.as_millis() % DOT_PERIOD_MS) / DOT_STEP_MS) as usize;
        let dots = format!("{}{}", ".".repeat(count), " ".repeat(3 - count));
        self.template().replacen("...", &dots, 1)
    }
}

impl core::fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.template())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(n: u32) -> GridShape {
        GridShape::new(n, 8).unwrap()
    }

    #[test]
    fn stats_use_population_deviation() {
        let stats = SimilarityStats::of(&[1.0, 3.0, 1.0, 3.0]).unwrap();
        assert_eq!(stats.mean, 2.0);
        assert_eq!(stats.std_dev, 1.0);
        assert_eq!(stats.summary(), "2.000±1.000");
        assert!(SimilarityStats::of(&[]).is_none());
    }

    #[test]
    fn best_match_is_the_first_maximum_row_major() {
        let values = [0.1, 0.9, 0.2, 0.9];
        assert_eq!(best_match(shape(2), &values), Some(Tile::new(1, 0)));

        let values = [0.1, 0.2, f32::NAN, 0.7];
        assert_eq!(best_match(shape(2), &values), Some(Tile::new(1, 1)));
    }

    #[test]
    fn frame_requires_a_full_grid() {
        let base = SubjectId::new();
        let other = SubjectId::new();
        let tile = Tile::new(0, 0);

        assert!(SimilarityFrame::new(base, other, tile, shape(2), vec![1.0; 3]).is_none());

        let frame = SimilarityFrame::new(base, other, tile, shape(2), vec![0.0, 0.0, 0.5, 0.0]).unwrap();
        assert_eq!(frame.best_match, Some(Tile::new(0, 1)));
        assert_eq!(frame.at(Tile::new(0, 1)), Some(0.5));

        let own = SimilarityFrame::new(base, base, tile, shape(2), vec![1.0; 4]).unwrap();
        assert_eq!(own.best_match, None);
    }

    #[test]
    fn status_text_animates_dots() {
        let loading = StatusMessage::Loading;
        assert_eq!(loading.text(Duration::from_millis(0)), "Loading   ");
        assert_eq!(loading.text(Duration::from_millis(260)), "Loading.  ");
        assert_eq!(loading.text(Duration::from_millis(600)), "Loading.. ");
        assert_eq!(loading.text(Duration::from_millis(1999)), "Loading...");
        assert_eq!(
            StatusMessage::Generating.text(Duration::from_millis(1250)),
            "Generating representations.  "
        );
    }
}
