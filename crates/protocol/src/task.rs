//! Task payloads understood by the worker.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Similarity measure evaluated by the worker.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimilarityMeasure {
    #[default]
    #[serde(rename = "cosine")]
    Cosine,
    #[serde(rename = "cosine_centered")]
    CosineCentered,
    #[serde(rename = "dot-product")]
    DotProduct,
    #[serde(rename = "manhattan")]
    Manhattan,
    #[serde(rename = "euclidean")]
    Euclidean,
    #[serde(rename = "chebyshev")]
    Chebyshev,
    #[serde(rename = "rel-l2-norm")]
    RelL2Norm,
}

impl SimilarityMeasure {
    pub const ALL: [SimilarityMeasure; 7] = [
        SimilarityMeasure::Cosine,
        SimilarityMeasure::CosineCentered,
        SimilarityMeasure::DotProduct,
        SimilarityMeasure::Manhattan,
        SimilarityMeasure::Euclidean,
        SimilarityMeasure::Chebyshev,
        SimilarityMeasure::RelL2Norm,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityMeasure::Cosine => "cosine",
            SimilarityMeasure::CosineCentered => "cosine_centered",
            SimilarityMeasure::DotProduct => "dot-product",
            SimilarityMeasure::Manhattan => "manhattan",
            SimilarityMeasure::Euclidean => "euclidean",
            SimilarityMeasure::Chebyshev => "chebyshev",
            SimilarityMeasure::RelL2Norm => "rel-l2-norm",
        }
    }

    /// How the measure is computed, for display next to the results.
    pub fn description(&self) -> &'static str {
        match self {
            SimilarityMeasure::Cosine => "as the dot product normalized by the L2 norms",
            SimilarityMeasure::CosineCentered => {
                "just as the cosine similarity, but with the mean of each representation subtracted before"
            }
            SimilarityMeasure::DotProduct => {
                "as the dot product, normalized by the maximum absolute value"
            }
            SimilarityMeasure::Manhattan => {
                "as the absolute difference, normalized by the maximum value and subtracted from 1"
            }
            SimilarityMeasure::Euclidean => {
                "as the root of the sum of squared differences, normalized by the maximum value and subtracted from 1"
            }
            SimilarityMeasure::Chebyshev => {
                "as the maximum absolute difference, normalized by the maximum value and subtracted from 1"
            }
            SimilarityMeasure::RelL2Norm => {
                "as the relative L2 norm between the two representations"
            }
        }
    }
}

impl core::fmt::Display for SimilarityMeasure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimilarityMeasure {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownMeasure(s.to_string()))
    }
}

/// Fetch a representation and cache it inside the worker, keyed by `url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRepr {
    pub url: String,
    /// Spatial side length.
    pub n: u32,
    /// Channels per tile.
    pub m: u32,
}

/// Compare tile `(col, row)` of `repr1_str` against every tile of `repr2_str`.
///
/// Both URLs must have been fetched before; otherwise the worker answers
/// with the `loading` failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalcSimilarities {
    pub func: SimilarityMeasure,
    pub repr1_str: String,
    pub repr2_str: String,
    pub row: u32,
    pub col: u32,
}

/// A unit of work for the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", content = "data", rename_all = "snake_case")]
pub enum Task {
    FetchRepr(FetchRepr),
    CalcSimilarities(CalcSimilarities),
}

impl Task {
    pub fn kind(&self) -> TaskKind {
        match self {
            Task::FetchRepr(_) => TaskKind::Fetch,
            Task::CalcSimilarities(_) => TaskKind::Calc,
        }
    }
}

/// Payload-free discriminant of [`Task`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Fetch,
    Calc,
}

impl From<FetchRepr> for Task {
    fn from(value: FetchRepr) -> Self {
        Task::FetchRepr(value)
    }
}

impl From<CalcSimilarities> for Task {
    fn from(value: CalcSimilarities) -> Self {
        Task::CalcSimilarities(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measure_names_match_wire_names() {
        for measure in SimilarityMeasure::ALL {
            let json = serde_json::to_string(&measure).unwrap();
            assert_eq!(json, format!("\"{}\"", measure.as_str()));
            assert_eq!(measure.as_str().parse::<SimilarityMeasure>().unwrap(), measure);
        }
    }

    #[test]
    fn every_measure_is_described() {
        let mut seen = std::collections::HashSet::new();
        for measure in SimilarityMeasure::ALL {
            let description = measure.description();
            assert!(!description.is_empty(), "{measure} has no description");
            assert!(seen.insert(description), "{measure} shares its description");
        }
        assert!(SimilarityMeasure::Cosine.description().contains("L2 norms"));
    }

    #[test]
    fn unknown_measure_is_rejected() {
        assert!(matches!(
            "hamming".parse::<SimilarityMeasure>(),
            Err(ProtocolError::UnknownMeasure(name)) if name == "hamming"
        ));
    }

    #[test]
    fn task_is_adjacently_tagged() {
        let task = Task::from(FetchRepr {
            url: "http://localhost/representations/cat/SD15/50/up_blocks[1].bin".to_string(),
            n: 16,
            m: 1280,
        });
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["task"], "fetch_repr");
        assert_eq!(value["data"]["n"], 16);
        assert_eq!(task.kind(), TaskKind::Fetch);
    }
}
