use medann::{display_name, ClassLabel, Prediction};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ClassifyQuery {
    /// Number of neighbors that vote (1..=50 by default). A multipart `k`
    /// field takes precedence.
    pub k: Option<usize>,
}

/// Multipart form accepted by `POST /classify`.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    /// PNG or JPEG image.
    #[schema(value_type = String, format = Binary)]
    pub image: Vec<u8>,
    pub k: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NeighborCount {
    pub label: String,
    pub display_name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NeighborHit {
    pub id: usize,
    pub label: String,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ClassifyResponse {
    /// Internal class code of the winning label.
    pub predicted_class: String,
    /// Display name of the winning label.
    pub predicted_label: String,
    /// Effective k after clamping to the corpus size.
    pub k: usize,
    pub votes: usize,
    /// Per-label vote counts in the order labels were first seen, nearest
    /// neighbor first.
    pub neighbor_counts: Vec<NeighborCount>,
    pub neighbors: Vec<NeighborHit>,
}

impl From<Prediction> for ClassifyResponse {
    fn from(p: Prediction) -> Self {
        let votes = p.votes();
        Self {
            predicted_label: display_name(&p.label).to_string(),
            predicted_class: p.label,
            k: p.k,
            votes,
            neighbor_counts: p
                .counts
                .into_iter()
                .map(|(label, count)| NeighborCount {
                    display_name: display_name(&label).to_string(),
                    label,
                    count,
                })
                .collect(),
            neighbors: p
                .neighbors
                .into_iter()
                .map(|n| NeighborHit {
                    id: n.id,
                    label: n.label,
                    distance: n.distance,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LabelInfo {
    pub code: String,
    pub display_name: String,
    /// Samples of this class in the loaded corpus.
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LabelsResponse {
    pub classes: Vec<LabelInfo>,
    /// Comma-separated display names of the supported classes.
    pub supported: String,
}

impl LabelsResponse {
    /// Known classes first in catalog order, then any extra corpus labels.
    pub fn from_counts<'a>(counts: impl IntoIterator<Item = (&'a String, &'a usize)>) -> Self {
        let counts: Vec<(&String, &usize)> = counts.into_iter().collect();
        let lookup = |code: &str| {
            counts
                .iter()
                .find(|(label, _)| label.as_str() == code)
                .map(|(_, n)| **n)
                .unwrap_or(0)
        };

        let mut classes: Vec<LabelInfo> = ClassLabel::ALL
            .iter()
            .map(|class| LabelInfo {
                code: class.code().to_string(),
                display_name: class.display_name().to_string(),
                samples: lookup(class.code()),
            })
            .collect();
        for (label, n) in &counts {
            if ClassLabel::from_code(label).is_none() {
                classes.push(LabelInfo {
                    code: label.to_string(),
                    display_name: display_name(label).to_string(),
                    samples: **n,
                });
            }
        }

        Self {
            classes,
            supported: medann::supported_classes().join(", "),
        }
    }
}
