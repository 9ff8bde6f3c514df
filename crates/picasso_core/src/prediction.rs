//! Ranked class predictions.

use ndarray::{ArrayView1, ArrayView2};
use serde::Serialize;

/// Default number of classes kept per input.
pub const DEFAULT_TOP_K: usize = 5;

/// A single class annotated with its name and probability.
///
/// Serialized as `{"index": .., "name": .., "prob": ".."}`, where `prob` is the
/// probability printed with three decimals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedPrediction {
    /// Index of the class in the model output.
    pub index: usize,
    /// Display name of the class.
    pub name: String,
    /// Probability formatted as `%.3f`.
    pub prob: String,
    /// Raw probability.
    #[serde(skip)]
    pub probability: f32,
}

impl RankedPrediction {
    /// Create a ranked prediction, formatting the probability.
    pub fn new(index: usize, name: impl Into<String>, probability: f32) -> Self {
        Self {
            index,
            name: name.into(),
            prob: format!("{:.3}", probability),
            probability,
        }
    }
}

/// Rank one row of class probabilities.
///
/// Classes are sorted by descending probability with a stable sort, so equal
/// probabilities keep their original index order.
pub fn rank_row<F>(row: ArrayView1<'_, f32>, top_k: usize, class_name: F) -> Vec<RankedPrediction>
where
    F: Fn(usize) -> String,
{
    let mut entries: Vec<(usize, f32)> = row.iter().copied().enumerate().collect();
    entries.sort_by(|a, b| b.1.total_cmp(&a.1));

    entries
        .into_iter()
        .take(top_k)
        .map(|(index, probability)| RankedPrediction::new(index, class_name(index), probability))
        .collect()
}

/// Rank every row of a `[batch, num_classes]` probability matrix.
///
/// Returns exactly `min(top_k, num_classes)` entries per row.
///
/// # Example
///
/// ```rust
/// use ndarray::array;
/// use picasso_core::decode_top_k;
///
/// let decoded = decode_top_k(array![[0.1, 0.7, 0.2]].view(), 2, |i| i.to_string());
/// assert_eq!(decoded[0][0].index, 1);
/// assert_eq!(decoded[0][0].prob, "0.700");
/// ```
pub fn decode_top_k<F>(
    probabilities: ArrayView2<'_, f32>,
    top_k: usize,
    class_name: F,
) -> Vec<Vec<RankedPrediction>>
where
    F: Fn(usize) -> String,
{
    probabilities
        .outer_iter()
        .map(|row| rank_row(row, top_k, &class_name))
        .collect()
}

/// Indices of the ranked classes, in rank order.
pub fn ranked_indices(predictions: &[RankedPrediction]) -> Vec<usize> {
    predictions.iter().map(|p| p.index).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn test_decode_three_classes() {
        let probs = array![[0.1f32, 0.7, 0.2]];
        let decoded = decode_top_k(probs.view(), 2, |i| i.to_string());

        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].len(), 2);
        assert_eq!(decoded[0][0].index, 1);
        assert_eq!(decoded[0][0].prob, "0.700");
        assert_eq!(decoded[0][1].index, 2);
        assert_eq!(decoded[0][1].prob, "0.200");
    }

    #[test]
    fn test_decode_truncates_to_class_count() {
        let probs = array![[0.5f32, 0.5], [0.9, 0.1]];
        let decoded = decode_top_k(probs.view(), 5, |i| format!("class_{}", i));

        assert_eq!(decoded.len(), 2);
        assert!(decoded.iter().all(|row| row.len() == 2));
        assert_eq!(decoded[1][0].name, "class_0");
    }

    #[test]
    fn test_decode_ties_keep_index_order() {
        let probs = array![[0.25f32, 0.25, 0.25, 0.25]];
        let decoded = decode_top_k(probs.view(), 4, |i| i.to_string());

        let indices = ranked_indices(&decoded[0]);
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_rank_row_with_nan_is_total() {
        let row = array![0.2f32, f32::NAN, 0.5, 0.2, 0.1];
        let ranked = rank_row(row.view(), 5, |i| i.to_string());
        let order: Vec<usize> = ranked.iter().map(|p| p.index).collect();
        // NaN ranks first; the finite values stay descending and ties stay in index order.
        assert_eq!(order, vec![1, 2, 0, 3, 4]);
    }

    #[test]
    fn test_decode_descending_and_formatted() {
        let data: Vec<f32> = (0..30).map(|i| ((i * 7) % 11) as f32 / 10.0).collect();
        let probs = Array2::from_shape_vec((3, 10), data).unwrap();
        let decoded = decode_top_k(probs.view(), 4, |i| i.to_string());

        for row in &decoded {
            assert_eq!(row.len(), 4);
            for pair in row.windows(2) {
                assert!(pair[0].probability >= pair[1].probability);
            }
            for entry in row {
                assert_eq!(entry.prob, format!("{:.3}", entry.probability));
            }
        }
    }

    #[test]
    fn test_ranked_prediction_serializes_prob_string() {
        let pred = RankedPrediction::new(3, "cat", 0.12345);
        let json = serde_json::to_value(&pred).unwrap();

        assert_eq!(json["index"], 3);
        assert_eq!(json["name"], "cat");
        assert_eq!(json["prob"], "0.123");
        assert!(json.get("probability").is_none());
    }
}
