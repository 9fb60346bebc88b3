use crate::model::RawScore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(alias = "className")]
    pub label: String,
    pub probability: f32,
}

/// Ranked output of one inference call. Immutable once produced.
pub type PredictionList = Arc<[Prediction]>;

fn clamp_probability(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Sorts raw scores by probability, highest first. Equal probabilities keep
/// their input order.
pub fn rank(raw: Vec<RawScore>) -> PredictionList {
    let mut predictions: Vec<Prediction> = raw
        .into_iter()
        .map(|score| Prediction {
            label: score.label,
            probability: clamp_probability(score.score),
        })
        .collect();

    // `sort_by` is stable
    predictions.sort_by(|a, b| b.probability.total_cmp(&a.probability));

    predictions.into()
}

/// Holds the current predictions. Every publish replaces the whole list in a
/// single store, so readers see either the old list or the new one.
#[derive(Debug)]
pub struct Publisher {
    tx: watch::Sender<PredictionList>,
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(PredictionList::from(Vec::new()));
        Self { tx }
    }

    pub fn publish(&self, predictions: PredictionList) {
        self.tx.send_replace(predictions);
    }

    pub fn clear(&self) {
        self.tx.send_replace(PredictionList::from(Vec::new()));
    }

    pub fn current(&self) -> PredictionList {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PredictionList> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(predictions: &[Prediction]) -> Vec<&str> {
        predictions.iter().map(|p| p.label.as_str()).collect()
    }

    #[test]
    fn test_rank_sorts_descending() {
        let ranked = rank(vec![
            RawScore::new("a", 0.1),
            RawScore::new("b", 0.6),
            RawScore::new("c", 0.3),
        ]);

        assert_eq!(labels(&ranked), vec!["b", "c", "a"]);
        assert!(ranked
            .windows(2)
            .all(|pair| pair[0].probability >= pair[1].probability));
    }

    #[test]
    fn test_rank_is_stable_for_ties() {
        let ranked = rank(vec![
            RawScore::new("first", 0.25),
            RawScore::new("top", 0.5),
            RawScore::new("second", 0.25),
            RawScore::new("third", 0.25),
        ]);

        assert_eq!(labels(&ranked), vec!["top", "first", "second", "third"]);
    }

    #[test]
    fn test_rank_many_unsorted_inputs() {
        // deterministic pseudo-random scores with plenty of ties
        let raw: Vec<RawScore> = (0..200u32)
            .map(|i| RawScore::new(format!("label-{}", i), ((i * 37) % 11) as f32 / 10.0))
            .collect();

        let ranked = rank(raw);

        assert_eq!(ranked.len(), 200);
        for pair in ranked.windows(2) {
            assert!(pair[0].probability >= pair[1].probability);
            if pair[0].probability == pair[1].probability {
                let index = |p: &Prediction| p.label[6..].parse::<u32>().unwrap();
                assert!(index(&pair[0]) < index(&pair[1]));
            }
        }
    }

    #[test]
    fn test_rank_clamps_scores() {
        let ranked = rank(vec![
            RawScore::new("nan", f32::NAN),
            RawScore::new("over", 1.5),
            RawScore::new("under", -0.2),
        ]);

        assert_eq!(ranked[0].probability, 1.0);
        assert_eq!(ranked[1].probability, 0.0);
        assert_eq!(ranked[2].probability, 0.0);
        assert_eq!(labels(&ranked), vec!["over", "nan", "under"]);
    }

    #[test]
    fn test_rank_empty() {
        assert!(rank(Vec::new()).is_empty());
    }

    #[test]
    fn test_publish_replaces_previous_value() {
        let publisher = Publisher::new();
        let mut rx = publisher.subscribe();
        assert!(publisher.current().is_empty());

        publisher.publish(rank(vec![RawScore::new("a", 0.9), RawScore::new("b", 0.1)]));
        publisher.publish(rank(vec![RawScore::new("c", 0.4)]));

        assert!(rx.has_changed().unwrap());
        let seen = rx.borrow_and_update().clone();
        assert_eq!(labels(&seen), vec!["c"]);

        publisher.clear();
        assert!(publisher.current().is_empty());
    }
}
