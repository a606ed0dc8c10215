use std::{cmp::Ordering, collections::HashMap};

/// Anything that can be fused by id.
pub trait Identified {
    fn identifier(&self) -> &str;
}

/// Holds the raw subscores gathered from each retrieval signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scores {
    pub dense: Option<f32>,
    pub sparse: Option<f32>,
}

/// Generic wrapper combining an item with its per-signal scores and fused score.
#[derive(Debug, Clone)]
pub struct Scored<T> {
    pub item: T,
    pub scores: Scores,
    pub fused: f32,
}

impl<T> Scored<T> {
    pub fn new(item: T) -> Self {
        Self {
            item,
            scores: Scores::default(),
            fused: 0.0,
        }
    }

    pub const fn with_dense_score(mut self, score: f32) -> Self {
        self.scores.dense = Some(score);
        self
    }

    pub const fn with_sparse_score(mut self, score: f32) -> Self {
        self.scores.sparse = Some(score);
        self
    }
}

/// Configuration for reciprocal rank fusion.
#[derive(Debug, Clone, Copy)]
pub struct RrfConfig {
    pub k: f32,
    pub dense_weight: f32,
    pub sparse_weight: f32,
}

impl Default for RrfConfig {
    fn default() -> Self {
        Self {
            k: 60.0,
            dense_weight: 1.0,
            sparse_weight: 1.0,
        }
    }
}

fn sanitize_weight(weight: f32) -> f32 {
    if weight.is_finite() {
        weight.max(0.0)
    } else {
        0.0
    }
}

pub fn sort_by_fused_desc<T: Identified>(items: &mut [Scored<T>]) {
    items.sort_by(|a, b| {
        b.fused
            .partial_cmp(&a.fused)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.item.identifier().cmp(b.item.identifier()))
    });
}

fn accumulate<T: Identified + Clone>(
    merged: &mut HashMap<String, Scored<T>>,
    mut ranked: Vec<Scored<T>>,
    signal: fn(&Scores) -> Option<f32>,
    store: fn(&mut Scores, f32),
    weight: f32,
    k: f32,
) {
    ranked.sort_by(|a, b| {
        let a_score = signal(&a.scores).unwrap_or(0.0);
        let b_score = signal(&b.scores).unwrap_or(0.0);
        b_score
            .partial_cmp(&a_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.item.identifier().cmp(b.item.identifier()))
    });

    for (rank, candidate) in ranked.into_iter().enumerate() {
        let entry = merged
            .entry(candidate.item.identifier().to_owned())
            .or_insert_with(|| Scored::new(candidate.item.clone()));

        if let Some(score) = signal(&candidate.scores) {
            if score > signal(&entry.scores).unwrap_or(f32::MIN) {
                store(&mut entry.scores, score);
            }
        }
        entry.fused += weight / (k + rank as f32 + 1.0);
    }
}

/// Fuses a dense and a sparse ranking into one list ordered by RRF score.
///
/// Each input is ranked by its own signal score; an item's fused score is the weighted
/// sum of `1 / (k + rank)` over the lists it appears in.
pub fn reciprocal_rank_fusion<T: Identified + Clone>(
    dense_ranked: Vec<Scored<T>>,
    sparse_ranked: Vec<Scored<T>>,
    config: RrfConfig,
) -> Vec<Scored<T>> {
    let mut merged: HashMap<String, Scored<T>> = HashMap::new();
    let k = if config.k <= 0.0 { 60.0 } else { config.k };

    accumulate(
        &mut merged,
        dense_ranked,
        |scores| scores.dense,
        |scores, value| scores.dense = Some(value),
        sanitize_weight(config.dense_weight),
        k,
    );
    accumulate(
        &mut merged,
        sparse_ranked,
        |scores| scores.sparse,
        |scores, value| scores.sparse = Some(value),
        sanitize_weight(config.sparse_weight),
        k,
    );

    let mut fused: Vec<Scored<T>> = merged.into_values().collect();
    sort_by_fused_desc(&mut fused);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item(&'static str);

    impl Identified for Item {
        fn identifier(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn items_in_both_lists_rank_first() {
        let dense = vec![
            Scored::new(Item("a")).with_dense_score(0.9),
            Scored::new(Item("b")).with_dense_score(0.8),
            Scored::new(Item("c")).with_dense_score(0.1),
        ];
        let sparse = vec![
            Scored::new(Item("d")).with_sparse_score(4.0),
            Scored::new(Item("b")).with_sparse_score(3.0),
        ];

        let fused = reciprocal_rank_fusion(dense, sparse, RrfConfig::default());
        let ids: Vec<&str> = fused.iter().map(|s| s.item.0).collect();

        assert_eq!(ids.first(), Some(&"b"));
        assert_eq!(fused.len(), 4);
        let b = &fused[0];
        assert_eq!(b.scores.dense, Some(0.8));
        assert_eq!(b.scores.sparse, Some(3.0));
    }

    #[test]
    fn input_order_is_irrelevant() {
        let dense = vec![
            Scored::new(Item("low")).with_dense_score(0.1),
            Scored::new(Item("high")).with_dense_score(0.9),
        ];
        let fused = reciprocal_rank_fusion(dense, Vec::new(), RrfConfig::default());
        assert_eq!(fused[0].item, Item("high"));
        assert!((fused[0].fused - 1.0 / 61.0).abs() < 1e-6);
    }

    #[test]
    fn zero_weight_disables_a_signal() {
        let dense = vec![Scored::new(Item("a")).with_dense_score(0.5)];
        let sparse = vec![Scored::new(Item("b")).with_sparse_score(0.5)];
        let config = RrfConfig {
            sparse_weight: 0.0,
            ..RrfConfig::default()
        };
        let fused = reciprocal_rank_fusion(dense, sparse, config);
        assert_eq!(fused[0].item, Item("a"));
        assert_eq!(fused[1].fused, 0.0);
    }
}
