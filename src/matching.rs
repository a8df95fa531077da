use std::cmp::Ordering;

use itertools::Itertools;
use strum::IntoEnumIterator;

use crate::remote::{IntensityAxis, IntensityRatings, Whisky, WhiskyId};

#[derive(Debug, Clone, PartialEq)]
pub struct FlavorMatch {
    pub whisky: Whisky,
    pub similarity: f64,
}

fn vector(ratings: &IntensityRatings) -> Vec<f64> {
    IntensityAxis::iter()
        .map(|axis| f64::from(ratings.level(axis)))
        .collect()
}

/// Cosine of the angle between two flavor profiles. Zero if either profile is empty.
pub fn cosine_similarity(a: &IntensityRatings, b: &IntensityRatings) -> f64 {
    let (a, b) = (vector(a), vector(b));
    let dot: f64 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Most similar whiskies first, leaving out `exclude` and anything with nothing in common.
pub fn rank(
    target: &IntensityRatings,
    candidates: Vec<Whisky>,
    exclude: Option<WhiskyId>,
    limit: usize,
) -> Vec<FlavorMatch> {
    candidates
        .into_iter()
        .filter(|whisky| Some(whisky.id) != exclude)
        .map(|whisky| FlavorMatch {
            similarity: cosine_similarity(target, &whisky.flavor_profile),
            whisky,
        })
        .filter(|it| it.similarity > 0.0)
        .sorted_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.whisky.name.cmp(&b.whisky.name))
        })
        .take(limit)
        .collect()
}
