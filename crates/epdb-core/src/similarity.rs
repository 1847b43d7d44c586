//! Weighted title similarity for near-duplicate detection.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

pub const DEFAULT_THRESHOLD: f64 = 0.8;

const LEVENSHTEIN_WEIGHT: f64 = 0.40;
const JACCARD_WEIGHT: f64 = 0.35;
const COSINE_WEIGHT: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityBand {
    Exact,
    High,
    Medium,
    Low,
}

impl SimilarityBand {
    #[must_use]
    pub fn for_score(score: f64) -> Self {
        if score >= 0.95 {
            SimilarityBand::Exact
        } else if score >= 0.85 {
            SimilarityBand::High
        } else if score >= 0.70 {
            SimilarityBand::Medium
        } else {
            SimilarityBand::Low
        }
    }
}

/// Where an existing title lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TitleOrigin {
    Active,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownTitle {
    pub id: String,
    pub title: String,
    pub origin: TitleOrigin,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarTitle {
    pub matched_title: String,
    pub matched_id: String,
    pub origin: TitleOrigin,
    pub similarity: f64,
    pub band: SimilarityBand,
}

/// Lowercases, drops punctuation, and collapses whitespace.
#[must_use]
pub fn normalize_title(text: &str) -> String {
    let kept: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Overall score in `[0, 1]`: 0.40 Levenshtein + 0.35 word Jaccard + 0.25 word cosine.
#[must_use]
pub fn overall_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_title(a);
    let b = normalize_title(b);
    let levenshtein = strsim::normalized_levenshtein(&a, &b);
    LEVENSHTEIN_WEIGHT * levenshtein
        + JACCARD_WEIGHT * jaccard(&a, &b)
        + COSINE_WEIGHT * cosine(&a, &b)
}

fn jaccard(a: &str, b: &str) -> f64 {
    let left: HashSet<&str> = a.split_whitespace().collect();
    let right: HashSet<&str> = b.split_whitespace().collect();
    let union = left.union(&right).count();
    if union == 0 {
        return 1.0;
    }
    ratio(left.intersection(&right).count(), union)
}

fn cosine(a: &str, b: &str) -> f64 {
    let left = word_counts(a);
    let right = word_counts(b);
    let dot: f64 = left
        .iter()
        .filter_map(|(word, n)| right.get(word).map(|m| n * m))
        .sum();
    let magnitude = |counts: &HashMap<&str, f64>| counts.values().map(|v| v * v).sum::<f64>().sqrt();
    let (ma, mb) = (magnitude(&left), magnitude(&right));
    if ma == 0.0 || mb == 0.0 {
        return 0.0;
    }
    dot / (ma * mb)
}

fn word_counts(text: &str) -> HashMap<&str, f64> {
    let mut counts = HashMap::new();
    for word in text.split_whitespace() {
        *counts.entry(word).or_insert(0.0) += 1.0;
    }
    counts
}

#[allow(clippy::cast_precision_loss)]
fn ratio(num: usize, den: usize) -> f64 {
    num as f64 / den as f64
}

/// Existing titles scoring at or above `threshold`, most similar first.
#[must_use]
pub fn find_similar(candidate: &str, known: &[KnownTitle], threshold: f64) -> Vec<SimilarTitle> {
    let mut matches: Vec<SimilarTitle> = known
        .iter()
        .filter_map(|k| {
            let similarity = overall_similarity(candidate, &k.title);
            (similarity >= threshold).then(|| SimilarTitle {
                matched_title: k.title.clone(),
                matched_id: k.id.clone(),
                origin: k.origin,
                similarity,
                band: SimilarityBand::for_score(similarity),
            })
        })
        .collect();
    matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    matches
}
