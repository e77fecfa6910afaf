//! Key selection, value index, candidate matching and confidence scoring.

use std::collections::HashMap;

use super::collector::ColumnCollector;
use super::kind::SemanticKind;
use super::tokens::jaccard;
use super::{AnalysisConfig, AnalysisResult, CancellationToken};

/// A scored candidate between two collected columns (by index).
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub source: usize,
    pub target: usize,
    pub match_count: usize,
    pub source_coverage: f64,
    pub target_coverage: f64,
    pub name_similarity: f64,
    pub confidence: f64,
    pub samples: Vec<String>,
}

/// Whether a column can be the target (lookup side) of a relationship.
///
/// Only identifier-like and name-like columns qualify; name-like columns
/// must also be nearly unique.
pub fn is_key(column: &ColumnCollector, kind: SemanticKind, config: &AnalysisConfig) -> bool {
    if column.overflow || column.rows < config.min_key_rows {
        return false;
    }
    match kind {
        SemanticKind::Id | SemanticKind::Code => true,
        SemanticKind::Name => column.uniqueness() >= config.key_uniqueness,
        _ => false,
    }
}

/// Reverse index value -> key columns containing it.
pub fn build_value_index<'a>(
    columns: &'a [ColumnCollector],
    keys: &[bool],
) -> HashMap<&'a str, Vec<usize>> {
    let mut index: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, column) in columns.iter().enumerate() {
        if !keys[i] || column.overflow {
            continue;
        }
        for value in column.values() {
            index.entry(value.as_str()).or_default().push(i);
        }
    }
    index
}

/// Count matches for every eligible source column and keep the candidates
/// that pass every gate.
pub fn match_columns(
    columns: &[ColumnCollector],
    kinds: &[SemanticKind],
    index: &HashMap<&str, Vec<usize>>,
    config: &AnalysisConfig,
    cancel: &CancellationToken,
) -> AnalysisResult<Vec<Candidate>> {
    let mut accepted = Vec::new();
    for (s, source) in columns.iter().enumerate() {
        cancel.check()?;
        if source.overflow || source.distinct() < config.min_source_unique {
            continue;
        }

        let mut values: Vec<&String> = source.values().iter().collect();
        values.sort();
        let mut counts: HashMap<usize, (usize, Vec<String>)> = HashMap::new();
        for value in values {
            let Some(targets) = index.get(value.as_str()) else {
                continue;
            };
            for &t in targets {
                if t == s {
                    continue;
                }
                let entry = counts.entry(t).or_default();
                entry.0 += 1;
                if entry.1.len() < config.sample_size {
                    entry.1.push(value.clone());
                }
            }
        }

        for (t, (match_count, samples)) in counts {
            if let Some(candidate) =
                score(columns, kinds, s, t, match_count, samples, config)
            {
                accepted.push(candidate);
            }
        }
    }
    Ok(accepted)
}

/// Apply the coverage, kind and name gates, then compute confidence.
fn score(
    columns: &[ColumnCollector],
    kinds: &[SemanticKind],
    s: usize,
    t: usize,
    match_count: usize,
    samples: Vec<String>,
    config: &AnalysisConfig,
) -> Option<Candidate> {
    let (source, target) = (&columns[s], &columns[t]);
    if match_count < config.min_match_count {
        return None;
    }
    let source_coverage = match_count as f64 / source.distinct().max(1) as f64;
    let target_coverage = match_count as f64 / target.distinct().max(1) as f64;
    if source_coverage < config.min_source_coverage || target_coverage < config.min_target_coverage {
        return None;
    }

    let (source_kind, target_kind) = (kinds[s], kinds[t]);
    if !source_kind.compatible(target_kind) {
        return None;
    }
    let id_pair = source_kind.is_id_like() && target_kind.is_id_like();
    let name_similarity = jaccard(&source.tokens, &target.tokens);
    let min_similarity = if id_pair {
        config.min_name_similarity_id
    } else {
        config.min_name_similarity
    };
    if name_similarity < min_similarity {
        return None;
    }

    let confidence = confidence(
        source_coverage,
        target_coverage,
        name_similarity,
        target_kind == SemanticKind::Id || source_kind == SemanticKind::Id,
        source.key.file == target.key.file,
        config,
    );
    if confidence < config.min_confidence {
        return None;
    }

    Some(Candidate {
        source: s,
        target: t,
        match_count,
        source_coverage,
        target_coverage,
        name_similarity,
        confidence,
        samples,
    })
}

/// Weighted coverage blended with name similarity, adjusted and clipped.
pub fn confidence(
    source_coverage: f64,
    target_coverage: f64,
    name_similarity: f64,
    identifier_names: bool,
    same_file: bool,
    config: &AnalysisConfig,
) -> f64 {
    let coverage = config.source_coverage_share * source_coverage
        + (1.0 - config.source_coverage_share) * target_coverage;
    let mut score =
        config.coverage_weight * coverage + (1.0 - config.coverage_weight) * name_similarity;
    if identifier_names {
        score += config.identifier_bonus;
    }
    if same_file {
        score -= config.same_file_penalty;
    }
    score.clamp(0.0, 1.0)
}

/// Sort by confidence and keep at most `max_per_source` per source column.
pub fn rank(mut candidates: Vec<Candidate>, columns: &[ColumnCollector], max_per_source: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| columns[a.source].key.cmp(&columns[b.source].key))
            .then_with(|| columns[a.target].key.cmp(&columns[b.target].key))
    });
    let mut per_source: HashMap<usize, usize> = HashMap::new();
    candidates.retain(|c| {
        let n = per_source.entry(c.source).or_default();
        *n += 1;
        *n <= max_per_source
    });
    candidates
}
