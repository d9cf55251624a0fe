//! Ranking, adjacent-chunk merging, and store-level search.
//!
//! The search here operates entirely through the [`VectorStore`] trait.
//! The calling application embeds the query (applying its own timeout)
//! and passes the vector in a [`SearchRequest`].
//!
//! # Ordering
//!
//! Results are ordered by ascending cosine distance. Equal distances are
//! broken by chunk id ascending so that repeated queries against an
//! unchanged store return identical lists.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::models::RetrievedChunk;
use crate::store::{SearchFilter, VectorStore};

/// Inputs for a single store search.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub query_vec: &'a [f32],
    pub top_k: usize,
    pub filter: SearchFilter,
    /// Collapse consecutive chunks of one document into a single entry.
    pub merge_adjacent: bool,
}

/// Reject a `top_k` of zero.
pub fn validate_top_k(top_k: usize) -> Result<()> {
    if top_k == 0 {
        return Err(Error::config("top_k must be at least 1"));
    }
    Ok(())
}

/// Search a store with a pre-computed query vector.
pub async fn search<S: VectorStore + ?Sized>(
    store: &S,
    req: &SearchRequest<'_>,
) -> Result<Vec<RetrievedChunk>> {
    validate_top_k(req.top_k)?;
    let hits = store.search(req.query_vec, req.top_k, &req.filter).await?;
    if req.merge_adjacent {
        Ok(merge_adjacent(hits))
    } else {
        Ok(hits)
    }
}

/// Order candidates by distance then chunk id and keep the first `limit`.
pub fn rank(mut candidates: Vec<RetrievedChunk>, limit: usize) -> Vec<RetrievedChunk> {
    candidates.sort_by(compare);
    candidates.truncate(limit);
    candidates
}

fn compare(a: &RetrievedChunk, b: &RetrievedChunk) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.chunk_id.cmp(&b.chunk_id))
}

/// Collapse runs of consecutive ordinals from the same document.
///
/// Each run becomes one entry placed at the rank of its best member and
/// carrying that member's id, heading path and distance. Texts are joined
/// in ordinal order.
pub fn merge_adjacent(ranked: Vec<RetrievedChunk>) -> Vec<RetrievedChunk> {
    let mut by_doc: BTreeMap<String, Vec<(usize, RetrievedChunk)>> = BTreeMap::new();
    for (rank, hit) in ranked.into_iter().enumerate() {
        by_doc
            .entry(hit.source.path.clone())
            .or_default()
            .push((rank, hit));
    }

    let mut merged: Vec<(usize, RetrievedChunk)> = Vec::new();
    for (_, mut hits) in by_doc {
        hits.sort_by_key(|(_, h)| h.ordinals.first().copied().unwrap_or_default());

        let mut run: Vec<(usize, RetrievedChunk)> = Vec::new();
        for (rank, hit) in hits {
            let continues = run
                .last()
                .and_then(|(_, prev)| prev.ordinals.last())
                .zip(hit.ordinals.first())
                .is_some_and(|(prev, next)| prev + 1 == *next);
            if !continues && !run.is_empty() {
                merged.extend(collapse(std::mem::take(&mut run)));
            }
            run.push((rank, hit));
        }
        if !run.is_empty() {
            merged.extend(collapse(run));
        }
    }

    merged.sort_by_key(|(rank, _)| *rank);
    merged.into_iter().map(|(_, hit)| hit).collect()
}

/// Merge one run (sorted by ordinal) into a single entry.
fn collapse(run: Vec<(usize, RetrievedChunk)>) -> Option<(usize, RetrievedChunk)> {
    let lead_idx = run
        .iter()
        .enumerate()
        .min_by_key(|(_, (rank, _))| *rank)
        .map(|(i, _)| i)?;
    let text = run
        .iter()
        .map(|(_, h)| h.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let ordinals = run
        .iter()
        .flat_map(|(_, h)| h.ordinals.iter().copied())
        .collect();

    let (rank, mut lead) = run.into_iter().nth(lead_idx)?;
    lead.text = text;
    lead.ordinals = ordinals;
    Some((rank, lead))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceRef;

    fn hit(path: &str, ordinal: usize, distance: f32) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: format!("{}#{}", path, ordinal),
            source: SourceRef {
                path: path.into(),
                title: path.into(),
                category: "general".into(),
                tags: vec![],
            },
            heading_path: vec![format!("section {}", ordinal)],
            text: format!("text {}", ordinal),
            ordinals: vec![ordinal],
            distance,
        }
    }

    #[test]
    fn rank_breaks_ties_by_id() {
        let ranked = rank(vec![hit("b", 0, 0.1), hit("a", 0, 0.1), hit("c", 0, 0.05)], 2);
        let ids: Vec<&str> = ranked.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c#0", "a#0"]);
    }

    #[test]
    fn nan_distances_sort_last() {
        let ranked = rank(
            vec![hit("a", 0, f32::NAN), hit("b", 0, 0.4), hit("c", 0, 0.2)],
            3,
        );
        let ids: Vec<&str> = ranked.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c#0", "b#0", "a#0"]);
    }

    #[test]
    fn top_k_zero_is_config_error() {
        assert!(matches!(validate_top_k(0), Err(Error::Config(_))));
        assert!(validate_top_k(1).is_ok());
    }

    #[test]
    fn adjacent_chunks_collapse_at_best_rank() {
        let ranked = vec![
            hit("a", 3, 0.1),
            hit("b", 0, 0.2),
            hit("a", 2, 0.3),
            hit("a", 7, 0.4),
        ];
        let merged = merge_adjacent(ranked);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].ordinals, vec![2, 3]);
        assert_eq!(merged[0].text, "text 2\n\ntext 3");
        assert_eq!(merged[0].chunk_id, "a#3");
        assert_eq!(merged[0].heading_path, vec!["section 3".to_string()]);
        assert!((merged[0].distance - 0.1).abs() < 1e-6);
        assert_eq!(merged[1].source.path, "b");
        assert_eq!(merged[2].ordinals, vec![7]);
    }

    #[test]
    fn merge_without_neighbours_is_identity() {
        let ranked = vec![hit("a", 0, 0.1), hit("a", 2, 0.2), hit("b", 1, 0.3)];
        let merged = merge_adjacent(ranked.clone());
        let ids: Vec<&str> = merged.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a#0", "a#2", "b#1"]);
    }
}
