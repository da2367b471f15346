//! Average-link agglomerative clustering over cosine similarity.
//!
//! Sections arrive as normalized vectors; pairwise cosine similarity is a
//! dot product. Clusters are merged greedily while the best average-link
//! similarity stays at or above the cutoff, so every emitted cluster has
//! mean inter-member similarity ≥ cutoff.

use crate::embedding::dot;

/// Clusters items by their vectors using average-link agglomeration.
///
/// Returns member-index lists; singletons are included. Items are merged
/// while the best cluster-pair average similarity is ≥ `cutoff`.
#[must_use]
pub fn cluster_by_similarity(vectors: &[&[f32]], cutoff: f32) -> Vec<Vec<usize>> {
    let n = vectors.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![vec![0]];
    }

    // Full similarity matrix between current clusters; starts as the
    // item-level matrix and is updated with size-weighted averages on
    // each merge (average linkage).
    let mut sim = vec![vec![0.0f32; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let s = dot(vectors[i], vectors[j]);
            sim[i][j] = s;
            sim[j][i] = s;
        }
    }

    let mut active = vec![true; n];
    let mut members: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();

    loop {
        let mut best: Option<(usize, usize, f32)> = None;
        for i in 0..n {
            if !active[i] {
                continue;
            }
            for j in (i + 1)..n {
                if !active[j] {
                    continue;
                }
                if best.map_or(true, |(_, _, s)| sim[i][j] > s) {
                    best = Some((i, j, sim[i][j]));
                }
            }
        }
        let Some((i, j, best_sim)) = best else { break };
        if best_sim < cutoff {
            break;
        }

        // Average-link update, weighted by cluster sizes.
        #[allow(clippy::cast_precision_loss)]
        let (ni, nj) = (members[i].len() as f32, members[j].len() as f32);
        for k in 0..n {
            if !active[k] || k == i || k == j {
                continue;
            }
            let merged = (ni * sim[i][k] + nj * sim[j][k]) / (ni + nj);
            sim[i][k] = merged;
            sim[k][i] = merged;
        }

        let absorbed = std::mem::take(&mut members[j]);
        members[i].extend(absorbed);
        active[j] = false;
    }

    let mut clusters: Vec<Vec<usize>> = members
        .into_iter()
        .zip(active)
        .filter_map(|(mut m, alive)| {
            if alive {
                m.sort_unstable();
                Some(m)
            } else {
                None
            }
        })
        .collect();
    clusters.sort_by_key(|m| m.first().copied().unwrap_or(0));
    clusters
}

/// Mean pairwise similarity across a cluster's members (1.0 for
/// singletons).
#[must_use]
pub fn mean_pairwise_similarity(vectors: &[&[f32]], members: &[usize]) -> f32 {
    if members.len() < 2 {
        return 1.0;
    }
    let mut total = 0.0f32;
    let mut count = 0u32;
    for (a, &i) in members.iter().enumerate() {
        for &j in members.iter().skip(a + 1) {
            total += dot(vectors[i], vectors[j]);
            count += 1;
        }
    }
    if count == 0 {
        1.0
    } else {
        #[allow(clippy::cast_precision_loss)]
        let denominator = count as f32;
        total / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similar_vectors_cluster() {
        let a = vec![1.0, 0.0];
        let b = vec![0.98, 0.199];
        let c = vec![0.0, 1.0];
        let refs: Vec<&[f32]> = vec![&a, &b, &c];
        let clusters = cluster_by_similarity(&refs, 0.8);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0], vec![0, 1]);
        assert_eq!(clusters[1], vec![2]);
    }

    #[test]
    fn test_cutoff_one_keeps_singletons() {
        let a = vec![1.0, 0.0];
        let b = vec![0.9, 0.436];
        let refs: Vec<&[f32]> = vec![&a, &b];
        let clusters = cluster_by_similarity(&refs, 1.1);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn test_empty_and_single() {
        assert!(cluster_by_similarity(&[], 0.8).is_empty());
        let a = vec![1.0];
        let refs: Vec<&[f32]> = vec![&a];
        assert_eq!(cluster_by_similarity(&refs, 0.8), vec![vec![0]]);
    }

    #[test]
    fn test_mean_pairwise() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0];
        let refs: Vec<&[f32]> = vec![&a, &b];
        let mean = mean_pairwise_similarity(&refs, &[0, 1]);
        assert!((mean - 1.0).abs() < 1e-6);
        assert!((mean_pairwise_similarity(&refs, &[0]) - 1.0).abs() < f32::EPSILON);
    }
}
