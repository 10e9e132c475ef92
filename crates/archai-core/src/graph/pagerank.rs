//! PageRank computation over resolved graph edges.

pub const DEFAULT_DAMPING: f64 = 0.85;
pub const DEFAULT_EPSILON: f64 = 1e-6;
pub const MAX_ITERATIONS: usize = 100;

/// Scores for nodes `0..node_count` given `(source, target)` index pairs.
/// Dangling nodes spread their mass uniformly. Scores sum to 1.
pub fn compute_pagerank(
    node_count: usize,
    edges: &[(usize, usize)],
    damping: f64,
    epsilon: f64,
) -> Vec<f64> {
    if node_count == 0 {
        return Vec::new();
    }

    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); node_count];
    for &(source, target) in edges {
        if source < node_count && target < node_count {
            adjacency[source].push(target);
        }
    }

    let n = node_count as f64;
    let mut scores = vec![1.0 / n; node_count];

    for _ in 0..MAX_ITERATIONS {
        let dangling_mass: f64 = adjacency
            .iter()
            .zip(&scores)
            .filter(|(targets, _)| targets.is_empty())
            .map(|(_, score)| score)
            .sum();
        let base = (1.0 - damping) / n + damping * dangling_mass / n;
        let mut next_scores = vec![base; node_count];

        for (source, targets) in adjacency.iter().enumerate() {
            if targets.is_empty() {
                continue;
            }
            let share = damping * scores[source] / targets.len() as f64;
            for &target in targets {
                next_scores[target] += share;
            }
        }

        let delta: f64 = next_scores
            .iter()
            .zip(&scores)
            .map(|(next, prev)| (next - prev).abs())
            .sum();
        scores = next_scores;
        if delta <= epsilon {
            break;
        }
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_graph() {
        assert!(compute_pagerank(0, &[], DEFAULT_DAMPING, DEFAULT_EPSILON).is_empty());
    }

    #[test]
    fn test_scores_sum_to_one_and_favor_hubs() {
        let edges = [(0, 2), (1, 2), (3, 2), (2, 0)];
        let scores = compute_pagerank(4, &edges, DEFAULT_DAMPING, DEFAULT_EPSILON);
        let total: f64 = scores.iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert!(scores[2] > scores[0]);
        assert!(scores[0] > scores[1]);
    }

    #[test]
    fn test_out_of_range_edges_ignored() {
        let scores = compute_pagerank(2, &[(0, 7)], DEFAULT_DAMPING, DEFAULT_EPSILON);
        assert!((scores[0] - scores[1]).abs() < 1e-12);
    }
}
