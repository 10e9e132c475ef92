//! Shared guardrails for request payload bounds and traversal limits.

pub const MAX_QUERY_LENGTH: usize = 512;
pub const MAX_IMPACT_DEPTH: i64 = 6;
pub const MAX_GRAPH_VISITED: usize = 2000;
pub const MAX_FINDINGS: i64 = 50;

pub fn clamp_int(value: i64, minimum: i64, maximum: i64) -> i64 {
    value.max(minimum).min(maximum)
}

pub fn clamp_depth(value: i64, maximum: i64) -> i64 {
    clamp_int(value, 1, maximum)
}

pub fn clamp_limit(value: i64, maximum: i64) -> i64 {
    clamp_int(value, 1, maximum)
}

/// Trim `query` and cut it to at most [`MAX_QUERY_LENGTH`] bytes on a char
/// boundary.
pub fn truncate_query(query: &str) -> String {
    let stripped = query.trim();
    if stripped.len() <= MAX_QUERY_LENGTH {
        return stripped.to_string();
    }
    let mut end = MAX_QUERY_LENGTH;
    while !stripped.is_char_boundary(end) {
        end -= 1;
    }
    stripped[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_depth_bounds() {
        assert_eq!(clamp_depth(0, MAX_IMPACT_DEPTH), 1);
        assert_eq!(clamp_depth(-4, MAX_IMPACT_DEPTH), 1);
        assert_eq!(clamp_depth(3, MAX_IMPACT_DEPTH), 3);
        assert_eq!(clamp_depth(99, MAX_IMPACT_DEPTH), 6);
    }

    #[test]
    fn test_truncate_query_respects_char_boundaries() {
        let long = "é".repeat(MAX_QUERY_LENGTH);
        let cut = truncate_query(&long);
        assert!(cut.len() <= MAX_QUERY_LENGTH);
        assert!(cut.chars().all(|c| c == 'é'));
        assert_eq!(truncate_query("  Payment  "), "Payment");
    }
}
