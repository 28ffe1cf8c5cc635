//! Community-consistency filtering
//!
//! Community ids come from a clustering pass over the graph. A hit routed from
//! an entity is only kept when the two share a community, or when neither side
//! was ever assigned one.

use rustc_hash::FxHashSet;
use serde_json::Value;

/// Whether a hit may stay next to the entity it was routed from
pub fn communities_compatible(anchor: &[i64], hit: &[i64]) -> bool {
    if anchor.is_empty() && hit.is_empty() {
        return true;
    }
    let anchor: FxHashSet<i64> = anchor.iter().copied().collect();
    hit.iter().any(|c| anchor.contains(c))
}

/// Read a community property that may be null, a single id or a list of ids
pub fn parse_community_ids(value: Option<&Value>) -> Vec<i64> {
    match value {
        Some(Value::Number(n)) => n.as_i64().into_iter().collect(),
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_i64).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unclustered_pair_is_compatible() {
        assert!(communities_compatible(&[], &[]));
    }

    #[test]
    fn test_one_sided_community_is_incompatible() {
        assert!(!communities_compatible(&[], &[1, 2]));
        assert!(!communities_compatible(&[3], &[]));
    }

    #[test]
    fn test_overlap_required_when_both_known() {
        assert!(communities_compatible(&[1, 2], &[2, 5]));
        assert!(!communities_compatible(&[1, 2], &[3, 4]));
    }

    #[test]
    fn test_parse_community_ids() {
        assert_eq!(parse_community_ids(Some(&json!(7))), vec![7]);
        assert_eq!(parse_community_ids(Some(&json!([1, 2, "x"]))), vec![1, 2]);
        assert!(parse_community_ids(Some(&Value::Null)).is_empty());
        assert!(parse_community_ids(None).is_empty());
    }
}
