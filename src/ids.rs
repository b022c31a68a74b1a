//! Prefix-match id resolution (spec.md §4.1, §8, §9).
//!
//! "A search id equals a stored id, or the stored id begins with the search
//! id; ties resolve to the first match in iteration order." Exact matches
//! always win over prefix candidates, even if a prefix candidate appears
//! earlier in iteration order (spec.md §8's invariant).
//!
//! Per spec.md §9 this is a read-path convenience only — write ops resolve
//! targets with this same helper today (matching the original behavior),
//! but callers that must restrict to full ids (a hardening spec.md flags as
//! future work, not a completed redesign) can simply compare `resolve`'s
//! result id against the input for exact equality themselves.

/// Resolve `search` against an iterator of stored ids, returning the index
/// of the match (exact match preferred, else first prefix match in
/// iteration order).
pub fn resolve_index<'a, I>(search: &str, ids: I) -> Option<usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut prefix_match: Option<usize> = None;
    for (index, id) in ids.into_iter().enumerate() {
        if id == search {
            return Some(index);
        }
        if prefix_match.is_none() && id.starts_with(search) {
            prefix_match = Some(index);
        }
    }
    prefix_match
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_wins_over_earlier_prefix_candidate() {
        let ids = vec!["abcxyz", "abc"];
        // "abcxyz" is a prefix match appearing first, but "abc" is exact.
        assert_eq!(resolve_index("abc", ids), Some(1));
    }

    #[test]
    fn first_prefix_candidate_wins_when_no_exact_match() {
        let ids = vec!["abc111", "abc222"];
        assert_eq!(resolve_index("abc", ids), Some(0));
    }

    #[test]
    fn no_match_returns_none() {
        let ids = vec!["xyz"];
        assert_eq!(resolve_index("abc", ids), None);
    }
}
