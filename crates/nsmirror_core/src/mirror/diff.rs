//! Sorted merge diff of local and remote child sets.

use std::cmp::Ordering;

/// Result of comparing local entries with remote children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildDiff {
    /// Present remotely only.
    pub add: Vec<String>,
    /// Present locally only.
    pub remove: Vec<String>,
    /// Present on both sides.
    pub common: Vec<String>,
}

impl ChildDiff {
    /// Returns true if the two sides already agree.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Splits `local` and `remote` into added, removed and common names.
///
/// Both inputs are sorted and de-duplicated first; the comparison itself is a
/// single ascending merge. Each output list is in ascending order.
///
/// ```rust
/// use nsmirror_core::mirror::diff_sorted;
///
/// let diff = diff_sorted(vec!["a".into(), "b".into()], vec!["b".into(), "c".into()]);
/// assert_eq!(diff.add, vec!["c"]);
/// assert_eq!(diff.remove, vec!["a"]);
/// assert_eq!(diff.common, vec!["b"]);
/// ```
#[must_use]
pub fn diff_sorted(mut local: Vec<String>, mut remote: Vec<String>) -> ChildDiff {
    local.sort_unstable();
    local.dedup();
    remote.sort_unstable();
    remote.dedup();

    let mut diff = ChildDiff::default();
    let mut local = local.into_iter().peekable();
    let mut remote = remote.into_iter().peekable();

    loop {
        let order = match (local.peek(), remote.peek()) {
            (Some(l), Some(r)) => l.cmp(r),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => break,
        };
        match order {
            Ordering::Less => diff.remove.extend(local.next()),
            Ordering::Greater => diff.add.extend(remote.next()),
            Ordering::Equal => {
                local.next();
                diff.common.extend(remote.next());
            }
        }
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn empty_local_adds_everything() {
        let diff = diff_sorted(Vec::new(), names(&["c", "a", "b"]));
        assert_eq!(diff.add, names(&["a", "b", "c"]));
        assert!(diff.remove.is_empty());
        assert!(diff.common.is_empty());
    }

    #[test]
    fn replaced_child() {
        let diff = diff_sorted(names(&["a", "b", "c"]), names(&["b", "c", "d"]));
        assert_eq!(diff.add, names(&["d"]));
        assert_eq!(diff.remove, names(&["a"]));
        assert_eq!(diff.common, names(&["b", "c"]));
        assert!(!diff.is_converged());
    }

    #[test]
    fn identical_sets_converge() {
        let diff = diff_sorted(names(&["x", "y"]), names(&["y", "x"]));
        assert!(diff.is_converged());
        assert_eq!(diff.common, names(&["x", "y"]));
    }

    proptest! {
        #[test]
        fn matches_set_operations(
            local in proptest::collection::vec("[a-e]{1,2}", 0..20),
            remote in proptest::collection::vec("[a-e]{1,2}", 0..20),
        ) {
            let l: BTreeSet<String> = local.iter().cloned().collect();
            let r: BTreeSet<String> = remote.iter().cloned().collect();
            let diff = diff_sorted(local, remote);

            prop_assert_eq!(diff.add, r.difference(&l).cloned().collect::<Vec<_>>());
            prop_assert_eq!(diff.remove, l.difference(&r).cloned().collect::<Vec<_>>());
            prop_assert_eq!(diff.common, l.intersection(&r).cloned().collect::<Vec<_>>());
        }
    }
}
