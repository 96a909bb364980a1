use std::collections::BTreeSet;

/// Agents known to need full expansion at or below a search state.
///
/// Within one search a collision set only ever grows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollisionSet {
    Flat(BTreeSet<usize>),
    /// Disjoint groups of agents, each solved as its own sub-problem.
    Recursive(BTreeSet<BTreeSet<usize>>),
}

impl CollisionSet {
    pub fn empty(recursive: bool) -> Self {
        if recursive {
            CollisionSet::Recursive(BTreeSet::new())
        } else {
            CollisionSet::Flat(BTreeSet::new())
        }
    }

    /// Build a set from pairwise conflicts. Pairs linked through a shared
    /// agent end up in the same group.
    pub fn from_colliding_indices(recursive: bool, pairs: &[(usize, usize)]) -> Self {
        if recursive {
            CollisionSet::Recursive(merge_groups(
                pairs.iter().map(|&(a, b)| BTreeSet::from([a, b])),
            ))
        } else {
            CollisionSet::Flat(pairs.iter().flat_map(|&(a, b)| [a, b]).collect())
        }
    }

    pub fn is_recursive(&self) -> bool {
        matches!(self, CollisionSet::Recursive(_))
    }

    pub fn contains_agent(&self, index: usize) -> bool {
        match self {
            CollisionSet::Flat(set) => set.contains(&index),
            CollisionSet::Recursive(groups) => groups.iter().any(|group| group.contains(&index)),
        }
    }

    /// True if every element (flat) or every group (recursive) of `self` is
    /// covered by `other`.
    pub fn subset(&self, other: &CollisionSet) -> bool {
        match (self, other) {
            (CollisionSet::Flat(set), CollisionSet::Flat(other)) => set.is_subset(other),
            (CollisionSet::Recursive(groups), CollisionSet::Recursive(other)) => groups
                .iter()
                .all(|group| other.iter().any(|o| group.is_subset(o))),
            _ => unreachable!("flat and recursive collision sets cannot be compared"),
        }
    }

    pub fn merge(&self, other: &CollisionSet) -> CollisionSet {
        match (self, other) {
            (CollisionSet::Flat(set), CollisionSet::Flat(other)) => {
                CollisionSet::Flat(set.union(other).copied().collect())
            }
            (CollisionSet::Recursive(groups), CollisionSet::Recursive(other)) => {
                CollisionSet::Recursive(merge_groups(groups.iter().chain(other).cloned()))
            }
            _ => unreachable!("flat and recursive collision sets cannot be merged"),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CollisionSet::Flat(set) => set.is_empty(),
            CollisionSet::Recursive(groups) => groups.is_empty(),
        }
    }

    /// Number of colliding agents.
    pub fn len(&self) -> usize {
        match self {
            CollisionSet::Flat(set) => set.len(),
            CollisionSet::Recursive(groups) => groups.iter().map(BTreeSet::len).sum(),
        }
    }

    /// Disjoint groups of colliding agents. A flat set is a single group.
    pub fn groups(&self) -> Vec<BTreeSet<usize>> {
        match self {
            CollisionSet::Flat(set) if set.is_empty() => Vec::new(),
            CollisionSet::Flat(set) => vec![set.clone()],
            CollisionSet::Recursive(groups) => groups.iter().cloned().collect(),
        }
    }
}

// Union every pair of groups sharing an index, transitively. The result is
// pairwise disjoint, so no group is a subset of another.
fn merge_groups(groups: impl IntoIterator<Item = BTreeSet<usize>>) -> BTreeSet<BTreeSet<usize>> {
    let mut merged: Vec<BTreeSet<usize>> = Vec::new();

    for mut group in groups {
        if group.is_empty() {
            continue;
        }
        let mut i = 0;
        while i < merged.len() {
            if merged[i].is_disjoint(&group) {
                i += 1;
            } else {
                group.extend(merged.swap_remove(i));
            }
        }
        merged.push(group);
    }

    merged.into_iter().collect()
}
