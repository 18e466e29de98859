//! Order-statistic treap used by the in-memory ranking index.
//!
//! Nodes carry their subtree size, so rank and select run in O(log N)
//! expected time alongside insert and remove.

use std::cmp::Ordering;

/// Sort key for ordered storage: highest score first, ties broken by
/// member identifier descending (the order a sorted-set store returns for
/// reverse ranges).
#[derive(Debug, Clone)]
pub(crate) struct SortKey {
    pub score: f64,
    pub member: String,
}

impl SortKey {
    pub fn new(member: &str, score: f64) -> Self {
        Self {
            score,
            member: member.to_string(),
        }
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| other.member.cmp(&self.member))
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SortKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortKey {}

type Link = Option<Box<Node>>;

struct Node {
    key: SortKey,
    priority: u64,
    size: usize,
    left: Link,
    right: Link,
}

impl Node {
    fn new(key: SortKey) -> Box<Self> {
        Box::new(Self {
            key,
            priority: rand::random(),
            size: 1,
            left: None,
            right: None,
        })
    }

    fn refresh(&mut self) {
        self.size = 1 + size(&self.left) + size(&self.right);
    }
}

fn size(link: &Link) -> usize {
    link.as_ref().map(|n| n.size).unwrap_or(0)
}

/// Split into keys `< key` and keys `>= key`.
fn split(link: Link, key: &SortKey) -> (Link, Link) {
    match link {
        None => (None, None),
        Some(mut node) => {
            if node.key < *key {
                let (lo, hi) = split(node.right.take(), key);
                node.right = lo;
                node.refresh();
                (Some(node), hi)
            } else {
                let (lo, hi) = split(node.left.take(), key);
                node.left = hi;
                node.refresh();
                (lo, Some(node))
            }
        }
    }
}

/// Every key in `left` must sort before every key in `right`.
fn merge(left: Link, right: Link) -> Link {
    match (left, right) {
        (None, right) => right,
        (left, None) => left,
        (Some(mut l), Some(mut r)) => {
            if l.priority > r.priority {
                l.right = merge(l.right.take(), Some(r));
                l.refresh();
                Some(l)
            } else {
                r.left = merge(Some(l), r.left.take());
                r.refresh();
                Some(r)
            }
        }
    }
}

fn remove(link: &mut Link, key: &SortKey) -> bool {
    let Some(node) = link.as_mut() else {
        return false;
    };
    match key.cmp(&node.key) {
        Ordering::Less => {
            let removed = remove(&mut node.left, key);
            if removed {
                node.size -= 1;
            }
            removed
        }
        Ordering::Greater => {
            let removed = remove(&mut node.right, key);
            if removed {
                node.size -= 1;
            }
            removed
        }
        Ordering::Equal => {
            let left = node.left.take();
            let right = node.right.take();
            *link = merge(left, right);
            true
        }
    }
}

fn collect<'a>(link: &'a Link, start: usize, end: usize, base: usize, out: &mut Vec<&'a SortKey>) {
    let Some(node) = link.as_ref() else {
        return;
    };
    let at = base + size(&node.left);
    if start < at {
        collect(&node.left, start, end, base, out);
    }
    if start <= at && at <= end {
        out.push(&node.key);
    }
    if end > at {
        collect(&node.right, start, end, at + 1, out);
    }
}

#[derive(Default)]
pub(crate) struct RankTree {
    root: Link,
}

impl RankTree {
    pub fn new() -> Self {
        Self { root: None }
    }

    pub fn len(&self) -> usize {
        size(&self.root)
    }

    /// Keys are unique per member, so callers remove the old key first.
    pub fn insert(&mut self, key: SortKey) {
        let (lo, hi) = split(self.root.take(), &key);
        self.root = merge(merge(lo, Some(Node::new(key))), hi);
    }

    pub fn remove(&mut self, key: &SortKey) -> bool {
        remove(&mut self.root, key)
    }

    /// 0-based position of `key`, if present.
    pub fn rank(&self, key: &SortKey) -> Option<usize> {
        let mut cur = self.root.as_deref();
        let mut before = 0;
        while let Some(node) = cur {
            match key.cmp(&node.key) {
                Ordering::Less => cur = node.left.as_deref(),
                Ordering::Greater => {
                    before += size(&node.left) + 1;
                    cur = node.right.as_deref();
                }
                Ordering::Equal => return Some(before + size(&node.left)),
            }
        }
        None
    }

    /// Keys at positions `start..=end`, in order.
    pub fn range(&self, start: usize, end: usize) -> Vec<&SortKey> {
        let mut out = Vec::new();
        if start >= self.len() || end < start {
            return out;
        }
        let end = end.min(self.len() - 1);
        out.reserve(end - start + 1);
        collect(&self.root, start, end, 0, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(keys: Vec<&SortKey>) -> Vec<&str> {
        keys.into_iter().map(|k| k.member.as_str()).collect()
    }

    #[test]
    fn test_orders_by_score_descending() {
        let mut tree = RankTree::new();
        tree.insert(SortKey::new("alice", 100.0));
        tree.insert(SortKey::new("bob", 200.0));
        tree.insert(SortKey::new("charlie", 150.0));

        assert_eq!(members(tree.range(0, 10)), vec!["bob", "charlie", "alice"]);
        assert_eq!(tree.rank(&SortKey::new("bob", 200.0)), Some(0));
        assert_eq!(tree.rank(&SortKey::new("alice", 100.0)), Some(2));
        assert_eq!(tree.rank(&SortKey::new("alice", 99.0)), None);
    }

    #[test]
    fn test_ties_broken_by_member_descending() {
        let mut tree = RankTree::new();
        tree.insert(SortKey::new("ann", 50.0));
        tree.insert(SortKey::new("zed", 50.0));
        tree.insert(SortKey::new("max", 50.0));

        assert_eq!(members(tree.range(0, 2)), vec!["zed", "max", "ann"]);
    }

    #[test]
    fn test_remove_keeps_sizes_consistent() {
        let mut tree = RankTree::new();
        for i in 0..100 {
            tree.insert(SortKey::new(&format!("p{i:03}"), i as f64));
        }
        for i in (0..100).step_by(2) {
            assert!(tree.remove(&SortKey::new(&format!("p{i:03}"), i as f64)));
        }
        assert!(!tree.remove(&SortKey::new("p000", 0.0)));
        assert_eq!(tree.len(), 50);

        // Remaining odd scores, highest first.
        assert_eq!(tree.rank(&SortKey::new("p099", 99.0)), Some(0));
        assert_eq!(tree.rank(&SortKey::new("p001", 1.0)), Some(49));
        assert_eq!(members(tree.range(1, 2)), vec!["p097", "p095"]);
    }

    #[test]
    fn test_range_edges() {
        let mut tree = RankTree::new();
        assert!(tree.range(0, 0).is_empty());

        tree.insert(SortKey::new("a", 1.0));
        tree.insert(SortKey::new("b", 2.0));
        assert!(tree.range(2, 5).is_empty());
        assert!(tree.range(1, 0).is_empty());
        assert_eq!(members(tree.range(1, usize::MAX)), vec!["a"]);
    }

    #[test]
    fn test_rank_matches_sorted_order() {
        let mut tree = RankTree::new();
        let mut keys: Vec<SortKey> = (0..500)
            .map(|i| SortKey::new(&format!("m{i}"), ((i * 7919) % 211) as f64))
            .collect();
        for key in &keys {
            tree.insert(key.clone());
        }
        keys.sort();
        for (expected, key) in keys.iter().enumerate() {
            assert_eq!(tree.rank(key), Some(expected));
        }
        let all = tree.range(0, keys.len());
        assert_eq!(all.len(), keys.len());
        assert!(all.iter().zip(keys.iter()).all(|(a, b)| *a == b));
    }
}
