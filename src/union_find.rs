//! Disjoint sets over dense indices.
//!
//! Used to cluster intersection points whose buffers touch, so that each
//! cluster can be unioned on its own instead of folding every buffer into
//! one huge polygon.

/// Union-Find over `0..len` with path compression and union by rank.
///
/// # Example
/// ```
/// use road_segmenter::union_find::DisjointSets;
///
/// let mut sets = DisjointSets::new(3);
/// sets.union(0, 2);
/// assert_eq!(sets.find(0), sets.find(2));
/// assert_ne!(sets.find(0), sets.find(1));
/// ```
#[derive(Debug, Clone)]
pub struct DisjointSets {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSets {
    /// Create `len` singleton sets.
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Representative of the set containing `item`.
    pub fn find(&mut self, item: usize) -> usize {
        let mut root = item;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Path compression
        let mut current = item;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    /// Merge the sets containing `a` and `b`. Returns false if they were
    /// already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return false;
        }
        match self.rank[root_a].cmp(&self.rank[root_b]) {
            std::cmp::Ordering::Less => self.parent[root_a] = root_b,
            std::cmp::Ordering::Greater => self.parent[root_b] = root_a,
            std::cmp::Ordering::Equal => {
                self.parent[root_b] = root_a;
                self.rank[root_a] += 1;
            }
        }
        true
    }

    /// All sets, each sorted ascending, ordered by their smallest member.
    pub fn groups(&mut self) -> Vec<Vec<usize>> {
        let mut slot_of_root: Vec<Option<usize>> = vec![None; self.len()];
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for item in 0..self.len() {
            let root = self.find(item);
            match slot_of_root[root] {
                Some(slot) => groups[slot].push(item),
                None => {
                    slot_of_root[root] = Some(groups.len());
                    groups.push(vec![item]);
                }
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singletons() {
        let mut sets = DisjointSets::new(3);
        assert_eq!(sets.groups(), vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn test_union_and_groups() {
        let mut sets = DisjointSets::new(6);
        assert!(sets.union(4, 1));
        assert!(sets.union(1, 5));
        assert!(!sets.union(5, 4));
        sets.union(0, 3);

        let groups = sets.groups();
        assert_eq!(groups, vec![vec![0, 3], vec![1, 4, 5], vec![2]]);
    }

    #[test]
    fn test_empty() {
        let mut sets = DisjointSets::new(0);
        assert!(sets.is_empty());
        assert!(sets.groups().is_empty());
    }
}
