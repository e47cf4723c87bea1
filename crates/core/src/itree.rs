/// Augmented AVL interval tree used by the optimizer to propagate length
/// changes: inserting `[low, high]` ranges up front, then stabbing with a
/// bytecode index in `O(log n + k)` per query.
#[derive(Debug)]
pub(crate) struct IntervalTree<T> {
    nodes: Vec<Node<T>>,
    root: Option<usize>,
}

#[derive(Debug)]
struct Node<T> {
    low: i64,
    high: i64,
    max_high: i64,
    height: i32,
    left: Option<usize>,
    right: Option<usize>,
    data: T,
}

impl<T> IntervalTree<T> {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn insert(&mut self, low: i64, high: i64, data: T) {
        debug_assert!(low <= high, "inverted interval");
        let index = self.nodes.len();
        self.nodes.push(Node {
            low,
            high,
            max_high: high,
            height: 1,
            left: None,
            right: None,
            data,
        });
        self.root = Some(self.insert_at(self.root, index));
    }

    /// Visit every interval containing `point`, in ascending `low` order.
    pub(crate) fn enumerate_overlapping(&self, point: i64, visit: &mut dyn FnMut(&T)) {
        self.query(self.root, point, visit);
    }

    fn query(&self, node: Option<usize>, point: i64, visit: &mut dyn FnMut(&T)) {
        let Some(index) = node else {
            return;
        };
        let node = &self.nodes[index];
        if node.max_high < point {
            return;
        }
        self.query(node.left, point, visit);
        if node.low <= point && point <= node.high {
            visit(&node.data);
        }
        // Everything to the right has low >= node.low; once the point
        // falls short of that, no right-side interval can contain it.
        if point >= node.low {
            self.query(node.right, point, visit);
        }
    }

    fn insert_at(&mut self, node: Option<usize>, new: usize) -> usize {
        let Some(index) = node else {
            return new;
        };
        let key = (self.nodes[new].low, self.nodes[new].high);
        if key < (self.nodes[index].low, self.nodes[index].high) {
            let left = self.insert_at(self.nodes[index].left, new);
            self.nodes[index].left = Some(left);
        } else {
            let right = self.insert_at(self.nodes[index].right, new);
            self.nodes[index].right = Some(right);
        }
        self.update(index);
        self.rebalance(index)
    }

    fn height(&self, node: Option<usize>) -> i32 {
        node.map_or(0, |index| self.nodes[index].height)
    }

    fn subtree_max(&self, node: Option<usize>) -> i64 {
        node.map_or(i64::MIN, |index| self.nodes[index].max_high)
    }

    fn update(&mut self, index: usize) {
        let left = self.nodes[index].left;
        let right = self.nodes[index].right;
        self.nodes[index].height = 1 + self.height(left).max(self.height(right));
        self.nodes[index].max_high = self.nodes[index]
            .high
            .max(self.subtree_max(left))
            .max(self.subtree_max(right));
    }

    fn balance_factor(&self, index: usize) -> i32 {
        self.height(self.nodes[index].left) - self.height(self.nodes[index].right)
    }

    fn rebalance(&mut self, index: usize) -> usize {
        let balance = self.balance_factor(index);
        if balance > 1 {
            let left = self.nodes[index].left.expect("left-heavy node has left child");
            if self.balance_factor(left) < 0 {
                let rotated = self.rotate_left(left);
                self.nodes[index].left = Some(rotated);
            }
            self.rotate_right(index)
        } else if balance < -1 {
            let right = self.nodes[index].right.expect("right-heavy node has right child");
            if self.balance_factor(right) > 0 {
                let rotated = self.rotate_right(right);
                self.nodes[index].right = Some(rotated);
            }
            self.rotate_left(index)
        } else {
            index
        }
    }

    fn rotate_left(&mut self, index: usize) -> usize {
        let pivot = self.nodes[index].right.expect("rotate_left needs right child");
        self.nodes[index].right = self.nodes[pivot].left;
        self.nodes[pivot].left = Some(index);
        self.update(index);
        self.update(pivot);
        pivot
    }

    fn rotate_right(&mut self, index: usize) -> usize {
        let pivot = self.nodes[index].left.expect("rotate_right needs left child");
        self.nodes[index].left = self.nodes[pivot].right;
        self.nodes[pivot].right = Some(index);
        self.update(index);
        self.update(pivot);
        pivot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hits(tree: &IntervalTree<u32>, point: i64) -> Vec<u32> {
        let mut found = Vec::new();
        tree.enumerate_overlapping(point, &mut |&data| found.push(data));
        found
    }

    #[test]
    fn stabbing_finds_exactly_the_containing_intervals() {
        let mut tree = IntervalTree::new();
        tree.insert(1, 5, 0);
        tree.insert(3, 9, 1);
        tree.insert(7, 8, 2);
        tree.insert(10, 10, 3);

        assert_eq!(hits(&tree, 0), Vec::<u32>::new());
        assert_eq!(hits(&tree, 1), vec![0]);
        assert_eq!(hits(&tree, 4), vec![0, 1]);
        assert_eq!(hits(&tree, 7), vec![1, 2]);
        assert_eq!(hits(&tree, 10), vec![3]);
        assert_eq!(hits(&tree, 11), Vec::<u32>::new());
    }

    #[test]
    fn stays_balanced_under_sorted_insertion() {
        let mut tree = IntervalTree::new();
        for i in 0..1024i64 {
            tree.insert(i, i + 1, i as u32);
        }
        let root = tree.root.expect("tree has a root");
        assert!(tree.nodes[root].height <= 12);
        assert_eq!(hits(&tree, 512), vec![511, 512]);
    }

    #[test]
    fn duplicate_intervals_all_enumerate() {
        let mut tree = IntervalTree::new();
        tree.insert(2, 4, 7);
        tree.insert(2, 4, 8);
        tree.insert(2, 4, 9);
        assert_eq!(hits(&tree, 3).len(), 3);
    }
}
