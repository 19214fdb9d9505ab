use std::collections::BTreeSet;
use std::ops::RangeInclusive;

/// Static segment tree answering "which intervals contain this point?"
///
/// The tree is built once from a fixed set of closed intervals. Queries are only meaningful for
/// points that are endpoints of some interval in the set (the elementary intervals are exactly
/// the endpoints), which is always the case for the jump intervals this is used for.
///
/// Intervals get cloned once per node on which they get stored, so prefer storing references.
#[derive(Debug)]
pub struct SegmentTree<I: Interval + Clone>(Option<SegmentNode<I>>);

impl<I: Interval + Clone> SegmentTree<I> {
    /// Make a new segment tree containing all the specified intervals
    pub fn new(intervals: Vec<I>) -> SegmentTree<I> {
        let endpoints: Vec<I::Endpoint> = intervals
            .iter()
            .flat_map(|interval| [interval.from(), interval.until()])
            .collect::<BTreeSet<I::Endpoint>>()
            .into_iter()
            .collect();

        if endpoints.is_empty() {
            return SegmentTree(None);
        }

        let mut tree = SegmentTree(Some(SegmentNode::build_empty(&endpoints)));
        for interval in intervals {
            tree.insert(interval);
        }
        tree
    }

    /// Find all intervals containing the specified point
    pub fn intervals_containing(&self, point: &I::Endpoint) -> Vec<&I> {
        let mut node = match self.0.as_ref() {
            Some(root) if root.contains(point) => root,
            _ => return vec![],
        };

        let mut containing_intervals: Vec<&I> = vec![];
        loop {
            // Every interval stored on a node on the path down contains the point
            containing_intervals.extend(node.intervals());

            match node {
                SegmentNode::Inner {
                    left_child,
                    right_child,
                    ..
                } => {
                    if left_child.contains(point) {
                        node = left_child;
                    } else if right_child.contains(point) {
                        node = right_child;
                    } else {
                        break;
                    }
                }
                SegmentNode::Leaf { .. } => break,
            }
        }

        containing_intervals
    }

    /// Insert an interval whose endpoints are already elementary intervals of the tree
    fn insert(&mut self, interval: I) {
        let mut to_visit: Vec<&mut SegmentNode<I>> = self.0.iter_mut().collect();

        while let Some(node) = to_visit.pop() {
            if node.contained_in(&interval) {
                node.intervals_mut().push(interval.clone());
                continue;
            }

            if let SegmentNode::Inner {
                left_child,
                right_child,
                ..
            } = node
            {
                if left_child.overlaps(&interval) {
                    to_visit.push(left_child);
                }
                if right_child.overlaps(&interval) {
                    to_visit.push(right_child);
                }
            }
        }
    }
}

#[derive(Debug)]
enum SegmentNode<I: Interval> {
    Leaf {
        endpoint: I::Endpoint,
        intervals: Vec<I>,
    },
    Inner {
        /// Start of the segment (inclusive)
        from: I::Endpoint,

        /// End of the segment (inclusive)
        until: I::Endpoint,

        left_child: Box<SegmentNode<I>>,
        right_child: Box<SegmentNode<I>>,
        intervals: Vec<I>,
    },
}

impl<I: Interval> SegmentNode<I> {
    fn build_empty(endpoints: &[I::Endpoint]) -> SegmentNode<I> {
        if let [endpoint] = endpoints {
            return SegmentNode::Leaf {
                endpoint: *endpoint,
                intervals: vec![],
            };
        }

        let (left_endpoints, right_endpoints) = endpoints.split_at(endpoints.len() / 2);
        SegmentNode::Inner {
            from: endpoints[0],
            until: endpoints[endpoints.len() - 1],
            left_child: Box::new(Self::build_empty(left_endpoints)),
            right_child: Box::new(Self::build_empty(right_endpoints)),
            intervals: vec![],
        }
    }

    fn from(&self) -> I::Endpoint {
        match self {
            SegmentNode::Leaf { endpoint, .. } => *endpoint,
            SegmentNode::Inner { from, .. } => *from,
        }
    }

    fn until(&self) -> I::Endpoint {
        match self {
            SegmentNode::Leaf { endpoint, .. } => *endpoint,
            SegmentNode::Inner { until, .. } => *until,
        }
    }

    fn contains(&self, point: &I::Endpoint) -> bool {
        self.from() <= *point && *point <= self.until()
    }

    fn contained_in(&self, other: &I) -> bool {
        other.from() <= self.from() && self.until() <= other.until()
    }

    fn overlaps(&self, other: &I) -> bool {
        other.from() <= self.until() && self.from() <= other.until()
    }

    fn intervals(&self) -> &[I] {
        match self {
            SegmentNode::Leaf { intervals, .. } | SegmentNode::Inner { intervals, .. } => {
                intervals
            }
        }
    }

    fn intervals_mut(&mut self) -> &mut Vec<I> {
        match self {
            SegmentNode::Leaf { intervals, .. } | SegmentNode::Inner { intervals, .. } => {
                intervals
            }
        }
    }
}

/// Closed interval
pub trait Interval {
    type Endpoint: Ord + Copy + std::fmt::Debug;

    /// Start of the interval (inclusive)
    fn from(&self) -> Self::Endpoint;

    /// End of the interval (inclusive)
    fn until(&self) -> Self::Endpoint;
}

impl<I: Interval> Interval for &I {
    type Endpoint = I::Endpoint;

    fn from(&self) -> Self::Endpoint {
        Interval::from(*self)
    }

    fn until(&self) -> Self::Endpoint {
        Interval::until(*self)
    }
}

impl<Idx: Copy + Ord + std::fmt::Debug> Interval for RangeInclusive<Idx> {
    type Endpoint = Idx;

    fn from(&self) -> Idx {
        *self.start()
    }

    fn until(&self) -> Idx {
        *self.end()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    fn containing(tree: &SegmentTree<RangeInclusive<u32>>, point: u32) -> HashSet<RangeInclusive<u32>> {
        tree.intervals_containing(&point)
            .into_iter()
            .cloned()
            .collect()
    }

    #[test]
    fn empty_tree() {
        let tree: SegmentTree<RangeInclusive<u32>> = SegmentTree::new(vec![]);
        assert!(containing(&tree, 0).is_empty());
        assert!(containing(&tree, 7).is_empty());
    }

    #[test]
    fn nested_jump_spans() {
        let tree = SegmentTree::new(vec![0..=30, 3..=9, 9..=20, 20..=20]);
        assert_eq!(containing(&tree, 0), HashSet::from([0..=30]));
        assert_eq!(containing(&tree, 3), HashSet::from([0..=30, 3..=9]));
        assert_eq!(containing(&tree, 9), HashSet::from([0..=30, 3..=9, 9..=20]));
        assert_eq!(containing(&tree, 20), HashSet::from([0..=30, 9..=20, 20..=20]));
        assert_eq!(containing(&tree, 30), HashSet::from([0..=30]));
        assert!(containing(&tree, 31).is_empty(), "point past every interval");
    }
}
