//! Decision tree nodes.

use serde::{Deserialize, Serialize};

use crate::data::Instance;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Leaf {
        label: i32,
    },
    /// `values[attr] < split` goes left.
    Numerical {
        attr: usize,
        split: f64,
        lo: Box<Node>,
        hi: Box<Node>,
    },
}

impl Node {
    pub fn leaf(label: i32) -> Self {
        Node::Leaf { label }
    }

    /// Predicted label. Instances missing the split attribute take the
    /// high branch.
    pub fn classify(&self, instance: &Instance) -> i32 {
        let mut node = self;
        loop {
            match node {
                Node::Leaf { label } => return *label,
                Node::Numerical { attr, split, lo, hi } => {
                    node = match instance.values.get(*attr) {
                        Some(v) if v < split => lo.as_ref(),
                        _ => hi.as_ref(),
                    };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            Node::Leaf { .. } => 1,
            Node::Numerical { lo, hi, .. } => 1 + lo.depth().max(hi.depth()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_walks_splits() {
        let tree = Node::Numerical {
            attr: 1,
            split: 0.5,
            lo: Box::new(Node::leaf(7)),
            hi: Box::new(Node::Numerical {
                attr: 0,
                split: 10.0,
                lo: Box::new(Node::leaf(8)),
                hi: Box::new(Node::leaf(9)),
            }),
        };
        assert_eq!(tree.classify(&Instance::new(vec![0.0, 0.1])), 7);
        assert_eq!(tree.classify(&Instance::new(vec![3.0, 0.9])), 8);
        assert_eq!(tree.classify(&Instance::new(vec![30.0, 0.9])), 9);
        assert_eq!(tree.classify(&Instance::new(vec![])), 9);
        assert_eq!(tree.depth(), 3);
    }
}
