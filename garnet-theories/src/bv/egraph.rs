//! Union-Find with Merge Explanations for Slice Nodes.
//!
//! A small e-graph core specialised for the slicing layer: nodes are created
//! in an arena, unions carry a justification, and the spanning forest of
//! merge edges reconstructs the chain of justifications relating any two
//! equal nodes. One node per class may be designated its value node. All
//! operations roll back through marks, so scope pops are cheap.
//!
//! `find` does not path-compress; parent chains stay short because unions
//! are by size, and uncompressed chains make rollback a constant-time
//! pointer reset.

use rustc_hash::FxHashMap;

/// Index of a node in the arena.
pub type NodeId = u32;

#[derive(Debug)]
enum Undo {
    Union {
        child_root: NodeId,
        parent_root: NodeId,
        old_parent_value: Option<NodeId>,
    },
    SetValue {
        root: NodeId,
        prev: Option<NodeId>,
    },
}

/// Rollback mark.
#[derive(Debug, Clone, Copy)]
pub struct Mark {
    undo: usize,
}

/// The union-find with explanations.
#[derive(Debug)]
pub struct EGraph<J> {
    parent: Vec<NodeId>,
    size: Vec<u32>,
    /// Adjacency of the merge-edge forest: `(neighbor, edge index)`.
    adj: Vec<Vec<(NodeId, u32)>>,
    edges: Vec<(NodeId, NodeId, J)>,
    /// Valid at class roots.
    class_value: Vec<Option<NodeId>>,
    undo: Vec<Undo>,
}

impl<J> Default for EGraph<J> {
    fn default() -> Self {
        Self {
            parent: Vec::new(),
            size: Vec::new(),
            adj: Vec::new(),
            edges: Vec::new(),
            class_value: Vec::new(),
            undo: Vec::new(),
        }
    }
}

impl<J: Clone> EGraph<J> {
    /// Create an empty e-graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh singleton node.
    pub fn add_node(&mut self) -> NodeId {
        let id = self.parent.len() as NodeId;
        self.parent.push(id);
        self.size.push(1);
        self.adj.push(Vec::new());
        self.class_value.push(None);
        id
    }

    /// Drop the most recently allocated node. All unions touching it must
    /// have been rolled back first.
    pub fn pop_node(&mut self) {
        debug_assert!(self.adj.last().is_some_and(Vec::is_empty));
        self.parent.pop();
        self.size.pop();
        self.adj.pop();
        self.class_value.pop();
    }

    /// Number of nodes.
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.parent.len()
    }

    /// Class representative.
    #[must_use]
    pub fn find(&self, mut x: NodeId) -> NodeId {
        while self.parent[x as usize] != x {
            x = self.parent[x as usize];
        }
        x
    }

    /// Are two nodes in the same class?
    #[must_use]
    pub fn is_equal(&self, a: NodeId, b: NodeId) -> bool {
        self.find(a) == self.find(b)
    }

    /// Value node of the class of `x`, if any.
    #[must_use]
    pub fn class_value(&self, x: NodeId) -> Option<NodeId> {
        self.class_value[self.find(x) as usize]
    }

    /// Designate `n` as the value node of its class.
    pub fn set_value_node(&mut self, n: NodeId) {
        let root = self.find(n);
        let prev = self.class_value[root as usize];
        self.undo.push(Undo::SetValue { root, prev });
        self.class_value[root as usize] = Some(n);
    }

    /// Merge the classes of `a` and `b`, justified by `j`. Returns `false`
    /// when they were already equal (nothing recorded).
    pub fn union(&mut self, a: NodeId, b: NodeId, j: J) -> bool {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return false;
        }
        let (child, parent) = if self.size[ra as usize] <= self.size[rb as usize] {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.undo.push(Undo::Union {
            child_root: child,
            parent_root: parent,
            old_parent_value: self.class_value[parent as usize],
        });
        self.parent[child as usize] = parent;
        self.size[parent as usize] += self.size[child as usize];
        if self.class_value[parent as usize].is_none() {
            self.class_value[parent as usize] = self.class_value[child as usize];
        }
        let e = self.edges.len() as u32;
        self.edges.push((a, b, j));
        self.adj[a as usize].push((b, e));
        self.adj[b as usize].push((a, e));
        true
    }

    /// All members of the class of `x`, via the merge-edge forest.
    #[must_use]
    pub fn class_members(&self, x: NodeId) -> Vec<NodeId> {
        let mut out = vec![x];
        let mut seen: FxHashMap<NodeId, ()> = FxHashMap::default();
        seen.insert(x, ());
        let mut stack = vec![x];
        while let Some(n) = stack.pop() {
            for &(m, _) in &self.adj[n as usize] {
                if seen.insert(m, ()).is_none() {
                    out.push(m);
                    stack.push(m);
                }
            }
        }
        out
    }

    /// Justifications along the unique forest path from `a` to `b`.
    /// `a` and `b` must be in the same class.
    #[must_use]
    pub fn explain(&self, a: NodeId, b: NodeId) -> Vec<J> {
        debug_assert!(self.is_equal(a, b));
        if a == b {
            return Vec::new();
        }
        // BFS for the path in the edge forest
        let mut prev: FxHashMap<NodeId, (NodeId, u32)> = FxHashMap::default();
        let mut queue = std::collections::VecDeque::from([a]);
        prev.insert(a, (a, u32::MAX));
        'search: while let Some(n) = queue.pop_front() {
            for &(m, e) in &self.adj[n as usize] {
                if prev.contains_key(&m) {
                    continue;
                }
                prev.insert(m, (n, e));
                if m == b {
                    break 'search;
                }
                queue.push_back(m);
            }
        }
        let mut out = Vec::new();
        let mut at = b;
        while at != a {
            let (from, e) = prev[&at];
            out.push(self.edges[e as usize].2.clone());
            at = from;
        }
        out.reverse();
        out
    }

    /// Current rollback mark.
    #[must_use]
    pub fn mark(&self) -> Mark {
        Mark {
            undo: self.undo.len(),
        }
    }

    /// Roll back unions and value designations to a mark.
    pub fn undo_to(&mut self, mark: Mark) {
        while self.undo.len() > mark.undo {
            match self.undo.pop().expect("undo entry") {
                Undo::Union {
                    child_root,
                    parent_root,
                    old_parent_value,
                } => {
                    self.parent[child_root as usize] = child_root;
                    self.size[parent_root as usize] -= self.size[child_root as usize];
                    self.class_value[parent_root as usize] = old_parent_value;
                    let (a, b, _) = self.edges.pop().expect("edge for union");
                    self.adj[a as usize].pop();
                    self.adj[b as usize].pop();
                }
                Undo::SetValue { root, prev } => {
                    self.class_value[root as usize] = prev;
                }
            }
        }
    }
}
