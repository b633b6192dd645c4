//! Level scheduling of a body tree
//!
//! Bodies are grouped into ordered levels so that every body in a level
//! only depends on results from earlier levels. Non-branching chains are
//! folded into a single unit of work: the body where the chain starts plus
//! its single-child ancestors ("climbers"), processed serially by one
//! worker.
//!
//! # Example
//!
//! ```text
//! root ─ b1 ┬ b2
//!           └ b3 ─ b4 ─ b5 ┬ b6
//!                          └ b7 ┬ b8
//!                               └ b9
//!
//! levels: [b2, b6, b8, b9]  [b7]  [b5 ← b4 ← b3]  [b1]
//! ```

use crate::body::BodyId;
use std::collections::HashSet;

/// Parent/child structure a schedule is computed from
pub trait Topology {
    fn parent(&self, id: BodyId) -> Option<BodyId>;
    fn children(&self, id: BodyId) -> &[BodyId];
}

/// A body and the single-child ancestors folded into it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOfWork {
    pub body: BodyId,
    /// Nearest ancestor first
    pub climbers: Vec<BodyId>,
}

impl UnitOfWork {
    /// Children before parents
    pub fn bottom_up(&self) -> impl Iterator<Item = BodyId> + '_ {
        std::iter::once(self.body).chain(self.climbers.iter().copied())
    }

    /// Parents before children
    pub fn top_down(&self) -> impl Iterator<Item = BodyId> + '_ {
        self.climbers
            .iter()
            .rev()
            .copied()
            .chain(std::iter::once(self.body))
    }

    pub fn len(&self) -> usize {
        1 + self.climbers.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Work units with no mutual dependency
pub type Level = Vec<UnitOfWork>;

/// Levels of the tree below `root`, leaves first. The root itself is
/// never part of a level.
pub fn levels<T: Topology + ?Sized>(topology: &T, root: BodyId) -> Vec<Level> {
    let mut result = Vec::new();
    let mut visited: HashSet<BodyId> = HashSet::new();
    let mut remaining = leaves(topology, root);

    while !remaining.is_empty() {
        let mut level: Level = Vec::new();
        let mut finished = Vec::new();
        let mut next = Vec::new();

        for start in remaining {
            if visited.contains(&start)
                || !topology.children(start).iter().all(|c| visited.contains(c))
            {
                continue;
            }

            let mut top = start;
            let mut climbers = Vec::new();
            while let Some(parent) = topology.parent(top) {
                if topology.children(parent).len() != 1 {
                    break;
                }
                top = parent;
                finished.push(parent);
                if parent != root {
                    climbers.push(parent);
                }
            }

            if start != root {
                finished.push(start);
                level.push(UnitOfWork {
                    body: start,
                    climbers,
                });
            }
            if let Some(parent) = topology.parent(top) {
                next.push(parent);
            }
        }

        // Nothing from this level counts as done until the level is closed,
        // otherwise a parent could join the level of its own climbers.
        visited.extend(finished);
        if !level.is_empty() {
            result.push(level);
        }
        remaining = dedup(next);
    }

    result
}

fn leaves<T: Topology + ?Sized>(topology: &T, root: BodyId) -> Vec<BodyId> {
    let mut leaves = Vec::new();
    let mut stack: Vec<BodyId> = topology.children(root).iter().rev().copied().collect();
    while let Some(id) = stack.pop() {
        let children = topology.children(id);
        if children.is_empty() {
            leaves.push(id);
        } else {
            stack.extend(children.iter().rev().copied());
        }
    }
    leaves
}

fn dedup(ids: Vec<BodyId>) -> Vec<BodyId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// Traversal orders for a whole world: every root and the merged levels of
/// the trees hanging from them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    roots: Vec<BodyId>,
    levels: Vec<Level>,
}

impl Schedule {
    /// Merge the levels of several independent trees index by index
    pub fn build<T: Topology + ?Sized>(topology: &T, roots: &[BodyId]) -> Self {
        let mut merged: Vec<Level> = Vec::new();
        for &root in roots {
            for (depth, level) in levels(topology, root).into_iter().enumerate() {
                if merged.len() <= depth {
                    merged.push(Vec::new());
                }
                merged[depth].extend(level);
            }
        }
        Self {
            roots: roots.to_vec(),
            levels: merged,
        }
    }

    pub fn roots(&self) -> &[BodyId] {
        &self.roots
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Every scheduled body, children before parents, roots last
    pub fn bottom_up(&self) -> Vec<BodyId> {
        self.levels
            .iter()
            .flat_map(|level| level.iter().flat_map(UnitOfWork::bottom_up))
            .chain(self.roots.iter().copied())
            .collect()
    }

    /// Every scheduled body, roots first, parents before children
    pub fn top_down(&self) -> Vec<BodyId> {
        self.roots
            .iter()
            .copied()
            .chain(
                self.levels
                    .iter()
                    .rev()
                    .flat_map(|level| level.iter().flat_map(UnitOfWork::top_down)),
            )
            .collect()
    }

    pub fn body_count(&self) -> usize {
        self.roots.len()
            + self
                .levels
                .iter()
                .flat_map(|level| level.iter().map(UnitOfWork::len))
                .sum::<usize>()
    }
}
