//! Call-history and function graph: the per-thread call tree
//! (`FunGraph`/`FunGraphNode`) and the per-level timeline of call-history cells
//! (`CallHistory`/`BlockGraph`), keyed by a level-indexed `stack_graphs` vector plus
//! a monotonic `fts` counter.

use std::collections::BTreeMap;

use crate::timestamp::{Fts, Nts};

/// One node in a thread's call tree. Identity is `(parent_id, function_address)`:
/// revisiting the same child under the same parent increments `count` rather than
/// allocating a new node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunGraphNode {
    pub id: usize,
    pub parent_id: isize,
    pub address: u32,
    pub count: u32,
    pub duration: u64,
    /// Ordered by first-call order, not address: a dump visits children in
    /// insertion order.
    children: Vec<(u32, usize)>,
}

impl FunGraphNode {
    #[must_use]
    pub fn children(&self) -> impl Iterator<Item = (u32, usize)> + '_ {
        self.children.iter().copied()
    }
}

/// A thread's call tree. Node `0` is the synthetic root (`id=0, parent_id=-1`).
pub struct FunGraph {
    nodes: Vec<FunGraphNode>,
}

impl Default for FunGraph {
    fn default() -> Self {
        Self { nodes: vec![FunGraphNode { id: 0, parent_id: -1, address: 0, count: 1, duration: 0, children: Vec::new() }] }
    }
}

impl FunGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub const ROOT: usize = 0;

    #[must_use]
    pub fn node(&self, id: usize) -> &FunGraphNode {
        &self.nodes[id]
    }

    /// Adds (or revisits) a child `address` under `parent_id`, returning its node id.
    pub fn add_node(&mut self, address: u32, parent_id: usize) -> usize {
        if let Some(&(_, existing_id)) = self.nodes[parent_id].children.iter().find(|&&(a, _)| a == address) {
            self.nodes[existing_id].count += 1;
            return existing_id;
        }

        let new_id = self.nodes.len();
        self.nodes.push(FunGraphNode {
            id: new_id,
            parent_id: parent_id as isize,
            address,
            count: 1,
            duration: 0,
            children: Vec::new(),
        });
        self.nodes[parent_id].children.push((address, new_id));
        new_id
    }
}

// -------------------------------------------------------------------------------------------------

/// One call-history cell: `{ address, start_ts, stop_ts, fts, fts_stop,
/// text }`. `start_ts`/`stop_ts` are `nts` values (per-instruction record index);
/// `fts`/`fts_stop` are the per-call counter advanced by [`CallHistory::add_block`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockGraph {
    pub address: u32,
    pub start_ts: Nts,
    pub stop_ts: Nts,
    pub fts: Fts,
    pub fts_stop: Fts,
    pub text: String,
}

/// A lazily-grown vector of per-level ordered maps (keyed by `start_ts`), one level
/// per call-stack depth, plus the monotonic `fts` call counter.
#[derive(Default)]
pub struct CallHistory {
    stack_graphs: Vec<BTreeMap<Nts, BlockGraph>>,
    fts: Fts,
}

impl CallHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_level(&mut self, level: usize) -> &mut BTreeMap<Nts, BlockGraph> {
        if self.stack_graphs.len() <= level {
            self.stack_graphs.resize_with(level + 1, BTreeMap::new);
        }
        &mut self.stack_graphs[level]
    }

    /// Opens a new call-history cell at `level`, stamping it with the current `fts`
    /// and advancing the counter.
    pub fn add_block(&mut self, level: usize, nts: Nts, address: u32, text: impl Into<String>) {
        let fts = self.fts.post_increment();
        self.ensure_level(level)
            .insert(nts, BlockGraph { address, start_ts: nts, stop_ts: nts.next(), fts, fts_stop: fts, text: text.into() });
    }

    /// Closes the most recently opened cell at `level`.
    pub fn end_block(&mut self, level: usize, nts: Nts) {
        let fts = self.fts;
        if let Some(level_map) = self.stack_graphs.get_mut(level) {
            if let Some((_, last)) = level_map.iter_mut().next_back() {
                last.stop_ts = nts;
                last.fts_stop = fts;
            }
        }
    }

    /// Records a level-0 marker (e.g. a thread-name change). Coalesces a run of
    /// identical consecutive texts into one cell.
    pub fn add_marker(&mut self, nts: Nts, text: impl Into<String>) {
        let text = text.into();
        let level0 = self.ensure_level(0);
        if let Some((_, last)) = level0.iter_mut().next_back() {
            if last.text == text {
                last.stop_ts = nts;
                return;
            }
        }
        let fts = self.fts.post_increment();
        level0.insert(nts, BlockGraph { address: 0, start_ts: nts, stop_ts: nts, fts, fts_stop: fts, text });
    }

    /// Closes every open cell at every level up to `depth`, on parser shutdown.
    pub fn stop_all(&mut self, depth: usize, nts: Nts) {
        for level in 0..depth.min(self.stack_graphs.len()) {
            self.end_block(level, nts);
        }
    }

    #[must_use]
    pub fn level_map(&self, level: usize) -> Option<&BTreeMap<Nts, BlockGraph>> {
        self.stack_graphs.get(level)
    }

    #[must_use]
    pub fn fts(&self) -> u64 {
        self.fts.get()
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revisiting_same_child_increments_count_not_node_count() {
        let mut g = FunGraph::new();
        let a = g.add_node(0x1000, FunGraph::ROOT);
        let b = g.add_node(0x1000, FunGraph::ROOT);
        assert_eq!(a, b);
        assert_eq!(g.node(a).count, 2);
    }

    #[test]
    fn children_preserve_first_call_order() {
        let mut g = FunGraph::new();
        g.add_node(0x2000, FunGraph::ROOT);
        g.add_node(0x1000, FunGraph::ROOT);
        g.add_node(0x2000, FunGraph::ROOT);
        let order: Vec<u32> = g.node(FunGraph::ROOT).children().map(|(a, _)| a).collect();
        assert_eq!(order, vec![0x2000, 0x1000]);
    }

    #[test]
    fn add_block_advances_fts_and_end_block_stamps_stop() {
        let mut h = CallHistory::new();
        h.add_block(0, Nts::from(10), 0x1000, "enter foo");
        assert_eq!(h.fts(), 1);
        h.end_block(0, Nts::from(20));
        let cell = h.level_map(0).unwrap().get(&Nts::from(10)).unwrap();
        assert_eq!(cell.stop_ts, Nts::from(20));
        assert_eq!(cell.fts_stop, Fts::from(1));
    }

    #[test]
    fn markers_coalesce_identical_consecutive_text() {
        let mut h = CallHistory::new();
        h.add_marker(Nts::from(5), "idle1");
        h.add_marker(Nts::from(10), "idle1");
        h.add_marker(Nts::from(15), "SceIoAsync");
        let level0 = h.level_map(0).unwrap();
        assert_eq!(level0.len(), 2);
        assert_eq!(level0.get(&Nts::from(5)).unwrap().stop_ts, Nts::from(10));
    }
}
