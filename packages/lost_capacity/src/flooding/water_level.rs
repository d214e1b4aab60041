//! Determine the level of standing water at every point of a sewer network.
//!
//! Starting from the sink, water is poured into the network. Everything
//! lower than the current water level is submerged. Where the bottom of the
//! pipe rises to at least the water level, we walk further up for as long as
//! the pipe keeps climbing; those points stay dry. As soon as the pipe starts
//! going down again we have found a peak, and the area beyond it fills up to
//! the level of that peak. Peaks are processed from the lowest upwards.

use crate::loading::structs::{NetworkGraph, NodeData};
use petgraph::graph::NodeIndex;
use rustc_hash::FxHashSet;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use tracing::debug;

/// Water level for every node in a graph. Nodes which couldn't be reached
/// from the sink have no level, this is not the same as not being flooded.
#[derive(Debug, Clone, PartialEq)]
pub struct WaterLevels {
    levels: Vec<Option<f64>>,
}

impl WaterLevels {
    pub fn get(&self, inx: NodeIndex) -> Option<f64> {
        self.levels.get(inx.index()).copied().flatten()
    }

    /// Depth of standing water above the bottom of the pipe at a node
    pub fn depth(&self, graph: &NetworkGraph, inx: NodeIndex) -> Option<f64> {
        self.get(inx).map(|level| level - graph[inx].elevation)
    }

    /// Number of nodes for which a level was determined
    pub fn computed_count(&self) -> usize {
        self.levels.iter().filter(|level| level.is_some()).count()
    }
}

/// A region which water spills into once it flows over a peak. Ordered by
/// level, ties are settled by node index to keep runs reproducible.
#[derive(Debug, Clone, Copy)]
struct Spill {
    level: f64,
    node: NodeIndex,
}

impl Ord for Spill {
    fn cmp(&self, other: &Self) -> Ordering {
        self.level
            .total_cmp(&other.level)
            .then_with(|| self.node.cmp(&other.node))
    }
}

impl PartialOrd for Spill {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Spill {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Spill {}

/// Neighbours of a node, in order of their keys
fn sorted_neighbours(graph: &NetworkGraph, inx: NodeIndex) -> Vec<NodeIndex> {
    let mut neighbours: Vec<NodeIndex> = graph.neighbors(inx).collect();
    neighbours.sort_by(|a, b| graph[*a].key.cmp(&graph[*b].key));
    neighbours.dedup();
    neighbours
}

/// Depth-first search from start, which only continues along an edge while
/// condition(parent, child) holds. Nodes in visited are skipped entirely.
/// The start node is tested against itself.
///
/// Returns the nodes which satisfied the condition, and the (parent, child)
/// edges along which it didn't. An edge is only returned if its child wasn't
/// reached along some other route.
fn explore(
    graph: &NetworkGraph,
    start: NodeIndex,
    visited: &FxHashSet<NodeIndex>,
    condition: impl Fn(&NodeData, &NodeData) -> bool,
) -> (Vec<NodeIndex>, Vec<(NodeIndex, NodeIndex)>) {
    let mut reached = FxHashSet::<NodeIndex>::default();
    let mut satisfied = Vec::<NodeIndex>::new();
    let mut border = Vec::<(NodeIndex, NodeIndex)>::new();
    let mut stack = Vec::<NodeIndex>::new();

    let mut check = |parent: NodeIndex,
                     child: NodeIndex,
                     reached: &mut FxHashSet<NodeIndex>,
                     stack: &mut Vec<NodeIndex>| {
        if visited.contains(&child) || reached.contains(&child) {
            return;
        }
        if condition(&graph[parent], &graph[child]) {
            reached.insert(child);
            satisfied.push(child);
            stack.push(child);
        } else {
            border.push((parent, child));
        }
    };

    check(start, start, &mut reached, &mut stack);

    while let Some(parent) = stack.pop() {
        for child in sorted_neighbours(graph, parent) {
            check(parent, child, &mut reached, &mut stack);
        }
    }

    border.retain(|(_, child)| !reached.contains(child));

    (satisfied, border)
}

/// Mutable state shared by the submerge and ascend phases
struct FloodState<'a> {
    graph: &'a NetworkGraph,
    visited: FxHashSet<NodeIndex>,
    levels: Vec<Option<f64>>,
    queue: BinaryHeap<Reverse<Spill>>,
}

impl<'a> FloodState<'a> {
    fn new(graph: &'a NetworkGraph) -> FloodState<'a> {
        FloodState {
            graph,
            visited: FxHashSet::default(),
            levels: vec![None; graph.node_count()],
            queue: BinaryHeap::new(),
        }
    }

    fn set_level(&mut self, inx: NodeIndex, level: f64) {
        self.levels[inx.index()] = Some(level);
    }

    /// Pour water in at the spill point. Every node lower than the spill
    /// level which can be reached from it ends up under water. Where the
    /// network rises to meet the water level we've hit the shore, and the
    /// search continues uphill from there.
    fn submerge(&mut self, spill: Spill) {
        let (under_water, shores) =
            explore(self.graph, spill.node, &self.visited, |_, child| {
                child.elevation < spill.level
            });

        for inx in under_water {
            self.visited.insert(inx);
            self.set_level(inx, spill.level);
        }

        for (_, shore) in shores {
            self.ascend(shore);
        }
    }

    /// Walk uphill from the shore, these nodes are all above water. Once the
    /// network starts going down again, the water which spills over the peak
    /// fills up whatever lies beyond it to the level of the peak.
    fn ascend(&mut self, shore: NodeIndex) {
        let (going_up, peaks) =
            explore(self.graph, shore, &self.visited, |parent, child| {
                child.elevation >= parent.elevation
            });

        for inx in going_up {
            self.visited.insert(inx);
            self.set_level(inx, self.graph[inx].elevation);
        }

        for (peak_from, peak_to) in peaks {
            let peak_level = self.graph[peak_from].elevation;
            self.set_level(peak_from, peak_level);
            self.queue.push(Reverse(Spill {
                level: peak_level,
                node: peak_to,
            }));
        }
    }
}

/// Flood the network from the sink, and return the water level at every node.
/// The graph itself is not modified, so repeated calls give identical
/// results.
pub fn compute_water_levels(
    graph: &NetworkGraph,
    sink: NodeIndex,
) -> WaterLevels {
    let mut state = FloodState::new(graph);

    state.queue.push(Reverse(Spill {
        level: graph[sink].elevation,
        node: sink,
    }));

    while let Some(Reverse(spill)) = state.queue.pop() {
        state.submerge(spill);
    }

    let levels = WaterLevels {
        levels: state.levels,
    };

    debug!(
        "Water level determined for {} of {} nodes",
        levels.computed_count(),
        graph.node_count()
    );

    levels
}
