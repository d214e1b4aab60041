use petgraph::{Graph, Undirected};
use serde::Serialize;

/// Which end of a pipe a PipeEnd node sits at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum PipeEnd {
    Start,
    End,
}

/// Identifies a node in the elevation graph independently of its index. The
/// ordering is used to visit neighbours in a fixed order, so that repeated
/// runs over the same network always walk the graph the same way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum NodeKey {
    /// A manhole, shared by every pipe connected to it
    Manhole(String),
    /// The point where a pipe meets its manhole
    PipeEnd(String, PipeEnd),
    /// The nth measurement along a pipe, in order of distance from manhole1
    Measurement(String, usize),
}

/// Sets the data which will be stored as weights in the petgraph graph
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeData {
    pub key: NodeKey,
    pub elevation: f64,
}

/// Container for edge metadata. Edges bridging two sinks don't belong to a
/// pipe and have no length.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeData {
    pub pipe: Option<String>,
    pub length: f64,
}

pub type NetworkGraph = Graph<NodeData, EdgeData, Undirected, u32>;
