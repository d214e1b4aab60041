use crate::common::error::{LostCapacityError, Result};
use crate::common::network_data::{Manhole, Measurement, Pipe};
use crate::loading::structs::{
    EdgeData, NetworkGraph, NodeData, NodeKey, PipeEnd,
};
use petgraph::graph::NodeIndex;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

/// The elevation graph for a single network, along with a lookup from node
/// keys to their index in the graph and the node which water drains from
#[derive(Debug, Clone)]
pub struct ElevationGraph {
    pub graph: NetworkGraph,
    pub index: FxHashMap<NodeKey, NodeIndex>,
    pub sink: NodeIndex,
}

/// Manholes are placed in the graph at the level of the lowest pipe which
/// connects to them. Returns a mapping of manhole code to that level.
pub fn get_manhole_bobs(
    pipes: &FxHashMap<String, Pipe>,
) -> FxHashMap<String, f64> {
    let mut manhole_bobs = FxHashMap::<String, f64>::default();

    for pipe in pipes.values() {
        for (code, bob) in
            [(&pipe.manhole1, pipe.bob1), (&pipe.manhole2, pipe.bob2)]
        {
            manhole_bobs
                .entry(code.clone())
                .and_modify(|cur| *cur = cur.min(bob))
                .or_insert(bob);
        }
    }

    manhole_bobs
}

/// Fetch the index of the node with the provided key, adding it to the graph
/// first if it isn't there yet
fn get_or_add_node(
    graph: &mut NetworkGraph,
    index: &mut FxHashMap<NodeKey, NodeIndex>,
    key: NodeKey,
    elevation: f64,
) -> NodeIndex {
    if let Some(inx) = index.get(&key) {
        return *inx;
    }
    let inx = graph.add_node(NodeData {
        key: key.clone(),
        elevation,
    });
    index.insert(key, inx);
    inx
}

/// Based on the provided manholes, pipes and (resolved) measurements,
/// generate a petgraph graph in which every pipe is represented as a chain
/// of nodes running from one manhole to the other:
///
/// manhole1 -> pipe start -> measurements... -> pipe end -> manhole2
///
/// Measurements for each pipe must be sorted by distance from manhole1.
/// Pipes are added in order of their code, so that node indexes are
/// reproducible across runs.
pub fn create_graph(
    manholes: &FxHashMap<String, Manhole>,
    pipes: &FxHashMap<String, Pipe>,
    measurements: &FxHashMap<String, Vec<Measurement>>,
) -> Result<(NetworkGraph, FxHashMap<NodeKey, NodeIndex>)> {
    for code in measurements.keys() {
        if !pipes.contains_key(code) {
            return Err(LostCapacityError::UnknownPipe { pipe: code.clone() });
        }
    }

    let mut graph = NetworkGraph::default();
    let mut index = FxHashMap::<NodeKey, NodeIndex>::default();

    let manhole_bobs = get_manhole_bobs(pipes);

    let mut codes: Vec<&String> = pipes.keys().collect();
    codes.sort();

    for code in codes {
        let pipe = &pipes[code];
        let length = pipe.length(manholes)?;

        // Each point along the pipe, with its elevation and distance from
        // manhole1
        let mut points = Vec::<(NodeKey, f64, f64)>::new();
        points.push((
            NodeKey::Manhole(pipe.manhole1.clone()),
            manhole_bobs[&pipe.manhole1],
            0.0,
        ));
        points.push((
            NodeKey::PipeEnd(code.clone(), PipeEnd::Start),
            pipe.bob1,
            0.0,
        ));
        if let Some(pipe_measurements) = measurements.get(code) {
            for (inx, meas) in pipe_measurements.iter().enumerate() {
                points.push((
                    NodeKey::Measurement(code.clone(), inx),
                    meas.bob,
                    meas.distance,
                ));
            }
        }
        points.push((
            NodeKey::PipeEnd(code.clone(), PipeEnd::End),
            pipe.bob2,
            length,
        ));
        points.push((
            NodeKey::Manhole(pipe.manhole2.clone()),
            manhole_bobs[&pipe.manhole2],
            length,
        ));

        let mut previous: Option<(NodeIndex, f64)> = None;
        for (key, elevation, distance) in points {
            let inx = get_or_add_node(&mut graph, &mut index, key, elevation);
            if let Some((prev_inx, prev_distance)) = previous {
                graph.add_edge(
                    prev_inx,
                    inx,
                    EdgeData {
                        pipe: Some(code.clone()),
                        length: (distance - prev_distance).abs(),
                    },
                );
            }
            previous = Some((inx, distance));
        }
    }

    debug!(
        "Created graph with {} nodes and {} edges",
        graph.node_count(),
        graph.edge_count()
    );

    Ok((graph, index))
}

/// Determine which node water drains from. If more than one manhole has been
/// flagged as a sink, the lowest one is selected (falling back to the lowest
/// code if there's a tie) and all others are connected to it directly. This
/// acts as if there's an extra pipe between the different sinks, so that
/// the water levels only need to be computed once.
pub fn tag_sink_node(
    manholes: &FxHashMap<String, Manhole>,
    graph: &mut NetworkGraph,
    index: &FxHashMap<NodeKey, NodeIndex>,
) -> Result<NodeIndex> {
    let mut sinks = Vec::<(&String, NodeIndex, f64)>::new();

    for (code, manhole) in manholes.iter() {
        if !manhole.is_sink {
            continue;
        }
        match index.get(&NodeKey::Manhole(code.clone())) {
            Some(inx) => sinks.push((code, *inx, graph[*inx].elevation)),
            None => {
                warn!("Sink {} is not connected to any pipe, ignoring", code)
            }
        }
    }

    sinks.sort_by(|a, b| a.2.total_cmp(&b.2).then_with(|| a.0.cmp(b.0)));

    let (sink_code, sink_inx, _) = match sinks.first() {
        Some(sink) => *sink,
        None => return Err(LostCapacityError::NoSink),
    };

    for (_, other_inx, _) in sinks.iter().skip(1) {
        graph.add_edge(
            sink_inx,
            *other_inx,
            EdgeData {
                pipe: None,
                length: 0.0,
            },
        );
    }

    info!("Using manhole {} as sink ({} flagged)", sink_code, sinks.len());

    Ok(sink_inx)
}

/// Create the elevation graph for a network and determine its sink
pub fn build_graph(
    manholes: &FxHashMap<String, Manhole>,
    pipes: &FxHashMap<String, Pipe>,
    measurements: &FxHashMap<String, Vec<Measurement>>,
) -> Result<ElevationGraph> {
    let (mut graph, index) = create_graph(manholes, pipes, measurements)?;
    let sink = tag_sink_node(manholes, &mut graph, &index)?;

    Ok(ElevationGraph { graph, index, sink })
}

#[cfg(test)]
pub mod tests {

    use super::*;
    use crate::common::network_data::CrossSection;

    pub fn get_test_manhole(code: &str, x: f64, is_sink: bool) -> Manhole {
        Manhole {
            code: code.to_string(),
            x,
            y: 0.0,
            is_sink,
            ground_level: None,
        }
    }

    pub fn get_test_pipe(
        code: &str,
        m1: &str,
        m2: &str,
        bob1: f64,
        bob2: f64,
    ) -> Pipe {
        Pipe {
            code: code.to_string(),
            manhole1: m1.to_string(),
            manhole2: m2.to_string(),
            bob1,
            bob2,
            cross_section: CrossSection::Circular { diameter: 1.0 },
        }
    }

    fn get_test_measurement(
        pipe: &str,
        distance: f64,
        bob: f64,
    ) -> Measurement {
        Measurement {
            pipe: pipe.to_string(),
            distance,
            bob,
            obb: bob + 1.0,
            x: distance,
            y: 0.0,
            is_virtual: false,
        }
    }

    /// M1 --P1-- M2 --P2-- M3, both pipes 10m long
    fn get_test_network(
        sinks: [bool; 3],
    ) -> (FxHashMap<String, Manhole>, FxHashMap<String, Pipe>) {
        let mut manholes = FxHashMap::default();
        for (inx, code) in ["M1", "M2", "M3"].iter().enumerate() {
            manholes.insert(
                code.to_string(),
                get_test_manhole(code, 10.0 * inx as f64, sinks[inx]),
            );
        }

        let mut pipes = FxHashMap::default();
        pipes.insert(
            "P1".to_string(),
            get_test_pipe("P1", "M1", "M2", 1.0, 1.5),
        );
        pipes.insert(
            "P2".to_string(),
            get_test_pipe("P2", "M2", "M3", 1.2, 2.0),
        );

        (manholes, pipes)
    }

    #[test]
    fn test_get_manhole_bobs() {
        let (_, pipes) = get_test_network([true, false, false]);

        let result = get_manhole_bobs(&pipes);

        assert_eq!(result["M1"], 1.0);
        assert_eq!(result["M2"], 1.2);
        assert_eq!(result["M3"], 2.0);
    }

    /// Pipes with no measurements connect their two ends directly
    #[test]
    fn test_create_graph_no_measurements() {
        let (manholes, pipes) = get_test_network([true, false, false]);

        let (graph, index) =
            create_graph(&manholes, &pipes, &FxHashMap::default()).unwrap();

        // 3 manholes, 2 ends for each pipe
        assert_eq!(graph.node_count(), 7);
        assert_eq!(graph.edge_count(), 6);

        let start = index[&NodeKey::PipeEnd("P1".to_string(), PipeEnd::Start)];
        let end = index[&NodeKey::PipeEnd("P1".to_string(), PipeEnd::End)];
        let edge = graph.find_edge(start, end).unwrap();
        assert_eq!(graph[edge].length, 10.0);
        assert_eq!(graph[edge].pipe, Some("P1".to_string()));
        assert_eq!(graph[end].elevation, 1.5);
    }

    #[test]
    fn test_create_graph_with_measurements() {
        let (manholes, pipes) = get_test_network([true, false, false]);
        let mut measurements = FxHashMap::default();
        measurements.insert(
            "P1".to_string(),
            vec![
                get_test_measurement("P1", 2.0, 1.1),
                get_test_measurement("P1", 6.0, 1.3),
            ],
        );

        let (graph, index) =
            create_graph(&manholes, &pipes, &measurements).unwrap();

        assert_eq!(graph.node_count(), 9);
        assert_eq!(graph.edge_count(), 8);

        let first = index[&NodeKey::Measurement("P1".to_string(), 0)];
        let second = index[&NodeKey::Measurement("P1".to_string(), 1)];
        assert_eq!(graph[first].elevation, 1.1);

        let mut neighbours: Vec<&NodeKey> =
            graph.neighbors(first).map(|inx| &graph[inx].key).collect();
        neighbours.sort();
        assert_eq!(
            neighbours,
            vec![
                &NodeKey::PipeEnd("P1".to_string(), PipeEnd::Start),
                &NodeKey::Measurement("P1".to_string(), 1),
            ]
        );

        let edge = graph.find_edge(first, second).unwrap();
        assert_eq!(graph[edge].length, 4.0);

        let total: f64 = graph
            .edge_references()
            .filter(|eref| eref.weight().pipe.as_deref() == Some("P1"))
            .map(|eref| eref.weight().length)
            .sum();
        assert_eq!(total, 10.0);
    }

    #[test]
    fn test_create_graph_unknown_pipe() {
        let (manholes, pipes) = get_test_network([true, false, false]);
        let mut measurements = FxHashMap::default();
        measurements.insert("P9".to_string(), Vec::new());

        let result = create_graph(&manholes, &pipes, &measurements);

        assert_eq!(
            result.err(),
            Some(LostCapacityError::UnknownPipe {
                pipe: "P9".to_string()
            })
        );
    }

    #[test]
    fn test_create_graph_unknown_manhole() {
        let (mut manholes, pipes) = get_test_network([true, false, false]);
        manholes.remove("M3");

        let result = create_graph(&manholes, &pipes, &FxHashMap::default());

        assert_eq!(
            result.err(),
            Some(LostCapacityError::UnknownManhole {
                pipe: "P2".to_string(),
                manhole: "M3".to_string()
            })
        );
    }

    #[test]
    fn test_tag_sink_node_none() {
        let (manholes, pipes) = get_test_network([false, false, false]);

        let result = build_graph(&manholes, &pipes, &FxHashMap::default());

        assert_eq!(result.err(), Some(LostCapacityError::NoSink));
    }

    #[test]
    fn test_tag_sink_node_single() {
        let (manholes, pipes) = get_test_network([false, false, true]);

        let result =
            build_graph(&manholes, &pipes, &FxHashMap::default()).unwrap();

        assert_eq!(
            result.graph[result.sink].key,
            NodeKey::Manhole("M3".to_string())
        );
        assert_eq!(result.graph.edge_count(), 6);
    }

    /// With several sinks the lowest wins, and the others get bridged to it
    #[test]
    fn test_tag_sink_node_multiple() {
        let (manholes, pipes) = get_test_network([true, true, true]);

        let result =
            build_graph(&manholes, &pipes, &FxHashMap::default()).unwrap();

        let m1 = result.index[&NodeKey::Manhole("M1".to_string())];
        let m2 = result.index[&NodeKey::Manhole("M2".to_string())];
        let m3 = result.index[&NodeKey::Manhole("M3".to_string())];

        assert_eq!(result.sink, m1);
        assert_eq!(result.graph.edge_count(), 8);

        for other in [m2, m3] {
            let edge = result.graph.find_edge(m1, other).unwrap();
            assert_eq!(result.graph[edge].pipe, None);
            assert_eq!(result.graph[edge].length, 0.0);
        }
    }

    /// Equally low sinks are decided on by manhole code
    #[test]
    fn test_tag_sink_node_tie() {
        let (mut manholes, mut pipes) = get_test_network([false, true, true]);
        manholes.insert("M0".to_string(), get_test_manhole("M0", -10.0, true));
        pipes.insert(
            "P0".to_string(),
            get_test_pipe("P0", "M3", "M0", 2.0, 1.2),
        );

        let result =
            build_graph(&manholes, &pipes, &FxHashMap::default()).unwrap();

        assert_eq!(
            result.graph[result.sink].key,
            NodeKey::Manhole("M0".to_string())
        );
    }

    /// Sinks which aren't connected to anything can't drain anything
    #[test]
    fn test_tag_sink_node_isolated() {
        let (mut manholes, pipes) = get_test_network([false, false, false]);
        manholes.insert("M9".to_string(), get_test_manhole("M9", 50.0, true));

        let result = build_graph(&manholes, &pipes, &FxHashMap::default());

        assert_eq!(result.err(), Some(LostCapacityError::NoSink));
    }
}
