//! Once water levels are known for every node in the graph, they are
//! converted into records which can be handed over for storage and display.

use crate::common::network_data::{Measurement, Pipe};
use crate::flooding::cross_section::{flooded_fraction, lost_volume};
use crate::flooding::water_level::WaterLevels;
use crate::loading::petgraph::ElevationGraph;
use crate::loading::structs::NodeKey;
use petgraph::visit::EdgeRef;
use rustc_hash::FxHashMap;
use serde::Serialize;

/// Result for a single (possibly virtual) measurement. Values which could
/// not be computed because the measurement can't be reached from the sink
/// are left empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementResult {
    pub pipe: String,
    pub distance: f64,
    pub bob: f64,
    pub obb: f64,
    pub x: f64,
    pub y: f64,
    pub is_virtual: bool,
    pub water_level: Option<f64>,
    pub flooded_depth: Option<f64>,
    pub flooded_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManholeResult {
    pub code: String,
    pub bob: f64,
    pub water_level: Option<f64>,
    pub flooded_depth: Option<f64>,
}

/// Bands used to colour pipes on the map, based on the share of their
/// volume which is lost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityClass {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl CapacityClass {
    pub fn from_fraction(fraction: f64) -> CapacityClass {
        match fraction {
            f if f < 0.2 => CapacityClass::VeryLow,
            f if f < 0.4 => CapacityClass::Low,
            f if f < 0.6 => CapacityClass::Medium,
            f if f < 0.8 => CapacityClass::High,
            _ => CapacityClass::VeryHigh,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipeResult {
    pub code: String,
    pub length: f64,
    /// Volume of the pipe when empty, in cubic metres
    pub volume: f64,
    /// Volume taken up by standing water, in cubic metres
    pub lost_volume: Option<f64>,
    pub lost_fraction: Option<f64>,
    pub capacity_class: Option<CapacityClass>,
}

/// All results for a single network
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkResults {
    pub name: String,
    pub sink: String,
    pub measurements: Vec<MeasurementResult>,
    pub manholes: Vec<ManholeResult>,
    pub pipes: Vec<PipeResult>,
}

/// Running totals for a single pipe
#[derive(Default)]
struct PipeTotals {
    length: f64,
    lost: f64,
    complete: bool,
}

fn get_measurement_results(
    elevation: &ElevationGraph,
    levels: &WaterLevels,
    pipes: &FxHashMap<String, Pipe>,
    measurements: &FxHashMap<String, Vec<Measurement>>,
) -> Vec<MeasurementResult> {
    let mut codes: Vec<&String> = measurements.keys().collect();
    codes.sort();

    let mut results = Vec::<MeasurementResult>::new();
    for code in codes {
        let cross_section = match pipes.get(code) {
            Some(pipe) => &pipe.cross_section,
            None => continue,
        };
        for (inx, meas) in measurements[code].iter().enumerate() {
            let water_level = elevation
                .index
                .get(&NodeKey::Measurement(code.clone(), inx))
                .and_then(|node| levels.get(*node));
            let flooded_depth = water_level.map(|level| level - meas.bob);
            let flooded_pct = flooded_depth
                .map(|depth| flooded_fraction(depth, cross_section));

            results.push(MeasurementResult {
                pipe: code.clone(),
                distance: meas.distance,
                bob: meas.bob,
                obb: meas.obb,
                x: meas.x,
                y: meas.y,
                is_virtual: meas.is_virtual,
                water_level,
                flooded_depth,
                flooded_pct,
            });
        }
    }

    results
}

fn get_manhole_results(
    elevation: &ElevationGraph,
    levels: &WaterLevels,
) -> Vec<ManholeResult> {
    let mut results: Vec<ManholeResult> = elevation
        .index
        .iter()
        .filter_map(|(key, node)| match key {
            NodeKey::Manhole(code) => Some(ManholeResult {
                code: code.clone(),
                bob: elevation.graph[*node].elevation,
                water_level: levels.get(*node),
                flooded_depth: levels.depth(&elevation.graph, *node),
            }),
            _ => None,
        })
        .collect();

    results.sort_by(|a, b| a.code.cmp(&b.code));
    results
}

/// Add up the lost volume along every edge of each pipe. If any point on a
/// pipe has no water level, the lost volume for the whole pipe is unknown.
fn get_pipe_results(
    elevation: &ElevationGraph,
    levels: &WaterLevels,
    pipes: &FxHashMap<String, Pipe>,
) -> Vec<PipeResult> {
    let graph = &elevation.graph;
    let mut totals = FxHashMap::<&str, PipeTotals>::default();

    for eref in graph.edge_references() {
        let code = match &eref.weight().pipe {
            Some(code) => code.as_str(),
            None => continue,
        };
        let pipe = match pipes.get(code) {
            Some(pipe) => pipe,
            None => continue,
        };

        let total = totals.entry(code).or_insert(PipeTotals {
            complete: true,
            ..Default::default()
        });
        total.length += eref.weight().length;

        match (
            levels.depth(graph, eref.source()),
            levels.depth(graph, eref.target()),
        ) {
            (Some(depth_from), Some(depth_to)) => {
                total.lost += lost_volume(
                    depth_from,
                    depth_to,
                    eref.weight().length,
                    &pipe.cross_section,
                );
            }
            _ => total.complete = false,
        }
    }

    let mut results: Vec<PipeResult> = totals
        .into_iter()
        .filter_map(|(code, total)| {
            let volume = pipes.get(code)?.cross_section.area() * total.length;
            let lost = if total.complete { Some(total.lost) } else { None };
            let fraction = lost.map(|lost| match volume > 0.0 {
                true => (lost / volume).min(1.0),
                false => 0.0,
            });

            Some(PipeResult {
                code: code.to_string(),
                length: total.length,
                volume,
                lost_volume: lost,
                lost_fraction: fraction,
                capacity_class: fraction.map(CapacityClass::from_fraction),
            })
        })
        .collect();

    results.sort_by(|a, b| a.code.cmp(&b.code));
    results
}

/// Convert the computed water levels into result records. measurements
/// must be the same (resolved) measurements the graph was built from.
pub fn extract_results(
    name: &str,
    elevation: &ElevationGraph,
    levels: &WaterLevels,
    pipes: &FxHashMap<String, Pipe>,
    measurements: &FxHashMap<String, Vec<Measurement>>,
) -> NetworkResults {
    let sink = match &elevation.graph[elevation.sink].key {
        NodeKey::Manhole(code) => code.clone(),
        other => format!("{:?}", other),
    };

    NetworkResults {
        name: name.to_string(),
        sink,
        measurements: get_measurement_results(
            elevation,
            levels,
            pipes,
            measurements,
        ),
        manholes: get_manhole_results(elevation, levels),
        pipes: get_pipe_results(elevation, levels, pipes),
    }
}
