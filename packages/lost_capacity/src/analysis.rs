//! Ties together every stage of the lost capacity computation for a single
//! network: measurements are resolved and corrected, the elevation graph is
//! built, water levels are determined and finally converted into results.

use crate::common::config::EngineConfig;
use crate::common::error::{LostCapacityError, Result};
use crate::common::network_data::{Measurement, SewerNetwork};
use crate::flooding::results::{NetworkResults, extract_results};
use crate::flooding::water_level::compute_water_levels;
use crate::loading::petgraph::build_graph;
use crate::loading::resolve::resolve_measurements;
use crate::loading::sawtooth::correct_sawtooth;
use crate::loading::virtual_measurements::virtual_measurements;
use rustc_hash::FxHashMap;
use std::time::Instant;
use tracing::{debug, info};

/// Generate the measurements which will be placed in the elevation graph.
/// Surveyed pipes get their raw measurements resolved (and corrected for
/// drift where the survey method calls for it), every other pipe gets
/// evenly spaced virtual measurements.
pub fn prepare_measurements(
    network: &SewerNetwork,
    config: &EngineConfig,
) -> Result<FxHashMap<String, Vec<Measurement>>> {
    let mut surveyed: Vec<&String> = network.measurements.keys().collect();
    surveyed.sort();
    for code in surveyed {
        if !network.pipes.contains_key(code) {
            return Err(LostCapacityError::UnknownPipe { pipe: code.clone() });
        }
    }

    let mut codes: Vec<&String> = network.pipes.keys().collect();
    codes.sort();

    let mut prepared = FxHashMap::<String, Vec<Measurement>>::default();
    let mut n_corrected: usize = 0;

    for code in codes {
        let pipe = &network.pipes[code];
        let (start, end) = pipe.endpoints(&network.manholes)?;

        let raw = network
            .measurements
            .get(code)
            .filter(|raw| !raw.is_empty());

        let measurements = match raw {
            Some(raw) => {
                let mut resolved =
                    resolve_measurements(pipe, start, end, raw)?;
                if raw[0].reading.accumulates_drift() {
                    let length = pipe.length(&network.manholes)?;
                    if correct_sawtooth(
                        pipe.bob1,
                        pipe.bob2,
                        length,
                        &mut resolved,
                        config.min_sawtooth_measurements,
                    ) {
                        n_corrected += 1;
                    }
                }
                resolved
            }
            None => {
                virtual_measurements(pipe, start, end, config.virtual_step)?
            }
        };

        prepared.insert(code.clone(), measurements);
    }

    debug!(
        "Prepared measurements for {} pipes, {} sawtooth corrected",
        prepared.len(),
        n_corrected
    );

    Ok(prepared)
}

/// Compute the lost capacity for every pipe, manhole and measurement in a
/// single network. Any error means no results at all are produced for it.
pub fn compute_lost_capacity(
    network: &SewerNetwork,
    config: &EngineConfig,
) -> Result<NetworkResults> {
    let now = Instant::now();

    let measurements = prepare_measurements(network, config)?;

    let elevation =
        build_graph(&network.manholes, &network.pipes, &measurements)?;

    let levels = compute_water_levels(&elevation.graph, elevation.sink);

    let results = extract_results(
        &network.name,
        &elevation,
        &levels,
        &network.pipes,
        &measurements,
    );

    info!(
        "Computed lost capacity for {} ({} pipes) in {:.2?}",
        network.name,
        results.pipes.len(),
        now.elapsed()
    );

    Ok(results)
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::common::network_data::{
        CrossSection, Manhole, Pipe, RawMeasurement, Reading, ReferenceEnd,
    };
    use crate::flooding::results::{MeasurementResult, PipeResult};
    use approx::assert_abs_diff_eq;

    fn get_test_manhole(code: &str, x: f64, is_sink: bool) -> Manhole {
        Manhole {
            code: code.to_string(),
            x,
            y: 0.0,
            is_sink,
            ground_level: None,
        }
    }

    fn get_test_pipe(
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
            cross_section: CrossSection::Rectangular {
                height: 1.0,
                width: 1.0,
            },
        }
    }

    fn get_test_readings(readings: &[(f64, Reading)]) -> Vec<RawMeasurement> {
        readings
            .iter()
            .map(|(distance, reading)| RawMeasurement {
                distance: *distance,
                reading: *reading,
                reference: ReferenceEnd::Start,
            })
            .collect()
    }

    /// A single flat pipe from M1 (the sink) to M2, 10m long
    fn get_test_network(readings: &[(f64, Reading)]) -> SewerNetwork {
        let mut manholes = FxHashMap::default();
        manholes.insert("M1".to_string(), get_test_manhole("M1", 0.0, true));
        manholes.insert("M2".to_string(), get_test_manhole("M2", 10.0, false));

        let mut pipes = FxHashMap::default();
        pipes.insert(
            "P1".to_string(),
            get_test_pipe("P1", "M1", "M2", 1.0, 1.0),
        );

        let mut measurements = FxHashMap::default();
        if !readings.is_empty() {
            measurements.insert("P1".to_string(), get_test_readings(readings));
        }

        SewerNetwork {
            name: "test".to_string(),
            manholes,
            pipes,
            measurements,
        }
    }

    #[test]
    fn test_no_sink() {
        let mut network = get_test_network(&[]);
        for manhole in network.manholes.values_mut() {
            manhole.is_sink = false;
        }

        let result = compute_lost_capacity(&network, &EngineConfig::default());

        assert_eq!(result.err(), Some(LostCapacityError::NoSink));
    }

    #[test]
    fn test_unknown_pipe() {
        let mut network = get_test_network(&[]);
        network.measurements.insert(
            "P9".to_string(),
            get_test_readings(&[(1.0, Reading::AbsoluteOffset(0.0))]),
        );

        let result = compute_lost_capacity(&network, &EngineConfig::default());

        assert_eq!(
            result.err(),
            Some(LostCapacityError::UnknownPipe {
                pipe: "P9".to_string()
            })
        );
    }

    #[test]
    fn test_inconsistent_measurements() {
        let network = get_test_network(&[
            (2.0, Reading::AbsoluteOffset(0.0)),
            (4.0, Reading::SlopePercent(1.0)),
        ]);

        let result = compute_lost_capacity(&network, &EngineConfig::default());

        assert_eq!(
            result.err(),
            Some(LostCapacityError::InconsistentMeasurements {
                pipe: "P1".to_string()
            })
        );
    }

    /// Pipes which weren't surveyed are dry if they slope evenly
    #[test]
    fn test_virtual_measurements() {
        let network = get_test_network(&[]);

        let result =
            compute_lost_capacity(&network, &EngineConfig::default()).unwrap();

        // 0.0 to 9.9 in steps of 0.3, plus the end point
        assert_eq!(result.measurements.len(), 35);
        assert!(result.measurements.iter().all(|meas| meas.is_virtual));
        assert!(
            result
                .measurements
                .iter()
                .all(|meas| meas.flooded_depth == Some(0.0))
        );
        assert_eq!(result.pipes[0].lost_volume, Some(0.0));
    }

    /// A dip in the middle of a surveyed pipe holds water up to the level of
    /// the pipe ends
    #[test]
    fn test_surveyed_dip() {
        let network = get_test_network(&[
            (2.0, Reading::AbsoluteOffset(0.0)),
            (5.0, Reading::AbsoluteOffset(-0.5)),
            (8.0, Reading::AbsoluteOffset(0.0)),
        ]);

        let result =
            compute_lost_capacity(&network, &EngineConfig::default()).unwrap();

        assert_eq!(result.sink, "M1");
        let depths: Vec<f64> = result
            .measurements
            .iter()
            .map(|meas| meas.flooded_depth.unwrap())
            .collect();
        assert_eq!(depths.len(), 3);
        assert_abs_diff_eq!(depths[0], 0.0);
        assert_abs_diff_eq!(depths[1], 0.5);
        assert_abs_diff_eq!(depths[2], 0.0);

        // 3m either side of the dip, averaging a quarter full
        let pipe = &result.pipes[0];
        assert_abs_diff_eq!(pipe.lost_volume.unwrap(), 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(
            pipe.lost_fraction.unwrap(),
            0.15,
            epsilon = 1e-12
        );
    }

    /// Slope readings which drift away from the known pipe ends get pulled
    /// back onto them
    #[test]
    fn test_slope_readings_corrected() {
        let network = get_test_network(&[
            (2.0, Reading::SlopePercent(1.0)),
            (5.0, Reading::SlopePercent(1.0)),
            (8.0, Reading::SlopePercent(1.0)),
        ]);

        let result =
            compute_lost_capacity(&network, &EngineConfig::default()).unwrap();

        for meas in result.measurements.iter() {
            assert!(!meas.is_virtual);
            assert_abs_diff_eq!(meas.bob, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_slope_readings_too_few_to_correct() {
        let network = get_test_network(&[
            (2.0, Reading::SlopePercent(1.0)),
            (5.0, Reading::SlopePercent(1.0)),
            (8.0, Reading::SlopePercent(1.0)),
        ]);
        let config = EngineConfig {
            min_sawtooth_measurements: 4,
            ..Default::default()
        };

        let result = compute_lost_capacity(&network, &config).unwrap();

        assert_abs_diff_eq!(result.measurements[2].bob, 1.08, epsilon = 1e-9);
    }

    /// M1 (sink) --P1-- M2        M3 (sink) --P2-- M4
    ///
    /// P1 climbs away from M1, P2 drops away from M3
    fn get_two_sink_network() -> SewerNetwork {
        let mut manholes = FxHashMap::default();
        for (code, x, is_sink) in [
            ("M1", 0.0, true),
            ("M2", 10.0, false),
            ("M3", 20.0, true),
            ("M4", 30.0, false),
        ] {
            manholes
                .insert(code.to_string(), get_test_manhole(code, x, is_sink));
        }

        let mut pipes = FxHashMap::default();
        pipes.insert(
            "P1".to_string(),
            get_test_pipe("P1", "M1", "M2", 1.0, 2.0),
        );
        pipes.insert(
            "P2".to_string(),
            get_test_pipe("P2", "M3", "M4", 1.5, 1.2),
        );

        SewerNetwork {
            name: "two sinks".to_string(),
            manholes,
            pipes,
            measurements: FxHashMap::default(),
        }
    }

    /// Flagging a second sink should behave exactly as if the higher sink's
    /// branch drained into the lowest one through a pipe of its own
    #[test]
    fn test_bridged_sinks() {
        let network = get_two_sink_network();
        let config = EngineConfig::default();

        let result = compute_lost_capacity(&network, &config).unwrap();

        let mut single = network.clone();
        if let Some(manhole) = single.manholes.get_mut("M3") {
            manhole.is_sink = false;
        }
        single.pipes.insert(
            "P0".to_string(),
            get_test_pipe("P0", "M3", "M1", 1.5, 1.0),
        );
        let target = compute_lost_capacity(&single, &config).unwrap();

        assert_eq!(result.sink, target.sink);
        assert_eq!(result.manholes, target.manholes);

        let shared: Vec<&MeasurementResult> = target
            .measurements
            .iter()
            .filter(|meas| meas.pipe != "P0")
            .collect();
        assert_eq!(result.measurements.iter().collect::<Vec<_>>(), shared);

        let shared: Vec<&PipeResult> =
            target.pipes.iter().filter(|pipe| pipe.code != "P0").collect();
        assert_eq!(result.pipes.iter().collect::<Vec<_>>(), shared);

        // Water stands behind M3 at its own level, not at that of M1
        let m4 = &result.manholes[3];
        assert_eq!(m4.code, "M4");
        assert_eq!(m4.water_level, Some(1.5));
        assert_abs_diff_eq!(m4.flooded_depth.unwrap(), 0.3, epsilon = 1e-12);
    }

    /// The step can be set directly in code, so the pipeline has to refuse
    /// to generate an unbounded number of points as well
    #[test]
    fn test_virtual_step_too_small() {
        let network = get_test_network(&[]);
        let config = EngineConfig {
            virtual_step: 1e-7,
            ..Default::default()
        };

        let result = compute_lost_capacity(&network, &config);

        assert!(matches!(
            result,
            Err(LostCapacityError::TooManyVirtualMeasurements { .. })
        ));
    }

    /// Surveyed distances beyond the end of the pipe must not add to its
    /// length or volume
    #[test]
    fn test_measurement_beyond_pipe() {
        let network = get_test_network(&[
            (4.0, Reading::AbsoluteOffset(0.0)),
            (15.0, Reading::AbsoluteOffset(0.0)),
        ]);

        let result =
            compute_lost_capacity(&network, &EngineConfig::default()).unwrap();

        let pipe = &result.pipes[0];
        assert_abs_diff_eq!(pipe.length, 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(pipe.volume, 10.0, epsilon = 1e-9);
    }
}
