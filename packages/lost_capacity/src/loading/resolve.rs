//! Surveyed measurements are recorded relative to one end of their pipe, and
//! depending on the survey method either as a slope or as an offset. The
//! functions here turn them into absolute elevations at known positions, so
//! that they can be placed in the elevation graph.

use crate::common::error::{LostCapacityError, Result};
use crate::common::network_data::{
    Manhole, Measurement, Pipe, RawMeasurement, Reading, ReferenceEnd,
};
use geo::{Distance, Euclidean, Point};
use tracing::warn;

/// Check that every reading along a pipe was taken the same way, from the
/// same end of the pipe. Returns the shared reference end.
fn check_consistency(
    pipe: &Pipe,
    raw: &[RawMeasurement],
) -> Result<Option<ReferenceEnd>> {
    let first = match raw.first() {
        Some(first) => first,
        None => return Ok(None),
    };

    let consistent = raw.iter().all(|meas| {
        meas.reference == first.reference
            && meas.reading.same_kind(&first.reading)
    });

    match consistent {
        true => Ok(Some(first.reference)),
        false => Err(LostCapacityError::InconsistentMeasurements {
            pipe: pipe.code.clone(),
        }),
    }
}

/// Determine the bottom of pipe elevation for a single reading. step is the
/// horizontal distance travelled since the previous point, ratio is the
/// fraction of the pipe covered so far (from the reference end).
fn bob_for_reading(
    reading: &Reading,
    prev_bob: f64,
    step: f64,
    ratio: f64,
    bob_from: f64,
    bob_to: f64,
) -> f64 {
    match reading {
        Reading::SlopeDegrees(degrees) => {
            prev_bob + step * degrees.to_radians().tan()
        }
        Reading::SlopePercent(percent) => prev_bob + step * percent / 100.0,
        Reading::AbsoluteOffset(offset) => {
            bob_from + (bob_to - bob_from) * ratio + offset
        }
        Reading::RelativeOffset(offset) => prev_bob + offset,
    }
}

/// Resolve the raw measurements for a single pipe. The output is sorted by
/// distance from manhole1, with distances measured horizontally. start and
/// end must be the pipe's manhole1 and manhole2 respectively.
pub fn resolve_measurements(
    pipe: &Pipe,
    start: &Manhole,
    end: &Manhole,
    raw: &[RawMeasurement],
) -> Result<Vec<Measurement>> {
    let reference = match check_consistency(pipe, raw)? {
        Some(reference) => reference,
        None => return Ok(Vec::new()),
    };

    // Walk the pipe from whichever end the measurements were taken
    let (from_pt, to_pt, bob_from, bob_to) = match reference {
        ReferenceEnd::Start => {
            (start.point(), end.point(), pipe.bob1, pipe.bob2)
        }
        ReferenceEnd::End => {
            (end.point(), start.point(), pipe.bob2, pipe.bob1)
        }
    };

    // Surveyed distances follow the pipe itself, which is sloped
    let horizontal = Euclidean::distance(from_pt, to_pt);
    let vertical = (bob_from - bob_to).abs();
    let straight = horizontal.hypot(vertical);

    let mut ordered: Vec<&RawMeasurement> = raw.iter().collect();
    ordered.sort_by(|a, b| a.distance.total_cmp(&b.distance));

    let height = pipe.cross_section.height();
    let mut prev_bob = bob_from;
    let mut prev_pt = from_pt;
    let mut resolved = Vec::<Measurement>::with_capacity(ordered.len());

    for meas in ordered {
        let ratio = if straight > 0.0 {
            meas.distance / straight
        } else {
            0.0
        };
        if !(0.0..=1.0).contains(&ratio) {
            warn!(
                "Measurement at {:.2}m lies outside pipe {} ({:.2}m long)",
                meas.distance, pipe.code, straight
            );
        }
        let ratio = ratio.clamp(0.0, 1.0);

        let point: Point = from_pt + (to_pt - from_pt) * ratio;
        let step = Euclidean::distance(prev_pt, point);

        let bob = bob_for_reading(
            &meas.reading,
            prev_bob,
            step,
            ratio,
            bob_from,
            bob_to,
        );

        let distance = match reference {
            ReferenceEnd::Start => ratio * horizontal,
            ReferenceEnd::End => horizontal - ratio * horizontal,
        };

        resolved.push(Measurement {
            pipe: pipe.code.clone(),
            distance,
            bob,
            obb: bob + height,
            x: point.x(),
            y: point.y(),
            is_virtual: false,
        });

        prev_bob = bob;
        prev_pt = point;
    }

    // Measurements taken from the far end come out back to front
    if reference == ReferenceEnd::End {
        resolved.reverse();
    }

    Ok(resolved)
}
