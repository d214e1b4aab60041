//! Not every pipe in a network gets surveyed. So that these can be handled in
//! the same way as the rest, a set of placeholder measurements is generated
//! along the straight line between both ends of the pipe.

use crate::common::error::{LostCapacityError, Result};
use crate::common::network_data::{Manhole, Measurement, Pipe};
use geo::{Distance, Euclidean, Point};

/// Upper limit on the number of virtual measurements for a single pipe
pub const MAX_VIRTUAL_MEASUREMENTS: usize = 100_000;

/// Generate evenly spaced virtual measurements along a pipe, starting at
/// manhole1 and stepping towards manhole2. A final measurement is always
/// placed exactly at manhole2, with an elevation of exactly bob2.
pub fn virtual_measurements(
    pipe: &Pipe,
    start: &Manhole,
    end: &Manhole,
    step: f64,
) -> Result<Vec<Measurement>> {
    let from_pt = start.point();
    let to_pt = end.point();
    let length = Euclidean::distance(from_pt, to_pt);
    let height = pipe.cross_section.height();

    let make = |distance: f64, bob: f64, point: Point| Measurement {
        pipe: pipe.code.clone(),
        distance,
        bob,
        obb: bob + height,
        x: point.x(),
        y: point.y(),
        is_virtual: true,
    };

    let n_steps = (length / step).ceil();
    if !(n_steps < MAX_VIRTUAL_MEASUREMENTS as f64) {
        return Err(LostCapacityError::TooManyVirtualMeasurements {
            pipe: pipe.code.clone(),
            count: n_steps.min(usize::MAX as f64) as usize,
        });
    }
    let n_steps = n_steps as usize;

    let mut measurements = Vec::<Measurement>::with_capacity(n_steps + 1);

    // Multiply rather than accumulate, so rounding errors don't build up
    // over long pipes
    for inx in 0..n_steps {
        let distance = step * inx as f64;
        if distance >= length {
            break;
        }
        let ratio = distance / length;
        let bob = pipe.bob1 + (pipe.bob2 - pipe.bob1) * ratio;
        let point = from_pt + (to_pt - from_pt) * ratio;
        measurements.push(make(distance, bob, point));
    }

    measurements.push(make(length, pipe.bob2, to_pt));

    Ok(measurements)
}
