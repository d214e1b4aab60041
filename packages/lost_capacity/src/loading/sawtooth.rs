//! Measurements derived from slopes are chained together, so any systematic
//! error in the survey equipment builds up along the pipe. This shows up as a
//! sawtooth pattern across a sequence of pipes: each pipe drifts away from
//! its known end elevation, then jumps back at the next manhole. As both end
//! elevations are known, the drift can be estimated and removed.

use crate::common::network_data::Measurement;
use tracing::debug;

/// A straight line, with elevation as a function of distance along the pipe
#[derive(Debug, Clone, Copy, PartialEq)]
struct Line {
    slope: f64,
    intercept: f64,
}

impl Line {
    /// Fit a line through two points. Not possible when both points are at
    /// the same distance.
    fn through(p1: (f64, f64), p2: (f64, f64)) -> Option<Line> {
        let (x1, y1) = p1;
        let (x2, y2) = p2;
        if x1 == x2 {
            return None;
        }
        let slope = (y2 - y1) / (x2 - x1);
        Some(Line {
            slope,
            intercept: y1 - slope * x1,
        })
    }

    fn at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Remove linear drift from the measurements of a single pipe, which must be
/// sorted by distance from the end with elevation bob1. The 'ideal' line
/// runs between the two known pipe ends, the 'apparent' line between the
/// first and last measurement. Every measurement is shifted by the
/// difference between the two, which keeps the shape of the measured profile
/// intact. Returns true if a correction was applied.
pub fn correct_sawtooth(
    bob1: f64,
    bob2: f64,
    length: f64,
    measurements: &mut [Measurement],
    min_measurements: usize,
) -> bool {
    if measurements.len() < min_measurements {
        return false;
    }

    let (first, last) = match (measurements.first(), measurements.last()) {
        (Some(first), Some(last)) => {
            ((first.distance, first.bob), (last.distance, last.bob))
        }
        _ => return false,
    };

    let ideal = Line::through((0.0, bob1), (length, bob2));
    let apparent = Line::through(first, last);

    let (ideal, apparent) = match (ideal, apparent) {
        (Some(ideal), Some(apparent)) => (ideal, apparent),
        _ => {
            debug!("Unable to fit a line, skipping sawtooth correction");
            return false;
        }
    };

    for meas in measurements.iter_mut() {
        let offset = ideal.at(meas.distance) - apparent.at(meas.distance);
        meas.bob += offset;
        meas.obb += offset;
    }

    true
}
