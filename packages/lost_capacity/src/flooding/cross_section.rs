//! Conversion from a depth of standing water to the share of the pipe's
//! cross-section it takes up, and from there to a volume of lost capacity.

use crate::common::network_data::CrossSection;
use std::f64::consts::PI;

/// Area of the segment of a disc of the given radius which lies below a
/// horizontal line at the given height above the bottom of the disc. Only
/// valid for 0 < height < radius, callers need to handle an empty or half
/// full disc themselves.
pub fn disc_segment(radius: f64, height: f64) -> f64 {
    assert!(
        radius > 0.0,
        "disc_segment needs a positive radius, got {radius}"
    );
    assert!(
        height > 0.0 && height < radius,
        "disc_segment height must lie strictly between 0 and {radius}, \
         got {height}"
    );

    let angle = 2.0 * ((radius - height) / radius).acos();
    radius.powi(2) / 2.0 * (angle - angle.sin())
}

/// Fraction (between 0 and 1) of a pipe's cross-section which is under water
/// at the provided depth. diameter is the full height of the pipe.
pub fn flooded_percentage(
    depth: f64,
    diameter: f64,
    is_rectangular: bool,
) -> f64 {
    if depth <= 0.0 {
        return 0.0;
    }
    if depth >= diameter {
        return 1.0;
    }
    if is_rectangular {
        return depth / diameter;
    }

    let radius = diameter / 2.0;
    let total_area = PI * radius.powi(2);

    if depth == radius {
        0.5
    } else if depth < radius {
        disc_segment(radius, depth) / total_area
    } else {
        1.0 - disc_segment(radius, diameter - depth) / total_area
    }
}

/// Flooded fraction for a specific cross-section
pub fn flooded_fraction(depth: f64, cross_section: &CrossSection) -> f64 {
    flooded_percentage(
        depth,
        cross_section.height(),
        cross_section.is_rectangular(),
    )
}

/// Volume of water standing in a stretch of pipe between two points, based
/// on the depth at either end. The flooded fraction is averaged between both
/// ends.
pub fn lost_volume(
    depth_from: f64,
    depth_to: f64,
    length: f64,
    cross_section: &CrossSection,
) -> f64 {
    let fraction = (flooded_fraction(depth_from, cross_section)
        + flooded_fraction(depth_to, cross_section))
        / 2.0;
    fraction * cross_section.area() * length
}
