//! Records describing a single surveyed sewer network, as they are handed
//! over once the survey files have been parsed. Every computation run starts
//! from these, nothing in here is modified by the engine.

use crate::common::error::{LostCapacityError, Result};
use geo::{Distance, Euclidean, Point};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// A manhole (put), coordinates are expected to be in a projected metric
/// coordinate system so that distances between them come out in metres
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manhole {
    pub code: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub is_sink: bool,
    #[serde(default)]
    pub ground_level: Option<f64>,
}

impl Manhole {
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// The shape of a pipe when viewed end-on. Dimensions are in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum CrossSection {
    Circular { diameter: f64 },
    Rectangular { height: f64, width: f64 },
}

impl CrossSection {
    /// Vertical size of the cross-section, used to go from bottom of pipe
    /// to top of pipe and as the reference for flooded percentages
    pub fn height(&self) -> f64 {
        match self {
            CrossSection::Circular { diameter } => *diameter,
            CrossSection::Rectangular { height, .. } => *height,
        }
    }

    pub fn area(&self) -> f64 {
        match self {
            CrossSection::Circular { diameter } => {
                PI * (diameter / 2.0).powi(2)
            }
            CrossSection::Rectangular { height, width } => height * width,
        }
    }

    pub fn is_rectangular(&self) -> bool {
        matches!(self, CrossSection::Rectangular { .. })
    }
}

/// A single pipe (streng) connecting two manholes. bob1 belongs to manhole1
/// and bob2 to manhole2, no ordering between the two is implied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipe {
    pub code: String,
    pub manhole1: String,
    pub manhole2: String,
    pub bob1: f64,
    pub bob2: f64,
    pub cross_section: CrossSection,
}

impl Pipe {
    /// Look up the manholes at either end of the pipe. A pipe pointing at a
    /// manhole which isn't part of the network means the survey data is
    /// inconsistent, this is reported rather than skipped.
    pub fn endpoints<'a>(
        &self,
        manholes: &'a FxHashMap<String, Manhole>,
    ) -> Result<(&'a Manhole, &'a Manhole)> {
        let lookup = |code: &String| {
            manholes
                .get(code)
                .ok_or_else(|| LostCapacityError::UnknownManhole {
                    pipe: self.code.clone(),
                    manhole: code.clone(),
                })
        };

        Ok((lookup(&self.manhole1)?, lookup(&self.manhole2)?))
    }

    /// Horizontal length of the pipe, based on the manhole coordinates
    pub fn length(
        &self,
        manholes: &FxHashMap<String, Manhole>,
    ) -> Result<f64> {
        let (start, end) = self.endpoints(manholes)?;
        Ok(Euclidean::distance(start.point(), end.point()))
    }
}

/// Which end of the pipe the distance of a measurement is relative to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceEnd {
    Start,
    End,
}

impl ReferenceEnd {
    /// Survey files reference the ends as "1" and "2"
    pub fn from_code(code: &str) -> Result<ReferenceEnd> {
        match code.trim() {
            "1" => Ok(ReferenceEnd::Start),
            "2" => Ok(ReferenceEnd::End),
            _ => Err(LostCapacityError::UnknownReferenceEnd {
                code: code.to_string(),
            }),
        }
    }
}

/// A raw measured value, tagged by how it should be turned into an absolute
/// bottom of pipe elevation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Reading {
    /// Slope since the previous point, in degrees
    SlopeDegrees(f64),
    /// Slope since the previous point, in percent
    SlopePercent(f64),
    /// Metres above (or below) the straight line between both pipe ends
    AbsoluteOffset(f64),
    /// Metres above (or below) the previous point
    RelativeOffset(f64),
}

impl Reading {
    /// Map the type and unit codes used in the survey files onto a reading.
    /// Only A+E, A+F and C+B are supported.
    pub fn from_codes(kind: &str, unit: &str, value: f64) -> Result<Reading> {
        let codes = (
            kind.trim().to_ascii_uppercase(),
            unit.trim().to_ascii_uppercase(),
        );
        match (codes.0.as_str(), codes.1.as_str()) {
            ("A", "E") => Ok(Reading::SlopeDegrees(value)),
            ("A", "F") => Ok(Reading::SlopePercent(value)),
            ("C", "B") => Ok(Reading::AbsoluteOffset(value)),
            _ => Err(LostCapacityError::UnsupportedMeasurementCodes {
                kind: kind.to_string(),
                unit: unit.to_string(),
            }),
        }
    }

    pub fn same_kind(&self, other: &Reading) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Readings which are relative to the previous point build up small
    /// errors the further along the pipe they get, and need to be corrected
    /// against the known pipe ends
    pub fn accumulates_drift(&self) -> bool {
        !matches!(self, Reading::AbsoluteOffset(_))
    }
}

/// A measurement exactly as it was surveyed. The distance is taken along the
/// (sloped) pipe, starting from the reference end. Can be provided either
/// with a tagged reading, or with the codes used in the survey files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMeasurementInput")]
pub struct RawMeasurement {
    pub distance: f64,
    pub reading: Reading,
    pub reference: ReferenceEnd,
}

/// A measurement record as it appears in a survey file, e.g. type A with
/// unit E for a slope in degrees, measured from reference end 1
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SurveyRecord {
    pub distance: f64,
    #[serde(rename = "type")]
    pub kind: String,
    pub unit: String,
    pub value: f64,
    pub reference: String,
}

impl TryFrom<SurveyRecord> for RawMeasurement {
    type Error = LostCapacityError;

    fn try_from(record: SurveyRecord) -> Result<RawMeasurement> {
        Ok(RawMeasurement {
            distance: record.distance,
            reading: Reading::from_codes(
                &record.kind,
                &record.unit,
                record.value,
            )?,
            reference: ReferenceEnd::from_code(&record.reference)?,
        })
    }
}

/// Either of the layouts a raw measurement is accepted in
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawMeasurementInput {
    Tagged {
        distance: f64,
        reading: Reading,
        reference: ReferenceEnd,
    },
    Survey(SurveyRecord),
}

impl TryFrom<RawMeasurementInput> for RawMeasurement {
    type Error = LostCapacityError;

    fn try_from(input: RawMeasurementInput) -> Result<RawMeasurement> {
        match input {
            RawMeasurementInput::Tagged {
                distance,
                reading,
                reference,
            } => Ok(RawMeasurement {
                distance,
                reading,
                reference,
            }),
            RawMeasurementInput::Survey(record) => record.try_into(),
        }
    }
}

/// A measurement once it has been resolved against the geometry of its pipe.
/// Distances are horizontal, measured from manhole1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub pipe: String,
    pub distance: f64,
    pub bob: f64,
    pub obb: f64,
    pub x: f64,
    pub y: f64,
    pub is_virtual: bool,
}

/// Everything known about a single sewer network. Measurements are keyed by
/// the code of the pipe they were taken in; pipes without an entry have not
/// been surveyed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SewerNetwork {
    pub name: String,
    pub manholes: FxHashMap<String, Manhole>,
    pub pipes: FxHashMap<String, Pipe>,
    #[serde(default)]
    pub measurements: FxHashMap<String, Vec<RawMeasurement>>,
}
