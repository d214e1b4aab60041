//! Error type shared by every stage of the lost capacity computation. Any of
//! these raised while processing a network means none of that network's
//! results are kept.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LostCapacityError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LostCapacityError {
    /// None of the manholes in the network has been flagged as a sink, so
    /// there is nowhere for the water to drain to
    #[error("no manhole in the network is flagged as a sink")]
    NoSink,

    #[error("pipe {pipe} references unknown manhole {manhole}")]
    UnknownManhole { pipe: String, manhole: String },

    #[error("measurements were provided for unknown pipe {pipe}")]
    UnknownPipe { pipe: String },

    /// All readings along a single pipe must be taken the same way and from
    /// the same end of the pipe
    #[error("pipe {pipe} mixes measurement kinds or reference ends")]
    InconsistentMeasurements { pipe: String },

    #[error("unsupported measurement type/unit combination {kind}+{unit}")]
    UnsupportedMeasurementCodes { kind: String, unit: String },

    #[error("unknown reference end {code}, expected 1 or 2")]
    UnknownReferenceEnd { code: String },

    #[error("pipe {pipe} would need {count} virtual measurements")]
    TooManyVirtualMeasurements { pipe: String, count: usize },

    #[error("invalid value for {key}: {value}")]
    InvalidConfig { key: String, value: String },

    #[error("lease {key} is already held by {holder}")]
    LeaseHeld { key: String, holder: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Error messages are passed straight back to API users, so check that
    /// the offending codes make it into them
    #[test]
    fn test_unknown_manhole_message() {
        let err = LostCapacityError::UnknownManhole {
            pipe: "P1".to_string(),
            manhole: "M9".to_string(),
        };

        assert_eq!(err.to_string(), "pipe P1 references unknown manhole M9");
    }

    #[test]
    fn test_lease_held_message() {
        let err = LostCapacityError::LeaseHeld {
            key: "recompute_all".to_string(),
            holder: "worker-1".to_string(),
        };

        assert_eq!(
            err.to_string(),
            "lease recompute_all is already held by worker-1"
        );
    }
}
