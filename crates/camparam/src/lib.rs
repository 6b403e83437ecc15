#![cfg_attr(docsrs, feature(doc_cfg))]
//! Camera parameter model: typed setting identifiers, values, declarative
//! descriptors, and the [`ParameterStore`] that validates writes before they
//! reach hardware.
//!
//! ```rust
//! use camparam::{Limits, ParamId, ParameterStore, ParamError};
//!
//! let mut store = ParameterStore::new(Limits::default());
//! store.set(ParamId::ExposureTime, 50u32)?;
//! assert_eq!(store.exposure_ms(), 50);
//! // Gain 2 is only available on readout ports 1 and 2.
//! assert!(matches!(store.set(ParamId::Gain, 2u32), Err(ParamError::Range { .. })));
//! # Ok::<(), ParamError>(())
//! ```

pub mod descriptor;
pub mod id;
pub mod limits;
pub mod store;
pub mod value;

use thiserror::Error;

pub use descriptor::{Access, Constraint, SettingDescriptor};
pub use id::ParamId;
pub use limits::{Limits, BINNING_CHOICES, MAX_EXPOSURE_MS, READOUT_PORTS, ROI_STEP};
pub use store::ParameterStore;
pub use value::{AcquisitionMode, TriggerMode, Value, ValueKind};

/// Error type produced when a setting write is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    /// The value lies outside the setting's declared domain.
    #[error("invalid value for {param}: {reason}")]
    Validation { param: ParamId, reason: String },
    /// The value is legal on its own but not together with another setting.
    #[error("range error for {param}: {reason}")]
    Range { param: ParamId, reason: String },
    /// The setting cannot be written.
    #[error("setting {0} is read-only")]
    ReadOnly(ParamId),
    /// The value has the wrong type for the setting.
    #[error("type mismatch for {param}: expected {expected}")]
    Type { param: ParamId, expected: ValueKind },
    /// A host string could not be parsed for the setting.
    #[error("cannot parse {value:?} for {param}")]
    Parse { param: ParamId, value: String },
    /// No setting has this name.
    #[error("unknown setting: {0}")]
    Unknown(String),
}

impl ParamError {
    fn validation<S: Into<String>>(param: ParamId, reason: S) -> Self {
        ParamError::Validation {
            param,
            reason: reason.into(),
        }
    }

    fn range<S: Into<String>>(param: ParamId, reason: S) -> Self {
        ParamError::Range {
            param,
            reason: reason.into(),
        }
    }
}
