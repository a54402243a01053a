use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    /// A stored text value cannot be interpreted as the requested type.
    #[error("cannot interpret {value:?} as {wanted}")]
    InvalidValueType { value: String, wanted: &'static str },

    /// A constraint the registry has no meaningful rendition of.
    #[error("unsupported constraint: {0}")]
    UnsupportedConstraint(&'static str),

    /// A version-gated filter requested against an older registry.
    #[error("{feature} requires registry version {required}, connected registry is {actual}")]
    Unsupported {
        feature: &'static str,
        required: u32,
        actual: u32,
    },

    #[error("registry access failed")]
    RegistryAccess {
        #[from]
        source: io::Error,
    },

    #[error("malformed record line {line:?}")]
    MalformedRecord { line: String },

    #[error("no device at {syspath:?}")]
    DeviceNotFound { syspath: String },
}

pub type RegistryResult<T> = anyhow::Result<T>;
