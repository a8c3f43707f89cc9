//! Unified error vocabulary shared by every metricsd crate.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds per the wire protocol, registry, and datastore contracts.
#[derive(Debug, Error)]
pub enum Error {
    #[error("metric name is empty")]
    NoName,
    #[error("metric type is missing")]
    NoType,
    #[error("metric value is missing")]
    NoValue,
    #[error("sample rate is missing")]
    NoSampling,
    #[error("invalid metric name: {0}")]
    NameInvalid(String),
    #[error("invalid metric type: {0}")]
    TypeInvalid(String),
    #[error("invalid metric value: {0}")]
    ValueInvalid(String),
    #[error("invalid sample rate: {0}")]
    SamplingInvalid(String),
    #[error("no channels specified")]
    NoChannels,
    #[error("no such channel: {0}")]
    ChannelInvalid(String),
    #[error("cannot mix different metric types")]
    MixingTypes,
    #[error("channel names must be unique")]
    Nonunique,
    #[error("meter value must not be negative")]
    NegativeMeter,
    #[error("invalid: {0}")]
    Invalid(String),

    #[error("no data")]
    NoData,
    #[error("not running")]
    NotRunning,
    #[error("already running")]
    AlreadyRunning,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}
