use std::collections::TryReserveError;
use std::io;

use thiserror::Error;

use crate::graph::OperationKind;

/// Failures while turning scheduled operations into command words.
#[derive(Debug, Error)]
pub enum EncodingError {
  #[error("value {value:#x} does not fit the {command} field")]
  FieldOverflow { command: &'static str, value: i64 },

  #[error("operation {index} has no block configuration")]
  UnscheduledOperation { index: usize },

  #[error("tensor {tensor_index} ({bytes} bytes) does not fit the I/O region")]
  IoRegionOverflow { tensor_index: u32, bytes: u64 },

  #[error("{waits} wait entries for {operations} operations")]
  WaitsMismatch { operations: usize, waits: usize },

  #[error("command stream allocation failed: {0}")]
  Allocation(#[from] TryReserveError),
}

/// Failures of the block scheduler and everything downstream of it.
#[derive(Debug, Error)]
pub enum SchedulingError {
  #[error("no block configuration fits SHRAM for {kind:?} operation {index}")]
  NoBlockConfig { index: usize, kind: OperationKind },

  #[error(transparent)]
  Encoding(#[from] EncodingError),
}

/// Failures of the weight compression codec.
#[derive(Debug, Error)]
pub enum CodecError {
  #[error("weight out of range at index {index}: {value} (valid range is -255..=255)")]
  WeightOutOfRange { index: usize, value: i16 },

  #[error("invalid weight tensor: {0}")]
  InvalidWeightShape(String),

  #[error("weight buffer allocation failed: {0}")]
  Allocation(#[from] TryReserveError),
}

/// Crate level error, used by the driver and the binary.
#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Scheduling(#[from] SchedulingError),

  #[error(transparent)]
  Codec(#[from] CodecError),

  #[error("invalid compiler options: {0}")]
  Config(#[from] config::ConfigError),

  #[error(transparent)]
  Io(#[from] io::Error),

  #[error("malformed json: {0}")]
  Json(#[from] serde_json::Error),

  #[error("cannot serialize options: {0}")]
  Toml(#[from] toml::ser::Error),
}

impl From<EncodingError> for Error {
  fn from(err: EncodingError) -> Self {
    Error::Scheduling(SchedulingError::Encoding(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
