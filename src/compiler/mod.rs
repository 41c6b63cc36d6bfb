//! Top-level driver: allocation, scheduling, coefficient packing and encoding
pub mod compiler;
pub mod options;

pub use compiler::{
  fill_coefficients, schedule_and_encode, schedule_and_encode_with, stage_coefficients, CompiledGraph, Compiler, Graph,
};
pub use options::{CompilerOptions, DEFAULT_SRAM_SIZE, ENV_PREFIX};
