//! Back-end compiler for the Arm Ethos-U NPU.
//!
//! Lowered operations go through block configuration, wait insertion and
//! command stream encoding; convolution weights are reordered and compressed
//! into the coefficient region the command stream points at.
pub mod arch;
pub mod cmd;
pub mod coefs;
pub mod compiler;
pub mod error;
pub mod graph;
pub mod hazard;
pub mod mlw;
pub mod sched;
pub mod utils;

pub use compiler::{schedule_and_encode, CompiledGraph, Compiler, CompilerOptions, Graph};
pub use error::{Error, Result};
pub use mlw::compress_weights;
pub use utils::log::init_log;
