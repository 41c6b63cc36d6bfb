//! Command stream encoding: register opcodes, the word buffer and the per-operation emitter
pub mod emit;
pub mod regs;
pub mod scale;
pub mod stream;

pub use emit::{encode, Encoder};
pub use regs::{cmd_name, OpToScale};
pub use scale::{elementwise_scales, pooling_ofm_scale, quantize_scale, ElementwiseScales};
pub use stream::{Command, CommandReader, CommandStream};
