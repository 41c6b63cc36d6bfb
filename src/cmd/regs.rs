//! Command opcodes and register field packings.
//!
//! Short commands carry a 16-bit immediate in the upper half of the word.
//! Long commands set [`CMD1_FLAG`] and are followed by one 32-bit word.

use crate::error::EncodingError;

pub const CMD1_FLAG: u32 = 0x4000;
pub const OPCODE_MASK: u32 = 0x3ff;

/// Largest stride `NPU_SET_KERNEL_STRIDE` can express (one LSB and one MSB bit).
pub const STRIDE_MAX: u32 = 4;
/// Largest dilation `NPU_SET_KERNEL_STRIDE` can express (one bit).
pub const DILATION_MAX: u32 = 2;

/// Short (single word) commands.
pub mod cmd0 {
  pub const NPU_OP_STOP: u32 = 0x000;
  pub const NPU_OP_IRQ: u32 = 0x001;
  pub const NPU_OP_CONV: u32 = 0x002;
  pub const NPU_OP_DEPTHWISE: u32 = 0x003;
  pub const NPU_OP_POOL: u32 = 0x005;
  pub const NPU_OP_ELEMENTWISE: u32 = 0x006;
  pub const NPU_OP_DMA_START: u32 = 0x010;
  pub const NPU_OP_DMA_WAIT: u32 = 0x011;
  pub const NPU_OP_KERNEL_WAIT: u32 = 0x012;
  pub const NPU_SET_IFM_PAD_TOP: u32 = 0x100;
  pub const NPU_SET_IFM_PAD_LEFT: u32 = 0x101;
  pub const NPU_SET_IFM_PAD_RIGHT: u32 = 0x102;
  pub const NPU_SET_IFM_PAD_BOTTOM: u32 = 0x103;
  pub const NPU_SET_IFM_DEPTH_M1: u32 = 0x104;
  pub const NPU_SET_IFM_PRECISION: u32 = 0x105;
  pub const NPU_SET_IFM_UPSCALE: u32 = 0x107;
  pub const NPU_SET_IFM_ZERO_POINT: u32 = 0x109;
  pub const NPU_SET_IFM_WIDTH0_M1: u32 = 0x10a;
  pub const NPU_SET_IFM_HEIGHT0_M1: u32 = 0x10b;
  pub const NPU_SET_IFM_HEIGHT1_M1: u32 = 0x10c;
  pub const NPU_SET_IFM_IB_END: u32 = 0x10d;
  pub const NPU_SET_IFM_REGION: u32 = 0x10f;
  pub const NPU_SET_OFM_WIDTH_M1: u32 = 0x111;
  pub const NPU_SET_OFM_HEIGHT_M1: u32 = 0x112;
  pub const NPU_SET_OFM_DEPTH_M1: u32 = 0x113;
  pub const NPU_SET_OFM_PRECISION: u32 = 0x114;
  pub const NPU_SET_OFM_BLK_WIDTH_M1: u32 = 0x115;
  pub const NPU_SET_OFM_BLK_HEIGHT_M1: u32 = 0x116;
  pub const NPU_SET_OFM_BLK_DEPTH_M1: u32 = 0x117;
  pub const NPU_SET_OFM_ZERO_POINT: u32 = 0x118;
  pub const NPU_SET_OFM_WIDTH0_M1: u32 = 0x11a;
  pub const NPU_SET_OFM_HEIGHT0_M1: u32 = 0x11b;
  pub const NPU_SET_OFM_HEIGHT1_M1: u32 = 0x11c;
  pub const NPU_SET_OFM_REGION: u32 = 0x11f;
  pub const NPU_SET_KERNEL_WIDTH_M1: u32 = 0x120;
  pub const NPU_SET_KERNEL_HEIGHT_M1: u32 = 0x121;
  pub const NPU_SET_KERNEL_STRIDE: u32 = 0x122;
  pub const NPU_SET_PARALLEL_MODE: u32 = 0x123;
  pub const NPU_SET_ACC_FORMAT: u32 = 0x124;
  pub const NPU_SET_ACTIVATION: u32 = 0x125;
  pub const NPU_SET_ACTIVATION_MIN: u32 = 0x126;
  pub const NPU_SET_ACTIVATION_MAX: u32 = 0x127;
  pub const NPU_SET_WEIGHT_REGION: u32 = 0x128;
  pub const NPU_SET_SCALE_REGION: u32 = 0x129;
  pub const NPU_SET_AB_START: u32 = 0x12d;
  pub const NPU_SET_BLOCKDEP: u32 = 0x12f;
  pub const NPU_SET_DMA0_SRC_REGION: u32 = 0x130;
  pub const NPU_SET_DMA0_DST_REGION: u32 = 0x131;
  pub const NPU_SET_IFM2_BROADCAST: u32 = 0x180;
  pub const NPU_SET_IFM2_PRECISION: u32 = 0x185;
  pub const NPU_SET_IFM2_ZERO_POINT: u32 = 0x189;
  pub const NPU_SET_IFM2_WIDTH0_M1: u32 = 0x18a;
  pub const NPU_SET_IFM2_HEIGHT0_M1: u32 = 0x18b;
  pub const NPU_SET_IFM2_HEIGHT1_M1: u32 = 0x18c;
  pub const NPU_SET_IFM2_IB_START: u32 = 0x18d;
  pub const NPU_SET_IFM2_REGION: u32 = 0x18f;
}

/// Long (two word) commands. The [`super::CMD1_FLAG`] bit is added when emitting.
pub mod cmd1 {
  pub const NPU_SET_IFM_BASE0: u32 = 0x000;
  pub const NPU_SET_IFM_BASE1: u32 = 0x001;
  pub const NPU_SET_IFM_BASE2: u32 = 0x002;
  pub const NPU_SET_IFM_BASE3: u32 = 0x003;
  pub const NPU_SET_IFM_STRIDE_X: u32 = 0x004;
  pub const NPU_SET_IFM_STRIDE_Y: u32 = 0x005;
  pub const NPU_SET_IFM_STRIDE_C: u32 = 0x006;
  pub const NPU_SET_OFM_BASE0: u32 = 0x010;
  pub const NPU_SET_OFM_BASE1: u32 = 0x011;
  pub const NPU_SET_OFM_BASE2: u32 = 0x012;
  pub const NPU_SET_OFM_BASE3: u32 = 0x013;
  pub const NPU_SET_OFM_STRIDE_X: u32 = 0x014;
  pub const NPU_SET_OFM_STRIDE_Y: u32 = 0x015;
  pub const NPU_SET_OFM_STRIDE_C: u32 = 0x016;
  pub const NPU_SET_WEIGHT_BASE: u32 = 0x020;
  pub const NPU_SET_WEIGHT_LENGTH: u32 = 0x021;
  pub const NPU_SET_SCALE_BASE: u32 = 0x022;
  pub const NPU_SET_SCALE_LENGTH: u32 = 0x023;
  pub const NPU_SET_OFM_SCALE: u32 = 0x024;
  pub const NPU_SET_OPA_SCALE: u32 = 0x025;
  pub const NPU_SET_OPB_SCALE: u32 = 0x026;
  pub const NPU_SET_DMA0_SRC: u32 = 0x030;
  pub const NPU_SET_DMA0_DST: u32 = 0x031;
  pub const NPU_SET_DMA0_LEN: u32 = 0x032;
  pub const NPU_SET_IFM2_BASE0: u32 = 0x080;
  pub const NPU_SET_IFM2_BASE1: u32 = 0x081;
  pub const NPU_SET_IFM2_BASE2: u32 = 0x082;
  pub const NPU_SET_IFM2_BASE3: u32 = 0x083;
  pub const NPU_SET_IFM2_STRIDE_X: u32 = 0x084;
  pub const NPU_SET_IFM2_STRIDE_Y: u32 = 0x085;
  pub const NPU_SET_IFM2_STRIDE_C: u32 = 0x086;
}

const CMD0_NAMES: &[(u32, &str)] = &[
  (cmd0::NPU_OP_STOP, "NPU_OP_STOP"),
  (cmd0::NPU_OP_IRQ, "NPU_OP_IRQ"),
  (cmd0::NPU_OP_CONV, "NPU_OP_CONV"),
  (cmd0::NPU_OP_DEPTHWISE, "NPU_OP_DEPTHWISE"),
  (cmd0::NPU_OP_POOL, "NPU_OP_POOL"),
  (cmd0::NPU_OP_ELEMENTWISE, "NPU_OP_ELEMENTWISE"),
  (cmd0::NPU_OP_DMA_START, "NPU_OP_DMA_START"),
  (cmd0::NPU_OP_DMA_WAIT, "NPU_OP_DMA_WAIT"),
  (cmd0::NPU_OP_KERNEL_WAIT, "NPU_OP_KERNEL_WAIT"),
  (cmd0::NPU_SET_IFM_PAD_TOP, "NPU_SET_IFM_PAD_TOP"),
  (cmd0::NPU_SET_IFM_PAD_LEFT, "NPU_SET_IFM_PAD_LEFT"),
  (cmd0::NPU_SET_IFM_PAD_RIGHT, "NPU_SET_IFM_PAD_RIGHT"),
  (cmd0::NPU_SET_IFM_PAD_BOTTOM, "NPU_SET_IFM_PAD_BOTTOM"),
  (cmd0::NPU_SET_IFM_DEPTH_M1, "NPU_SET_IFM_DEPTH_M1"),
  (cmd0::NPU_SET_IFM_PRECISION, "NPU_SET_IFM_PRECISION"),
  (cmd0::NPU_SET_IFM_UPSCALE, "NPU_SET_IFM_UPSCALE"),
  (cmd0::NPU_SET_IFM_ZERO_POINT, "NPU_SET_IFM_ZERO_POINT"),
  (cmd0::NPU_SET_IFM_WIDTH0_M1, "NPU_SET_IFM_WIDTH0_M1"),
  (cmd0::NPU_SET_IFM_HEIGHT0_M1, "NPU_SET_IFM_HEIGHT0_M1"),
  (cmd0::NPU_SET_IFM_HEIGHT1_M1, "NPU_SET_IFM_HEIGHT1_M1"),
  (cmd0::NPU_SET_IFM_IB_END, "NPU_SET_IFM_IB_END"),
  (cmd0::NPU_SET_IFM_REGION, "NPU_SET_IFM_REGION"),
  (cmd0::NPU_SET_OFM_WIDTH_M1, "NPU_SET_OFM_WIDTH_M1"),
  (cmd0::NPU_SET_OFM_HEIGHT_M1, "NPU_SET_OFM_HEIGHT_M1"),
  (cmd0::NPU_SET_OFM_DEPTH_M1, "NPU_SET_OFM_DEPTH_M1"),
  (cmd0::NPU_SET_OFM_PRECISION, "NPU_SET_OFM_PRECISION"),
  (cmd0::NPU_SET_OFM_BLK_WIDTH_M1, "NPU_SET_OFM_BLK_WIDTH_M1"),
  (cmd0::NPU_SET_OFM_BLK_HEIGHT_M1, "NPU_SET_OFM_BLK_HEIGHT_M1"),
  (cmd0::NPU_SET_OFM_BLK_DEPTH_M1, "NPU_SET_OFM_BLK_DEPTH_M1"),
  (cmd0::NPU_SET_OFM_ZERO_POINT, "NPU_SET_OFM_ZERO_POINT"),
  (cmd0::NPU_SET_OFM_WIDTH0_M1, "NPU_SET_OFM_WIDTH0_M1"),
  (cmd0::NPU_SET_OFM_HEIGHT0_M1, "NPU_SET_OFM_HEIGHT0_M1"),
  (cmd0::NPU_SET_OFM_HEIGHT1_M1, "NPU_SET_OFM_HEIGHT1_M1"),
  (cmd0::NPU_SET_OFM_REGION, "NPU_SET_OFM_REGION"),
  (cmd0::NPU_SET_KERNEL_WIDTH_M1, "NPU_SET_KERNEL_WIDTH_M1"),
  (cmd0::NPU_SET_KERNEL_HEIGHT_M1, "NPU_SET_KERNEL_HEIGHT_M1"),
  (cmd0::NPU_SET_KERNEL_STRIDE, "NPU_SET_KERNEL_STRIDE"),
  (cmd0::NPU_SET_PARALLEL_MODE, "NPU_SET_PARALLEL_MODE"),
  (cmd0::NPU_SET_ACC_FORMAT, "NPU_SET_ACC_FORMAT"),
  (cmd0::NPU_SET_ACTIVATION, "NPU_SET_ACTIVATION"),
  (cmd0::NPU_SET_ACTIVATION_MIN, "NPU_SET_ACTIVATION_MIN"),
  (cmd0::NPU_SET_ACTIVATION_MAX, "NPU_SET_ACTIVATION_MAX"),
  (cmd0::NPU_SET_WEIGHT_REGION, "NPU_SET_WEIGHT_REGION"),
  (cmd0::NPU_SET_SCALE_REGION, "NPU_SET_SCALE_REGION"),
  (cmd0::NPU_SET_AB_START, "NPU_SET_AB_START"),
  (cmd0::NPU_SET_BLOCKDEP, "NPU_SET_BLOCKDEP"),
  (cmd0::NPU_SET_DMA0_SRC_REGION, "NPU_SET_DMA0_SRC_REGION"),
  (cmd0::NPU_SET_DMA0_DST_REGION, "NPU_SET_DMA0_DST_REGION"),
  (cmd0::NPU_SET_IFM2_BROADCAST, "NPU_SET_IFM2_BROADCAST"),
  (cmd0::NPU_SET_IFM2_PRECISION, "NPU_SET_IFM2_PRECISION"),
  (cmd0::NPU_SET_IFM2_ZERO_POINT, "NPU_SET_IFM2_ZERO_POINT"),
  (cmd0::NPU_SET_IFM2_WIDTH0_M1, "NPU_SET_IFM2_WIDTH0_M1"),
  (cmd0::NPU_SET_IFM2_HEIGHT0_M1, "NPU_SET_IFM2_HEIGHT0_M1"),
  (cmd0::NPU_SET_IFM2_HEIGHT1_M1, "NPU_SET_IFM2_HEIGHT1_M1"),
  (cmd0::NPU_SET_IFM2_IB_START, "NPU_SET_IFM2_IB_START"),
  (cmd0::NPU_SET_IFM2_REGION, "NPU_SET_IFM2_REGION"),
];

const CMD1_NAMES: &[(u32, &str)] = &[
  (cmd1::NPU_SET_IFM_BASE0, "NPU_SET_IFM_BASE0"),
  (cmd1::NPU_SET_IFM_BASE1, "NPU_SET_IFM_BASE1"),
  (cmd1::NPU_SET_IFM_BASE2, "NPU_SET_IFM_BASE2"),
  (cmd1::NPU_SET_IFM_BASE3, "NPU_SET_IFM_BASE3"),
  (cmd1::NPU_SET_IFM_STRIDE_X, "NPU_SET_IFM_STRIDE_X"),
  (cmd1::NPU_SET_IFM_STRIDE_Y, "NPU_SET_IFM_STRIDE_Y"),
  (cmd1::NPU_SET_IFM_STRIDE_C, "NPU_SET_IFM_STRIDE_C"),
  (cmd1::NPU_SET_OFM_BASE0, "NPU_SET_OFM_BASE0"),
  (cmd1::NPU_SET_OFM_BASE1, "NPU_SET_OFM_BASE1"),
  (cmd1::NPU_SET_OFM_BASE2, "NPU_SET_OFM_BASE2"),
  (cmd1::NPU_SET_OFM_BASE3, "NPU_SET_OFM_BASE3"),
  (cmd1::NPU_SET_OFM_STRIDE_X, "NPU_SET_OFM_STRIDE_X"),
  (cmd1::NPU_SET_OFM_STRIDE_Y, "NPU_SET_OFM_STRIDE_Y"),
  (cmd1::NPU_SET_OFM_STRIDE_C, "NPU_SET_OFM_STRIDE_C"),
  (cmd1::NPU_SET_WEIGHT_BASE, "NPU_SET_WEIGHT_BASE"),
  (cmd1::NPU_SET_WEIGHT_LENGTH, "NPU_SET_WEIGHT_LENGTH"),
  (cmd1::NPU_SET_SCALE_BASE, "NPU_SET_SCALE_BASE"),
  (cmd1::NPU_SET_SCALE_LENGTH, "NPU_SET_SCALE_LENGTH"),
  (cmd1::NPU_SET_OFM_SCALE, "NPU_SET_OFM_SCALE"),
  (cmd1::NPU_SET_OPA_SCALE, "NPU_SET_OPA_SCALE"),
  (cmd1::NPU_SET_OPB_SCALE, "NPU_SET_OPB_SCALE"),
  (cmd1::NPU_SET_DMA0_SRC, "NPU_SET_DMA0_SRC"),
  (cmd1::NPU_SET_DMA0_DST, "NPU_SET_DMA0_DST"),
  (cmd1::NPU_SET_DMA0_LEN, "NPU_SET_DMA0_LEN"),
  (cmd1::NPU_SET_IFM2_BASE0, "NPU_SET_IFM2_BASE0"),
  (cmd1::NPU_SET_IFM2_BASE1, "NPU_SET_IFM2_BASE1"),
  (cmd1::NPU_SET_IFM2_BASE2, "NPU_SET_IFM2_BASE2"),
  (cmd1::NPU_SET_IFM2_BASE3, "NPU_SET_IFM2_BASE3"),
  (cmd1::NPU_SET_IFM2_STRIDE_X, "NPU_SET_IFM2_STRIDE_X"),
  (cmd1::NPU_SET_IFM2_STRIDE_Y, "NPU_SET_IFM2_STRIDE_Y"),
  (cmd1::NPU_SET_IFM2_STRIDE_C, "NPU_SET_IFM2_STRIDE_C"),
];

/// Printable register name for a short (`long == false`) or long command.
pub fn cmd_name(long: bool, opcode: u32) -> &'static str {
  let table = if long { CMD1_NAMES } else { CMD0_NAMES };
  table
    .iter()
    .find(|(code, _)| *code == opcode & OPCODE_MASK)
    .map(|(_, name)| *name)
    .unwrap_or("UNKNOWN")
}

/// Which operand of an elementwise operation carries the input rescale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OpToScale {
  #[default]
  None,
  OpA,
  OpB,
}

impl OpToScale {
  pub fn bits(&self) -> u32 {
    match self {
      OpToScale::None => 0,
      OpToScale::OpA => 1,
      OpToScale::OpB => 2,
    }
  }
}

/// `NPU_SET_IFM_PRECISION` / `NPU_SET_IFM2_PRECISION` payload.
pub fn ifm_precision(signed: bool, format: u32, op_to_scale: OpToScale) -> u32 {
  (signed as u32) | (format << 6) | (op_to_scale.bits() << 14)
}

/// `NPU_SET_OFM_PRECISION` payload.
pub fn ofm_precision(signed: bool, format: u32, scale_mode: bool, round_mode: u32) -> u32 {
  (signed as u32) | (format << 6) | ((scale_mode as u32) << 8) | (round_mode << 14)
}

/// `NPU_SET_KERNEL_STRIDE` payload.
///
/// The low bit of each stride minus one sits in bits 0/1, the high bit in
/// bit 6 (x) or 9 (y). Strides must be in `1..=4` and dilations in `1..=2`.
pub fn kernel_stride(
  stride_x: u32,
  stride_y: u32,
  dilation_x: u32,
  dilation_y: u32,
  part_kernel_first: bool,
) -> Result<u32, EncodingError> {
  let check = |value: u32, max: u32| {
    if (1..=max).contains(&value) {
      Ok(value - 1)
    } else {
      Err(EncodingError::FieldOverflow {
        command: cmd_name(false, cmd0::NPU_SET_KERNEL_STRIDE),
        value: value as i64,
      })
    }
  };
  let sx = check(stride_x, STRIDE_MAX)?;
  let sy = check(stride_y, STRIDE_MAX)?;
  let dx = check(dilation_x, DILATION_MAX)?;
  let dy = check(dilation_y, DILATION_MAX)?;

  let mut word = sx & 1;
  word |= (sy & 1) << 1;
  word |= (part_kernel_first as u32) << 2;
  word |= dx << 3;
  word |= dy << 4;
  word |= (sx >> 1) << 6;
  word |= (sy >> 1) << 9;
  Ok(word)
}
