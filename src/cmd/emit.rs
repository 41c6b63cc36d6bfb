use super::regs::{cmd0, cmd1, cmd_name, ifm_precision, kernel_stride, ofm_precision, OpToScale};
use super::scale::{elementwise_scales, pooling_ofm_scale};
use super::stream::CommandStream;
use crate::arch::{COEFS_REGION, IO_REGION, SCRATCH_REGION};
use crate::compiler::CompilerOptions;
use crate::error::EncodingError;
use crate::graph::{AddressRange, FeatureMap, OpCommon, Operation};
use crate::hazard::{calc_blockdep, Waits, MAX_BLOCKDEP};
use crate::sched::BlockConfig;

/// Accumulator format programmed on parts without SHRAM registers.
const U55_ACC_FORMAT: u32 = 0x300;

/// Register block of one feature map.
struct FeatureMapRegs {
  region: u32,
  bases: [u32; 4],
  height0_m1: u32,
  height1_m1: u32,
  width0_m1: u32,
  stride_x: u32,
  stride_y: u32,
  stride_c: u32,
  zero_point: u32,
}

const IFM_REGS: FeatureMapRegs = FeatureMapRegs {
  region: cmd0::NPU_SET_IFM_REGION,
  bases: [
    cmd1::NPU_SET_IFM_BASE0,
    cmd1::NPU_SET_IFM_BASE1,
    cmd1::NPU_SET_IFM_BASE2,
    cmd1::NPU_SET_IFM_BASE3,
  ],
  height0_m1: cmd0::NPU_SET_IFM_HEIGHT0_M1,
  height1_m1: cmd0::NPU_SET_IFM_HEIGHT1_M1,
  width0_m1: cmd0::NPU_SET_IFM_WIDTH0_M1,
  stride_x: cmd1::NPU_SET_IFM_STRIDE_X,
  stride_y: cmd1::NPU_SET_IFM_STRIDE_Y,
  stride_c: cmd1::NPU_SET_IFM_STRIDE_C,
  zero_point: cmd0::NPU_SET_IFM_ZERO_POINT,
};

const IFM2_REGS: FeatureMapRegs = FeatureMapRegs {
  region: cmd0::NPU_SET_IFM2_REGION,
  bases: [
    cmd1::NPU_SET_IFM2_BASE0,
    cmd1::NPU_SET_IFM2_BASE1,
    cmd1::NPU_SET_IFM2_BASE2,
    cmd1::NPU_SET_IFM2_BASE3,
  ],
  height0_m1: cmd0::NPU_SET_IFM2_HEIGHT0_M1,
  height1_m1: cmd0::NPU_SET_IFM2_HEIGHT1_M1,
  width0_m1: cmd0::NPU_SET_IFM2_WIDTH0_M1,
  stride_x: cmd1::NPU_SET_IFM2_STRIDE_X,
  stride_y: cmd1::NPU_SET_IFM2_STRIDE_Y,
  stride_c: cmd1::NPU_SET_IFM2_STRIDE_C,
  zero_point: cmd0::NPU_SET_IFM2_ZERO_POINT,
};

const OFM_REGS: FeatureMapRegs = FeatureMapRegs {
  region: cmd0::NPU_SET_OFM_REGION,
  bases: [
    cmd1::NPU_SET_OFM_BASE0,
    cmd1::NPU_SET_OFM_BASE1,
    cmd1::NPU_SET_OFM_BASE2,
    cmd1::NPU_SET_OFM_BASE3,
  ],
  height0_m1: cmd0::NPU_SET_OFM_HEIGHT0_M1,
  height1_m1: cmd0::NPU_SET_OFM_HEIGHT1_M1,
  width0_m1: cmd0::NPU_SET_OFM_WIDTH0_M1,
  stride_x: cmd1::NPU_SET_OFM_STRIDE_X,
  stride_y: cmd1::NPU_SET_OFM_STRIDE_Y,
  stride_c: cmd1::NPU_SET_OFM_STRIDE_C,
  zero_point: cmd0::NPU_SET_OFM_ZERO_POINT,
};

/// Turns scheduled operations and their waits into command words.
pub struct Encoder<'a> {
  stream: CommandStream,
  options: &'a CompilerOptions,
  prev_compute: Option<&'a Operation>,
}

impl<'a> Encoder<'a> {
  pub fn new(options: &'a CompilerOptions) -> Self {
    Self {
      stream: CommandStream::new(options.debug_msgs),
      options,
      prev_compute: None,
    }
  }

  /// Stream prologue.
  pub fn begin(&mut self) -> Result<(), EncodingError> {
    if self.options.variant.has_shram_registers() {
      self.stream.emit0(cmd0::NPU_SET_PARALLEL_MODE, 0)?;
    }
    Ok(())
  }

  /// Stream epilogue; consumes the encoder.
  pub fn finish(mut self) -> Result<Vec<u32>, EncodingError> {
    self.stream.emit0(cmd0::NPU_OP_STOP, 0xffff)?;
    Ok(self.stream.into_words())
  }

  pub fn encode_operation(&mut self, index: usize, op: &'a Operation, waits: Waits) -> Result<(), EncodingError> {
    match op {
      Operation::Convolution {
        common,
        weights,
        scales,
        part_kernel_first,
      } => {
        let config = scheduled(index, common)?;
        self.emit_common(common, config, OpToScale::None, false, *part_kernel_first, Some((weights, scales)))?;
      }
      Operation::Pooling { common, avg } => {
        let config = scheduled(index, common)?;
        self.emit_common(common, config, OpToScale::None, false, false, None)?;
        if *avg {
          let (scale, shift) =
            pooling_ofm_scale(common.ifm.scale, common.ofm.scale, common.kernel.height, common.kernel.width)?;
          self.stream.emit1(cmd1::NPU_SET_OFM_SCALE, shift, scale as u64)?;
        }
      }
      Operation::Elementwise { common, ifm2, .. } => {
        let config = scheduled(index, common)?;
        let scales = elementwise_scales(common.ifm.scale, ifm2.scale, common.ofm.scale);
        self
          .stream
          .emit1(cmd1::NPU_SET_OPA_SCALE, scales.opa_shift, scales.opa_scale as u64)?;
        self.stream.emit1(cmd1::NPU_SET_OPB_SCALE, 0, 0)?;
        self
          .stream
          .emit1(cmd1::NPU_SET_OFM_SCALE, scales.ofm_shift, scales.ofm_scale as u64)?;

        self.emit_common(common, config, scales.op_to_scale, true, false, None)?;

        self.emit_input(&IFM2_REGS, ifm2, None)?;
        self.stream.emit0(
          cmd0::NPU_SET_IFM2_PRECISION,
          ifm_precision(ifm2.is_signed, ifm2.layout.format_bits(), OpToScale::None),
        )?;
        self.stream.emit0(cmd0::NPU_SET_IFM2_BROADCAST, 0)?;
      }
      Operation::Dma { address, size } => {
        self.stream.emit0(cmd0::NPU_SET_DMA0_SRC_REGION, COEFS_REGION)?;
        self.stream.emit1(cmd1::NPU_SET_DMA0_SRC, 0, *address as u64)?;
        self.stream.emit0(cmd0::NPU_SET_DMA0_DST_REGION, SCRATCH_REGION)?;
        self.stream.emit1(cmd1::NPU_SET_DMA0_DST, 0, 0)?;
        self.stream.emit1(cmd1::NPU_SET_DMA0_LEN, 0, *size as u64)?;
      }
    }

    if !op.is_dma() {
      let blockdep = calc_blockdep(self.prev_compute, op).min(MAX_BLOCKDEP);
      self.stream.emit0(cmd0::NPU_SET_BLOCKDEP, blockdep)?;
      self.prev_compute = Some(op);
    }

    if let Some(dma) = waits.dma {
      self.stream.emit0(cmd0::NPU_OP_DMA_WAIT, dma)?;
    }
    if let Some(compute) = waits.compute {
      self.stream.emit0(cmd0::NPU_OP_KERNEL_WAIT, compute)?;
    }

    match op {
      Operation::Convolution { common, .. } if common.kernel.depthwise => {
        self.stream.emit0(cmd0::NPU_OP_DEPTHWISE, 0)
      }
      Operation::Convolution { .. } => self.stream.emit0(cmd0::NPU_OP_CONV, 0),
      Operation::Pooling { avg, .. } => self.stream.emit0(cmd0::NPU_OP_POOL, *avg as u32),
      Operation::Elementwise { .. } => self.stream.emit0(cmd0::NPU_OP_ELEMENTWISE, 1),
      Operation::Dma { .. } => self.stream.emit0(cmd0::NPU_OP_DMA_START, 0),
    }
  }

  fn emit_strides(&mut self, regs: &FeatureMapRegs, c: u32, y: u32, x: u32) -> Result<(), EncodingError> {
    self.stream.emit1(regs.stride_c, 0, c as u64)?;
    self.stream.emit1(regs.stride_y, 0, y as u64)?;
    self.stream.emit1(regs.stride_x, 0, x as u64)
  }

  fn emit_m1(&mut self, cmd: u32, value: u32) -> Result<(), EncodingError> {
    let Some(param) = value.checked_sub(1) else {
      return Err(EncodingError::FieldOverflow {
        command: cmd_name(false, cmd),
        value: -1,
      });
    };
    self.stream.emit0(cmd, param)
  }

  fn emit_common(
    &mut self,
    common: &OpCommon,
    config: &BlockConfig,
    op_to_scale: OpToScale,
    elementwise: bool,
    part_kernel_first: bool,
    coefficients: Option<(&AddressRange, &AddressRange)>,
  ) -> Result<(), EncodingError> {
    let OpCommon {
      ifm,
      ofm,
      kernel,
      padding,
      round_mode,
      upscale,
      ..
    } = common;

    // IFM
    self.emit_input(&IFM_REGS, ifm, Some(cmd0::NPU_SET_IFM_DEPTH_M1))?;
    self.stream.emit0(
      cmd0::NPU_SET_IFM_PRECISION,
      ifm_precision(ifm.is_signed, ifm.layout.format_bits(), op_to_scale),
    )?;
    self.stream.emit0(cmd0::NPU_SET_IFM_UPSCALE, *upscale as u32)?;

    if !elementwise {
      self.stream.emit0(cmd0::NPU_SET_IFM_PAD_TOP, padding.top)?;
      self.stream.emit0(cmd0::NPU_SET_IFM_PAD_LEFT, padding.left)?;
      self.stream.emit0(cmd0::NPU_SET_IFM_PAD_BOTTOM, padding.bottom)?;
      self.stream.emit0(cmd0::NPU_SET_IFM_PAD_RIGHT, padding.right)?;
    }

    // OFM
    self.stream.emit0(OFM_REGS.region, IO_REGION)?;
    let tiles = ofm.effective_tiles();
    for (cmd, address) in OFM_REGS.bases.iter().zip(tiles.addresses) {
      self.stream.emit1(*cmd, 0, address as u64)?;
    }
    self.emit_m1(OFM_REGS.height0_m1, tiles.height_0)?;
    self.emit_m1(OFM_REGS.height1_m1, tiles.height_1)?;
    self.emit_m1(OFM_REGS.width0_m1, tiles.width_0)?;
    self.emit_m1(cmd0::NPU_SET_OFM_HEIGHT_M1, ofm.shape.height)?;
    self.emit_m1(cmd0::NPU_SET_OFM_WIDTH_M1, ofm.shape.width)?;
    self.emit_m1(cmd0::NPU_SET_OFM_DEPTH_M1, ofm.shape.depth)?;
    let strides = ofm.strides();
    self.emit_strides(&OFM_REGS, strides.c, strides.y, strides.x)?;
    self.stream.emit0_signed(OFM_REGS.zero_point, ofm.zero_point)?;

    // Pooling and elementwise requantize in the output stage.
    let scale_mode = coefficients.is_none();
    self.stream.emit0(
      cmd0::NPU_SET_OFM_PRECISION,
      ofm_precision(ofm.is_signed, ofm.layout.format_bits(), scale_mode, round_mode.bits()),
    )?;

    if !elementwise {
      self.emit_m1(cmd0::NPU_SET_KERNEL_HEIGHT_M1, kernel.dilated_height())?;
      self.emit_m1(cmd0::NPU_SET_KERNEL_WIDTH_M1, kernel.dilated_width())?;
      self.stream.emit0(
        cmd0::NPU_SET_KERNEL_STRIDE,
        kernel_stride(
          kernel.stride_x,
          kernel.stride_y,
          kernel.dilation_x,
          kernel.dilation_y,
          part_kernel_first,
        )?,
      )?;
    }

    if let Some((weights, scales)) = coefficients {
      self.stream.emit0(cmd0::NPU_SET_WEIGHT_REGION, weights.region)?;
      self.stream.emit1(cmd1::NPU_SET_WEIGHT_BASE, 0, weights.address as u64)?;
      self.stream.emit1(cmd1::NPU_SET_WEIGHT_LENGTH, 0, weights.size as u64)?;
      self.stream.emit0(cmd0::NPU_SET_SCALE_REGION, scales.region)?;
      self.stream.emit1(cmd1::NPU_SET_SCALE_BASE, 0, scales.address as u64)?;
      self.stream.emit1(cmd1::NPU_SET_SCALE_LENGTH, 0, scales.size as u64)?;
    }

    self.stream.emit0(cmd0::NPU_SET_ACTIVATION, 0)?;
    let (min, max) = if ofm.is_signed { (0xff80, 0x7f) } else { (0, 0xff) };
    self.stream.emit0(cmd0::NPU_SET_ACTIVATION_MIN, min)?;
    self.stream.emit0(cmd0::NPU_SET_ACTIVATION_MAX, max)?;

    self.emit_m1(cmd0::NPU_SET_OFM_BLK_HEIGHT_M1, config.ofm_block.height)?;
    self.emit_m1(cmd0::NPU_SET_OFM_BLK_WIDTH_M1, config.ofm_block.width)?;
    self.emit_m1(cmd0::NPU_SET_OFM_BLK_DEPTH_M1, config.ofm_block.depth)?;

    if self.options.variant.has_shram_registers() {
      let layout = &config.shram_layout;
      self.stream.emit0(cmd0::NPU_SET_IFM_IB_END, layout.ib_end)?;
      self.stream.emit0(cmd0::NPU_SET_AB_START, layout.ab_start)?;
      if elementwise {
        self.stream.emit0(cmd0::NPU_SET_IFM2_IB_START, layout.ib_start2)?;
      }
      self.stream.emit0(cmd0::NPU_SET_ACC_FORMAT, config.acc_format)?;
    } else {
      self.stream.emit0(cmd0::NPU_SET_ACC_FORMAT, U55_ACC_FORMAT)?;
    }

    Ok(())
  }

  /// Region, bases, tiles, optional depth, strides and zero point of an input feature map.
  fn emit_input(&mut self, regs: &FeatureMapRegs, fm: &FeatureMap, depth_m1: Option<u32>) -> Result<(), EncodingError> {
    let tiles = fm.effective_tiles();
    self.stream.emit0(regs.region, IO_REGION)?;
    for (cmd, address) in regs.bases.iter().zip(tiles.addresses) {
      self.stream.emit1(*cmd, 0, address as u64)?;
    }
    self.emit_m1(regs.height0_m1, tiles.height_0)?;
    self.emit_m1(regs.height1_m1, tiles.height_1)?;
    self.emit_m1(regs.width0_m1, tiles.width_0)?;
    if let Some(cmd) = depth_m1 {
      self.emit_m1(cmd, fm.shape.depth)?;
    }
    let strides = fm.strides();
    self.emit_strides(regs, strides.c, strides.y, strides.x)?;
    self.stream.emit0_signed(regs.zero_point, fm.zero_point)
  }
}

fn scheduled(index: usize, common: &OpCommon) -> Result<&BlockConfig, EncodingError> {
  common
    .block_config
    .as_ref()
    .ok_or(EncodingError::UnscheduledOperation { index })
}

/// Encodes a full command stream. `waits` is indexed like `operations`.
pub fn encode(operations: &[Operation], waits: &[Waits], options: &CompilerOptions) -> Result<Vec<u32>, EncodingError> {
  if waits.len() != operations.len() {
    return Err(EncodingError::WaitsMismatch {
      operations: operations.len(),
      waits: waits.len(),
    });
  }

  let mut encoder = Encoder::new(options);
  encoder.begin()?;
  for (index, (op, op_waits)) in operations.iter().zip(waits).enumerate() {
    encoder.encode_operation(index, op, *op_waits)?;
  }
  encoder.finish()
}
