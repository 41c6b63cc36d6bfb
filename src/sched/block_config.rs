use super::BlockConfig;
use crate::arch::shram::{
  ACC_BITS, ACC_FORMAT_INT32, ACC_GRANULE, BANK_SIZE_BYTES, IFM_GRANULE, SHRAM_RESERVED_END_BANKS,
  SHRAM_RESERVED_OUTPUT_BANKS, SHRAM_TOTAL_BANKS,
};
use crate::arch::{
  align_up, div_round_up, Block, ShramLayout, ARCH_OFM_BLOCK_MAX, ARCH_SPLIT_DEPTH, IFM_UBLOCK, OFM_UBLOCK,
  SUB_KERNEL_MAX,
};
use crate::graph::{OpCommon, Operation, OperationKind};

/// LUT banks are allocated in units of this many bytes.
const LUT_BANK_BYTES: u32 = 1024;

fn required_input_size(value: u32, stride: u32, border: u32) -> u32 {
  (value - 1) * stride + border
}

/// Input block needed to produce `ofm_block`, before the depth rule is applied.
fn ifm_block_size(common: &OpCommon, ofm_block: Block) -> Block {
  let kernel = &common.kernel;

  let height = required_input_size(
    ofm_block.height,
    kernel.stride_y,
    kernel.dilated_height().min(SUB_KERNEL_MAX.height),
  );
  let width = required_input_size(
    ofm_block.width,
    kernel.stride_x,
    kernel.dilated_width().min(SUB_KERNEL_MAX.width),
  );

  Block::new(
    align_up(height, OFM_UBLOCK.height),
    align_up(width, OFM_UBLOCK.width),
    ofm_block.depth,
  )
}

/// Places the IFM, IFM2, accumulator and LUT regions for one candidate block.
///
/// Returns `None` when the candidate does not fit in SHRAM.
pub fn try_block_config(op: &Operation, ofm_block: Block, ifm_block: Block) -> Option<ShramLayout> {
  let is_elementwise = op.kind() == OperationKind::Elementwise;

  let ifm_bytes = ifm_block.width * ifm_block.height * align_up(ifm_block.depth, 8);
  let ifm_banks = align_up(div_round_up(ifm_bytes, BANK_SIZE_BYTES) * 2, IFM_GRANULE);
  let lut_bytes = match op {
    Operation::Elementwise { lut_bytes, .. } => *lut_bytes,
    _ => 0,
  };
  let lut_banks = div_round_up(lut_bytes, LUT_BANK_BYTES).max(SHRAM_RESERVED_END_BANKS);
  let lut_start = SHRAM_TOTAL_BANKS.checked_sub(lut_banks)?;
  let mut ifm_end = SHRAM_RESERVED_OUTPUT_BANKS + ifm_banks;
  let ifm2_start = ifm_end;
  let mut acc_start = lut_start;

  if !is_elementwise {
    let acc_bytes = ofm_block.width * ofm_block.height * align_up(ofm_block.depth, 8) * ACC_BITS / 8;
    let acc_banks = align_up(div_round_up(acc_bytes, BANK_SIZE_BYTES) * 2, ACC_GRANULE);
    acc_start = acc_start.checked_sub(acc_banks)?;
  } else {
    // The second input is a full tensor of the same block shape.
    let ifm2_banks = ifm_banks;
    if ifm2_start + ifm2_banks > acc_start {
      return None;
    }
    ifm_end = acc_start;
  }

  if ifm_end > acc_start {
    return None;
  }

  Some(ShramLayout {
    ib_start: SHRAM_RESERVED_OUTPUT_BANKS,
    ib_start2: ifm2_start,
    ib_end: ifm_end,
    ab_start: acc_start,
    lut_start,
  })
}

/// Searches the OFM block shapes that fit SHRAM and keeps the one with the
/// lowest estimated external traffic.
///
/// Returns the zeroed default when nothing fits.
pub fn find_block_config(op: &Operation) -> BlockConfig {
  let mut config = BlockConfig::default();
  let Some(common) = op.common() else {
    return config;
  };

  let ifm = common.ifm.shape;
  let ofm = common.ofm.shape;
  let kind = op.kind();
  let is_depthwise = op.is_depthwise();
  let is_equal_depth = kind == OperationKind::Pooling || is_depthwise || kind == OperationKind::Elementwise;
  let is_convolution = kind == OperationKind::Convolution;
  let ofm_elements = ofm.elements() as f32;
  let ifm_elements = ifm.elements() as f32;

  let mut best_cost = f32::MAX;
  let mut best_coverage = f32::MAX;

  let mut search_space = Block::new(
    ARCH_OFM_BLOCK_MAX.height.min(ofm.height),
    ARCH_OFM_BLOCK_MAX.width.min(ofm.width),
    ARCH_OFM_BLOCK_MAX.depth.min(ofm.depth),
  );

  let mut depth = OFM_UBLOCK.depth.max(search_space.depth.min(ARCH_SPLIT_DEPTH));
  if depth < ofm.depth {
    depth = align_up(depth, ARCH_SPLIT_DEPTH);
  }

  search_space.height = align_up(search_space.height, OFM_UBLOCK.height);
  search_space.width = align_up(search_space.width, OFM_UBLOCK.width);
  search_space.depth = align_up(search_space.depth, OFM_UBLOCK.depth);

  let rows = search_space.height as usize + 1;
  let cols = search_space.width as usize + 1;

  while depth <= search_space.depth {
    // A block that fits at one depth may stop fitting once height or width
    // grow, so failures are only remembered within one depth slice.
    let mut wont_fit = vec![vec![false; cols]; rows];

    for height in (OFM_UBLOCK.height..=search_space.height).step_by(OFM_UBLOCK.height as usize) {
      for width in (OFM_UBLOCK.width..=search_space.width).step_by(OFM_UBLOCK.width as usize) {
        if wont_fit[height as usize][width as usize] {
          continue;
        }

        let ofm_block = Block::new(height, width, depth);
        let mut ifm_block = ifm_block_size(common, ofm_block);
        if !is_equal_depth {
          let max_depth = if op.is_part_kernel_first() { 16 } else { 32 };
          ifm_block.depth = align_up(ifm.depth.min(max_depth), IFM_UBLOCK.depth);
        }

        let Some(layout) = try_block_config(op, ofm_block, ifm_block) else {
          // Bank usage only grows with the block, so every larger block fails too.
          for row in wont_fit.iter_mut().skip(height as usize) {
            for cell in row.iter_mut().skip(width as usize) {
              *cell = true;
            }
          }
          continue;
        };

        let full_blocks = Block::new(
          div_round_up(ofm.height, height),
          div_round_up(ofm.width, width),
          div_round_up(ofm.depth, depth),
        );
        let blocks = [
          ofm.width as f32 / width as f32,
          ofm.height as f32 / height as f32,
          ofm.depth as f32 / depth as f32,
        ];

        let weight_area = if is_convolution { common.kernel.area() as f32 } else { 0.0 };
        let mut weight_fetch =
          weight_area * ifm.depth as f32 * full_blocks.width as f32 * full_blocks.height as f32;
        if !is_depthwise {
          weight_fetch *= blocks[2] * depth as f32;
        }

        let mut ifm_fetch = ifm_block.width as f32 * ifm_block.height as f32 * ifm.depth as f32 * blocks[0] * blocks[1];
        if !is_equal_depth {
          ifm_fetch *= full_blocks.depth as f32;
        }

        let mut relative_cost = if kind != OperationKind::Elementwise {
          (ifm_fetch + weight_fetch) / ofm_elements
        } else {
          ofm_elements / (height * width * depth) as f32
        };

        if ifm_elements < (ifm_block.elements() * 2) as f32 {
          relative_cost /= 2.0;
        }

        if relative_cost > best_cost {
          continue;
        }

        let choose_this = if relative_cost == best_cost {
          let coverage_height = ifm_block.height.min(ifm.height);
          let coverage_width = ifm_block.width.min(ifm.width);
          let coverage = (ifm.width * ifm.height) as f32 / (coverage_width * coverage_height).max(1) as f32;
          if coverage <= best_coverage && height <= 4 && width <= 4 {
            best_coverage = coverage;
            true
          } else {
            false
          }
        } else {
          best_coverage = f32::MAX;
          true
        };

        if choose_this {
          config = BlockConfig {
            ofm_block,
            ifm_block,
            shram_layout: layout,
            acc_format: ACC_FORMAT_INT32,
          };
          best_cost = relative_cost;
        }
      }
    }

    depth += OFM_UBLOCK.depth;
    if depth < ofm.depth {
      depth = align_up(depth, ARCH_SPLIT_DEPTH);
    }
  }

  log::debug!(
    "{:?}: ofm {:?} -> ofm block {:?}, ifm block {:?}, cost {}",
    kind,
    ofm,
    config.ofm_block,
    config.ifm_block,
    best_cost
  );

  config
}
