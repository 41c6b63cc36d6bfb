use serde::{Deserialize, Serialize};

use super::encode::compress_weights;
use crate::error::CodecError;

/// Geometry of a weight tensor and of the blocks the hardware consumes it in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderParams {
  pub ifm_ublock_depth: usize,
  pub ofm_ublock_depth: usize,
  pub ofm_depth: usize,
  pub kernel_height: usize,
  pub kernel_width: usize,
  pub ifm_depth: usize,
  /// Element strides of the source tensor along OFM, kernel y, kernel x and IFM.
  pub strides: [usize; 4],
  pub ofm_block_depth: usize,
  pub depthwise: bool,
  pub part_kernel_first: bool,
  pub ifm_bitdepth: u32,
  /// Largest sub-kernel the hardware walks in one pass.
  pub decomp_h: usize,
  pub decomp_w: usize,
}

impl ReorderParams {
  fn validate(&self, len: usize) -> Result<(), CodecError> {
    let steps = [
      ("ifm_ublock_depth", self.ifm_ublock_depth),
      ("ofm_ublock_depth", self.ofm_ublock_depth),
      ("ofm_block_depth", self.ofm_block_depth),
      ("decomp_h", self.decomp_h),
      ("decomp_w", self.decomp_w),
    ];
    if let Some((name, _)) = steps.iter().find(|(_, value)| *value == 0) {
      return Err(CodecError::InvalidWeightShape(format!("{} must be non-zero", name)));
    }
    if self.ifm_bitdepth != 8 && self.ifm_bitdepth != 16 {
      return Err(CodecError::InvalidWeightShape(format!(
        "unsupported ifm bit depth {}",
        self.ifm_bitdepth
      )));
    }

    let dims = [self.ofm_depth, self.kernel_height, self.kernel_width, self.ifm_depth];
    if dims.contains(&0) {
      return Err(CodecError::InvalidWeightShape(format!("empty weight tensor {:?}", dims)));
    }
    let last = dims
      .iter()
      .zip(self.strides)
      .map(|(dim, stride)| (dim - 1) * stride)
      .sum::<usize>();
    if last >= len {
      return Err(CodecError::InvalidWeightShape(format!(
        "weight tensor {:?} with strides {:?} needs more than {} elements",
        dims, self.strides, len
      )));
    }
    Ok(())
  }

  fn weight(&self, weights: &[i16], ofm_z: usize, wy: usize, wx: usize, ifm_z: usize) -> i16 {
    let [s_ofm, s_y, s_x, s_ifm] = self.strides;
    weights[ofm_z * s_ofm + wy * s_y + wx * s_x + ifm_z * s_ifm]
  }
}

/// Rearranges weights into the order the weight decoder streams them.
///
/// Blocks of OFM channels are walked outermost, then IFM blocks, sub-kernels,
/// micro-blocks and kernel elements. Positions outside the tensor, and the
/// padding of kernel elements, are filled with zeros.
pub fn reorder(params: &ReorderParams, weights: &[i16]) -> Result<Vec<i16>, CodecError> {
  params.validate(weights.len())?;
  let p = params;

  let ifm_block_depth = if p.part_kernel_first || p.ifm_bitdepth == 16 { 16 } else { 32 };
  let ifm_block_end = if p.depthwise { 1 } else { p.ifm_depth };

  let mut out = Vec::new();
  out.try_reserve(weights.len())?;

  for ofm_block_z in (0..p.ofm_depth).step_by(p.ofm_block_depth) {
    let clipped_ofm_block_depth = p.ofm_block_depth.min(p.ofm_depth - ofm_block_z);

    for ifm_block_z in (0..ifm_block_end).step_by(ifm_block_depth) {
      let clipped_ifm_block_depth = if p.depthwise {
        p.ifm_ublock_depth
      } else if p.part_kernel_first {
        ifm_block_depth.min(p.ifm_depth - ifm_block_z)
      } else {
        ifm_block_depth
      };

      for subkernel_y in (0..p.kernel_height).step_by(p.decomp_h) {
        let sub_height = (p.kernel_height - subkernel_y).min(p.decomp_h);

        for subkernel_x in (0..p.kernel_width).step_by(p.decomp_w) {
          let sub_width = (p.kernel_width - subkernel_x).min(p.decomp_w);

          // Part-kernel-first and depthwise walk kernel elements in padded groups.
          let mut subkernel_elements = sub_width * sub_height;
          if p.part_kernel_first {
            let group = if p.ifm_bitdepth == 16 { 2 } else { 4 };
            subkernel_elements = subkernel_elements.next_multiple_of(group);
          } else if p.depthwise {
            subkernel_elements = subkernel_elements.next_multiple_of(4);
          }

          let (ifm_depth_outer, ifm_depth_inner) = if p.part_kernel_first {
            (clipped_ifm_block_depth, 1)
          } else {
            (1, clipped_ifm_block_depth)
          };

          for ifm_ublk_outer in (0..ifm_depth_outer).step_by(p.ifm_ublock_depth) {
            for ofm_ublk in (0..clipped_ofm_block_depth).step_by(p.ofm_ublock_depth) {
              for element in 0..subkernel_elements {
                let kx = element % sub_width;
                let ky = element / sub_width;

                for ifm_ublk_inner in (0..ifm_depth_inner).step_by(p.ifm_ublock_depth) {
                  for ofm_ublock_z in 0..p.ofm_ublock_depth {
                    let ifm_ublock_end = if p.depthwise { 1 } else { p.ifm_ublock_depth };
                    for ifm_ublock_z in 0..ifm_ublock_end {
                      let ifm_z = ifm_block_z + ifm_ublk_inner + ifm_ublk_outer + ifm_ublock_z;
                      let ofm_z = ofm_block_z + ofm_ublk + ofm_ublock_z;
                      let value = if ifm_z < p.ifm_depth && ofm_z < p.ofm_depth && ky < sub_height {
                        p.weight(weights, ofm_z, subkernel_y + ky, subkernel_x + kx, ifm_z)
                      } else {
                        0
                      };
                      out.try_reserve(1)?;
                      out.push(value);
                    }
                  }
                }
              }
            }
          }
        }
      }
    }
  }

  Ok(out)
}

/// Reorders then compresses a weight tensor.
///
/// Returns the compressed stream and the number of weights after padding.
pub fn reorder_encode(params: &ReorderParams, weights: &[i16]) -> Result<(Vec<u8>, usize), CodecError> {
  let reordered = reorder(params, weights)?;
  log::debug!(
    "reorder: {}x{}x{}x{} -> {} weights (depthwise {}, part kernel first {})",
    params.ofm_depth,
    params.kernel_height,
    params.kernel_width,
    params.ifm_depth,
    reordered.len(),
    params.depthwise,
    params.part_kernel_first
  );
  let stream = compress_weights(&reordered)?;
  Ok((stream, reordered.len()))
}
