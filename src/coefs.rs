//! Per-convolution coefficient payloads: the scale/bias table and the
//! compressed weight stream, laid out back to back in the coefficient region.
use serde::{Deserialize, Serialize};

use crate::arch::{align_up, COEFS_REGION, IFM_UBLOCK, OFM_UBLOCK, SUB_KERNEL_MAX};
use crate::cmd::quantize_scale;
use crate::error::CodecError;
use crate::graph::{AddressRange, OpCommon};
use crate::mlw::{reorder_encode, ReorderParams};
use crate::sched::BlockConfig;

/// Bytes per output channel in the scale table.
pub const SCALE_ENTRY_SIZE: usize = 10;
/// Alignment of every buffer placed in the coefficient region.
pub const COEFS_ALIGN: u32 = 16;

const BIAS_MIN: i64 = -(1 << 39);
const BIAS_MAX: i64 = (1 << 39) - 1;

/// Quantized weights of one convolution.
///
/// `shape` is OHWI, or 1HWO for depthwise convolutions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightTensor {
  pub shape: [usize; 4],
  pub values: Vec<u8>,
  #[serde(default)]
  pub zero_point: i32,
  #[serde(default = "default_scale")]
  pub scale: f64,
}

fn default_scale() -> f64 {
  1.0
}

/// Weights and biases of one convolution, as handed over by graph lowering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvCoefficients {
  pub weights: WeightTensor,
  /// One per output channel; empty means all zero.
  #[serde(default)]
  pub biases: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedCoefficients {
  pub scales: Vec<u8>,
  pub weights: Vec<u8>,
}

/// Packs the per-channel bias, multiplier and shift table, padded to 16 bytes.
///
/// Each entry is a 40-bit signed bias, a 32-bit multiplier and a 6-bit shift,
/// little-endian.
pub fn scale_table(biases: &[i64], ofm_depth: usize, scale: f64) -> Result<Vec<u8>, CodecError> {
  if !biases.is_empty() && biases.len() != ofm_depth {
    return Err(CodecError::InvalidWeightShape(format!(
      "{} biases for {} output channels",
      biases.len(),
      ofm_depth
    )));
  }

  let (multiplier, shift) = quantize_scale(scale);
  let size = align_up((ofm_depth * SCALE_ENTRY_SIZE) as u32, COEFS_ALIGN) as usize;
  let mut table = Vec::new();
  table.try_reserve_exact(size)?;

  for channel in 0..ofm_depth {
    let bias = biases.get(channel).copied().unwrap_or(0);
    if !(BIAS_MIN..=BIAS_MAX).contains(&bias) {
      return Err(CodecError::InvalidWeightShape(format!(
        "bias {} of channel {} does not fit 40 bits",
        bias, channel
      )));
    }
    table.extend_from_slice(&bias.to_le_bytes()[..5]);
    table.extend_from_slice(&multiplier.to_le_bytes());
    table.push((shift & 0x3f) as u8);
  }
  table.resize(size, 0);
  Ok(table)
}

/// Reorder parameters for a convolution's weights under its block configuration.
pub fn reorder_params(
  common: &OpCommon,
  config: &BlockConfig,
  part_kernel_first: bool,
  shape: [usize; 4],
) -> ReorderParams {
  let depthwise = common.kernel.depthwise;
  let (ofm_depth, ifm_depth, strides) = if depthwise {
    let [_, _, w, o] = shape;
    (o, 1, [1, w * o, o, 0])
  } else {
    let [o, h, w, i] = shape;
    (o, i, [h * w * i, w * i, i, 1])
  };

  ReorderParams {
    ifm_ublock_depth: IFM_UBLOCK.depth as usize,
    ofm_ublock_depth: OFM_UBLOCK.depth as usize,
    ofm_depth,
    kernel_height: shape[1],
    kernel_width: shape[2],
    ifm_depth,
    strides,
    ofm_block_depth: config.ofm_block.depth as usize,
    depthwise,
    part_kernel_first,
    ifm_bitdepth: 8,
    decomp_h: SUB_KERNEL_MAX.height as usize,
    decomp_w: SUB_KERNEL_MAX.width as usize,
  }
}

/// Builds the scale table and compressed weights of one scheduled convolution.
pub fn encode_coefficients(
  common: &OpCommon,
  config: &BlockConfig,
  part_kernel_first: bool,
  coefs: &ConvCoefficients,
) -> Result<EncodedCoefficients, CodecError> {
  let tensor = &coefs.weights;
  let expected: usize = tensor.shape.iter().product();
  if tensor.values.len() != expected {
    return Err(CodecError::InvalidWeightShape(format!(
      "{} weights for shape {:?}",
      tensor.values.len(),
      tensor.shape
    )));
  }
  if !(0..=255).contains(&tensor.zero_point) {
    return Err(CodecError::InvalidWeightShape(format!(
      "weight zero point {} out of range",
      tensor.zero_point
    )));
  }

  let params = reorder_params(common, config, part_kernel_first, tensor.shape);
  let mut weights = Vec::new();
  weights.try_reserve_exact(tensor.values.len())?;
  weights.extend(tensor.values.iter().map(|&v| (v as i32 - tensor.zero_point) as i16));

  let (stream, padded) = reorder_encode(&params, &weights)?;
  let scale = common.ifm.scale * tensor.scale / common.ofm.scale;
  let scales = scale_table(&coefs.biases, params.ofm_depth, scale)?;

  log::debug!(
    "coefficients: {} scale bytes, {} weights ({} padded) in {} bytes",
    scales.len(),
    weights.len(),
    padded,
    stream.len()
  );
  Ok(EncodedCoefficients { scales, weights: stream })
}

/// Contents of the coefficient region, filled one convolution at a time.
#[derive(Debug, Clone, Default)]
pub struct CoefficientBuffer {
  bytes: Vec<u8>,
}

impl CoefficientBuffer {
  pub fn new() -> Self {
    Self::default()
  }

  /// Appends `data` at the next aligned offset and returns where it landed.
  pub fn push(&mut self, data: &[u8]) -> Result<AddressRange, CodecError> {
    let start = align_up(self.bytes.len() as u32, COEFS_ALIGN) as usize;
    self.bytes.try_reserve(start - self.bytes.len() + data.len())?;
    self.bytes.resize(start, 0);
    self.bytes.extend_from_slice(data);
    Ok(AddressRange::new(COEFS_REGION, start as u32, data.len() as u32))
  }

  /// Appends both buffers of a convolution; the weights directly follow the scales.
  pub fn push_coefficients(&mut self, coefs: &EncodedCoefficients) -> Result<(AddressRange, AddressRange), CodecError> {
    let scales = self.push(&coefs.scales)?;
    let weights = self.push(&coefs.weights)?;
    Ok((scales, weights))
  }

  pub fn len(&self) -> usize {
    self.bytes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bytes.is_empty()
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.bytes
  }

  pub fn into_bytes(self) -> Vec<u8> {
    self.bytes
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::arch::Block;
  use crate::graph::{FeatureMap, Operation};
  use crate::sched::schedule;

  fn conv(ifm_depth: u32, ofm_depth: u32) -> (OpCommon, BlockConfig) {
    let common = OpCommon::new(
      FeatureMap::new(0, Block::new(4, 4, ifm_depth)),
      FeatureMap::new(1, Block::new(4, 4, ofm_depth)),
    );
    let op = Operation::Convolution {
      common: common.clone(),
      weights: AddressRange::default(),
      scales: AddressRange::default(),
      part_kernel_first: false,
    };
    (common, schedule(&op))
  }

  #[test]
  fn test_scale_table_layout() {
    let table = scale_table(&[-2, 0x12_3456_789a], 2, 1.0).unwrap();
    assert_eq!(table.len(), 32);
    assert_eq!(&table[..5], &[0xfe, 0xff, 0xff, 0xff, 0xff]);
    assert_eq!(&table[5..9], &(1u32 << 30).to_le_bytes());
    assert_eq!(table[9], 30);
    assert_eq!(&table[10..15], &[0x9a, 0x78, 0x56, 0x34, 0x12]);
    assert!(table[20..].iter().all(|&b| b == 0));
  }

  #[test]
  fn test_scale_table_rejects_bad_biases() {
    assert!(scale_table(&[1, 2, 3], 2, 1.0).is_err());
    assert!(scale_table(&[1 << 40], 1, 1.0).is_err());
    assert_eq!(scale_table(&[], 3, 1.0).unwrap().len(), 32);
  }

  #[test]
  fn test_encode_coefficients() {
    let (common, config) = conv(8, 8);
    let coefs = ConvCoefficients {
      weights: WeightTensor {
        shape: [8, 1, 1, 8],
        values: (0..64).map(|i| (i % 7) as u8 + 125).collect(),
        zero_point: 128,
        scale: 0.5,
      },
      biases: vec![],
    };
    let encoded = encode_coefficients(&common, &config, false, &coefs).unwrap();
    assert_eq!(encoded.scales.len(), 80);
    assert_eq!(encoded.weights.len() % 16, 0);
    assert!(!encoded.weights.is_empty());
  }

  #[test]
  fn test_encode_coefficients_checks_shape() {
    let (common, config) = conv(8, 8);
    let coefs = ConvCoefficients {
      weights: WeightTensor {
        shape: [8, 1, 1, 8],
        values: vec![0; 63],
        zero_point: 0,
        scale: 1.0,
      },
      biases: vec![],
    };
    assert!(matches!(
      encode_coefficients(&common, &config, false, &coefs),
      Err(CodecError::InvalidWeightShape(_))
    ));
  }

  #[test]
  fn test_depthwise_strides() {
    let (mut common, config) = conv(16, 16);
    common.kernel.depthwise = true;
    let params = reorder_params(&common, &config, false, [1, 3, 3, 16]);
    assert_eq!(params.ofm_depth, 16);
    assert_eq!(params.ifm_depth, 1);
    assert_eq!(params.strides, [1, 48, 16, 0]);
  }

  #[test]
  fn test_buffer_alignment() {
    let mut buffer = CoefficientBuffer::new();
    let a = buffer.push(&[1; 20]).unwrap();
    let b = buffer.push(&[2; 4]).unwrap();
    assert_eq!(a, AddressRange::new(COEFS_REGION, 0, 20));
    assert_eq!(b, AddressRange::new(COEFS_REGION, 32, 4));
    assert_eq!(buffer.len(), 36);
  }
}
