use super::regs::OpToScale;
use crate::error::EncodingError;

/// Splits `x` into a significand in `[0.5, 1)` and a power of two.
fn frexp(x: f64) -> (f64, i32) {
  if x == 0.0 || !x.is_finite() {
    return (x, 0);
  }

  let bits = x.to_bits();
  let biased = ((bits >> 52) & 0x7ff) as i32;
  if biased == 0 {
    // Subnormal: scale into the normal range first.
    let (sig, exp) = frexp(x * f64::powi(2.0, 54));
    return (sig, exp - 54);
  }

  let exp = biased - 1022;
  let sig = f64::from_bits((bits & !(0x7ff << 52)) | (1022 << 52));
  (sig, exp)
}

/// Fixed-point multiplier and right shift such that `scale ~= mantissa / 2^shift`.
///
/// The shift is kept within `[0, 63]`. Scales that cannot be represented
/// (negative, NaN, or too small or large for the clamped shift) give `(0, 0)`.
pub fn quantize_scale(scale: f64) -> (u32, u32) {
  if scale.is_nan() || scale <= 0.0 || scale.is_infinite() {
    return (0, 0);
  }

  let (significand, exponent) = frexp(scale);
  let mut quantized = (significand * (1u64 << 31) as f64).round() as u64;
  let mut shift = 31 - exponent as i64;

  if quantized == 1 << 31 {
    quantized >>= 1;
    shift -= 1;
  }

  if shift > 63 {
    let excess = shift - 63;
    if excess < 32 && quantized > (1u64 << excess) {
      quantized >>= excess;
      shift = 63;
    } else {
      return (0, 0);
    }
  } else if shift < 0 {
    let headroom = shift + 32;
    if headroom > 0 && quantized < (1u64 << headroom) {
      quantized <<= -shift;
      shift = 0;
    } else {
      return (0, 0);
    }
  }

  (quantized as u32, shift as u32)
}

/// Bit length of `value`.
fn bit_length(value: f64) -> i32 {
  let value = value as u64;
  (u64::BITS - value.leading_zeros()) as i32
}

fn quantise_pooling_scale(kernel_elements: u32, rescale_bits: i32) -> Result<(u64, u32), EncodingError> {
  let (_, k) = frexp(kernel_elements.saturating_sub(1) as f64);
  let n = 31 - rescale_bits;
  let shift = n + k;
  if !(0..63).contains(&shift) || !(0..63).contains(&k) {
    return Err(EncodingError::FieldOverflow {
      command: "NPU_SET_OFM_SCALE",
      value: shift as i64,
    });
  }

  let scale = ((1i64 << shift) + (1i64 << k)) / kernel_elements.max(1) as i64;
  Ok((scale as u64, shift as u32))
}

/// Output scale and shift of an average pooling: divides by the kernel area
/// and applies the IFM to OFM rescale.
pub fn pooling_ofm_scale(
  ifm_scale: f64,
  ofm_scale: f64,
  kernel_height: u32,
  kernel_width: u32,
) -> Result<(u32, u32), EncodingError> {
  let rescale = ifm_scale / ofm_scale;
  let mut rescale_bits = 0;

  if kernel_height == 1 && kernel_width == 1 {
    if rescale > 1.0 {
      rescale_bits = bit_length(rescale.ceil()) + 1;
    } else if rescale < 1.0 {
      // Any larger shift pushes the scale past 32 bits.
      rescale_bits = -(bit_length((1.0 / rescale).ceil()) - 1);
    }
  }

  let (scale, shift) = quantise_pooling_scale(kernel_height * kernel_width, rescale_bits)?;
  let scale = (scale as f64 * rescale).ceil();
  if !(0.0..=u32::MAX as f64).contains(&scale) {
    return Err(EncodingError::FieldOverflow {
      command: "NPU_SET_OFM_SCALE",
      value: scale as i64,
    });
  }

  Ok((scale as u32, shift))
}

/// Scaling registers of an elementwise add.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementwiseScales {
  pub opa_scale: u32,
  pub opa_shift: u32,
  pub ofm_scale: u32,
  pub ofm_shift: u32,
  /// The operand with the smaller scale is the one rescaled.
  pub op_to_scale: OpToScale,
}

/// Input shift for 8-bit operands.
const ELEMENTWISE_INPUT_SHIFT: i32 = 20;

/// Simplified add/sub scaling: both inputs are brought to the larger input
/// scale, left-shifted by 20 bits, and the OFM rescale undoes both.
pub fn elementwise_scales(ifm_scale: f64, ifm2_scale: f64, ofm_scale: f64) -> ElementwiseScales {
  let max_input_scale = ifm_scale.max(ifm2_scale);
  let min_input_scale = ifm_scale.min(ifm2_scale);
  let input_shift = f64::powi(2.0, ELEMENTWISE_INPUT_SHIFT);

  let input_rescale = min_input_scale * input_shift / (2.0 * max_input_scale);
  let output_rescale = if ofm_scale == 0.0 {
    0.0
  } else {
    (2.0 * max_input_scale) / (ofm_scale * input_shift)
  };

  let (opa_scale, opa_shift) = quantize_scale(input_rescale);
  let (ofm_scale, ofm_shift) = quantize_scale(output_rescale);

  ElementwiseScales {
    opa_scale,
    opa_shift,
    ofm_scale,
    ofm_shift,
    op_to_scale: if ifm_scale < ifm2_scale {
      OpToScale::OpA
    } else {
      OpToScale::OpB
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ratio((mantissa, shift): (u32, u32)) -> f64 {
    mantissa as f64 / f64::powi(2.0, shift as i32)
  }

  #[test]
  fn test_frexp() {
    assert_eq!(frexp(1.0), (0.5, 1));
    assert_eq!(frexp(0.75), (0.75, 0));
    assert_eq!(frexp(8.0), (0.5, 4));
    assert_eq!(frexp(0.0), (0.0, 0));
    let (sig, exp) = frexp(f64::MIN_POSITIVE / 4.0);
    assert_eq!(sig, 0.5);
    assert_eq!(exp, -1023);
  }

  #[test]
  fn test_quantize_unit_scale() {
    assert_eq!(quantize_scale(1.0), (1 << 30, 30));
    assert_eq!(ratio(quantize_scale(1.0)), 1.0);
  }

  #[test]
  fn test_quantize_preserves_ratio() {
    for scale in [0.003921568859368563, 0.25, 0.7, 3.5, 1234.5] {
      let (mantissa, shift) = quantize_scale(scale);
      assert!(shift <= 63);
      assert!(mantissa < 1 << 31);
      assert!((ratio((mantissa, shift)) - scale).abs() / scale < 1e-8);
    }
  }

  #[test]
  fn test_quantize_degenerate() {
    assert_eq!(quantize_scale(0.0), (0, 0));
    assert_eq!(quantize_scale(-1.0), (0, 0));
    assert_eq!(quantize_scale(f64::NAN), (0, 0));
    assert_eq!(quantize_scale(1e-40), (0, 0));
    assert_eq!(quantize_scale(1e20), (0, 0));
  }

  #[test]
  fn test_quantize_clamps_large_shift() {
    // 2^-40: shift would be 70, renormalized to 63.
    let (mantissa, shift) = quantize_scale(f64::powi(2.0, -40));
    assert_eq!(shift, 63);
    assert_eq!(mantissa, 1 << 23);
  }

  #[test]
  fn test_quantize_small_negative_shift() {
    // 2^31 needs a left shift of the mantissa.
    let (mantissa, shift) = quantize_scale(f64::powi(2.0, 31));
    assert_eq!((mantissa, shift), (1 << 31, 0));
  }

  #[test]
  fn test_pooling_scale_2x2() {
    // 4 elements: k = 2, shift = 33, scale = (2^33 + 4) / 4.
    let (scale, shift) = pooling_ofm_scale(1.0, 1.0, 2, 2).unwrap();
    assert_eq!(shift, 33);
    assert_eq!(scale, (1u32 << 31) + 1);
  }

  #[test]
  fn test_pooling_scale_1x1_rescale() {
    let (scale, shift) = pooling_ofm_scale(0.5, 1.0, 1, 1).unwrap();
    assert_eq!(shift, 32);
    assert_eq!(scale, (1u32 << 31) + 1);

    let (scale, shift) = pooling_ofm_scale(2.0, 1.0, 1, 1).unwrap();
    assert_eq!(shift, 28);
    assert_eq!(scale, ((1u32 << 28) + 1) * 2);
  }

  #[test]
  fn test_pooling_scale_small_rescale_fits() {
    for rescale in [0.9, 0.5, 0.1, 0.01] {
      let (scale, shift) = pooling_ofm_scale(rescale, 1.0, 1, 1).unwrap();
      let effective = scale as f64 / (1u64 << shift) as f64;
      assert!((effective - rescale).abs() < 1e-6, "{} -> {}", rescale, effective);
    }
  }

  #[test]
  fn test_elementwise_scales() {
    let scales = elementwise_scales(0.5, 1.0, 1.0);
    assert_eq!(scales.op_to_scale, OpToScale::OpA);
    // 0.5 * 2^20 / 2 = 2^18.
    assert_eq!(ratio((scales.opa_scale, scales.opa_shift)), f64::powi(2.0, 18));
    // 2 / 2^20 = 2^-19.
    assert_eq!(ratio((scales.ofm_scale, scales.ofm_shift)), f64::powi(2.0, -19));

    assert_eq!(elementwise_scales(1.0, 1.0, 1.0).op_to_scale, OpToScale::OpB);
  }
}
