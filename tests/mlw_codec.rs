mod common;

use common::decode_weights;
use ethosu::error::CodecError;
use ethosu::mlw::{compress_weights, reorder, reorder_encode, Palette, ReorderParams};
use proptest::prelude::*;

fn round_trip(weights: &[i16]) {
  let stream = compress_weights(weights).unwrap();
  assert_eq!(stream.len() % 16, 0);
  assert_eq!(decode_weights(&stream), weights);
}

#[test]
fn test_all_zeros_round_trip() {
  let weights = vec![0i16; 300];
  assert!(Palette::for_section(&weights).only_zeros);
  round_trip(&weights);
}

#[test]
fn test_single_zero() {
  round_trip(&[0]);
}

#[test]
fn test_thirty_two_distinct_values_use_only_palette() {
  let weights: Vec<i16> = (0..640).map(|i| (i % 32) as i16 * 3 - 40).collect();
  let palette = Palette::for_section(&weights);
  assert!(palette.only_palette);
  assert_eq!(palette.size, 32);
  round_trip(&weights);
}

#[test]
fn test_out_of_range_rejected() {
  assert!(matches!(
    compress_weights(&[1, 2, 256]),
    Err(CodecError::WeightOutOfRange { index: 2, value: 256 })
  ));
  assert!(matches!(
    compress_weights(&[-256]),
    Err(CodecError::WeightOutOfRange { index: 0, value: -256 })
  ));
}

#[test]
fn test_extreme_values() {
  let weights: Vec<i16> = (0..200).map(|i| if i % 2 == 0 { 255 } else { -255 }).collect();
  round_trip(&weights);
}

#[test]
fn test_wide_distribution() {
  // Every value of the range: no palette, direct coding only.
  let weights: Vec<i16> = (-255..=255).collect();
  round_trip(&weights);
}

#[test]
fn test_sparse_weights_use_zero_runs() {
  let mut weights = vec![0i16; 2000];
  for i in (0..2000).step_by(37) {
    weights[i] = (i % 11) as i16 - 5;
  }
  assert!(Palette::for_section(&weights).use_zero_runs);
  round_trip(&weights);
}

#[test]
fn test_long_stream_spans_slices() {
  let weights: Vec<i16> = (0..40000).map(|i| ((i * 7919) % 9) as i16 - 4).collect();
  round_trip(&weights);
}

#[test]
fn test_changing_distribution_restarts_palette() {
  let mut weights: Vec<i16> = (0..3000).map(|i| (i % 3) as i16 - 1).collect();
  weights.extend((0..3000).map(|i| ((i * 37) % 201) as i16 - 100));
  weights.extend(vec![0; 500]);
  round_trip(&weights);
}

#[test]
fn test_reordered_weights_round_trip() {
  let params = ReorderParams {
    ifm_ublock_depth: 8,
    ofm_ublock_depth: 8,
    ofm_depth: 24,
    kernel_height: 3,
    kernel_width: 3,
    ifm_depth: 5,
    strides: [45, 15, 5, 1],
    ofm_block_depth: 16,
    depthwise: false,
    part_kernel_first: true,
    ifm_bitdepth: 8,
    decomp_h: 8,
    decomp_w: 8,
  };
  let weights: Vec<i16> = (0..24 * 9 * 5).map(|i| ((i * 13) % 61) as i16 - 30).collect();
  let (stream, padded) = reorder_encode(&params, &weights).unwrap();
  let expected = reorder(&params, &weights).unwrap();
  assert_eq!(padded, expected.len());
  assert_eq!(decode_weights(&stream), expected);
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(64))]

  #[test]
  fn prop_dense_round_trip(weights in prop::collection::vec(-255i16..=255, 1..1500)) {
    let stream = compress_weights(&weights).unwrap();
    prop_assert_eq!(stream.len() % 16, 0);
    prop_assert_eq!(decode_weights(&stream), weights);
  }

  #[test]
  fn prop_narrow_round_trip(weights in prop::collection::vec(-6i16..=6, 1..3000)) {
    let stream = compress_weights(&weights).unwrap();
    prop_assert_eq!(decode_weights(&stream), weights);
  }

  #[test]
  fn prop_sparse_round_trip(
    weights in prop::collection::vec(
      prop_oneof![8 => Just(0i16), 1 => -255i16..=255],
      1..3000,
    )
  ) {
    let stream = compress_weights(&weights).unwrap();
    prop_assert_eq!(decode_weights(&stream), weights);
  }
}
