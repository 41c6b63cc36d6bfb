use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::options::CompilerOptions;
use crate::arch::{COEFS_REGION, SCRATCH_REGION};
use crate::cmd::encode;
use crate::coefs::{encode_coefficients, CoefficientBuffer, ConvCoefficients};
use crate::error::{CodecError, EncodingError, Result, SchedulingError};
use crate::graph::{allocate_feature_maps, consumed_tensors, AddressRange, LinearAllocator, Operation};
use crate::hazard::compute_waits;
use crate::sched::schedule_all;
use crate::utils::dump::{dump_buffer, words_to_bytes};

/// Lowered operations plus the raw coefficients of their convolutions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
  pub operations: Vec<Operation>,
  /// Keyed by the index of the convolution in `operations`.
  #[serde(default)]
  pub coefficients: BTreeMap<usize, ConvCoefficients>,
  /// Feature maps already carry their I/O offsets and layouts.
  #[serde(default)]
  pub addresses_assigned: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledGraph {
  /// Final operations, including inserted DMA copies, with block configs set.
  pub operations: Vec<Operation>,
  pub cmdstream: Vec<u32>,
  /// Contents of the coefficient region.
  pub coefs: Vec<u8>,
  /// Bytes of the I/O region used by feature maps.
  pub io_size: u32,
}

pub struct Compiler {
  options: CompilerOptions,
}

impl Compiler {
  pub fn new(options: CompilerOptions) -> Self {
    Self { options }
  }

  pub fn options(&self) -> &CompilerOptions {
    &self.options
  }

  pub fn compile(&self, graph: Graph) -> Result<CompiledGraph> {
    let Graph {
      mut operations,
      coefficients,
      addresses_assigned,
    } = graph;

    let io_size = if addresses_assigned {
      0
    } else {
      self.allocate(&mut operations)?
    };

    schedule_all(&mut operations)?;
    let coefs = fill_coefficients(&mut operations, &coefficients)?;
    let operations = stage_coefficients(operations, self.options.staging_budget())?;

    let waits = compute_waits(&operations);
    let cmdstream = encode(&operations, &waits, &self.options)?;
    log::info!(
      "compiled {} operations into {} command words, {} coefficient bytes",
      operations.len(),
      cmdstream.len(),
      coefs.len()
    );

    if self.options.dump_buffers {
      dump_buffer(&self.options.dump_dir, "cmdstream", 0, 0, &words_to_bytes(&cmdstream))?;
      if !coefs.is_empty() {
        dump_buffer(&self.options.dump_dir, "coefs", 0, 0, &coefs)?;
      }
    }

    Ok(CompiledGraph {
      operations,
      cmdstream,
      coefs,
      io_size,
    })
  }

  /// Places feature maps in the I/O region. Intermediate tensors get NHCWB16 unless disabled.
  fn allocate(&self, operations: &mut [Operation]) -> Result<u32, EncodingError> {
    let mut allocator = LinearAllocator::new();
    if !self.options.disable_nhcwb16 {
      for index in consumed_tensors(operations) {
        allocator.prefer_blocked_layout(index);
      }
    }
    allocate_feature_maps(operations, &mut allocator)?;
    Ok(allocator.io_used())
  }
}

/// Encodes the coefficients of every convolution that has them and points
/// its scale and weight ranges into the returned coefficient region.
pub fn fill_coefficients(
  operations: &mut [Operation],
  coefficients: &BTreeMap<usize, ConvCoefficients>,
) -> Result<Vec<u8>> {
  let mut buffer = CoefficientBuffer::new();

  for (&index, coefs) in coefficients {
    let Some(Operation::Convolution {
      common,
      weights,
      scales,
      part_kernel_first,
    }) = operations.get_mut(index)
    else {
      return Err(CodecError::InvalidWeightShape(format!("operation {} is not a convolution", index)).into());
    };

    let config = common
      .block_config
      .as_ref()
      .ok_or(EncodingError::UnscheduledOperation { index })?;
    let encoded = encode_coefficients(common, config, *part_kernel_first, coefs)?;
    let (scale_range, weight_range) = buffer.push_coefficients(&encoded)?;
    log::debug!("op {}: scales {:?}, weights {:?}", index, scale_range, weight_range);
    *scales = scale_range;
    *weights = weight_range;
  }

  Ok(buffer.into_bytes())
}

/// Inserts a DMA copy into scratch SRAM before every convolution whose
/// coefficients fit `budget` bytes, and retargets the convolution to the copy.
///
/// The scale table and weights must be contiguous in the coefficient region.
pub fn stage_coefficients(operations: Vec<Operation>, budget: u32) -> Result<Vec<Operation>, EncodingError> {
  let mut staged = Vec::new();
  staged.try_reserve(operations.len())?;

  for mut op in operations {
    if let Operation::Convolution { weights, scales, .. } = &mut op {
      let size = scales.size as u64 + weights.size as u64;
      let contiguous = scales.region == COEFS_REGION
        && weights.region == COEFS_REGION
        && weights.address as u64 == scales.end();
      if size > 0 && size <= budget as u64 && contiguous {
        log::debug!("staging {} coefficient bytes from 0x{:x}", size, scales.address);
        staged.try_reserve(2)?;
        staged.push(Operation::Dma {
          address: scales.address,
          size: size as u32,
        });
        *weights = AddressRange::new(SCRATCH_REGION, scales.size, weights.size);
        *scales = AddressRange::new(SCRATCH_REGION, 0, scales.size);
      }
    }
    staged.push(op);
  }

  Ok(staged)
}

/// Schedules and encodes already lowered operations with default options.
pub fn schedule_and_encode(graph: &[Operation]) -> std::result::Result<Vec<u32>, SchedulingError> {
  schedule_and_encode_with(graph, &CompilerOptions::default())
}

pub fn schedule_and_encode_with(
  graph: &[Operation],
  options: &CompilerOptions,
) -> std::result::Result<Vec<u32>, SchedulingError> {
  let mut operations = graph.to_vec();
  schedule_all(&mut operations)?;
  let waits = compute_waits(&operations);
  Ok(encode(&operations, &waits, options)?)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::arch::{Block, IO_REGION};
  use crate::coefs::WeightTensor;
  use crate::error::Error;
  use crate::graph::{FeatureMap, Layout, OpCommon};
  use crate::hazard::Waits;

  fn conv(ifm: u32, ofm: u32, depth: u32) -> Operation {
    Operation::Convolution {
      common: OpCommon::new(
        FeatureMap::new(ifm, Block::new(8, 8, depth)),
        FeatureMap::new(ofm, Block::new(8, 8, depth)),
      ),
      weights: AddressRange::default(),
      scales: AddressRange::default(),
      part_kernel_first: false,
    }
  }

  fn coefficients(depth: usize) -> ConvCoefficients {
    ConvCoefficients {
      weights: WeightTensor {
        shape: [depth, 1, 1, depth],
        values: (0..depth * depth).map(|i| (i % 5) as u8).collect(),
        zero_point: 2,
        scale: 1.0,
      },
      biases: vec![],
    }
  }

  #[test]
  fn test_stage_coefficients() {
    let mut op = conv(0, 1, 16);
    if let Operation::Convolution { weights, scales, .. } = &mut op {
      *scales = AddressRange::new(COEFS_REGION, 0x40, 0xa0);
      *weights = AddressRange::new(COEFS_REGION, 0xe0, 0x100);
    }
    let staged = stage_coefficients(vec![op], 0x20000).unwrap();
    assert_eq!(staged.len(), 2);
    assert_eq!(staged[0], Operation::Dma { address: 0x40, size: 0x1a0 });
    let Operation::Convolution { weights, scales, .. } = &staged[1] else {
      panic!("expected a convolution");
    };
    assert_eq!(*scales, AddressRange::new(SCRATCH_REGION, 0, 0xa0));
    assert_eq!(*weights, AddressRange::new(SCRATCH_REGION, 0xa0, 0x100));
  }

  #[test]
  fn test_stage_respects_budget() {
    let mut op = conv(0, 1, 16);
    if let Operation::Convolution { weights, scales, .. } = &mut op {
      *scales = AddressRange::new(COEFS_REGION, 0, 0x100);
      *weights = AddressRange::new(COEFS_REGION, 0x100, 0x100);
    }
    assert_eq!(stage_coefficients(vec![op.clone()], 0x1ff).unwrap().len(), 1);
    assert_eq!(stage_coefficients(vec![op.clone()], 0x200).unwrap().len(), 2);
    assert_eq!(stage_coefficients(vec![conv(0, 1, 16)], 0x200).unwrap().len(), 1);
  }

  #[test]
  fn test_compile_assigns_layouts_and_coefficients() {
    let mut graph = Graph {
      operations: vec![conv(0, 1, 16), conv(1, 2, 16)],
      ..Graph::default()
    };
    graph.coefficients.insert(0, coefficients(16));
    graph.coefficients.insert(1, coefficients(16));

    let compiled = Compiler::new(CompilerOptions::default()).compile(graph).unwrap();
    // One DMA in front of each convolution.
    assert_eq!(compiled.operations.len(), 4);
    assert!(compiled.operations[0].is_dma());
    assert!(compiled.operations[2].is_dma());

    let first = compiled.operations[1].common().unwrap();
    assert_eq!(first.ifm.layout, Layout::Nhwc);
    assert_eq!(first.ofm.layout, Layout::Nhcwb16);
    assert_eq!(first.ofm.tiles.addresses[0], 1024);
    assert_eq!(compiled.io_size, 3 * 1024);
    assert_eq!(compiled.coefs.len() % 16, 0);
    assert_eq!(*compiled.cmdstream.last().unwrap(), 0xffff_0000);
  }

  #[test]
  fn test_compile_reports_io_overflow() {
    let huge = Operation::Pooling {
      common: OpCommon::new(
        FeatureMap::new(0, Block::new(0x8000, 0x8000, 16)),
        FeatureMap::new(1, Block::new(4, 4, 16)),
      ),
      avg: false,
    };
    let graph = Graph {
      operations: vec![huge],
      ..Graph::default()
    };
    let err = Compiler::new(CompilerOptions::default()).compile(graph).unwrap_err();
    assert!(matches!(
      err,
      Error::Scheduling(SchedulingError::Encoding(EncodingError::IoRegionOverflow { tensor_index: 0, .. }))
    ));
  }

  #[test]
  fn test_compile_without_sram() {
    let mut graph = Graph {
      operations: vec![conv(0, 1, 16)],
      ..Graph::default()
    };
    graph.coefficients.insert(0, coefficients(16));
    let options = CompilerOptions {
      disable_sram: true,
      disable_nhcwb16: true,
      ..CompilerOptions::default()
    };

    let compiled = Compiler::new(options).compile(graph).unwrap();
    assert_eq!(compiled.operations.len(), 1);
    let Operation::Convolution { scales, weights, .. } = &compiled.operations[0] else {
      panic!("expected a convolution");
    };
    assert_eq!(scales.region, COEFS_REGION);
    assert_eq!(scales.address, 0);
    assert_eq!(weights.address, scales.size);
    assert_eq!(weights.address as usize + weights.size as usize, compiled.coefs.len());
  }

  #[test]
  fn test_coefficients_for_non_convolution() {
    let pool = Operation::Pooling {
      common: OpCommon::new(FeatureMap::new(0, Block::new(4, 4, 8)), FeatureMap::new(1, Block::new(4, 4, 8))),
      avg: false,
    };
    let mut graph = Graph {
      operations: vec![pool],
      ..Graph::default()
    };
    graph.coefficients.insert(0, coefficients(8));
    assert!(Compiler::new(CompilerOptions::default()).compile(graph).is_err());
  }

  #[test]
  fn test_schedule_and_encode_leaves_input_untouched() {
    let ops = vec![conv(0, 1, 16)];
    let words = schedule_and_encode(&ops).unwrap();
    assert!(ops[0].block_config().is_none());
    assert_eq!(words[0], 0x0000_0123);
    assert_eq!(*words.last().unwrap(), 0xffff_0000);
  }

  #[test]
  fn test_schedule_and_encode_reports_unschedulable() {
    let mut op = conv(0, 1, 16);
    if let Some(common) = op.common_mut() {
      common.ofm.shape = Block::new(0, 0, 0);
    }
    assert!(matches!(
      schedule_and_encode(&[op]),
      Err(SchedulingError::NoBlockConfig { index: 0, .. })
    ));
  }

  #[test]
  fn test_io_region_is_used_for_feature_maps() {
    let mut ops = vec![conv(0, 1, 16)];
    let waits = vec![Waits::default()];
    schedule_all(&mut ops).unwrap();
    let words = encode(&ops, &waits, &CompilerOptions::default()).unwrap();
    // IFM_REGION follows PARALLEL_MODE.
    assert_eq!(words[1], (IO_REGION << 16) | 0x10f);
  }
}
