use std::collections::{HashMap, HashSet};

use super::feature_map::{FeatureMap, Layout};
use super::operation::Operation;
use crate::error::EncodingError;

/// Assigns I/O buffer offsets and layouts to tensors.
pub trait FeatureMapAllocator {
  fn layout(&self, feature_map: &FeatureMap) -> Layout;

  /// Returns the byte offset of the tensor behind `feature_map`, allocating it on first use.
  fn allocate(&mut self, feature_map: &FeatureMap) -> Result<u32, EncodingError>;
}

#[derive(Debug, Clone, Copy)]
struct Allocation {
  offset: u32,
  layout: Layout,
}

/// Bump allocator over the I/O buffer, 16-byte aligned.
#[derive(Debug, Default)]
pub struct LinearAllocator {
  io_used: u32,
  tensors: HashMap<u32, Allocation>,
  blocked: HashSet<u32>,
}

impl LinearAllocator {
  pub fn new() -> Self {
    Self::default()
  }

  /// Requests the NHCWB16 layout for a tensor; ignored when its depth is not a multiple of 16.
  pub fn prefer_blocked_layout(&mut self, tensor_index: u32) {
    self.blocked.insert(tensor_index);
  }

  /// Total bytes handed out so far.
  pub fn io_used(&self) -> u32 {
    self.io_used
  }
}

impl FeatureMapAllocator for LinearAllocator {
  fn layout(&self, feature_map: &FeatureMap) -> Layout {
    if let Some(allocation) = self.tensors.get(&feature_map.tensor_index) {
      return allocation.layout;
    }
    if self.blocked.contains(&feature_map.tensor_index) && feature_map.shape.depth % 16 == 0 {
      Layout::Nhcwb16
    } else {
      Layout::Nhwc
    }
  }

  fn allocate(&mut self, feature_map: &FeatureMap) -> Result<u32, EncodingError> {
    if let Some(allocation) = self.tensors.get(&feature_map.tensor_index) {
      return Ok(allocation.offset);
    }

    let layout = self.layout(feature_map);
    let size = feature_map.clone().with_layout(layout).storage_bytes();
    let offset = self.io_used;
    let overflow = || EncodingError::IoRegionOverflow {
      tensor_index: feature_map.tensor_index,
      bytes: size,
    };
    let aligned = size.checked_next_multiple_of(16).ok_or_else(overflow)?;
    self.io_used = u32::try_from(offset as u64 + aligned).map_err(|_| overflow())?;
    self.tensors.insert(feature_map.tensor_index, Allocation { offset, layout });
    log::trace!(
      "tensor {} at 0x{:x} ({} bytes, {:?})",
      feature_map.tensor_index,
      offset,
      size,
      layout
    );
    Ok(offset)
  }
}

/// Places every feature map of `operations` in the I/O buffer, with the
/// layouts the allocator picks.
pub fn allocate_feature_maps<A: FeatureMapAllocator>(
  operations: &mut [Operation],
  allocator: &mut A,
) -> Result<(), EncodingError> {
  for op in operations.iter_mut() {
    if let Operation::Elementwise { ifm2, .. } = op {
      place(ifm2, allocator)?;
    }
    if let Some(common) = op.common_mut() {
      place(&mut common.ifm, allocator)?;
      place(&mut common.ofm, allocator)?;
    }
  }
  Ok(())
}

/// Tensors written by one operation and read by another: the candidates for NHCWB16.
///
/// Graph inputs and outputs are exchanged with the host and stay NHWC.
pub fn consumed_tensors(operations: &[Operation]) -> HashSet<u32> {
  let mut consumed = HashSet::new();
  let mut produced = HashSet::new();
  for op in operations {
    if let Some(common) = op.common() {
      consumed.insert(common.ifm.tensor_index);
      produced.insert(common.ofm.tensor_index);
    }
    if let Some(ifm2) = op.ifm2() {
      consumed.insert(ifm2.tensor_index);
    }
  }
  consumed.retain(|index| produced.contains(index));
  consumed
}

fn place<A: FeatureMapAllocator>(feature_map: &mut FeatureMap, allocator: &mut A) -> Result<(), EncodingError> {
  feature_map.layout = allocator.layout(feature_map);
  feature_map.tiles.addresses[0] = allocator.allocate(feature_map)?;
  Ok(())
}
