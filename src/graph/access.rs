use serde::{Deserialize, Serialize};

use super::operation::Operation;
use crate::arch::{COEFS_REGION, IO_REGION, SCRATCH_REGION};

/// Read and write slots per operation: IFM, IFM2, scales, weights, OFM.
pub const MAX_MEMORY_ACCESSES: usize = 5;

/// A byte range inside one of the memory regions. Zero size means unused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressRange {
  pub region: u32,
  pub address: u32,
  pub size: u32,
}

impl AddressRange {
  pub fn new(region: u32, address: u32, size: u32) -> Self {
    Self { region, address, size }
  }

  pub fn end(&self) -> u64 {
    self.address as u64 + self.size as u64
  }

  pub fn is_empty(&self) -> bool {
    self.size == 0
  }

  pub fn overlaps(&self, other: &AddressRange) -> bool {
    if self.is_empty() || other.is_empty() || self.region != other.region {
      return false;
    }
    (self.address as u64) < other.end() && (other.address as u64) < self.end()
  }
}

fn intersects(a: &[AddressRange], b: &[AddressRange]) -> bool {
  a.iter().any(|x| b.iter().any(|y| x.overlaps(y)))
}

/// Memory touched by one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryAccesses {
  pub read: [AddressRange; MAX_MEMORY_ACCESSES],
  pub write: [AddressRange; MAX_MEMORY_ACCESSES],
}

impl MemoryAccesses {
  /// True for write/read, read/write and write/write overlaps. Two reads never conflict.
  pub fn conflicts_with(&self, other: &MemoryAccesses) -> bool {
    intersects(&self.write, &other.read) || intersects(&self.read, &other.write) || intersects(&self.write, &other.write)
  }
}

impl Operation {
  pub fn memory_accesses(&self) -> MemoryAccesses {
    let mut accesses = MemoryAccesses::default();

    match self {
      Operation::Dma { address, size } => {
        accesses.read[0] = AddressRange::new(COEFS_REGION, *address, *size);
        accesses.write[0] = AddressRange::new(SCRATCH_REGION, 0, *size);
      }
      _ => {
        let Some(common) = self.common() else {
          return accesses;
        };
        accesses.read[0] = AddressRange::new(IO_REGION, common.ifm.base_address(), common.ifm.storage_size());
        if let Some(ifm2) = self.ifm2() {
          accesses.read[1] = AddressRange::new(IO_REGION, ifm2.base_address(), ifm2.storage_size());
        }
        if let Operation::Convolution { weights, scales, .. } = self {
          accesses.read[2] = *scales;
          accesses.read[3] = *weights;
        }
        accesses.write[0] = AddressRange::new(IO_REGION, common.ofm.base_address(), common.ofm.storage_size());
      }
    }

    accesses
  }
}
