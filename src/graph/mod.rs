//! Operation model consumed by the scheduler and the encoder
pub mod access;
pub mod alloc;
pub mod feature_map;
pub mod operation;

pub use access::{AddressRange, MemoryAccesses, MAX_MEMORY_ACCESSES};
pub use alloc::{allocate_feature_maps, consumed_tensors, FeatureMapAllocator, LinearAllocator};
pub use feature_map::{FeatureMap, Layout, Strides, Tiles};
pub use operation::{is_part_kernel_first, Kernel, OpCommon, Operation, OperationKind, Padding, RoundMode};
