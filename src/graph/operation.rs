use serde::{Deserialize, Serialize};

use super::access::AddressRange;
use super::feature_map::FeatureMap;
use crate::sched::BlockConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
  Convolution,
  Pooling,
  Elementwise,
  Dma,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Kernel {
  pub height: u32,
  pub width: u32,
  pub stride_x: u32,
  pub stride_y: u32,
  pub dilation_x: u32,
  pub dilation_y: u32,
  pub depthwise: bool,
}

impl Default for Kernel {
  fn default() -> Self {
    Self {
      height: 1,
      width: 1,
      stride_x: 1,
      stride_y: 1,
      dilation_x: 1,
      dilation_y: 1,
      depthwise: false,
    }
  }
}

impl Kernel {
  pub fn area(&self) -> u32 {
    self.height * self.width
  }

  pub fn dilated_height(&self) -> u32 {
    self.height.saturating_sub(1) * self.dilation_y + 1
  }

  pub fn dilated_width(&self) -> u32 {
    self.width.saturating_sub(1) * self.dilation_x + 1
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Padding {
  pub top: u32,
  pub left: u32,
  pub bottom: u32,
  pub right: u32,
}

/// Rounding applied by the output requantization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundMode {
  #[default]
  Tfl,
  Truncate,
  Natural,
}

impl RoundMode {
  pub fn bits(&self) -> u32 {
    match self {
      RoundMode::Tfl => 0,
      RoundMode::Truncate => 1,
      RoundMode::Natural => 2,
    }
  }
}

/// Fields shared by every operation that runs on the compute queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpCommon {
  pub ifm: FeatureMap,
  pub ofm: FeatureMap,
  #[serde(default)]
  pub kernel: Kernel,
  #[serde(default)]
  pub padding: Padding,
  #[serde(default)]
  pub round_mode: RoundMode,
  #[serde(default)]
  pub upscale: bool,
  /// Filled in by the block scheduler.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub block_config: Option<BlockConfig>,
}

impl OpCommon {
  pub fn new(ifm: FeatureMap, ofm: FeatureMap) -> Self {
    Self {
      ifm,
      ofm,
      kernel: Kernel::default(),
      padding: Padding::default(),
      round_mode: RoundMode::default(),
      upscale: false,
      block_config: None,
    }
  }
}

/// One hardware operation, as produced by graph lowering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
  Convolution {
    #[serde(flatten)]
    common: OpCommon,
    /// Filled in from the graph's coefficients when left empty.
    #[serde(default)]
    weights: AddressRange,
    #[serde(default)]
    scales: AddressRange,
    #[serde(default)]
    part_kernel_first: bool,
  },
  Pooling {
    #[serde(flatten)]
    common: OpCommon,
    #[serde(default)]
    avg: bool,
  },
  Elementwise {
    #[serde(flatten)]
    common: OpCommon,
    ifm2: FeatureMap,
    #[serde(default)]
    lut_bytes: u32,
  },
  /// Copies `size` bytes of coefficients from `address` to the start of scratch.
  Dma { address: u32, size: u32 },
}

impl Operation {
  pub fn kind(&self) -> OperationKind {
    match self {
      Operation::Convolution { .. } => OperationKind::Convolution,
      Operation::Pooling { .. } => OperationKind::Pooling,
      Operation::Elementwise { .. } => OperationKind::Elementwise,
      Operation::Dma { .. } => OperationKind::Dma,
    }
  }

  pub fn is_dma(&self) -> bool {
    matches!(self, Operation::Dma { .. })
  }

  pub fn common(&self) -> Option<&OpCommon> {
    match self {
      Operation::Convolution { common, .. } | Operation::Pooling { common, .. } | Operation::Elementwise { common, .. } => {
        Some(common)
      }
      Operation::Dma { .. } => None,
    }
  }

  pub fn common_mut(&mut self) -> Option<&mut OpCommon> {
    match self {
      Operation::Convolution { common, .. } | Operation::Pooling { common, .. } | Operation::Elementwise { common, .. } => {
        Some(common)
      }
      Operation::Dma { .. } => None,
    }
  }

  pub fn block_config(&self) -> Option<&BlockConfig> {
    self.common().and_then(|common| common.block_config.as_ref())
  }

  pub fn is_depthwise(&self) -> bool {
    matches!(self, Operation::Convolution { common, .. } if common.kernel.depthwise)
  }

  pub fn is_part_kernel_first(&self) -> bool {
    matches!(self, Operation::Convolution { part_kernel_first: true, .. })
  }

  pub fn ifm2(&self) -> Option<&FeatureMap> {
    match self {
      Operation::Elementwise { ifm2, .. } => Some(ifm2),
      _ => None,
    }
  }
}

/// Picks the block traversal with the better MAC utilisation.
///
/// Depth-first walks 32 IFM channels at a time; part-kernel-first walks 8
/// channels over groups of 4 kernel elements.
pub fn is_part_kernel_first(kind: OperationKind, kernel: &Kernel, ifm_depth: u32) -> bool {
  if kind != OperationKind::Convolution || kernel.depthwise {
    return false;
  }

  let kernel_size = kernel.area();
  let depth = ifm_depth as f32;
  let depth_utilization = depth / ifm_depth.next_multiple_of(32) as f32;
  let part_kernel_utilization = (depth / ifm_depth.next_multiple_of(8) as f32)
    * (kernel_size as f32 / kernel_size.next_multiple_of(4) as f32);

  part_kernel_utilization >= depth_utilization || ifm_depth <= 8
}
