use serde::{Deserialize, Serialize};

use crate::arch::{align_up, Block};

/// On-device arrangement of a tensor in the I/O buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
  #[default]
  Nhwc,
  /// Depth split into bricks of 16 channels, stored row by row.
  Nhcwb16,
}

impl Layout {
  /// Value of the `FORMAT` field in the IFM/OFM precision registers.
  pub fn format_bits(&self) -> u32 {
    match self {
      Layout::Nhwc => 0,
      Layout::Nhcwb16 => 1,
    }
  }
}

/// Tile geometry of a feature map.
///
/// Zero heights or widths mean the tile spans the whole tensor. Only the
/// first base address is used by this compiler, the others stay zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tiles {
  pub height_0: u32,
  pub height_1: u32,
  pub width_0: u32,
  pub addresses: [u32; 4],
}

/// Byte strides between neighbouring elements along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strides {
  pub x: u32,
  pub y: u32,
  pub c: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMap {
  pub tensor_index: u32,
  pub shape: Block,
  #[serde(default)]
  pub is_signed: bool,
  #[serde(default)]
  pub zero_point: i32,
  #[serde(default = "default_scale")]
  pub scale: f64,
  #[serde(default)]
  pub layout: Layout,
  #[serde(default)]
  pub tiles: Tiles,
}

fn default_scale() -> f64 {
  1.0
}

impl Default for FeatureMap {
  fn default() -> Self {
    Self::new(0, Block::default())
  }
}

impl FeatureMap {
  pub fn new(tensor_index: u32, shape: Block) -> Self {
    Self {
      tensor_index,
      shape,
      is_signed: false,
      zero_point: 0,
      scale: default_scale(),
      layout: Layout::Nhwc,
      tiles: Tiles::default(),
    }
  }

  pub fn with_address(mut self, address: u32) -> Self {
    self.tiles.addresses[0] = address;
    self
  }

  pub fn with_layout(mut self, layout: Layout) -> Self {
    self.layout = layout;
    self
  }

  pub fn base_address(&self) -> u32 {
    self.tiles.addresses[0]
  }

  /// Tiles with the "whole tensor" shorthand resolved against the shape.
  pub fn effective_tiles(&self) -> Tiles {
    let pick = |tile: u32, full: u32| if tile == 0 { full } else { tile };
    Tiles {
      height_0: pick(self.tiles.height_0, self.shape.height),
      height_1: pick(self.tiles.height_1, self.shape.height),
      width_0: pick(self.tiles.width_0, self.shape.width),
      addresses: self.tiles.addresses,
    }
  }

  /// Bytes occupied in the I/O buffer. Elements are one byte wide.
  pub fn storage_bytes(&self) -> u64 {
    let Block { height, width, depth } = self.shape;
    let depth = match self.layout {
      Layout::Nhwc => depth as u64,
      Layout::Nhcwb16 => (depth as u64).div_ceil(16) * 16,
    };
    height as u64 * width as u64 * depth
  }

  /// [`storage_bytes`](Self::storage_bytes), saturated to the 32-bit address space.
  pub fn storage_size(&self) -> u32 {
    u32::try_from(self.storage_bytes()).unwrap_or(u32::MAX)
  }

  pub fn strides(&self) -> Strides {
    let elem_size = 1;
    match self.layout {
      Layout::Nhcwb16 => {
        let x = 16 * elem_size;
        Strides {
          x,
          c: x * self.shape.width,
          y: elem_size * self.shape.width * align_up(self.shape.depth, 16),
        }
      }
      Layout::Nhwc => {
        let c = elem_size;
        let x = self.shape.depth * c;
        Strides {
          x,
          y: self.shape.width * x,
          c,
        }
      }
    }
  }
}
