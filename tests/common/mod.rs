#![allow(dead_code)]

use ethosu::arch::Block;
use ethosu::graph::{AddressRange, FeatureMap, OpCommon, Operation};

/// LSB-first bit reader over a compressed weight stream.
pub struct BitReader<'a> {
  bytes: &'a [u8],
  pos: usize,
}

impl<'a> BitReader<'a> {
  pub fn new(bytes: &'a [u8]) -> Self {
    Self { bytes, pos: 0 }
  }

  pub fn position(&self) -> usize {
    self.pos
  }

  pub fn get(&mut self, len: u32) -> u32 {
    let mut value = 0;
    for i in 0..len {
      let byte = self.bytes[self.pos / 8];
      if (byte >> (self.pos % 8)) & 1 != 0 {
        value |= 1 << i;
      }
      self.pos += 1;
    }
    value
  }
}

#[derive(Debug, Clone, Default)]
struct Palette {
  lut: Vec<u32>,
  direct_offset: u32,
  bits: u32,
}

impl Palette {
  fn weight(&self, index: u32) -> i16 {
    let palval = if (index as usize) < self.lut.len() {
      self.lut[index as usize]
    } else {
      index - self.lut.len() as u32 + self.direct_offset
    };
    let magnitude = (palval >> 1) as i16;
    if palval & 1 != 0 {
      -magnitude
    } else {
      magnitude
    }
  }

  fn uncompressed_bits(&self) -> u32 {
    if self.lut.is_empty() {
      self.bits
    } else {
      let mut bits = 0;
      while (1usize << bits) < self.lut.len() {
        bits += 1;
      }
      bits
    }
  }
}

/// Symbol state of one GRC stream, carried across chunks.
#[derive(Default)]
struct StreamState {
  done: usize,
  in_progress: bool,
  q: u32,
}

/// Decodes a stream produced by `compress_weights`.
pub fn decode_weights(stream: &[u8]) -> Vec<i16> {
  let mut reader = BitReader::new(stream);
  let mut out = Vec::new();
  let mut palette = Palette::default();

  loop {
    let zdiv = reader.get(3);
    if zdiv == 7 {
      break;
    }
    let n = reader.get(15) as usize + 1;
    let wdiv = reader.get(3);
    let trunc = reader.get(1) == 1;
    let new_palette = reader.get(1) == 1;
    if new_palette {
      let direct_offset = reader.get(5);
      let size_field = reader.get(5) as usize;
      let size = if size_field > 0 { size_field + 1 } else { 0 };
      let bits = reader.get(3) + 2;
      let lut = (0..size).map(|_| reader.get(bits)).collect();
      palette = Palette { lut, direct_offset, bits };
    }

    let use_zero_runs = zdiv != 6;
    let uncompressed = wdiv == 7;
    let w_div = if uncompressed { palette.uncompressed_bits() } else { wdiv };
    let z_div = if use_zero_runs { zdiv } else { 0 };
    let z_n = n + new_palette as usize;
    let w_max_symbols = if uncompressed && w_div > 5 { 8 } else { 12 };
    let z_unary_len = if z_div < 3 { 12 } else { 8 };

    let mut w = StreamState::default();
    let mut z = StreamState::default();
    let mut w_prev: Vec<u32> = Vec::new();
    let mut z_prev: Vec<u32> = Vec::new();
    let mut w_values: Vec<u32> = Vec::new();
    let mut z_values: Vec<u32> = Vec::new();

    loop {
      let balance = if use_zero_runs { w.done as i64 - z.done as i64 } else { 0 };
      let w_enabled = balance < 8 && w.done < n;
      let z_enabled = balance >= 0 && use_zero_runs && z.done < z_n;

      let mut w_unary0 = 0;
      let mut z_unary = 0;
      let mut w_unary1: Vec<u32> = Vec::new();
      if w_enabled && !uncompressed {
        w_unary0 = reader.get(12);
      }
      if z_enabled {
        z_unary = reader.get(z_unary_len);
      }
      if w_enabled && !uncompressed {
        let len = w_unary0.count_ones();
        let bits = reader.get(len);
        w_unary1 = (0..len).map(|i| (bits >> i) & 1).collect();
      }

      let mut w_chunk = Vec::new();
      if w_enabled {
        let mut unary1 = w_unary1.into_iter();
        for j in 0..w_max_symbols {
          if !w.in_progress {
            if w.done >= n {
              // Padding symbol.
              continue;
            }
            w.in_progress = true;
            w.q = 0;
          }
          let (u0, u1) = if uncompressed {
            (0, 0)
          } else {
            let u0 = (w_unary0 >> j) & 1;
            let u1 = if u0 == 1 { unary1.next().unwrap() } else { 0 };
            (u0, u1)
          };
          w.q += u0 + u1;
          if trunc || u0 == 0 || u1 == 0 {
            w_chunk.push(w.q);
            w.done += 1;
            w.in_progress = false;
          }
        }
      }

      let mut z_chunk = Vec::new();
      if z_enabled {
        for j in 0..z_unary_len {
          if !z.in_progress {
            if z.done >= z_n {
              continue;
            }
            z.in_progress = true;
            z.q = 0;
          }
          if (z_unary >> j) & 1 == 1 {
            z.q += 1;
          } else {
            z_chunk.push(z.q);
            z.done += 1;
            z.in_progress = false;
          }
        }
      }

      for q in w_prev.drain(..) {
        w_values.push((q << w_div) + reader.get(w_div));
      }
      for q in z_prev.drain(..) {
        z_values.push((q << z_div) + reader.get(z_div));
      }

      if !w_enabled && !z_enabled {
        break;
      }
      w_prev = w_chunk;
      z_prev = z_chunk;
    }

    assert_eq!(w_values.len(), n, "slice weight count");
    let mut zeros = z_values.into_iter();
    if use_zero_runs && new_palette {
      let run = zeros.next().unwrap();
      out.extend(std::iter::repeat(0).take(run as usize));
    }
    for index in w_values {
      out.push(palette.weight(index));
      if use_zero_runs {
        let run = zeros.next().unwrap();
        out.extend(std::iter::repeat(0).take(run as usize));
      }
    }
  }

  out
}

pub fn feature_map(tensor_index: u32, shape: Block, address: u32) -> FeatureMap {
  FeatureMap::new(tensor_index, shape).with_address(address)
}

pub fn conv(ifm: FeatureMap, ofm: FeatureMap, kernel: u32) -> Operation {
  let mut common = OpCommon::new(ifm, ofm);
  common.kernel.height = kernel;
  common.kernel.width = kernel;
  Operation::Convolution {
    common,
    weights: AddressRange::default(),
    scales: AddressRange::default(),
    part_kernel_first: false,
  }
}

pub fn pool(ifm: FeatureMap, ofm: FeatureMap, avg: bool) -> Operation {
  Operation::Pooling {
    common: OpCommon::new(ifm, ofm),
    avg,
  }
}
