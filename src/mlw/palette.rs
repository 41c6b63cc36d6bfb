//! Palette selection for one section of the weight stream.
//!
//! Weights are coded either as an index into a palette of up to 32 common
//! values, or directly as a sign/magnitude value offset past the palette.
//! A "palette value" is the sign/magnitude form `(|w| << 1) | sign`.

pub const PALETTE_MAX: usize = 32;
/// Number of distinct weights, -256..=255.
pub const WEIGHT_VALUES: usize = 512;
/// Zero runs pay off once zeros outnumber the next most common weight this many times.
const ZERO_RUN_THRESHOLD: u32 = 4;

#[derive(Debug, Clone)]
pub struct Palette {
  pub lut: [u16; PALETTE_MAX],
  /// Coded index of each weight, indexed by `weight + 256`.
  pub inv_lut: [i32; WEIGHT_VALUES],
  pub size: usize,
  /// Bit width of the palette entries, 2..=9.
  pub bits: u32,
  /// Zeros are coded as run lengths instead of weights.
  pub use_zero_runs: bool,
  /// Every weight of the section is in the palette.
  pub only_palette: bool,
  /// Added to a decoded index past the palette before converting back to sign/magnitude.
  pub direct_offset: u32,
  /// The section holds only zeros.
  pub only_zeros: bool,
}

pub fn palette_value(weight: i32) -> u16 {
  ((weight.unsigned_abs() << 1) | (weight < 0) as u32) as u16
}

pub fn weight_of(palette_value: u32) -> i32 {
  let magnitude = (palette_value >> 1) as i32;
  if palette_value & 1 != 0 {
    -magnitude
  } else {
    magnitude
  }
}

/// Occurrence count of every weight, indexed by `weight + 256`.
fn frequencies(weights: &[i16]) -> [u32; WEIGHT_VALUES] {
  let mut freq = [0; WEIGHT_VALUES];
  for &weight in weights {
    freq[(weight as i32 + 256) as usize] += 1;
  }
  freq
}

impl Palette {
  /// Picks the palette and zero-run mode for `weights` and builds the inverse lookup.
  pub fn for_section(weights: &[i16]) -> Self {
    let freq = frequencies(weights);

    let mut most_common_freq = [0u32; 2];
    let mut most_common_val = [0i32; 2];
    for (index, &count) in freq.iter().enumerate() {
      if count > most_common_freq[0] {
        most_common_freq[1] = most_common_freq[0];
        most_common_val[1] = most_common_val[0];
        most_common_freq[0] = count;
        most_common_val[0] = index as i32 - 256;
      } else if count > most_common_freq[1] {
        most_common_freq[1] = count;
        most_common_val[1] = index as i32 - 256;
      }
    }

    let use_zero_runs =
      most_common_val[0] == 0 && most_common_freq[0] > ZERO_RUN_THRESHOLD * most_common_freq[1];

    let mut palette = Self::from_frequencies(&freq, use_zero_runs);
    palette.build_inverse();
    palette
  }

  fn from_frequencies(freq: &[u32; WEIGHT_VALUES], use_zero_runs: bool) -> Self {
    // Count in the upper bits, palette value in the low 16 so sorting keeps the pairing.
    let mut keyed = [0u64; WEIGHT_VALUES];
    let mut all_cnt: u64 = 0;
    let mut all_max_val: u32 = 0;
    for weight in -255i32..=255 {
      if weight == 0 && use_zero_runs {
        continue;
      }
      let count = freq[(weight + 256) as usize];
      let palval = palette_value(weight);
      keyed[palval as usize] = ((count as u64) << 16) | palval as u64;
      all_cnt += count as u64;
      if count > 0 {
        all_max_val = all_max_val.max(palval as u32);
      }
    }

    // Unused palette values nearest to zero are skipped by the direct coding.
    let mut direct_offset = keyed[..31].iter().position(|&key| key >> 16 != 0).unwrap_or(31) as u32;

    keyed.sort_unstable_by(|a, b| b.cmp(a));
    let count_at = |index: usize| keyed[index] >> 16;

    let only_zeros = count_at(0) == 0;
    if only_zeros {
      direct_offset = 0;
    }
    let only_palette = count_at(0) > 0 && count_at(PALETTE_MAX) == 0;

    let max_palette_size = if only_palette {
      PALETTE_MAX
    } else {
      // Direct indices must stay below 512 once shifted past the palette.
      match PALETTE_MAX.min(511 - all_max_val as usize) {
        1 => 0,
        size => size,
      }
    };

    let mut lut = [0u16; PALETTE_MAX];
    let mut palette_max_val: u32 = 0;
    let mut pal_cnt: u64 = 0;
    let mut size = 0;
    while size < max_palette_size {
      let count = count_at(size);
      if count == 0 {
        break;
      }
      let value = (keyed[size] & 0xffff) as u16;
      lut[size] = value;
      palette_max_val = palette_max_val.max(value as u32);
      pal_cnt += count;
      size += 1;
    }
    if size == 1 {
      // A single entry palette cannot be coded; pad it with zero.
      lut[1] = 0;
      size = 2;
    }

    let palbits_val = if pal_cnt > all_cnt / 2 {
      palette_max_val
    } else {
      size = 0;
      all_max_val
    };

    let mut bits = 2;
    while (1 << bits) <= palbits_val {
      bits += 1;
    }

    Self {
      lut,
      inv_lut: [0; WEIGHT_VALUES],
      size,
      bits,
      use_zero_runs,
      only_palette,
      direct_offset,
      only_zeros,
    }
  }

  fn build_inverse(&mut self) {
    for palval in 0..WEIGHT_VALUES {
      let index = (weight_of(palval as u32) + 256) as usize;
      self.inv_lut[index] = palval as i32 + self.size as i32 - self.direct_offset as i32;
    }
    for (i, &palval) in self.lut[..self.size].iter().enumerate() {
      let index = (weight_of(palval as u32) + 256) as usize;
      self.inv_lut[index] = i as i32;
    }
  }

  /// Coded index of `weight`.
  pub fn index_of(&self, weight: i16) -> i32 {
    self.inv_lut[(weight as i32 + 256) as usize]
  }

  /// Bits per weight in uncompressed mode, or `None` when that mode is unusable.
  ///
  /// Uncompressed mode needs either every weight in the palette or no palette at all.
  pub fn uncompressed_bits(&self) -> Option<u32> {
    if self.only_palette {
      let mut bits = 0;
      while (1 << bits) < self.size {
        bits += 1;
      }
      Some(bits)
    } else if self.size == 0 {
      Some(self.bits)
    } else {
      None
    }
  }
}
