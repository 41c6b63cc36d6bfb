use super::bitbuf::BitWriter;
use super::grc::{search_grc_params, GrcSegment, W_GRC_PARAMS, Z_GRC_PARAMS};
use super::palette::Palette;
use super::sections::palette_sections;
use crate::error::CodecError;

/// `ZDIV` value of a slice without zero runs.
pub const ZDIV_DISABLE: u32 = 6;
/// `ZDIV` value marking the end of the stream.
pub const ZDIV_EOS: u32 = 7;
/// `WDIV` value of an uncompressed slice.
pub const WDIV_UNCOMPRESSED: u32 = 7;
/// Longest slice the 15-bit `SLICELEN` field can describe.
pub const SLICE_MAX: usize = 32767;
/// The stream is padded to this many bits.
const STREAM_ALIGN_BITS: usize = 128;

/// Unary/remainder split of the value currently being coded.
#[derive(Debug, Clone, Copy)]
struct Pending {
  q: i32,
  r: i32,
}

impl Pending {
  const IDLE: Self = Self { q: -1, r: 0 };
}

/// Unary symbols and remainders of one chunk.
#[derive(Debug, Clone, Copy, Default)]
struct Chunk {
  enabled: bool,
  unary0: u32,
  unary1: u32,
  unary1_len: u32,
  remain: [i32; 12],
  nsymbols: usize,
}

impl Chunk {
  fn push_remainder(&mut self, r: i32) {
    self.remain[self.nsymbols] = r;
    self.nsymbols += 1;
  }
}

/// GRC parameters of one slice.
#[derive(Debug, Clone, Copy)]
struct SliceParams {
  w_div: u32,
  w_trunc: bool,
  w_uncompressed: bool,
  z_div: u32,
}

impl SliceParams {
  fn new(w_cfg: usize, z_cfg: usize, uncompressed_bits: Option<u32>) -> Self {
    let w_param = W_GRC_PARAMS[w_cfg];
    let w_uncompressed = w_param >> 4 == 2;
    Self {
      w_div: if w_uncompressed {
        uncompressed_bits.unwrap_or(0)
      } else {
        (w_param & 15) as u32
      },
      w_trunc: w_param >> 4 == 1,
      w_uncompressed,
      z_div: (Z_GRC_PARAMS[z_cfg] & 15) as u32,
    }
  }
}

/// Codes one slice: header, optional palette, then interleaved weight and zero-run chunks.
///
/// `zruns` holds `weights.len() + 1` runs for the first slice of a section
/// (leading zeros included) and `weights.len()` runs otherwise.
fn encode_slice(
  writer: &mut BitWriter,
  weights: &[i32],
  zruns: &[i32],
  palette: &Palette,
  new_palette: bool,
  params: SliceParams,
) -> Result<(), CodecError> {
  let nvalues = weights.len();
  let zdiv = if palette.use_zero_runs {
    params.z_div
  } else {
    ZDIV_DISABLE
  };
  let wdiv = if params.w_uncompressed {
    WDIV_UNCOMPRESSED
  } else {
    params.w_div
  };

  log::debug!(
    "slice: bitoffset {:7} slicelen {:5} zdiv {} wdiv {} wtrunc {} newpal {} palbits {} palsize {:2}",
    writer.position(),
    nvalues,
    zdiv,
    wdiv,
    params.w_trunc as u32,
    new_palette as u32,
    palette.bits,
    palette.size
  );

  writer.put("ZDIV", 3, zdiv)?;
  writer.put("SLICELEN", 15, nvalues.saturating_sub(1) as u32)?;
  writer.put("WDIV", 3, wdiv)?;
  writer.put("WTRUNC", 1, params.w_trunc as u32)?;
  writer.put("NEWPAL", 1, new_palette as u32)?;
  if new_palette {
    writer.put("DIROFS", 5, palette.direct_offset)?;
    writer.put("PALSIZE", 5, palette.size.saturating_sub(1) as u32)?;
    writer.put("PALBITS", 3, palette.bits - 2)?;
    for &entry in &palette.lut[..palette.size] {
      writer.put("PALETTE", palette.bits, entry as u32)?;
    }
  }

  let z_nvalues = nvalues + new_palette as usize;
  let z_unary_len = if params.z_div < 3 { 12 } else { 8 };
  let w_max_symbols = if params.w_uncompressed && params.w_div > 5 { 8 } else { 12 };
  let w_mask = (1i32 << params.w_div.min(30)) - 1;
  let z_mask = (1i32 << params.z_div) - 1;

  let mut w_pos = 0;
  let mut z_pos = 0;
  let mut w = Pending::IDLE;
  let mut z = Pending::IDLE;
  let mut w_prev = Chunk::default();
  let mut z_prev = Chunk::default();

  loop {
    let balance = if palette.use_zero_runs {
      w_pos as i64 - z_pos as i64
    } else {
      0
    };
    let mut w_chunk = Chunk {
      enabled: balance < 8 && w_pos < nvalues,
      ..Chunk::default()
    };
    let mut z_chunk = Chunk {
      enabled: balance >= 0 && palette.use_zero_runs && z_pos < z_nvalues,
      ..Chunk::default()
    };

    if w_chunk.enabled {
      let mut j = 0;
      while j < w_max_symbols {
        if w.q < 0 {
          w = match weights.get(w_pos) {
            Some(&value) => Pending {
              q: value >> params.w_div,
              r: value & w_mask,
            },
            // Past the end: pad with a zero symbol and no remainder.
            None => Pending { q: 0, r: -1 },
          };
        }
        while w.q >= 0 && j < w_max_symbols {
          if w.q > 0 {
            w_chunk.unary0 |= 1 << j;
            if w.q > 1 {
              w_chunk.unary1 |= 1 << w_chunk.unary1_len;
            }
            w_chunk.unary1_len += 1;
          }
          j += 1;
          w.q -= if params.w_trunc { 3 } else { 2 };
        }
        if w.q < 0 && w.r >= 0 {
          w_chunk.push_remainder(w.r);
          w_pos += 1;
        }
      }
    }

    if z_chunk.enabled {
      let mut j = 0;
      while j < z_unary_len {
        if z.q < 0 {
          z = if z_pos < z_nvalues {
            let value = zruns[z_pos];
            Pending {
              q: value >> params.z_div,
              r: value & z_mask,
            }
          } else {
            Pending { q: 0, r: -1 }
          };
        }
        while z.q >= 0 && j < z_unary_len {
          if z.q > 0 {
            z_chunk.unary0 |= 1 << j;
          }
          j += 1;
          z.q -= 1;
        }
        if z.q < 0 && z.r >= 0 {
          z_chunk.push_remainder(z.r);
          z_pos += 1;
        }
      }
    }

    if w_chunk.enabled && !params.w_uncompressed {
      writer.put("WUNARY0", 12, w_chunk.unary0)?;
    }
    if z_chunk.enabled {
      writer.put("ZUNARY", z_unary_len, z_chunk.unary0)?;
    }
    if w_chunk.enabled && !params.w_uncompressed {
      writer.put("WUNARY1", w_chunk.unary1_len, w_chunk.unary1)?;
    }
    if w_prev.enabled {
      for &r in &w_prev.remain[..w_prev.nsymbols] {
        writer.put("WREMAIN", params.w_div, r as u32)?;
      }
    }
    if z_prev.enabled {
      for &r in &z_prev.remain[..z_prev.nsymbols] {
        writer.put("ZREMAIN", params.z_div, r as u32)?;
      }
    }

    w_prev = w_chunk;
    z_prev = z_chunk;
    if !w_prev.enabled && !z_prev.enabled {
      break;
    }
  }

  Ok(())
}

fn try_vec<T>(capacity: usize) -> Result<Vec<T>, CodecError> {
  let mut values = Vec::new();
  values.try_reserve(capacity)?;
  Ok(values)
}

/// Codes one palette section as a sequence of slices.
fn encode_section(writer: &mut BitWriter, section: &[i16], palette: &Palette) -> Result<(), CodecError> {
  let uncompressed_bits = palette.uncompressed_bits();

  // Split into coded weights and the zero runs in front of each (plus the trailing run).
  let mut weights: Vec<i32> = try_vec(section.len())?;
  let mut zruns: Vec<i32> = try_vec(if palette.use_zero_runs { section.len() + 1 } else { 0 })?;
  let mut i = 0;
  loop {
    if palette.use_zero_runs {
      let mut run = 0;
      // An all-zero section still codes its first zero as a weight so the slice is not empty.
      if !palette.only_zeros || i > 0 {
        while i < section.len() && section[i] == 0 {
          run += 1;
          i += 1;
        }
      }
      zruns.push(run);
    }
    if i == section.len() {
      break;
    }
    weights.push(palette.index_of(section[i]));
    i += 1;
  }

  let w_segments = if weights.is_empty() {
    Vec::new()
  } else {
    search_grc_params(&weights, false, uncompressed_bits, &[])?
  };
  let z_segments: Vec<GrcSegment> = if palette.use_zero_runs {
    let existing: Vec<usize> = w_segments.iter().map(|segment| segment.end).collect();
    search_grc_params(&zruns, true, None, &existing)?
  } else {
    Vec::new()
  };

  let n_weights = weights.len();
  let mut pos = 0;
  let mut i_w = 0;
  let mut i_z = 0;
  let mut new_palette = true;
  while pos < n_weights || new_palette {
    let mut end = pos + SLICE_MAX;
    if let Some(segment) = w_segments.get(i_w) {
      end = end.min(segment.end);
    }
    if let Some(segment) = z_segments.get(i_z) {
      end = end.min(segment.end);
    }
    end = end.min(n_weights);

    // Only the first slice carries the run in front of its first weight.
    let zrun_slice = if palette.use_zero_runs {
      &zruns[pos + !new_palette as usize..]
    } else {
      &[]
    };
    let params = SliceParams::new(
      w_segments.get(i_w).map_or(0, |segment| segment.cfg),
      z_segments.get(i_z).map_or(0, |segment| segment.cfg),
      uncompressed_bits,
    );
    encode_slice(writer, &weights[pos..end], zrun_slice, palette, new_palette, params)?;
    new_palette = false;

    if w_segments.get(i_w).is_some_and(|segment| segment.end == end) {
      i_w += 1;
    }
    if z_segments.get(i_z).is_some_and(|segment| segment.end == end) {
      i_z += 1;
    }
    pos = end;
  }

  Ok(())
}

/// Compresses signed weights in `-255..=255` into an MLW bitstream.
///
/// The stream is terminated by an end-of-stream marker and padded with
/// `0xff` to a multiple of 16 bytes. An empty input gives just the marker.
pub fn compress_weights(weights: &[i16]) -> Result<Vec<u8>, CodecError> {
  if let Some((index, &value)) = weights.iter().enumerate().find(|&(_, &w)| !(-255..=255).contains(&w)) {
    return Err(CodecError::WeightOutOfRange { index, value });
  }

  let mut writer = BitWriter::new();
  if !weights.is_empty() {
    let restarts = palette_sections(weights)?;
    for (k, &start) in restarts.iter().enumerate() {
      let end = restarts.get(k + 1).copied().unwrap_or(weights.len());
      let section = &weights[start..end];
      let palette = Palette::for_section(section);
      log::trace!(
        "section {}..{}: palette size {} zero runs {}",
        start,
        end,
        palette.size,
        palette.use_zero_runs
      );
      encode_section(&mut writer, section, &palette)?;
    }
  }

  writer.put("ZDIV", 3, ZDIV_EOS)?;
  writer.put("BYTEALIGN", ((8 - (writer.position() & 7)) & 7) as u32, 0xff)?;
  while writer.position() % STREAM_ALIGN_BITS != 0 {
    writer.put("PAD", 8, 0xff)?;
  }

  let bytes = writer.into_bytes();
  log::debug!("compressed {} weights into {} bytes", weights.len(), bytes.len());
  Ok(bytes)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_input_is_end_marker_only() {
    let stream = compress_weights(&[]).unwrap();
    assert_eq!(stream, vec![0xff; 16]);
  }

  #[test]
  fn test_out_of_range_weight() {
    let err = compress_weights(&[0, 1, 256]).unwrap_err();
    assert!(matches!(err, CodecError::WeightOutOfRange { index: 2, value: 256 }));
    let err = compress_weights(&[-256]).unwrap_err();
    assert!(matches!(err, CodecError::WeightOutOfRange { index: 0, value: -256 }));
  }

  #[test]
  fn test_output_is_aligned() {
    for len in [1, 7, 100, 1000] {
      let weights: Vec<i16> = (0..len).map(|i| ((i * 7) % 31) as i16 - 15).collect();
      let stream = compress_weights(&weights).unwrap();
      assert!(!stream.is_empty());
      assert_eq!(stream.len() % 16, 0);
    }
  }

  #[test]
  fn test_first_slice_header() {
    // Sixteen copies of 5: a two entry palette [10, 0], no zero runs.
    let stream = compress_weights(&[5; 16]).unwrap();
    let bits = |start: usize, len: usize| {
      (0..len).fold(0u32, |acc, i| {
        let pos = start + i;
        acc | ((((stream[pos / 8] >> (pos % 8)) & 1) as u32) << i)
      })
    };
    assert_eq!(bits(0, 3), ZDIV_DISABLE);
    assert_eq!(bits(3, 15), 15);
    assert_eq!(bits(22, 1), 1);
    // PALSIZE holds the entry count minus one, PALBITS the width minus two.
    assert_eq!(bits(28, 5), 1);
    assert_eq!(bits(33, 3), 2);
    assert_eq!(bits(36, 4), 10);
    assert_eq!(bits(40, 4), 0);
  }
}
