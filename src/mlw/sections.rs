use super::palette::WEIGHT_VALUES;
use crate::error::CodecError;

/// Window sizes, in nonzero weights, over which a fresh palette is evaluated.
const WINDOW_SIZES: [i64; 5] = [32, 64, 128, 256, 512];

fn is_power_of_two(x: i64) -> bool {
  ((x - 1) & x) == 0
}

/// Bits needed to index a palette of `size` entries.
pub fn palette_index_bits(size: i64) -> i64 {
  (0..=7).rev().find(|&i| size > (1 << i)).map_or(0, |i| i + 1)
}

/// Start positions of the palette sections of `weights`. The first is always 0.
///
/// A new section starts when a smaller palette would cover the recent
/// values, or when a long-lived palette is about to need one more index bit.
pub fn palette_sections(weights: &[i16]) -> Result<Vec<usize>, CodecError> {
  let value_at = |i: i64| weights[i as usize];
  let slot = |i: i64| (value_at(i) as i32 + 256) as usize;

  let mut restarts = Vec::new();
  restarts.try_reserve(weights.len().div_ceil(64).max(1))?;
  restarts.push(0usize);

  let mut prev_idx = [-1i64; WEIGHT_VALUES];
  let mut last_restart_idx: i64 = 0;
  let mut got_palette = false;
  let mut palette_size: i64 = 0;
  let mut zero_cnt: i64 = 0;

  for i in 0..weights.len() as i64 {
    let exclude_zero = (zero_cnt > (i - last_restart_idx) / 4) as i64;

    if got_palette && prev_idx[slot(i)] < last_restart_idx {
      palette_size += 1;
      if is_power_of_two(palette_size - 1 - exclude_zero)
        && ((i - last_restart_idx - zero_cnt) > 512 || (palette_size - exclude_zero) > 32)
      {
        log::trace!("palette restart at {}: palette would need another index bit", i);
        restarts.try_reserve(1)?;
        restarts.push(i as usize);
        last_restart_idx = i;
        got_palette = false;
        zero_cnt = 0;
      }
    }

    prev_idx[slot(i)] = i;
    if value_at(i) == 0 {
      zero_cnt += 1;
    }

    for window in WINDOW_SIZES {
      let n = if got_palette { window * 2 } else { window };
      let nonzeros = i - last_restart_idx - zero_cnt;
      if nonzeros <= 0 || nonzeros % n != 0 {
        continue;
      }

      // Walk back to the position n nonzero values earlier.
      let mut nzcnt = 0;
      let mut j = i;
      while j > last_restart_idx {
        if value_at(j) != 0 {
          if nzcnt == n + 1 {
            break;
          }
          nzcnt += 1;
        }
        j -= 1;
      }
      let restart_idx = j;

      let new_palette_size = prev_idx.iter().filter(|&&idx| idx >= restart_idx).count() as i64;
      let new_bits = palette_index_bits(new_palette_size - exclude_zero);

      let create_new_palette = if got_palette {
        let old_bits = palette_index_bits(palette_size - exclude_zero);
        let savings = n * (old_bits * 15 - new_bits * 15) / 16 - new_palette_size * 8 - 20;
        savings > 0
      } else if new_palette_size - exclude_zero <= 32 {
        let savings = n * (90 - new_bits * 15) / 16 - new_palette_size * 8 - 20;
        savings > 0
      } else {
        false
      };

      if create_new_palette {
        palette_size = new_palette_size;
        got_palette = true;
        last_restart_idx = restart_idx;
        log::trace!("palette of size {} from {}", new_palette_size, restart_idx);
        if restarts.last() != Some(&(restart_idx as usize)) {
          restarts.try_reserve(1)?;
          restarts.push(restart_idx as usize);
        }
        zero_cnt = (last_restart_idx..=i).filter(|&k| value_at(k) == 0).count() as i64;
      }
    }
  }

  Ok(restarts)
}
