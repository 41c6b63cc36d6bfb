use crate::error::CodecError;

/// Weight GRC configurations: `(trunc << 4) | div`, where trunc 2 means uncompressed.
pub const W_GRC_PARAMS: [u8; 13] = [
  0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x20,
];
/// Zero-run GRC configurations; the search only uses the first four.
pub const Z_GRC_PARAMS: [u8; 5] = [0x00, 0x01, 0x02, 0x03, 0x04];
const Z_SEARCH_CFGS: usize = 4;

/// Cost of the slice header needed to switch parameters.
const SWITCH_COST: i64 = 40;
/// Cost assigned to values a configuration cannot code.
const UNCODABLE_COST: i64 = 10000;
/// Prices uncompressed mode out of the search when it is unusable.
const UNUSABLE_UNCOMPRESSED_BITS: u32 = 100;

/// One run of values coded with the same parameters, ending before `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrcSegment {
  pub cfg: usize,
  pub end: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct State {
  bitcnt: i64,
  prev_cfg: usize,
}

/// Bits needed to code `value` with the parameter byte `param`.
fn value_cost(value: i32, param: u8, zrun_mode: bool, uncompressed_bits: Option<u32>) -> i64 {
  let div = (param & 15) as u32;
  let trunc = param >> 4;
  if trunc == 2 {
    return uncompressed_bits.unwrap_or(UNUSABLE_UNCOMPRESSED_BITS) as i64;
  }

  let q = (value >> div) as i64;
  if !zrun_mode && ((trunc == 1 && q > 2) || q > 31) {
    return UNCODABLE_COST;
  }
  if trunc == 1 {
    (q + 1).min(2) + div as i64
  } else {
    q + 1 + div as i64
  }
}

/// Finds a cheap sequence of GRC parameters for `values` with a Viterbi-style search.
///
/// `existing` lists segment ends already paid for by the other stream;
/// switching there is free. Segments are returned in stream order.
pub fn search_grc_params(
  values: &[i32],
  zrun_mode: bool,
  uncompressed_bits: Option<u32>,
  existing: &[usize],
) -> Result<Vec<GrcSegment>, CodecError> {
  let params: &[u8] = if zrun_mode {
    &Z_GRC_PARAMS[..Z_SEARCH_CFGS]
  } else {
    &W_GRC_PARAMS
  };
  let n_cfg = params.len();
  let n = values.len();

  let mut states: Vec<State> = Vec::new();
  states.try_reserve_exact(n_cfg * (n + 1))?;
  states.resize(n_cfg * (n + 1), State::default());
  let at = |cfg: usize, i: usize| cfg * (n + 1) + i;

  for cfg in 0..n_cfg {
    states[at(cfg, 0)] = State { bitcnt: 0, prev_cfg: cfg };
  }

  let best_at = |states: &[State], i: usize| {
    (0..n_cfg).fold((i64::MAX, 0), |(best, best_cfg), cfg| {
      let bitcnt = states[at(cfg, i)].bitcnt;
      if bitcnt < best {
        (bitcnt, cfg)
      } else {
        (best, best_cfg)
      }
    })
  };

  let mut existing_idx = 0;
  for (i, &value) in values.iter().enumerate() {
    let (best_bitcnt, best_cfg) = best_at(&states, i);

    let mut cmd_cost = SWITCH_COST;
    if existing.get(existing_idx) == Some(&(i + 1)) {
      cmd_cost = 0;
      existing_idx += 1;
    }

    for (cfg, &param) in params.iter().enumerate() {
      let bits = value_cost(value, param, zrun_mode, uncompressed_bits);
      let current = states[at(cfg, i)].bitcnt;
      states[at(cfg, i + 1)] = if best_bitcnt + cmd_cost < current {
        State {
          bitcnt: best_bitcnt + cmd_cost + bits,
          prev_cfg: best_cfg,
        }
      } else {
        State {
          bitcnt: current + bits,
          prev_cfg: cfg,
        }
      };
    }
  }

  let (best_bitcnt, best_cfg) = best_at(&states, n);
  log::trace!(
    "grc search ({}): {} values in {} bits",
    if zrun_mode { "zrun" } else { "weights" },
    n,
    best_bitcnt
  );

  let mut segments = Vec::new();
  let mut cfg = best_cfg;
  let mut end = n;
  for i in (0..=n).rev() {
    let prev_cfg = states[at(cfg, i)].prev_cfg;
    if prev_cfg != cfg || i == 0 {
      segments.try_reserve(1)?;
      segments.push(GrcSegment { cfg, end });
      cfg = prev_cfg;
      end = i.saturating_sub(1);
    }
  }
  segments.reverse();
  Ok(segments)
}
