//! MLW weight compression.
//!
//! Weights are split into palette sections, each section into slices that
//! share GRC (Golomb-Rice) parameters. Zeros may be coded as run lengths
//! interleaved with the weight symbols. The bitstream is written LSB first.
pub mod bitbuf;
pub mod encode;
pub mod grc;
pub mod palette;
pub mod reorder;
pub mod sections;

pub use encode::{compress_weights, SLICE_MAX, WDIV_UNCOMPRESSED, ZDIV_DISABLE, ZDIV_EOS};
pub use palette::Palette;
pub use reorder::{reorder, reorder_encode, ReorderParams};
