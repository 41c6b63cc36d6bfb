use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::arch::Variant;
use crate::error::Result;

/// Prefix of the environment variables read by [`CompilerOptions::load`].
pub const ENV_PREFIX: &str = "ETHOSU";
pub const DEFAULT_SRAM_SIZE: u32 = 0x20000;

/// Knobs of one compilation, passed explicitly to every entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
  pub variant: Variant,
  /// Log every emitted command at debug level.
  pub debug_msgs: bool,
  /// Write the command stream and coefficient buffer to `dump_dir`.
  pub dump_buffers: bool,
  pub dump_dir: PathBuf,
  /// Never stage coefficients into scratch SRAM.
  pub disable_sram: bool,
  /// Keep every tensor in NHWC.
  pub disable_nhcwb16: bool,
  /// Bytes of scratch SRAM available for coefficient staging.
  pub sram_size: u32,
}

impl Default for CompilerOptions {
  fn default() -> Self {
    Self {
      variant: Variant::default(),
      debug_msgs: false,
      dump_buffers: false,
      dump_dir: PathBuf::from("."),
      disable_sram: false,
      disable_nhcwb16: false,
      sram_size: DEFAULT_SRAM_SIZE,
    }
  }
}

impl CompilerOptions {
  /// Defaults, overridden by the TOML file at `path` if given, then by `ETHOSU_*` variables.
  pub fn load(path: Option<&Path>) -> Result<Self> {
    let mut builder = Config::builder();
    if let Some(path) = path {
      builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
    }
    let options = builder
      .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
      .build()?
      .try_deserialize::<CompilerOptions>()?;
    log::debug!("compiler options: {:?}", options);
    Ok(options)
  }

  /// Parses options from a TOML string, without consulting the environment.
  pub fn from_toml(content: &str) -> Result<Self> {
    let options = Config::builder()
      .add_source(File::from_str(content, FileFormat::Toml))
      .build()?
      .try_deserialize::<CompilerOptions>()?;
    Ok(options)
  }

  pub fn to_toml(&self) -> Result<String> {
    Ok(toml::to_string(self)?)
  }

  /// Command line flags win over files and the environment.
  pub fn apply_cli_overrides(&mut self, variant: Option<Variant>, debug_msgs: bool, dump_dir: Option<&Path>) {
    if let Some(variant) = variant {
      self.variant = variant;
    }
    if debug_msgs {
      self.debug_msgs = true;
    }
    if let Some(dir) = dump_dir {
      self.dump_buffers = true;
      self.dump_dir = dir.to_path_buf();
    }
  }

  /// Scratch bytes usable for staging; zero when staging is off.
  pub fn staging_budget(&self) -> u32 {
    if self.disable_sram {
      0
    } else {
      self.sram_size
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let options = CompilerOptions::default();
    assert_eq!(options.variant, Variant::U65);
    assert_eq!(options.sram_size, 0x20000);
    assert_eq!(options.staging_budget(), 0x20000);
    assert!(!options.debug_msgs);
  }

  #[test]
  fn test_from_toml_partial() {
    let options = CompilerOptions::from_toml("variant = \"u55\"\ndisable_sram = true\n").unwrap();
    assert_eq!(options.variant, Variant::U55);
    assert!(options.disable_sram);
    assert_eq!(options.staging_budget(), 0);
    assert_eq!(options.sram_size, DEFAULT_SRAM_SIZE);
  }

  #[test]
  fn test_toml_round_trip() {
    let mut options = CompilerOptions::default();
    options.variant = Variant::U55;
    options.sram_size = 0x1000;
    let text = options.to_toml().unwrap();
    assert!(text.contains("variant = \"u55\""));
    assert_eq!(CompilerOptions::from_toml(&text).unwrap(), options);
  }

  #[test]
  fn test_load_file() {
    let path = std::env::temp_dir().join(format!("ethosu-options-{}.toml", std::process::id()));
    std::fs::write(&path, "sram_size = 4096\ndebug_msgs = true\n").unwrap();
    let options = CompilerOptions::load(Some(&path)).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(options.sram_size, 4096);
    assert!(options.debug_msgs);
  }

  #[test]
  fn test_load_missing_file() {
    let path = Path::new("/nonexistent/ethosu.toml");
    assert!(CompilerOptions::load(Some(path)).is_err());
  }

  #[test]
  fn test_cli_overrides() {
    let mut options = CompilerOptions::default();
    options.apply_cli_overrides(Some(Variant::U55), true, Some(Path::new("dumps")));
    assert_eq!(options.variant, Variant::U55);
    assert!(options.debug_msgs);
    assert!(options.dump_buffers);
    assert_eq!(options.dump_dir, PathBuf::from("dumps"));
  }
}
