use env_logger::{Builder, Env};

/// Installs the process logger. `RUST_LOG` overrides the default filter.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_log(quiet: bool) {
  let default_filter = if quiet { "warn" } else { "info" };
  let _ = Builder::from_env(Env::default().default_filter_or(default_filter))
    .format_timestamp(None)
    .try_init();
}
