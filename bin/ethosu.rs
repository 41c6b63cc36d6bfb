use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use ethosu::arch::Variant;
use ethosu::cmd::CommandReader;
use ethosu::utils::dump::{bytes_to_words, words_to_bytes};
use ethosu::{compress_weights, init_log, Compiler, CompilerOptions, Graph, Result};

/// ethosu - command stream compiler for the Ethos-U NPU
#[derive(Parser, Debug)]
#[command(name = "ethosu")]
#[command(version = "0.1.0")]
#[command(about = "Block scheduling, command stream encoding and weight compression for Ethos-U", long_about = None)]
struct Args {
  /// Quiet mode (suppress log messages)
  #[arg(short, long, global = true)]
  quiet: bool,

  /// Options file (TOML), layered under ETHOSU_* environment variables
  #[arg(short, long, global = true, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Target: u55 or u65
  #[arg(long, global = true, value_name = "VARIANT")]
  variant: Option<String>,

  /// Log every emitted command
  #[arg(long, global = true)]
  debug_msgs: bool,

  /// Dump the command stream and coefficients into this directory
  #[arg(long, global = true, value_name = "DIR")]
  dump_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Compile a JSON graph into a command stream
  Compile {
    graph: PathBuf,
    /// Command stream output
    #[arg(short, long, default_value = "cmdstream.bin")]
    output: PathBuf,
    /// Coefficient region output
    #[arg(long, default_value = "coefs.bin")]
    coefs: PathBuf,
  },
  /// Compress a JSON array of weights
  Compress {
    weights: PathBuf,
    #[arg(short, long, default_value = "weights.bin")]
    output: PathBuf,
  },
  /// Print the commands of a command stream
  Disasm { stream: PathBuf },
  /// Print the effective options as TOML
  Options,
}

fn parse_variant(name: &str) -> io::Result<Variant> {
  match name.to_lowercase().as_str() {
    "u55" => Ok(Variant::U55),
    "u65" => Ok(Variant::U65),
    _ => Err(io::Error::new(io::ErrorKind::InvalidInput, format!("Unknown variant: {}", name))),
  }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
  let content = fs::read_to_string(path)?;
  Ok(serde_json::from_str(&content)?)
}

fn main() -> Result<()> {
  let args = Args::parse();
  init_log(args.quiet);

  let mut options = CompilerOptions::load(args.config.as_deref())?;
  let variant = args.variant.as_deref().map(parse_variant).transpose()?;
  options.apply_cli_overrides(variant, args.debug_msgs, args.dump_dir.as_deref());

  match args.command {
    Command::Compile { graph, output, coefs } => {
      let graph: Graph = read_json(&graph)?;
      let compiled = Compiler::new(options).compile(graph)?;
      fs::write(&output, words_to_bytes(&compiled.cmdstream))?;
      log::info!("wrote {} command words to {}", compiled.cmdstream.len(), output.display());
      if !compiled.coefs.is_empty() {
        fs::write(&coefs, &compiled.coefs)?;
        log::info!("wrote {} coefficient bytes to {}", compiled.coefs.len(), coefs.display());
      }
      log::info!("I/O region needs {} bytes", compiled.io_size);
    }
    Command::Compress { weights, output } => {
      let weights: Vec<i16> = read_json(&weights)?;
      let stream = compress_weights(&weights)?;
      fs::write(&output, &stream)?;
      log::info!("compressed {} weights into {} bytes", weights.len(), stream.len());
    }
    Command::Disasm { stream } => {
      let words = bytes_to_words(&fs::read(&stream)?);
      let mut reader = CommandReader::new(&words);
      loop {
        let position = reader.position();
        let Some(command) = reader.next() else {
          break;
        };
        println!("{:6}: {}", position, command);
      }
    }
    Command::Options => {
      print!("{}", options.to_toml()?);
    }
  }

  Ok(())
}
