use std::fmt;

use super::regs::{cmd_name, CMD1_FLAG, OPCODE_MASK};
use crate::error::EncodingError;

/// Largest short-form immediate.
const IMMEDIATE_MAX: u32 = 0xffff;

/// Append-only command word buffer.
#[derive(Debug, Default)]
pub struct CommandStream {
  words: Vec<u32>,
  log_commands: bool,
}

impl CommandStream {
  pub fn new(log_commands: bool) -> Self {
    Self {
      words: Vec::new(),
      log_commands,
    }
  }

  /// Short command with an unsigned 16-bit immediate.
  pub fn emit0(&mut self, cmd: u32, param: u32) -> Result<(), EncodingError> {
    if param > IMMEDIATE_MAX {
      return Err(overflow(false, cmd, param as i64));
    }
    self.words.try_reserve(1)?;
    self.words.push(cmd | (param << 16));
    if self.log_commands {
      log::debug!("emit0({}, 0x{:x});", cmd_name(false, cmd), param);
    }
    Ok(())
  }

  /// Short command with a signed 16-bit immediate (zero points).
  pub fn emit0_signed(&mut self, cmd: u32, value: i32) -> Result<(), EncodingError> {
    if i16::try_from(value).is_err() {
      return Err(overflow(false, cmd, value as i64));
    }
    self.emit0(cmd, value as u32 & IMMEDIATE_MAX)
  }

  /// Long command: 16-bit immediate plus a trailing 32-bit word.
  pub fn emit1(&mut self, cmd: u32, param: u32, offset: u64) -> Result<(), EncodingError> {
    if param > IMMEDIATE_MAX {
      return Err(overflow(true, cmd, param as i64));
    }
    let Ok(offset) = u32::try_from(offset) else {
      return Err(overflow(true, cmd, offset as i64));
    };
    self.words.try_reserve(2)?;
    self.words.push(cmd | CMD1_FLAG | (param << 16));
    self.words.push(offset);
    if self.log_commands {
      log::debug!("emit1({}, 0x{:x}, 0x{:x});", cmd_name(true, cmd), param, offset);
    }
    Ok(())
  }

  pub fn len(&self) -> usize {
    self.words.len()
  }

  pub fn is_empty(&self) -> bool {
    self.words.is_empty()
  }

  pub fn words(&self) -> &[u32] {
    &self.words
  }

  pub fn into_words(self) -> Vec<u32> {
    self.words
  }
}

fn overflow(long: bool, cmd: u32, value: i64) -> EncodingError {
  EncodingError::FieldOverflow {
    command: cmd_name(long, cmd),
    value,
  }
}

/// One decoded command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
  pub opcode: u32,
  pub long: bool,
  pub param: u16,
  /// Trailing word of a long command; `None` if the stream was cut short.
  pub offset: Option<u32>,
}

impl Command {
  pub fn name(&self) -> &'static str {
    cmd_name(self.long, self.opcode)
  }
}

impl fmt::Display for Command {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match (self.long, self.offset) {
      (false, _) => write!(f, "emit0({}, 0x{:x});", self.name(), self.param),
      (true, Some(offset)) => write!(f, "emit1({}, 0x{:x}, 0x{:x});", self.name(), self.param, offset),
      (true, None) => write!(f, "emit1({}, 0x{:x}, <truncated>);", self.name(), self.param),
    }
  }
}

/// Walks a command word stream.
#[derive(Debug, Clone)]
pub struct CommandReader<'a> {
  words: &'a [u32],
  pos: usize,
}

impl<'a> CommandReader<'a> {
  pub fn new(words: &'a [u32]) -> Self {
    Self { words, pos: 0 }
  }

  /// Index of the next word to be read.
  pub fn position(&self) -> usize {
    self.pos
  }
}

impl Iterator for CommandReader<'_> {
  type Item = Command;

  fn next(&mut self) -> Option<Command> {
    let word = *self.words.get(self.pos)?;
    self.pos += 1;

    let long = word & CMD1_FLAG != 0;
    let offset = if long {
      let offset = self.words.get(self.pos).copied();
      self.pos += 1;
      offset
    } else {
      None
    };

    Some(Command {
      opcode: word & OPCODE_MASK,
      long,
      param: (word >> 16) as u16,
      offset,
    })
  }
}
