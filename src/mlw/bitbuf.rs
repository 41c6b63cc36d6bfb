use crate::error::CodecError;

/// Little-endian bit writer: the first bit written is bit 0 of byte 0.
#[derive(Debug, Default)]
pub struct BitWriter {
  bytes: Vec<u8>,
  pos: usize,
}

impl BitWriter {
  pub fn new() -> Self {
    Self::default()
  }

  /// Bit position of the next write.
  pub fn position(&self) -> usize {
    self.pos
  }

  pub fn put_bit(&mut self, bit: bool) -> Result<(), CodecError> {
    let byte = self.pos >> 3;
    if byte == self.bytes.len() {
      self.bytes.try_reserve(1)?;
      self.bytes.push(0);
    }
    if bit {
      self.bytes[byte] |= 1 << (self.pos & 7);
    }
    self.pos += 1;
    Ok(())
  }

  /// Writes the low `len` bits of `data`, least significant first.
  pub fn put(&mut self, name: &str, len: u32, data: u32) -> Result<(), CodecError> {
    if len == 0 {
      return Ok(());
    }
    log::trace!("bitbuf: pos {:3} {:>8} len {} data {:x}", self.pos, name, len, data);
    for i in 0..len {
      self.put_bit(i < 32 && (data >> i) & 1 != 0)?;
    }
    Ok(())
  }

  pub fn into_bytes(self) -> Vec<u8> {
    self.bytes
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_lsb_first() {
    let mut writer = BitWriter::new();
    writer.put("A", 3, 0b101).unwrap();
    writer.put("B", 7, 0x7f).unwrap();
    assert_eq!(writer.position(), 10);
    assert_eq!(writer.into_bytes(), vec![0b1111_1101, 0b11]);
  }

  #[test]
  fn test_zero_length_put() {
    let mut writer = BitWriter::new();
    writer.put("EMPTY", 0, 0xff).unwrap();
    assert_eq!(writer.position(), 0);
    assert!(writer.into_bytes().is_empty());
  }
}
