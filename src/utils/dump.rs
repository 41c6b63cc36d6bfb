use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File a dumped buffer is written to: `ethosu-<name>-<op>-<sub>.bin`.
pub fn dump_path(dir: &Path, name: &str, operation: usize, suboperation: usize) -> PathBuf {
  dir.join(format!("ethosu-{}-{:03}-{:03}.bin", name, operation, suboperation))
}

/// Writes `bytes` for offline inspection and returns the path used.
pub fn dump_buffer(dir: &Path, name: &str, operation: usize, suboperation: usize, bytes: &[u8]) -> io::Result<PathBuf> {
  fs::create_dir_all(dir)?;
  let path = dump_path(dir, name, operation, suboperation);
  fs::write(&path, bytes)?;
  log::info!("dumped {} bytes to {}", bytes.len(), path.display());
  Ok(path)
}

/// Little-endian bytes of a command word stream.
pub fn words_to_bytes(words: &[u32]) -> Vec<u8> {
  words.iter().flat_map(|word| word.to_le_bytes()).collect()
}

/// Inverse of [`words_to_bytes`]; a trailing partial word is dropped.
pub fn bytes_to_words(bytes: &[u8]) -> Vec<u32> {
  bytes
    .chunks_exact(4)
    .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_dump_path() {
    let path = dump_path(Path::new("/tmp"), "cmdstream", 0, 12);
    assert_eq!(path, PathBuf::from("/tmp/ethosu-cmdstream-000-012.bin"));
  }

  #[test]
  fn test_words_bytes() {
    let bytes = words_to_bytes(&[0x0001_010f, 0xffff_0000]);
    assert_eq!(bytes, vec![0x0f, 0x01, 0x01, 0x00, 0x00, 0x00, 0xff, 0xff]);
    assert_eq!(bytes_to_words(&bytes), vec![0x0001_010f, 0xffff_0000]);
    assert_eq!(bytes_to_words(&bytes[..7]), vec![0x0001_010f]);
  }

  #[test]
  fn test_dump_buffer_writes_file() {
    let dir = std::env::temp_dir().join(format!("ethosu-dump-test-{}", std::process::id()));
    let path = dump_buffer(&dir, "coefs", 1, 2, &[1, 2, 3]).unwrap();
    assert_eq!(fs::read(&path).unwrap(), vec![1, 2, 3]);
    fs::remove_dir_all(&dir).unwrap();
  }
}
