use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

use crate::consts::BLOCK_SIZE;
use crate::driver::DeviceDriver;

pub struct FileDrive {
    file: File,
    block_count: u64,
}

impl FileDrive {
    /// Creates (or truncates) an image file of `block_count` blocks.
    pub fn create<P: AsRef<Path>>(path: P, block_count: u64) -> io::Result<FileDrive> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(block_count * BLOCK_SIZE as u64)?;
        Ok(FileDrive { file, block_count })
    }

    pub fn open<P: AsRef<Path>>(path: P, writable: bool) -> io::Result<FileDrive> {
        let file = OpenOptions::new().read(true).write(writable).open(path)?;
        let block_count = file.metadata()?.len() / BLOCK_SIZE as u64;
        Ok(FileDrive { file, block_count })
    }
}

impl DeviceDriver for FileDrive {
    fn get_block_count(&self) -> u64 {
        self.block_count
    }

    fn read(&self, index: u64, count: u64, buffer: &mut [u8]) -> io::Result<()> {
        let length = count as usize * BLOCK_SIZE;
        self.file.read_exact_at(&mut buffer[..length], index * BLOCK_SIZE as u64)
    }

    fn write(&mut self, index: u64, count: u64, buffer: &[u8]) -> io::Result<()> {
        let length = count as usize * BLOCK_SIZE;
        self.file.write_all_at(&buffer[..length], index * BLOCK_SIZE as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drive.img");
        {
            let mut drive = FileDrive::create(&path, 1024).unwrap();
            assert_eq!(drive.get_block_count(), 1024);

            let block0 = vec![0x42; BLOCK_SIZE];
            let mut blocks = vec![0x1; BLOCK_SIZE];
            blocks.extend_from_slice(&vec![0x8; BLOCK_SIZE]);

            drive.write(0, 1, &block0).unwrap();
            drive.write(511, 2, &blocks).unwrap();

            let mut buffer = vec![0; BLOCK_SIZE];
            drive.read(0, 1, &mut buffer).unwrap();
            assert_eq!(buffer, block0);

            let mut buffer = vec![0; 2 * BLOCK_SIZE];
            drive.read(511, 2, &mut buffer).unwrap();
            assert_eq!(buffer, blocks);

            let mut buffer = vec![0xff; BLOCK_SIZE];
            drive.read(1023, 1, &mut buffer).unwrap();
            assert_eq!(buffer, vec![0; BLOCK_SIZE]);
        }

        let drive = FileDrive::open(&path, false).unwrap();
        assert_eq!(drive.get_block_count(), 1024);
        let mut buffer = vec![0; BLOCK_SIZE];
        drive.read(512, 1, &mut buffer).unwrap();
        assert_eq!(buffer, vec![0x8; BLOCK_SIZE]);
    }

    #[test]
    fn read_past_end() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let drive = FileDrive::create(file.path(), 4).unwrap();
        let mut buffer = vec![0; BLOCK_SIZE];
        assert!(drive.read(4, 1, &mut buffer).is_err());
    }
}
