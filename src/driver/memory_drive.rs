use std::io;

use crate::consts::BLOCK_SIZE;
use crate::driver::DeviceDriver;

/// Image held in memory. Used for scratch filesystems and tests.
pub struct MemoryDrive {
    data: Vec<u8>,
}

impl MemoryDrive {
    pub fn new(block_count: u64) -> MemoryDrive {
        MemoryDrive { data: vec![0; block_count as usize * BLOCK_SIZE] }
    }

    pub fn from_bytes(data: Vec<u8>) -> MemoryDrive {
        MemoryDrive { data }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    fn range(&self, index: u64, count: u64) -> io::Result<std::ops::Range<usize>> {
        let start = index as usize * BLOCK_SIZE;
        let end = start + count as usize * BLOCK_SIZE;
        if end > self.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("blocks {}..{} beyond end of drive", index, index + count),
            ));
        }
        Ok(start..end)
    }
}

impl DeviceDriver for MemoryDrive {
    fn get_block_count(&self) -> u64 {
        (self.data.len() / BLOCK_SIZE) as u64
    }

    fn read(&self, index: u64, count: u64, buffer: &mut [u8]) -> io::Result<()> {
        let range = self.range(index, count)?;
        buffer[..range.len()].copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write(&mut self, index: u64, count: u64, buffer: &[u8]) -> io::Result<()> {
        let range = self.range(index, count)?;
        let length = range.len();
        self.data[range].copy_from_slice(&buffer[..length]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write() {
        let mut drive = MemoryDrive::new(8);
        drive.write(7, 1, &vec![0x52; BLOCK_SIZE]).unwrap();

        let mut buffer = vec![0; BLOCK_SIZE];
        drive.read(7, 1, &mut buffer).unwrap();
        assert_eq!(buffer, vec![0x52; BLOCK_SIZE]);
        assert!(drive.read(8, 1, &mut buffer).is_err());
    }
}
