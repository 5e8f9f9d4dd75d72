use std::io;

pub mod file_drive;
pub mod memory_drive;

/// Synchronous block device. Transfers are whole blocks of `BLOCK_SIZE` bytes,
/// addressed by zero-based block number.
pub trait DeviceDriver {
    fn get_block_count(&self) -> u64;
    fn read(&self, index: u64, count: u64, buffer: &mut [u8]) -> io::Result<()>;
    fn write(&mut self, index: u64, count: u64, buffer: &[u8]) -> io::Result<()>;
}
