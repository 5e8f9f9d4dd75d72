use crate::consts::{BlockPointer, BLOCK_SIZE, NULL_POINTER, POINTERS_PER_BLOCK, POINTER_SIZE};
use crate::driver::DeviceDriver;
use crate::util::error::{Error, Result};
use crate::util::serializable::read_u32;

pub type IndirectBlock = [BlockPointer; POINTERS_PER_BLOCK];

pub struct IO<A: DeviceDriver> {
    pub(crate) device: A,
    pub block_count: u64,
}

impl<A: DeviceDriver> IO<A> {
    pub fn new(device: A) -> IO<A> {
        let block_count = device.get_block_count();
        IO { device, block_count }
    }

    pub fn into_device(self) -> A {
        self.device
    }

    pub(crate) fn read_blocks(&self, index: u64, count: u64) -> Result<Vec<u8>> {
        self.check_range(index, count)?;
        let mut buffer = vec![0u8; count as usize * BLOCK_SIZE];
        self.device.read(index, count, &mut buffer)?;
        Ok(buffer)
    }

    pub(crate) fn read_block(&self, index: u64) -> Result<Vec<u8>> {
        self.read_blocks(index, 1)
    }

    pub(crate) fn write_blocks(&mut self, index: u64, data: &[u8]) -> Result<()> {
        if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
            return Err(Error::InvalidArgument(format!(
                "transfer of {} bytes is not a whole number of blocks",
                data.len()
            )));
        }
        let count = (data.len() / BLOCK_SIZE) as u64;
        self.check_range(index, count)?;
        self.device.write(index, count, data)?;
        Ok(())
    }

    pub(crate) fn write_block(&mut self, index: u64, block: &[u8]) -> Result<()> {
        if block.len() != BLOCK_SIZE {
            return Err(Error::InvalidArgument(format!(
                "block size mismatch - expected {}, got {}",
                BLOCK_SIZE,
                block.len()
            )));
        }
        self.write_blocks(index, block)
    }

    /// Reads a block holding `POINTERS_PER_BLOCK` block numbers.
    pub(crate) fn read_indirect(&self, index: BlockPointer) -> Result<IndirectBlock> {
        let block = self.read_block(index as u64)?;
        let mut pointers = [NULL_POINTER; POINTERS_PER_BLOCK];
        for (slot, pointer) in pointers.iter_mut().enumerate() {
            *pointer = read_u32(&block, slot * POINTER_SIZE);
        }
        Ok(pointers)
    }

    pub(crate) fn write_indirect(&mut self, index: BlockPointer, pointers: &IndirectBlock) -> Result<()> {
        let mut block = Vec::with_capacity(BLOCK_SIZE);
        for pointer in pointers {
            block.extend_from_slice(&pointer.to_le_bytes());
        }
        self.write_block(index as u64, &block)
    }

    fn check_range(&self, index: u64, count: u64) -> Result<()> {
        if index + count > self.block_count {
            return Err(Error::Corrupted(format!(
                "block range {}..{} out of range ({} blocks)",
                index,
                index + count,
                self.block_count
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::memory_drive::MemoryDrive;

    #[test]
    fn read_write() {
        let mut io = IO::new(MemoryDrive::new(16));

        let block = vec![42; BLOCK_SIZE];
        io.write_block(0, &block).unwrap();
        assert_eq!(io.read_block(0).unwrap(), block);

        let mut blocks = vec![0x1; BLOCK_SIZE];
        blocks.extend_from_slice(&vec![0x8; BLOCK_SIZE]);
        io.write_blocks(3, &blocks).unwrap();
        assert_eq!(io.read_blocks(3, 2).unwrap(), blocks);
        assert_eq!(io.read_block(4).unwrap(), vec![0x8; BLOCK_SIZE]);
    }

    #[test]
    fn rejects_bad_transfers() {
        let mut io = IO::new(MemoryDrive::new(4));
        assert!(io.write_block(0, &[0; 100]).is_err());
        assert!(io.read_block(4).is_err());
        assert!(io.write_blocks(3, &vec![0; 2 * BLOCK_SIZE]).is_err());
    }

    #[test]
    fn indirect_blocks() {
        let mut io = IO::new(MemoryDrive::new(4));
        let mut pointers = [NULL_POINTER; POINTERS_PER_BLOCK];
        pointers[0] = 7;
        pointers[POINTERS_PER_BLOCK - 1] = 0xdead;
        io.write_indirect(2, &pointers).unwrap();

        assert_eq!(io.read_indirect(2).unwrap(), pointers);
        let raw = io.read_block(2).unwrap();
        assert_eq!(&raw[0..4], &[7, 0, 0, 0]);
    }
}
