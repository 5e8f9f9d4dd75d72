use log::debug;

use crate::consts::{BITS_PER_BLOCK, BLOCK_SIZE};
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::util::error::{Error, Result};

/// Allocation bitmap over one on-disk region. Bit `i` is bit `i % 8` of byte `i / 8`,
/// `1` means allocated. The in-memory copy is authoritative and every change is
/// flushed to the block holding the changed bit.
pub struct Bitmap {
    pub(crate) first_block: u64,
    pub(crate) block_count: u64,
    limit: u64,
    data: Vec<u8>,
}

impl Bitmap {
    /// Empty bitmap of `block_count` blocks at `first_block`. Only the first `entries`
    /// bits are handed out, and never more than the region can hold.
    pub fn new(first_block: u64, block_count: u64, entries: u64) -> Bitmap {
        let data = vec![0u8; block_count as usize * BLOCK_SIZE];
        let limit = Self::bound(block_count, entries);
        Bitmap { first_block, block_count, limit, data }
    }

    pub fn read<A: DeviceDriver>(io: &IO<A>, first_block: u64, block_count: u64, entries: u64) -> Result<Bitmap> {
        let data = io.read_blocks(first_block, block_count)?;
        let limit = Self::bound(block_count, entries);
        Ok(Bitmap { first_block, block_count, limit, data })
    }

    fn bound(block_count: u64, entries: u64) -> u64 {
        (block_count * BITS_PER_BLOCK).min(entries)
    }

    /// Number of bits the allocator scans.
    #[inline]
    pub fn capacity(&self) -> u64 {
        self.limit
    }

    pub fn write_part<A: DeviceDriver>(&self, io: &mut IO<A>, including_index: u64) -> Result<()> {
        let block = (including_index / BITS_PER_BLOCK) as usize;
        let data = &self.data[block * BLOCK_SIZE..(block + 1) * BLOCK_SIZE];
        io.write_block(self.first_block + block as u64, data)
    }

    pub fn write_full<A: DeviceDriver>(&self, io: &mut IO<A>) -> Result<()> {
        io.write_blocks(self.first_block, &self.data)
    }

    /// Lowest clear bit below the capacity.
    pub fn find_free(&self) -> Option<u64> {
        (0..self.limit).find(|&index| self.is_free(index))
    }

    /// Claims the lowest clear bit and flushes it.
    pub fn allocate<A: DeviceDriver>(&mut self, io: &mut IO<A>) -> Result<u64> {
        let index = self.find_free().ok_or(Error::NoSpace)?;
        self.mark_used(io, index)?;
        debug!("bitmap@{}: allocated bit {}", self.first_block, index);
        Ok(index)
    }

    pub fn is_free(&self, index: u64) -> bool {
        self.data[(index / 8) as usize] & (1 << (index % 8)) == 0
    }

    pub fn is_used(&self, index: u64) -> bool {
        !self.is_free(index)
    }

    pub fn count_free(&self) -> u64 {
        (0..self.limit).filter(|&index| self.is_free(index)).count() as u64
    }

    pub(crate) fn mark_used_mem(&mut self, index: u64) {
        let byte_index = (index / 8) as usize;
        let bit_index = (index % 8) as usize;
        self.data[byte_index] |= 1 << bit_index;
    }

    pub(crate) fn mark_used<A: DeviceDriver>(&mut self, io: &mut IO<A>, index: u64) -> Result<()> {
        self.check(index)?;
        self.mark_used_mem(index);
        self.write_part(io, index)
    }

    fn mark_free_mem(&mut self, index: u64) {
        let byte_index = (index / 8) as usize;
        let bit_index = (index % 8) as usize;
        self.data[byte_index] &= !(1 << bit_index);
    }

    pub(crate) fn mark_free<A: DeviceDriver>(&mut self, io: &mut IO<A>, index: u64) -> Result<()> {
        self.check(index)?;
        self.mark_free_mem(index);
        debug!("bitmap@{}: freed bit {}", self.first_block, index);
        self.write_part(io, index)
    }

    fn check(&self, index: u64) -> Result<()> {
        if index >= self.limit {
            return Err(Error::Corrupted(format!(
                "bit {} outside bitmap of {} entries",
                index, self.limit
            )));
        }
        Ok(())
    }
}
