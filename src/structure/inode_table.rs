use log::{debug, warn};

use crate::consts::{InodePointer, INODES_PER_BLOCK, INODE_SIZE};
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::structure::bitmap::Bitmap;
use crate::structure::inode::Inode;
use crate::structure::superblock::SuperBlock;
use crate::util::error::{Error, Result};
use crate::util::serializable::ByteSerializable;

/// The inode region, fully resident. Inode `n` is `inodes[n]`; allocation state
/// lives in `map`, not in the records.
pub struct InodeTable {
    pub(crate) map: Bitmap,
    table_index: u64,
    inodes: Vec<Inode>,
}

impl InodeTable {
    /// Fresh table: zeroed records, empty map, both written out.
    pub fn create<A: DeviceDriver>(io: &mut IO<A>, superblock: &SuperBlock) -> Result<InodeTable> {
        let mut map = Bitmap::new(
            superblock.inode_map_start(),
            superblock.inode_map_blocks as u64,
            superblock.inode_count(),
        );
        // inode 0 is never handed out
        map.mark_used_mem(0);
        map.write_full(io)?;

        let table_blocks = superblock.inode_table_blocks as usize;
        io.write_blocks(superblock.inode_table_start(), &vec![0u8; table_blocks * INODES_PER_BLOCK * INODE_SIZE])?;

        Ok(InodeTable {
            map,
            table_index: superblock.inode_table_start(),
            inodes: vec![Inode::default(); superblock.inode_count() as usize],
        })
    }

    pub fn read<A: DeviceDriver>(io: &IO<A>, superblock: &SuperBlock) -> Result<InodeTable> {
        let mut map = Bitmap::read(
            io,
            superblock.inode_map_start(),
            superblock.inode_map_blocks as u64,
            superblock.inode_count(),
        )?;
        if map.is_free(0) {
            warn!("inode 0 not marked in the inode map, reserving it");
            map.mark_used_mem(0);
        }

        let region = io.read_blocks(superblock.inode_table_start(), superblock.inode_table_blocks as u64)?;
        let inodes = region
            .chunks_exact(INODE_SIZE)
            .map(Inode::from_bytes)
            .collect::<Result<Vec<_>>>()?;

        Ok(InodeTable { map, table_index: superblock.inode_table_start(), inodes })
    }

    #[inline]
    pub fn inode_count(&self) -> u64 {
        self.inodes.len() as u64
    }

    pub fn get(&self, index: InodePointer) -> Result<&Inode> {
        self.check(index)?;
        Ok(&self.inodes[index as usize])
    }

    pub fn get_mut(&mut self, index: InodePointer) -> Result<&mut Inode> {
        self.check(index)?;
        Ok(&mut self.inodes[index as usize])
    }

    pub fn is_allocated(&self, index: InodePointer) -> bool {
        self.check(index).is_ok() && self.map.is_used(index as u64)
    }

    /// Claims a free inode number, stores `inode` there and flushes both the map and the record.
    pub fn allocate<A: DeviceDriver>(&mut self, io: &mut IO<A>, inode: Inode) -> Result<InodePointer> {
        let index = self.map.find_free().ok_or(Error::NoSpace)?;
        self.map.mark_used(io, index)?;
        let index = index as InodePointer;
        self.inodes[index as usize] = inode;
        self.write_inode(io, index)?;
        debug!("allocated inode {}", index);
        Ok(index)
    }

    pub fn free<A: DeviceDriver>(&mut self, io: &mut IO<A>, index: InodePointer) -> Result<()> {
        self.check(index)?;
        self.inodes[index as usize] = Inode::default();
        self.write_inode(io, index)?;
        self.map.mark_free(io, index as u64)
    }

    /// Flushes the table block holding inode `index`.
    pub fn write_inode<A: DeviceDriver>(&self, io: &mut IO<A>, index: InodePointer) -> Result<()> {
        self.check(index)?;
        let first = index as usize / INODES_PER_BLOCK * INODES_PER_BLOCK;
        let mut block = Vec::with_capacity(INODES_PER_BLOCK * INODE_SIZE);
        for inode in &self.inodes[first..first + INODES_PER_BLOCK] {
            block.extend_from_slice(&inode.to_bytes());
        }
        io.write_block(self.inode_block(index), &block)
    }

    #[inline]
    fn inode_block(&self, index: InodePointer) -> u64 {
        self.table_index + (index as usize / INODES_PER_BLOCK) as u64
    }

    fn check(&self, index: InodePointer) -> Result<()> {
        if index == 0 || index as u64 >= self.inode_count() {
            return Err(Error::OutOfRange(index as u64));
        }
        Ok(())
    }
}
