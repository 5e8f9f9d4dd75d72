use log::{debug, info, warn};

use crate::consts::{BlockPointer, BLOCK_SIZE, NULL_POINTER, ROOT_INODE};
use crate::driver::DeviceDriver;
use crate::io::{IndirectBlock, IO};
use crate::structure::bitmap::Bitmap;
use crate::structure::directory::DirectoryBlock;
use crate::structure::inode::Inode;
use crate::structure::inode_table::InodeTable;
use crate::structure::superblock::SuperBlock;
use crate::util::error::{Error, Result};
use crate::util::format::pretty_size_from_blocks;
use crate::util::mode::IS_DIR_MASK;

pub mod bitmap;
pub mod directory;
pub mod inode;
pub mod inode_table;
pub mod superblock;

/// Everything the engine keeps resident: the device, the layout, both bitmaps and the inode table.
pub struct Structure<A: DeviceDriver> {
    pub(crate) io: IO<A>,
    pub(crate) superblock: SuperBlock,
    pub(crate) block_map: Bitmap,
    pub(crate) inode_table: InodeTable,
}

impl<A: DeviceDriver> Structure<A> {
    /// Writes an empty filesystem over the whole device: superblock, bitmaps, inode table and
    /// a root directory with an empty entry block.
    pub fn format(device: A, now: u32) -> Result<Structure<A>> {
        let mut io = IO::new(device);
        let total_blocks = u32::try_from(io.block_count)
            .map_err(|_| Error::InvalidArgument(format!("device of {} blocks is too large", io.block_count)))?;
        let superblock = SuperBlock::new(total_blocks);
        superblock.validate(io.block_count)?;
        superblock.write(&mut io)?;

        let mut block_map = Bitmap::new(
            superblock.block_map_start(),
            superblock.block_map_blocks as u64,
            superblock.total_blocks as u64,
        );
        for block in 0..superblock.data_start() {
            block_map.mark_used_mem(block);
        }
        block_map.write_full(&mut io)?;

        let inode_table = InodeTable::create(&mut io, &superblock)?;
        let mut structure = Structure { io, superblock, block_map, inode_table };

        let root_block = structure.allocate_block()?;
        DirectoryBlock::empty().write(&mut structure.io, root_block)?;
        let mut root = Inode::new(IS_DIR_MASK | 0o755, 0, 0, now);
        root.size = BLOCK_SIZE as u32;
        root.direct[0] = root_block;
        let root_inode = structure.inode_table.allocate(&mut structure.io, root)?;
        if root_inode != ROOT_INODE {
            return Err(Error::Corrupted(format!("root directory landed on inode {}", root_inode)));
        }

        info!(
            "formatted {} blocks ({}): {} inodes, data starts at block {}",
            total_blocks,
            pretty_size_from_blocks(total_blocks as u64),
            structure.superblock.inode_count(),
            structure.superblock.data_start()
        );
        Ok(structure)
    }

    pub fn mount(device: A) -> Result<Structure<A>> {
        let io = IO::new(device);
        let superblock = SuperBlock::read(&io)?;

        let mut block_map = Bitmap::read(
            &io,
            superblock.block_map_start(),
            superblock.block_map_blocks as u64,
            superblock.total_blocks as u64,
        )?;
        for block in 0..superblock.data_start() {
            if block_map.is_free(block) {
                warn!("metadata block {} not marked in the block map, reserving it", block);
                block_map.mark_used_mem(block);
            }
        }

        let inode_table = InodeTable::read(&io, &superblock)?;
        let root = inode_table.get(superblock.root_inode)?;
        if !root.is_dir() || !inode_table.is_allocated(superblock.root_inode) {
            return Err(Error::Corrupted("root inode is not an allocated directory".to_string()));
        }

        info!(
            "mounted {} blocks ({} free), {} inodes ({} free)",
            superblock.total_blocks,
            pretty_size_from_blocks(block_map.count_free()),
            inode_table.inode_count(),
            inode_table.map.count_free()
        );
        Ok(Structure { io, superblock, block_map, inode_table })
    }

    pub fn into_device(self) -> A {
        self.io.into_device()
    }

    /// Claims a data block and zeroes it on disk.
    pub fn allocate_block(&mut self) -> Result<BlockPointer> {
        let block = self.block_map.allocate(&mut self.io)? as BlockPointer;
        self.io.write_block(block as u64, &[0u8; BLOCK_SIZE])?;
        Ok(block)
    }

    pub fn free_block(&mut self, block: BlockPointer) -> Result<()> {
        if (block as u64) < self.superblock.data_start() {
            return Err(Error::Corrupted(format!("refusing to free metadata block {}", block)));
        }
        self.block_map.mark_free(&mut self.io, block as u64)
    }

    pub fn free_block_count(&self) -> u64 {
        self.block_map.count_free()
    }

    /// Pointers stored in inodes and indirect blocks must name a block inside the filesystem.
    fn check_pointer(&self, block: BlockPointer) -> Result<()> {
        if block == NULL_POINTER {
            return Err(Error::Corrupted("dereferenced an unset block pointer".to_string()));
        }
        if block >= self.superblock.total_blocks {
            return Err(Error::Corrupted(format!(
                "block pointer {} beyond the filesystem ({} blocks)",
                block, self.superblock.total_blocks
            )));
        }
        Ok(())
    }

    pub fn read_block(&self, block: BlockPointer) -> Result<Vec<u8>> {
        self.check_pointer(block)?;
        self.io.read_block(block as u64)
    }

    pub fn write_block(&mut self, block: BlockPointer, data: &[u8]) -> Result<()> {
        self.check_pointer(block)?;
        debug!("writing data block {}", block);
        self.io.write_block(block as u64, data)
    }

    pub fn read_indirect(&self, block: BlockPointer) -> Result<IndirectBlock> {
        self.check_pointer(block)?;
        self.io.read_indirect(block)
    }

    pub fn write_indirect(&mut self, block: BlockPointer, pointers: &IndirectBlock) -> Result<()> {
        self.check_pointer(block)?;
        self.io.write_indirect(block, pointers)
    }
}
