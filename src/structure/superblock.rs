use crate::consts::{InodePointer, BITS_PER_BLOCK, BLOCK_SIZE, INODES_PER_BLOCK, MAGIC, ROOT_INODE};
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::util::error::{Error, Result};
use crate::util::serializable::{read_u32, ByteSerializable, KnownSize};

const SUPERBLOCK_INDEX: u64 = 0;
const BLOCKS_PER_INODE: u64 = 4;

#[derive(Debug, PartialEq, Clone)]
pub struct SuperBlock {
    pub magic: u32,
    pub inode_map_blocks: u32,
    pub inode_table_blocks: u32,
    pub block_map_blocks: u32,
    pub total_blocks: u32,
    pub root_inode: InodePointer,
}

impl SuperBlock {
    /// Derives a layout for a device of `total_blocks` blocks: a block map covering every block,
    /// one inode per four blocks (at least one table block) and an inode map covering the table.
    pub fn new(total_blocks: u32) -> SuperBlock {
        let block_map_blocks = (total_blocks as u64).div_ceil(BITS_PER_BLOCK) as u32;
        let inodes = (total_blocks as u64 / BLOCKS_PER_INODE).max(INODES_PER_BLOCK as u64);
        let inode_table_blocks = inodes.div_ceil(INODES_PER_BLOCK as u64) as u32;
        let inode_count = inode_table_blocks as u64 * INODES_PER_BLOCK as u64;
        let inode_map_blocks = inode_count.div_ceil(BITS_PER_BLOCK) as u32;

        SuperBlock {
            magic: MAGIC,
            inode_map_blocks,
            inode_table_blocks,
            block_map_blocks,
            total_blocks,
            root_inode: ROOT_INODE,
        }
    }

    #[inline]
    pub fn inode_map_start(&self) -> u64 {
        SUPERBLOCK_INDEX + 1
    }

    #[inline]
    pub fn block_map_start(&self) -> u64 {
        self.inode_map_start() + self.inode_map_blocks as u64
    }

    #[inline]
    pub fn inode_table_start(&self) -> u64 {
        self.block_map_start() + self.block_map_blocks as u64
    }

    /// First block of the data pool; everything before it is metadata.
    #[inline]
    pub fn data_start(&self) -> u64 {
        self.inode_table_start() + self.inode_table_blocks as u64
    }

    #[inline]
    pub fn inode_count(&self) -> u64 {
        self.inode_table_blocks as u64 * INODES_PER_BLOCK as u64
    }

    pub fn validate(&self, device_blocks: u64) -> Result<()> {
        if self.magic != MAGIC {
            return Err(Error::Corrupted(format!("bad magic {:#x}", self.magic)));
        }
        if self.total_blocks as u64 > device_blocks {
            return Err(Error::Corrupted(format!(
                "superblock declares {} blocks, device has {}",
                self.total_blocks, device_blocks
            )));
        }
        if (self.inode_map_blocks as u64) * BITS_PER_BLOCK < self.inode_count() {
            return Err(Error::Corrupted(format!(
                "{} inode map blocks cannot track {} inodes",
                self.inode_map_blocks,
                self.inode_count()
            )));
        }
        if (self.block_map_blocks as u64) * BITS_PER_BLOCK < self.total_blocks as u64 {
            return Err(Error::Corrupted(format!(
                "{} block map blocks cannot track {} blocks",
                self.block_map_blocks, self.total_blocks
            )));
        }
        if self.data_start() >= self.total_blocks as u64 {
            return Err(Error::Corrupted("metadata regions leave no data blocks".to_string()));
        }
        if self.root_inode != ROOT_INODE {
            return Err(Error::Corrupted(format!("root inode is {}", self.root_inode)));
        }
        Ok(())
    }

    pub fn read<A: DeviceDriver>(io: &IO<A>) -> Result<SuperBlock> {
        let buffer = io.read_block(SUPERBLOCK_INDEX)?;
        let superblock = SuperBlock::from_bytes(&buffer)?;
        superblock.validate(io.block_count)?;
        Ok(superblock)
    }

    pub fn write<A: DeviceDriver>(&self, io: &mut IO<A>) -> Result<()> {
        let mut buffer = self.to_bytes();
        buffer.resize(BLOCK_SIZE, 0);
        io.write_block(SUPERBLOCK_INDEX, &buffer)
    }
}

impl KnownSize for SuperBlock {
    fn size_on_disk() -> usize {
        24
    }
}

impl ByteSerializable for SuperBlock {
    fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(Self::size_on_disk());
        buffer.extend_from_slice(&self.magic.to_le_bytes());
        buffer.extend_from_slice(&self.inode_map_blocks.to_le_bytes());
        buffer.extend_from_slice(&self.inode_table_blocks.to_le_bytes());
        buffer.extend_from_slice(&self.block_map_blocks.to_le_bytes());
        buffer.extend_from_slice(&self.total_blocks.to_le_bytes());
        buffer.extend_from_slice(&self.root_inode.to_le_bytes());
        buffer
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::size_on_disk() {
            return Err(Error::Corrupted("short superblock".to_string()));
        }
        Ok(SuperBlock {
            magic: read_u32(bytes, 0),
            inode_map_blocks: read_u32(bytes, 4),
            inode_table_blocks: read_u32(bytes, 8),
            block_map_blocks: read_u32(bytes, 12),
            total_blocks: read_u32(bytes, 16),
            root_inode: read_u32(bytes, 20),
        })
    }
}
