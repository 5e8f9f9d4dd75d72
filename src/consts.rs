pub const BLOCK_SIZE: usize = 1024;
pub const POINTER_SIZE: usize = 4;
pub const POINTERS_PER_BLOCK: usize = BLOCK_SIZE / POINTER_SIZE;
pub const DIRECT_POINTERS: usize = 6;
pub const BITS_PER_BLOCK: u64 = (BLOCK_SIZE * 8) as u64;

pub const INODE_SIZE: usize = 64;
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;

pub const DIR_ENTRY_SIZE: usize = 32;
pub const DIR_ENTRIES: usize = BLOCK_SIZE / DIR_ENTRY_SIZE;
pub const FILE_NAME_LENGTH: usize = 27;

pub const MAGIC: u32 = 0x37363030;
pub const ROOT_INODE: InodePointer = 1;

pub type BlockPointer = u32;
pub type InodePointer = u32;
pub type DirectPointers = [BlockPointer; DIRECT_POINTERS];

pub const NULL_POINTER: BlockPointer = 0;
