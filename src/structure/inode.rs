use crate::consts::{BlockPointer, DirectPointers, BLOCK_SIZE, DIRECT_POINTERS, INODE_SIZE, NULL_POINTER};
use crate::util::error::{Error, Result};
use crate::util::mode::{ModeBits, ModeBitsHelper};
use crate::util::serializable::{read_u16, read_u32, ByteSerializable, KnownSize};

const POINTERS_OFFSET: usize = 20;

#[derive(PartialEq, Debug, Clone, Default)]
pub struct Inode {
    pub uid: u16,
    pub gid: u16,
    pub mode: ModeBits,
    pub ctime: u32,
    pub mtime: u32,
    pub size: u32,
    pub direct: DirectPointers,
    pub indirect_1: BlockPointer,
    pub indirect_2: BlockPointer,
}

impl Inode {
    pub fn new(mode: ModeBits, uid: u32, gid: u32, now: u32) -> Inode {
        Inode {
            uid: clamp_id(uid),
            gid: clamp_id(gid),
            mode,
            ctime: now,
            mtime: now,
            size: 0,
            direct: [NULL_POINTER; DIRECT_POINTERS],
            indirect_1: NULL_POINTER,
            indirect_2: NULL_POINTER,
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.mode.is_directory()
    }

    #[inline]
    pub fn is_file(&self) -> bool {
        self.mode.is_file()
    }

    /// Data blocks reachable for the current size.
    #[inline]
    pub fn block_count(&self) -> u64 {
        (self.size as u64).div_ceil(BLOCK_SIZE as u64)
    }
}

fn clamp_id(id: u32) -> u16 {
    u16::try_from(id).unwrap_or(u16::MAX)
}

impl KnownSize for Inode {
    fn size_on_disk() -> usize {
        INODE_SIZE
    }
}

impl ByteSerializable for Inode {
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::<u8>::with_capacity(INODE_SIZE);
        bytes.extend_from_slice(&self.uid.to_le_bytes());
        bytes.extend_from_slice(&self.gid.to_le_bytes());
        bytes.extend_from_slice(&self.mode.to_le_bytes());
        bytes.extend_from_slice(&self.ctime.to_le_bytes());
        bytes.extend_from_slice(&self.mtime.to_le_bytes());
        bytes.extend_from_slice(&self.size.to_le_bytes());
        for pointer in self.direct {
            bytes.extend_from_slice(&pointer.to_le_bytes());
        }
        bytes.extend_from_slice(&self.indirect_1.to_le_bytes());
        bytes.extend_from_slice(&self.indirect_2.to_le_bytes());
        bytes.resize(INODE_SIZE, 0);
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < INODE_SIZE {
            return Err(Error::Corrupted(format!("short inode record of {} bytes", bytes.len())));
        }

        let mut direct = [NULL_POINTER; DIRECT_POINTERS];
        for (i, pointer) in direct.iter_mut().enumerate() {
            *pointer = read_u32(bytes, POINTERS_OFFSET + i * 4);
        }
        let indirect_at = POINTERS_OFFSET + DIRECT_POINTERS * 4;

        Ok(Inode {
            uid: read_u16(bytes, 0),
            gid: read_u16(bytes, 2),
            mode: read_u32(bytes, 4),
            ctime: read_u32(bytes, 8),
            mtime: read_u32(bytes, 12),
            size: read_u32(bytes, 16),
            direct,
            indirect_1: read_u32(bytes, indirect_at),
            indirect_2: read_u32(bytes, indirect_at + 4),
        })
    }
}
