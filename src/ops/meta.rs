use std::time::{Duration, SystemTime};

use crate::consts::InodePointer;
use crate::structure::inode::Inode;
use crate::util::mode::{ModeBits, ModeBitsHelper};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InodeType {
    File,
    Directory,
}

pub type UserId = u32;
pub type GroupId = u32;

/// What `getattr` reports for an inode, copied from the record.
#[derive(Debug, Clone, PartialEq)]
pub struct Attributes {
    pub ino: InodePointer,
    pub inode_type: InodeType,
    pub mode: ModeBits,
    pub permissions: u16,
    pub user_id: UserId,
    pub group_id: GroupId,
    pub size: u64,
    pub blocks: u64,
    pub modified_at: SystemTime,
    pub created_at: SystemTime,
}

impl Attributes {
    pub fn from_inode(ino: InodePointer, inode: &Inode) -> Attributes {
        Attributes {
            ino,
            inode_type: if inode.is_dir() { InodeType::Directory } else { InodeType::File },
            mode: inode.mode,
            permissions: inode.mode.get_permissions(),
            user_id: inode.uid as UserId,
            group_id: inode.gid as GroupId,
            size: inode.size as u64,
            blocks: inode.block_count(),
            modified_at: to_system_time(inode.mtime),
            created_at: to_system_time(inode.ctime),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.inode_type == InodeType::Directory
    }
}

/// One directory entry together with the attributes of the inode it names.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub name: String,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statistics {
    pub block_size: u32,
    pub total_blocks: u64,
    pub free_blocks: u64,
    pub total_inodes: u64,
    pub free_inodes: u64,
    pub name_length: u32,
}

/// Seconds since the epoch, as stored in inode timestamps.
pub fn now() -> u32 {
    from_system_time(SystemTime::now())
}

pub fn to_system_time(seconds: u32) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(seconds as u64)
}

/// Saturates instead of wrapping: times before 1970 become 0, after 2106 become `u32::MAX`.
pub fn from_system_time(time: SystemTime) -> u32 {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(since) => u32::try_from(since.as_secs()).unwrap_or(u32::MAX),
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::BLOCK_SIZE;
    use crate::util::mode::IS_FILE_MASK;

    #[test]
    fn attributes_from_inode() {
        let mut inode = Inode::new(IS_FILE_MASK | 0o640, 1000, 100, 50);
        inode.size = BLOCK_SIZE as u32 + 1;
        inode.mtime = 60;

        let attributes = Attributes::from_inode(9, &inode);
        assert_eq!(attributes.ino, 9);
        assert_eq!(attributes.inode_type, InodeType::File);
        assert_eq!(attributes.permissions, 0o640);
        assert_eq!(attributes.blocks, 2);
        assert_eq!(attributes.user_id, 1000);
        assert_eq!(attributes.modified_at, to_system_time(60));
        assert_eq!(attributes.created_at, to_system_time(50));
    }

    #[test]
    fn time_conversion() {
        assert_eq!(from_system_time(to_system_time(1_700_000_000)), 1_700_000_000);
        assert_eq!(from_system_time(SystemTime::UNIX_EPOCH - Duration::from_secs(5)), 0);
        assert!(now() > 0);
    }
}
