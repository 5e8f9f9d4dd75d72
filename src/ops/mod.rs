use log::{debug, info};

use crate::consts::{InodePointer, BLOCK_SIZE, FILE_NAME_LENGTH, ROOT_INODE};
use crate::driver::DeviceDriver;
use crate::ops::directory::Directory;
use crate::ops::file::{release_blocks, File};
use crate::ops::meta::{now, Attributes, GroupId, Listing, Statistics, UserId};
use crate::structure::inode::Inode;
use crate::structure::superblock::SuperBlock;
use crate::structure::Structure;
use crate::util::error::{Error, Result};
use crate::util::mode::{ModeBits, ModeBitsHelper, IS_FILE_MASK, PERMISSIONS_MASK};

pub mod directory;
pub mod file;
pub mod meta;
pub mod path;

/// A mounted filesystem. Owns the device and all resident state; every operation goes through it.
///
/// Path-based methods (`getattr`, `create_file`, `read`, ...) resolve their path from the root
/// first. The inode-based methods underneath them are what the FUSE adapter calls, since the
/// kernel already hands it parent inodes and names.
pub struct BlockFS<A: DeviceDriver> {
    pub(crate) structure: Structure<A>,
}

impl<A: DeviceDriver> BlockFS<A> {
    pub fn format(device: A, now: u32) -> Result<BlockFS<A>> {
        Ok(BlockFS { structure: Structure::format(device, now)? })
    }

    pub fn mount(device: A) -> Result<BlockFS<A>> {
        Ok(BlockFS { structure: Structure::mount(device)? })
    }

    pub fn into_device(self) -> A {
        self.structure.into_device()
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.structure.superblock
    }

    // Path-based operations

    pub fn resolve(&self, path: &str) -> Result<InodePointer> {
        path::resolve(&self.structure, path)
    }

    fn parent_of<'p>(&self, path: &'p str) -> Result<(InodePointer, &'p str)> {
        let (parent, name) = path::split_parent(path)?;
        Ok((self.resolve(&parent)?, name))
    }

    pub fn getattr(&self, path: &str) -> Result<Attributes> {
        self.attributes(self.resolve(path)?)
    }

    pub fn readdir(&self, path: &str) -> Result<Vec<Listing>> {
        self.list(self.resolve(path)?)
    }

    /// Creates an empty regular file and links it into its parent directory.
    pub fn create_file(&mut self, path: &str, mode: ModeBits, uid: UserId, gid: GroupId) -> Result<InodePointer> {
        if !mode.is_file() {
            return Err(Error::InvalidArgument(format!("mode {:o} is not a regular file", mode)));
        }
        let (parent, name) = self.parent_of(path)?;
        Ok(self.create(parent, name, mode, uid, gid)?.ino)
    }

    pub fn mkdir(&mut self, path: &str, mode: ModeBits, uid: UserId, gid: GroupId) -> Result<InodePointer> {
        let (parent, name) = self.parent_of(path)?;
        Ok(self.make_directory(parent, name, mode, uid, gid)?.ino)
    }

    pub fn read(&self, path: &str, offset: u64, length: usize) -> Result<Vec<u8>> {
        self.read_file(self.resolve(path)?, offset, length)
    }

    pub fn write(&mut self, path: &str, offset: u64, data: &[u8]) -> Result<usize> {
        let ino = self.resolve(path)?;
        self.write_file(ino, offset, data)
    }

    pub fn truncate(&mut self, path: &str, length: u64) -> Result<()> {
        let ino = self.resolve(path)?;
        self.truncate_file(ino, length)
    }

    pub fn unlink(&mut self, path: &str) -> Result<()> {
        let (parent, name) = self.parent_of(path)?;
        self.remove_file(parent, name)
    }

    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        let (parent, name) = self.parent_of(path)?;
        self.remove_directory(parent, name)
    }

    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let (parent, name) = self.parent_of(from)?;
        let (new_parent, new_name) = self.parent_of(to)?;
        self.rename_entry(parent, name, new_parent, new_name)
    }

    pub fn chmod(&mut self, path: &str, mode: ModeBits) -> Result<Attributes> {
        let ino = self.resolve(path)?;
        self.set_mode(ino, mode)
    }

    pub fn utime(&mut self, path: &str, mtime: u32) -> Result<Attributes> {
        let ino = self.resolve(path)?;
        self.set_mtime(ino, mtime)
    }

    pub fn statfs(&self) -> Statistics {
        let table = &self.structure.inode_table;
        Statistics {
            block_size: BLOCK_SIZE as u32,
            total_blocks: self.structure.superblock.total_blocks as u64,
            free_blocks: self.structure.free_block_count(),
            total_inodes: table.inode_count(),
            free_inodes: table.map.count_free(),
            name_length: FILE_NAME_LENGTH as u32,
        }
    }

    // Inode-based operations

    pub fn attributes(&self, ino: InodePointer) -> Result<Attributes> {
        if !self.structure.inode_table.is_allocated(ino) {
            return Err(Error::NotFound);
        }
        Ok(Attributes::from_inode(ino, self.structure.inode_table.get(ino)?))
    }

    pub fn lookup(&self, parent: InodePointer, name: &str) -> Result<Attributes> {
        let ino = Directory::open(&self.structure, parent)?.find_child(&self.structure, name)?;
        self.attributes(ino)
    }

    pub fn list(&self, ino: InodePointer) -> Result<Vec<Listing>> {
        let entries = Directory::open(&self.structure, ino)?.entries(&self.structure)?;
        entries
            .into_iter()
            .map(|entry| {
                let inode = self.structure.inode_table.get(entry.inode)?;
                Ok(Listing { name: entry.name, attributes: Attributes::from_inode(entry.inode, inode) })
            })
            .collect()
    }

    pub fn create(
        &mut self,
        parent: InodePointer,
        name: &str,
        mode: ModeBits,
        uid: UserId,
        gid: GroupId,
    ) -> Result<Attributes> {
        if !mode.is_file() {
            return Err(Error::InvalidArgument(format!("mode {:o} is not a regular file", mode)));
        }
        let directory = Directory::open(&self.structure, parent)?;
        directory.check_insert(&self.structure, name)?;

        let now = now();
        let inode = Inode::new(IS_FILE_MASK | (mode & PERMISSIONS_MASK), uid, gid, now);
        let ino = self.structure.inode_table.allocate(&mut self.structure.io, inode)?;
        directory.add_entry(&mut self.structure, name, ino, false, now)?;
        info!("created file {:?} as inode {} in directory {}", name, ino, parent);
        self.attributes(ino)
    }

    pub fn make_directory(
        &mut self,
        parent: InodePointer,
        name: &str,
        mode: ModeBits,
        uid: UserId,
        gid: GroupId,
    ) -> Result<Attributes> {
        let directory = Directory::open(&self.structure, parent)?;
        directory.check_insert(&self.structure, name)?;

        let now = now();
        let child = Directory::create(&mut self.structure, mode, uid, gid, now)?;
        directory.add_entry(&mut self.structure, name, child.id, true, now)?;
        info!("created directory {:?} as inode {} in directory {}", name, child.id, parent);
        self.attributes(child.id)
    }

    pub fn read_file(&self, ino: InodePointer, offset: u64, length: usize) -> Result<Vec<u8>> {
        File::open(&self.structure, ino)?.read(&self.structure, offset, length)
    }

    pub fn write_file(&mut self, ino: InodePointer, offset: u64, data: &[u8]) -> Result<usize> {
        File::open(&self.structure, ino)?.write(&mut self.structure, offset, data, now())
    }

    /// Only truncation to zero is supported.
    pub fn truncate_file(&mut self, ino: InodePointer, length: u64) -> Result<()> {
        let file = File::open(&self.structure, ino)?;
        if length > 0 {
            return Err(Error::Unsupported("truncate to a non-zero length"));
        }
        file.truncate(&mut self.structure, now())
    }

    pub fn remove_file(&mut self, parent: InodePointer, name: &str) -> Result<()> {
        let directory = Directory::open(&self.structure, parent)?;
        let entry = directory.lookup(&self.structure, name)?.ok_or(Error::NotFound)?;
        if self.structure.inode_table.get(entry.inode)?.is_dir() {
            return Err(Error::IsADirectory);
        }

        release_blocks(&mut self.structure, entry.inode)?;
        self.structure.inode_table.free(&mut self.structure.io, entry.inode)?;
        directory.remove_entry(&mut self.structure, name, now())?;
        info!("removed file {:?} (inode {})", name, entry.inode);
        Ok(())
    }

    pub fn remove_directory(&mut self, parent: InodePointer, name: &str) -> Result<()> {
        let directory = Directory::open(&self.structure, parent)?;
        let entry = directory.lookup(&self.structure, name)?.ok_or(Error::NotFound)?;
        if entry.inode == ROOT_INODE {
            return Err(Error::InvalidArgument("cannot remove the root directory".to_string()));
        }
        let child = Directory::open(&self.structure, entry.inode)?;
        if !child.is_empty(&self.structure)? {
            return Err(Error::DirectoryNotEmpty);
        }

        release_blocks(&mut self.structure, child.id)?;
        self.structure.inode_table.free(&mut self.structure.io, child.id)?;
        directory.remove_entry(&mut self.structure, name, now())?;
        info!("removed directory {:?} (inode {})", name, child.id);
        Ok(())
    }

    /// Renames an entry within one directory; moving between directories is rejected.
    pub fn rename_entry(
        &mut self,
        parent: InodePointer,
        name: &str,
        new_parent: InodePointer,
        new_name: &str,
    ) -> Result<()> {
        if parent != new_parent {
            return Err(Error::InvalidArgument("rename across directories".to_string()));
        }
        Directory::open(&self.structure, parent)?.rename_entry(&mut self.structure, name, new_name, now())?;
        debug!("directory {}: renamed {:?} to {:?}", parent, name, new_name);
        Ok(())
    }

    /// Replaces the permission bits; the file type is kept.
    pub fn set_mode(&mut self, ino: InodePointer, mode: ModeBits) -> Result<Attributes> {
        self.attributes(ino)?;
        let inode = self.structure.inode_table.get_mut(ino)?;
        inode.mode = inode.mode.with_permissions(mode);
        self.structure.inode_table.write_inode(&mut self.structure.io, ino)?;
        self.attributes(ino)
    }

    pub fn set_mtime(&mut self, ino: InodePointer, mtime: u32) -> Result<Attributes> {
        self.attributes(ino)?;
        self.structure.inode_table.get_mut(ino)?.mtime = mtime;
        self.structure.inode_table.write_inode(&mut self.structure.io, ino)?;
        self.attributes(ino)
    }
}
