use log::debug;

use crate::consts::{InodePointer, BLOCK_SIZE, NULL_POINTER};
use crate::driver::DeviceDriver;
use crate::structure::directory::{check_name, DirEntry, DirectoryBlock};
use crate::structure::inode::Inode;
use crate::structure::Structure;
use crate::util::error::{Error, Result};
use crate::util::mode::{ModeBits, IS_DIR_MASK, PERMISSIONS_MASK};
use crate::util::serializable::ByteSerializable;

pub struct Directory {
    pub id: InodePointer,
}

impl Directory {
    pub fn open<A: DeviceDriver>(structure: &Structure<A>, id: InodePointer) -> Result<Directory> {
        if !structure.inode_table.get(id)?.is_dir() {
            return Err(Error::NotADirectory);
        }
        Ok(Directory { id })
    }

    /// Allocates an entry block and an inode for a new, unlinked directory.
    pub fn create<A: DeviceDriver>(
        structure: &mut Structure<A>,
        permissions: ModeBits,
        uid: u32,
        gid: u32,
        now: u32,
    ) -> Result<Directory> {
        if structure.inode_table.map.find_free().is_none() || structure.free_block_count() == 0 {
            return Err(Error::NoSpace);
        }

        let block = structure.allocate_block()?;
        let mut inode = Inode::new(IS_DIR_MASK | (permissions & PERMISSIONS_MASK), uid, gid, now);
        inode.size = BLOCK_SIZE as u32;
        inode.direct[0] = block;
        let id = structure.inode_table.allocate(&mut structure.io, inode)?;
        debug!("created directory inode {} with entry block {}", id, block);
        Ok(Directory { id })
    }

    fn block<A: DeviceDriver>(&self, structure: &Structure<A>) -> Result<DirectoryBlock> {
        let pointer = structure.inode_table.get(self.id)?.direct[0];
        if pointer == NULL_POINTER {
            return Err(Error::Corrupted(format!("directory {} has no entry block", self.id)));
        }
        DirectoryBlock::from_bytes(&structure.read_block(pointer)?)
    }

    fn save<A: DeviceDriver>(&self, structure: &mut Structure<A>, entries: &DirectoryBlock, now: u32) -> Result<()> {
        let pointer = structure.inode_table.get(self.id)?.direct[0];
        structure.write_block(pointer, &entries.to_bytes())?;
        structure.inode_table.get_mut(self.id)?.mtime = now;
        structure.inode_table.write_inode(&mut structure.io, self.id)
    }

    pub fn lookup<A: DeviceDriver>(&self, structure: &Structure<A>, name: &str) -> Result<Option<DirEntry>> {
        Ok(self.block(structure)?.find(name).cloned())
    }

    /// Inode number of the first valid entry called `name`.
    pub fn find_child<A: DeviceDriver>(&self, structure: &Structure<A>, name: &str) -> Result<InodePointer> {
        self.lookup(structure, name)?.map(|entry| entry.inode).ok_or(Error::NotFound)
    }

    pub fn entries<A: DeviceDriver>(&self, structure: &Structure<A>) -> Result<Vec<DirEntry>> {
        Ok(self.block(structure)?.entries().map(|(_, entry)| entry.clone()).collect())
    }

    pub fn is_full<A: DeviceDriver>(&self, structure: &Structure<A>) -> Result<bool> {
        Ok(self.block(structure)?.is_full())
    }

    pub fn is_empty<A: DeviceDriver>(&self, structure: &Structure<A>) -> Result<bool> {
        Ok(self.block(structure)?.is_empty())
    }

    /// Fails unless `name` is valid, unused here, and a slot is free.
    pub fn check_insert<A: DeviceDriver>(&self, structure: &Structure<A>, name: &str) -> Result<()> {
        check_name(name)?;
        let entries = self.block(structure)?;
        if entries.find(name).is_some() {
            return Err(Error::AlreadyExists);
        }
        if entries.is_full() {
            return Err(Error::NoSpace);
        }
        Ok(())
    }

    pub fn add_entry<A: DeviceDriver>(
        &self,
        structure: &mut Structure<A>,
        name: &str,
        inode: InodePointer,
        is_dir: bool,
        now: u32,
    ) -> Result<()> {
        self.check_insert(structure, name)?;
        let mut entries = self.block(structure)?;
        let slot = entries.insert(DirEntry::new(name, inode, is_dir)?)?;
        self.save(structure, &entries, now)?;
        debug!("directory {}: linked {:?} -> inode {} in slot {}", self.id, name, inode, slot);
        Ok(())
    }

    pub fn remove_entry<A: DeviceDriver>(&self, structure: &mut Structure<A>, name: &str, now: u32) -> Result<DirEntry> {
        let mut entries = self.block(structure)?;
        let slot = entries.position(name).ok_or(Error::NotFound)?;
        let entry = entries.remove(slot).ok_or(Error::NotFound)?;
        self.save(structure, &entries, now)?;
        debug!("directory {}: unlinked {:?} from slot {}", self.id, name, slot);
        Ok(entry)
    }

    pub fn rename_entry<A: DeviceDriver>(
        &self,
        structure: &mut Structure<A>,
        from: &str,
        to: &str,
        now: u32,
    ) -> Result<()> {
        check_name(to)?;
        let mut entries = self.block(structure)?;
        let slot = entries.position(from).ok_or(Error::NotFound)?;
        if from == to {
            return Ok(());
        }
        if entries.find(to).is_some() {
            return Err(Error::AlreadyExists);
        }
        if let Some(entry) = entries.slot_mut(slot) {
            entry.name = to.to_string();
        }
        self.save(structure, &entries, now)
    }
}
