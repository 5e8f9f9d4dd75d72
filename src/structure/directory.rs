use crate::consts::{BlockPointer, InodePointer, BLOCK_SIZE, DIR_ENTRIES, DIR_ENTRY_SIZE, FILE_NAME_LENGTH};
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::util::error::{Error, Result};
use crate::util::serializable::{read_u32, ByteSerializable, KnownSize};

const VALID_BIT: u32 = 1 << 0;
const IS_DIR_BIT: u32 = 1 << 1;
const INODE_SHIFT: u32 = 2;
const NAME_OFFSET: usize = 4;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DirEntry {
    pub valid: bool,
    pub is_dir: bool,
    pub inode: InodePointer,
    pub name: String,
}

impl DirEntry {
    pub fn new(name: &str, inode: InodePointer, is_dir: bool) -> Result<DirEntry> {
        check_name(name)?;
        Ok(DirEntry { valid: true, is_dir, inode, name: name.to_string() })
    }
}

/// Rejects names that cannot be stored in a slot.
pub fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0') {
        return Err(Error::InvalidArgument(format!("invalid file name {:?}", name)));
    }
    if name.len() > FILE_NAME_LENGTH {
        return Err(Error::NameTooLong);
    }
    Ok(())
}

impl KnownSize for DirEntry {
    fn size_on_disk() -> usize {
        DIR_ENTRY_SIZE
    }
}

impl ByteSerializable for DirEntry {
    fn to_bytes(&self) -> Vec<u8> {
        let mut header = self.inode << INODE_SHIFT;
        if self.valid {
            header |= VALID_BIT;
        }
        if self.is_dir {
            header |= IS_DIR_BIT;
        }

        let mut bytes = Vec::with_capacity(DIR_ENTRY_SIZE);
        bytes.extend_from_slice(&header.to_le_bytes());
        let name = self.name.as_bytes();
        bytes.extend_from_slice(&name[..name.len().min(FILE_NAME_LENGTH)]);
        bytes.resize(DIR_ENTRY_SIZE, 0);
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < DIR_ENTRY_SIZE {
            return Err(Error::Corrupted("short directory entry".to_string()));
        }
        let header = read_u32(bytes, 0);
        let raw_name = &bytes[NAME_OFFSET..DIR_ENTRY_SIZE];
        let length = raw_name.iter().position(|&c| c == 0).unwrap_or(raw_name.len());

        Ok(DirEntry {
            valid: header & VALID_BIT != 0,
            is_dir: header & IS_DIR_BIT != 0,
            inode: header >> INODE_SHIFT,
            name: String::from_utf8_lossy(&raw_name[..length]).into_owned(),
        })
    }
}

/// The single data block of a directory: exactly `DIR_ENTRIES` slots.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryBlock {
    slots: [DirEntry; DIR_ENTRIES],
}

impl DirectoryBlock {
    pub fn empty() -> DirectoryBlock {
        DirectoryBlock { slots: std::array::from_fn(|_| DirEntry::default()) }
    }

    pub fn read<A: DeviceDriver>(io: &IO<A>, block: BlockPointer) -> Result<DirectoryBlock> {
        DirectoryBlock::from_bytes(&io.read_block(block as u64)?)
    }

    pub fn write<A: DeviceDriver>(&self, io: &mut IO<A>, block: BlockPointer) -> Result<()> {
        io.write_block(block as u64, &self.to_bytes())
    }

    /// Valid entries with their slot numbers, in slot order.
    pub fn entries(&self) -> impl Iterator<Item = (usize, &DirEntry)> {
        self.slots.iter().enumerate().filter(|(_, entry)| entry.valid)
    }

    /// First valid slot named `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries().find(|(_, entry)| entry.name == name).map(|(slot, _)| slot)
    }

    pub fn find(&self, name: &str) -> Option<&DirEntry> {
        self.position(name).map(|slot| &self.slots[slot])
    }

    pub fn slot_mut(&mut self, slot: usize) -> Option<&mut DirEntry> {
        self.slots.get_mut(slot)
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(|entry| entry.valid)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|entry| !entry.valid)
    }

    /// Places `entry` in the lowest invalid slot.
    pub fn insert(&mut self, entry: DirEntry) -> Result<usize> {
        let slot = self.slots.iter().position(|entry| !entry.valid).ok_or(Error::NoSpace)?;
        self.slots[slot] = entry;
        Ok(slot)
    }

    pub fn remove(&mut self, slot: usize) -> Option<DirEntry> {
        let entry = self.slots.get_mut(slot)?;
        if !entry.valid {
            return None;
        }
        Some(std::mem::take(entry))
    }
}

impl ByteSerializable for DirectoryBlock {
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(BLOCK_SIZE);
        for entry in &self.slots {
            bytes.extend_from_slice(&entry.to_bytes());
        }
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut block = DirectoryBlock::empty();
        for (slot, chunk) in block.slots.iter_mut().zip(bytes.chunks_exact(DIR_ENTRY_SIZE)) {
            *slot = DirEntry::from_bytes(chunk)?;
        }
        Ok(block)
    }
}
