//! Logical byte offsets to physical blocks.
//!
//! A file is addressed through three consecutive ranges: the six direct pointers, one
//! single-indirect block and one double-indirect block. Every range is a run of pointer slots
//! where each slot roots a subtree of a known depth (0 = data block), so reads, writes and
//! block collection all walk the same slot loop and split requests at range boundaries.

use log::debug;

use crate::consts::{BlockPointer, InodePointer, BLOCK_SIZE, DIRECT_POINTERS, NULL_POINTER, POINTERS_PER_BLOCK};
use crate::driver::DeviceDriver;
use crate::structure::inode::Inode;
use crate::structure::Structure;
use crate::util::error::{Error, Result};

const B: u64 = BLOCK_SIZE as u64;
const P: u64 = POINTERS_PER_BLOCK as u64;

pub const MAX_FILE_SIZE: u64 = (DIRECT_POINTERS as u64 + P + P * P) * B;

#[derive(Debug, Clone, Copy, PartialEq)]
enum AddressRange {
    Direct,
    SingleIndirect,
    DoubleIndirect,
}

impl AddressRange {
    const ALL: [AddressRange; 3] = [AddressRange::Direct, AddressRange::SingleIndirect, AddressRange::DoubleIndirect];

    /// Depth of the subtree behind each slot of this range.
    fn depth(self) -> u32 {
        match self {
            AddressRange::Direct => 0,
            AddressRange::SingleIndirect => 1,
            AddressRange::DoubleIndirect => 2,
        }
    }

    fn start(self) -> u64 {
        match self {
            AddressRange::Direct => 0,
            AddressRange::SingleIndirect => DIRECT_POINTERS as u64 * B,
            AddressRange::DoubleIndirect => (DIRECT_POINTERS as u64 + P) * B,
        }
    }

    fn end(self) -> u64 {
        match self {
            AddressRange::Direct => AddressRange::SingleIndirect.start(),
            AddressRange::SingleIndirect => AddressRange::DoubleIndirect.start(),
            AddressRange::DoubleIndirect => MAX_FILE_SIZE,
        }
    }

    fn pointers(self, inode: &Inode) -> &[BlockPointer] {
        match self {
            AddressRange::Direct => &inode.direct,
            AddressRange::SingleIndirect => std::slice::from_ref(&inode.indirect_1),
            AddressRange::DoubleIndirect => std::slice::from_ref(&inode.indirect_2),
        }
    }

    fn pointers_mut(self, inode: &mut Inode) -> &mut [BlockPointer] {
        match self {
            AddressRange::Direct => &mut inode.direct,
            AddressRange::SingleIndirect => std::slice::from_mut(&mut inode.indirect_1),
            AddressRange::DoubleIndirect => std::slice::from_mut(&mut inode.indirect_2),
        }
    }
}

/// Bytes covered by a pointer `depth` levels above the data.
#[inline]
fn subtree_span(depth: u32) -> u64 {
    B * P.pow(depth)
}

/// Data plus indirect blocks needed to hold `data_blocks` blocks of content.
pub fn blocks_for(data_blocks: u64) -> u64 {
    let mut total = data_blocks;
    let mut rest = data_blocks.saturating_sub(DIRECT_POINTERS as u64);
    if rest > 0 {
        total += 1;
    }
    rest = rest.saturating_sub(P);
    if rest > 0 {
        total += 1 + rest.div_ceil(P);
    }
    total
}

/// Splits `length` bytes at `offset` across the address ranges, in order.
/// Yields `(range, offset within range, position in buffer, chunk length)`.
fn split(offset: u64, length: usize) -> Vec<(AddressRange, u64, usize, usize)> {
    let mut pieces = Vec::new();
    let mut offset = offset;
    let mut position = 0;
    for range in AddressRange::ALL {
        if position == length {
            break;
        }
        if offset >= range.end() {
            continue;
        }
        let chunk = ((range.end() - offset) as usize).min(length - position);
        pieces.push((range, offset - range.start(), position, chunk));
        position += chunk;
        offset += chunk as u64;
    }
    pieces
}

pub struct File {
    pub id: InodePointer,
}

impl File {
    pub fn open<A: DeviceDriver>(structure: &Structure<A>, id: InodePointer) -> Result<File> {
        let inode = structure.inode_table.get(id)?;
        if inode.is_dir() {
            return Err(Error::IsADirectory);
        }
        if !inode.is_file() {
            return Err(Error::InvalidArgument(format!("inode {} is not a regular file", id)));
        }
        Ok(File { id })
    }

    /// Returns `min(length, size - offset)` bytes; nothing at or past the end of the file.
    pub fn read<A: DeviceDriver>(&self, structure: &Structure<A>, offset: u64, length: usize) -> Result<Vec<u8>> {
        read_inode(structure, structure.inode_table.get(self.id)?, offset, length)
    }

    /// Writes `data` at `offset`, growing the file when it runs past the end. `offset` may not
    /// exceed the current size. Space for the growth is checked before anything is allocated.
    pub fn write<A: DeviceDriver>(
        &self,
        structure: &mut Structure<A>,
        offset: u64,
        data: &[u8],
        now: u32,
    ) -> Result<usize> {
        let mut inode = structure.inode_table.get(self.id)?.clone();
        if offset > inode.size as u64 {
            return Err(Error::InvalidArgument(format!(
                "write at {} past end of file ({} bytes)",
                offset, inode.size
            )));
        }
        if data.is_empty() {
            return Ok(0);
        }
        let end = offset + data.len() as u64;
        if end > MAX_FILE_SIZE {
            return Err(Error::FileTooLarge);
        }

        let needed = blocks_for(end.div_ceil(B)).saturating_sub(blocks_for(inode.block_count()));
        if needed > structure.free_block_count() {
            return Err(Error::NoSpace);
        }

        for (range, local, position, chunk) in split(offset, data.len()) {
            let depth = range.depth();
            write_slots(structure, range.pointers_mut(&mut inode), depth, local, &data[position..position + chunk])?;
        }

        inode.size = inode.size.max(end as u32);
        inode.mtime = now;
        *structure.inode_table.get_mut(self.id)? = inode;
        structure.inode_table.write_inode(&mut structure.io, self.id)?;
        debug!("inode {}: wrote {} bytes at {}", self.id, data.len(), offset);
        Ok(data.len())
    }

    /// Drops all content: frees every data and indirect block and resets the pointers.
    pub fn truncate<A: DeviceDriver>(&self, structure: &mut Structure<A>, now: u32) -> Result<()> {
        release_blocks(structure, self.id)?;
        let inode = structure.inode_table.get_mut(self.id)?;
        inode.mtime = now;
        structure.inode_table.write_inode(&mut structure.io, self.id)
    }
}

pub(crate) fn read_inode<A: DeviceDriver>(
    structure: &Structure<A>,
    inode: &Inode,
    offset: u64,
    length: usize,
) -> Result<Vec<u8>> {
    let size = inode.size as u64;
    if offset >= size {
        return Ok(Vec::new());
    }
    let length = (length as u64).min(size - offset) as usize;
    let mut buffer = vec![0u8; length];

    for (range, local, position, chunk) in split(offset, length) {
        read_slots(structure, range.pointers(inode), range.depth(), local, &mut buffer[position..position + chunk])?;
    }
    Ok(buffer)
}

fn read_slots<A: DeviceDriver>(
    structure: &Structure<A>,
    pointers: &[BlockPointer],
    depth: u32,
    offset: u64,
    target: &mut [u8],
) -> Result<()> {
    let unit = subtree_span(depth);
    let mut slot = (offset / unit) as usize;
    let mut in_offset = offset % unit;
    let mut position = 0;

    while position < target.len() && slot < pointers.len() {
        let chunk = ((unit - in_offset) as usize).min(target.len() - position);
        read_tree(structure, pointers[slot], depth, in_offset, &mut target[position..position + chunk])?;
        position += chunk;
        slot += 1;
        in_offset = 0;
    }
    Ok(())
}

fn read_tree<A: DeviceDriver>(
    structure: &Structure<A>,
    pointer: BlockPointer,
    depth: u32,
    offset: u64,
    target: &mut [u8],
) -> Result<()> {
    if depth == 0 {
        let block = structure.read_block(pointer)?;
        let start = offset as usize;
        target.copy_from_slice(&block[start..start + target.len()]);
        return Ok(());
    }
    let pointers = structure.read_indirect(pointer)?;
    read_slots(structure, &pointers, depth - 1, offset, target)
}

/// Returns whether any slot in `pointers` was filled in.
fn write_slots<A: DeviceDriver>(
    structure: &mut Structure<A>,
    pointers: &mut [BlockPointer],
    depth: u32,
    offset: u64,
    data: &[u8],
) -> Result<bool> {
    let unit = subtree_span(depth);
    let mut slot = (offset / unit) as usize;
    let mut in_offset = offset % unit;
    let mut position = 0;
    let mut changed = false;

    while position < data.len() && slot < pointers.len() {
        let chunk = ((unit - in_offset) as usize).min(data.len() - position);
        if pointers[slot] == NULL_POINTER {
            pointers[slot] = structure.allocate_block()?;
            changed = true;
        }
        write_tree(structure, pointers[slot], depth, in_offset, &data[position..position + chunk])?;
        position += chunk;
        slot += 1;
        in_offset = 0;
    }
    Ok(changed)
}

fn write_tree<A: DeviceDriver>(
    structure: &mut Structure<A>,
    pointer: BlockPointer,
    depth: u32,
    offset: u64,
    data: &[u8],
) -> Result<()> {
    if depth == 0 {
        let mut block = if data.len() == BLOCK_SIZE {
            vec![0u8; BLOCK_SIZE]
        } else {
            structure.read_block(pointer)?
        };
        let start = offset as usize;
        block[start..start + data.len()].copy_from_slice(data);
        return structure.write_block(pointer, &block);
    }
    let mut pointers = structure.read_indirect(pointer)?;
    if write_slots(structure, &mut pointers, depth - 1, offset, data)? {
        structure.write_indirect(pointer, &pointers)?;
    }
    Ok(())
}

/// Every block reachable from `inode` for its size: data blocks and the indirect blocks above them.
pub fn collect_blocks<A: DeviceDriver>(structure: &Structure<A>, inode: &Inode) -> Result<Vec<BlockPointer>> {
    let mut remaining = inode.block_count();
    let mut blocks = Vec::with_capacity(blocks_for(remaining) as usize);
    for range in AddressRange::ALL {
        if remaining == 0 {
            break;
        }
        collect_slots(structure, range.pointers(inode), range.depth(), &mut remaining, &mut blocks)?;
    }
    Ok(blocks)
}

fn collect_slots<A: DeviceDriver>(
    structure: &Structure<A>,
    pointers: &[BlockPointer],
    depth: u32,
    remaining: &mut u64,
    blocks: &mut Vec<BlockPointer>,
) -> Result<()> {
    for &pointer in pointers {
        if *remaining == 0 {
            break;
        }
        if pointer == NULL_POINTER {
            return Err(Error::Corrupted("unset pointer inside file size".to_string()));
        }
        blocks.push(pointer);
        if depth == 0 {
            *remaining -= 1;
        } else {
            let children = structure.read_indirect(pointer)?;
            collect_slots(structure, &children, depth - 1, remaining, blocks)?;
        }
    }
    Ok(())
}

/// Frees everything `collect_blocks` finds and leaves the inode empty (size 0, no pointers).
pub(crate) fn release_blocks<A: DeviceDriver>(structure: &mut Structure<A>, id: InodePointer) -> Result<()> {
    let blocks = collect_blocks(structure, structure.inode_table.get(id)?)?;
    for &block in &blocks {
        structure.free_block(block)?;
    }

    let inode = structure.inode_table.get_mut(id)?;
    inode.size = 0;
    inode.direct = [NULL_POINTER; DIRECT_POINTERS];
    inode.indirect_1 = NULL_POINTER;
    inode.indirect_2 = NULL_POINTER;
    structure.inode_table.write_inode(&mut structure.io, id)?;
    debug!("inode {}: released {} blocks", id, blocks.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::memory_drive::MemoryDrive;
    use crate::util::mode::{IS_DIR_MASK, IS_FILE_MASK};

    fn setup(blocks: u64) -> (Structure<MemoryDrive>, File) {
        let mut structure = Structure::format(MemoryDrive::new(blocks), 0).unwrap();
        let inode = Inode::new(IS_FILE_MASK | 0o644, 0, 0, 0);
        let id = structure.inode_table.allocate(&mut structure.io, inode).unwrap();
        (structure, File { id })
    }

    fn pattern(length: usize) -> Vec<u8> {
        (0..length).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn split_at_range_boundaries() {
        let direct_end = 6 * B;
        assert_eq!(split(0, 11), vec![(AddressRange::Direct, 0, 0, 11)]);
        assert_eq!(
            split(direct_end - 10, 20),
            vec![(AddressRange::Direct, direct_end - 10, 0, 10), (AddressRange::SingleIndirect, 0, 10, 10)]
        );

        let single_end = AddressRange::DoubleIndirect.start();
        assert_eq!(
            split(direct_end - 1, (P * B) as usize + 2),
            vec![
                (AddressRange::Direct, direct_end - 1, 0, 1),
                (AddressRange::SingleIndirect, 0, 1, (P * B) as usize),
                (AddressRange::DoubleIndirect, 0, (P * B) as usize + 1, 1),
            ]
        );
        assert_eq!(split(single_end + 5, 3), vec![(AddressRange::DoubleIndirect, 5, 0, 3)]);
    }

    #[test]
    fn block_accounting() {
        assert_eq!(blocks_for(0), 0);
        assert_eq!(blocks_for(6), 6);
        assert_eq!(blocks_for(7), 8);
        assert_eq!(blocks_for(6 + P), 6 + P + 1);
        assert_eq!(blocks_for(6 + P + 1), 6 + P + 1 + 3);
        assert_eq!(blocks_for(6 + 2 * P + 1), 6 + 2 * P + 1 + 4);
    }

    #[test]
    fn small_file() {
        let (mut structure, file) = setup(256);
        assert_eq!(file.write(&mut structure, 0, b"hello world", 7).unwrap(), 11);

        let inode = structure.inode_table.get(file.id).unwrap();
        assert_eq!(inode.size, 11);
        assert_eq!(inode.mtime, 7);
        assert_ne!(inode.direct[0], NULL_POINTER);
        assert_eq!(inode.direct[1], NULL_POINTER);

        assert_eq!(file.read(&structure, 0, 11).unwrap(), b"hello world");
        assert_eq!(file.read(&structure, 6, 100).unwrap(), b"world");
        assert!(file.read(&structure, 11, 5).unwrap().is_empty());
        assert!(file.read(&structure, 20, 5).unwrap().is_empty());
    }

    #[test]
    fn read_across_direct_boundary() {
        let (mut structure, file) = setup(256);
        let data = pattern(6 * BLOCK_SIZE);
        file.write(&mut structure, 0, &data, 0).unwrap();
        let tail = pattern(BLOCK_SIZE).iter().map(|b| b ^ 0xff).collect::<Vec<_>>();
        file.write(&mut structure, data.len() as u64, &tail, 0).unwrap();

        let inode = structure.inode_table.get(file.id).unwrap().clone();
        assert_ne!(inode.indirect_1, NULL_POINTER);
        assert_eq!(inode.indirect_2, NULL_POINTER);

        let read = file.read(&structure, 6 * B - 10, 20).unwrap();
        assert_eq!(read.len(), 20);
        assert_eq!(&read[..10], &data[data.len() - 10..]);
        assert_eq!(&read[10..], &tail[..10]);

        let first_indirect = structure.read_indirect(inode.indirect_1).unwrap()[0];
        assert_eq!(&structure.read_block(first_indirect).unwrap()[..10], &tail[..10]);
    }

    #[test]
    fn read_stops_at_size_on_boundary() {
        let (mut structure, file) = setup(256);
        let data = pattern(6 * BLOCK_SIZE);
        file.write(&mut structure, 0, &data, 0).unwrap();

        let read = file.read(&structure, 6 * B - 10, 20).unwrap();
        assert_eq!(read, &data[data.len() - 10..]);
        assert_eq!(structure.inode_table.get(file.id).unwrap().indirect_1, NULL_POINTER);
    }

    #[test]
    fn double_indirect() {
        let (mut structure, file) = setup(1024);
        let length = ((6 + P) * B) as usize + 3 * BLOCK_SIZE + 100;
        let data = pattern(length);
        let free = structure.free_block_count();

        // grow in uneven pieces so writes straddle blocks and ranges
        let mut offset = 0;
        for piece in data.chunks(3000) {
            file.write(&mut structure, offset as u64, piece, 0).unwrap();
            offset += piece.len();
        }

        let inode = structure.inode_table.get(file.id).unwrap().clone();
        assert_eq!(inode.size as usize, length);
        assert_ne!(inode.indirect_2, NULL_POINTER);
        let data_blocks = inode.block_count();
        assert_eq!(free - structure.free_block_count(), blocks_for(data_blocks));
        assert_eq!(collect_blocks(&structure, &inode).unwrap().len() as u64, blocks_for(data_blocks));

        assert_eq!(file.read(&structure, 0, length).unwrap(), data);
        let start = AddressRange::DoubleIndirect.start() - 50;
        assert_eq!(file.read(&structure, start, 4000).unwrap(), &data[start as usize..start as usize + 4000]);
        assert_eq!(file.read(&structure, length as u64 - 5, 50).unwrap(), &data[length - 5..]);
    }

    #[test]
    fn overwrite_in_place() {
        let (mut structure, file) = setup(256);
        file.write(&mut structure, 0, &pattern(3000), 0).unwrap();
        let free = structure.free_block_count();

        file.write(&mut structure, 1000, b"XYZ", 0).unwrap();
        assert_eq!(structure.free_block_count(), free);
        assert_eq!(structure.inode_table.get(file.id).unwrap().size, 3000);
        assert_eq!(file.read(&structure, 999, 5).unwrap(), vec![pattern(3000)[999], b'X', b'Y', b'Z', pattern(3000)[1003]]);
    }

    #[test]
    fn write_rejects_holes_and_oversize() {
        let (mut structure, file) = setup(256);
        file.write(&mut structure, 0, b"abc", 0).unwrap();
        assert!(matches!(file.write(&mut structure, 4, b"x", 0), Err(Error::InvalidArgument(_))));
        assert_eq!(file.write(&mut structure, 3, b"", 0).unwrap(), 0);

        // pretend the file is already at the limit; the check happens before any pointer is touched
        structure.inode_table.get_mut(file.id).unwrap().size = MAX_FILE_SIZE as u32 - 1;
        assert!(matches!(
            file.write(&mut structure, MAX_FILE_SIZE - 1, b"xy", 0),
            Err(Error::FileTooLarge)
        ));
    }

    #[test]
    fn write_fails_before_allocating_when_space_runs_out() {
        let (mut structure, file) = setup(32);
        let free = structure.free_block_count();
        let too_much = pattern((free as usize + 1) * BLOCK_SIZE);

        assert!(matches!(file.write(&mut structure, 0, &too_much, 0), Err(Error::NoSpace)));
        assert_eq!(structure.free_block_count(), free);
        assert_eq!(structure.inode_table.get(file.id).unwrap().size, 0);
    }

    #[test]
    fn truncate_releases_everything() {
        let (mut structure, file) = setup(1024);
        let free = structure.free_block_count();
        file.write(&mut structure, 0, &pattern(((6 + P) * B) as usize + 10), 0).unwrap();
        assert!(structure.free_block_count() < free);

        file.truncate(&mut structure, 3).unwrap();
        assert_eq!(structure.free_block_count(), free);
        let inode = structure.inode_table.get(file.id).unwrap();
        assert_eq!(inode.size, 0);
        assert_eq!(inode.indirect_1, NULL_POINTER);
        assert_eq!(inode.indirect_2, NULL_POINTER);
        assert!(file.read(&structure, 0, 10).unwrap().is_empty());
    }

    #[test]
    fn corrupted_pointer_is_reported() {
        let (mut structure, file) = setup(256);
        structure.inode_table.get_mut(file.id).unwrap().size = 100;
        assert!(matches!(file.read(&structure, 0, 10), Err(Error::Corrupted(_))));
    }

    #[test]
    fn directories_are_not_files() {
        let (mut structure, _) = setup(64);
        let inode = Inode::new(IS_DIR_MASK | 0o755, 0, 0, 0);
        let id = structure.inode_table.allocate(&mut structure.io, inode).unwrap();
        assert!(matches!(File::open(&structure, id), Err(Error::IsADirectory)));
        assert!(matches!(File::open(&structure, 0), Err(Error::OutOfRange(0))));
    }
}
