use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, MountOption, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use libc::c_int;
use log::{debug, info, warn};

use crate::consts::{BLOCK_SIZE, ROOT_INODE};
use crate::driver::DeviceDriver;
use crate::ops::meta::{from_system_time, Attributes, InodeType};
use crate::ops::BlockFS;
use crate::util::error::{Error, Result};
use crate::util::mode::ModeBits;

const TTL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default)]
pub struct MountOptions {
    pub read_only: bool,
    pub allow_other: bool,
    pub auto_unmount: bool,
}

impl MountOptions {
    fn to_fuse(&self) -> Vec<MountOption> {
        let mut options = vec![MountOption::FSName("blockfs".to_string()), MountOption::NoAtime];
        if self.read_only {
            options.push(MountOption::RO);
        }
        if self.allow_other {
            options.push(MountOption::AllowOther);
        }
        if self.auto_unmount {
            options.push(MountOption::AutoUnmount);
        }
        options
    }
}

/// Serves `fs` at `mountpoint` until the filesystem is unmounted.
pub fn mount<A: DeviceDriver>(fs: BlockFS<A>, mountpoint: &Path, options: &MountOptions) -> io::Result<()> {
    info!("mounting at {}", mountpoint.display());
    fuser::mount2(FuseDriver { fs }, mountpoint, &options.to_fuse())
}

/// Kernel inode numbers are the filesystem's own; root is 1 on both sides.
pub struct FuseDriver<A: DeviceDriver> {
    fs: BlockFS<A>,
}

fn file_name(name: &OsStr) -> Result<&str> {
    name.to_str()
        .ok_or_else(|| Error::InvalidArgument(format!("{:?} is not valid UTF-8", name)))
}

fn inode_number(ino: u64) -> Result<u32> {
    u32::try_from(ino).map_err(|_| Error::OutOfRange(ino))
}

fn file_offset(offset: i64) -> Result<u64> {
    u64::try_from(offset).map_err(|_| Error::InvalidArgument(format!("negative offset {}", offset)))
}

/// Entries are never replaced, so only `RENAME_NOREPLACE` is honored as-is.
fn check_rename_flags(flags: u32) -> Result<()> {
    if flags & !(libc::RENAME_NOREPLACE as u32) != 0 {
        return Err(Error::InvalidArgument(format!("unsupported rename flags {:#x}", flags)));
    }
    Ok(())
}

fn file_type(inode_type: InodeType) -> FileType {
    match inode_type {
        InodeType::File => FileType::RegularFile,
        InodeType::Directory => FileType::Directory,
    }
}

fn to_file_attr(attributes: &Attributes) -> FileAttr {
    FileAttr {
        ino: attributes.ino as u64,
        size: attributes.size,
        blocks: attributes.blocks,
        atime: attributes.modified_at,
        mtime: attributes.modified_at,
        ctime: attributes.modified_at,
        crtime: attributes.created_at,
        kind: file_type(attributes.inode_type),
        perm: attributes.permissions,
        nlink: if attributes.is_dir() { 2 } else { 1 },
        uid: attributes.user_id,
        gid: attributes.group_id,
        rdev: 0,
        blksize: BLOCK_SIZE as u32,
        flags: 0,
    }
}

fn to_seconds(time: TimeOrNow) -> u32 {
    match time {
        TimeOrNow::SpecificTime(time) => from_system_time(time),
        TimeOrNow::Now => from_system_time(SystemTime::now()),
    }
}

impl<A: DeviceDriver> FuseDriver<A> {
    pub fn new(fs: BlockFS<A>) -> FuseDriver<A> {
        FuseDriver { fs }
    }

    fn errno(operation: &str, error: Error) -> c_int {
        match error {
            Error::Corrupted(_) | Error::Io(_) => warn!("{} failed: {}", operation, error),
            _ => debug!("{} failed: {}", operation, error),
        }
        error.errno()
    }

    fn lookup_entry(&self, parent: u64, name: &OsStr) -> Result<Attributes> {
        self.fs.lookup(inode_number(parent)?, file_name(name)?)
    }

    fn apply_attributes(
        &mut self,
        ino: u64,
        mode: Option<u32>,
        owner_changed: bool,
        size: Option<u64>,
        mtime: Option<TimeOrNow>,
    ) -> Result<Attributes> {
        let ino = inode_number(ino)?;
        if owner_changed {
            return Err(Error::Unsupported("chown"));
        }
        let current = self.fs.attributes(ino)?;
        if let Some(size) = size {
            if current.is_dir() {
                return Err(Error::IsADirectory);
            }
            if size > 0 {
                return Err(Error::Unsupported("truncate to a non-zero length"));
            }
        }

        if size.is_some() {
            self.fs.truncate_file(ino, 0)?;
        }
        if let Some(mode) = mode {
            self.fs.set_mode(ino, mode)?;
        }
        if let Some(mtime) = mtime {
            self.fs.set_mtime(ino, to_seconds(mtime))?;
        }
        self.fs.attributes(ino)
    }

    fn directory_entries(&self, ino: u64) -> Result<Vec<(u64, FileType, String)>> {
        let listing = self.fs.list(inode_number(ino)?)?;
        let mut entries = vec![
            (ino, FileType::Directory, ".".to_string()),
            (ROOT_INODE as u64, FileType::Directory, "..".to_string()),
        ];
        entries.extend(
            listing
                .into_iter()
                .map(|entry| (entry.attributes.ino as u64, file_type(entry.attributes.inode_type), entry.name)),
        );
        Ok(entries)
    }
}

impl<A: DeviceDriver> Filesystem for FuseDriver<A> {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> std::result::Result<(), c_int> {
        let statistics = self.fs.statfs();
        info!(
            "serving {} blocks ({} free), {} inodes ({} free)",
            statistics.total_blocks, statistics.free_blocks, statistics.total_inodes, statistics.free_inodes
        );
        Ok(())
    }

    fn destroy(&mut self) {
        info!("unmounted");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.lookup_entry(parent, name) {
            Ok(attributes) => reply.entry(&TTL, &to_file_attr(&attributes), 0),
            Err(e) => reply.error(Self::errno("lookup", e)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        match inode_number(ino).and_then(|ino| self.fs.attributes(ino)) {
            Ok(attributes) => reply.attr(&TTL, &to_file_attr(&attributes)),
            Err(e) => reply.error(Self::errno("getattr", e)),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        match self.apply_attributes(ino, mode, uid.is_some() || gid.is_some(), size, mtime) {
            Ok(attributes) => reply.attr(&TTL, &to_file_attr(&attributes)),
            Err(e) => reply.error(Self::errno("setattr", e)),
        }
    }

    fn mknod(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: ModeBits,
        umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        let created = inode_number(parent)
            .and_then(|parent| self.fs.create(parent, file_name(name)?, mode & !umask, req.uid(), req.gid()));
        match created {
            Ok(attributes) => reply.entry(&TTL, &to_file_attr(&attributes), 0),
            Err(e) => reply.error(Self::errno("mknod", e)),
        }
    }

    fn mkdir(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, mode: ModeBits, umask: u32, reply: ReplyEntry) {
        let created = inode_number(parent).and_then(|parent| {
            self.fs
                .make_directory(parent, file_name(name)?, mode & !umask, req.uid(), req.gid())
        });
        match created {
            Ok(attributes) => reply.entry(&TTL, &to_file_attr(&attributes), 0),
            Err(e) => reply.error(Self::errno("mkdir", e)),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        match inode_number(parent).and_then(|parent| self.fs.remove_file(parent, file_name(name)?)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(Self::errno("unlink", e)),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        match inode_number(parent).and_then(|parent| self.fs.remove_directory(parent, file_name(name)?)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(Self::errno("rmdir", e)),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        let renamed = check_rename_flags(flags).and(inode_number(parent)).and_then(|parent| {
            self.fs
                .rename_entry(parent, file_name(name)?, inode_number(newparent)?, file_name(newname)?)
        });
        match renamed {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(Self::errno("rename", e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let data = inode_number(ino)
            .and_then(|ino| self.fs.read_file(ino, file_offset(offset)?, size as usize));
        match data {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(Self::errno("read", e)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let written = inode_number(ino).and_then(|ino| self.fs.write_file(ino, file_offset(offset)?, data));
        match written {
            Ok(written) => reply.written(written as u32),
            Err(e) => reply.error(Self::errno("write", e)),
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let entries = match self.directory_entries(ino) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(Self::errno("readdir", e));
                return;
            }
        };
        let skip = usize::try_from(offset).unwrap_or(0);
        for (index, (ino, kind, name)) in entries.into_iter().enumerate().skip(skip) {
            // the offset handed back is where the next call resumes
            if reply.add(ino, (index + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let statistics = self.fs.statfs();
        reply.statfs(
            statistics.total_blocks,
            statistics.free_blocks,
            statistics.free_blocks,
            statistics.total_inodes,
            statistics.free_inodes,
            statistics.block_size,
            statistics.name_length,
            statistics.block_size,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::memory_drive::MemoryDrive;
    use crate::util::mode::IS_FILE_MASK;

    fn driver() -> FuseDriver<MemoryDrive> {
        FuseDriver::new(BlockFS::format(MemoryDrive::new(256), 0).unwrap())
    }

    #[test]
    fn file_attributes() {
        let mut driver = driver();
        let attributes = driver.fs.create(ROOT_INODE, "a", IS_FILE_MASK | 0o640, 10, 20).unwrap();
        driver.fs.write_file(attributes.ino, 0, &[7; 1500]).unwrap();

        let attr = to_file_attr(&driver.fs.attributes(attributes.ino).unwrap());
        assert_eq!(attr.ino, 2);
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.perm, 0o640);
        assert_eq!(attr.size, 1500);
        assert_eq!(attr.blocks, 2);
        assert_eq!(attr.uid, 10);
        assert_eq!(attr.gid, 20);
        assert_eq!(attr.nlink, 1);
        assert_eq!(attr.atime, attr.mtime);
        assert_eq!(attr.blksize, 1024);

        let root = to_file_attr(&driver.fs.attributes(ROOT_INODE).unwrap());
        assert_eq!(root.kind, FileType::Directory);
        assert_eq!(root.crtime, SystemTime::UNIX_EPOCH);
    }

    #[test]
    fn lookup_by_os_name() {
        let mut driver = driver();
        driver.fs.make_directory(ROOT_INODE, "sub", 0o755, 0, 0).unwrap();

        assert!(driver.lookup_entry(1, OsStr::new("sub")).unwrap().is_dir());
        assert_eq!(driver.lookup_entry(1, OsStr::new("nope")).unwrap_err().errno(), libc::ENOENT);
        assert_eq!(driver.lookup_entry(1 << 40, OsStr::new("sub")).unwrap_err().errno(), libc::ENOENT);
    }

    #[test]
    fn directory_entries_start_with_dots() {
        let mut driver = driver();
        driver.fs.create(ROOT_INODE, "f", IS_FILE_MASK | 0o644, 0, 0).unwrap();
        let dir = driver.fs.make_directory(ROOT_INODE, "d", 0o755, 0, 0).unwrap();

        let entries = driver.directory_entries(1).unwrap();
        let names: Vec<&str> = entries.iter().map(|(_, _, name)| name.as_str()).collect();
        assert_eq!(names, vec![".", "..", "f", "d"]);
        assert_eq!(entries[3], (dir.ino as u64, FileType::Directory, "d".to_string()));
        assert_eq!(driver.directory_entries(2).unwrap_err().errno(), libc::ENOTDIR);
    }

    #[test]
    fn setattr_changes() {
        let mut driver = driver();
        let file = driver.fs.create(ROOT_INODE, "f", IS_FILE_MASK | 0o644, 0, 0).unwrap();
        driver.fs.write_file(file.ino, 0, b"contents").unwrap();
        let ino = file.ino as u64;

        let mtime = TimeOrNow::SpecificTime(SystemTime::UNIX_EPOCH + Duration::from_secs(99));
        let attributes = driver.apply_attributes(ino, Some(0o100600), false, Some(0), Some(mtime)).unwrap();
        assert_eq!(attributes.permissions, 0o600);
        assert_eq!(attributes.size, 0);
        assert_eq!(from_system_time(attributes.modified_at), 99);

        let chown = driver.apply_attributes(ino, None, true, None, None).unwrap_err();
        assert_eq!(chown.errno(), libc::EOPNOTSUPP);
        let grow = driver.apply_attributes(ino, None, false, Some(10), None).unwrap_err();
        assert_eq!(grow.errno(), libc::EOPNOTSUPP);
    }

    #[test]
    fn failed_setattr_changes_nothing() {
        let mut driver = driver();
        let file = driver.fs.create(ROOT_INODE, "f", IS_FILE_MASK | 0o644, 0, 0).unwrap();
        driver.fs.write_file(file.ino, 0, b"contents").unwrap();
        let before = driver.fs.attributes(file.ino).unwrap();

        let mtime = TimeOrNow::SpecificTime(SystemTime::UNIX_EPOCH + Duration::from_secs(5));
        let error = driver
            .apply_attributes(file.ino as u64, Some(0o100600), false, Some(10), Some(mtime))
            .unwrap_err();
        assert_eq!(error.errno(), libc::EOPNOTSUPP);
        assert_eq!(driver.fs.attributes(file.ino).unwrap(), before);

        let error = driver.apply_attributes(ROOT_INODE as u64, Some(0o40700), false, Some(0), None).unwrap_err();
        assert_eq!(error.errno(), libc::EISDIR);
        assert_eq!(driver.fs.attributes(ROOT_INODE).unwrap().permissions, 0o755);

        let error = driver.apply_attributes(40, Some(0o600), false, None, None).unwrap_err();
        assert_eq!(error.errno(), libc::ENOENT);
    }

    #[test]
    fn rename_flags() {
        assert!(check_rename_flags(0).is_ok());
        assert!(check_rename_flags(libc::RENAME_NOREPLACE as u32).is_ok());
        assert_eq!(check_rename_flags(libc::RENAME_EXCHANGE as u32).unwrap_err().errno(), libc::EINVAL);
    }

    #[test]
    fn mount_options() {
        let options = MountOptions { read_only: true, allow_other: false, auto_unmount: true }.to_fuse();
        assert!(options.contains(&MountOption::RO));
        assert!(options.contains(&MountOption::AutoUnmount));
        assert!(!options.contains(&MountOption::AllowOther));
        assert_eq!(file_offset(-1).unwrap_err().errno(), libc::EINVAL);
    }
}
