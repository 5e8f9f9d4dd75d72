use std::os::raw::c_int;

use thiserror::Error;

type ErrorNum = c_int;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no such file or directory")]
    NotFound,

    #[error("not a directory")]
    NotADirectory,

    #[error("is a directory")]
    IsADirectory,

    #[error("file already exists")]
    AlreadyExists,

    #[error("no space left")]
    NoSpace,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("file name too long")]
    NameTooLong,

    #[error("directory not empty")]
    DirectoryNotEmpty,

    #[error("file too large")]
    FileTooLarge,

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("inode {0} is out of range")]
    OutOfRange(u64),

    #[error("corrupted filesystem: {0}")]
    Corrupted(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn errno(&self) -> ErrorNum {
        match self {
            Error::NotFound | Error::OutOfRange(_) => libc::ENOENT,
            Error::NotADirectory => libc::ENOTDIR,
            Error::IsADirectory => libc::EISDIR,
            Error::AlreadyExists => libc::EEXIST,
            Error::NoSpace => libc::ENOSPC,
            Error::InvalidArgument(_) => libc::EINVAL,
            Error::NameTooLong => libc::ENAMETOOLONG,
            Error::DirectoryNotEmpty => libc::ENOTEMPTY,
            Error::FileTooLarge => libc::EFBIG,
            Error::Unsupported(_) => libc::EOPNOTSUPP,
            Error::Corrupted(_) | Error::Io(_) => libc::EIO,
        }
    }
}
