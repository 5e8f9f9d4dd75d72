use log::debug;

use crate::consts::{InodePointer, ROOT_INODE};
use crate::driver::DeviceDriver;
use crate::ops::directory::Directory;
use crate::structure::Structure;
use crate::util::error::{Error, Result};

/// Non-empty components of `path`, in order. `"/"`, `""` and `"//"` have none.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|component| !component.is_empty())
}

/// Splits `path` into its parent path and final component.
pub fn split_parent(path: &str) -> Result<(String, &str)> {
    let parts: Vec<&str> = components(path).collect();
    let (name, parents) = parts
        .split_last()
        .ok_or_else(|| Error::InvalidArgument(format!("{:?} has no final component", path)))?;
    Ok((format!("/{}", parents.join("/")), *name))
}

/// Walks `path` from the root directory and returns the inode it names.
pub fn resolve<A: DeviceDriver>(structure: &Structure<A>, path: &str) -> Result<InodePointer> {
    let mut current = ROOT_INODE;
    for component in components(path) {
        let directory = Directory::open(structure, current)?;
        current = directory.find_child(structure, component)?;
    }
    debug!("resolved {:?} to inode {}", path, current);
    Ok(current)
}
