pub type ModeBits = u32;

pub const PERMISSIONS_MASK: ModeBits = 0o7777;
pub const TYPE_MASK: ModeBits = 0o170000;
pub const IS_DIR_MASK: ModeBits = 0o040000;
pub const IS_FILE_MASK: ModeBits = 0o100000;

pub trait ModeBitsHelper {
    fn get_permissions(&self) -> u16;
    fn is_directory(&self) -> bool;
    fn is_file(&self) -> bool;
    fn with_permissions(&self, permissions: ModeBits) -> ModeBits;
}

impl ModeBitsHelper for ModeBits {
    fn get_permissions(&self) -> u16 {
        (self & PERMISSIONS_MASK) as u16
    }

    fn is_directory(&self) -> bool {
        (self & TYPE_MASK) == IS_DIR_MASK
    }

    fn is_file(&self) -> bool {
        (self & TYPE_MASK) == IS_FILE_MASK
    }

    fn with_permissions(&self, permissions: ModeBits) -> ModeBits {
        (self & TYPE_MASK) | (permissions & PERMISSIONS_MASK)
    }
}
