pub mod error;
pub mod format;
pub mod mode;
pub mod serializable;
