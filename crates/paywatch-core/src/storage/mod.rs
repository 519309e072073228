//! On-disk persistence for the invoice registry and the cookie jar.
//!
//! Every file is plain pretty-printed JSON, replaced atomically (temp file
//! then rename) so an interrupted write never leaves a half-written file.
//! A file that exists but cannot be read or parsed is reported as
//! [`StorageError::Corrupted`] instead of being treated as empty.

pub mod error;
pub mod file;

pub use error::StorageError;
pub use file::JsonFile;
