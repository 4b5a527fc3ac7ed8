//! Storage backends for persisted indexes.
//!
//! The index cache is an optimization, never the source of truth, so the
//! surface is intentionally small: named blobs that can be written, read,
//! renamed and deleted.

pub mod file;
pub mod memory;
pub mod structured;

use std::io::{Read, Write};

use crate::error::Result;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// A readable stream opened from a [`Storage`].
pub trait StorageInput: Read + Send + std::fmt::Debug {
    /// Total size of the underlying blob in bytes.
    fn size(&self) -> Result<u64>;

    /// Release the input.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A writable stream created by a [`Storage`].
pub trait StorageOutput: Write + Send + std::fmt::Debug {
    /// Flush buffered data and make it durable.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Flush and release the output.
    fn close(&mut self) -> Result<()> {
        self.flush_and_sync()
    }
}

/// A flat namespace of named blobs.
pub trait Storage: Send + Sync + std::fmt::Debug {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    fn file_exists(&self, name: &str) -> bool;

    fn delete_file(&self, name: &str) -> Result<()>;

    /// Replace `to` with `from`.
    fn rename_file(&self, from: &str, to: &str) -> Result<()>;

    fn list_files(&self) -> Result<Vec<String>>;

    /// Read a whole blob into memory.
    fn read_all(&self, name: &str) -> Result<Vec<u8>> {
        let mut input = self.open_input(name)?;
        let mut bytes = Vec::with_capacity(input.size()? as usize);
        input.read_to_end(&mut bytes)?;
        input.close()?;
        Ok(bytes)
    }

    /// Write a whole blob through a temporary name and rename it into place,
    /// so readers never observe a half-written file.
    fn write_atomic(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let tmp = format!("{name}.tmp");
        {
            let mut output = self.create_output(&tmp)?;
            output.write_all(bytes)?;
            output.close()?;
        }
        self.rename_file(&tmp, name)
    }
}
