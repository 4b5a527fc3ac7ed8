//! In-memory storage, mostly for tests and throwaway sessions.

use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::error::{QuarryError, Result};
use crate::storage::{Storage, StorageInput, StorageOutput};

type FileMap = Arc<RwLock<AHashMap<String, Arc<Vec<u8>>>>>;

/// Storage that keeps every blob in a shared map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    files: FileMap,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of bytes held.
    pub fn total_size(&self) -> usize {
        self.files.read().values().map(|v| v.len()).sum()
    }
}

impl Storage for MemoryStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let data = self
            .files
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| QuarryError::not_found(format!("file '{name}'")))?;
        Ok(Box::new(MemoryInput {
            cursor: Cursor::new(data),
        }))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        Ok(Box::new(MemoryOutput {
            name: name.to_string(),
            buffer: Vec::new(),
            files: self.files.clone(),
        }))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.files.read().contains_key(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.files.write().remove(name);
        Ok(())
    }

    fn rename_file(&self, from: &str, to: &str) -> Result<()> {
        let mut files = self.files.write();
        let data = files
            .remove(from)
            .ok_or_else(|| QuarryError::not_found(format!("file '{from}'")))?;
        files.insert(to.to_string(), data);
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.files.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

#[derive(Debug)]
struct MemoryInput {
    cursor: Cursor<Arc<Vec<u8>>>,
}

impl Read for MemoryInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let data = self.cursor.get_ref().as_slice();
        let pos = (self.cursor.position() as usize).min(data.len());
        let n = buf.len().min(data.len() - pos);
        buf[..n].copy_from_slice(&data[pos..pos + n]);
        self.cursor.set_position((pos + n) as u64);
        Ok(n)
    }
}

impl StorageInput for MemoryInput {
    fn size(&self) -> Result<u64> {
        Ok(self.cursor.get_ref().len() as u64)
    }
}

/// Output that publishes its buffer to the shared map on flush.
#[derive(Debug)]
struct MemoryOutput {
    name: String,
    buffer: Vec<u8>,
    files: FileMap,
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl StorageOutput for MemoryOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.files
            .write()
            .insert(self.name.clone(), Arc::new(self.buffer.clone()));
        Ok(())
    }
}
