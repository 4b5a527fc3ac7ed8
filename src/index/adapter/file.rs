//! Adapter over a directory tree.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::error::{QuarryError, Result};
use crate::index::adapter::{DocumentAdapter, EntryFilter, normalize_path};
use crate::index::indexer::Indexer;
use crate::index::settings::IndexSettings;

/// Indexes the files below `base_dir`.
///
/// Document ids are `/`-separated paths relative to `base_dir`. Each file
/// contributes the words of its name, `ext`, `dir`, `t:file` and a numeric
/// `size` property.
#[derive(Debug)]
pub struct FileAdapter {
    name: String,
    base_dir: PathBuf,
    settings: IndexSettings,
    filter: EntryFilter,
}

impl FileAdapter {
    pub fn new<P: AsRef<Path>>(base_dir: P, settings: IndexSettings) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        if !base_dir.is_dir() {
            return Err(QuarryError::invalid_config(format!(
                "'{}' is not a directory",
                base_dir.display()
            )));
        }
        let filter = EntryFilter::from_settings(&settings)?;
        Ok(FileAdapter {
            name: format!("files:{}", settings.name),
            base_dir,
            settings,
            filter,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn resolve(&self, id: &str) -> Result<PathBuf> {
        if id.split('/').any(|part| part == "..") {
            return Err(QuarryError::invalid_argument(format!(
                "document id '{id}' escapes the base directory"
            )));
        }
        Ok(self.base_dir.join(id))
    }

    fn walk(&self, dir: &Path, relative: &str, out: &mut Vec<String>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let path = if relative.is_empty() {
                file_name
            } else {
                format!("{relative}/{file_name}")
            };

            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                self.walk(&entry.path(), &path, out)?;
            } else if file_type.is_file() && !self.skip_entry(&path, true) {
                out.push(path);
            }
        }
        Ok(())
    }
}

impl DocumentAdapter for FileAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn roots(&self) -> Vec<String> {
        if self.settings.roots.is_empty() {
            vec![String::new()]
        } else {
            self.settings.roots.iter().map(|r| normalize_path(r)).collect()
        }
    }

    fn dependencies(&mut self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for root in self.roots() {
            let root = root.trim_end_matches('/');
            let dir = self.resolve(root)?;
            if !dir.is_dir() {
                log::warn!("{}: root '{}' does not exist", self.name, dir.display());
                continue;
            }
            self.walk(&dir, root, &mut ids)?;
        }
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    fn document_hash(&self, id: &str) -> Option<String> {
        let metadata = fs::metadata(self.resolve(id).ok()?).ok()?;
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        Some(format!("{:x}-{:x}", metadata.len(), modified))
    }

    fn index_document(&mut self, id: &str, check_exists: bool, indexer: &Indexer) -> Result<()> {
        let path = self.resolve(id)?;
        let metadata = fs::metadata(&path)?;
        let doc = indexer.add_document(id, None, check_exists);
        let settings = &self.settings;
        let score = settings.base_score;

        let (dir, file_name) = id.rsplit_once('/').unwrap_or(("", id));
        let (stem, ext) = match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, ext),
            _ => (file_name, ""),
        };

        if settings.index_words {
            indexer.add_words(stem, doc);
            indexer.add_exact_word(file_name, doc, score - 1);
        }
        if settings.index_properties {
            indexer.add_property_default("t", "file", doc, score, true, true);
            if !ext.is_empty() {
                indexer.add_property_default("ext", ext, doc, score, true, true);
            }
            if !dir.is_empty() {
                indexer.add_property_default("dir", dir, doc, score, false, true);
            }
        }
        if settings.index_numbers {
            indexer.add_number("size", metadata.len() as f64, doc, score);
        }
        Ok(())
    }

    fn skip_entry(&self, path: &str, check_roots: bool) -> bool {
        self.filter.skip(path, check_roots)
    }
}
