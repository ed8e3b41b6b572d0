use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PrefetchError;

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tga", "tiff", "tif", "webp", "ico", "pnm", "pbm",
    "pgm", "ppm", "pam", "dds", "hdr", "exr", "ff", "qoi",
];

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// One supported file at a fixed position in the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub path: PathBuf,
    pub file_name: String,
}

// ---------------------------------------------------------------------------
// Sorted, filtered listing of a single directory
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct DirectoryIndex {
    dir: PathBuf,
    follow_links: bool,
    entries: Vec<DirectoryEntry>,
}

impl DirectoryIndex {
    pub fn open(dir: impl Into<PathBuf>, follow_links: bool) -> Result<Self, PrefetchError> {
        let dir = dir.into();
        let entries = scan_dir(&dir, follow_links)?;
        log::info!("Indexed {:?}: {} images", dir, entries.len());
        Ok(Self {
            dir,
            follow_links,
            entries,
        })
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn file_at(&self, idx: usize) -> Option<&DirectoryEntry> {
        self.entries.get(idx)
    }

    /// Removes the file at `idx` from disk and reloads the listing.
    ///
    /// Every position after `idx` shifts down by one, so anything keyed by
    /// position must be invalidated from `idx` onward before calling this.
    pub fn delete(&mut self, idx: usize) -> Result<(), PrefetchError> {
        let Some(entry) = self.entries.get(idx) else {
            return Err(PrefetchError::PreconditionViolation {
                position: idx,
                size: self.entries.len(),
            });
        };

        fs::remove_file(&entry.path).map_err(|source| PrefetchError::Io {
            path: entry.path.clone(),
            source,
        })?;
        log::info!("Deleted {:?}", entry.path);

        match scan_dir(&self.dir, self.follow_links) {
            Ok(entries) => self.entries = entries,
            Err(e) => {
                // The file is gone either way; keep positions consistent.
                log::warn!("Rescan after delete failed: {}", e);
                self.entries.remove(idx);
            }
        }
        Ok(())
    }
}

fn scan_dir(dir: &Path, follow_links: bool) -> Result<Vec<DirectoryEntry>, PrefetchError> {
    let io_err = |source| PrefetchError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)?.filter_map(|e| e.ok()) {
        let Ok(ft) = entry.file_type() else {
            continue;
        };

        if ft.is_symlink() && !follow_links {
            continue;
        }

        let p = entry.path();
        if p.is_file() && is_image_file(&p) {
            files.push(p);
        }
    }

    files.sort();

    Ok(files
        .into_iter()
        .map(|path| {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            DirectoryEntry { path, file_name }
        })
        .collect())
}
