//! Write-once, fingerprint-keyed disk cache for intermediate compressor
//! artifacts.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::engine::BuildCache;
use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindState {
    Idle,
    Writing,
    Reading,
}

#[derive(Debug)]
struct CacheItem {
    path: PathBuf,
    state: BindState,
}

/// Disk-backed [`BuildCache`]: one file per fingerprint under a
/// configured directory, deleted on release or teardown.
///
/// Writers and readers are mutually exclusive per id and tracked by a
/// bind state; streams handed out must be dropped before the matching
/// `finish_*` call takes effect on a subsequent bind.
#[derive(Debug)]
pub struct DiskBuildCache {
    base_path: PathBuf,
    items: HashMap<String, CacheItem>,
}

impl DiskBuildCache {
    pub fn new(base_path: impl Into<PathBuf>) -> PipelineResult<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path, items: HashMap::new() })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Number of fingerprints currently tracked.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.base_path.join(format!("FrameCache.{}.tmp", id))
    }

    /// Deletes every cached file and forgets all fingerprints.
    pub fn release_all(&mut self) {
        for (id, item) in self.items.drain() {
            if let Err(e) = std::fs::remove_file(&item.path) {
                log::warn!("[DiskBuildCache::release_all] '{}': {}", id, e);
            }
        }
    }
}

impl BuildCache for DiskBuildCache {
    fn start_store(&mut self, id: &str) -> PipelineResult<Box<dyn Write + Send>> {
        if let Some(item) = self.items.get(id) {
            if item.state != BindState::Idle {
                return Err(PipelineError::Internal(format!(
                    "cache id '{}' is already bound",
                    id
                )));
            }
        }
        let path = self.path_for(id);
        let file = File::create(&path)?;
        self.items
            .insert(id.to_owned(), CacheItem { path, state: BindState::Writing });
        Ok(Box::new(BufWriter::new(file)))
    }

    fn finish_store(&mut self, id: &str) -> PipelineResult<()> {
        let item = self
            .items
            .get_mut(id)
            .ok_or_else(|| PipelineError::NotFound(format!("cache id '{}'", id)))?;
        if item.state != BindState::Writing {
            return Err(PipelineError::Internal(format!("cache id '{}' has no open writer", id)));
        }
        item.state = BindState::Idle;
        Ok(())
    }

    fn start_read(&mut self, id: &str) -> PipelineResult<Box<dyn Read + Send>> {
        let item = self
            .items
            .get_mut(id)
            .ok_or_else(|| PipelineError::NotFound(format!("cache id '{}'", id)))?;
        if item.state != BindState::Idle {
            return Err(PipelineError::Internal(format!(
                "cache id '{}' is already bound",
                id
            )));
        }
        let file = File::open(&item.path)?;
        item.state = BindState::Reading;
        Ok(Box::new(BufReader::new(file)))
    }

    fn finish_read(&mut self, id: &str) -> PipelineResult<()> {
        let item = self
            .items
            .get_mut(id)
            .ok_or_else(|| PipelineError::NotFound(format!("cache id '{}'", id)))?;
        if item.state != BindState::Reading {
            return Err(PipelineError::Internal(format!("cache id '{}' has no open reader", id)));
        }
        item.state = BindState::Idle;
        Ok(())
    }

    fn release(&mut self, id: &str) -> PipelineResult<()> {
        match self.items.get(id) {
            None => Err(PipelineError::NotFound(format!("cache id '{}'", id))),
            // Releasing while bound is a no-op; the stream owner finishes
            // first.
            Some(item) if item.state != BindState::Idle => Ok(()),
            Some(_) => {
                if let Some(item) = self.items.remove(id) {
                    std::fs::remove_file(&item.path)?;
                }
                Ok(())
            }
        }
    }
}

impl Drop for DiskBuildCache {
    fn drop(&mut self) {
        self.release_all();
    }
}
