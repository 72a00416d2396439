//! Bounded FIFO cache of materialized frame files for one compressed
//! source.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// Keeps at most `capacity` decompressed frame artifacts on disk;
/// inserting beyond capacity deletes the oldest artifact.
#[derive(Debug)]
pub struct FrameFileCache {
    capacity: usize,
    frames: VecDeque<(i32, PathBuf)>,
}

impl FrameFileCache {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), frames: VecDeque::new() }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Pure path lookup; evicts the entry if its artifact vanished from
    /// disk behind our back.
    pub fn lookup(&mut self, frame: i32) -> Option<PathBuf> {
        let position = self.frames.iter().position(|(f, _)| *f == frame)?;
        if self.frames[position].1.is_file() {
            return Some(self.frames[position].1.clone());
        }
        self.frames.remove(position);
        None
    }

    /// Records a freshly materialized artifact, deleting the oldest
    /// beyond capacity.
    pub fn insert(&mut self, frame: i32, path: PathBuf) {
        self.frames.retain(|(f, _)| *f != frame);
        self.frames.push_back((frame, path));
        while self.frames.len() > self.capacity {
            if let Some((old_frame, old_path)) = self.frames.pop_front() {
                log::debug!(
                    "[FrameFileCache::insert] Evicting frame {} ({})",
                    old_frame,
                    old_path.display()
                );
                remove_artifact(&old_path);
            }
        }
    }

    /// Deletes every cached artifact.
    pub fn clear(&mut self) {
        for (_, path) in self.frames.drain(..) {
            remove_artifact(&path);
        }
    }
}

fn remove_artifact(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        log::warn!("[FrameFileCache] Failed to remove {}: {}", path.display(), e);
    }
}
