//! Multi-file decompression helper: one manager and one bounded frame
//! cache per compressed file, behind a single mutex.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::FrameFileCache;
use crate::constants::{DEFAULT_MAX_CACHED_FRAMES, ENV_MAX_CACHED_FRAMES};
use crate::engine::types::FrameRange;
use crate::engine::CompressionEngine;
use crate::error::{PipelineError, PipelineResult};
use crate::gpu::RhiFactory;

use super::manager::DecompressorManager;

/// Frame-cache capacity from the environment, falling back to the
/// default of 2.
pub fn max_cached_frames_from_env() -> usize {
    std::env::var(ENV_MAX_CACHED_FRAMES)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|&cap| cap > 0)
        .unwrap_or(DEFAULT_MAX_CACHED_FRAMES)
}

struct DecompressionItem {
    manager: DecompressorManager,
    frame_range: FrameRange,
    cache: FrameFileCache,
    artifact_stem: String,
}

/// Materializes decompressed frames as grid files on disk, one
/// decompression at a time per file.
///
/// The helper's lifetime is tied to the host's initialization; there is
/// no ambient global state. All bookkeeping lives behind one mutex: the
/// path-to-item map and each item's frame FIFO.
pub struct DecompressionHelper {
    engine: Arc<dyn CompressionEngine>,
    rhi_factory: Arc<dyn RhiFactory>,
    items: Mutex<HashMap<String, DecompressionItem>>,
    max_cached_frames: usize,
}

impl DecompressionHelper {
    /// Helper with the frame-cache capacity taken from the environment.
    pub fn new(engine: Arc<dyn CompressionEngine>, rhi_factory: Arc<dyn RhiFactory>) -> Self {
        Self::with_capacity(engine, rhi_factory, max_cached_frames_from_env())
    }

    pub fn with_capacity(
        engine: Arc<dyn CompressionEngine>,
        rhi_factory: Arc<dyn RhiFactory>,
        max_cached_frames: usize,
    ) -> Self {
        Self {
            engine,
            rhi_factory,
            items: Mutex::new(HashMap::new()),
            max_cached_frames,
        }
    }

    fn create_item(&self, source: &Path) -> PipelineResult<DecompressionItem> {
        let mut manager = DecompressorManager::new();
        manager.initialize(self.engine.clone(), self.rhi_factory.as_ref())?;
        manager.register_decompressor(source)?;
        let frame_range = manager.frame_range()?;
        let uuid = manager.sequence_info()?.file_uuid.simple().to_string();

        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sequence".to_owned());
        Ok(DecompressionItem {
            manager,
            frame_range,
            cache: FrameFileCache::new(self.max_cached_frames),
            artifact_stem: format!("{}_{}", stem, &uuid[..8]),
        })
    }

    /// Decompresses `frame` of `source` into a grid file under
    /// `output_dir`, returning the artifact path. Frames still in the
    /// per-file cache are a pure path lookup.
    pub fn decompress_file_frame(
        &self,
        source: &Path,
        output_dir: &Path,
        frame: i32,
    ) -> PipelineResult<PathBuf> {
        let key = source.to_string_lossy().into_owned();
        let mut items = self.items.lock();

        if !items.contains_key(&key) {
            // Failed setup leaves no entry behind; the next request
            // retries from scratch.
            let item = self.create_item(source)?;
            items.insert(key.clone(), item);
        }
        let Some(item) = items.get_mut(&key) else {
            return Err(PipelineError::Internal("decompression item vanished".into()));
        };

        if !item.frame_range.contains(frame) {
            return Err(PipelineError::OutOfBounds {
                index: frame,
                start: item.frame_range.start,
                end: item.frame_range.end,
            });
        }

        if let Some(path) = item.cache.lookup(frame) {
            log::debug!(
                "[DecompressionHelper::decompress_file_frame] Cache hit for frame {}",
                frame
            );
            return Ok(path);
        }

        std::fs::create_dir_all(output_dir)?;
        let container = item.manager.fetch_frame_container(frame)?;
        let grids = item.manager.decompress_frame(container.as_ref())?;

        let path = output_dir.join(format!("{}.{:04}.vdb", item.artifact_stem, frame));
        let bytes = bincode::serialize(&grids)?;
        std::fs::write(&path, bytes)?;
        log::info!(
            "[DecompressionHelper::decompress_file_frame] Materialized frame {} at {}",
            frame,
            path.display()
        );

        item.cache.insert(frame, path.clone());
        Ok(path)
    }

    /// Releases every manager and deletes all cached artifacts.
    pub fn cleanup(&self) {
        let mut items = self.items.lock();
        for (_, mut item) in items.drain() {
            item.manager.release();
            item.cache.clear();
        }
    }
}

impl Drop for DecompressionHelper {
    fn drop(&mut self) {
        self.cleanup();
    }
}
