#![allow(dead_code)]
//! In-process mock compression engine and mock RHI for end-to-end tests.
//!
//! The mock "file" stores frames exactly as the encoder produced them,
//! quantized to f16 the way the real engine's GPU output is. Its
//! decompressor serves chunks by writing into the registered mock GPU
//! buffers, so the orchestrator path under test is the real one.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use vdbseq::engine::types::{
    ChannelInfo, DecompressFrameDesc, DecompressedFrameFeedback, DecompressorResources,
    FrameInfo, FrameRange, PlaybackInfo, ResourcesRequirements, SequenceInfo,
};
use vdbseq::constants::SPARSE_BLOCK_SIZE;
use vdbseq::engine::{
    CompressionEngine, Decompressor, DecompressorFactory, FileDecoder, FormatMapper,
    FrameContainer, SequenceCompressor,
};
use vdbseq::error::{PipelineError, PipelineResult};
use vdbseq::frame::{EncodingMetadata, FrameEncoder, GridDescriptor, SparseFrame};
use vdbseq::gpu::{BufferId, PackedSpatialBlockInfo, ResourceUsage, RhiFactory, RhiRuntime};
use vdbseq::grid::SparseGrid;
use vdbseq::math::Aabb;
use vdbseq::metadata::helper::{
    compose_frame_metadata, KEY_DECODE_METADATA, KEY_GRID_SHUFFLE,
};
use vdbseq::metadata::{serialize_grid_shuffle, AttributeSet};
use vdbseq::voxel::HalfBlock;

const MOCK_FRAME_INDEX_KEY: &str = "mock.frameIndex";
const CHANNEL_BLOCK_BYTES: u64 = 1024;
const SPATIAL_BLOCK_BYTES: u64 = 16;

pub type BufferStore = Arc<Mutex<HashMap<BufferId, Vec<u8>>>>;

// ---------------------------------------------------------------------
// Mock RHI
// ---------------------------------------------------------------------

pub struct MockRhiFactory {
    store: BufferStore,
    pub fail_device: bool,
}

impl MockRhiFactory {
    pub fn new(store: BufferStore) -> Self {
        Self { store, fail_device: false }
    }

    pub fn failing(store: BufferStore) -> Self {
        Self { store, fail_device: true }
    }
}

impl RhiFactory for MockRhiFactory {
    fn create(&self) -> PipelineResult<Box<dyn RhiRuntime>> {
        if self.fail_device {
            return Err(PipelineError::Unsupported("mock device creation refused".into()));
        }
        Ok(Box::new(MockRhi { store: self.store.clone(), recording: false }))
    }
}

struct MockRhi {
    store: BufferStore,
    recording: bool,
}

impl RhiRuntime for MockRhi {
    fn create_buffer(
        &mut self,
        size: u64,
        _stride: u32,
        _usage: ResourceUsage,
        _name: &str,
    ) -> PipelineResult<BufferId> {
        let mut store = self.store.lock();
        let id = BufferId(store.keys().map(|b| b.0).max().unwrap_or(0) + 1);
        store.insert(id, vec![0u8; size as usize]);
        Ok(id)
    }

    fn release_buffer(&mut self, buffer: BufferId) -> PipelineResult<()> {
        self.store
            .lock()
            .remove(&buffer)
            .map(|_| ())
            .ok_or_else(|| PipelineError::Internal(format!("unknown buffer {:?}", buffer)))
    }

    fn read_buffer(
        &mut self,
        buffer: BufferId,
        dst: &mut [u8],
        offset: u64,
    ) -> PipelineResult<()> {
        let store = self.store.lock();
        let bytes = store
            .get(&buffer)
            .ok_or_else(|| PipelineError::Internal(format!("unknown buffer {:?}", buffer)))?;
        let start = offset as usize;
        dst.copy_from_slice(&bytes[start..start + dst.len()]);
        Ok(())
    }

    fn start_recording(&mut self) -> PipelineResult<()> {
        assert!(!self.recording, "nested recording");
        self.recording = true;
        Ok(())
    }

    fn stop_recording(&mut self) -> PipelineResult<()> {
        assert!(self.recording, "stop without start");
        self.recording = false;
        Ok(())
    }

    fn garbage_collect(&mut self) {}
}

// ---------------------------------------------------------------------
// Stored sequence model
// ---------------------------------------------------------------------

pub struct StoredFrame {
    pub frame_info: FrameInfo,
    pub spatial_blocks: Vec<PackedSpatialBlockInfo>,
    pub channel_blocks: Vec<HalfBlock>,
    pub metadata: BTreeMap<String, String>,
}

pub struct StoredSequence {
    pub frames: BTreeMap<i32, Arc<StoredFrame>>,
    pub frame_range: FrameRange,
    pub max_spatial_blocks_per_submit: u32,
    pub uuid: Uuid,
}

/// Converts encoder output plus its composed metadata into the stored
/// (compressed-file) form, the way a real compressor would.
fn stored_from_sparse(frame: &SparseFrame, entries: &[(String, String)]) -> StoredFrame {
    let metadata: BTreeMap<String, String> =
        entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    let offsets = metadata
        .get(KEY_DECODE_METADATA)
        .and_then(|payload| EncodingMetadata::parse(payload))
        .unwrap_or_default();

    // The decode-side frame info carries the de-normalized box: its
    // minimum is the origin offset recorded in the encoding metadata.
    let size = frame.aabb().size();
    let min = [
        offsets.offset_x / SPARSE_BLOCK_SIZE,
        offsets.offset_y / SPARSE_BLOCK_SIZE,
        offsets.offset_z / SPARSE_BLOCK_SIZE,
    ];
    let frame_info = FrameInfo {
        channels: frame
            .channels()
            .iter()
            .map(|channel| ChannelInfo {
                name: channel.name.clone(),
                min_grid_value: channel.statistics.min_value,
                max_grid_value: channel.statistics.max_value,
                grid_transform: channel.grid_transform,
            })
            .collect(),
        spatial_block_count: frame.spatial_block_count(),
        channel_block_count: frame.channel_block_count(),
        aabb: Aabb::new(
            min[0],
            min[1],
            min[2],
            min[0] + size[0],
            min[1] + size[1],
            min[2] + size[2],
        ),
    };

    let spatial_blocks =
        frame.spatial_blocks().iter().map(PackedSpatialBlockInfo::pack).collect();
    let channel_blocks =
        frame.channel_blocks().iter().map(|block| HalfBlock::from_f32(&block.voxels)).collect();

    StoredFrame { frame_info, spatial_blocks, channel_blocks, metadata }
}

/// Mock compressor sink collecting stored frames through the
/// [`SequenceCompressor`] contract.
pub struct MockSequenceWriter {
    frames: Vec<StoredFrame>,
    finished: bool,
}

impl MockSequenceWriter {
    pub fn new() -> Self {
        Self { frames: Vec::new(), finished: false }
    }

    pub fn into_frames(self) -> Vec<StoredFrame> {
        assert!(self.finished, "sequence writer was never finished");
        self.frames
    }
}

impl SequenceCompressor for MockSequenceWriter {
    fn add_frame(
        &mut self,
        frame: &SparseFrame,
        metadata: &[(String, String)],
    ) -> PipelineResult<()> {
        self.frames.push(stored_from_sparse(frame, metadata));
        Ok(())
    }

    fn finish(&mut self, _metadata: &[(String, String)]) -> PipelineResult<()> {
        self.finished = true;
        Ok(())
    }
}

/// Encodes one frame's grids into its stored (compressed-file) form.
pub fn store_frame(grids: &[SparseGrid]) -> StoredFrame {
    let encoder = FrameEncoder::new(grids, false).expect("encoder setup");
    let (frame, encoding_metadata) = encoder.encode().expect("encode");
    frame.validate().expect("encoded frame invariants");

    let entries = compose_frame_metadata(
        &AttributeSet::new(),
        &[],
        encoder.grid_shuffle(),
        &encoding_metadata,
    );
    let mut writer = MockSequenceWriter::new();
    writer.add_frame(&frame, &entries).expect("compressor add_frame");
    writer.finish(&[]).expect("compressor finish");
    writer.into_frames().pop().expect("one stored frame")
}

impl StoredFrame {
    /// Replaces the shuffle table, e.g. to fuse scalars into a vector.
    pub fn override_shuffle(&mut self, descriptors: &[GridDescriptor]) {
        self.metadata
            .insert(KEY_GRID_SHUFFLE.to_owned(), serialize_grid_shuffle(descriptors));
    }
}

pub fn build_sequence(
    frames: Vec<(i32, StoredFrame)>,
    frame_range: FrameRange,
    max_spatial_blocks_per_submit: u32,
) -> StoredSequence {
    StoredSequence {
        frames: frames.into_iter().map(|(i, f)| (i, Arc::new(f))).collect(),
        frame_range,
        max_spatial_blocks_per_submit,
        uuid: Uuid::new_v4(),
    }
}

// ---------------------------------------------------------------------
// Mock engine
// ---------------------------------------------------------------------

type FileMap = Arc<Mutex<HashMap<PathBuf, Arc<StoredSequence>>>>;
type SubmissionLog = Arc<Mutex<Vec<DecompressFrameDesc>>>;

pub struct MockEngine {
    files: FileMap,
    store: BufferStore,
    submissions: SubmissionLog,
}

impl MockEngine {
    pub fn new(store: BufferStore) -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            store,
            submissions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn register_file(&self, path: impl Into<PathBuf>, sequence: StoredSequence) {
        self.files.lock().insert(path.into(), Arc::new(sequence));
    }

    pub fn submissions(&self) -> Vec<DecompressFrameDesc> {
        self.submissions.lock().clone()
    }

    pub fn clear_submissions(&self) {
        self.submissions.lock().clear();
    }
}

impl CompressionEngine for MockEngine {
    fn create_decompressor_factory(&self) -> PipelineResult<Box<dyn DecompressorFactory>> {
        Ok(Box::new(MockFactory {
            files: self.files.clone(),
            store: self.store.clone(),
            submissions: self.submissions.clone(),
        }))
    }

    fn open_decoder(&self, path: &Path) -> PipelineResult<Box<dyn FileDecoder>> {
        if !self.files.lock().contains_key(path) {
            return Err(PipelineError::NotFound(format!("no such file {}", path.display())));
        }
        Ok(Box::new(MockDecoder { path: path.to_path_buf() }))
    }
}

struct MockDecoder {
    path: PathBuf,
}

impl FileDecoder for MockDecoder {
    fn path(&self) -> &Path {
        &self.path
    }
    fn format_version(&self) -> u64 {
        2
    }
}

struct MockFactory {
    files: FileMap,
    store: BufferStore,
    submissions: SubmissionLog,
}

impl DecompressorFactory for MockFactory {
    fn set_memory_limit_per_resource(&mut self, _bytes: u64) {}

    fn create(&mut self, decoder: Box<dyn FileDecoder>) -> PipelineResult<Box<dyn Decompressor>> {
        let sequence = self
            .files
            .lock()
            .get(decoder.path())
            .cloned()
            .ok_or_else(|| PipelineError::NotFound(format!("{}", decoder.path().display())))?;
        Ok(Box::new(MockDecompressor {
            mapper: MockMapper { sequence: sequence.clone() },
            sequence,
            store: self.store.clone(),
            submissions: self.submissions.clone(),
            resources: None,
            initialized: false,
        }))
    }
}

struct MockMapper {
    sequence: Arc<StoredSequence>,
}

impl FormatMapper for MockMapper {
    fn fetch_frame(&self, frame: i32) -> PipelineResult<Box<dyn FrameContainer>> {
        let stored = self.sequence.frames.get(&frame).cloned().ok_or_else(|| {
            PipelineError::OutOfBounds {
                index: frame,
                start: self.sequence.frame_range.start,
                end: self.sequence.frame_range.end,
            }
        })?;
        Ok(Box::new(MockFrameContainer { frame: stored, index: frame }))
    }

    fn fetch_frame_info(&self, frame: i32) -> PipelineResult<FrameInfo> {
        self.fetch_frame(frame).map(|container| container.info())
    }

    fn frame_range(&self) -> FrameRange {
        self.sequence.frame_range
    }

    fn sequence_info(&self) -> SequenceInfo {
        let mut channels: Vec<String> = Vec::new();
        let mut max_size = [0u32; 3];
        for frame in self.sequence.frames.values() {
            for channel in &frame.frame_info.channels {
                if !channels.contains(&channel.name) {
                    channels.push(channel.name.clone());
                }
            }
            let size = frame.frame_info.aabb.size();
            for axis in 0..3 {
                max_size[axis] = max_size[axis].max(size[axis] as u32);
            }
        }
        SequenceInfo { file_uuid: self.sequence.uuid, max_aabb_size: max_size, channels }
    }

    fn playback_info(&self) -> PlaybackInfo {
        PlaybackInfo {
            frame_count: self.sequence.frames.len() as u32,
            framerate_numerator: 24,
            framerate_denominator: 1,
            sequence_start_index: self.sequence.frame_range.start,
            sequence_index_increment: 1,
        }
    }

    fn metadata_by_key(&self, _key: &str) -> Option<String> {
        None
    }
}

struct MockFrameContainer {
    frame: Arc<StoredFrame>,
    index: i32,
}

impl FrameContainer for MockFrameContainer {
    fn info(&self) -> FrameInfo {
        self.frame.frame_info.clone()
    }

    fn metadata_by_key(&self, key: &str) -> Option<String> {
        if key == MOCK_FRAME_INDEX_KEY {
            return Some(self.index.to_string());
        }
        self.frame.metadata.get(key).cloned()
    }

    fn metadata_count(&self) -> usize {
        self.frame.metadata.len()
    }

    fn metadata_by_index(&self, index: usize) -> Option<(String, String)> {
        self.frame.metadata.iter().nth(index).map(|(k, v)| (k.clone(), v.clone()))
    }
}

struct MockDecompressor {
    mapper: MockMapper,
    sequence: Arc<StoredSequence>,
    store: BufferStore,
    submissions: SubmissionLog,
    resources: Option<DecompressorResources>,
    initialized: bool,
}

impl Decompressor for MockDecompressor {
    fn initialize(&mut self) -> PipelineResult<()> {
        self.initialized = true;
        Ok(())
    }

    fn resources_requirements(&self) -> ResourcesRequirements {
        let mut max_channel_blocks = 0u64;
        let mut max_spatial_blocks = 0u64;
        for frame in self.sequence.frames.values() {
            max_channel_blocks = max_channel_blocks.max(frame.channel_blocks.len() as u64);
            max_spatial_blocks = max_spatial_blocks.max(frame.spatial_blocks.len() as u64);
        }
        ResourcesRequirements {
            per_channel_block_data_size: max_channel_blocks * CHANNEL_BLOCK_BYTES,
            per_channel_block_data_stride: CHANNEL_BLOCK_BYTES as u32,
            per_channel_block_info_size: max_channel_blocks * 4,
            per_channel_block_info_stride: 4,
            per_spatial_block_info_size: max_spatial_blocks * SPATIAL_BLOCK_BYTES,
            per_spatial_block_info_stride: SPATIAL_BLOCK_BYTES as u32,
        }
    }

    fn register_resources(&mut self, resources: DecompressorResources) -> PipelineResult<()> {
        self.resources = Some(resources);
        Ok(())
    }

    fn format_mapper(&self) -> &dyn FormatMapper {
        &self.mapper
    }

    fn max_spatial_blocks_per_submit(&self) -> u32 {
        self.sequence.max_spatial_blocks_per_submit
    }

    fn decompress_frame(
        &mut self,
        frame: &dyn FrameContainer,
        desc: &DecompressFrameDesc,
    ) -> PipelineResult<DecompressedFrameFeedback> {
        assert!(self.initialized, "decompress before initialize");
        let resources = self
            .resources
            .ok_or_else(|| PipelineError::Internal("resources not registered".into()))?;

        let index: i32 = frame
            .metadata_by_key(MOCK_FRAME_INDEX_KEY)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| PipelineError::Internal("foreign frame container".into()))?;
        let stored = self
            .sequence
            .frames
            .get(&index)
            .ok_or_else(|| PipelineError::Internal(format!("frame {} not stored", index)))?;

        self.submissions.lock().push(*desc);

        let first = desc.first_spatial_block_index as usize;
        let count = desc.spatial_blocks_count as usize;
        let chunk_spatial = &stored.spatial_blocks[first..first + count];

        let first_channel_block = chunk_spatial[0].channel_blocks_offset;
        let channel_block_count: u32 =
            chunk_spatial.iter().map(|s| s.channel_count).sum();

        let mut store = self.store.lock();

        let spatial_bytes: &[u8] = bytemuck::cast_slice(chunk_spatial);
        let spatial_buffer = store
            .get_mut(&resources.per_spatial_block_info)
            .ok_or_else(|| PipelineError::Internal("spatial buffer missing".into()))?;
        spatial_buffer[..spatial_bytes.len()].copy_from_slice(spatial_bytes);

        let blocks = &stored.channel_blocks
            [first_channel_block as usize..(first_channel_block + channel_block_count) as usize];
        let block_bytes: &[u8] = bytemuck::cast_slice(blocks);
        let data_buffer = store
            .get_mut(&resources.per_channel_block_data)
            .ok_or_else(|| PipelineError::Internal("data buffer missing".into()))?;
        data_buffer[..block_bytes.len()].copy_from_slice(block_bytes);

        Ok(DecompressedFrameFeedback {
            first_channel_block_index: first_channel_block,
            channel_blocks_count: channel_block_count,
        })
    }
}

// ---------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------

pub struct MockWorld {
    pub store: BufferStore,
    pub engine: Arc<MockEngine>,
    pub rhi_factory: Arc<MockRhiFactory>,
}

pub fn mock_world() -> MockWorld {
    let store: BufferStore = Arc::new(Mutex::new(HashMap::new()));
    let engine = Arc::new(MockEngine::new(store.clone()));
    let rhi_factory = Arc::new(MockRhiFactory::new(store.clone()));
    MockWorld { store, engine, rhi_factory }
}
