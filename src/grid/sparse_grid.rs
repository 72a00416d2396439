//! Sparse voxel grid with block-aligned leaves and constant active tiles.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::{SPARSE_BLOCK_SIZE, SPARSE_BLOCK_VOXEL_COUNT};
use crate::math::{Aabb, Transform};
use crate::voxel::ActiveMask;

/// Position of a sparse block (leaf) in block coordinates.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BlockCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockCoord {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Block containing the given voxel.
    pub fn from_voxel(x: i32, y: i32, z: i32) -> Self {
        Self {
            x: x.div_euclid(SPARSE_BLOCK_SIZE),
            y: y.div_euclid(SPARSE_BLOCK_SIZE),
            z: z.div_euclid(SPARSE_BLOCK_SIZE),
        }
    }

    /// Origin voxel of this block.
    pub fn to_voxel_origin(&self) -> [i32; 3] {
        [
            self.x * SPARSE_BLOCK_SIZE,
            self.y * SPARSE_BLOCK_SIZE,
            self.z * SPARSE_BLOCK_SIZE,
        ]
    }

    /// Block-space box covering exactly this block.
    pub fn to_aabb(&self) -> Aabb {
        Aabb::new(self.x, self.y, self.z, self.x + 1, self.y + 1, self.z + 1)
    }
}

/// Linear index of a voxel inside its block; x varies fastest.
pub fn local_voxel_index(x: i32, y: i32, z: i32) -> usize {
    let lx = x.rem_euclid(SPARSE_BLOCK_SIZE) as usize;
    let ly = y.rem_euclid(SPARSE_BLOCK_SIZE) as usize;
    let lz = z.rem_euclid(SPARSE_BLOCK_SIZE) as usize;
    lx + ly * SPARSE_BLOCK_SIZE as usize
        + lz * (SPARSE_BLOCK_SIZE * SPARSE_BLOCK_SIZE) as usize
}

/// Per-voxel value layout of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoxelType {
    Float1,
    Float3,
}

impl VoxelType {
    pub fn component_count(&self) -> usize {
        match self {
            VoxelType::Float1 => 1,
            VoxelType::Float3 => 3,
        }
    }
}

/// One allocated block of voxel data, components interleaved per voxel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leaf {
    data: Vec<f32>,
    active: ActiveMask,
}

impl Leaf {
    pub fn zeroed(voxel_type: VoxelType) -> Self {
        Self {
            data: vec![0.0; SPARSE_BLOCK_VOXEL_COUNT * voxel_type.component_count()],
            active: ActiveMask::empty(),
        }
    }

    /// Leaf with every voxel active; used when assembling decoded blocks.
    pub fn dense(voxel_type: VoxelType) -> Self {
        Self {
            data: vec![0.0; SPARSE_BLOCK_VOXEL_COUNT * voxel_type.component_count()],
            active: ActiveMask::full(),
        }
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn active(&self) -> &ActiveMask {
        &self.active
    }

    pub fn component(&self, index: usize, component: usize, component_count: usize) -> f32 {
        self.data[index * component_count + component]
    }
}

/// Constant-value region covering whole blocks; expanded by
/// [`SparseGrid::voxelize_active_tiles`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tile {
    pub origin: BlockCoord,
    /// Extent in blocks along each axis.
    pub extent: [u32; 3],
    /// Constant value; scalar grids use only the first component.
    pub value: [f32; 3],
}

/// Sparse scalar or vector grid over an unbounded voxel lattice.
///
/// Leaves are keyed by block coordinate; iteration order is the
/// coordinate order, which keeps channel assignment deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseGrid {
    name: String,
    voxel_type: VoxelType,
    transform: Transform,
    leaves: BTreeMap<BlockCoord, Leaf>,
    tiles: Vec<Tile>,
}

impl SparseGrid {
    pub fn new(name: impl Into<String>, voxel_type: VoxelType) -> Self {
        Self {
            name: name.into(),
            voxel_type,
            transform: Transform::IDENTITY,
            leaves: BTreeMap::new(),
            tiles: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn voxel_type(&self) -> VoxelType {
        self.voxel_type
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn leaves(&self) -> impl Iterator<Item = (&BlockCoord, &Leaf)> {
        self.leaves.iter()
    }

    pub fn leaf_at(&self, coord: &BlockCoord) -> Option<&Leaf> {
        self.leaves.get(coord)
    }

    /// Inserts a fully built leaf, replacing any existing one.
    pub fn add_leaf(&mut self, coord: BlockCoord, leaf: Leaf) {
        debug_assert_eq!(
            leaf.data.len(),
            SPARSE_BLOCK_VOXEL_COUNT * self.voxel_type.component_count()
        );
        self.leaves.insert(coord, leaf);
    }

    pub fn add_tile(&mut self, tile: Tile) {
        self.tiles.push(tile);
    }

    pub fn active_voxel_count(&self) -> usize {
        self.leaves.values().map(|l| l.active.count()).sum()
    }

    pub fn is_active(&self, x: i32, y: i32, z: i32) -> bool {
        self.leaves
            .get(&BlockCoord::from_voxel(x, y, z))
            .map(|leaf| leaf.active.get(local_voxel_index(x, y, z)))
            .unwrap_or(false)
    }

    /// Single component read; absent or inactive voxels read as zero.
    pub fn voxel_component(&self, x: i32, y: i32, z: i32, component: usize) -> f32 {
        let comps = self.voxel_type.component_count();
        debug_assert!(component < comps);
        self.leaves
            .get(&BlockCoord::from_voxel(x, y, z))
            .map(|leaf| leaf.component(local_voxel_index(x, y, z), component, comps))
            .unwrap_or(0.0)
    }

    pub fn set_scalar(&mut self, x: i32, y: i32, z: i32, value: f32) {
        debug_assert_eq!(self.voxel_type, VoxelType::Float1);
        self.set_components(x, y, z, &[value]);
    }

    pub fn set_vec3(&mut self, x: i32, y: i32, z: i32, value: [f32; 3]) {
        debug_assert_eq!(self.voxel_type, VoxelType::Float3);
        self.set_components(x, y, z, &value);
    }

    fn set_components(&mut self, x: i32, y: i32, z: i32, value: &[f32]) {
        let comps = self.voxel_type.component_count();
        debug_assert_eq!(value.len(), comps);
        let voxel_type = self.voxel_type;
        let leaf = self
            .leaves
            .entry(BlockCoord::from_voxel(x, y, z))
            .or_insert_with(|| Leaf::zeroed(voxel_type));
        let index = local_voxel_index(x, y, z);
        leaf.data[index * comps..index * comps + comps].copy_from_slice(value);
        leaf.active.set(index);
    }

    /// Expands every constant tile into dense leaves so that all active
    /// regions are leaf-backed. Existing leaf voxels win over tiles.
    pub fn voxelize_active_tiles(&mut self) {
        let tiles = std::mem::take(&mut self.tiles);
        let comps = self.voxel_type.component_count();
        for tile in tiles {
            for bz in 0..tile.extent[2] as i32 {
                for by in 0..tile.extent[1] as i32 {
                    for bx in 0..tile.extent[0] as i32 {
                        let coord = BlockCoord::new(
                            tile.origin.x + bx,
                            tile.origin.y + by,
                            tile.origin.z + bz,
                        );
                        let voxel_type = self.voxel_type;
                        let leaf = self
                            .leaves
                            .entry(coord)
                            .or_insert_with(|| Leaf::zeroed(voxel_type));
                        for index in 0..SPARSE_BLOCK_VOXEL_COUNT {
                            if leaf.active.get(index) {
                                continue;
                            }
                            leaf.data[index * comps..index * comps + comps]
                                .copy_from_slice(&tile.value[..comps]);
                            leaf.active.set(index);
                        }
                    }
                }
            }
        }
    }

    /// Union of leaf bounds in block coordinates.
    pub fn block_aabb(&self) -> Aabb {
        let mut aabb = Aabb::default();
        for coord in self.leaves.keys() {
            aabb = aabb.union(&coord.to_aabb());
        }
        aabb
    }

    /// Trilinear sample of one component at a fractional index-space
    /// position; box-sampler semantics, absent voxels contribute zero.
    pub fn sample_component(&self, pos: [f32; 3], component: usize) -> f32 {
        let base = [
            pos[0].floor() as i32,
            pos[1].floor() as i32,
            pos[2].floor() as i32,
        ];
        let frac = [
            pos[0] - base[0] as f32,
            pos[1] - base[1] as f32,
            pos[2] - base[2] as f32,
        ];
        let mut acc = 0.0;
        for dz in 0..2 {
            for dy in 0..2 {
                for dx in 0..2 {
                    let w = (if dx == 0 { 1.0 - frac[0] } else { frac[0] })
                        * (if dy == 0 { 1.0 - frac[1] } else { frac[1] })
                        * (if dz == 0 { 1.0 - frac[2] } else { frac[2] });
                    if w == 0.0 {
                        continue;
                    }
                    acc += w
                        * self.voxel_component(
                            base[0] + dx,
                            base[1] + dy,
                            base[2] + dz,
                            component,
                        );
                }
            }
        }
        acc
    }
}
