//! In-memory sparse voxel grids: the encoder's input and the decoder's
//! output.

pub mod resample;
pub mod sparse_grid;

pub use resample::{index_space_relative_transform, resample_to_index_space};
pub use sparse_grid::{BlockCoord, Leaf, SparseGrid, Tile, VoxelType};
