//! Shadow Atlas Layout
//!
//! Both shadow atlases are square textures split into an even grid of
//! square tiles. A tile holds one shadow view: a cascade, a spot light, or
//! one cube face of a point light.
//!
//! # Tile Layout
//!
//! The grid is 1x1, 2x2 or 4x4, whichever is the smallest that fits the
//! frame's tile count. Tile `i` sits at column `i % split`, row `i / split`.

use glam::{Mat4, Vec2, Vec4};
use serde::{Deserialize, Serialize};

/// Which shadow atlas
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AtlasKind {
    /// Directional cascades
    Directional,
    /// Point and spot lights
    Other,
}

/// Platform clip-space depth direction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepthConvention {
    /// Near maps to 0, far to 1
    #[default]
    Standard,
    /// Near maps to 1, far to 0
    Reversed,
}

/// What a shadow atlas sampler is bound to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AtlasBinding {
    /// Nothing bound yet this frame
    #[default]
    Unbound,
    /// A real atlas texture of the given edge size
    Texture {
        /// Edge size in texels
        size: u32,
    },
    /// Shares another atlas' texture
    Alias(AtlasKind),
}

/// Request for a frame-lifetime shadow atlas texture
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtlasDescriptor {
    /// Which atlas
    pub kind: AtlasKind,
    /// Edge size in texels
    pub size: u32,
    /// Depth buffer bits
    pub depth_bits: u32,
}

impl AtlasDescriptor {
    /// 32-bit depth atlas of the given size
    pub fn new(kind: AtlasKind, size: u32) -> Self {
        Self { kind, size, depth_bits: 32 }
    }

    /// 1x1 stand-in that keeps the sampler binding valid
    pub fn placeholder(kind: AtlasKind) -> Self {
        Self::new(kind, 1)
    }
}

/// Pixel rectangle inside an atlas
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Left edge
    pub x: f32,
    /// Bottom edge
    pub y: f32,
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
}

/// Grid split for a tile count: the smallest of 1, 2, 4 whose square fits
pub fn split_for_tiles(tiles: usize) -> u32 {
    if tiles <= 1 {
        1
    } else if tiles <= 4 {
        2
    } else {
        4
    }
}

/// Tile grid of one atlas for the current frame
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtlasLayout {
    /// Atlas edge in texels
    pub size: u32,
    /// Tiles per row and column
    pub split: u32,
    /// Tile edge in texels
    pub tile_size: u32,
}

impl AtlasLayout {
    /// Layout fitting `tiles` tiles into an atlas of `size`
    pub fn new(size: u32, tiles: usize) -> Self {
        let split = split_for_tiles(tiles);
        Self {
            size,
            split,
            tile_size: size / split,
        }
    }

    /// Tile edge as a fraction of the atlas
    pub fn tile_scale(&self) -> f32 {
        1.0 / self.split as f32
    }

    /// Grid cell of a tile
    pub fn tile_offset(&self, index: usize) -> Vec2 {
        let split = self.split as usize;
        Vec2::new((index % split) as f32, (index / split) as f32)
    }

    /// Pixel rectangle of a tile
    pub fn viewport(&self, index: usize) -> Viewport {
        let offset = self.tile_offset(index);
        let tile = self.tile_size as f32;
        Viewport {
            x: offset.x * tile,
            y: offset.y * tile,
            width: tile,
            height: tile,
        }
    }
}

/// Remap a world to clip matrix into one tile of the atlas
///
/// Clip XY in [-1, 1] lands in the tile's UV rectangle and clip depth in
/// [-1, 1] becomes [0, 1] (reversed when the platform uses reversed Z).
pub fn convert_to_atlas_matrix(m: Mat4, offset: Vec2, scale: f32, depth: DepthConvention) -> Mat4 {
    // Rows of m as columns of the transpose
    let mut rows = m.transpose();
    if depth == DepthConvention::Reversed {
        rows.z_axis = -rows.z_axis;
    }

    let w: Vec4 = rows.w_axis;
    rows.x_axis = (0.5 * (rows.x_axis + w) + offset.x * w) * scale;
    rows.y_axis = (0.5 * (rows.y_axis + w) + offset.y * w) * scale;
    rows.z_axis = 0.5 * (rows.z_axis + w);

    rows.transpose()
}

/// Sampling bounds and bias of one other-atlas tile
///
/// The bounds are pulled in by half a texel so filtering never reads from
/// a neighbouring tile.
pub fn other_tile_data(offset: Vec2, scale: f32, bias: f32, atlas_size: u32) -> [f32; 4] {
    let border = 0.5 / atlas_size as f32;
    [
        offset.x * scale + border,
        offset.y * scale + border,
        scale - border - border,
        bias,
    ]
}
