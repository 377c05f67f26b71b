//! Shadow Data Structures
//!
//! Reservation records and GPU-facing shadow data. Everything the shading
//! stage reads is `Pod`/`Zeroable` for direct upload.

use serde::{Deserialize, Serialize};

use super::atlas::AtlasBinding;
use super::settings::MAX_CASCADES;
use crate::keywords::ShaderKeywords;

/// Maximum shadowed directional lights per frame
pub const MAX_SHADOWED_DIRECTIONAL_LIGHTS: usize = 4;

/// Maximum point/spot shadow tiles per frame (a point light uses 6)
pub const MAX_SHADOWED_OTHER_LIGHTS: usize = 16;

/// Maximum directional cascade tiles per frame
pub const MAX_DIRECTIONAL_SHADOW_TILES: usize = MAX_SHADOWED_DIRECTIONAL_LIGHTS * MAX_CASCADES;

/// Tiles a point light occupies (one per cube face)
pub const POINT_LIGHT_TILES: usize = 6;

/// Per-light shadow parameters returned by a reservation
///
/// `strength > 0` means a shadow map was reserved. A negative strength
/// means "no map this frame, fade to unshadowed"; zero strength with mask
/// channel -1 means the light has no shadow involvement at all.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShadowData {
    /// Shadow strength
    pub strength: f32,

    /// First cascade tile (directional) or first atlas slot (point/spot)
    pub tile_index: f32,

    /// Normal bias (directional) or 1.0 for point lights, 0.0 for spots
    pub bias_or_point: f32,

    /// Shadowmask channel, -1 if none
    pub mask_channel: f32,
}

impl Default for ShadowData {
    fn default() -> Self {
        Self::NONE
    }
}

impl ShadowData {
    /// Light takes no part in shadowing
    pub const NONE: Self = Self {
        strength: 0.0,
        tile_index: 0.0,
        bias_or_point: 0.0,
        mask_channel: -1.0,
    };

    /// Light wanted a shadow map but did not get one
    pub fn faded(strength: f32, mask_channel: f32) -> Self {
        Self {
            strength: -strength,
            tile_index: 0.0,
            bias_or_point: 0.0,
            mask_channel,
        }
    }

    /// Directional light with cascades starting at `first_tile`
    pub fn directional(strength: f32, first_tile: usize, normal_bias: f32, mask_channel: f32) -> Self {
        Self {
            strength,
            tile_index: first_tile as f32,
            bias_or_point: normal_bias,
            mask_channel,
        }
    }

    /// Point or spot light starting at atlas slot `slot`
    pub fn other(strength: f32, slot: usize, is_point: bool, mask_channel: f32) -> Self {
        Self {
            strength,
            tile_index: slot as f32,
            bias_or_point: if is_point { 1.0 } else { 0.0 },
            mask_channel,
        }
    }

    /// Whether a shadow map was reserved
    pub fn has_shadow_map(&self) -> bool {
        self.strength > 0.0
    }

    /// Whether the light falls back to unshadowed lighting
    pub fn is_faded(&self) -> bool {
        self.strength < 0.0
    }

    /// Whether the light uses a baked shadowmask channel
    pub fn has_mask_channel(&self) -> bool {
        self.mask_channel >= 0.0
    }

    /// As a shader vector
    pub fn to_array(self) -> [f32; 4] {
        [self.strength, self.tile_index, self.bias_or_point, self.mask_channel]
    }
}

/// A directional light that owns cascade tiles this frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReservedDirectionalLight {
    /// Index into the frame's visible lights
    pub visible_index: usize,

    /// Slope-scaled depth bias used while drawing casters
    pub slope_scale_bias: f32,

    /// How far the shadow near plane is pulled back
    pub near_plane_offset: f32,
}

/// A point or spot light that owns other-atlas slots this frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReservedOtherLight {
    /// Index into the frame's visible lights
    pub visible_index: usize,

    /// Slope-scaled depth bias used while drawing casters
    pub slope_scale_bias: f32,

    /// Normal bias, scaled by filter size into the tile bias
    pub normal_bias: f32,

    /// Point light (6 slots) or spot light (1 slot)
    pub is_point: bool,
}

impl ReservedOtherLight {
    /// Atlas slots this light occupies
    pub fn slot_count(&self) -> usize {
        if self.is_point {
            POINT_LIGHT_TILES
        } else {
            1
        }
    }
}

/// Global shadow scalars
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShadowUniforms {
    /// Active cascades, 0 without directional shadows
    pub cascade_count: i32,

    /// Padding
    pub _pad: [i32; 3],

    /// (1 / max distance, 1 / distance fade, 1 / (1 - f^2), 0) with f = 1 - cascade fade
    pub distance_fade: [f32; 4],

    /// (directional size, 1 / size, other size, 1 / size)
    pub atlas_sizes: [f32; 4],
}

/// Everything the shading stage reads from the shadow system
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShadowFrameData {
    /// Cascade culling spheres (xyz center, w shrunk squared radius)
    pub cascade_culling_spheres: [[f32; 4]; MAX_CASCADES],

    /// Cascade fade data (1 / shrunk squared radius, filter diagonal, 0, 0)
    pub cascade_data: [[f32; 4]; MAX_CASCADES],

    /// World to atlas matrices, one per cascade tile
    pub directional_matrices: [[[f32; 4]; 4]; MAX_DIRECTIONAL_SHADOW_TILES],

    /// World to atlas matrices, one per point face or spot
    pub other_matrices: [[[f32; 4]; 4]; MAX_SHADOWED_OTHER_LIGHTS],

    /// Tile bounds and bias (x min, y min, scale, bias) per other tile
    pub other_tiles: [[f32; 4]; MAX_SHADOWED_OTHER_LIGHTS],

    /// Global scalars
    pub uniforms: ShadowUniforms,

    /// Shadow keywords (filter tiers, cascade blend, shadowmask)
    pub keywords: ShaderKeywords,

    /// What the directional atlas sampler is bound to
    pub directional_atlas: AtlasBinding,

    /// What the other atlas sampler is bound to
    pub other_atlas: AtlasBinding,
}

impl ShadowFrameData {
    /// Cascade culling spheres as bytes
    pub fn cascade_culling_spheres_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.cascade_culling_spheres)
    }

    /// Cascade fade data as bytes
    pub fn cascade_data_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.cascade_data)
    }

    /// Directional matrices as bytes
    pub fn directional_matrices_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.directional_matrices)
    }

    /// Other matrices as bytes
    pub fn other_matrices_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.other_matrices)
    }

    /// Other tile data as bytes
    pub fn other_tiles_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.other_tiles)
    }

    /// Uniforms as bytes
    pub fn uniforms_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(&self.uniforms)
    }
}

/// Shadow allocation statistics for the current frame
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShadowStats {
    /// Directional lights that got cascades
    pub reserved_directional: u32,

    /// Other-atlas slots in use
    pub reserved_other_slots: u32,

    /// Requests degraded by a shadow atlas capacity limit
    ///
    /// Lights dropped by the lighting arrays are counted by the collector.
    pub rejected_capacity: u32,

    /// Requests degraded because nothing casts a shadow
    pub rejected_no_casters: u32,

    /// Shadow draws issued
    pub tiles_rendered: u32,
}
