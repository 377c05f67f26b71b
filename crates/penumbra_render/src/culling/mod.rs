//! Shadow Culling Interface
//!
//! The visibility system owns caster bounds and knows how to fit a shadow
//! view around them. The allocator only talks to it through
//! [`ShadowCulling`], so engines plug in their own culling while tests use
//! [`SceneShadowCulling`].

use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

mod scene;

pub use scene::{SceneShadowCulling, ShadowCamera};

/// Axis-aligned bounds
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Center
    pub center: Vec3,
    /// Half size on each axis
    pub extents: Vec3,
}

impl Bounds {
    /// Create bounds from center and half size
    pub fn new(center: Vec3, extents: Vec3) -> Self {
        Self { center, extents }
    }

    /// Create bounds from min/max corners
    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        Self {
            center: (min + max) * 0.5,
            extents: (max - min) * 0.5,
        }
    }

    /// Minimum corner
    pub fn min(&self) -> Vec3 {
        self.center - self.extents
    }

    /// Maximum corner
    pub fn max(&self) -> Vec3 {
        self.center + self.extents
    }
}

/// View and projection for one shadow-casting view
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowViewProjection {
    /// World to light-view transform
    pub view: Mat4,
    /// Light-view to clip transform (clip depth in [-1, 1])
    pub projection: Mat4,
}

/// View, projection and culling sphere for one directional cascade
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionalShadowSplit {
    /// World to light-view transform
    pub view: Mat4,
    /// Light-view to clip transform (clip depth in [-1, 1])
    pub projection: Mat4,
    /// Cascade culling sphere (xyz center, w radius)
    pub culling_sphere: Vec4,
}

/// Cubemap face rendered for a point light
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CubemapFace {
    /// +X
    PositiveX,
    /// -X
    NegativeX,
    /// +Y
    PositiveY,
    /// -Y
    NegativeY,
    /// +Z
    PositiveZ,
    /// -Z
    NegativeZ,
}

impl CubemapFace {
    /// All faces in tile order
    pub const ALL: [Self; 6] = [
        Self::PositiveX,
        Self::NegativeX,
        Self::PositiveY,
        Self::NegativeY,
        Self::PositiveZ,
        Self::NegativeZ,
    ];

    /// Viewing direction and up vector for this face
    pub fn basis(self) -> (Vec3, Vec3) {
        match self {
            Self::PositiveX => (Vec3::X, Vec3::NEG_Y),
            Self::NegativeX => (Vec3::NEG_X, Vec3::NEG_Y),
            Self::PositiveY => (Vec3::Y, Vec3::Z),
            Self::NegativeY => (Vec3::NEG_Y, Vec3::NEG_Z),
            Self::PositiveZ => (Vec3::Z, Vec3::NEG_Y),
            Self::NegativeZ => (Vec3::NEG_Z, Vec3::NEG_Y),
        }
    }
}

/// Culling collaborator queried during reservation and rendering
///
/// Light indices are indices into the frame's visible-light list.
pub trait ShadowCulling {
    /// Bounds of the visible shadow casters for a light, `None` if nothing
    /// casts a shadow for it this frame
    fn caster_bounds(&self, visible_index: usize) -> Option<Bounds>;

    /// View, projection and culling sphere of one directional cascade
    #[allow(clippy::too_many_arguments)]
    fn compute_directional_shadow_matrices(
        &self,
        visible_index: usize,
        cascade_index: usize,
        cascade_count: usize,
        cascade_ratios: Vec3,
        tile_size: u32,
        near_plane_offset: f32,
    ) -> DirectionalShadowSplit;

    /// View and projection of a spot light
    fn compute_spot_shadow_matrices(&self, visible_index: usize) -> ShadowViewProjection;

    /// View and projection of one point light cube face, widened by
    /// `fov_bias` degrees
    fn compute_point_shadow_matrices(
        &self,
        visible_index: usize,
        face: CubemapFace,
        fov_bias: f32,
    ) -> ShadowViewProjection;

    /// Length of the per-object light index map (visible plus any extra
    /// lights the culling system tracks); 0 means "visible count"
    fn light_index_map_len(&self) -> usize {
        0
    }
}
