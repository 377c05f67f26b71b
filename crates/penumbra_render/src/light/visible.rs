//! Visible Light Description
//!
//! The per-frame light record handed over by the visibility system. It is
//! read-only to the lighting and shadow code.

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::culling::Bounds;

/// Light type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LightType {
    /// Infinitely distant light (sun)
    Directional,
    /// Omnidirectional light
    Point,
    /// Cone light
    Spot,
}

/// Shadow casting mode of a light
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LightShadows {
    /// No shadows
    #[default]
    None,
    /// Unfiltered shadows
    Hard,
    /// Filtered shadows
    Soft,
}

/// How a light contributes to baked lighting
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LightmapBakeType {
    /// Fully dynamic
    #[default]
    Realtime,
    /// Fully baked
    Baked,
    /// Baked indirect, dynamic direct
    Mixed,
}

/// Mixed lighting mode of a baked light
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MixedLightingMode {
    /// Only indirect light is baked
    #[default]
    IndirectOnly,
    /// Static shadows baked into lightmaps
    Subtractive,
    /// Static occlusion baked into a shadowmask channel
    Shadowmask,
}

/// Result of the light baking process
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightBakingOutput {
    /// Bake type
    pub bake_type: LightmapBakeType,
    /// Mixed lighting mode (only meaningful for mixed lights)
    pub mixed_mode: MixedLightingMode,
    /// Shadowmask channel (0-3), -1 if none
    pub occlusion_mask_channel: i32,
}

impl Default for LightBakingOutput {
    fn default() -> Self {
        Self {
            bake_type: LightmapBakeType::Realtime,
            mixed_mode: MixedLightingMode::IndirectOnly,
            occlusion_mask_channel: -1,
        }
    }
}

impl LightBakingOutput {
    /// Mixed light baked into the given shadowmask channel
    pub fn shadowmask(channel: i32) -> Self {
        Self {
            bake_type: LightmapBakeType::Mixed,
            mixed_mode: MixedLightingMode::Shadowmask,
            occlusion_mask_channel: channel,
        }
    }

    /// Shadowmask channel, if the light uses one
    pub fn shadow_mask_channel(&self) -> Option<i32> {
        let uses_mask = self.bake_type == LightmapBakeType::Mixed
            && self.mixed_mode == MixedLightingMode::Shadowmask;
        uses_mask.then_some(self.occlusion_mask_channel)
    }
}

/// A light that survived visibility culling this frame
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VisibleLight {
    /// Light type
    pub light_type: LightType,

    /// Local-to-world transform; the light shines along its +Z axis
    pub local_to_world: Mat4,

    /// Linear color with intensity already applied
    pub final_color: Vec3,

    /// Range (point and spot)
    pub range: f32,

    /// Outer cone angle in degrees (full angle)
    pub spot_angle: f32,

    /// Inner cone angle in degrees (full angle)
    pub inner_spot_angle: f32,

    /// Shadow mode
    pub shadows: LightShadows,

    /// Shadow strength (0 = no shadow, 1 = full shadow)
    pub shadow_strength: f32,

    /// Slope-scaled depth bias
    pub shadow_bias: f32,

    /// Normal offset bias
    pub shadow_normal_bias: f32,

    /// Shadow near plane (near plane offset for directional lights)
    pub shadow_near_plane: f32,

    /// Baked lighting output
    pub baking: LightBakingOutput,

    /// Bounds of the shadow casters affecting this light, if any are visible
    pub caster_bounds: Option<Bounds>,
}

impl VisibleLight {
    fn new(light_type: LightType, local_to_world: Mat4, final_color: Vec3) -> Self {
        Self {
            light_type,
            local_to_world,
            final_color,
            range: 10.0,
            spot_angle: 30.0,
            inner_spot_angle: 21.8,
            shadows: LightShadows::None,
            shadow_strength: 1.0,
            shadow_bias: 0.05,
            shadow_normal_bias: 0.4,
            shadow_near_plane: 0.2,
            baking: LightBakingOutput::default(),
            caster_bounds: None,
        }
    }

    /// Directional light shining along `direction`
    pub fn directional(direction: Vec3, color: Vec3) -> Self {
        let rotation = Quat::from_rotation_arc(Vec3::Z, direction.normalize_or_zero());
        Self::new(LightType::Directional, Mat4::from_quat(rotation), color)
    }

    /// Point light at `position`
    pub fn point(position: Vec3, range: f32, color: Vec3) -> Self {
        Self {
            range,
            ..Self::new(LightType::Point, Mat4::from_translation(position), color)
        }
    }

    /// Spot light at `position` shining along `direction`
    pub fn spot(
        position: Vec3,
        direction: Vec3,
        range: f32,
        inner_angle: f32,
        outer_angle: f32,
        color: Vec3,
    ) -> Self {
        let rotation = Quat::from_rotation_arc(Vec3::Z, direction.normalize_or_zero());
        Self {
            range,
            spot_angle: outer_angle,
            inner_spot_angle: inner_angle,
            ..Self::new(
                LightType::Spot,
                Mat4::from_rotation_translation(rotation, position),
                color,
            )
        }
    }

    /// Enable soft shadows with the given strength
    pub fn with_shadows(mut self, strength: f32) -> Self {
        self.shadows = LightShadows::Soft;
        self.shadow_strength = strength;
        self
    }

    /// Set depth and normal bias
    pub fn with_bias(mut self, bias: f32, normal_bias: f32) -> Self {
        self.shadow_bias = bias;
        self.shadow_normal_bias = normal_bias;
        self
    }

    /// Set shadow caster bounds
    pub fn with_caster_bounds(mut self, bounds: Bounds) -> Self {
        self.caster_bounds = Some(bounds);
        self
    }

    /// Set baking output
    pub fn with_baking(mut self, baking: LightBakingOutput) -> Self {
        self.baking = baking;
        self
    }

    /// Whether the light asks for a shadow map at all
    pub fn wants_shadows(&self) -> bool {
        self.shadows != LightShadows::None && self.shadow_strength > 0.0
    }

    /// World position (translation of the transform)
    pub fn position(&self) -> Vec3 {
        self.local_to_world.w_axis.truncate()
    }

    /// Direction the light shines in (+Z axis of the transform)
    pub fn forward(&self) -> Vec3 {
        self.local_to_world.z_axis.truncate().normalize_or_zero()
    }
}
