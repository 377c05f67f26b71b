//! Light Data Collection
//!
//! Packs the frame's visible lights into the shading stage's light arrays
//! and asks the shadow allocator for each light's shadow data on the way.
//!
//! # Capacity
//!
//! - Directional lights: [`MAX_DIRECTIONAL_LIGHTS`]; the excess is dropped
//!   from lighting with a warning.
//! - Point and spot lights: [`MAX_OTHER_LIGHTS`]; the excess is dropped.
//!
//! These lighting caps are separate from the (smaller) shadow caps. A light
//! can be lit without a shadow map, but a dropped light never reserves one.

use glam::Vec4;
use serde::{Deserialize, Serialize};

use super::visible::{LightType, VisibleLight};
use crate::culling::ShadowCulling;
use crate::keywords::ShaderKeywords;
use crate::shadow::{ShadowAllocator, ShadowData};

/// Maximum lit directional lights
pub const MAX_DIRECTIONAL_LIGHTS: usize = 4;

/// Maximum lit point and spot lights
pub const MAX_OTHER_LIGHTS: usize = 64;

/// GPU-ready directional light
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuDirectionalLight {
    /// Linear color with intensity applied (w unused)
    pub color: [f32; 4],
    /// Direction towards the light (w unused)
    pub direction: [f32; 4],
    /// Shadow data from reservation
    pub shadow_data: [f32; 4],
}

impl GpuDirectionalLight {
    /// Size in bytes
    pub const SIZE: usize = core::mem::size_of::<Self>();

    /// Pack a directional light
    pub fn new(light: &VisibleLight, shadow: ShadowData) -> Self {
        Self {
            color: light.final_color.extend(0.0).to_array(),
            direction: toward_light(light),
            shadow_data: shadow.to_array(),
        }
    }
}

/// GPU-ready point or spot light
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuOtherLight {
    /// Linear color with intensity applied (w unused)
    pub color: [f32; 4],
    /// World position, w = 1 / range^2
    pub position: [f32; 4],
    /// Direction towards the light for spots, zero for points
    pub direction: [f32; 4],
    /// Spot falloff scale and offset (points use 0, 1)
    pub spot_angle: [f32; 4],
    /// Shadow data from reservation
    pub shadow_data: [f32; 4],
}

impl GpuOtherLight {
    /// Size in bytes
    pub const SIZE: usize = core::mem::size_of::<Self>();

    /// Pack a point light
    pub fn point(light: &VisibleLight, shadow: ShadowData) -> Self {
        Self {
            color: light.final_color.extend(0.0).to_array(),
            position: position_and_range(light),
            direction: [0.0; 4],
            spot_angle: [0.0, 1.0, 0.0, 0.0],
            shadow_data: shadow.to_array(),
        }
    }

    /// Pack a spot light
    pub fn spot(light: &VisibleLight, shadow: ShadowData) -> Self {
        let (scale, offset) = spot_falloff(light.inner_spot_angle, light.spot_angle);
        Self {
            color: light.final_color.extend(0.0).to_array(),
            position: position_and_range(light),
            direction: toward_light(light),
            spot_angle: [scale, offset, 0.0, 0.0],
            shadow_data: shadow.to_array(),
        }
    }
}

/// Negated +Z axis of the light transform
fn toward_light(light: &VisibleLight) -> [f32; 4] {
    let forward: Vec4 = light.local_to_world.z_axis;
    (-forward.truncate()).extend(0.0).to_array()
}

fn position_and_range(light: &VisibleLight) -> [f32; 4] {
    let inv_range_sq = 1.0 / (light.range * light.range).max(0.00001);
    light.position().extend(inv_range_sq).to_array()
}

/// Spot falloff `(scale, offset)` so that `saturate(dot * scale + offset)`
/// is 0 at the outer cone and 1 inside the inner cone. Angles are full cone
/// angles in degrees.
pub fn spot_falloff(inner_angle: f32, outer_angle: f32) -> (f32, f32) {
    let inner_cos = (0.5 * inner_angle).to_radians().cos();
    let outer_cos = (0.5 * outer_angle).to_radians().cos();
    let scale = 1.0 / (inner_cos - outer_cos).max(0.001);
    (scale, -outer_cos * scale)
}

/// Light collection statistics
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LightCollectorStats {
    /// Directional lights packed
    pub directional_count: u32,
    /// Point and spot lights packed
    pub other_count: u32,
    /// Lights over a lighting cap (dropped)
    pub overflow_count: u32,
}

/// Shading-stage light arrays for one frame
#[derive(Clone, Debug, Default)]
pub struct ShadingLightArrays {
    /// Packed directional lights
    pub directional: Vec<GpuDirectionalLight>,
    /// Packed point and spot lights
    pub other: Vec<GpuOtherLight>,
    /// Shadow data of every visible light, in visible order
    pub visible_shadow_data: Vec<ShadowData>,
    /// Visible index to other-light slot, -1 for directional or dropped
    /// lights; `None` without per-object lighting
    pub light_index_map: Option<Vec<i32>>,
    /// Lighting keywords
    pub keywords: ShaderKeywords,
    /// Statistics
    pub stats: LightCollectorStats,
}

impl ShadingLightArrays {
    fn with_capacity() -> Self {
        Self {
            directional: Vec::with_capacity(MAX_DIRECTIONAL_LIGHTS),
            other: Vec::with_capacity(MAX_OTHER_LIGHTS),
            ..Default::default()
        }
    }

    fn clear(&mut self) {
        self.directional.clear();
        self.other.clear();
        self.visible_shadow_data.clear();
        self.light_index_map = None;
        self.stats = LightCollectorStats::default();
    }

    /// Number of packed directional lights
    pub fn directional_count(&self) -> usize {
        self.directional.len()
    }

    /// Number of packed point and spot lights
    pub fn other_count(&self) -> usize {
        self.other.len()
    }

    /// Directional lights as bytes
    pub fn directional_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.directional)
    }

    /// Point and spot lights as bytes
    pub fn other_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.other)
    }

    /// Per-visible-light shadow data as bytes
    pub fn visible_shadow_data_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.visible_shadow_data)
    }

    /// Light index map as bytes (empty without per-object lighting)
    pub fn light_index_map_bytes(&self) -> &[u8] {
        match self.light_index_map.as_deref() {
            Some(map) => bytemuck::cast_slice(map),
            None => &[],
        }
    }
}

/// Collects visible lights into [`ShadingLightArrays`]
#[derive(Clone, Debug)]
pub struct LightDataCollector {
    arrays: ShadingLightArrays,
}

impl Default for LightDataCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl LightDataCollector {
    /// Create a collector
    pub fn new() -> Self {
        Self {
            arrays: ShadingLightArrays::with_capacity(),
        }
    }

    /// Pack this frame's lights, reserving shadows in visible order
    ///
    /// The allocator must already be set up for the frame.
    pub fn collect(
        &mut self,
        lights: &[VisibleLight],
        culling: &dyn ShadowCulling,
        allocator: &mut ShadowAllocator,
        use_lights_per_object: bool,
    ) -> &ShadingLightArrays {
        let arrays = &mut self.arrays;
        arrays.clear();

        let mut index_map = use_lights_per_object.then(|| Vec::with_capacity(lights.len()));

        for (visible_index, light) in lights.iter().enumerate() {
            let mut other_slot = None;

            let shadow = match light.light_type {
                LightType::Directional if arrays.directional.len() < MAX_DIRECTIONAL_LIGHTS => {
                    let shadow = allocator.reserve(light, visible_index, culling);
                    arrays.directional.push(GpuDirectionalLight::new(light, shadow));
                    arrays.stats.directional_count += 1;
                    shadow
                }
                LightType::Directional => {
                    log::warn!(
                        "Directional light {} dropped: only {} directional lights are supported",
                        visible_index,
                        MAX_DIRECTIONAL_LIGHTS
                    );
                    arrays.stats.overflow_count += 1;
                    allocator.degraded(light, MAX_DIRECTIONAL_LIGHTS)
                }
                LightType::Point | LightType::Spot if arrays.other.len() < MAX_OTHER_LIGHTS => {
                    let shadow = allocator.reserve(light, visible_index, culling);
                    other_slot = Some(arrays.other.len());
                    arrays.other.push(if light.light_type == LightType::Point {
                        GpuOtherLight::point(light, shadow)
                    } else {
                        GpuOtherLight::spot(light, shadow)
                    });
                    arrays.stats.other_count += 1;
                    shadow
                }
                LightType::Point | LightType::Spot => {
                    arrays.stats.overflow_count += 1;
                    allocator.degraded(light, MAX_OTHER_LIGHTS)
                }
            };

            arrays.visible_shadow_data.push(shadow);
            if let Some(map) = index_map.as_mut() {
                map.push(other_slot.map_or(-1, |slot| slot as i32));
            }
        }

        if let Some(map) = index_map.as_mut() {
            let len = culling.light_index_map_len().max(lights.len());
            map.resize(len, -1);
        }

        if arrays.stats.overflow_count > 0 {
            log::debug!("{} visible lights over the lighting caps", arrays.stats.overflow_count);
        }

        arrays.light_index_map = index_map;
        arrays.keywords.set(ShaderKeywords::LIGHTS_PER_OBJECT, use_lights_per_object);

        &self.arrays
    }

    /// Arrays from the last collection
    pub fn arrays(&self) -> &ShadingLightArrays {
        &self.arrays
    }

    /// Lighting keywords from the last collection
    pub fn keywords(&self) -> ShaderKeywords {
        self.arrays.keywords
    }
}
