//! Shadow Atlas Allocator
//!
//! Decides which lights get shadow maps each frame and packs their views
//! into the two shadow atlases.
//!
//! # Frame Protocol
//!
//! ```ignore
//! allocator.setup();
//! for (index, light) in lights.iter().enumerate() {
//!     let shadow = allocator.reserve(light, index, &culling);
//!     // pack `shadow` next to the light's shading data
//! }
//! allocator.render(&culling, &mut sink);
//! // ... shading reads allocator.frame_data() ...
//! allocator.cleanup(&mut sink);
//! ```
//!
//! Reservation is first-come-first-served in visible-light order. Running
//! out of capacity never fails the frame; the light degrades to unshadowed
//! lighting and the reason is logged.

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use super::atlas::{
    convert_to_atlas_matrix, other_tile_data, AtlasBinding, AtlasDescriptor, AtlasKind,
    AtlasLayout, DepthConvention,
};
use super::cascade::{cascade_fade_data, distance_fade};
use super::data::{
    ReservedDirectionalLight, ReservedOtherLight, ShadowData, ShadowFrameData, ShadowStats,
    MAX_SHADOWED_DIRECTIONAL_LIGHTS, MAX_SHADOWED_OTHER_LIGHTS, POINT_LIGHT_TILES,
};
use super::settings::{ShadowSettings, ShadowmaskMode};
use crate::command::{ShadowCommandSink, ShadowDraw};
use crate::culling::{CubemapFace, ShadowCulling};
use crate::error::ShadowRejection;
use crate::keywords::ShaderKeywords;
use crate::light::{LightType, VisibleLight};

/// Where the allocator is in its per-frame protocol
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocatorPhase {
    /// Between frames
    #[default]
    Idle,
    /// Set up, accepting reservations
    Reserving,
    /// Atlases drawn, waiting for cleanup
    Rendered,
}

/// Per-frame shadow atlas allocator
#[derive(Clone, Debug)]
pub struct ShadowAllocator {
    settings: ShadowSettings,
    /// Replacement settings held until the next setup
    pending_settings: Option<ShadowSettings>,
    depth: DepthConvention,
    phase: AllocatorPhase,

    directional: [ReservedDirectionalLight; MAX_SHADOWED_DIRECTIONAL_LIGHTS],
    directional_count: usize,

    /// Indexed by first slot; a point light's record sits at its first face
    other: [ReservedOtherLight; MAX_SHADOWED_OTHER_LIGHTS],
    other_slots: usize,

    use_shadow_mask: bool,

    holds_directional: bool,
    holds_other: bool,
    stale_directional: bool,
    stale_other: bool,

    frame: ShadowFrameData,
    stats: ShadowStats,
}

impl Default for ShadowAllocator {
    fn default() -> Self {
        Self::new(ShadowSettings::default())
    }
}

impl ShadowAllocator {
    /// Create an allocator; settings are clamped into range
    pub fn new(mut settings: ShadowSettings) -> Self {
        settings.validate();
        Self {
            settings,
            pending_settings: None,
            depth: DepthConvention::Standard,
            phase: AllocatorPhase::Idle,
            directional: [ReservedDirectionalLight::default(); MAX_SHADOWED_DIRECTIONAL_LIGHTS],
            directional_count: 0,
            other: [ReservedOtherLight::default(); MAX_SHADOWED_OTHER_LIGHTS],
            other_slots: 0,
            use_shadow_mask: false,
            holds_directional: false,
            holds_other: false,
            stale_directional: false,
            stale_other: false,
            frame: ShadowFrameData::default(),
            stats: ShadowStats::default(),
        }
    }

    /// Use the given clip depth convention for atlas matrices
    pub fn with_depth_convention(mut self, depth: DepthConvention) -> Self {
        self.depth = depth;
        self
    }

    /// Settings of the current frame
    pub fn settings(&self) -> &ShadowSettings {
        &self.settings
    }

    /// Replace settings
    ///
    /// Between frames the change applies immediately. Inside a frame it is
    /// held until the next [`setup`](Self::setup), so reservations and the
    /// tiles drawn for them always share one layout.
    pub fn set_settings(&mut self, mut settings: ShadowSettings) {
        settings.validate();
        if self.phase == AllocatorPhase::Idle {
            self.settings = settings;
            self.pending_settings = None;
        } else {
            log::debug!("Shadow settings changed mid-frame; applying at next setup");
            self.pending_settings = Some(settings);
        }
    }

    /// Settings waiting for the next setup, if any
    pub fn pending_settings(&self) -> Option<&ShadowSettings> {
        self.pending_settings.as_ref()
    }

    /// Clip depth convention
    pub fn depth_convention(&self) -> DepthConvention {
        self.depth
    }

    /// Set the clip depth convention
    pub fn set_depth_convention(&mut self, depth: DepthConvention) {
        self.depth = depth;
    }

    /// Current protocol phase
    pub fn phase(&self) -> AllocatorPhase {
        self.phase
    }

    /// Begin a frame: forget last frame's reservations and published data
    pub fn setup(&mut self) {
        if self.holds_directional || self.holds_other {
            log::warn!("Shadow setup called before cleanup; releasing last frame's atlases at render");
            self.stale_directional |= self.holds_directional;
            self.stale_other |= self.holds_other;
            self.holds_directional = false;
            self.holds_other = false;
        }

        if let Some(settings) = self.pending_settings.take() {
            self.settings = settings;
        }

        self.directional_count = 0;
        self.other_slots = 0;
        self.use_shadow_mask = false;
        self.frame = ShadowFrameData::default();
        self.stats = ShadowStats::default();
        self.phase = AllocatorPhase::Reserving;
    }

    /// Reserve atlas space for a light, returning its shadow data
    pub fn reserve(
        &mut self,
        light: &VisibleLight,
        visible_index: usize,
        culling: &dyn ShadowCulling,
    ) -> ShadowData {
        match light.light_type {
            LightType::Directional => self.reserve_directional(light, visible_index, culling),
            LightType::Point | LightType::Spot => self.reserve_other(light, visible_index, culling),
        }
    }

    /// Reserve cascades for a directional light
    pub fn reserve_directional(
        &mut self,
        light: &VisibleLight,
        visible_index: usize,
        culling: &dyn ShadowCulling,
    ) -> ShadowData {
        if !self.accepting_reservations(visible_index) || !light.wants_shadows() {
            return ShadowData::NONE;
        }

        let mask_channel = self.capture_mask_channel(light);

        if self.directional_count >= MAX_SHADOWED_DIRECTIONAL_LIGHTS {
            let rejection = ShadowRejection::DirectionalCapacity {
                capacity: MAX_SHADOWED_DIRECTIONAL_LIGHTS,
            };
            return self.reject(rejection, light, visible_index, mask_channel);
        }

        if culling.caster_bounds(visible_index).is_none() {
            return self.reject(ShadowRejection::NoCasterGeometry, light, visible_index, mask_channel);
        }

        let index = self.directional_count;
        self.directional[index] = ReservedDirectionalLight {
            visible_index,
            slope_scale_bias: light.shadow_bias,
            near_plane_offset: light.shadow_near_plane,
        };
        self.directional_count += 1;
        self.stats.reserved_directional += 1;

        let first_tile = self.settings.directional.cascade_count as usize * index;
        ShadowData::directional(light.shadow_strength, first_tile, light.shadow_normal_bias, mask_channel)
    }

    /// Reserve atlas slots for a point (6 slots) or spot (1 slot) light
    pub fn reserve_other(
        &mut self,
        light: &VisibleLight,
        visible_index: usize,
        culling: &dyn ShadowCulling,
    ) -> ShadowData {
        if !self.accepting_reservations(visible_index) || !light.wants_shadows() {
            return ShadowData::NONE;
        }

        let mask_channel = self.capture_mask_channel(light);

        let is_point = light.light_type == LightType::Point;
        let required = if is_point { POINT_LIGHT_TILES } else { 1 };

        if self.other_slots + required > MAX_SHADOWED_OTHER_LIGHTS {
            let rejection = ShadowRejection::OtherCapacity {
                required,
                available: MAX_SHADOWED_OTHER_LIGHTS - self.other_slots,
                capacity: MAX_SHADOWED_OTHER_LIGHTS,
            };
            return self.reject(rejection, light, visible_index, mask_channel);
        }

        if culling.caster_bounds(visible_index).is_none() {
            return self.reject(ShadowRejection::NoCasterGeometry, light, visible_index, mask_channel);
        }

        let slot = self.other_slots;
        self.other[slot] = ReservedOtherLight {
            visible_index,
            slope_scale_bias: light.shadow_bias,
            normal_bias: light.shadow_normal_bias,
            is_point,
        };
        self.other_slots += required;
        self.stats.reserved_other_slots += required as u32;

        ShadowData::other(light.shadow_strength, slot, is_point, mask_channel)
    }

    /// Shadow data for a light the lighting stage dropped before reservation
    ///
    /// Consumes no shadow capacity and does not toggle the shadowmask.
    pub fn degraded(&mut self, light: &VisibleLight, lighting_capacity: usize) -> ShadowData {
        if !light.wants_shadows() {
            return ShadowData::NONE;
        }

        log::trace!(
            "{}",
            ShadowRejection::LightingCapacity { capacity: lighting_capacity }
        );

        let mask_channel = light
            .baking
            .shadow_mask_channel()
            .map_or(-1.0, |channel| channel as f32);
        ShadowData::faded(light.shadow_strength, mask_channel)
    }

    /// Draw all reserved shadow views and publish the frame's shadow data
    pub fn render(&mut self, culling: &dyn ShadowCulling, sink: &mut dyn ShadowCommandSink) {
        match self.phase {
            AllocatorPhase::Idle => {
                log::error!("Shadow render called without setup; ignoring");
                return;
            }
            AllocatorPhase::Rendered => {
                log::warn!("Shadow render called twice in one frame; ignoring");
                return;
            }
            AllocatorPhase::Reserving => {}
        }

        self.release_stale(sink);

        if self.directional_count > 0 {
            self.render_directional_shadows(culling, sink);
        } else {
            sink.acquire_atlas(AtlasDescriptor::placeholder(AtlasKind::Directional));
            self.frame.directional_atlas = AtlasBinding::Texture { size: 1 };
        }
        self.holds_directional = true;

        if self.other_slots > 0 {
            self.render_other_shadows(culling, sink);
            self.holds_other = true;
        } else {
            sink.alias_atlas(AtlasKind::Other, AtlasKind::Directional);
            self.frame.other_atlas = AtlasBinding::Alias(AtlasKind::Directional);
        }

        self.publish_globals();
        self.phase = AllocatorPhase::Rendered;

        log::debug!(
            "Shadows: {} directional, {} other slots, {} tiles",
            self.directional_count,
            self.other_slots,
            self.stats.tiles_rendered
        );
    }

    /// Release this frame's atlases
    pub fn cleanup(&mut self, sink: &mut dyn ShadowCommandSink) {
        self.release_stale(sink);

        if self.holds_directional {
            sink.release_atlas(AtlasKind::Directional);
            self.holds_directional = false;
        }
        if self.holds_other {
            sink.release_atlas(AtlasKind::Other);
            self.holds_other = false;
        }

        self.frame.directional_atlas = AtlasBinding::Unbound;
        self.frame.other_atlas = AtlasBinding::Unbound;
        self.phase = AllocatorPhase::Idle;
    }

    /// Data published for the shading stage
    pub fn frame_data(&self) -> &ShadowFrameData {
        &self.frame
    }

    /// Shadow keywords of the current frame
    pub fn keywords(&self) -> ShaderKeywords {
        self.frame.keywords
    }

    /// Allocation statistics of the current frame
    pub fn stats(&self) -> &ShadowStats {
        &self.stats
    }

    /// Directional lights holding cascades, in reservation order
    pub fn reserved_directional(&self) -> &[ReservedDirectionalLight] {
        &self.directional[..self.directional_count]
    }

    /// Other lights with their first atlas slot, in reservation order
    pub fn reserved_other(&self) -> impl Iterator<Item = (usize, &ReservedOtherLight)> + '_ {
        let mut slot = 0;
        std::iter::from_fn(move || {
            if slot >= self.other_slots {
                return None;
            }
            let light = &self.other[slot];
            let first = slot;
            slot += light.slot_count();
            Some((first, light))
        })
    }

    /// Other-atlas slots in use
    pub fn other_slots_used(&self) -> usize {
        self.other_slots
    }

    /// Whether any light this frame uses a baked shadowmask
    pub fn uses_shadow_mask(&self) -> bool {
        self.use_shadow_mask
    }

    fn accepting_reservations(&self, visible_index: usize) -> bool {
        match self.phase {
            AllocatorPhase::Reserving => true,
            AllocatorPhase::Idle => {
                log::error!("Shadow reservation for light {} before setup; no shadow", visible_index);
                false
            }
            AllocatorPhase::Rendered => {
                log::error!("Shadow reservation for light {} after render; no shadow", visible_index);
                false
            }
        }
    }

    fn capture_mask_channel(&mut self, light: &VisibleLight) -> f32 {
        match light.baking.shadow_mask_channel() {
            Some(channel) => {
                self.use_shadow_mask = true;
                channel as f32
            }
            None => -1.0,
        }
    }

    fn reject(
        &mut self,
        rejection: ShadowRejection,
        light: &VisibleLight,
        visible_index: usize,
        mask_channel: f32,
    ) -> ShadowData {
        if rejection.is_capacity() {
            log::warn!("Light {} ({:?}) gets no shadow map: {}", visible_index, light.light_type, rejection);
            self.stats.rejected_capacity += 1;
        } else {
            log::trace!("Light {} gets no shadow map: {}", visible_index, rejection);
            self.stats.rejected_no_casters += 1;
        }
        ShadowData::faded(light.shadow_strength, mask_channel)
    }

    fn release_stale(&mut self, sink: &mut dyn ShadowCommandSink) {
        if self.stale_directional {
            sink.release_atlas(AtlasKind::Directional);
            self.stale_directional = false;
        }
        if self.stale_other {
            sink.release_atlas(AtlasKind::Other);
            self.stale_other = false;
        }
    }

    fn render_directional_shadows(&mut self, culling: &dyn ShadowCulling, sink: &mut dyn ShadowCommandSink) {
        let size = self.settings.directional.atlas_size;
        sink.acquire_atlas(AtlasDescriptor::new(AtlasKind::Directional, size));
        self.frame.directional_atlas = AtlasBinding::Texture { size };
        self.frame.uniforms.atlas_sizes[0] = size as f32;
        self.frame.uniforms.atlas_sizes[1] = 1.0 / size as f32;

        let cascade_count = self.settings.directional.cascade_count as usize;
        let layout = AtlasLayout::new(size, self.directional_count * cascade_count);

        for index in 0..self.directional_count {
            self.render_directional(index, &layout, culling, sink);
        }

        let directional = &self.settings.directional;
        let keywords = &mut self.frame.keywords;
        keywords.select(&ShaderKeywords::DIRECTIONAL_FILTER_GROUP, directional.filter.keyword_index());
        keywords.select(&ShaderKeywords::CASCADE_BLEND_GROUP, directional.cascade_blend.keyword_index());
    }

    fn render_directional(
        &mut self,
        index: usize,
        layout: &AtlasLayout,
        culling: &dyn ShadowCulling,
        sink: &mut dyn ShadowCommandSink,
    ) {
        let light = self.directional[index];
        let directional = &self.settings.directional;
        let cascade_count = directional.cascade_count as usize;
        let ratios = Vec3::from(directional.cascade_ratios);
        let culling_factor = directional.cascade_culling_factor();
        let filter = directional.filter;
        let first_tile = index * cascade_count;

        for cascade in 0..cascade_count {
            let split = culling.compute_directional_shadow_matrices(
                light.visible_index,
                cascade,
                cascade_count,
                ratios,
                layout.tile_size,
                light.near_plane_offset,
            );

            // All lights share the first light's cascade split
            if index == 0 {
                let fade = cascade_fade_data(split.culling_sphere, layout.tile_size, filter);
                self.frame.cascade_culling_spheres[cascade] = fade.culling_sphere.to_array();
                self.frame.cascade_data[cascade] = fade.data.to_array();
            }

            let tile = first_tile + cascade;
            let atlas_matrix = convert_to_atlas_matrix(
                split.projection * split.view,
                layout.tile_offset(tile),
                layout.tile_scale(),
                self.depth,
            );
            self.frame.directional_matrices[tile] = atlas_matrix.to_cols_array_2d();

            sink.draw_shadows(&ShadowDraw {
                atlas: AtlasKind::Directional,
                visible_index: light.visible_index,
                tile_index: tile,
                viewport: layout.viewport(tile),
                view: split.view,
                projection: split.projection,
                slope_scale_bias: light.slope_scale_bias,
                cascade_culling_factor: Some(culling_factor),
                culling_sphere: Some(split.culling_sphere),
                pancaking: true,
            });
            self.stats.tiles_rendered += 1;
        }
    }

    fn render_other_shadows(&mut self, culling: &dyn ShadowCulling, sink: &mut dyn ShadowCommandSink) {
        let size = self.settings.other.atlas_size;
        sink.acquire_atlas(AtlasDescriptor::new(AtlasKind::Other, size));
        self.frame.other_atlas = AtlasBinding::Texture { size };
        self.frame.uniforms.atlas_sizes[2] = size as f32;
        self.frame.uniforms.atlas_sizes[3] = 1.0 / size as f32;

        let layout = AtlasLayout::new(size, self.other_slots);

        let mut slot = 0;
        while slot < self.other_slots {
            let light = self.other[slot];
            if light.is_point {
                self.render_point(slot, &light, &layout, culling, sink);
            } else {
                self.render_spot(slot, &light, &layout, culling, sink);
            }
            slot += light.slot_count();
        }

        self.frame.keywords.select(
            &ShaderKeywords::OTHER_FILTER_GROUP,
            self.settings.other.filter.keyword_index(),
        );
    }

    fn render_spot(
        &mut self,
        slot: usize,
        light: &ReservedOtherLight,
        layout: &AtlasLayout,
        culling: &dyn ShadowCulling,
        sink: &mut dyn ShadowCommandSink,
    ) {
        let vp = culling.compute_spot_shadow_matrices(light.visible_index);

        // Texel size at distance 1 from the light
        let texel_size = 2.0 / (layout.tile_size as f32 * vp.projection.x_axis.x);
        let bias = self.tile_normal_bias(light, texel_size);

        self.write_other_tile(slot, layout, vp.view, vp.projection, bias);
        self.draw_other(slot, light, layout, vp.view, vp.projection, sink);
    }

    fn render_point(
        &mut self,
        first_slot: usize,
        light: &ReservedOtherLight,
        layout: &AtlasLayout,
        culling: &dyn ShadowCulling,
        sink: &mut dyn ShadowCommandSink,
    ) {
        let texel_size = 2.0 / layout.tile_size as f32;
        let filter_size = texel_size * self.settings.other.filter.texel_multiplier();
        let bias = self.tile_normal_bias(light, texel_size);

        // Widen each face so filtering at the face edges stays inside the tile
        let fov_bias = (1.0 + bias + filter_size).atan().to_degrees() * 2.0 - 90.0;

        for (face_index, face) in CubemapFace::ALL.into_iter().enumerate() {
            let mut vp = culling.compute_point_shadow_matrices(light.visible_index, face, fov_bias);

            // Cube faces are drawn upside down; flip the view's Y row back
            vp.view.y_axis.y = -vp.view.y_axis.y;
            vp.view.z_axis.y = -vp.view.z_axis.y;
            vp.view.w_axis.y = -vp.view.w_axis.y;

            let slot = first_slot + face_index;
            self.write_other_tile(slot, layout, vp.view, vp.projection, bias);
            self.draw_other(slot, light, layout, vp.view, vp.projection, sink);
        }
    }

    fn tile_normal_bias(&self, light: &ReservedOtherLight, texel_size: f32) -> f32 {
        let filter_size = texel_size * self.settings.other.filter.texel_multiplier();
        light.normal_bias * filter_size * std::f32::consts::SQRT_2
    }

    fn write_other_tile(&mut self, slot: usize, layout: &AtlasLayout, view: Mat4, projection: Mat4, bias: f32) {
        let offset = layout.tile_offset(slot);
        let scale = layout.tile_scale();
        self.frame.other_tiles[slot] = other_tile_data(offset, scale, bias, layout.size);
        self.frame.other_matrices[slot] =
            convert_to_atlas_matrix(projection * view, offset, scale, self.depth).to_cols_array_2d();
    }

    fn draw_other(
        &mut self,
        slot: usize,
        light: &ReservedOtherLight,
        layout: &AtlasLayout,
        view: Mat4,
        projection: Mat4,
        sink: &mut dyn ShadowCommandSink,
    ) {
        sink.draw_shadows(&ShadowDraw {
            atlas: AtlasKind::Other,
            visible_index: light.visible_index,
            tile_index: slot,
            viewport: layout.viewport(slot),
            view,
            projection,
            slope_scale_bias: light.slope_scale_bias,
            cascade_culling_factor: None,
            culling_sphere: None,
            pancaking: false,
        });
        self.stats.tiles_rendered += 1;
    }

    fn publish_globals(&mut self) {
        let uniforms = &mut self.frame.uniforms;
        uniforms.cascade_count = if self.directional_count > 0 {
            self.settings.directional.cascade_count as i32
        } else {
            0
        };
        uniforms.distance_fade = distance_fade(&self.settings).to_array();

        let mask = self.use_shadow_mask.then(|| match self.settings.shadowmask_mode {
            ShadowmaskMode::Shadowmask => 0,
            ShadowmaskMode::DistanceShadowmask => 1,
        });
        self.frame.keywords.select(&ShaderKeywords::SHADOW_MASK_GROUP, mask);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{ShadowCommand, ShadowCommandList};
    use crate::culling::{Bounds, SceneShadowCulling, ShadowCamera};
    use crate::light::LightBakingOutput;
    use crate::shadow::settings::FilterQuality;

    fn camera() -> ShadowCamera {
        ShadowCamera::look_at(Vec3::new(0.0, 3.0, 12.0), Vec3::ZERO, 60f32.to_radians(), 1.5, 0.3)
    }

    fn casters() -> Bounds {
        Bounds::new(Vec3::ZERO, Vec3::splat(2.0))
    }

    fn sun() -> VisibleLight {
        VisibleLight::directional(Vec3::new(0.2, -1.0, 0.3), Vec3::ONE)
            .with_shadows(1.0)
            .with_caster_bounds(casters())
    }

    fn point(x: f32) -> VisibleLight {
        VisibleLight::point(Vec3::new(x, 2.0, 0.0), 8.0, Vec3::ONE)
            .with_shadows(0.8)
            .with_caster_bounds(casters())
    }

    fn spot(x: f32) -> VisibleLight {
        VisibleLight::spot(Vec3::new(x, 4.0, 0.0), Vec3::NEG_Y, 10.0, 20.0, 45.0, Vec3::ONE)
            .with_shadows(0.6)
            .with_caster_bounds(casters())
    }

    fn reserve_all(allocator: &mut ShadowAllocator, lights: &[VisibleLight]) -> Vec<ShadowData> {
        let culling = SceneShadowCulling::new(camera(), lights, 100.0);
        allocator.setup();
        lights
            .iter()
            .enumerate()
            .map(|(i, light)| allocator.reserve(light, i, &culling))
            .collect()
    }

    #[test]
    fn test_shadows_disabled_sentinel() {
        let lights = [
            VisibleLight::directional(Vec3::NEG_Y, Vec3::ONE).with_caster_bounds(casters()),
            point(0.0).with_shadows(0.0),
        ];
        let mut allocator = ShadowAllocator::default();
        let data = reserve_all(&mut allocator, &lights);

        for shadow in data {
            assert_eq!(shadow.to_array(), [0.0, 0.0, 0.0, -1.0]);
        }
        assert!(allocator.reserved_directional().is_empty());
        assert_eq!(allocator.other_slots_used(), 0);
    }

    #[test]
    fn test_directional_capacity() {
        let lights: Vec<_> = (0..6).map(|_| sun()).collect();
        let mut allocator = ShadowAllocator::default();
        let data = reserve_all(&mut allocator, &lights);

        for (i, shadow) in data.iter().take(4).enumerate() {
            assert_eq!(shadow.strength, 1.0);
            assert_eq!(shadow.tile_index, (i * 4) as f32);
            assert_eq!(shadow.bias_or_point, 0.4);
        }
        assert_eq!(data[4].to_array(), [-1.0, 0.0, 0.0, -1.0]);
        assert_eq!(data[5].strength, -1.0);
        assert_eq!(allocator.stats().rejected_capacity, 2);
        assert_eq!(allocator.reserved_directional().len(), 4);
    }

    #[test]
    fn test_directional_tile_base_follows_cascade_count() {
        let lights = [sun(), sun()];
        let mut settings = ShadowSettings::default();
        settings.directional.cascade_count = 2;
        let mut allocator = ShadowAllocator::new(settings);
        let data = reserve_all(&mut allocator, &lights);
        assert_eq!(data[1].tile_index, 2.0);
    }

    #[test]
    fn test_no_casters_silent_degrade() {
        let mut lonely = sun();
        lonely.caster_bounds = None;
        let lights = [lonely, sun()];

        let mut allocator = ShadowAllocator::default();
        let data = reserve_all(&mut allocator, &lights);

        assert_eq!(data[0].strength, -1.0);
        assert_eq!(data[1].tile_index, 0.0);
        assert_eq!(allocator.stats().rejected_no_casters, 1);
        assert_eq!(allocator.stats().rejected_capacity, 0);
    }

    #[test]
    fn test_point_light_atomicity() {
        let lights = [point(0.0), point(1.0), spot(2.0), spot(3.0), spot(4.0), point(5.0), spot(6.0)];
        let mut allocator = ShadowAllocator::default();
        let data = reserve_all(&mut allocator, &lights);

        assert_eq!(data[0].to_array(), [0.8, 0.0, 1.0, -1.0]);
        assert_eq!(data[1].to_array(), [0.8, 6.0, 1.0, -1.0]);
        assert_eq!(data[2].to_array(), [0.6, 12.0, 0.0, -1.0]);
        assert_eq!(data[3].tile_index, 13.0);
        assert_eq!(data[4].tile_index, 14.0);
        // 15 used, a point light needs 6
        assert_eq!(data[5].strength, -0.8);
        // a spot still fits in the last slot
        assert_eq!(data[6].to_array(), [0.6, 15.0, 0.0, -1.0]);
        assert_eq!(allocator.other_slots_used(), 16);

        let slots: Vec<_> = allocator.reserved_other().map(|(slot, light)| (slot, light.is_point)).collect();
        assert_eq!(slots, vec![(0, true), (6, true), (12, false), (13, false), (14, false), (15, false)]);
    }

    #[test]
    fn test_shadow_mask_channel_captured_on_rejection() {
        let mut baked = sun().with_baking(LightBakingOutput::shadowmask(2));
        baked.caster_bounds = None;
        let lights = [baked];

        let mut allocator = ShadowAllocator::default();
        let data = reserve_all(&mut allocator, &lights);

        assert_eq!(data[0].to_array(), [-1.0, 0.0, 0.0, 2.0]);
        assert!(allocator.uses_shadow_mask());
    }

    #[test]
    fn test_shadow_mask_keyword() {
        let lights = [point(0.0).with_baking(LightBakingOutput::shadowmask(1))];
        let mut settings = ShadowSettings::default();
        settings.shadowmask_mode = ShadowmaskMode::Shadowmask;

        let mut allocator = ShadowAllocator::new(settings);
        reserve_all(&mut allocator, &lights);
        let culling = SceneShadowCulling::new(camera(), &lights, 100.0);
        allocator.render(&culling, &mut ShadowCommandList::new());

        let keywords = allocator.keywords();
        assert!(keywords.contains(ShaderKeywords::SHADOW_MASK_ALWAYS));
        assert!(!keywords.contains(ShaderKeywords::SHADOW_MASK_DISTANCE));

        // Next frame without baked lights clears it
        let plain = [point(0.0)];
        reserve_all(&mut allocator, &plain);
        let culling = SceneShadowCulling::new(camera(), &plain, 100.0);
        allocator.render(&culling, &mut ShadowCommandList::new());
        assert!(!allocator.keywords().contains(ShaderKeywords::SHADOW_MASK_ALWAYS));
    }

    #[test]
    fn test_render_directional_layout() {
        let lights = [sun(), sun(), sun()];
        let mut allocator = ShadowAllocator::default();
        reserve_all(&mut allocator, &lights);

        let culling = SceneShadowCulling::new(camera(), &lights, 100.0);
        let mut sink = ShadowCommandList::new();
        allocator.render(&culling, &mut sink);

        assert_eq!(
            sink.commands()[0],
            ShadowCommand::Acquire(AtlasDescriptor::new(AtlasKind::Directional, 1024))
        );

        // 12 tiles -> split 4, tile 256
        let draws: Vec<_> = sink.draws_into(AtlasKind::Directional).collect();
        assert_eq!(draws.len(), 12);
        assert_eq!(draws[5].tile_index, 5);
        assert_eq!(draws[5].visible_index, 1);
        assert_eq!(draws[5].viewport.x, 256.0);
        assert_eq!(draws[5].viewport.y, 256.0);
        assert_eq!(draws[5].viewport.width, 256.0);
        assert!(draws.iter().all(|d| d.pancaking && d.cascade_culling_factor.is_some()));

        let frame = allocator.frame_data();
        assert_eq!(frame.uniforms.cascade_count, 4);
        assert_eq!(frame.uniforms.atlas_sizes[0], 1024.0);
        assert_eq!(frame.directional_atlas, AtlasBinding::Texture { size: 1024 });
        assert_eq!(frame.other_atlas, AtlasBinding::Alias(AtlasKind::Directional));
        assert!(frame.cascade_culling_spheres.iter().all(|s| s[3] > 0.0));
        assert_eq!(allocator.stats().tiles_rendered, 12);
    }

    #[test]
    fn test_cascade_data_from_first_light_only() {
        let lights = [
            sun(),
            VisibleLight::directional(Vec3::new(-0.7, -0.2, 0.1), Vec3::ONE)
                .with_shadows(1.0)
                .with_caster_bounds(casters()),
        ];
        let mut allocator = ShadowAllocator::default();
        reserve_all(&mut allocator, &lights);

        let culling = SceneShadowCulling::new(camera(), &lights, 100.0);
        allocator.render(&culling, &mut ShadowCommandList::new());

        let settings = ShadowSettings::default();
        for cascade in 0..4 {
            let split = culling.compute_directional_shadow_matrices(
                0,
                cascade,
                4,
                Vec3::from(settings.directional.cascade_ratios),
                256,
                0.2,
            );
            let fade = cascade_fade_data(split.culling_sphere, 256, FilterQuality::Pcf2x2);
            assert_eq!(allocator.frame_data().cascade_culling_spheres[cascade], fade.culling_sphere.to_array());
        }
    }

    #[test]
    fn test_render_other_without_directional() {
        let lights = [spot(0.0), point(1.0)];
        let mut allocator = ShadowAllocator::default();
        reserve_all(&mut allocator, &lights);

        let culling = SceneShadowCulling::new(camera(), &lights, 100.0);
        let mut sink = ShadowCommandList::new();
        allocator.render(&culling, &mut sink);

        let commands = sink.commands();
        assert_eq!(commands[0], ShadowCommand::Acquire(AtlasDescriptor::placeholder(AtlasKind::Directional)));
        assert_eq!(commands[1], ShadowCommand::Acquire(AtlasDescriptor::new(AtlasKind::Other, 1024)));

        // 7 slots -> split 4, tile 256
        let draws: Vec<_> = sink.draws_into(AtlasKind::Other).collect();
        assert_eq!(draws.len(), 7);
        assert_eq!(draws[0].visible_index, 0);
        assert!(draws[1..].iter().all(|d| d.visible_index == 1));
        assert!(draws.iter().all(|d| !d.pancaking && d.culling_sphere.is_none()));

        let frame = allocator.frame_data();
        assert_eq!(frame.uniforms.cascade_count, 0);
        assert_eq!(frame.uniforms.atlas_sizes[2], 1024.0);
        assert_eq!(frame.uniforms.atlas_sizes[0], 0.0);

        let border = 0.5 / 1024.0;
        let tile = frame.other_tiles[5];
        assert!((tile[0] - (0.25 + border)).abs() < 1e-6);
        assert!((tile[1] - (0.25 + border)).abs() < 1e-6);
        assert!((tile[2] - (0.25 - 2.0 * border)).abs() < 1e-6);
    }

    #[test]
    fn test_point_bias_and_fov() {
        let lights = [point(0.0).with_bias(0.0, 1.0)];
        let mut settings = ShadowSettings::default();
        settings.other.filter = FilterQuality::Pcf5x5;
        let mut allocator = ShadowAllocator::new(settings);
        reserve_all(&mut allocator, &lights);

        let culling = SceneShadowCulling::new(camera(), &lights, 100.0);
        let mut sink = ShadowCommandList::new();
        allocator.render(&culling, &mut sink);

        // 6 slots -> split 4, tile 256
        let texel = 2.0 / 256.0;
        let filter = texel * 3.0;
        let bias = filter * std::f32::consts::SQRT_2;
        let tile = allocator.frame_data().other_tiles[0];
        assert!((tile[3] - bias).abs() < 1e-6);

        let fov = 90.0 + (1.0f32 + bias + filter).atan().to_degrees() * 2.0 - 90.0;
        let draw = sink.draws().next().copied();
        let expected_m11 = 1.0 / (fov.to_radians() * 0.5).tan();
        assert!(draw.is_some_and(|d| (d.projection.y_axis.y - expected_m11).abs() < 1e-4));
        assert!(allocator.keywords().contains(ShaderKeywords::OTHER_PCF5));
    }

    #[test]
    fn test_point_face_view_flipped() {
        let lights = [point(0.0)];
        let mut allocator = ShadowAllocator::default();
        reserve_all(&mut allocator, &lights);

        let culling = SceneShadowCulling::new(camera(), &lights, 100.0);
        let mut sink = ShadowCommandList::new();
        allocator.render(&culling, &mut sink);

        for (draw, face) in sink.draws().zip(CubemapFace::ALL) {
            let unflipped = culling.compute_point_shadow_matrices(0, face, 0.0).view;
            assert_eq!(draw.view.row(1).y, -unflipped.row(1).y);
            assert_eq!(draw.view.row(1).w, -unflipped.row(1).w);
            assert_eq!(draw.view.row(1).x, unflipped.row(1).x);
            assert_eq!(draw.view.row(0), unflipped.row(0));
        }
    }

    #[test]
    fn test_spot_texel_uses_projection_scale() {
        let lights = [spot(0.0).with_bias(0.0, 1.0)];
        let mut allocator = ShadowAllocator::default();
        reserve_all(&mut allocator, &lights);

        let culling = SceneShadowCulling::new(camera(), &lights, 100.0);
        allocator.render(&culling, &mut ShadowCommandList::new());

        let m00 = culling.compute_spot_shadow_matrices(0).projection.x_axis.x;
        // single slot -> split 1, tile 1024
        let expected = 2.0 / (1024.0 * m00) * std::f32::consts::SQRT_2;
        assert!((allocator.frame_data().other_tiles[0][3] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_reversed_depth_matrices() {
        let lights = [spot(0.0)];
        let culling = SceneShadowCulling::new(camera(), &lights, 100.0);

        let mut standard = ShadowAllocator::default();
        reserve_all(&mut standard, &lights);
        standard.render(&culling, &mut ShadowCommandList::new());

        let mut reversed = ShadowAllocator::default().with_depth_convention(DepthConvention::Reversed);
        reserve_all(&mut reversed, &lights);
        reversed.render(&culling, &mut ShadowCommandList::new());

        let a = Mat4::from_cols_array_2d(&standard.frame_data().other_matrices[0]);
        let b = Mat4::from_cols_array_2d(&reversed.frame_data().other_matrices[0]);
        assert_eq!(a.row(0), b.row(0));
        let depth_sum = a.row(2) + b.row(2);
        assert!(depth_sum.abs_diff_eq(a.row(3), 1e-5));
        assert_eq!(a.row(3), b.row(3));
    }

    #[test]
    fn test_cleanup_releases() {
        let lights = [sun()];
        let mut allocator = ShadowAllocator::default();
        reserve_all(&mut allocator, &lights);

        let culling = SceneShadowCulling::new(camera(), &lights, 100.0);
        let mut sink = ShadowCommandList::new();
        allocator.render(&culling, &mut sink);
        sink.clear();
        allocator.cleanup(&mut sink);

        // Other atlas was only aliased
        assert_eq!(sink.commands(), &[ShadowCommand::Release(AtlasKind::Directional)]);
        assert_eq!(allocator.phase(), AllocatorPhase::Idle);
        assert_eq!(allocator.frame_data().directional_atlas, AtlasBinding::Unbound);
    }

    #[test]
    fn test_out_of_phase_calls() {
        let lights = [sun()];
        let culling = SceneShadowCulling::new(camera(), &lights, 100.0);
        let mut allocator = ShadowAllocator::default();
        let mut sink = ShadowCommandList::new();

        assert_eq!(allocator.reserve(&lights[0], 0, &culling), ShadowData::NONE);
        allocator.render(&culling, &mut sink);
        assert!(sink.is_empty());

        allocator.setup();
        allocator.reserve(&lights[0], 0, &culling);
        allocator.render(&culling, &mut sink);
        let recorded = sink.len();
        allocator.render(&culling, &mut sink);
        assert_eq!(sink.len(), recorded);
        assert_eq!(allocator.reserve(&lights[0], 0, &culling), ShadowData::NONE);

        // Skipped cleanup: the stale atlas is released before the next acquire
        allocator.setup();
        sink.clear();
        allocator.render(&culling, &mut sink);
        assert_eq!(sink.commands()[0], ShadowCommand::Release(AtlasKind::Directional));
        assert_eq!(
            sink.commands()[1],
            ShadowCommand::Acquire(AtlasDescriptor::placeholder(AtlasKind::Directional))
        );
    }

    #[test]
    fn test_degraded_consumes_nothing() {
        let mut allocator = ShadowAllocator::default();
        allocator.setup();

        let baked = point(0.0).with_baking(LightBakingOutput::shadowmask(3));
        assert_eq!(allocator.degraded(&baked, 64).to_array(), [-0.8, 0.0, 0.0, 3.0]);
        assert_eq!(
            allocator.degraded(&VisibleLight::point(Vec3::ZERO, 1.0, Vec3::ONE), 64),
            ShadowData::NONE
        );
        assert_eq!(allocator.other_slots_used(), 0);
        assert!(!allocator.uses_shadow_mask());
        // lighting-cap drops are counted by the collector, not here
        assert_eq!(allocator.stats().rejected_capacity, 0);
    }

    #[test]
    fn test_settings_change_mid_frame_waits_for_setup() {
        let lights = [sun(), sun()];
        let culling = SceneShadowCulling::new(camera(), &lights, 100.0);
        let mut allocator = ShadowAllocator::default();
        let data = reserve_all(&mut allocator, &lights);
        assert_eq!(data[1].tile_index, 4.0);

        let mut fewer = ShadowSettings::default();
        fewer.directional.cascade_count = 2;
        allocator.set_settings(fewer);
        assert_eq!(allocator.settings().directional.cascade_count, 4);
        assert!(allocator.pending_settings().is_some());

        let mut sink = ShadowCommandList::new();
        allocator.render(&culling, &mut sink);

        // second light's tiles start where its shadow data says
        let tiles: Vec<_> = sink
            .draws()
            .filter(|draw| draw.visible_index == 1)
            .map(|draw| draw.tile_index)
            .collect();
        assert_eq!(tiles, vec![4, 5, 6, 7]);
        assert_eq!(allocator.frame_data().uniforms.cascade_count, 4);

        allocator.cleanup(&mut sink);
        allocator.setup();
        assert_eq!(allocator.settings().directional.cascade_count, 2);
        assert!(allocator.pending_settings().is_none());
        let data = reserve_all(&mut allocator, &lights);
        assert_eq!(data[1].tile_index, 2.0);
    }

    #[test]
    fn test_settings_change_between_frames_applies_now() {
        let mut allocator = ShadowAllocator::default();
        let mut settings = ShadowSettings::default();
        settings.directional.cascade_count = 3;
        allocator.set_settings(settings);
        assert_eq!(allocator.settings().directional.cascade_count, 3);
        assert!(allocator.pending_settings().is_none());
    }
}
