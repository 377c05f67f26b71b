//! Lighting Frame
//!
//! Runs one frame of light collection and shadow allocation in the right
//! order and exposes everything the shading stage binds afterwards.
//!
//! # Usage
//!
//! ```ignore
//! let mut frame = LightingFrame::new(ShadowSettings::default());
//!
//! frame.prepare(&visible_lights, &culling, &mut commands);
//! // shading reads frame.lights(), frame.shadows(), frame.keywords()
//! frame.finish(&mut commands);
//! ```

use crate::command::ShadowCommandSink;
use crate::culling::ShadowCulling;
use crate::error::Result;
use crate::keywords::ShaderKeywords;
use crate::light::{LightDataCollector, ShadingLightArrays, VisibleLight};
use crate::shadow::{DepthConvention, ShadowAllocator, ShadowFrameData, ShadowSettings};

/// Collector and allocator driven together, once per frame
#[derive(Clone, Debug, Default)]
pub struct LightingFrame {
    collector: LightDataCollector,
    allocator: ShadowAllocator,
    use_lights_per_object: bool,
    frame: u64,
}

impl LightingFrame {
    /// Create with the given shadow settings
    pub fn new(settings: ShadowSettings) -> Self {
        Self {
            collector: LightDataCollector::new(),
            allocator: ShadowAllocator::new(settings),
            use_lights_per_object: false,
            frame: 0,
        }
    }

    /// Build per-object light index maps
    pub fn with_lights_per_object(mut self, enabled: bool) -> Self {
        self.use_lights_per_object = enabled;
        self
    }

    /// Use the given clip depth convention for atlas matrices
    pub fn with_depth_convention(mut self, depth: DepthConvention) -> Self {
        self.allocator.set_depth_convention(depth);
        self
    }

    /// Toggle per-object light index maps
    pub fn set_lights_per_object(&mut self, enabled: bool) {
        self.use_lights_per_object = enabled;
    }

    /// Replace shadow settings from a JSON document
    ///
    /// On error the current settings stay in place. A reload between
    /// `prepare` and `finish` takes effect at the next `prepare`.
    pub fn reload_settings(&mut self, json: &str) -> Result<()> {
        let settings = ShadowSettings::from_json(json)?;
        log::info!(
            "Shadow settings reloaded: {} cascades, atlases {}/{}",
            settings.directional.cascade_count,
            settings.directional.atlas_size,
            settings.other.atlas_size
        );
        self.allocator.set_settings(settings);
        Ok(())
    }

    /// Set up, collect lights with their shadow reservations, and draw the
    /// shadow atlases
    pub fn prepare(
        &mut self,
        lights: &[VisibleLight],
        culling: &dyn ShadowCulling,
        sink: &mut dyn ShadowCommandSink,
    ) {
        self.frame += 1;
        self.allocator.setup();
        self.collector
            .collect(lights, culling, &mut self.allocator, self.use_lights_per_object);
        self.allocator.render(culling, sink);

        log::trace!(
            "Frame {}: {} directional, {} other lights",
            self.frame,
            self.collector.arrays().directional_count(),
            self.collector.arrays().other_count()
        );
    }

    /// Release the frame's shadow atlases
    pub fn finish(&mut self, sink: &mut dyn ShadowCommandSink) {
        self.allocator.cleanup(sink);
    }

    /// Light arrays of the current frame
    pub fn lights(&self) -> &ShadingLightArrays {
        self.collector.arrays()
    }

    /// Shadow data of the current frame
    pub fn shadows(&self) -> &ShadowFrameData {
        self.allocator.frame_data()
    }

    /// Lighting and shadow keywords combined
    pub fn keywords(&self) -> ShaderKeywords {
        self.collector.keywords() | self.allocator.keywords()
    }

    /// Shadow allocator
    pub fn allocator(&self) -> &ShadowAllocator {
        &self.allocator
    }

    /// Shadow allocator (mutable)
    pub fn allocator_mut(&mut self) -> &mut ShadowAllocator {
        &mut self.allocator
    }

    /// Frames prepared so far
    pub fn frame(&self) -> u64 {
        self.frame
    }
}
