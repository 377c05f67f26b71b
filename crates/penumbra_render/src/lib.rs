//! # penumbra_render - Shadow Atlas Allocation and Light Packing
//!
//! Per-frame lighting setup for a forward renderer:
//! - Packs visible lights into fixed-capacity shading arrays
//! - Reserves shadow atlas space under fixed budgets, first come first served
//! - Lays out cascade, spot and cube-face tiles in two shared atlases
//! - Remaps shadow matrices into atlas space (standard or reversed Z)
//! - Derives bias, filter, cascade fade and shadowmask data for shading
//!
//! ## Architecture
//!
//! 1. **LightDataCollector**: walks visible lights and builds the light arrays
//! 2. **ShadowAllocator**: reservation, then rendering of the reserved tiles
//! 3. **Collaborators**: [`ShadowCulling`] supplies caster bounds and views,
//!    [`ShadowCommandSink`] executes atlas and draw requests
//!
//! ## Example
//!
//! ```ignore
//! use penumbra_render::prelude::*;
//!
//! let mut frame = LightingFrame::new(ShadowQuality::High.to_settings());
//! let culling = SceneShadowCulling::new(camera, &visible_lights, 100.0);
//! let mut commands = ShadowCommandList::new();
//!
//! frame.prepare(&visible_lights, &culling, &mut commands);
//! backend.upload(frame.lights().other_bytes());
//! backend.upload(frame.shadows().other_matrices_bytes());
//! commands.replay(&mut backend);
//! frame.finish(&mut commands);
//! ```

pub mod command;
pub mod culling;
pub mod error;
pub mod frame;
pub mod keywords;
pub mod light;
pub mod shadow;

pub use command::{ShadowCommand, ShadowCommandList, ShadowCommandSink, ShadowCommandStats, ShadowDraw};
pub use culling::{
    Bounds, CubemapFace, DirectionalShadowSplit, SceneShadowCulling, ShadowCamera, ShadowCulling,
    ShadowViewProjection,
};
pub use error::{Result, ShadowError, ShadowRejection};
pub use frame::LightingFrame;
pub use keywords::ShaderKeywords;

// Lighting
pub use light::{
    GpuDirectionalLight, GpuOtherLight, LightBakingOutput, LightCollectorStats, LightDataCollector,
    LightShadows, LightType, LightmapBakeType, MixedLightingMode, ShadingLightArrays, VisibleLight,
    MAX_DIRECTIONAL_LIGHTS, MAX_OTHER_LIGHTS,
};

// Shadows
pub use shadow::{
    // Settings
    CascadeBlendMode, DirectionalShadowSettings, FilterQuality, OtherShadowSettings, ShadowQuality,
    ShadowSettings, ShadowmaskMode, MAX_CASCADES,
    // Allocation
    AllocatorPhase, ShadowAllocator,
    // Atlas
    AtlasBinding, AtlasDescriptor, AtlasKind, AtlasLayout, DepthConvention, Viewport,
    // GPU data
    ShadowData, ShadowFrameData, ShadowStats, ShadowUniforms,
    MAX_SHADOWED_DIRECTIONAL_LIGHTS, MAX_SHADOWED_OTHER_LIGHTS,
};

/// Prelude for common imports
pub mod prelude {
    pub use crate::command::{ShadowCommandList, ShadowCommandSink};
    pub use crate::culling::{Bounds, SceneShadowCulling, ShadowCamera, ShadowCulling};
    pub use crate::frame::LightingFrame;
    pub use crate::keywords::ShaderKeywords;
    pub use crate::light::{LightBakingOutput, VisibleLight};
    pub use crate::shadow::{DepthConvention, ShadowAllocator, ShadowData, ShadowQuality, ShadowSettings};
}
