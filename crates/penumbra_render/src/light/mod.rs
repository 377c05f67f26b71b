//! Visible lights and the shading-stage light arrays built from them

mod collector;
mod visible;

pub use collector::{
    spot_falloff, GpuDirectionalLight, GpuOtherLight, LightCollectorStats, LightDataCollector,
    ShadingLightArrays, MAX_DIRECTIONAL_LIGHTS, MAX_OTHER_LIGHTS,
};
pub use visible::{
    LightBakingOutput, LightShadows, LightType, LightmapBakeType, MixedLightingMode, VisibleLight,
};
