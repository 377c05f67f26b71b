//! Shadow Atlas Allocation
//!
//! Backend-agnostic shadow bookkeeping: which lights get shadow maps, where
//! their tiles sit in the two atlases, and the matrices and fade numbers the
//! shading stage samples with.
//!
//! # Atlases
//!
//! - Directional atlas: up to 4 lights x up to 4 cascades (16 tiles)
//! - Other atlas: 16 slots shared by spot lights (1 slot) and point lights
//!   (6 contiguous slots, one per cube face)

pub mod allocator;
pub mod atlas;
pub mod cascade;
pub mod data;
pub mod settings;

pub use allocator::{AllocatorPhase, ShadowAllocator};
pub use atlas::{
    convert_to_atlas_matrix, other_tile_data, split_for_tiles, AtlasBinding, AtlasDescriptor,
    AtlasKind, AtlasLayout, DepthConvention, Viewport,
};
pub use cascade::{cascade_fade_data, distance_fade, CascadeFade};
pub use data::{
    ReservedDirectionalLight, ReservedOtherLight, ShadowData, ShadowFrameData, ShadowStats,
    ShadowUniforms, MAX_DIRECTIONAL_SHADOW_TILES, MAX_SHADOWED_DIRECTIONAL_LIGHTS,
    MAX_SHADOWED_OTHER_LIGHTS, POINT_LIGHT_TILES,
};
pub use settings::{
    CascadeBlendMode, DirectionalShadowSettings, FilterQuality, OtherShadowSettings,
    ShadowQuality, ShadowSettings, ShadowmaskMode, MAX_CASCADES,
};
