//! Cascade Fade Calculations
//!
//! Derives the per-cascade numbers the shading stage uses to pick a cascade
//! and fade between them. Only the first reserved directional light's
//! cascades are published; all directional lights share that split.
//!
//! # Culling Spheres
//!
//! Each cascade covers a sphere around part of the view frustum. The sphere
//! published to shading is shrunk by the filter width so samples near its
//! edge never read outside the cascade's tile, and its radius is stored
//! squared so selection is a single distance comparison.

use glam::Vec4;

use super::settings::{FilterQuality, ShadowSettings};

/// Shading-stage view of one cascade
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CascadeFade {
    /// Culling sphere with the shrunk squared radius in `w`
    pub culling_sphere: Vec4,

    /// (1 / shrunk squared radius, filter diagonal, 0, 0)
    pub data: Vec4,
}

/// Shrink a cascade culling sphere by the filter width
///
/// `sphere.w` is the world-space radius as reported by culling.
pub fn cascade_fade_data(sphere: Vec4, tile_size: u32, filter: FilterQuality) -> CascadeFade {
    let texel_size = 2.0 * sphere.w / tile_size.max(1) as f32;
    let filter_size = texel_size * filter.texel_multiplier();

    let radius = sphere.w - filter_size;
    let radius_sq = radius * radius;

    CascadeFade {
        culling_sphere: sphere.truncate().extend(radius_sq),
        data: Vec4::new(
            1.0 / radius_sq.max(f32::EPSILON),
            filter_size * std::f32::consts::SQRT_2,
            0.0,
            0.0,
        ),
    }
}

/// Distance fade vector: (1 / max distance, 1 / distance fade, 1 / (1 - f^2), 0)
/// with `f = 1 - cascade fade`
pub fn distance_fade(settings: &ShadowSettings) -> Vec4 {
    let f = 1.0 - settings.directional.cascade_fade;
    Vec4::new(
        1.0 / settings.max_distance,
        1.0 / settings.distance_fade,
        1.0 / (1.0 - f * f),
        0.0,
    )
}
