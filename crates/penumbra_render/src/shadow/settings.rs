//! Shadow Settings
//!
//! Global shadow configuration with serde support so settings can be loaded
//! from JSON and hot-reloaded between frames.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShadowError};

/// Smallest atlas edge in texels
pub const MIN_ATLAS_SIZE: u32 = 256;
/// Largest atlas edge in texels
pub const MAX_ATLAS_SIZE: u32 = 8192;
/// Maximum cascades per directional light
pub const MAX_CASCADES: usize = 4;

/// Shadow filter quality (PCF kernel width)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterQuality {
    /// Hardware 2x2 comparison only
    #[default]
    Pcf2x2,
    /// 3x3 tent filter
    Pcf3x3,
    /// 5x5 tent filter
    Pcf5x5,
    /// 7x7 tent filter
    Pcf7x7,
}

impl FilterQuality {
    /// Tier index (0 for 2x2 .. 3 for 7x7)
    pub fn tier(self) -> u32 {
        match self {
            Self::Pcf2x2 => 0,
            Self::Pcf3x3 => 1,
            Self::Pcf5x5 => 2,
            Self::Pcf7x7 => 3,
        }
    }

    /// Filter width in texels relative to a single texel (`tier + 1`)
    pub fn texel_multiplier(self) -> f32 {
        self.tier() as f32 + 1.0
    }

    /// Index into a keyword group (none for 2x2, which needs no keyword)
    pub fn keyword_index(self) -> Option<usize> {
        (self.tier() as usize).checked_sub(1)
    }
}

/// How neighbouring cascades blend into each other
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CascadeBlendMode {
    /// Hard switch at the cascade boundary
    #[default]
    Hard,
    /// Linear cross-fade
    Soft,
    /// Dithered transition
    Dither,
}

impl CascadeBlendMode {
    /// Index into the cascade-blend keyword group (none for hard)
    pub fn keyword_index(self) -> Option<usize> {
        match self {
            Self::Hard => None,
            Self::Soft => Some(0),
            Self::Dither => Some(1),
        }
    }
}

/// Quality-level shadowmask behavior for mixed lights
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShadowmaskMode {
    /// Baked shadows always used for static geometry
    Shadowmask,
    /// Dynamic shadows up to the shadow distance, baked beyond
    #[default]
    DistanceShadowmask,
}

/// Directional (cascaded) shadow settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionalShadowSettings {
    /// Atlas edge in texels (power of two)
    pub atlas_size: u32,

    /// Filter quality
    pub filter: FilterQuality,

    /// Cascades per light (1-4)
    pub cascade_count: u32,

    /// Cascade split ratios of the max distance (first three cascades)
    pub cascade_ratios: [f32; 3],

    /// Fraction of the last cascade used to fade out (0.001-1)
    pub cascade_fade: f32,

    /// Cascade blend mode
    pub cascade_blend: CascadeBlendMode,
}

impl Default for DirectionalShadowSettings {
    fn default() -> Self {
        Self {
            atlas_size: 1024,
            filter: FilterQuality::Pcf2x2,
            cascade_count: 4,
            cascade_ratios: [0.1, 0.25, 0.5],
            cascade_fade: 0.1,
            cascade_blend: CascadeBlendMode::Hard,
        }
    }
}

impl DirectionalShadowSettings {
    /// Culling factor that lets cascades skip casters fully covered by a
    /// smaller cascade
    pub fn cascade_culling_factor(&self) -> f32 {
        (0.8 - self.cascade_fade).max(0.0)
    }
}

/// Point and spot light shadow settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtherShadowSettings {
    /// Atlas edge in texels (power of two)
    pub atlas_size: u32,

    /// Filter quality
    pub filter: FilterQuality,
}

impl Default for OtherShadowSettings {
    fn default() -> Self {
        Self {
            atlas_size: 1024,
            filter: FilterQuality::Pcf2x2,
        }
    }
}

/// Global shadow settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowSettings {
    /// Maximum shadow distance from the camera
    pub max_distance: f32,

    /// Fraction of the max distance over which shadows fade out (0.001-1)
    pub distance_fade: f32,

    /// Cascaded directional shadows
    pub directional: DirectionalShadowSettings,

    /// Point and spot shadows
    pub other: OtherShadowSettings,

    /// Shadowmask mode used by mixed lights
    pub shadowmask_mode: ShadowmaskMode,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            max_distance: 100.0,
            distance_fade: 0.1,
            directional: DirectionalShadowSettings::default(),
            other: OtherShadowSettings::default(),
            shadowmask_mode: ShadowmaskMode::default(),
        }
    }
}

impl ShadowSettings {
    /// Parse settings from JSON and clamp them into range
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validated()
    }

    /// Serialize settings to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Clamp values to valid ranges
    pub fn validate(&mut self) {
        self.max_distance = self.max_distance.max(0.001);
        self.distance_fade = self.distance_fade.clamp(0.001, 1.0);

        self.directional.atlas_size = clamp_atlas_size(self.directional.atlas_size);
        self.directional.cascade_count = self.directional.cascade_count.clamp(1, MAX_CASCADES as u32);
        for ratio in &mut self.directional.cascade_ratios {
            *ratio = ratio.clamp(0.0, 1.0);
        }
        self.directional.cascade_fade = self.directional.cascade_fade.clamp(0.001, 1.0);

        self.other.atlas_size = clamp_atlas_size(self.other.atlas_size);
    }

    /// Validate, rejecting values that clamping cannot repair
    pub fn validated(mut self) -> Result<Self> {
        let finite = [
            self.max_distance,
            self.distance_fade,
            self.directional.cascade_fade,
        ]
        .iter()
        .chain(self.directional.cascade_ratios.iter())
        .all(|v| v.is_finite());

        if !finite {
            return Err(ShadowError::InvalidSettings("non-finite value".into()));
        }

        let ratios = self.directional.cascade_ratios;
        if ratios[0] > ratios[1] || ratios[1] > ratios[2] {
            return Err(ShadowError::InvalidSettings(format!(
                "cascade ratios must be ascending, got {:?}",
                ratios
            )));
        }

        self.validate();
        Ok(self)
    }
}

fn clamp_atlas_size(size: u32) -> u32 {
    size.clamp(MIN_ATLAS_SIZE, MAX_ATLAS_SIZE).next_power_of_two()
}

/// Shadow quality preset
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShadowQuality {
    /// Single small cascade, no filtering
    Low,
    /// Engine defaults
    Medium,
    /// Larger atlases and 5x5 filtering
    High,
    /// Largest atlases, 7x7 filtering, soft cascade blending
    Ultra,
}

impl ShadowQuality {
    /// Convert to shadow settings
    pub fn to_settings(self) -> ShadowSettings {
        match self {
            Self::Low => ShadowSettings {
                max_distance: 50.0,
                directional: DirectionalShadowSettings {
                    atlas_size: 512,
                    cascade_count: 2,
                    ..Default::default()
                },
                other: OtherShadowSettings {
                    atlas_size: 512,
                    ..Default::default()
                },
                ..Default::default()
            },
            Self::Medium => ShadowSettings::default(),
            Self::High => ShadowSettings {
                directional: DirectionalShadowSettings {
                    atlas_size: 2048,
                    filter: FilterQuality::Pcf5x5,
                    ..Default::default()
                },
                other: OtherShadowSettings {
                    atlas_size: 2048,
                    filter: FilterQuality::Pcf5x5,
                },
                ..Default::default()
            },
            Self::Ultra => ShadowSettings {
                max_distance: 150.0,
                directional: DirectionalShadowSettings {
                    atlas_size: 4096,
                    filter: FilterQuality::Pcf7x7,
                    cascade_blend: CascadeBlendMode::Soft,
                    ..Default::default()
                },
                other: OtherShadowSettings {
                    atlas_size: 4096,
                    filter: FilterQuality::Pcf7x7,
                },
                ..Default::default()
            },
        }
    }
}
