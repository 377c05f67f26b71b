//! Shader Keywords
//!
//! Global shader variant keywords toggled by the lighting and shadow setup.
//! Keywords come in mutually exclusive groups (filter tiers, blend modes);
//! at most one keyword of a group is enabled at a time.

use serde::{Deserialize, Serialize};

/// Set of enabled shader keywords
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShaderKeywords(u32);

impl ShaderKeywords {
    /// No keywords
    pub const NONE: Self = Self(0);

    /// Directional 3x3 PCF
    pub const DIRECTIONAL_PCF3: Self = Self(1 << 0);

    /// Directional 5x5 PCF
    pub const DIRECTIONAL_PCF5: Self = Self(1 << 1);

    /// Directional 7x7 PCF
    pub const DIRECTIONAL_PCF7: Self = Self(1 << 2);

    /// Point/spot 3x3 PCF
    pub const OTHER_PCF3: Self = Self(1 << 3);

    /// Point/spot 5x5 PCF
    pub const OTHER_PCF5: Self = Self(1 << 4);

    /// Point/spot 7x7 PCF
    pub const OTHER_PCF7: Self = Self(1 << 5);

    /// Soft cascade blending
    pub const CASCADE_BLEND_SOFT: Self = Self(1 << 6);

    /// Dithered cascade blending
    pub const CASCADE_BLEND_DITHER: Self = Self(1 << 7);

    /// Baked shadowmask used at all distances
    pub const SHADOW_MASK_ALWAYS: Self = Self(1 << 8);

    /// Baked shadowmask used beyond the shadow distance
    pub const SHADOW_MASK_DISTANCE: Self = Self(1 << 9);

    /// Per-object light index lists
    pub const LIGHTS_PER_OBJECT: Self = Self(1 << 10);

    /// Directional filter tiers (3x3, 5x5, 7x7)
    pub const DIRECTIONAL_FILTER_GROUP: [Self; 3] = [
        Self::DIRECTIONAL_PCF3,
        Self::DIRECTIONAL_PCF5,
        Self::DIRECTIONAL_PCF7,
    ];

    /// Point/spot filter tiers (3x3, 5x5, 7x7)
    pub const OTHER_FILTER_GROUP: [Self; 3] = [
        Self::OTHER_PCF3,
        Self::OTHER_PCF5,
        Self::OTHER_PCF7,
    ];

    /// Cascade blend modes (soft, dither)
    pub const CASCADE_BLEND_GROUP: [Self; 2] = [
        Self::CASCADE_BLEND_SOFT,
        Self::CASCADE_BLEND_DITHER,
    ];

    /// Shadowmask modes (always, distance)
    pub const SHADOW_MASK_GROUP: [Self; 2] = [
        Self::SHADOW_MASK_ALWAYS,
        Self::SHADOW_MASK_DISTANCE,
    ];

    const NAMES: [(Self, &'static str); 11] = [
        (Self::DIRECTIONAL_PCF3, "_DIRECTIONAL_PCF3"),
        (Self::DIRECTIONAL_PCF5, "_DIRECTIONAL_PCF5"),
        (Self::DIRECTIONAL_PCF7, "_DIRECTIONAL_PCF7"),
        (Self::OTHER_PCF3, "_OTHER_PCF3"),
        (Self::OTHER_PCF5, "_OTHER_PCF5"),
        (Self::OTHER_PCF7, "_OTHER_PCF7"),
        (Self::CASCADE_BLEND_SOFT, "_CASCADE_BLEND_SOFT"),
        (Self::CASCADE_BLEND_DITHER, "_CASCADE_BLEND_DITHER"),
        (Self::SHADOW_MASK_ALWAYS, "_SHADOW_MASK_ALWAYS"),
        (Self::SHADOW_MASK_DISTANCE, "_SHADOW_MASK_DISTANCE"),
        (Self::LIGHTS_PER_OBJECT, "_LIGHTS_PER_OBJECT"),
    ];

    /// Create from raw bits
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Get raw bits
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Check if empty
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Check if all specified keywords are enabled
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Enable keywords
    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Disable keywords
    #[inline]
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Enable or disable keywords
    #[inline]
    pub fn set(&mut self, other: Self, value: bool) {
        if value {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }

    /// Enable exactly one keyword of a group, or none
    pub fn select(&mut self, group: &[Self], enabled: Option<usize>) {
        for (i, keyword) in group.iter().enumerate() {
            self.set(*keyword, enabled == Some(i));
        }
    }

    /// Shader-facing names of the enabled keywords
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        Self::NAMES
            .into_iter()
            .filter(move |(keyword, _)| self.contains(*keyword))
            .map(|(_, name)| name)
    }
}

impl core::ops::BitOr for ShaderKeywords {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for ShaderKeywords {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
