//! Error types for the shadow and lighting system
//!
//! Per-frame allocation never fails: capacity problems degrade a light to
//! "no shadow" instead. `ShadowError` only covers configuration loading,
//! while `ShadowRejection` names the reasons a shadow request was degraded.

use thiserror::Error;

/// Shadow configuration errors
#[derive(Debug, Error)]
pub enum ShadowError {
    /// Settings document could not be parsed
    #[error("Failed to parse shadow settings: {0}")]
    Parse(#[from] serde_json::Error),

    /// Settings contain a value that cannot be clamped into range
    #[error("Invalid shadow settings: {0}")]
    InvalidSettings(String),
}

/// Result type for shadow configuration
pub type Result<T> = std::result::Result<T, ShadowError>;

/// Why a light did not receive a shadow map this frame
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ShadowRejection {
    /// All directional shadow slots are taken
    #[error("directional shadow capacity of {capacity} exceeded")]
    DirectionalCapacity {
        /// Maximum shadowed directional lights
        capacity: usize,
    },

    /// Not enough contiguous other-light slots remain
    #[error("other shadow capacity exceeded: {required} slots needed, {available} of {capacity} free")]
    OtherCapacity {
        /// Slots the light needs (6 for point, 1 for spot)
        required: usize,
        /// Slots still free
        available: usize,
        /// Total slots
        capacity: usize,
    },

    /// Nothing casts a shadow for this light this frame
    #[error("no visible shadow casters")]
    NoCasterGeometry,

    /// The light was dropped by the lighting capacity before reservation
    #[error("light dropped by lighting capacity of {capacity}")]
    LightingCapacity {
        /// Lighting capacity for the light's type
        capacity: usize,
    },
}

impl ShadowRejection {
    /// Capacity problems are worth a warning; missing casters are routine
    pub fn is_capacity(&self) -> bool {
        !matches!(self, Self::NoCasterGeometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_messages() {
        let msg = ShadowRejection::OtherCapacity { required: 6, available: 4, capacity: 16 }.to_string();
        assert_eq!(msg, "other shadow capacity exceeded: 6 slots needed, 4 of 16 free");
        assert!(ShadowRejection::DirectionalCapacity { capacity: 4 }.is_capacity());
        assert!(!ShadowRejection::NoCasterGeometry.is_capacity());
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: ShadowError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, ShadowError::Parse(_)));
    }
}
