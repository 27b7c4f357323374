//! SSIM threshold presets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lowest accepted SSIM threshold.
pub const MIN_SSIM_THRESHOLD: f64 = 0.9;
/// Highest accepted SSIM threshold.
pub const MAX_SSIM_THRESHOLD: f64 = 1.0;

/// Named sensitivity levels for slide-change detection.
///
/// Higher thresholds treat smaller differences as a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SsimPreset {
    #[default]
    Strict,
    Normal,
    Loose,
    /// Reserved for content-aware thresholds; currently behaves like `Normal`.
    Adaptive,
}

impl SsimPreset {
    pub fn threshold(&self) -> f64 {
        match self {
            SsimPreset::Strict => 0.999,
            SsimPreset::Normal | SsimPreset::Adaptive => 0.9987,
            SsimPreset::Loose => 0.998,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SsimPreset::Strict => "strict",
            SsimPreset::Normal => "normal",
            SsimPreset::Loose => "loose",
            SsimPreset::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for SsimPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SsimPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(SsimPreset::Strict),
            "normal" => Ok(SsimPreset::Normal),
            "loose" => Ok(SsimPreset::Loose),
            "adaptive" => Ok(SsimPreset::Adaptive),
            other => Err(format!("unknown SSIM preset: {}", other)),
        }
    }
}

/// Check a raw threshold against the accepted range.
pub fn validate_threshold(threshold: f64) -> Result<(), String> {
    if !(MIN_SSIM_THRESHOLD..=MAX_SSIM_THRESHOLD).contains(&threshold) {
        return Err(format!(
            "SSIM threshold must be within [{}, {}], got {}",
            MIN_SSIM_THRESHOLD, MAX_SSIM_THRESHOLD, threshold
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_ordered_by_sensitivity() {
        assert!(SsimPreset::Strict.threshold() > SsimPreset::Normal.threshold());
        assert!(SsimPreset::Normal.threshold() > SsimPreset::Loose.threshold());
        assert_eq!(SsimPreset::Adaptive.threshold(), SsimPreset::Normal.threshold());
    }

    #[test]
    fn test_default_config_uses_default_preset() {
        assert_eq!(SsimPreset::default(), SsimPreset::Strict);
        assert_eq!(
            crate::similarity::SsimConfig::default().threshold,
            SsimPreset::default().threshold()
        );
    }

    #[test]
    fn test_parse_preset() {
        assert_eq!("Strict".parse::<SsimPreset>().unwrap(), SsimPreset::Strict);
        assert!("medium".parse::<SsimPreset>().is_err());
    }

    #[test]
    fn test_validate_threshold_range() {
        assert!(validate_threshold(0.9).is_ok());
        assert!(validate_threshold(1.0).is_ok());
        assert!(validate_threshold(0.89).is_err());
        assert!(validate_threshold(1.01).is_err());
        assert!(validate_threshold(f64::NAN).is_err());
    }
}
