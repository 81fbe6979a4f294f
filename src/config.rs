use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const NTSC_CPU_FREQUENCY_HZ: f64 = 1_789_773.0;

/// Tunable console parameters. Missing JSON fields fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// PPU cycles between the VBlank NMI edge and its delivery to the CPU.
    /// Compensates for CPU/PPU skew some games depend on; 0 fires immediately.
    pub nmi_delay_cycles: u8,
    /// Drop the last pre-render cycle on odd frames while rendering.
    pub odd_frame_skip: bool,
    pub sample_rate: u32,
    pub cpu_frequency_hz: f64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            nmi_delay_cycles: 15,
            odd_frame_skip: true,
            sample_rate: 48_000,
            cpu_frequency_hz: NTSC_CPU_FREQUENCY_HZ,
        }
    }
}

impl ConsoleConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).context("invalid console config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Rejects values the APU resampler and `run` pacing cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !self.cpu_frequency_hz.is_finite() || self.cpu_frequency_hz <= 0.0 {
            bail!(
                "cpu_frequency_hz must be a positive number, got {}",
                self.cpu_frequency_hz
            );
        }
        if self.sample_rate == 0 {
            bail!("sample_rate must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config = ConsoleConfig::from_json_str(r#"{ "nmi_delay_cycles": 0 }"#).unwrap();
        assert_eq!(config.nmi_delay_cycles, 0);
        assert!(config.odd_frame_skip);
        assert_eq!(config.sample_rate, 48_000);
    }

    #[test]
    fn rejects_wrong_types() {
        assert!(ConsoleConfig::from_json_str(r#"{ "sample_rate": "fast" }"#).is_err());
    }

    #[test]
    fn rejects_unusable_frequencies() {
        for text in [
            r#"{ "cpu_frequency_hz": 0.0 }"#,
            r#"{ "cpu_frequency_hz": -1789773.0 }"#,
            r#"{ "sample_rate": 0 }"#,
        ] {
            let err = ConsoleConfig::from_json_str(text).unwrap_err();
            assert!(err.to_string().contains("must be"), "{text}: {err}");
        }

        let config = ConsoleConfig {
            cpu_frequency_hz: f64::NAN,
            ..ConsoleConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(ConsoleConfig::default().validate().is_ok());
    }
}
