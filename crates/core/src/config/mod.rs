use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    analysis::SpectrumSettings,
    audio::TransformSize,
    params::ParameterValue,
    render::SurfaceSize,
    scene::{Color, DEFAULT_BACKGROUND},
    Result, VisualizerError,
};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub render: RenderConfig,
    pub visualizer: VisualizerConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing sections fall back to
    /// defaults; the result is validated before it is returned.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.audio.spectrum().validate()?;
        if self.audio.sample_rate == 0 {
            return Err(VisualizerError::InvalidConfig("sample rate must be positive".into()));
        }
        self.render.surface_size()?;
        self.render.background_color()?;
        if self.render.frame_rate == 0 {
            return Err(VisualizerError::InvalidConfig("frame rate must be positive".into()));
        }
        Ok(())
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub transform_size: TransformSize,
    pub smoothing_time_constant: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        let spectrum = SpectrumSettings::default();
        Self {
            sample_rate: 48_000,
            transform_size: TransformSize::DEFAULT,
            smoothing_time_constant: spectrum.smoothing_time_constant,
            min_decibels: spectrum.min_decibels,
            max_decibels: spectrum.max_decibels,
        }
    }
}

impl AudioConfig {
    pub fn spectrum(&self) -> SpectrumSettings {
        SpectrumSettings {
            smoothing_time_constant: self.smoothing_time_constant,
            min_decibels: self.min_decibels,
            max_decibels: self.max_decibels,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub background: String,
    pub frame_rate: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            background: DEFAULT_BACKGROUND.to_string(),
            frame_rate: 60,
        }
    }
}

impl RenderConfig {
    pub fn surface_size(&self) -> Result<SurfaceSize> {
        SurfaceSize::new(self.width, self.height).ok_or_else(|| {
            VisualizerError::InvalidConfig(format!(
                "surface {}x{} must have non-zero sides",
                self.width, self.height
            ))
        })
    }

    pub fn background_color(&self) -> Result<Color> {
        self.background.parse()
    }

    pub fn frame_interval(&self) -> f32 {
        1.0 / self.frame_rate.max(1) as f32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    pub name: String,
    pub slots: usize,
    /// Parameter values written over the visualizer's defaults after it is
    /// constructed.
    pub overrides: BTreeMap<String, ParameterValue>,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            name: "waveform".to_string(),
            slots: 50,
            overrides: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.audio.transform_size.get(), 2048);
        assert_eq!(config.visualizer.slots, 50);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{
                "audio": { "transform_size": 512 },
                "visualizer": {
                    "name": "lights",
                    "overrides": { "speed": 0.2, "bloomPass": false }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.audio.transform_size.get(), 512);
        assert_eq!(config.audio.sample_rate, 48_000);
        assert_eq!(config.render.frame_rate, 60);
        assert_eq!(config.visualizer.slots, 50);
        assert_eq!(
            config.visualizer.overrides.get("speed"),
            Some(&ParameterValue::Number(0.2))
        );
        assert_eq!(
            config.visualizer.overrides.get("bloomPass"),
            Some(&ParameterValue::Bool(false))
        );
    }

    #[test]
    fn unsupported_transform_size_is_rejected_at_parse_time() {
        let result: std::result::Result<AppConfig, _> =
            serde_json::from_str(r#"{ "audio": { "transform_size": 1000 } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn validation_catches_bad_render_settings() {
        let mut config = AppConfig::default();
        config.render.width = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.render.background = "teal".to_string();
        assert!(matches!(config.validate(), Err(VisualizerError::InvalidColor(_))));
    }

    #[test]
    fn reads_config_from_disk() {
        let path = std::env::temp_dir()
            .join(format!("visualizer-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "render": { "width": 640, "height": 360 } }"#).unwrap();
        let config = AppConfig::from_path(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.render.surface_size().unwrap(), SurfaceSize::new(640, 360).unwrap());
    }
}
