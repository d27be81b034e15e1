use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinningConfig {
    #[serde(default = "default_bins")]
    pub default_bins: usize,
    #[serde(default = "default_z_bins")]
    pub quantile_z_bins: usize,
    #[serde(default = "default_z_low")]
    pub quantile_z_low: f64,
    #[serde(default = "default_z_high")]
    pub quantile_z_high: f64,
}

fn default_bins() -> usize {
    100
}
fn default_z_bins() -> usize {
    3000
}
fn default_z_low() -> f64 {
    0.0
}
fn default_z_high() -> f64 {
    30.0
}

impl Default for BinningConfig {
    fn default() -> Self {
        Self {
            default_bins: default_bins(),
            quantile_z_bins: default_z_bins(),
            quantile_z_low: default_z_low(),
            quantile_z_high: default_z_high(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurvivalConfig {
    /// a point survives when its significance exceeds this value
    #[serde(default = "default_z_threshold")]
    pub z_threshold: f64,
    #[serde(default = "default_cutoff")]
    pub cutoff: f64,
}

fn default_z_threshold() -> f64 {
    -1.64
}
fn default_cutoff() -> f64 {
    1e-3
}

impl Default for SurvivalConfig {
    fn default() -> Self {
        Self {
            z_threshold: default_z_threshold(),
            cutoff: default_cutoff(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredibilityConfig {
    #[serde(default = "default_intervals")]
    pub intervals: Vec<f64>,
    #[serde(default = "default_smooth")]
    pub smooth: bool,
    #[serde(default = "default_min_contour_points")]
    pub min_contour_points: usize,
}

fn default_intervals() -> Vec<f64> {
    vec![0.1, 0.67, 0.95]
}
fn default_smooth() -> bool {
    true
}
fn default_min_contour_points() -> usize {
    5
}

impl Default for CredibilityConfig {
    fn default() -> Self {
        Self {
            intervals: default_intervals(),
            smooth: default_smooth(),
            min_contour_points: default_min_contour_points(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_format() -> String {
    "svg".into()
}
fn default_output_dir() -> String {
    "plots".into()
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            output_dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

fn default_width() -> u32 {
    800
}
fn default_height() -> u32 {
    600
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub binning: BinningConfig,
    #[serde(default)]
    pub survival: SurvivalConfig,
    #[serde(default)]
    pub credibility: CredibilityConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

impl Config {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pmssm")
            .join("config.toml")
    }

    pub fn load() -> crate::Result<Self> {
        let path = if let Ok(env_path) = std::env::var("PMSSM_CONFIG") {
            PathBuf::from(env_path) // $PMSSM_CONFIG overrides default config path
        } else {
            Self::config_path()
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let cfg: Self =
            toml::from_str(&content).map_err(|e| crate::PmssmError::Config(e.to_string()))?;
        Ok(cfg)
    }

    pub fn save(&self) -> crate::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> crate::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::PmssmError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
