use crate::types::GeometrySource;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub hex_geojson: PathBuf,
    pub geographic_geojson: PathBuf,
    pub data_csv: PathBuf,
    /// Header names to use instead of the positional layout.
    pub columns: Option<ColumnConfig>,
}

impl InputConfig {
    pub fn geometry_path(&self, source: GeometrySource) -> &Path {
        match source {
            GeometrySource::Hex => &self.hex_geojson,
            GeometrySource::Geographic => &self.geographic_geojson,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ColumnConfig {
    pub geoid: String,
    pub state_fips: String,
    pub total_benefits: String,
    pub population: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    pub default_source: GeometrySource,
    /// Compact layout (shorter map).
    pub mobile: bool,
    pub benefit_label: String,
    pub recipient_label: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            default_source: GeometrySource::Hex,
            mobile: false,
            benefit_label: "SNAP Benefits".to_string(),
            recipient_label: "Recipients".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            static_dir: None,
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [input]
            hex_geojson = "data/hex.geojson"
            geographic_geojson = "data/real.geojson"
            data_csv = "data/snap.csv"
            "#,
        )
        .unwrap();

        assert_eq!(config.display, DisplayConfig::default());
        assert_eq!(config.server.port, 3000);
        assert!(config.input.columns.is_none());
        assert_eq!(
            config.input.geometry_path(GeometrySource::Geographic),
            Path::new("data/real.geojson")
        );
    }

    #[test]
    fn full_config_parses() {
        let config = AppConfig::from_toml(
            r#"
            [input]
            hex_geojson = "hex.geojson"
            geographic_geojson = "real.geojson"
            data_csv = "snap.csv"

            [input.columns]
            geoid = "congressional_district_geoid"
            state_fips = "state_fips"
            total_benefits = "total_weighted_snap"
            population = "snap_population"

            [display]
            default_source = "real"
            mobile = true

            [server]
            port = 8080
            static_dir = "public"
            "#,
        )
        .unwrap();

        assert_eq!(config.display.default_source, GeometrySource::Geographic);
        assert!(config.display.mobile);
        assert_eq!(config.display.benefit_label, "SNAP Benefits");
        assert_eq!(config.server.port, 8080);
        assert_eq!(
            config.input.columns.unwrap().total_benefits,
            "total_weighted_snap"
        );
    }

    #[test]
    fn missing_input_section_is_an_error() {
        assert!(AppConfig::from_toml("[server]\nport = 1").is_err());
    }
}
