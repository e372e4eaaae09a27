use crate::config::InputConfig;
use crate::spatial::DistrictIndex;
use crate::table::{parse_table, ParsedTable};
use crate::types::GeometrySource;
use geojson::{FeatureCollection, GeoJson};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// The three source files, decoded and held in memory for the whole session, plus a
/// point lookup index per geometry.
#[derive(Debug)]
pub struct LoadedInputs {
    pub hex: FeatureCollection,
    pub geographic: FeatureCollection,
    pub table: ParsedTable,
    hex_index: DistrictIndex,
    geographic_index: DistrictIndex,
}

impl LoadedInputs {
    pub fn new(hex: FeatureCollection, geographic: FeatureCollection, table: ParsedTable) -> Self {
        Self {
            hex_index: DistrictIndex::build(&hex),
            geographic_index: DistrictIndex::build(&geographic),
            hex,
            geographic,
            table,
        }
    }

    pub fn geometry(&self, source: GeometrySource) -> &FeatureCollection {
        match source {
            GeometrySource::Hex => &self.hex,
            GeometrySource::Geographic => &self.geographic,
        }
    }

    pub fn index(&self, source: GeometrySource) -> &DistrictIndex {
        match source {
            GeometrySource::Hex => &self.hex_index,
            GeometrySource::Geographic => &self.geographic_index,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Fetch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {}: {message}", path.display())]
    Decode { path: PathBuf, message: String },
}

async fn fetch_text(path: &Path) -> Result<String, LoadError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| LoadError::Fetch {
            path: path.to_path_buf(),
            source,
        })
}

fn decode_collection(path: &Path, text: &str) -> Result<FeatureCollection, LoadError> {
    let decode_err = |message: String| LoadError::Decode {
        path: path.to_path_buf(),
        message,
    };
    let geojson: GeoJson = text.parse().map_err(|e: geojson::Error| decode_err(e.to_string()))?;
    match geojson {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        _ => Err(decode_err("GeoJSON must be a FeatureCollection".to_string())),
    }
}

/// Reads all three sources concurrently. Nothing is decoded until every read has
/// succeeded; the first failure wins.
pub async fn load_inputs(input: &InputConfig) -> Result<LoadedInputs, LoadError> {
    info!("Loading geometry and benefits data...");
    let (hex_text, geo_text, csv_text) = tokio::try_join!(
        fetch_text(&input.hex_geojson),
        fetch_text(&input.geographic_geojson),
        fetch_text(&input.data_csv),
    )?;

    let hex = decode_collection(&input.hex_geojson, &hex_text)?;
    let geographic = decode_collection(&input.geographic_geojson, &geo_text)?;
    let table = parse_table(&csv_text, input.columns.as_ref()).map_err(|e| LoadError::Decode {
        path: input.data_csv.clone(),
        message: e.to_string(),
    })?;

    if !table.rejected.is_empty() {
        warn!("{} CSV rows were rejected", table.rejected.len());
    }
    info!(
        "Loaded {} hex features, {} geographic features, {} district records",
        hex.features.len(),
        geographic.features.len(),
        table.len()
    );

    Ok(LoadedInputs::new(hex, geographic, table))
}
