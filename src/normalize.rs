//! Identifier normalization for both sides of the join.
//!
//! Geometry features name their identifiers differently depending on where the
//! boundary file came from. The hex cartogram carries `STATE`/`CD`, the Census
//! boundaries carry `STATEFP`/`CD118FP`. Each layout is a [`PropertySchema`]; a
//! [`FeatureKeyer`] picks the primary schema once per collection and falls back to
//! the other one field by field.
//!
//! The tabular side has a single geoid plus a state FIPS column; the district is
//! whatever follows the state prefix in the geoid. Both paths end in
//! [`CanonicalKey::from_segments`] so that equal districts collide.

use crate::types::CanonicalKey;
use geojson::{FeatureCollection, JsonObject, JsonValue};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("missing identifier field (tried {primary} and {fallback})")]
    MissingField {
        primary: &'static str,
        fallback: &'static str,
    },
    #[error("empty identifier")]
    Empty,
    #[error("identifier '{0}' is not numeric")]
    NotNumeric(String),
    #[error("geoid '{geoid}' is too short for state prefix '{state}'")]
    ShortGeoid { geoid: String, state: String },
}

/// Normalizes one identifier segment to exactly two digits.
///
/// Shorter values are left-padded with zeros; longer ones keep their trailing two
/// digits, which is where the district number sits in a geoid.
pub fn normalize_segment(raw: &str) -> Result<String, KeyError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(KeyError::Empty);
    }
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(KeyError::NotNumeric(raw.to_string()));
    }
    let padded = format!("{raw:0>2}");
    Ok(padded[padded.len() - 2..].to_string())
}

/// Tabular-side key: state from its own column, district from the geoid tail.
pub fn tabular_key(geoid: &str, state_fips: &str) -> Result<(CanonicalKey, String, String), KeyError> {
    let state = normalize_segment(state_fips)?;
    let geoid = geoid.trim();
    if !geoid.bytes().all(|b| b.is_ascii_digit()) {
        return Err(KeyError::NotNumeric(geoid.to_string()));
    }
    let tail = geoid
        .get(state.len()..)
        .filter(|tail| !tail.is_empty())
        .ok_or_else(|| KeyError::ShortGeoid {
            geoid: geoid.to_string(),
            state: state.clone(),
        })?;
    let district = normalize_segment(tail)?;
    Ok((CanonicalKey::from_segments(&state, &district), state, district))
}

/// Reads an identifier-like property as text. Strings are trimmed, integers rendered
/// in decimal; anything else counts as absent.
fn read_id(props: &JsonObject, field: &str) -> Option<String> {
    match props.get(field)? {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        JsonValue::Number(n) => n.as_u64().map(|n| n.to_string()),
        _ => None,
    }
}

/// Property layout of one geometry source.
pub trait PropertySchema: Sync {
    fn state_field(&self) -> &'static str;
    fn district_field(&self) -> &'static str;

    fn extract_state_id(&self, props: &JsonObject) -> Option<String> {
        read_id(props, self.state_field())
    }

    fn extract_district_id(&self, props: &JsonObject) -> Option<String> {
        read_id(props, self.district_field())
    }

    /// Long name if present, else a synthesized `District ...` label.
    fn extract_display_name(&self, props: &JsonObject, district: &str) -> String {
        if let Some(long) = read_text(props, "NAMELSAD") {
            return long;
        }
        match read_text(props, "NAME") {
            Some(name) => format!("District {name}"),
            None => format!("District {district}"),
        }
    }
}

fn read_text(props: &JsonObject, field: &str) -> Option<String> {
    match props.get(field)? {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Hexagonal cartogram: `STATE` / `CD`.
pub struct HexSchema;

impl PropertySchema for HexSchema {
    fn state_field(&self) -> &'static str {
        "STATE"
    }
    fn district_field(&self) -> &'static str {
        "CD"
    }
}

/// Census TIGER boundaries: `STATEFP` / `CD118FP`.
pub struct CensusSchema;

impl PropertySchema for CensusSchema {
    fn state_field(&self) -> &'static str {
        "STATEFP"
    }
    fn district_field(&self) -> &'static str {
        "CD118FP"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureKey {
    pub key: CanonicalKey,
    pub state: String,
    pub district: String,
    pub display_name: String,
}

/// Schema pair chosen for one collection.
pub struct FeatureKeyer {
    primary: &'static dyn PropertySchema,
    fallback: &'static dyn PropertySchema,
}

impl FeatureKeyer {
    pub fn new(primary: &'static dyn PropertySchema, fallback: &'static dyn PropertySchema) -> Self {
        Self { primary, fallback }
    }

    /// Hex schema leads whenever any feature carries its state field.
    pub fn for_collection(collection: &FeatureCollection) -> Self {
        let hex_present = collection.features.iter().any(|f| {
            f.properties
                .as_ref()
                .is_some_and(|p| p.contains_key(HexSchema.state_field()))
        });
        if hex_present {
            Self::new(&HexSchema, &CensusSchema)
        } else {
            Self::new(&CensusSchema, &HexSchema)
        }
    }

    pub fn primary_state_field(&self) -> &'static str {
        self.primary.state_field()
    }

    pub fn key_for(&self, props: &JsonObject) -> Result<FeatureKey, KeyError> {
        let state = self
            .primary
            .extract_state_id(props)
            .or_else(|| self.fallback.extract_state_id(props))
            .ok_or(KeyError::MissingField {
                primary: self.primary.state_field(),
                fallback: self.fallback.state_field(),
            })?;
        let district = self
            .primary
            .extract_district_id(props)
            .or_else(|| self.fallback.extract_district_id(props))
            .ok_or(KeyError::MissingField {
                primary: self.primary.district_field(),
                fallback: self.fallback.district_field(),
            })?;

        let state = normalize_segment(&state)?;
        let district = normalize_segment(&district)?;
        let display_name = self.primary.extract_display_name(props, &district);

        Ok(FeatureKey {
            key: CanonicalKey::from_segments(&state, &district),
            state,
            district,
            display_name,
        })
    }

    /// Stand-in for a feature that [`key_for`](Self::key_for) rejected. It carries
    /// [`CanonicalKey::unkeyed`] and whatever name the feature has.
    pub fn placeholder(&self, props: &JsonObject) -> FeatureKey {
        let named = read_text(props, "NAMELSAD").or_else(|| read_text(props, "NAME"));
        let display_name = match named {
            Some(_) => self.primary.extract_display_name(props, "00"),
            None => "Unknown District".to_string(),
        };
        let key = CanonicalKey::unkeyed();
        FeatureKey {
            state: key.state().to_string(),
            district: key.district().to_string(),
            key,
            display_name,
        }
    }
}
