use crate::normalize::FeatureKeyer;
use crate::table::ParsedTable;
use crate::types::{CanonicalKey, HoverDetail};
use geojson::feature::Id;
use geojson::FeatureCollection;
use serde::Serialize;
use tracing::{debug, warn};

/// Text fragments used when building hover strings.
#[derive(Debug, Clone, PartialEq)]
pub struct HoverLabels {
    pub benefits: String,
    pub recipients: String,
}

impl Default for HoverLabels {
    fn default() -> Self {
        Self {
            benefits: "SNAP Benefits".to_string(),
            recipients: "Recipients".to_string(),
        }
    }
}

/// Parallel per-feature arrays, in collection order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinedArrays {
    pub keys: Vec<CanonicalKey>,
    /// Benefits in millions.
    pub values: Vec<f64>,
    pub hover_texts: Vec<String>,
    pub details: Vec<HoverDetail>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JoinReport {
    pub features: usize,
    pub matched: usize,
    pub unmatched: Vec<CanonicalKey>,
    /// Features with no usable state or district identifier.
    pub unkeyed: usize,
}

pub fn millions(amount: f64) -> f64 {
    amount / 1e6
}

pub fn thousands(amount: f64) -> f64 {
    amount / 1e3
}

/// Rounds to `places` decimals with ties going away from zero, so `0.25` shows as
/// `0.3` rather than the `0.2` that `{:.1}` alone would print.
pub fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

pub fn hover_text(name: &str, detail: &HoverDetail, labels: &HoverLabels) -> String {
    format!(
        "{name}<br>State FIPS: {}<br>{}: ${:.1}M<br>{}: {:.1}K",
        detail.state,
        labels.benefits,
        round_to(millions(detail.benefits), 1),
        labels.recipients,
        round_to(thousands(detail.population), 1),
    )
}

/// Attaches tabular records to every feature of `collection`.
///
/// Every feature gets its canonical key written to `id`; no other property is touched.
/// The arrays have one entry per feature, in collection order. Features without a
/// record carry zero values. Features whose identifiers cannot be read are logged,
/// counted as unkeyed and joined under [`CanonicalKey::unkeyed`], which matches no
/// record.
pub fn join_features(
    collection: &mut FeatureCollection,
    table: &ParsedTable,
    labels: &HoverLabels,
) -> (JoinedArrays, JoinReport) {
    let keyer = FeatureKeyer::for_collection(collection);
    let mut arrays = JoinedArrays::default();
    let mut report = JoinReport {
        features: collection.features.len(),
        ..JoinReport::default()
    };

    for (index, feature) in collection.features.iter_mut().enumerate() {
        let empty = geojson::JsonObject::new();
        let props = feature.properties.as_ref().unwrap_or(&empty);
        let keyed = match keyer.key_for(props) {
            Ok(keyed) => keyed,
            Err(e) => {
                warn!("Feature {} has no usable district identifier: {}", index, e);
                report.unkeyed += 1;
                keyer.placeholder(props)
            }
        };

        // a CSV row for state 00 also keys to 0000
        let record = if keyed.key.is_unkeyed() {
            None
        } else {
            table.get(&keyed.key)
        };
        let (benefits, population) = match record {
            Some(record) => {
                report.matched += 1;
                (record.total_benefits, record.population)
            }
            None => {
                if !keyed.key.is_unkeyed() {
                    report.unmatched.push(keyed.key.clone());
                }
                (0.0, 0.0)
            }
        };

        let detail = HoverDetail {
            state: keyed.state,
            district: keyed.district,
            benefits,
            population,
        };

        feature.id = Some(Id::String(keyed.key.to_string()));
        arrays.hover_texts.push(hover_text(&keyed.display_name, &detail, labels));
        arrays.values.push(millions(benefits));
        arrays.keys.push(keyed.key);
        arrays.details.push(detail);
    }

    debug!(
        "Joined {} features: {} matched, {} unmatched, {} unkeyed",
        report.features,
        report.matched,
        report.unmatched.len(),
        report.unkeyed
    );
    (arrays, report)
}
