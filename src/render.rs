//! Chart payload for the choropleth: one trace, a layout and the interaction config.
//!
//! Everything here is declarative data shaped the way Plotly consumes it. Building a
//! payload never mutates its inputs, and equal inputs give equal payloads.

use crate::join::{join_features, HoverLabels, JoinReport};
use crate::table::ParsedTable;
use crate::types::{CanonicalKey, HoverDetail};
use geojson::FeatureCollection;
use serde::{Serialize, Serializer};

/// Light-to-dark reds.
pub const COLOR_SCALE: [ColorStop; 6] = [
    ColorStop(0.0, "#fee5d9"),
    ColorStop(0.2, "#fcbba1"),
    ColorStop(0.4, "#fc9272"),
    ColorStop(0.6, "#fb6a4a"),
    ColorStop(0.8, "#ef3b2c"),
    ColorStop(1.0, "#a50f15"),
];

pub const REMOVED_MODE_BAR_BUTTONS: [&str; 5] =
    ["select2d", "lasso2d", "pan2d", "zoomIn2d", "zoomOut2d"];

const TRANSPARENT: &str = "rgba(0,0,0,0)";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayOptions {
    /// Compact (mobile) layout: only the map height changes.
    pub compact: bool,
    pub labels: HoverLabels,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColorStop(pub f64, pub &'static str);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderPayload {
    #[serde(rename = "data", serialize_with = "single_trace")]
    pub trace: ChoroplethTrace,
    pub layout: Layout,
    #[serde(rename = "config")]
    pub interaction_config: InteractionConfig,
}

fn single_trace<S: Serializer>(trace: &ChoroplethTrace, s: S) -> Result<S::Ok, S::Error> {
    std::slice::from_ref(trace).serialize(s)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoroplethTrace {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(rename = "geojson")]
    pub geometry: FeatureCollection,
    #[serde(rename = "locations")]
    pub keys: Vec<CanonicalKey>,
    #[serde(rename = "z")]
    pub values: Vec<f64>,
    #[serde(rename = "text")]
    pub hover_texts: Vec<String>,
    pub customdata: Vec<HoverDetail>,
    pub featureidkey: &'static str,
    pub locationmode: &'static str,
    pub colorscale: Vec<ColorStop>,
    pub colorbar: ColorBar,
    pub hovertemplate: &'static str,
    pub marker: Marker,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorBar {
    pub title: ColorBarTitle,
    pub thickness: u32,
    pub len: f64,
    pub outlinewidth: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorBarTitle {
    pub text: String,
    pub side: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub line: MarkerLine,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerLine {
    pub color: &'static str,
    pub width: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout {
    pub geo: GeoLayout,
    pub height: u32,
    pub margin: Margin,
    pub paper_bgcolor: &'static str,
    pub plot_bgcolor: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoLayout {
    pub scope: &'static str,
    pub projection: Projection,
    pub showlakes: bool,
    pub lakecolor: &'static str,
    pub bgcolor: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projection {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Margin {
    pub t: u32,
    pub b: u32,
    pub l: u32,
    pub r: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionConfig {
    pub responsive: bool,
    pub display_mode_bar: bool,
    pub mode_bar_buttons_to_remove: Vec<&'static str>,
    pub displaylogo: bool,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            responsive: true,
            display_mode_bar: true,
            mode_bar_buttons_to_remove: REMOVED_MODE_BAR_BUTTONS.to_vec(),
            displaylogo: false,
        }
    }
}

impl Layout {
    pub fn for_display(compact: bool) -> Self {
        Self {
            geo: GeoLayout {
                scope: "usa",
                projection: Projection { kind: "albers usa" },
                showlakes: true,
                lakecolor: "rgb(255, 255, 255)",
                bgcolor: TRANSPARENT,
            },
            height: if compact { 500 } else { 700 },
            margin: Margin { t: 0, b: 0, l: 0, r: 0 },
            paper_bgcolor: TRANSPARENT,
            plot_bgcolor: TRANSPARENT,
        }
    }
}

/// Payload plus the join bookkeeping of the pass that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPass {
    pub payload: RenderPayload,
    pub report: JoinReport,
}

/// Joins a copy of `geometry` against `table` and wraps the result in a chart payload.
pub fn build_payload(
    geometry: &FeatureCollection,
    table: &ParsedTable,
    options: &DisplayOptions,
) -> RenderPass {
    let mut geometry = geometry.clone();
    let (arrays, report) = join_features(&mut geometry, table, &options.labels);

    let trace = ChoroplethTrace {
        kind: "choropleth",
        geometry,
        keys: arrays.keys,
        values: arrays.values,
        hover_texts: arrays.hover_texts,
        customdata: arrays.details,
        featureidkey: "id",
        locationmode: "geojson-id",
        colorscale: COLOR_SCALE.to_vec(),
        colorbar: ColorBar {
            title: ColorBarTitle {
                text: format!("{}<br>($M)", options.labels.benefits),
                side: "right",
            },
            thickness: 20,
            len: 0.7,
            outlinewidth: 0,
        },
        hovertemplate: "%{text}<extra></extra>",
        marker: Marker {
            line: MarkerLine {
                color: "white",
                width: 0.5,
            },
        },
    };

    RenderPass {
        payload: RenderPayload {
            trace,
            layout: Layout::for_display(options.compact),
            interaction_config: InteractionConfig::default(),
        },
        report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::parse_table;
    use serde_json::json;

    fn fixture() -> (FeatureCollection, ParsedTable) {
        let fc = serde_json::from_value(json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": null, "properties": {"STATE": "6", "CD": "5"}},
                {"type": "Feature", "geometry": null, "properties": {"STATE": "36", "CD": "12"}},
                {"type": "Feature", "geometry": null, "properties": {"STATE": "06", "CD": "01"}}
            ]
        }))
        .unwrap();
        let table = parse_table(
            "geoid,state_fips,total_benefits,population\n\
             0600105,06,1234567.0,50000.0\n\
             601,6,2500000.0,30000.0\n",
            None,
        )
        .unwrap();
        (fc, table)
    }

    #[test]
    fn payload_is_deterministic() {
        let (fc, table) = fixture();
        let options = DisplayOptions::default();
        let a = build_payload(&fc, &table, &options);
        let b = build_payload(&fc, &table, &options);

        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a.payload).unwrap(),
            serde_json::to_string(&b.payload).unwrap()
        );
    }

    #[test]
    fn arrays_follow_input_order() {
        let (fc, table) = fixture();
        let pass = build_payload(&fc, &table, &DisplayOptions::default());
        let keys: Vec<_> = pass.payload.trace.keys.iter().map(|k| k.as_str()).collect();

        assert_eq!(keys, vec!["0605", "3612", "0601"]);
        assert_eq!(pass.payload.trace.values, vec![1.234567, 0.0, 2.5]);
        assert_eq!(pass.report.unmatched.len(), 1);
    }

    #[test]
    fn input_geometry_is_left_untouched() {
        let (fc, table) = fixture();
        let pass = build_payload(&fc, &table, &DisplayOptions::default());

        assert!(fc.features.iter().all(|f| f.id.is_none()));
        assert!(pass.payload.trace.geometry.features.iter().all(|f| f.id.is_some()));
    }

    #[test]
    fn serializes_in_plotly_shape() {
        let (fc, table) = fixture();
        let pass = build_payload(&fc, &table, &DisplayOptions::default());
        let value = serde_json::to_value(&pass.payload).unwrap();

        let trace = &value["data"][0];
        assert_eq!(trace["type"], "choropleth");
        assert_eq!(trace["locations"][0], "0605");
        assert_eq!(trace["geojson"]["features"][0]["id"], "0605");
        assert_eq!(trace["colorscale"][0], json!([0.0, "#fee5d9"]));
        assert_eq!(trace["colorscale"][5], json!([1.0, "#a50f15"]));
        assert_eq!(trace["colorbar"]["title"]["text"], "SNAP Benefits<br>($M)");
        assert_eq!(value["layout"]["geo"]["projection"]["type"], "albers usa");
        assert_eq!(value["layout"]["height"], 700);
        assert_eq!(value["config"]["displaylogo"], false);
        assert_eq!(
            value["config"]["modeBarButtonsToRemove"],
            json!(["select2d", "lasso2d", "pan2d", "zoomIn2d", "zoomOut2d"])
        );
    }

    #[test]
    fn compact_display_only_changes_layout() {
        let (fc, table) = fixture();
        let full = build_payload(&fc, &table, &DisplayOptions::default());
        let compact = build_payload(
            &fc,
            &table,
            &DisplayOptions {
                compact: true,
                ..DisplayOptions::default()
            },
        );

        assert_eq!(compact.payload.layout.height, 500);
        assert_eq!(full.payload.layout.height, 700);
        assert_eq!(compact.payload.trace, full.payload.trace);
    }

    #[test]
    fn colorscale_spans_zero_to_one() {
        assert_eq!(COLOR_SCALE.first().unwrap().0, 0.0);
        assert_eq!(COLOR_SCALE.last().unwrap().0, 1.0);
        assert!(COLOR_SCALE.windows(2).all(|w| w[0].0 < w[1].0));
    }
}
