use serde::{Deserialize, Serialize};
use std::fmt;

/// Joined state + district identifier, always four ASCII digits (e.g. `"0605"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    /// Builds a key from two already-normalized 2-digit segments.
    pub(crate) fn from_segments(state: &str, district: &str) -> Self {
        debug_assert!(state.len() == 2 && district.len() == 2);
        let district = match (state, district) {
            // At-large states: hex cartogram reports "00", the data reports "01"
            ("02" | "10" | "38" | "46" | "50" | "56", "00") => "01",
            // DC delegate
            ("11", "98") => "01",
            _ => district,
        };
        CanonicalKey(format!("{state}{district}"))
    }

    /// Key given to a feature whose identifiers cannot be read. State `00` is not a
    /// FIPS code, so it never matches a tabular record.
    pub fn unkeyed() -> Self {
        CanonicalKey("0000".to_string())
    }

    pub fn is_unkeyed(&self) -> bool {
        self.0 == "0000"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn state(&self) -> &str {
        &self.0[..2]
    }

    pub fn district(&self) -> &str {
        &self.0[2..]
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistrictRecord {
    pub geoid: String,
    pub state_fips: String,
    pub district_number: String,
    pub total_benefits: f64,
    pub population: f64,
}

impl DistrictRecord {
    pub fn key(&self) -> CanonicalKey {
        CanonicalKey::from_segments(&self.state_fips, &self.district_number)
    }
}

/// Which of the two boundary files is displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GeometrySource {
    #[default]
    Hex,
    #[serde(alias = "real")]
    #[value(alias = "real")]
    Geographic,
}

impl fmt::Display for GeometrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeometrySource::Hex => f.write_str("hex"),
            GeometrySource::Geographic => f.write_str("geographic"),
        }
    }
}

/// Per-feature detail carried alongside the hover text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoverDetail {
    pub state: String,
    pub district: String,
    pub benefits: f64,
    pub population: f64,
}

pub fn state_name(fips: &str) -> Option<&'static str> {
    let name = match fips {
        "01" => "Alabama",
        "02" => "Alaska",
        "04" => "Arizona",
        "05" => "Arkansas",
        "06" => "California",
        "08" => "Colorado",
        "09" => "Connecticut",
        "10" => "Delaware",
        "11" => "DC",
        "12" => "Florida",
        "13" => "Georgia",
        "15" => "Hawaii",
        "16" => "Idaho",
        "17" => "Illinois",
        "18" => "Indiana",
        "19" => "Iowa",
        "20" => "Kansas",
        "21" => "Kentucky",
        "22" => "Louisiana",
        "23" => "Maine",
        "24" => "Maryland",
        "25" => "Massachusetts",
        "26" => "Michigan",
        "27" => "Minnesota",
        "28" => "Mississippi",
        "29" => "Missouri",
        "30" => "Montana",
        "31" => "Nebraska",
        "32" => "Nevada",
        "33" => "New Hampshire",
        "34" => "New Jersey",
        "35" => "New Mexico",
        "36" => "New York",
        "37" => "North Carolina",
        "38" => "North Dakota",
        "39" => "Ohio",
        "40" => "Oklahoma",
        "41" => "Oregon",
        "42" => "Pennsylvania",
        "44" => "Rhode Island",
        "45" => "South Carolina",
        "46" => "South Dakota",
        "47" => "Tennessee",
        "48" => "Texas",
        "49" => "Utah",
        "50" => "Vermont",
        "51" => "Virginia",
        "53" => "Washington",
        "54" => "West Virginia",
        "55" => "Wisconsin",
        "56" => "Wyoming",
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_splits_into_segments() {
        let key = CanonicalKey::from_segments("06", "05");
        assert_eq!(key.as_str(), "0605");
        assert_eq!(key.state(), "06");
        assert_eq!(key.district(), "05");
    }

    #[test]
    fn at_large_districts_remap_to_one() {
        assert_eq!(CanonicalKey::from_segments("02", "00").as_str(), "0201");
        assert_eq!(CanonicalKey::from_segments("56", "00").as_str(), "5601");
        assert_eq!(CanonicalKey::from_segments("11", "98").as_str(), "1101");
        // only at-large states are touched
        assert_eq!(CanonicalKey::from_segments("06", "00").as_str(), "0600");
    }

    #[test]
    fn unkeyed_key_is_four_digits() {
        let key = CanonicalKey::unkeyed();
        assert_eq!(key.as_str().len(), 4);
        assert!(key.is_unkeyed());
        assert!(!CanonicalKey::from_segments("06", "05").is_unkeyed());
    }

    #[test]
    fn geometry_source_accepts_real_alias() {
        let src: GeometrySource = serde_json::from_str("\"real\"").unwrap();
        assert_eq!(src, GeometrySource::Geographic);
        assert_eq!(GeometrySource::Hex.to_string(), "hex");
    }
}
