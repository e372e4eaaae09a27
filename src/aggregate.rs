//! Summary statistics over every parsed district, independent of which geometry
//! is on screen.

use crate::join::{round_to, HoverLabels};
use crate::table::ParsedTable;
use crate::types::{state_name, CanonicalKey, DistrictRecord};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AggregateError {
    #[error("no district data to aggregate")]
    NoData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateStats {
    pub total_benefits: f64,
    pub total_population: f64,
    pub district_count: usize,
    pub avg_benefits: f64,
    pub avg_population: f64,
}

/// Label/value pair as shown on a summary card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatCard {
    pub label: String,
    pub value: String,
}

pub fn aggregate(table: &ParsedTable) -> Result<AggregateStats, AggregateError> {
    let district_count = table.records.len();
    if district_count == 0 {
        return Err(AggregateError::NoData);
    }
    let (total_benefits, total_population) = table
        .records
        .values()
        .fold((0.0, 0.0), |(b, p), r| (b + r.total_benefits, p + r.population));

    Ok(AggregateStats {
        total_benefits,
        total_population,
        district_count,
        avg_benefits: total_benefits / district_count as f64,
        avg_population: total_population / district_count as f64,
    })
}

impl AggregateStats {
    /// Dashboard cards. The recipient card borrows the program name from the benefit
    /// label, so `"SNAP Benefits"` + `"Recipients"` reads `"SNAP Recipients"`.
    pub fn cards(&self, labels: &HoverLabels) -> Vec<StatCard> {
        let program = labels
            .benefits
            .strip_suffix("Benefits")
            .map(str::trim_end)
            .filter(|p| !p.is_empty());
        let recipients = match program {
            Some(program) => format!("{program} {}", labels.recipients),
            None => labels.recipients.clone(),
        };

        vec![
            StatCard {
                label: format!("Total {}", labels.benefits),
                value: format!("${:.1}B", round_to(self.total_benefits / 1e9, 1)),
            },
            StatCard {
                label: recipients,
                value: format!("{:.1}M", round_to(self.total_population / 1e6, 1)),
            },
            StatCard {
                label: "Congressional Districts".to_string(),
                value: self.district_count.to_string(),
            },
            StatCard {
                label: format!("Avg {} / District", labels.recipients),
                value: format!("{:.0}K", round_to(self.avg_population / 1e3, 0)),
            },
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedDistrict {
    pub key: CanonicalKey,
    pub total_benefits: f64,
    pub population: f64,
}

impl From<&DistrictRecord> for RankedDistrict {
    fn from(record: &DistrictRecord) -> Self {
        Self {
            key: record.key(),
            total_benefits: record.total_benefits,
            population: record.population,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rankings {
    pub top: Vec<RankedDistrict>,
    pub bottom: Vec<RankedDistrict>,
}

/// Top and bottom `n` districts by benefits. Ties order by key.
pub fn rank_districts(table: &ParsedTable, n: usize) -> Rankings {
    let mut ranked: Vec<RankedDistrict> = table.records.values().map(RankedDistrict::from).collect();
    ranked.sort_by(|a, b| {
        b.total_benefits
            .total_cmp(&a.total_benefits)
            .then_with(|| a.key.cmp(&b.key))
    });
    let top = ranked.iter().take(n).cloned().collect();

    ranked.sort_by(|a, b| {
        a.total_benefits
            .total_cmp(&b.total_benefits)
            .then_with(|| a.key.cmp(&b.key))
    });
    let bottom = ranked.into_iter().take(n).collect();

    Rankings { top, bottom }
}

/// Lowest and highest district by benefits across the whole table. Ties go to the
/// smaller key, matching [`rank_districts`].
pub fn benefit_range(table: &ParsedTable) -> Option<(RankedDistrict, RankedDistrict)> {
    let low = table
        .records
        .values()
        .min_by(|a, b| a.total_benefits.total_cmp(&b.total_benefits))?;
    // max_by keeps the last maximum, so walk keys backwards
    let high = table
        .records
        .values()
        .rev()
        .max_by(|a, b| a.total_benefits.total_cmp(&b.total_benefits))?;
    Some((low.into(), high.into()))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateTotal {
    pub state_fips: String,
    pub state_name: &'static str,
    pub total_benefits: f64,
    pub districts: usize,
}

/// Benefits summed per state, largest first.
pub fn state_totals(table: &ParsedTable) -> Vec<StateTotal> {
    let mut by_state: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for record in table.records.values() {
        let entry = by_state.entry(record.state_fips.as_str()).or_default();
        entry.0 += record.total_benefits;
        entry.1 += 1;
    }

    let mut totals: Vec<StateTotal> = by_state
        .into_iter()
        .map(|(fips, (total_benefits, districts))| StateTotal {
            state_fips: fips.to_string(),
            state_name: state_name(fips).unwrap_or("Unknown"),
            total_benefits,
            districts,
        })
        .collect();
    totals.sort_by(|a, b| b.total_benefits.total_cmp(&a.total_benefits));
    totals
}
