use crate::config::ColumnConfig;
use crate::normalize::{tabular_key, KeyError};
use crate::types::{CanonicalKey, DistrictRecord};
use csv::{ReaderBuilder, StringRecord};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Records keyed by canonical key, plus every row that was turned away.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedTable {
    pub records: BTreeMap<CanonicalKey, DistrictRecord>,
    pub rejected: Vec<RowError>,
}

impl ParsedTable {
    pub fn get(&self, key: &CanonicalKey) -> Option<&DistrictRecord> {
        self.records.get(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("line {line}: {kind}")]
pub struct RowError {
    pub line: u64,
    pub kind: RowErrorKind,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowErrorKind {
    #[error("expected at least {expected} fields, found {found}")]
    TooFewFields { expected: usize, found: usize },
    #[error("bad identifier: {0}")]
    Key(#[from] KeyError),
    #[error("column '{column}' is not a non-negative number: '{value}'")]
    BadNumber { column: &'static str, value: String },
    #[error("unreadable row: {0}")]
    Malformed(String),
}

/// Failures that abort the whole parse.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to read CSV header: {0}")]
    Header(#[from] csv::Error),
    #[error("column '{0}' not found in CSV header")]
    MissingColumn(String),
}

/// Field positions for the four columns the join needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    geoid: usize,
    state_fips: usize,
    total_benefits: usize,
    population: usize,
}

impl Layout {
    const POSITIONAL: Layout = Layout {
        geoid: 0,
        state_fips: 1,
        total_benefits: 2,
        population: 3,
    };

    fn resolve(headers: &StringRecord, columns: Option<&ColumnConfig>) -> Result<Self, TableError> {
        let Some(columns) = columns else {
            return Ok(Self::POSITIONAL);
        };
        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| TableError::MissingColumn(name.to_string()))
        };
        Ok(Layout {
            geoid: position(&columns.geoid)?,
            state_fips: position(&columns.state_fips)?,
            total_benefits: position(&columns.total_benefits)?,
            population: position(&columns.population)?,
        })
    }

    fn min_fields(&self) -> usize {
        [self.geoid, self.state_fips, self.total_benefits, self.population]
            .into_iter()
            .max()
            .unwrap_or(0)
            + 1
    }
}

/// Parses the benefits CSV. The header row is always skipped. Rows with bad
/// identifiers or numbers are rejected and recorded; later rows win on key collision.
pub fn parse_table(text: &str, columns: Option<&ColumnConfig>) -> Result<ParsedTable, TableError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    let layout = Layout::resolve(rdr.headers()?, columns)?;

    let mut table = ParsedTable::default();
    for (index, result) in rdr.records().enumerate() {
        // header is line 1
        let fallback_line = index as u64 + 2;
        let parsed = match result {
            Ok(row) => {
                let line = row.position().map(|p| p.line()).unwrap_or(fallback_line);
                parse_row(&row, layout).map_err(|kind| RowError { line, kind })
            }
            Err(e) => Err(RowError {
                line: e.position().map(|p| p.line()).unwrap_or(fallback_line),
                kind: RowErrorKind::Malformed(e.to_string()),
            }),
        };

        match parsed {
            Ok(record) => {
                let key = record.key();
                if let Some(previous) = table.records.insert(key.clone(), record) {
                    debug!("Duplicate district {} (geoid {}), keeping later row", key, previous.geoid);
                }
            }
            Err(err) => {
                warn!("Rejected CSV row: {}", err);
                table.rejected.push(err);
            }
        }
    }

    debug!(
        "Parsed {} district records, rejected {} rows",
        table.records.len(),
        table.rejected.len()
    );
    Ok(table)
}

fn parse_row(row: &StringRecord, layout: Layout) -> Result<DistrictRecord, RowErrorKind> {
    let expected = layout.min_fields().max(4);
    if row.len() < expected {
        return Err(RowErrorKind::TooFewFields {
            expected,
            found: row.len(),
        });
    }
    let field = |i: usize| row.get(i).unwrap_or("");

    let geoid = field(layout.geoid);
    let (_, state_fips, district_number) = tabular_key(geoid, field(layout.state_fips))?;
    let total_benefits = parse_amount("total_benefits", field(layout.total_benefits))?;
    let population = parse_amount("population", field(layout.population))?;

    Ok(DistrictRecord {
        geoid: geoid.to_string(),
        state_fips,
        district_number,
        total_benefits,
        population,
    })
}

fn parse_amount(column: &'static str, value: &str) -> Result<f64, RowErrorKind> {
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(RowErrorKind::BadNumber {
            column,
            value: value.to_string(),
        }),
    }
}
