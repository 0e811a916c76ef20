// src/forecast/dataset.rs
//! Historical page-view dataset: wide CSV (`Page`, then one column per
//! date-time) reshaped into per-page daily series at load time.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{PipelineError, PipelineResult};

/// One observation of the long-form dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesPoint {
    pub page: String,
    pub date: NaiveDate,
    pub views: Option<f64>,
}

/// In-memory dataset keyed by page, each series ordered by date and unique per day.
#[derive(Debug, Default)]
pub struct HistoricalDataset {
    series: HashMap<String, BTreeMap<NaiveDate, Option<f64>>>,
}

const PAGE_COLUMN: &str = "Page";

impl HistoricalDataset {
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| PipelineError::Dataset(format!("opening {}: {e}", path.display())))?;
        let ds = Self::from_reader(file)?;
        tracing::info!(
            path = %path.display(),
            pages = ds.page_count(),
            "historical dataset loaded"
        );
        Ok(ds)
    }

    pub fn from_reader<R: Read>(reader: R) -> PipelineResult<Self> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers = rdr
            .headers()
            .map_err(|e| PipelineError::Dataset(format!("reading header: {e}")))?
            .clone();

        let page_idx = headers
            .iter()
            .position(|h| h.trim() == PAGE_COLUMN)
            .ok_or_else(|| PipelineError::Dataset("missing 'Page' column".into()))?;

        let mut dates = Vec::with_capacity(headers.len());
        for (i, h) in headers.iter().enumerate() {
            if i == page_idx {
                dates.push(None);
                continue;
            }
            let d = parse_column_date(h).ok_or_else(|| {
                PipelineError::Dataset(format!("unparseable date column '{h}'"))
            })?;
            dates.push(Some(d));
        }

        let mut series: HashMap<String, BTreeMap<NaiveDate, Option<f64>>> = HashMap::new();
        for (row_no, record) in rdr.records().enumerate() {
            let record =
                record.map_err(|e| PipelineError::Dataset(format!("row {}: {e}", row_no + 1)))?;
            let Some(page) = record.get(page_idx).map(str::trim) else {
                continue;
            };
            if page.is_empty() {
                continue;
            }
            let entry = series.entry(page.to_string()).or_default();
            for (i, cell) in record.iter().enumerate() {
                let Some(Some(date)) = dates.get(i) else {
                    continue;
                };
                // same day seen twice (hourly columns / duplicate rows): last wins
                entry.insert(*date, parse_views(cell));
            }
        }

        Ok(Self { series })
    }

    pub fn page_count(&self) -> usize {
        self.series.len()
    }

    pub fn contains(&self, page: &str) -> bool {
        self.series.contains_key(page)
    }

    /// Last historical date for `page`, regardless of missing views.
    pub fn last_date(&self, page: &str) -> Option<NaiveDate> {
        self.series
            .get(page)
            .and_then(|s| s.keys().next_back().copied())
    }

    /// Ordered points of `page` strictly before `before`.
    pub fn points_before(&self, page: &str, before: NaiveDate) -> Vec<TimeSeriesPoint> {
        self.series
            .get(page)
            .map(|s| {
                s.range(..before)
                    .map(|(d, v)| TimeSeriesPoint {
                        page: page.to_string(),
                        date: *d,
                        views: *v,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn parse_column_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    for fmt in ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn parse_views(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}
