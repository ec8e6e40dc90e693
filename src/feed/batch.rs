use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::error::FeedError;
use super::types::parse_export_timestamp;
use super::{Beer, Brewery, CheckinRecord, ItemSource, Page, StopReason, Venue};

pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Check-ins loaded up front from an export file and served in fixed-size
/// pages. The page cursor is a row offset.
#[derive(Debug)]
pub struct BatchSource {
    records: Vec<CheckinRecord>,
    page_size: usize,
}

#[derive(Debug, Error)]
enum RowError {
    #[error("expected {expected} columns, found {found}")]
    ColumnCount { expected: usize, found: usize },
    #[error("unparseable checkin_id {0:?}")]
    Id(String),
    #[error("unparseable created_at {0:?}")]
    Timestamp(String),
}

impl BatchSource {
    pub fn new(records: Vec<CheckinRecord>, page_size: usize) -> Self {
        Self {
            records,
            page_size: page_size.max(1),
        }
    }

    pub fn from_csv_path(path: &Path, page_size: usize) -> Result<Self, FeedError> {
        let import_error = |source: csv::Error| FeedError::Import {
            path: path.to_path_buf(),
            source,
        };
        let file = std::fs::File::open(path).map_err(|e| import_error(e.into()))?;
        let records = read_export(file).map_err(import_error)?;
        tracing::debug!("Parsed {} checkins from {}", records.len(), path.display());
        Ok(Self::new(records, page_size))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl ItemSource for BatchSource {
    async fn fetch(
        &self,
        cursor: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<Page, FeedError> {
        if cancel.is_cancelled() {
            return Err(FeedError::Cancelled);
        }
        if self.records.is_empty() {
            return Ok(Page::Done(StopReason::EmptyPage));
        }

        let offset = usize::try_from(cursor.unwrap_or(0)).unwrap_or(usize::MAX);
        if offset >= self.records.len() {
            return Ok(Page::Done(StopReason::NoMorePages));
        }
        let end = offset.saturating_add(self.page_size).min(self.records.len());
        let next = (end < self.records.len()).then_some(end as u64);
        Ok(Page::Items {
            checkins: self.records[offset..end].to_vec(),
            next,
        })
    }

    fn tracks_cursor(&self) -> bool {
        false
    }
}

/// Parse an export file, mapping columns by header name. Bad rows are
/// logged and skipped; only a broken header or unreadable input fails.
pub(crate) fn read_export<R: Read>(input: R) -> Result<Vec<CheckinRecord>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(input);
    let headers = reader.headers()?.clone();
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (index, row) in reader.records().enumerate() {
        // Header is line 1.
        let line = index + 2;
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(line, "Skipping unreadable export row: {}", e);
                skipped += 1;
                continue;
            }
        };
        match parse_row(&headers, &row) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(line, "Skipping export row: {}", e);
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        tracing::warn!("Skipped {} malformed export rows", skipped);
    }
    Ok(records)
}

fn parse_row(headers: &csv::StringRecord, row: &csv::StringRecord) -> Result<CheckinRecord, RowError> {
    if row.len() != headers.len() {
        return Err(RowError::ColumnCount {
            expected: headers.len(),
            found: row.len(),
        });
    }
    let fields: HashMap<&str, &str> = headers.iter().zip(row.iter()).collect();
    let text = |name: &str| fields.get(name).map(|v| v.trim()).unwrap_or_default();
    let number = |name: &str| text(name).parse::<f64>().unwrap_or(0.0);

    let raw_id = text("checkin_id");
    let id = raw_id
        .parse::<u64>()
        .map_err(|_| RowError::Id(raw_id.to_string()))?;
    let raw_created = text("created_at");
    let created_at =
        parse_export_timestamp(raw_created).ok_or_else(|| RowError::Timestamp(raw_created.to_string()))?;

    let venue_name = text("venue_name");
    let venue = (!venue_name.is_empty()).then(|| Venue {
        name: venue_name.to_string(),
        city: text("venue_city").to_string(),
        state: text("venue_state").to_string(),
        country: text("venue_country").to_string(),
        lat: number("venue_lat"),
        lng: number("venue_lng"),
    });
    let optional = |name: &str| Some(text(name)).filter(|v| !v.is_empty()).map(str::to_string);

    Ok(CheckinRecord {
        id,
        created_at,
        comment: text("comment").to_string(),
        rating: number("rating_score"),
        beer: Beer {
            name: text("beer_name").to_string(),
            style: text("beer_type").to_string(),
            abv: number("beer_abv"),
        },
        brewery: Brewery {
            name: text("brewery_name").to_string(),
            country: text("brewery_country").to_string(),
        },
        venue,
        photo_url: optional("photo_url"),
        serving_type: optional("serving_type"),
    })
}
