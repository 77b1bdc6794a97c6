//! Site list loading.
//!
//! The site list is either a CSV file or a spreadsheet (`.xlsx`, `.xlsm`,
//! `.xls` or `.ods`, first sheet) with a header row naming at least
//! `sample_id`, `latitude` and `longitude` (any case, surrounding
//! whitespace ignored). Other columns are ignored. Both formats go through
//! the same row validation, and any bad row rejects the whole list.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use calamine::{Data, Reader as _};
use solar_map_site_models::Site;

use crate::PipelineError;

const SAMPLE_ID: &str = "sample_id";
const LATITUDE: &str = "latitude";
const LONGITUDE: &str = "longitude";

/// Extensions read as spreadsheets. Everything else is read as CSV.
const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "ods"];

/// Largest integer an `f64` holds exactly.
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

/// Loads and validates a site list file, picking the format from its
/// extension.
///
/// # Errors
///
/// Returns [`PipelineError`] if the file cannot be read, a required
/// column is missing, a row is malformed or out of range, or a
/// `sample_id` repeats.
pub fn load_sites(path: &Path) -> Result<Vec<Site>, PipelineError> {
    let sites = if is_spreadsheet(path) {
        read_spreadsheet(path)?
    } else {
        read_sites(std::fs::File::open(path)?)?
    };
    log::info!("Loaded {} sites from {}", sites.len(), path.display());
    Ok(sites)
}

fn is_spreadsheet(path: &Path) -> bool {
    path.extension()
        .and_then(std::ffi::OsStr::to_str)
        .is_some_and(|ext| {
            SPREADSHEET_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Positions of the required columns in the header row.
struct Columns {
    sample_id: usize,
    latitude: usize,
    longitude: usize,
}

impl Columns {
    fn find(headers: &[String]) -> Result<Self, PipelineError> {
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .ok_or_else(|| PipelineError::MissingColumn {
                    column: name.to_string(),
                })
        };
        Ok(Self {
            sample_id: column(SAMPLE_ID)?,
            latitude: column(LATITUDE)?,
            longitude: column(LONGITUDE)?,
        })
    }

    /// Parses one data row. Blank rows yield `None`.
    fn parse_row(&self, cells: &[String], line: u64) -> Result<Option<Site>, PipelineError> {
        if cells.iter().all(|v| v.trim().is_empty()) {
            return Ok(None);
        }

        let sample_id = sample_id(field(cells, self.sample_id, SAMPLE_ID, line)?, line)?;
        let latitude = coordinate(
            field(cells, self.latitude, LATITUDE, line)?,
            LATITUDE,
            90.0,
            line,
        )?;
        let longitude = coordinate(
            field(cells, self.longitude, LONGITUDE, line)?,
            LONGITUDE,
            180.0,
            line,
        )?;

        Ok(Some(Site {
            sample_id,
            latitude,
            longitude,
        }))
    }
}

fn field<'a>(
    cells: &'a [String],
    index: usize,
    name: &str,
    line: u64,
) -> Result<&'a str, PipelineError> {
    cells
        .get(index)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PipelineError::InvalidSite {
            line,
            message: format!("missing {name}"),
        })
}

/// Parses a `sample_id`. Integral floats such as `"12.0"` are accepted.
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn sample_id(raw: &str, line: u64) -> Result<i64, PipelineError> {
    raw.parse::<i64>()
        .ok()
        .or_else(|| {
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && v.trunc() == *v && v.abs() <= MAX_EXACT_FLOAT_INT)
                .map(|v| v as i64)
        })
        .ok_or_else(|| PipelineError::InvalidSite {
            line,
            message: format!("sample_id '{raw}' is not an integer"),
        })
}

fn coordinate(raw: &str, name: &str, limit: f64, line: u64) -> Result<f64, PipelineError> {
    let value: f64 = raw.parse().map_err(|_| PipelineError::InvalidSite {
        line,
        message: format!("{name} '{raw}' is not a number"),
    })?;
    if !value.is_finite() || value.abs() > limit {
        return Err(PipelineError::InvalidSite {
            line,
            message: format!("{name} {value} is outside -{limit}..={limit}"),
        });
    }
    Ok(value)
}

/// Validates numbered data rows and rejects repeated ids.
fn collect_sites(
    columns: &Columns,
    rows: impl Iterator<Item = Result<(u64, Vec<String>), PipelineError>>,
) -> Result<Vec<Site>, PipelineError> {
    let mut seen = BTreeSet::new();
    let mut sites = Vec::new();

    for row in rows {
        let (line, cells) = row?;
        let Some(site) = columns.parse_row(&cells, line)? else {
            continue;
        };
        if !seen.insert(site.sample_id) {
            return Err(PipelineError::DuplicateSampleId {
                sample_id: site.sample_id,
                line,
            });
        }
        sites.push(site);
    }

    Ok(sites)
}

/// Reads and validates a site list from CSV.
///
/// # Errors
///
/// See [`load_sites`].
pub fn read_sites(reader: impl Read) -> Result<Vec<Site>, PipelineError> {
    let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
    let columns = Columns::find(&headers)?;

    let rows = csv_reader.records().map(|result| -> Result<_, PipelineError> {
        let record = result?;
        let line = record.position().map_or(0, csv::Position::line);
        Ok((line, record.iter().map(str::to_string).collect::<Vec<_>>()))
    });
    collect_sites(&columns, rows)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Reads and validates a site list from the first sheet of a workbook.
/// Line numbers are spreadsheet row numbers.
///
/// # Errors
///
/// See [`load_sites`].
pub fn read_spreadsheet(path: &Path) -> Result<Vec<Site>, PipelineError> {
    let mut workbook = calamine::open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .transpose()?
        .ok_or_else(|| PipelineError::MissingColumn {
            column: SAMPLE_ID.to_string(),
        })?;
    let header_line = range.start().map_or(1, |(row, _)| u64::from(row) + 1);

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect::<Vec<_>>());
    let headers = rows.next().unwrap_or_default();
    let columns = Columns::find(&headers)?;

    collect_sites(&columns, (header_line + 1..).zip(rows).map(Ok))
}
