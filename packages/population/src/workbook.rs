//! Spreadsheet layout description and row extraction.
//!
//! The published population datasets are Excel workbooks with a few title
//! rows above the header. A [`WorkbookLayout`] names the sheet, the header
//! row, and the columns (by spreadsheet letter) that hold the area key and
//! the population counts to sum.

use std::collections::BTreeMap;
use std::io::Cursor;

use calamine::{Data, Reader as _};
use data_alerts_metrics_models::{AreaNamespace, PopulationTable};
use serde::Deserialize;

use crate::PopulationError;

/// Where a population table lives inside a published workbook.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkbookLayout {
    /// Download URL of the workbook (`.xls` or `.xlsx`).
    pub url: String,
    /// Worksheet name.
    pub sheet: String,
    /// Zero-based index of the header row; data starts on the next row.
    pub header_row: usize,
    /// Column letter holding the area key (e.g. `"A"`).
    pub key_column: String,
    /// Column letters whose values are summed into the population.
    pub value_columns: Vec<String>,
    /// Maximum number of data rows to read after the header.
    #[serde(default)]
    pub max_rows: Option<usize>,
    /// Key space of the produced table.
    pub namespace: AreaNamespace,
    /// Published key -> key used by the metric series.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

/// A spreadsheet cell reduced to what the table extraction needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// No value.
    Empty,
    /// Text, trimmed on use.
    Text(String),
    /// Numeric value.
    Number(f64),
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Self::Empty,
            #[allow(clippy::cast_precision_loss)]
            Data::Int(value) => Self::Number(*value as f64),
            Data::Float(value) => Self::Number(*value),
            Data::String(text) => Self::Text(text.clone()),
            other => Self::Text(other.to_string()),
        }
    }
}

impl Cell {
    fn as_key(&self) -> Option<String> {
        match self {
            Self::Empty => None,
            Self::Text(text) => Some(text.trim().to_string()).filter(|key| !key.is_empty()),
            Self::Number(value) => Some(value.to_string()),
        }
    }

    fn as_count(&self) -> Option<f64> {
        let value = match self {
            Self::Empty => return None,
            Self::Number(value) => *value,
            Self::Text(text) => text.trim().replace(',', "").parse().ok()?,
        };
        (value.is_finite() && value >= 0.0).then_some(value)
    }
}

/// Converts a spreadsheet column letter (`A`, `R`, `AA`) to a zero-based
/// index.
///
/// # Errors
///
/// Returns [`PopulationError::InvalidColumn`] for an empty or non-alphabetic
/// column name.
pub fn column_index(column: &str) -> Result<usize, PopulationError> {
    let column = column.trim();
    if column.is_empty() || !column.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(PopulationError::InvalidColumn {
            column: column.to_string(),
        });
    }

    let one_based = column
        .chars()
        .map(|c| c.to_ascii_uppercase())
        .fold(0usize, |acc, c| acc * 26 + (c as usize - 'A' as usize + 1));

    Ok(one_based - 1)
}

/// Builds a population table from sheet rows laid out as described by
/// `layout`.
///
/// Rows without a key or with a non-numeric value cell are skipped.
///
/// # Errors
///
/// Returns [`PopulationError::InvalidColumn`] for a bad column letter and
/// [`PopulationError::EmptyTable`] if no row produced an entry.
pub fn table_from_rows(
    rows: &[Vec<Cell>],
    layout: &WorkbookLayout,
) -> Result<PopulationTable, PopulationError> {
    let key_index = column_index(&layout.key_column)?;
    let value_indices = layout
        .value_columns
        .iter()
        .map(|column| column_index(column))
        .collect::<Result<Vec<_>, _>>()?;

    let mut table = PopulationTable::new(layout.namespace);

    let data_rows = rows
        .iter()
        .skip(layout.header_row + 1)
        .take(layout.max_rows.unwrap_or(usize::MAX));

    for row in data_rows {
        let Some(key) = row.get(key_index).and_then(Cell::as_key) else {
            continue;
        };

        let counts: Option<Vec<f64>> = value_indices
            .iter()
            .map(|&index| row.get(index).and_then(Cell::as_count))
            .collect();

        let Some(counts) = counts else {
            log::debug!("Skipping population row '{key}': non-numeric value");
            continue;
        };

        let key = layout.aliases.get(&key).cloned().unwrap_or(key);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let population = counts.iter().sum::<f64>().round() as u64;
        table.insert(key, population);
    }

    if table.is_empty() {
        return Err(PopulationError::EmptyTable {
            sheet: layout.sheet.clone(),
        });
    }

    Ok(table)
}

/// Parses an `.xls`/`.xlsx` workbook and extracts its population table.
///
/// # Errors
///
/// Returns [`PopulationError::Workbook`] if the workbook or sheet cannot be
/// read, plus any error from [`table_from_rows`].
pub fn parse_workbook(
    bytes: Vec<u8>,
    layout: &WorkbookLayout,
) -> Result<PopulationTable, PopulationError> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let range = workbook.worksheet_range(&layout.sheet)?;

    // `Range` starts at the first used cell; pad back to sheet coordinates
    // so header rows and column letters line up with the spreadsheet.
    let (row_offset, col_offset) = range
        .start()
        .map_or((0, 0), |(row, col)| (row as usize, col as usize));

    let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); row_offset];
    for sheet_row in range.rows() {
        let mut cells = vec![Cell::Empty; col_offset];
        cells.extend(sheet_row.iter().map(Cell::from));
        rows.push(cells);
    }

    let table = table_from_rows(&rows, layout)?;
    log::debug!(
        "Parsed {} population entries from sheet '{}'",
        table.len(),
        layout.sheet
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn layout() -> WorkbookLayout {
        WorkbookLayout {
            url: "https://example.invalid/populations.xls".to_string(),
            sheet: "MYE2 - Persons".to_string(),
            header_row: 1,
            key_column: "A".to_string(),
            value_columns: vec!["C".to_string()],
            max_rows: None,
            namespace: AreaNamespace::Code,
            aliases: BTreeMap::new(),
        }
    }

    #[test]
    fn converts_column_letters() {
        assert_eq!(column_index("A").unwrap(), 0);
        assert_eq!(column_index("d").unwrap(), 3);
        assert_eq!(column_index("R").unwrap(), 17);
        assert_eq!(column_index("AA").unwrap(), 26);
        assert!(column_index("").is_err());
        assert!(column_index("A1").is_err());
    }

    #[test]
    fn reads_rows_below_header() {
        let rows = vec![
            vec![text("Mid-2019 population estimates")],
            vec![text("Code"), text("Name"), text("All ages")],
            vec![text("E06000001"), text("Hartlepool"), Cell::Number(93_663.0)],
            vec![text("E06000002"), text("Middlesbrough"), text("140,980")],
            vec![Cell::Empty, text("Footnote"), Cell::Empty],
        ];
        let table = table_from_rows(&rows, &layout()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("E06000001"), Some(93_663));
        assert_eq!(table.get("E06000002"), Some(140_980));
        assert_eq!(table.namespace(), AreaNamespace::Code);
    }

    #[test]
    fn sums_value_columns_and_applies_aliases() {
        let mut aliases = BTreeMap::new();
        aliases.insert(
            "East Of England".to_string(),
            "East of England".to_string(),
        );
        let layout = WorkbookLayout {
            header_row: 0,
            key_column: "B".to_string(),
            value_columns: vec!["D".to_string(), "R".to_string()],
            max_rows: Some(2),
            namespace: AreaNamespace::Name,
            aliases,
            ..layout()
        };

        let mut row = vec![Cell::Empty; 18];
        row[1] = text("East Of England");
        row[3] = Cell::Number(1_300_000.0);
        row[17] = Cell::Number(5_200_000.0);
        let mut london = vec![Cell::Empty; 18];
        london[1] = text("London");
        london[3] = Cell::Number(2_000_000.0);
        london[17] = Cell::Number(7_000_000.0);
        let mut total = vec![Cell::Empty; 18];
        total[1] = text("Total");
        total[3] = Cell::Number(1.0);
        total[17] = Cell::Number(1.0);

        let rows = vec![vec![text("header")], row, london, total];
        let table = table_from_rows(&rows, &layout).unwrap();

        assert_eq!(table.get("East of England"), Some(6_500_000));
        assert_eq!(table.get("London"), Some(9_000_000));
        assert_eq!(table.get("Total"), None);
    }

    #[test]
    fn skips_non_numeric_values() {
        let rows = vec![
            vec![text("Code"), text("Name"), text("All ages")],
            vec![text("Code"), text("Name"), text("All ages")],
            vec![text("E06000003"), text("Redcar"), text("n/a")],
            vec![text("E06000004"), text("Stockton"), Cell::Number(197_348.0)],
        ];
        let table = table_from_rows(&rows, &layout()).unwrap();
        assert_eq!(table.get("E06000003"), None);
        assert_eq!(table.get("E06000004"), Some(197_348));
    }

    #[test]
    fn empty_extraction_is_an_error() {
        let rows = vec![vec![text("title")], vec![text("header")]];
        let err = table_from_rows(&rows, &layout()).unwrap_err();
        assert!(matches!(err, PopulationError::EmptyTable { .. }));
    }

    /// Regional workbook with its first used cell at B2 and the header on
    /// sheet row 13.
    fn region_workbook() -> Vec<u8> {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name("Population estimates (ONS)").unwrap();
        sheet
            .write_string(1, 1, "Population estimates by NHS England region")
            .unwrap();
        sheet.write_string(12, 1, "NHS England Region").unwrap();
        sheet.write_string(12, 3, "Under 16").unwrap();
        sheet.write_string(12, 17, "16+").unwrap();

        let regions = [
            ("East Of England", 1_000.0, 4_000.0),
            ("London", 2_000.0, 7_000.0),
        ];
        for (row, (region, under_16, adults)) in (13..).zip(regions) {
            sheet.write_string(row, 1, region).unwrap();
            sheet.write_number(row, 3, under_16).unwrap();
            sheet.write_number(row, 17, adults).unwrap();
        }

        workbook.save_to_buffer().unwrap()
    }

    fn region_layout() -> WorkbookLayout {
        let mut aliases = BTreeMap::new();
        aliases.insert(
            "East Of England".to_string(),
            "East of England".to_string(),
        );
        WorkbookLayout {
            url: "https://example.invalid/regions.xlsx".to_string(),
            sheet: "Population estimates (ONS)".to_string(),
            header_row: 12,
            key_column: "B".to_string(),
            value_columns: vec!["D".to_string(), "R".to_string()],
            max_rows: Some(9),
            namespace: AreaNamespace::Name,
            aliases,
        }
    }

    #[test]
    fn parses_workbook_in_sheet_coordinates() {
        let table = parse_workbook(region_workbook(), &region_layout()).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.get("East of England"), Some(5_000));
        assert_eq!(table.get("London"), Some(9_000));
        assert_eq!(table.namespace(), AreaNamespace::Name);
    }

    #[test]
    fn missing_sheet_is_a_workbook_error() {
        let layout = WorkbookLayout {
            sheet: "MYE2 - Persons".to_string(),
            ..region_layout()
        };
        let err = parse_workbook(region_workbook(), &layout).unwrap_err();
        assert!(matches!(err, PopulationError::Workbook(_)));
    }
}
