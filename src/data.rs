//! Table loading and feature selection using calamine and Polars

use anyhow::{anyhow, bail, Context};
use calamine::{open_workbook_auto, Data, Reader};
use log::{debug, info, warn};
use ndarray::Array2;
use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Columns used as clustering features, in matrix order
pub const FEATURE_COLUMNS: [&str; 3] = ["Age", "Annual Income (k$)", "Spending Score (1-100)"];

/// Numeric training matrix projected out of the input table
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    /// Column names, one per matrix column
    pub columns: Vec<String>,
    /// Feature values as ndarray (n_rows, n_columns), rows in table order
    pub records: Array2<f64>,
}

impl FeatureMatrix {
    pub fn n_samples(&self) -> usize {
        self.records.nrows()
    }
}

/// Load a spreadsheet into a DataFrame
///
/// Workbooks are read through calamine with the first row of the sheet as
/// the header. CSV files go through the Polars reader.
///
/// # Arguments
/// * `file_path` - Path to the workbook or CSV file
/// * `sheet` - Worksheet name (default: first sheet). Ignored for CSV.
pub fn load_table(file_path: &Path, sheet: Option<&str>) -> crate::Result<DataFrame> {
    let is_csv = file_path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

    let df = if is_csv {
        if let Some(name) = sheet {
            warn!("Ignoring sheet '{}' for CSV input {}", name, file_path.display());
        }
        load_csv(file_path)?
    } else {
        load_workbook(file_path, sheet)?
    };

    info!(
        "Loaded {} rows x {} columns from {}",
        df.height(),
        df.width(),
        file_path.display()
    );
    Ok(df)
}

fn load_csv(file_path: &Path) -> crate::Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(file_path.to_path_buf()))
        .with_context(|| format!("failed to open {}", file_path.display()))?
        .finish()
        .with_context(|| format!("failed to parse {}", file_path.display()))?;
    Ok(df)
}

fn load_workbook(file_path: &Path, sheet: Option<&str>) -> crate::Result<DataFrame> {
    let mut workbook = open_workbook_auto(file_path)
        .with_context(|| format!("failed to open spreadsheet {}", file_path.display()))?;

    let range = match sheet {
        Some(name) => workbook
            .worksheet_range(name)
            .with_context(|| format!("failed to read sheet '{}' of {}", name, file_path.display()))?,
        None => workbook
            .worksheet_range_at(0)
            .ok_or_else(|| anyhow!("{} contains no worksheets", file_path.display()))?
            .with_context(|| format!("failed to read first sheet of {}", file_path.display()))?,
    };

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        bail!("Sheet in {} is empty", file_path.display());
    };
    let body: Vec<&[Data]> = rows.collect();
    let names = header_names(header);
    debug!("Sheet header: {:?}", names);

    let columns = names
        .iter()
        .enumerate()
        .map(|(idx, name)| build_series(name, idx, &body))
        .collect::<Vec<_>>();

    Ok(DataFrame::new(columns)?)
}

/// Header cells verbatim, with placeholders for blanks and suffixes for repeats
fn header_names(header: &[Data]) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    let mut next_suffix: HashMap<String, usize> = HashMap::new();
    header
        .iter()
        .enumerate()
        .map(|(idx, cell)| {
            let base = match cell {
                Data::Empty => format!("Unnamed: {}", idx),
                Data::String(s) => s.clone(),
                other => other.to_string(),
            };
            let name = if taken.contains(&base) {
                let suffix = next_suffix.entry(base.clone()).or_insert(1);
                // Skip suffixes an earlier header already uses
                loop {
                    let candidate = format!("{}.{}", base, suffix);
                    *suffix += 1;
                    if !taken.contains(&candidate) {
                        break candidate;
                    }
                }
            } else {
                base
            };
            taken.insert(name.clone());
            name
        })
        .collect()
}

/// Build one column: Float64 when every non-empty cell is numeric, strings otherwise
fn build_series(name: &str, idx: usize, body: &[&[Data]]) -> Series {
    let cells: Vec<Option<&Data>> = body
        .iter()
        .map(|row| row.get(idx).filter(|cell| !matches!(cell, Data::Empty)))
        .collect();

    let numeric = cells
        .iter()
        .flatten()
        .all(|cell| matches!(cell, Data::Float(_) | Data::Int(_)));

    if numeric {
        let values: Vec<Option<f64>> = cells
            .iter()
            .map(|cell| match cell {
                Some(Data::Float(v)) => Some(*v),
                Some(Data::Int(v)) => Some(*v as f64),
                _ => None,
            })
            .collect();
        Series::new(name, values)
    } else {
        let values: Vec<Option<String>> = cells
            .iter()
            .map(|cell| cell.map(|c| c.to_string()))
            .collect();
        Series::new(name, values)
    }
}

/// Project the table onto the given columns, in the given order
///
/// Every row is kept in place, so row `i` of the matrix is row `i` of `table`.
pub fn select_features(table: &DataFrame, columns: &[&str]) -> crate::Result<FeatureMatrix> {
    let available = table.get_column_names();
    for name in columns {
        if !available.contains(name) {
            bail!(
                "Required column '{}' not found (available: {:?})",
                name,
                available
            );
        }
    }

    let projected = table.select(columns.iter().copied())?;
    let mut records = Array2::<f64>::zeros((projected.height(), columns.len()));

    for (col_idx, series) in projected.get_columns().iter().enumerate() {
        if !series.dtype().is_numeric() {
            bail!(
                "Column '{}' must be numeric, found {}",
                series.name(),
                series.dtype()
            );
        }

        let values = series.cast(&DataType::Float64)?;
        for (row_idx, value) in values.f64()?.into_iter().enumerate() {
            match value {
                Some(v) if v.is_finite() => records[[row_idx, col_idx]] = v,
                Some(v) => bail!(
                    "Column '{}' has non-finite value {} at row {}",
                    series.name(),
                    v,
                    row_idx
                ),
                None => bail!(
                    "Column '{}' has a missing value at row {}",
                    series.name(),
                    row_idx
                ),
            }
        }
    }

    debug!("Feature matrix shape: {:?}", records.shape());
    Ok(FeatureMatrix {
        columns: columns.iter().map(|name| name.to_string()).collect(),
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile, TempDir};

    fn create_test_csv(contents: &str) -> NamedTempFile {
        let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn customers_csv() -> NamedTempFile {
        create_test_csv(
            "CustomerID,Gender,Age,Annual Income (k$),Spending Score (1-100)\n\
             1,Male,19,15,39\n\
             2,Male,21,15,81\n\
             3,Female,20,16,6\n\
             4,Female,23,16,77\n",
        )
    }

    #[test]
    fn test_load_csv_keeps_columns_and_rows() {
        let file = customers_csv();
        let df = load_table(file.path(), None).unwrap();

        assert_eq!(
            df.get_column_names(),
            vec![
                "CustomerID",
                "Gender",
                "Age",
                "Annual Income (k$)",
                "Spending Score (1-100)"
            ]
        );
        assert_eq!(df.height(), 4);
    }

    #[test]
    fn test_select_features_preserves_row_order() {
        let file = customers_csv();
        let df = load_table(file.path(), None).unwrap();
        let matrix = select_features(&df, &FEATURE_COLUMNS).unwrap();

        assert_eq!(matrix.records.shape(), &[4, 3]);
        assert_eq!(matrix.columns, FEATURE_COLUMNS.to_vec());
        assert_eq!(matrix.records.row(0).to_vec(), vec![19.0, 15.0, 39.0]);
        assert_eq!(matrix.records.row(3).to_vec(), vec![23.0, 16.0, 77.0]);
    }

    #[test]
    fn test_select_features_follows_requested_order() {
        let file = customers_csv();
        let df = load_table(file.path(), None).unwrap();
        let matrix = select_features(&df, &["Spending Score (1-100)", "Age"]).unwrap();

        assert_eq!(matrix.records.row(1).to_vec(), vec![81.0, 21.0]);
    }

    #[test]
    fn test_missing_column() {
        let file = create_test_csv("Age,Annual Income (k$)\n19,15\n21,15\n");
        let df = load_table(file.path(), None).unwrap();

        let err = select_features(&df, &FEATURE_COLUMNS).unwrap_err();
        assert!(err.to_string().contains("Spending Score (1-100)"));
    }

    #[test]
    fn test_header_match_is_exact() {
        let file = create_test_csv("age,Annual Income (k$),Spending Score (1-100)\n19,15,39\n");
        let df = load_table(file.path(), None).unwrap();

        assert!(select_features(&df, &FEATURE_COLUMNS).is_err());
    }

    #[test]
    fn test_missing_value_rejected() {
        let file = create_test_csv(
            "Age,Annual Income (k$),Spending Score (1-100)\n19,15,39\n21,,81\n",
        );
        let df = load_table(file.path(), None).unwrap();

        let err = select_features(&df, &FEATURE_COLUMNS).unwrap_err();
        assert!(err.to_string().contains("missing value at row 1"));
    }

    #[test]
    fn test_non_numeric_column_rejected() {
        let file = create_test_csv(
            "Age,Annual Income (k$),Spending Score (1-100)\nyoung,15,39\nold,15,81\n",
        );
        let df = load_table(file.path(), None).unwrap();

        let err = select_features(&df, &FEATURE_COLUMNS).unwrap_err();
        assert!(err.to_string().contains("must be numeric"));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(load_table(&dir.path().join("absent.xlsx"), None).is_err());
        assert!(load_table(&dir.path().join("absent.csv"), None).is_err());
    }

    #[test]
    fn test_load_workbook() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("customers.xlsx");

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "Age").unwrap();
        sheet.write_string(0, 2, "Age").unwrap();
        sheet.write_string(0, 3, "Genre").unwrap();
        for (row, (age, genre)) in [(19.0, "Male"), (35.0, "Female"), (64.0, "Male")]
            .into_iter()
            .enumerate()
        {
            let row = row as u32 + 1;
            sheet.write_number(row, 0, age).unwrap();
            sheet.write_number(row, 1, age * 2.0).unwrap();
            sheet.write_string(row, 3, genre).unwrap();
        }
        workbook.save(&path).unwrap();

        let df = load_table(&path, None).unwrap();
        assert_eq!(
            df.get_column_names(),
            vec!["Age", "Unnamed: 1", "Age.1", "Genre"]
        );
        assert_eq!(df.height(), 3);
        assert_eq!(df.column("Age").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("Genre").unwrap().dtype(), &DataType::String);
        assert_eq!(df.column("Age.1").unwrap().null_count(), 3);
    }

    #[test]
    fn test_load_workbook_unknown_sheet() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("customers.xlsx");

        let mut workbook = Workbook::new();
        workbook.add_worksheet().write_string(0, 0, "Age").unwrap();
        workbook.save(&path).unwrap();

        assert!(load_table(&path, Some("Missing")).is_err());
        assert!(load_table(&path, Some("Sheet1")).is_ok());
    }

    #[test]
    fn test_header_suffix_skips_existing_names() {
        let header = [
            Data::String("Note".into()),
            Data::String("Note".into()),
            Data::String("Note.1".into()),
            Data::String("Note".into()),
        ];

        assert_eq!(
            header_names(&header),
            vec!["Note", "Note.1", "Note.1.1", "Note.2"]
        );
    }

    #[test]
    fn test_load_workbook_with_clashing_headers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("customers.xlsx");
        let headers = [
            "Note",
            "Note",
            "Note.1",
            "Age",
            "Annual Income (k$)",
            "Spending Score (1-100)",
        ];

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, header) in headers.iter().enumerate() {
            sheet.write_string(0, col as u16, *header).unwrap();
        }
        for row in 1..=5u32 {
            sheet.write_string(row, 0, "a").unwrap();
            sheet.write_string(row, 1, "b").unwrap();
            sheet.write_string(row, 2, "c").unwrap();
            sheet.write_number(row, 3, 20.0 + row as f64).unwrap();
            sheet.write_number(row, 4, 40.0 + row as f64).unwrap();
            sheet.write_number(row, 5, 60.0 + row as f64).unwrap();
        }
        workbook.save(&path).unwrap();

        let df = load_table(&path, None).unwrap();
        assert_eq!(
            df.get_column_names(),
            vec![
                "Note",
                "Note.1",
                "Note.1.1",
                "Age",
                "Annual Income (k$)",
                "Spending Score (1-100)"
            ]
        );

        let matrix = select_features(&df, &FEATURE_COLUMNS).unwrap();
        assert_eq!(matrix.records.shape(), &[5, 3]);
        assert_eq!(matrix.records.row(0).to_vec(), vec![21.0, 41.0, 61.0]);
    }
}
