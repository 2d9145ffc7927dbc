//! Spreadsheet exporter: one sheet, a banner line, then the tag table.

use std::path::Path;

use chrono::Local;
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use thiserror::Error;
use tracing::info;

use opcua_harvester::{TagRecord, TagValue};

use crate::cli::ColumnOrder;

const SHEET_NAME: &str = "opc2xls";
/// Cosmetic widths for the Tag / Value / Timestamp columns.
const COLUMN_WIDTHS: [f64; 3] = [27.0, 18.0, 19.0];
const TIMESTAMP_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";
/// Largest integer magnitude an xlsx number cell stores exactly (cells are
/// IEEE doubles). Anything bigger goes in as text.
const MAX_EXACT_INT: u64 = 1 << 53;

/// Placement of the tag table within the sheet.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub order: ColumnOrder,
    /// Row of the table header. The default leaves room for the banner
    /// line plus one blank row.
    pub table_start_row: u32,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            order: ColumnOrder::ValueTimestamp,
            table_start_row: 2,
        }
    }
}

impl Layout {
    pub fn with_order(order: ColumnOrder) -> Self {
        Self {
            order,
            ..Self::default()
        }
    }
}

/// The destination file could not be written.
#[derive(Debug, Error)]
#[error("can't write tags to {path}: {source}")]
pub struct ExportError {
    pub path: String,
    #[source]
    pub source: XlsxError,
}

/// Context echoed into the banner line for human audit.
#[derive(Debug, Clone, Copy)]
pub struct ExportMeta<'a> {
    pub endpoint: &'a str,
    pub filter: &'a str,
}

/// Serialize the records into a single-sheet `.xlsx` file.
///
/// The workbook is assembled in memory and written by one `save` call, so a
/// failure never leaves a file that looks successfully written.
///
/// # Errors
/// Returns [`ExportError`] naming the destination path if the file cannot
/// be created or written.
pub fn export(
    records: &[TagRecord],
    path: &Path,
    meta: ExportMeta<'_>,
    layout: Layout,
) -> Result<(), ExportError> {
    write_workbook(records, path, meta, layout).map_err(|source| ExportError {
        path: path.display().to_string(),
        source,
    })?;
    info!(file = %path.display(), rows = records.len(), "spreadsheet written");
    Ok(())
}

fn write_workbook(
    records: &[TagRecord],
    path: &Path,
    meta: ExportMeta<'_>,
    layout: Layout,
) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    worksheet.write_string(0, 0, banner(meta, records.len()).as_str())?;

    for (col, title) in column_titles(layout.order).iter().enumerate() {
        worksheet.write_string(layout.table_start_row, col as u16, *title)?;
    }

    let timestamp_format = Format::new().set_num_format(TIMESTAMP_FORMAT);
    let (value_col, timestamp_col) = data_columns(layout.order);

    for (i, record) in records.iter().enumerate() {
        let row = layout.table_start_row + 1 + i as u32;
        worksheet.write_string(row, 0, record.name.as_str())?;
        match &record.value {
            // Empty variant: leave the cell blank.
            TagValue::Null => {}
            TagValue::Bool(v) => {
                worksheet.write_boolean(row, value_col, *v)?;
            }
            TagValue::Int(v) => {
                if v.unsigned_abs() <= MAX_EXACT_INT {
                    worksheet.write_number(row, value_col, *v as f64)?;
                } else {
                    worksheet.write_string(row, value_col, v.to_string().as_str())?;
                }
            }
            TagValue::Float(v) => {
                worksheet.write_number(row, value_col, *v)?;
            }
            TagValue::Text(v) => {
                worksheet.write_string(row, value_col, v.as_str())?;
            }
        }
        worksheet.write_datetime_with_format(
            row,
            timestamp_col,
            &record.timestamp,
            &timestamp_format,
        )?;
    }

    for (col, width) in COLUMN_WIDTHS.iter().enumerate() {
        worksheet.set_column_width(col as u16, *width)?;
    }

    workbook.save(path)
}

fn banner(meta: ExportMeta<'_>, items: usize) -> String {
    format!(
        "OPC UA Tags from: {}; Filter: {}; Items: {}; DT: {}",
        meta.endpoint,
        meta.filter,
        items,
        Local::now().format("%Y-%m-%d %H:%M:%S"),
    )
}

fn column_titles(order: ColumnOrder) -> [&'static str; 3] {
    match order {
        ColumnOrder::ValueTimestamp => ["Tag", "Value", "Timestamp"],
        ColumnOrder::TimestampValue => ["Tag", "Timestamp", "Value"],
    }
}

/// (value column, timestamp column) for the chosen layout. Tag is always
/// column 0.
const fn data_columns(order: ColumnOrder) -> (u16, u16) {
    match order {
        ColumnOrder::ValueTimestamp => (1, 2),
        ColumnOrder::TimestampValue => (2, 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use opcua_harvester::{MockTagSource, TagNodeId, TagRef, TagSample, harvest};
    use regex::Regex;

    fn record(name: &str, value: TagValue) -> TagRecord {
        TagRecord {
            name: name.to_string(),
            value,
            timestamp: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(17, 30, 0)
                .unwrap(),
        }
    }

    fn meta() -> ExportMeta<'static> {
        ExportMeta {
            endpoint: "opc.tcp://plc:4840",
            filter: "^Pump",
        }
    }

    #[test]
    fn test_column_layouts() {
        assert_eq!(
            column_titles(ColumnOrder::ValueTimestamp),
            ["Tag", "Value", "Timestamp"]
        );
        assert_eq!(
            column_titles(ColumnOrder::TimestampValue),
            ["Tag", "Timestamp", "Value"]
        );
        assert_eq!(data_columns(ColumnOrder::ValueTimestamp), (1, 2));
        assert_eq!(data_columns(ColumnOrder::TimestampValue), (2, 1));
    }

    #[test]
    fn test_default_layout_leaves_banner_room() {
        let layout = Layout::default();
        assert_eq!(layout.table_start_row, 2);
        assert_eq!(layout.order, ColumnOrder::ValueTimestamp);
    }

    #[test]
    fn test_banner_contents() {
        let line = banner(meta(), 42);
        assert!(line.contains("opc.tcp://plc:4840"));
        assert!(line.contains("Filter: ^Pump"));
        assert!(line.contains("Items: 42"));
    }

    /// Reads the first worksheet of a written workbook back as a
    /// cell-reference → display-value map, resolving shared strings.
    fn read_cells(path: &Path) -> std::collections::BTreeMap<String, String> {
        use std::io::Read;

        let file = std::fs::File::open(path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();

        let mut shared = Vec::new();
        if let Ok(mut entry) = archive.by_name("xl/sharedStrings.xml") {
            let mut xml = String::new();
            entry.read_to_string(&mut xml).unwrap();
            let doc = roxmltree::Document::parse(&xml).unwrap();
            for si in doc.descendants().filter(|n| n.tag_name().name() == "si") {
                shared.push(
                    si.descendants()
                        .filter(|n| n.tag_name().name() == "t")
                        .filter_map(|n| n.text())
                        .collect::<String>(),
                );
            }
        }

        let mut xml = String::new();
        archive
            .by_name("xl/worksheets/sheet1.xml")
            .unwrap()
            .read_to_string(&mut xml)
            .unwrap();
        let doc = roxmltree::Document::parse(&xml).unwrap();

        let mut cells = std::collections::BTreeMap::new();
        for cell in doc.descendants().filter(|n| n.tag_name().name() == "c") {
            let reference = cell.attribute("r").unwrap().to_string();
            let raw = cell
                .children()
                .find(|n| n.tag_name().name() == "v")
                .and_then(|n| n.text())
                .unwrap_or_default();
            let value = if cell.attribute("t") == Some("s") {
                shared[raw.parse::<usize>().unwrap()].clone()
            } else {
                raw.to_string()
            };
            cells.insert(reference, value);
        }
        cells
    }

    #[test]
    fn test_export_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.xlsx");

        let records = vec![
            record("Pump1", TagValue::Float(101.5)),
            record("Pump2", TagValue::Bool(false)),
            record("Pump3", TagValue::Text("manual".into())),
            record("Pump4", TagValue::Null),
            record("Pump5", TagValue::Int(42)),
        ];

        export(&records, &path, meta(), Layout::default()).unwrap();
        let cells = read_cells(&path);

        assert!(cells["A1"].starts_with("OPC UA Tags from:"));
        assert!(!cells.contains_key("A2"), "row below the banner stays blank");

        assert_eq!(cells["A3"], "Tag");
        assert_eq!(cells["B3"], "Value");
        assert_eq!(cells["C3"], "Timestamp");

        assert_eq!(cells["A4"], "Pump1");
        assert_eq!(cells["B4"].parse::<f64>().unwrap(), 101.5);
        assert_eq!(cells["A5"], "Pump2");
        assert_eq!(cells["B5"], "0");
        assert_eq!(cells["A6"], "Pump3");
        assert_eq!(cells["B6"], "manual");
        assert_eq!(cells["A7"], "Pump4");
        assert!(!cells.contains_key("B7"), "null value leaves the cell empty");
        assert_eq!(cells["A8"], "Pump5");
        assert_eq!(cells["B8"].parse::<f64>().unwrap(), 42.0);

        // Timestamps land as date serials, one per data row.
        for row in 4..=8 {
            let serial: f64 = cells[&format!("C{row}")].parse().unwrap();
            assert!(serial > 45000.0, "C{row} holds a date serial, got {serial}");
        }

        assert!(!cells.contains_key("A9"), "exactly five data rows");
    }

    #[test]
    fn test_export_round_trip_timestamp_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.xlsx");

        let records = vec![record("Pump1", TagValue::Float(7.25))];
        let layout = Layout::with_order(ColumnOrder::TimestampValue);
        export(&records, &path, meta(), layout).unwrap();
        let cells = read_cells(&path);

        assert_eq!(cells["B3"], "Timestamp");
        assert_eq!(cells["C3"], "Value");
        assert_eq!(cells["A4"], "Pump1");
        assert!(cells["B4"].parse::<f64>().unwrap() > 45000.0);
        assert_eq!(cells["C4"].parse::<f64>().unwrap(), 7.25);
    }

    #[test]
    fn test_export_honors_custom_start_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.xlsx");

        let layout = Layout {
            table_start_row: 5,
            ..Layout::default()
        };
        export(&[record("Pump1", TagValue::Int(1))], &path, meta(), layout).unwrap();
        let cells = read_cells(&path);

        assert!(!cells.contains_key("A3"));
        assert_eq!(cells["A6"], "Tag");
        assert_eq!(cells["A7"], "Pump1");
    }

    #[test]
    fn test_export_keeps_huge_integers_exact_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.xlsx");

        let records = vec![
            record("Counter1", TagValue::Int(9_007_199_254_740_993)),
            record("Counter2", TagValue::Int(-9_007_199_254_740_993)),
        ];
        export(&records, &path, meta(), Layout::default()).unwrap();
        let cells = read_cells(&path);

        // A double would round both to ...992; the text cell keeps every digit.
        assert_eq!(cells["B4"], "9007199254740993");
        assert_eq!(cells["B5"], "-9007199254740993");
    }

    #[test]
    fn test_export_error_names_destination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("tags.xlsx");

        let err = export(
            &[record("Pump1", TagValue::Int(1))],
            &path,
            meta(),
            Layout::default(),
        )
        .unwrap_err();

        assert!(err.to_string().contains("tags.xlsx"), "got: {err}");
    }

    #[tokio::test]
    async fn test_harvest_then_export_pipeline() {
        let refs = vec![
            TagRef {
                node: TagNodeId::new(1, "t1"),
                browse_name: "Pump1".to_string(),
                organizes: true,
            },
            TagRef {
                node: TagNodeId::new(1, "t2"),
                browse_name: "@Internal".to_string(),
                organizes: true,
            },
        ];

        let mut source = MockTagSource::new();
        source
            .expect_child_references()
            .returning(move |_| Ok(refs.clone()));
        source.expect_read_tag().returning(|_| {
            Ok(TagSample {
                value: TagValue::Float(4.2),
                source_timestamp: chrono::Utc::now(),
            })
        });

        let report = harvest(&source, &TagNodeId::new(1, "root"), &Regex::new("").unwrap())
            .await
            .unwrap();
        assert_eq!(report.records.len(), 1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.xlsx");
        export(
            &report.records,
            &path,
            meta(),
            Layout::with_order(ColumnOrder::TimestampValue),
        )
        .unwrap();
        assert!(path.exists());
    }
}
