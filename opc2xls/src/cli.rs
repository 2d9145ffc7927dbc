use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Compiled-in site defaults; every one can be overridden on the command line.
const DEFAULT_ENDPOINT: &str = "opc.tcp://10.100.59.1:4861";
const DEFAULT_ROOT_NODE: &str = "ns=1;s=f|@LOCALMACHINE::List of all tags";
const DEFAULT_OUTPUT: &str = "opc2xls.xlsx";

/// opc2xls — upload OPC UA tags to EXCEL.
///
/// Connects to the server, reads every tag organized under the root node,
/// and writes one spreadsheet with name, value and source timestamp.
#[derive(Debug, Parser)]
#[command(name = "opc2xls", version, about)]
pub struct Args {
    /// OPC UA server endpoint URL.
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Root node that organizes the tag nodes, in `ns=<n>;s=<id>` form.
    #[arg(long, default_value = DEFAULT_ROOT_NODE)]
    pub node: String,

    /// Regex applied to tag browse names. Empty matches everything.
    #[arg(long, default_value = "")]
    pub filter: String,

    /// Destination spreadsheet path.
    #[arg(long, default_value = DEFAULT_OUTPUT)]
    pub file: PathBuf,

    /// Timeout in seconds for each network call (connect and per-tag read).
    #[arg(long, default_value_t = 10)]
    pub timeout_secs: u64,

    /// Column layout for the data rows.
    #[arg(long, value_enum, default_value = "value-timestamp")]
    pub column_order: ColumnOrder,
}

impl Args {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Which of the two value/timestamp layouts to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColumnOrder {
    /// Tag, Value, Timestamp.
    ValueTimestamp,
    /// Tag, Timestamp, Value.
    TimestampValue,
}
