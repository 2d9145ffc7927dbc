use chrono::{Duration, NaiveDateTime};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{HarvestError, ReadError};
use crate::provider::{TagNodeId, TagRef, TagSource, TagValue};

/// Fixed site offset applied to every source timestamp before export.
/// Magadan time, UTC+11. A hardcoded constant, not a timezone lookup.
pub const SITE_UTC_OFFSET_HOURS: i64 = 11;

/// One harvested tag, ready for export.
///
/// `timestamp` is the server's source timestamp shifted by
/// [`SITE_UTC_OFFSET_HOURS`] and stored naive: no timezone metadata survives
/// into the spreadsheet.
#[derive(Debug, Clone, PartialEq)]
pub struct TagRecord {
    pub name: String,
    pub value: TagValue,
    pub timestamp: NaiveDateTime,
}

/// Outcome of one harvest pass, with the counters needed for operational
/// debugging.
#[derive(Debug, Default)]
pub struct HarvestReport {
    /// Successfully read tags, in discovery order.
    pub records: Vec<TagRecord>,
    /// Total references the server returned for the root node.
    pub discovered: usize,
    /// References that survived the filter.
    pub matched: usize,
    /// Tags whose read failed, with the reason. Failed tags produce no record.
    pub failed: Vec<ReadError>,
}

/// Keep only references that are `Organizes`, whose browse name matches
/// `filter`, and whose browse name is not `@`-prefixed (internal tags).
///
/// An empty pattern matches everything. Server order is preserved; no sort
/// is applied.
pub fn filter_references(refs: Vec<TagRef>, filter: &Regex) -> Vec<TagRef> {
    refs.into_iter()
        .filter(|r| {
            r.organizes && filter.is_match(&r.browse_name) && !r.browse_name.starts_with('@')
        })
        .collect()
}

/// Harvest all tags under `root`: discover and filter the references, then
/// read each tag in sequence.
///
/// A failed read is logged, counted in the report, and skipped — one bad tag
/// never aborts the run. Zero successfully read tags is a valid outcome.
///
/// # Errors
/// Only discovery failure is fatal; it propagates as [`HarvestError`].
pub async fn harvest(
    source: &dyn TagSource,
    root: &TagNodeId,
    filter: &Regex,
) -> Result<HarvestReport, HarvestError> {
    let refs = source.child_references(root).await?;
    let discovered = refs.len();
    info!(count = discovered, node = %root, "retrieved root references");

    let tags = filter_references(refs, filter);
    let matched = tags.len();
    info!(count = matched, filter = %filter, "references after filter");

    let mut report = HarvestReport {
        discovered,
        matched,
        ..Default::default()
    };

    for tag in &tags {
        match source.read_tag(tag).await {
            Ok(sample) => {
                let timestamp =
                    (sample.source_timestamp + Duration::hours(SITE_UTC_OFFSET_HOURS)).naive_utc();
                debug!(tag = %tag.browse_name, value = %sample.value, %timestamp, "tag read");
                report.records.push(TagRecord {
                    name: tag.browse_name.clone(),
                    value: sample.value,
                    timestamp,
                });
            }
            Err(err) => {
                warn!(tag = %err.tag, reason = %err.reason, "tag read failed, skipping");
                report.failed.push(err);
            }
        }
    }

    Ok(report)
}
