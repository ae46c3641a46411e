//! Serializes a capture snapshot as comma-separated text.

use std::io::Write;

use log::debug;

use crate::error_handling::types::ExportError;

use super::record_store::CaptureSnapshot;

/// Writes `snapshot` to `sink` and returns the number of data rows.
///
/// The header is `Number 1..N,Bool 1..N` where `N` is the snapshot's
/// channel-count watermark; one row per record follows in arrival order,
/// numbers in their default decimal form and booleans as `1`/`0`. An
/// empty snapshot writes nothing at all, not even the header. None of
/// the values require quoting, so no field is ever quoted.
pub fn write_snapshot<W: Write>(
    snapshot: &CaptureSnapshot,
    sink: &mut W,
) -> Result<usize, ExportError> {
    if snapshot.records.is_empty() {
        debug!("export skipped: capture log is empty");
        return Ok(0);
    }

    let width = snapshot.max_channel_count as usize;
    let mut columns: Vec<String> = Vec::with_capacity(width * 2);

    for i in 0..width {
        columns.push(format!("Number {}", i + 1));
    }
    for i in 0..width {
        columns.push(format!("Bool {}", i + 1));
    }
    writeln!(sink, "{}", columns.join(","))?;

    for record in &snapshot.records {
        columns.clear();
        for i in 0..width {
            columns.push(record.numbers[i].to_string());
        }
        for i in 0..width {
            columns.push(if record.bool_channel(i) { "1" } else { "0" }.to_string());
        }
        writeln!(sink, "{}", columns.join(","))?;
    }

    debug!(
        "exported {} record(s) across {} channel(s)",
        snapshot.records.len(),
        width
    );
    Ok(snapshot.records.len())
}
