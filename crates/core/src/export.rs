use crate::domain::display::DisplayRow;
use anyhow::Context;
use chrono::NaiveDate;

/// Render the display table as CSV, header row first.
pub fn to_csv(rows: &[DisplayRow]) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if rows.is_empty() {
        writer
            .write_record(crate::domain::display::DISPLAY_COLUMNS)
            .context("write csv header failed")?;
    }
    for row in rows {
        writer.serialize(row).context("write csv row failed")?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("flush csv writer failed: {}", e.error()))?;
    String::from_utf8(bytes).context("csv output is not valid UTF-8")
}

pub fn export_file_name(date: NaiveDate) -> String {
    format!("asx_screener_{}.csv", date.format("%Y%m%d"))
}
