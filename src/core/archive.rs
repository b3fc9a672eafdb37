use crate::utils::error::Result;
use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use std::io::Write;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

fn zip_timestamp(at: NaiveDateTime) -> zip::DateTime {
    zip::DateTime::from_date_and_time(
        at.year().clamp(1980, 2107) as u16,
        at.month() as u8,
        at.day() as u8,
        at.hour() as u8,
        at.minute() as u8,
        at.second() as u8,
    )
    .unwrap_or_default()
}

/// Packs the renamed files plus the failure log into one deflated archive.
///
/// Entry names are stored as UTF-8.
pub fn build_archive(files: &[(String, Vec<u8>)], log_name: &str, log_text: &str) -> Result<Vec<u8>> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip_timestamp(Local::now().naive_local()));

    tracing::debug!("Creating archive with {} files and log '{}'", files.len(), log_name);

    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, bytes) in files {
        zip.start_file(name.as_str(), options)?;
        zip.write_all(bytes)?;
    }

    zip.start_file(log_name, options)?;
    zip.write_all(log_text.as_bytes())?;

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}
