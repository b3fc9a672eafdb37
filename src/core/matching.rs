use crate::core::validators::{derive_suffix, pad_suffix};
use crate::domain::model::MatchRecord;
use crate::utils::error::{RenamerError, Result};
use encoding_rs::{SHIFT_JIS, UTF_8};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Candidate encodings for the uploaded lookup file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LookupEncoding {
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "shift_jis")]
    ShiftJis,
    #[serde(rename = "cp932")]
    Cp932,
    #[serde(rename = "utf-8-sig")]
    Utf8Sig,
}

impl LookupEncoding {
    pub const DEFAULT_ORDER: [LookupEncoding; 4] = [
        LookupEncoding::Utf8,
        LookupEncoding::ShiftJis,
        LookupEncoding::Cp932,
        LookupEncoding::Utf8Sig,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::ShiftJis => "shift_jis",
            Self::Cp932 => "cp932",
            Self::Utf8Sig => "utf-8-sig",
        }
    }

    /// Strict decode; `None` on the first malformed sequence.
    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            Self::Utf8 => UTF_8
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| text.trim_start_matches('\u{feff}').to_string()),
            Self::Utf8Sig => UTF_8
                .decode_without_bom_handling_and_without_replacement(
                    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes),
                )
                .map(|text| text.into_owned()),
            // encoding_rs 的 Shift_JIS 即 Windows-31J（cp932）
            Self::ShiftJis | Self::Cp932 => SHIFT_JIS
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| text.into_owned()),
        }
    }
}

/// Registration-number suffix -> (identifier, location), rebuilt for every batch.
#[derive(Debug, Clone, Default)]
pub struct MatchTable {
    records: HashMap<String, MatchRecord>,
    encoding: Option<LookupEncoding>,
}

impl MatchTable {
    pub fn from_bytes(bytes: &[u8], encodings: &[LookupEncoding]) -> Result<Self> {
        for encoding in encodings {
            match encoding.decode(bytes) {
                Some(text) => {
                    tracing::debug!("Lookup file decoded as {}", encoding.label());
                    let mut table = Self::from_text(&text)?;
                    table.encoding = Some(*encoding);
                    return Ok(table);
                }
                None => tracing::debug!("Lookup file is not valid {}", encoding.label()),
            }
        }

        Err(RenamerError::upload_invalid(format!(
            "lookup file could not be decoded as any of: {}",
            encodings
                .iter()
                .map(|e| e.label())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }

    /// Rows are `identifier, suffix, location[, ...]`; shorter rows are skipped.
    pub fn from_text(text: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut records = HashMap::new();
        for row in reader.records() {
            let row = row?;
            if row.len() < 3 {
                continue;
            }

            let record = MatchRecord {
                identifier: row[0].trim().to_string(),
                suffix: pad_suffix(row[1].trim()),
                location: row[2].trim().to_string(),
            };
            if let Some(previous) = records.insert(record.suffix.clone(), record.clone()) {
                // 重複的末尾號碼：以最後一筆為準
                tracing::warn!(
                    "Duplicate suffix {} in lookup file: {} ({}) replaced by {} ({})",
                    record.suffix,
                    previous.identifier,
                    previous.location,
                    record.identifier,
                    record.location
                );
            }
        }

        Ok(Self {
            records,
            encoding: None,
        })
    }

    pub fn get(&self, suffix: &str) -> Option<&MatchRecord> {
        self.records.get(suffix)
    }

    /// Looks up the suffix derived from a registration number.
    pub fn lookup(&self, reg_number: &str) -> (String, Option<&MatchRecord>) {
        let suffix = derive_suffix(reg_number);
        let record = self.records.get(&suffix);
        (suffix, record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn encoding(&self) -> Option<LookupEncoding> {
        self.encoding
    }
}
