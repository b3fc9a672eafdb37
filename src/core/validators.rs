use crate::utils::error::{RenamerError, Result};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SUFFIX_LENGTH: usize = 4;

const DIGIT_CLASS: &str = "[0-9０-９]";
const NON_DIGIT_CLASS: &str = "[^0-9０-９]";

fn is_digit(c: char) -> bool {
    c.is_ascii_digit() || ('０'..='９').contains(&c)
}

/// Full-width digits are mapped to ASCII; anything else is returned unchanged.
fn to_ascii_digit(c: char) -> char {
    if ('０'..='９').contains(&c) {
        char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c)
    } else {
        c
    }
}

fn parse_number<T: std::str::FromStr>(text: &str) -> Option<T> {
    text.chars().map(to_ascii_digit).collect::<String>().parse().ok()
}

/// Hiragana letters and iteration marks, including the supplementary archaic/small kana.
pub fn is_hiragana(c: char) -> bool {
    matches!(
        c,
        '\u{3041}'..='\u{3096}'
            | '\u{309D}'..='\u{309F}'
            | '\u{1B001}'
            | '\u{1B11F}'
            | '\u{1B132}'
            | '\u{1B150}'..='\u{1B152}'
    )
}

/// Up to `max` digits at the very end of `text`, in reading order.
fn trailing_digits(text: &str, max: usize) -> Vec<char> {
    let mut digits: Vec<char> = text
        .chars()
        .rev()
        .take_while(|c| is_digit(*c))
        .take(max)
        .collect();
    digits.reverse();
    digits
}

/// A registration number is valid when it ends in 1-4 digits preceded by a hiragana.
pub fn is_valid_reg_number(reg_number: &str) -> bool {
    let reg_number = reg_number.trim();
    let digit_count = trailing_digits(reg_number, SUFFIX_LENGTH).len();
    if digit_count == 0 {
        return false;
    }

    let chars: Vec<char> = reg_number.chars().collect();
    match chars.len().checked_sub(digit_count + 1) {
        Some(idx) => is_hiragana(chars[idx]),
        None => false,
    }
}

/// Join key for the lookup table: last (up to) four digits, left-padded with zeros.
pub fn derive_suffix(reg_number: &str) -> String {
    let digits: String = trailing_digits(reg_number.trim(), SUFFIX_LENGTH)
        .into_iter()
        .map(to_ascii_digit)
        .collect();
    pad_suffix(&digits)
}

pub fn pad_suffix(raw: &str) -> String {
    format!("{:0>width$}", raw, width = SUFFIX_LENGTH)
}

/// Calendar era used on the certificates and its offset to the Gregorian year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EraRule {
    pub name: String,
    /// `gregorian year = offset + era year`
    pub offset: i32,
}

impl Default for EraRule {
    fn default() -> Self {
        Self {
            name: "令和".to_string(),
            offset: 2018,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpiryParseError {
    #[error("era year (e.g. {era}7年) not found")]
    MissingEra { era: String },

    #[error("era year number could not be read")]
    MissingEraYear,

    #[error("era year {era_year} is out of range")]
    EraYearOutOfRange { era_year: i32 },

    #[error("month and day not found (numbers found: {found})")]
    MissingMonthDay { found: usize },

    #[error("{year:04}/{month:02}/{day:02} is not a valid calendar date")]
    InvalidDate { year: i32, month: u32, day: u32 },
}

/// Expiry date as read, before any calendar check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl EraDate {
    /// `YYYYMMDD`, without checking that the date exists.
    pub fn compact(&self) -> String {
        format!("{:04}{:02}{:02}", self.year, self.month, self.day)
    }

    pub fn to_calendar_date(&self) -> std::result::Result<NaiveDate, ExpiryParseError> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day).ok_or(
            ExpiryParseError::InvalidDate {
                year: self.year,
                month: self.month,
                day: self.day,
            },
        )
    }
}

pub struct ExpiryDateParser {
    era: String,
    offset: i32,
    era_marker: Regex,
    era_number: Regex,
    month_day: Regex,
}

impl ExpiryDateParser {
    pub fn new(rule: &EraRule) -> Result<Self> {
        let era = regex::escape(&rule.name);
        let build = |pattern: String| {
            Regex::new(&pattern).map_err(|e| RenamerError::ConfigError {
                message: format!("invalid era pattern for '{}': {}", rule.name, e),
            })
        };

        Ok(Self {
            era: rule.name.clone(),
            offset: rule.offset,
            era_marker: build(format!(r"{era}\s*{DIGIT_CLASS}+年"))?,
            era_number: build(format!(r"{era}\s*({DIGIT_CLASS}+)"))?,
            month_day: build(format!(r"({DIGIT_CLASS}{{1,2}}){NON_DIGIT_CLASS}{{0,3}}"))?,
        })
    }

    pub fn parse(&self, raw_text: &str) -> std::result::Result<EraDate, ExpiryParseError> {
        let text: String = raw_text
            .chars()
            .filter(|c| *c != ' ' && *c != '\u{3000}')
            .collect();

        let era_match = self
            .era_marker
            .find(&text)
            .ok_or_else(|| ExpiryParseError::MissingEra {
                era: self.era.clone(),
            })?;

        let era_year: i32 = self
            .era_number
            .captures(era_match.as_str())
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_number(m.as_str()))
            .ok_or(ExpiryParseError::MissingEraYear)?;

        let remain = &text[era_match.end()..];
        let numbers: Vec<u32> = self
            .month_day
            .captures_iter(remain)
            .filter_map(|caps| caps.get(1).and_then(|m| parse_number(m.as_str())))
            .collect();

        if numbers.len() < 2 {
            return Err(ExpiryParseError::MissingMonthDay {
                found: numbers.len(),
            });
        }

        let year = self
            .offset
            .checked_add(era_year)
            .ok_or(ExpiryParseError::EraYearOutOfRange { era_year })?;

        Ok(EraDate {
            year,
            month: numbers[0],
            day: numbers[1],
        })
    }
}
