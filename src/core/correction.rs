//! Fixes characters the Japanese OCR model commonly confuses on certificates.

/// Substitutions applied one after another, in this order.
///
/// Each rule runs over the output of the previous ones, so a rule whose
/// replacement is another rule's key would make the correction
/// non-idempotent. None of the current replacements is a key.
pub const CORRECTIONS: &[(&str, &str)] = &[
    ("S", "8"),
    ("O", "0"),
    ("I", "1"),
    ("l", "1"),
    ("B", "8"),
    ("D", "0"),
    ("m", "日"),
    ("n", "日"),
    ("」", "月"),
    ("』", "月"),
    ("'", "月"),
    ("牛", "年"),
    ("于", "千"),
    ("干", "千"),
];

pub fn correct_ocr_text(text: &str) -> String {
    CORRECTIONS
        .iter()
        .fold(text.to_string(), |acc, (wrong, right)| acc.replace(wrong, right))
}
