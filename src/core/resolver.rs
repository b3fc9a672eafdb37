use crate::core::extractor::RegionExtractor;
use crate::core::validators::{is_valid_reg_number, EraDate, ExpiryDateParser};
use crate::domain::model::{
    CoordinatePreset, ExtractedFields, PresetAttempt, EXPIRY_DATE_FIELD, REG_NUMBER_FIELD,
};
use crate::domain::ports::{PageRenderer, TextRecognizer};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct ResolvedDocument {
    pub preset: String,
    pub fields: ExtractedFields,
    /// Registration number with all half/full-width spaces removed.
    pub reg_number: String,
    pub expiry: EraDate,
}

#[derive(Debug, Clone)]
pub enum Resolution {
    Resolved(ResolvedDocument),
    Exhausted(Vec<PresetAttempt>),
}

pub fn normalize_reg_number(text: &str) -> String {
    text.chars().filter(|c| *c != ' ' && *c != '\u{3000}').collect()
}

/// Tries presets in priority order until one reads both fields.
pub struct PresetResolver {
    presets: Vec<CoordinatePreset>,
    parser: ExpiryDateParser,
}

impl PresetResolver {
    pub fn new(presets: Vec<CoordinatePreset>, parser: ExpiryDateParser) -> Self {
        Self { presets, parser }
    }

    pub fn presets(&self) -> &[CoordinatePreset] {
        &self.presets
    }

    pub fn parser(&self) -> &ExpiryDateParser {
        &self.parser
    }

    /// Preferred preset first, then the others in declared order.
    pub fn try_order(&self, preferred: &str) -> Vec<&CoordinatePreset> {
        let mut order: Vec<&CoordinatePreset> =
            self.presets.iter().filter(|p| p.name == preferred).collect();
        order.extend(self.presets.iter().filter(|p| p.name != preferred));
        order
    }

    pub fn resolve<R: PageRenderer, T: TextRecognizer>(
        &self,
        extractor: &RegionExtractor<R, T>,
        document: &Path,
        document_name: &str,
        preferred: &str,
    ) -> Resolution {
        let mut attempts = Vec::new();

        if !self.presets.iter().any(|p| p.name == preferred) {
            tracing::warn!("Preset '{}' is not defined, trying the known presets", preferred);
            attempts.push(PresetAttempt {
                preset: preferred.to_string(),
                reason: "preset is not defined".to_string(),
            });
        }

        for preset in self.try_order(preferred) {
            tracing::debug!("Trying preset '{}' for {}", preset.name, document_name);

            match self.try_preset(extractor, document, document_name, preset) {
                Ok(resolved) => return Resolution::Resolved(resolved),
                Err(reason) => {
                    tracing::debug!("Preset '{}' rejected: {}", preset.name, reason);
                    attempts.push(PresetAttempt {
                        preset: preset.name.clone(),
                        reason,
                    });
                }
            }
        }

        Resolution::Exhausted(attempts)
    }

    fn try_preset<R: PageRenderer, T: TextRecognizer>(
        &self,
        extractor: &RegionExtractor<R, T>,
        document: &Path,
        document_name: &str,
        preset: &CoordinatePreset,
    ) -> std::result::Result<ResolvedDocument, String> {
        let fields = extractor
            .extract(document, document_name, preset)
            .map_err(|e| e.to_string())?;

        let reg_number = normalize_reg_number(fields.get(REG_NUMBER_FIELD).unwrap_or_default());
        if !is_valid_reg_number(&reg_number) {
            return Err(format!("registration number \"{}\" is malformed", reg_number));
        }

        let raw_date = fields.get(EXPIRY_DATE_FIELD).unwrap_or_default();
        let expiry = self
            .parser
            .parse(raw_date)
            .map_err(|e| format!("expiry date \"{}\": {}", raw_date, e))?;

        Ok(ResolvedDocument {
            preset: preset.name.clone(),
            fields,
            reg_number,
            expiry,
        })
    }
}
