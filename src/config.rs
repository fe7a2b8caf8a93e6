use serde::{Deserialize, Serialize};

/// Application-level constants
pub const APP_NAME: &str = "labscan";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable overriding the OCR language code.
pub const OCR_LANG_ENV: &str = "LABSCAN_OCR_LANG";

/// Environment variable overriding the Tesseract page segmentation mode.
pub const OCR_PSM_ENV: &str = "LABSCAN_OCR_PSM";

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> String {
    format!("{}=info,warn", APP_NAME)
}

/// How the OCR collaborator is configured.
///
/// Page segmentation mode 6 ("assume a single uniform block of text") keeps
/// table rows together on printed lab reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    pub language: String,
    pub page_segmentation_mode: u8,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            language: "eng".into(),
            page_segmentation_mode: 6,
        }
    }
}

impl OcrSettings {
    /// Defaults, overridden by `LABSCAN_OCR_LANG` / `LABSCAN_OCR_PSM` when set.
    /// An unparseable PSM value is ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();

        if let Some(lang) = lookup(OCR_LANG_ENV).filter(|l| !l.trim().is_empty()) {
            settings.language = lang.trim().to_string();
        }

        if let Some(raw) = lookup(OCR_PSM_ENV) {
            match raw.trim().parse::<u8>() {
                Ok(psm) if psm <= 13 => settings.page_segmentation_mode = psm,
                _ => tracing::warn!(value = %raw, "Ignoring invalid {OCR_PSM_ENV}"),
            }
        }

        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_name_is_labscan() {
        assert_eq!(APP_NAME, "labscan");
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }

    #[test]
    fn default_filter_targets_crate() {
        assert!(default_log_filter().starts_with("labscan=info"));
    }

    #[test]
    fn ocr_defaults_are_english_block_mode() {
        let settings = OcrSettings::default();
        assert_eq!(settings.language, "eng");
        assert_eq!(settings.page_segmentation_mode, 6);
    }

    #[test]
    fn lookup_overrides_language_and_psm() {
        let settings = OcrSettings::from_lookup(|key| match key {
            OCR_LANG_ENV => Some("eng+fra".into()),
            OCR_PSM_ENV => Some("4".into()),
            _ => None,
        });
        assert_eq!(settings.language, "eng+fra");
        assert_eq!(settings.page_segmentation_mode, 4);
    }

    #[test]
    fn invalid_psm_keeps_default() {
        let settings = OcrSettings::from_lookup(|key| match key {
            OCR_PSM_ENV => Some("banana".into()),
            _ => None,
        });
        assert_eq!(settings.page_segmentation_mode, 6);

        let settings = OcrSettings::from_lookup(|key| match key {
            OCR_PSM_ENV => Some("42".into()),
            _ => None,
        });
        assert_eq!(settings.page_segmentation_mode, 6);
    }

    #[test]
    fn blank_language_keeps_default() {
        let settings = OcrSettings::from_lookup(|key| match key {
            OCR_LANG_ENV => Some("   ".into()),
            _ => None,
        });
        assert_eq!(settings.language, "eng");
    }

    #[test]
    fn settings_deserialize_with_missing_fields() {
        let settings: OcrSettings = serde_json::from_str(r#"{"language":"deu"}"#).unwrap();
        assert_eq!(settings.language, "deu");
        assert_eq!(settings.page_segmentation_mode, 6);
    }
}
