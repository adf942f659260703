use std::path::PathBuf;
use std::time::Duration;

use crate::error::HarvestError;
use crate::export::{DEFAULT_WINDOW_SIZE, ExportFormat};
use crate::fetch::FetchSettings;
use crate::scheduler::DEFAULT_BATCH_SIZE;

/// Settings for one harvest run
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Directory under which every work gets its own folder
    pub output_root: PathBuf,
    pub batch_size: usize,
    pub window_size: u32,
    /// Formats rendered per window; empty disables exporting
    pub formats: Vec<ExportFormat>,
    /// TrueType font for PDF output instead of system font discovery
    pub pdf_font: Option<PathBuf>,
    pub fetch: FetchSettings,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            batch_size: DEFAULT_BATCH_SIZE,
            window_size: DEFAULT_WINDOW_SIZE,
            formats: vec![ExportFormat::Epub, ExportFormat::Word],
            pdf_font: None,
            fetch: FetchSettings::default(),
        }
    }
}

impl HarvestConfig {
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.batch_size == 0 {
            return Err(HarvestError::InvalidConfig(String::from("batch size must be at least 1")));
        }
        if self.window_size == 0 {
            return Err(HarvestError::InvalidConfig(String::from("window size must be at least 1")));
        }
        if self.fetch.attempts == 0 {
            return Err(HarvestError::InvalidConfig(String::from("retry attempts must be at least 1")));
        }
        if self.fetch.request_timeout.is_zero() {
            return Err(HarvestError::InvalidConfig(String::from("request timeout must be positive")));
        }
        if let Some(font) = &self.pdf_font {
            if !font.is_file() {
                return Err(HarvestError::InvalidConfig(format!(
                    "PDF font {} does not exist",
                    font.display()
                )));
            }
        }
        Ok(())
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.fetch.request_timeout = timeout;
        self
    }
}

/// `<downloads>/novel-harvest`, or `./downloads` when the platform has no download dir
pub fn default_output_root() -> PathBuf {
    dirs::download_dir()
        .map(|dir| dir.join("novel-harvest"))
        .unwrap_or_else(|| PathBuf::from("downloads"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = HarvestConfig::default();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.window_size, 100);
        assert_eq!(config.fetch.attempts, 3);
        assert_eq!(config.formats, vec![ExportFormat::Epub, ExportFormat::Word]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_sizes() {
        let config = HarvestConfig {
            batch_size: 0,
            ..HarvestConfig::default()
        };
        assert!(matches!(config.validate(), Err(HarvestError::InvalidConfig(_))));

        let config = HarvestConfig {
            window_size: 0,
            ..HarvestConfig::default()
        };
        assert!(matches!(config.validate(), Err(HarvestError::InvalidConfig(_))));

        let config = HarvestConfig::default().with_request_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(HarvestError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_missing_pdf_font() {
        let config = HarvestConfig {
            pdf_font: Some(PathBuf::from("/definitely/not/here.ttf")),
            ..HarvestConfig::default()
        };
        assert!(matches!(config.validate(), Err(HarvestError::InvalidConfig(_))));
    }
}
