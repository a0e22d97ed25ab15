//! Configuration for a verification run.

use crate::parser_config::ParserOptions;
use std::path::PathBuf;

/// Where trust anchors come from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TrustSource {
    /// Platform CA bundle, falling back to the bundled Mozilla roots
    #[default]
    Default,
    /// PEM or DER certificate file
    File(PathBuf),
}

/// How many signatures a run evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    /// Stop at the first signature with any failure.
    #[default]
    FailFast,
    /// Evaluate every signature; the aggregate still reports the first failure.
    Full,
}

/// Verification run configuration.
#[derive(Debug, Clone, Default)]
pub struct VerifyConfig {
    /// Trust anchor source.
    pub trust_source: TrustSource,

    /// Certificate export template (`out.pem` writes `out_rev1.pem`, `out1_rev1.pem`, ...).
    pub export_template: Option<PathBuf>,

    /// Evaluate only this signature.
    pub signature: Option<String>,

    /// Fail-fast or full scan.
    pub scan_mode: ScanMode,

    /// Document loader limits.
    pub parser: ParserOptions,
}

impl VerifyConfig {
    /// Create new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the certificates in `path` as trust anchors.
    pub fn with_trust_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.trust_source = TrustSource::File(path.into());
        self
    }

    /// Export every signer chain using `template`.
    pub fn with_export_template(mut self, template: impl Into<PathBuf>) -> Self {
        self.export_template = Some(template.into());
        self
    }

    /// Restrict the run to one signature.
    pub fn with_signature(mut self, name: impl Into<String>) -> Self {
        self.signature = Some(name.into());
        self
    }

    /// Set the scan mode.
    pub fn with_scan_mode(mut self, mode: ScanMode) -> Self {
        self.scan_mode = mode;
        self
    }

    /// Set the document loader limits.
    pub fn with_parser_options(mut self, options: ParserOptions) -> Self {
        self.parser = options;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VerifyConfig::new();
        assert_eq!(config.trust_source, TrustSource::Default);
        assert_eq!(config.scan_mode, ScanMode::FailFast);
        assert!(config.export_template.is_none());
        assert!(config.signature.is_none());
    }

    #[test]
    fn test_builder() {
        let config = VerifyConfig::new()
            .with_trust_file("roots.pem")
            .with_export_template("out.pem")
            .with_signature("Signature1")
            .with_scan_mode(ScanMode::Full);
        assert_eq!(config.trust_source, TrustSource::File(PathBuf::from("roots.pem")));
        assert_eq!(config.export_template, Some(PathBuf::from("out.pem")));
        assert_eq!(config.signature.as_deref(), Some("Signature1"));
        assert_eq!(config.scan_mode, ScanMode::Full);
    }
}
