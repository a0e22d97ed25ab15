/// Parser limits and tolerance settings used while loading a signed document.
///
/// Signed PDFs arrive from untrusted sources, so every recursive or expanding step of
/// the loader is bounded by one of these limits.
///
/// # Example
///
/// ```
/// use pdf_sigcheck::parser_config::ParserOptions;
///
/// // Header must sit at byte 0 and every object must close with `endobj`
/// let strict = ParserOptions::strict();
///
/// // Tolerate leading junk and unterminated objects (default)
/// let lenient = ParserOptions::lenient();
///
/// let custom = ParserOptions {
///     max_file_size: 16 * 1024 * 1024,
///     ..ParserOptions::lenient()
/// };
/// assert!(custom.max_file_size < lenient.max_file_size);
/// # let _ = strict;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserOptions {
    /// Require `%PDF-` at offset 0 and reject objects without `endobj`
    pub strict: bool,

    /// Accept indirect objects that are not closed by `endobj`
    pub allow_missing_endobj: bool,

    /// Maximum array/dictionary nesting depth
    ///
    /// PDF Spec: ISO 32000-1:2008, Section H.1 - Implementation Limits
    pub max_nesting: usize,

    /// Maximum length of an indirect reference chain followed during resolution
    pub max_reference_depth: u32,

    /// Maximum decompression ratio (decompressed:compressed), 0 disables the check
    pub max_decompression_ratio: u32,

    /// Maximum decompressed stream size in bytes, 0 disables the check
    pub max_decompressed_size: usize,

    /// Maximum PDF file size in bytes, 0 disables the check
    pub max_file_size: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self::lenient()
    }
}

impl ParserOptions {
    /// Strict mode: reject spec violations instead of recovering.
    pub fn strict() -> Self {
        Self {
            strict: true,
            allow_missing_endobj: false,
            ..Self::lenient()
        }
    }

    /// Lenient mode: recover from common producer mistakes.
    pub fn lenient() -> Self {
        Self {
            strict: false,
            allow_missing_endobj: true,
            max_nesting: 100,
            max_reference_depth: 32,
            max_decompression_ratio: 100,
            max_decompressed_size: 100 * 1024 * 1024, // 100 MB
            max_file_size: 500 * 1024 * 1024,        // 500 MB
        }
    }

    /// Latest byte offset at which the `%PDF-` marker may start.
    pub(crate) fn header_search_window(&self) -> usize {
        if self.strict {
            0
        } else {
            1024
        }
    }
}
