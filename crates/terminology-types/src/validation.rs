//! Code validation result type.

/// The outcome of validating a code against a value set.
///
/// # Examples
///
/// ```
/// use terminology_types::ValidationResult;
///
/// let ok = ValidationResult::success(Some("Yes".to_string()));
/// assert!(ok.matched);
/// assert_eq!(ok.message, "validation succeeded");
///
/// let failed = ValidationResult::failure("code FOO is not in value set http://myvs");
/// assert!(!failed.matched);
/// assert!(failed.message.starts_with("validation failed: "));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValidationResult {
    /// Whether the code is a member of the value set.
    pub matched: bool,
    /// Human readable outcome.
    pub message: String,
    /// Canonical display of the concept, on success.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub display: Option<String>,
}

impl ValidationResult {
    /// Message carried by every successful validation.
    pub const SUCCESS_MESSAGE: &'static str = "validation succeeded";

    /// Creates a successful result.
    pub fn success(display: Option<String>) -> Self {
        Self {
            matched: true,
            message: Self::SUCCESS_MESSAGE.to_string(),
            display,
        }
    }

    /// Creates a failed result with the given reason.
    pub fn failure(reason: impl AsRef<str>) -> Self {
        Self {
            matched: false,
            message: format!("validation failed: {}", reason.as_ref()),
            display: None,
        }
    }
}
