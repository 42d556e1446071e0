//! `$expand` and `$validate-code` request handling.
//!
//! Checks the request selectors (instance id, `url`, inline `valueSet`),
//! dispatches to the [`TerminologyEngine`] and turns engine errors into
//! HTTP-style [`OperationError`]s. Transport is left to the caller.

use terminology_types::{ExpansionResult, ValidationResult, ValueSetDefinition};

use crate::engine::TerminologyEngine;
use crate::expansion::ExpansionParams;
use crate::types::TerminologyError;

/// Parameters of an `$expand` call.
#[derive(Debug, Clone, Default)]
pub struct ExpandRequest {
    /// Value set id when invoked at the instance level.
    pub instance_id: Option<String>,
    /// Canonical URL of a stored value set.
    pub url: Option<String>,
    /// Inline value set body.
    pub value_set: Option<ValueSetDefinition>,
    /// Text filter over display.
    pub filter: Option<String>,
    /// Paging offset.
    pub offset: Option<i64>,
    /// Paging count.
    pub count: Option<i64>,
}

impl ExpandRequest {
    /// `$expand` on a stored value set instance.
    pub fn instance(id: impl Into<String>) -> Self {
        Self {
            instance_id: Some(id.into()),
            ..Default::default()
        }
    }

    /// Type-level `$expand` by canonical URL.
    pub fn by_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Type-level `$expand` of an inline value set.
    pub fn inline(value_set: ValueSetDefinition) -> Self {
        Self {
            value_set: Some(value_set),
            ..Default::default()
        }
    }

    fn params(&self) -> ExpansionParams {
        ExpansionParams {
            filter: self.filter.clone(),
            offset: self.offset,
            count: self.count,
        }
    }
}

/// Parameters of a `$validate-code` call.
#[derive(Debug, Clone, Default)]
pub struct ValidateCodeRequest {
    /// Value set id when invoked at the instance level.
    pub instance_id: Option<String>,
    /// Canonical URL of a stored value set.
    pub url: Option<String>,
    /// Inline value set body.
    pub value_set: Option<ValueSetDefinition>,
    /// Code system of the code.
    pub system: Option<String>,
    /// The code to validate.
    pub code: Option<String>,
    /// Display to check against the concept's display.
    pub display: Option<String>,
}

/// A failed operation with its HTTP status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationError {
    /// HTTP status code.
    pub status: u16,
    /// Diagnostic message.
    pub message: String,
}

impl OperationError {
    /// Creates a `400 Bad Request` error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: 400,
            message: message.into(),
        }
    }

    /// Reason phrase for the status.
    pub fn reason(&self) -> &'static str {
        match self.status {
            400 => "Bad Request",
            404 => "Not Found",
            422 => "Unprocessable Entity",
            _ => "Internal Server Error",
        }
    }
}

impl std::fmt::Display for OperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP {} {}: {}", self.status, self.reason(), self.message)
    }
}

impl std::error::Error for OperationError {}

impl From<TerminologyError> for OperationError {
    fn from(error: TerminologyError) -> Self {
        let message = match &error {
            TerminologyError::UnknownResource {
                resource_type,
                reference,
            } => format!("Unknown {resource_type}: {}", urlencoding::encode(reference)),
            other => other.to_string(),
        };
        Self {
            status: error.status_code(),
            message,
        }
    }
}

/// Result type of request operations.
pub type OperationResult<T> = Result<T, OperationError>;

/// The value set a request targets.
enum Target<'r> {
    Stored(&'r str),
    Inline(&'r ValueSetDefinition),
}

/// Picks the single value set selector of a request; `Err` when several
/// are combined.
fn select<'r>(
    instance_id: Option<&'r str>,
    url: Option<&'r str>,
    value_set: Option<&'r ValueSetDefinition>,
) -> Result<Option<Target<'r>>, ()> {
    let mut targets = instance_id
        .into_iter()
        .chain(url)
        .map(Target::Stored)
        .chain(value_set.map(Target::Inline));
    let first = targets.next();
    if targets.next().is_some() {
        return Err(());
    }
    Ok(first)
}

/// Runs `$expand`.
pub fn expand(engine: &TerminologyEngine, request: &ExpandRequest) -> OperationResult<ExpansionResult> {
    let target = select(
        request.instance_id.as_deref(),
        request.url.as_deref(),
        request.value_set.as_ref(),
    )
    .map_err(|()| {
        OperationError::bad_request(
            "$expand must EITHER be invoked at the instance level, or have a url specified, or have a ValueSet specified. Can not combine these options.",
        )
    })?
    .ok_or_else(|| {
        OperationError::bad_request(
            "$expand operation at the type level (no ID specified) requires a url or a valueSet as a part of the request.",
        )
    })?;

    let params = request.params();
    params.window()?;

    let result = match target {
        Target::Stored(id_or_url) => engine.expand_by_id(id_or_url, &params)?,
        Target::Inline(value_set) => engine.expand(value_set, &params)?,
    };
    Ok(result)
}

/// Runs `$validate-code`.
pub fn validate_code(
    engine: &TerminologyEngine,
    request: &ValidateCodeRequest,
) -> OperationResult<ValidationResult> {
    let target = select(
        request.instance_id.as_deref(),
        request.url.as_deref(),
        request.value_set.as_ref(),
    )
    .map_err(|()| {
        OperationError::bad_request(
            "$validate-code must EITHER be invoked at the instance level, or have a url specified, or have a ValueSet specified. Can not combine these options.",
        )
    })?;

    let system = request.system.as_deref();
    let Some(code) = request.code.as_deref() else {
        return Err(OperationError::bad_request(
            "No code was provided to validate. Unable to validate.",
        ));
    };
    let display = request.display.as_deref();

    let result = match (target, system) {
        (Some(Target::Stored(id_or_url)), _) => {
            engine.validate_code_by_id(id_or_url, system, code, display)?
        }
        (Some(Target::Inline(value_set)), _) => {
            engine.validate_code(value_set, system, code, display)?
        }
        (None, Some(system)) => engine.validate_code_in_system(system, code, display)?,
        (None, None) => {
            return Err(OperationError::bad_request(
                "Either ValueSet ID or ValueSet identifier or system and code must be provided. Unable to validate.",
            ))
        }
    };
    Ok(result)
}
