//! Resolved intent and the strict decoder for collaborator responses.

use intentshell_sentinel::RiskLevel;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::IntentDecodeError;

pub const DEFAULT_INTENT_TYPE: &str = "unknown";
pub const DEFAULT_TARGET: &str = "system";
pub const DEFAULT_ACTION: &str = "run";
pub const DEFAULT_DESCRIPTION: &str = "PowerShell Engine Action";
pub const DEFAULT_CONFIRM_LEVEL: &str = "none";
pub const PROTOCOL_VERSION: &str = "intent-v1";

/// Intent type of the synthetic intent returned when resolution fails.
pub const RESOLUTION_FAILED: &str = "kernel_error";

const FAILURE_TYPES: &[&str] = &["unknown", "error", RESOLUTION_FAILED];

/// Structured form of one natural-language request.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Intent {
    #[serde(rename = "intent")]
    pub intent_type: String,
    pub target: String,
    pub action: String,
    pub filters: Vec<String>,
    pub recursive: bool,
    pub risk: RiskLevel,
    pub description: String,
    pub generated_command: Option<String>,
    pub requires_elevation: bool,
    pub confirm_level: String,
    pub protocol_version: String,
}

impl Default for Intent {
    fn default() -> Self {
        Self {
            intent_type: DEFAULT_INTENT_TYPE.to_owned(),
            target: DEFAULT_TARGET.to_owned(),
            action: DEFAULT_ACTION.to_owned(),
            filters: Vec::new(),
            recursive: false,
            risk: RiskLevel::Low,
            description: DEFAULT_DESCRIPTION.to_owned(),
            generated_command: None,
            requires_elevation: false,
            confirm_level: DEFAULT_CONFIRM_LEVEL.to_owned(),
            protocol_version: PROTOCOL_VERSION.to_owned(),
        }
    }
}

impl Intent {
    /// Synthetic intent standing in for a failed resolution.
    #[must_use]
    pub fn resolution_failed(message: impl Into<String>) -> Self {
        Self {
            intent_type: RESOLUTION_FAILED.to_owned(),
            description: message.into(),
            ..Self::default()
        }
    }

    /// Unknown and failed intents are never executed or cached.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        FAILURE_TYPES.contains(&self.intent_type.as_str())
    }

    /// Decode a collaborator response. Missing or null fields take the
    /// documented defaults; present fields of the wrong type are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`IntentDecodeError`] for empty output, `ERROR:` output,
    /// malformed JSON or mistyped fields.
    pub fn from_response(output: &str) -> Result<Self, IntentDecodeError> {
        let object = json_object(output)?;
        Self::from_object(&object)
    }

    fn from_object(object: &Map<String, Value>) -> Result<Self, IntentDecodeError> {
        let defaults = Self::default();
        let generated_command = optional_str(object, "generated_command")?
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_owned);

        Ok(Self {
            intent_type: string_or(object, "intent", defaults.intent_type)?,
            target: string_or(object, "target", defaults.target)?,
            action: string_or(object, "action", defaults.action)?,
            filters: string_list(object, "filters")?,
            recursive: bool_or(object, "recursive", defaults.recursive)?,
            risk: optional_str(object, "risk")?.map_or(defaults.risk, RiskLevel::parse_lenient),
            description: string_or(object, "description", defaults.description)?,
            generated_command,
            requires_elevation: bool_or(
                object,
                "requires_elevation",
                defaults.requires_elevation,
            )?,
            confirm_level: string_or(object, "confirm_level", defaults.confirm_level)?,
            protocol_version: string_or(object, "protocol_version", defaults.protocol_version)?,
        })
    }
}

/// Locate the JSON object in collaborator output: the whole text, or failing
/// that the last line that opens an object (modules may print banners first).
/// Output carrying an `ERROR:` line is rejected even when JSON is present.
pub(crate) fn json_object(output: &str) -> Result<Map<String, Value>, IntentDecodeError> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Err(IntentDecodeError::Empty);
    }
    // a fault or timeout sentinel anywhere voids the whole response
    if let Some(message) = trimmed
        .lines()
        .find_map(|line| line.trim().strip_prefix("ERROR:"))
    {
        return Err(IntentDecodeError::Collaborator {
            message: message.trim().to_owned(),
        });
    }

    let value = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => value,
        Err(whole) => {
            let Some(line) = trimmed
                .lines()
                .rev()
                .map(str::trim)
                .find(|line| line.starts_with('{'))
            else {
                return Err(whole.into());
            };
            serde_json::from_str(line)?
        }
    };

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(IntentDecodeError::NotAnObject),
    }
}

pub(crate) fn present<'a>(object: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    object.get(field).filter(|v| !v.is_null())
}

fn optional_str<'a>(
    object: &'a Map<String, Value>,
    field: &'static str,
) -> Result<Option<&'a str>, IntentDecodeError> {
    match present(object, field) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(IntentDecodeError::FieldType {
            field,
            expected: "a string",
        }),
    }
}

fn string_or(
    object: &Map<String, Value>,
    field: &'static str,
    default: String,
) -> Result<String, IntentDecodeError> {
    Ok(optional_str(object, field)?.map_or(default, str::to_owned))
}

fn bool_or(
    object: &Map<String, Value>,
    field: &'static str,
    default: bool,
) -> Result<bool, IntentDecodeError> {
    match present(object, field) {
        None => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(IntentDecodeError::FieldType {
            field,
            expected: "a boolean",
        }),
    }
}

// PowerShell's ConvertTo-Json collapses one-element arrays into scalars.
pub(crate) fn string_list(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<Vec<String>, IntentDecodeError> {
    let mistyped = || IntentDecodeError::FieldType {
        field,
        expected: "a list of strings",
    };
    match present(object, field) {
        None => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_owned).ok_or_else(mistyped))
            .collect(),
        Some(_) => Err(mistyped()),
    }
}
