//! Security alerts as delivered by the ingestion layer.

use crate::error::{OrchestrationError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Severity {
    /// Critical.
    Critical,
    /// High.
    High,
    /// Medium.
    Medium,
    /// Low.
    Low,
    /// Informational.
    Informational,
}

/// Returned when a severity string is outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown severity '{0}' (expected Critical, High, Medium, Low or Informational)")]
pub struct UnknownSeverity(pub String);

impl Severity {
    /// Canonical capitalised name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "Critical",
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
            Self::Informational => "Informational",
        }
    }

    /// Critical or High.
    #[must_use]
    pub const fn is_elevated(self) -> bool {
        matches!(self, Self::Critical | Self::High)
    }
}

impl FromStr for Severity {
    type Err = UnknownSeverity;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            "informational" | "info" => Ok(Self::Informational),
            _ => Err(UnknownSeverity(s.to_string())),
        }
    }
}

impl TryFrom<String> for Severity {
    type Error = UnknownSeverity;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Severity> for String {
    fn from(severity: Severity) -> Self {
        severity.as_str().to_string()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// MITRE ATT&CK mapping of the detection rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MitreInfo {
    /// Tactic names.
    pub tactics: Vec<String>,
    /// Technique identifiers.
    pub techniques: Vec<String>,
}

/// Assets the alert refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetRefs {
    /// Host name.
    pub host: Option<String>,
    /// User account.
    pub user: Option<String>,
    /// Source IP address.
    pub source_ip: Option<String>,
    /// Destination IP address.
    pub destination_ip: Option<String>,
}

/// A security alert. Immutable once accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Alert identifier, unique within a batch.
    pub alert_id: String,
    /// Detection rule identifier.
    pub rule_id: String,
    /// Detection rule name.
    #[serde(default)]
    pub rule_name: Option<String>,
    /// Severity.
    pub severity: Severity,
    /// Detection time as reported by the source.
    #[serde(default)]
    pub timestamp: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// MITRE mapping.
    #[serde(default)]
    pub mitre: MitreInfo,
    /// Affected assets.
    #[serde(default)]
    pub assets: AssetRefs,
    /// Raw evidence payload.
    #[serde(default)]
    pub raw_data: Value,
}

impl Alert {
    /// Checks the fields the engine relies on.
    ///
    /// # Errors
    /// Returns `OrchestrationError::InvalidAlert` for an empty identifier.
    pub fn validate(&self) -> Result<()> {
        if self.alert_id.trim().is_empty() {
            return Err(OrchestrationError::InvalidAlert("alert_id must not be empty".to_string()));
        }
        Ok(())
    }

    /// Parses alerts from JSON text.
    ///
    /// Accepts a bare array, `{ "alerts": [...] }`, or a single alert object.
    ///
    /// # Errors
    /// Returns an error if the text is not valid alert JSON.
    pub fn parse_batch(text: &str) -> Result<Vec<Self>> {
        let value: Value = serde_json::from_str(text)?;
        match value {
            Value::Array(items) => Ok(serde_json::from_value(Value::Array(items))?),
            Value::Object(mut map) => match map.remove("alerts") {
                Some(alerts) => Ok(serde_json::from_value(alerts)?),
                None => Ok(vec![serde_json::from_value(Value::Object(map))?]),
            },
            _ => Err(OrchestrationError::InvalidAlert(
                "expected an alert object or an array of alerts".to_string(),
            )),
        }
    }

    /// Loads alerts from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_batch(path: impl AsRef<Path>) -> Result<Vec<Self>> {
        let text = std::fs::read_to_string(path)?;
        Self::parse_batch(&text)
    }
}

/// Rejects a batch that repeats an alert id.
///
/// # Errors
/// Returns `OrchestrationError::DuplicateAlert` naming the first repeated id.
pub fn ensure_unique_ids(alerts: &[Alert]) -> Result<()> {
    let mut seen = HashSet::with_capacity(alerts.len());
    for alert in alerts {
        if !seen.insert(alert.alert_id.as_str()) {
            return Err(OrchestrationError::DuplicateAlert(alert.alert_id.clone()));
        }
    }
    Ok(())
}
