use std::collections::HashMap;
use std::fmt;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use serde::Deserialize;

use crate::Error;
use crate::Result;
use crate::message::Timestamp;

/// Env var holding the base64 encoded JSON ingress object.
pub const ENV_INGRESS_OBJECT: &str = "TEMPO_INGRESS_OBJECT";

const DEFAULT_PIPELINE_NAME: &str = "default";

/// How an event arriving more than `lag` behind the watermark is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisorderPolicy {
    /// Drop the late event and report it on the diagnostic channel.
    Drop(u64),
    /// Fail the pipeline.
    Throw(u64),
    /// Move the late event's start time up to the cutoff and report the shift.
    Adjust(u64),
}

impl DisorderPolicy {
    /// Tolerated lateness in timestamp units.
    pub fn lag(&self) -> u64 {
        match self {
            DisorderPolicy::Drop(lag) | DisorderPolicy::Throw(lag) | DisorderPolicy::Adjust(lag) => {
                *lag
            }
        }
    }

    /// Short name of the policy, used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            DisorderPolicy::Drop(_) => "drop",
            DisorderPolicy::Throw(_) => "throw",
            DisorderPolicy::Adjust(_) => "adjust",
        }
    }

    /// Cutoff below which an event is late, for the given watermark. Lags beyond `i64::MAX`
    /// saturate, so the cutoff never wraps around.
    pub fn cutoff(&self, watermark: Timestamp) -> Timestamp {
        let lag = Timestamp::try_from(self.lag()).unwrap_or(Timestamp::MAX);
        watermark.saturating_sub(lag)
    }
}

impl fmt::Display for DisorderPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisorderPolicy::Drop(lag) => write!(f, "drop(lag={lag})"),
            DisorderPolicy::Throw(lag) => write!(f, "throw(lag={lag})"),
            DisorderPolicy::Adjust(lag) => write!(f, "adjust(lag={lag})"),
        }
    }
}

/// Whether periodic punctuations are generated from the released stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PunctuationPolicy {
    #[default]
    None,
    /// Emit a punctuation each time the released stream moves at least `period` past the last one.
    Periodic(u64),
}

/// Configuration of one ingress pipeline, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressConfig {
    /// Name used for logs and metric labels.
    pub name: String,
    pub disorder: DisorderPolicy,
    pub punctuation: PunctuationPolicy,
    /// Subscribes to the diagnostic channel. When false, diagnostics are not computed.
    pub diagnostics: bool,
}

impl IngressConfig {
    pub fn new(disorder: DisorderPolicy) -> Self {
        Self {
            name: DEFAULT_PIPELINE_NAME.to_string(),
            disorder,
            punctuation: PunctuationPolicy::None,
            diagnostics: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_punctuation(mut self, punctuation: PunctuationPolicy) -> Self {
        self.punctuation = punctuation;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: bool) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Config("pipeline name cannot be empty".to_string()));
        }
        if self.punctuation == PunctuationPolicy::Periodic(0) {
            return Err(Error::Config(
                "punctuation period must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Loads the config from the base64 encoded JSON object in [ENV_INGRESS_OBJECT].
    pub fn load(
        env_vars: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Result<Self> {
        let env_vars: HashMap<String, String> = env_vars
            .into_iter()
            .map(|(key, val)| (key.into(), val.into()))
            .filter(|(key, _val)| key == ENV_INGRESS_OBJECT)
            .collect();

        let encoded = env_vars.get(ENV_INGRESS_OBJECT).ok_or_else(|| {
            Error::Config(format!("Environment variable {ENV_INGRESS_OBJECT} is not set"))
        })?;

        let decoded = BASE64_STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| Error::Config(format!("Failed to decode ingress object: {e}")))?;

        Self::from_json(&decoded)
    }

    /// Parses and validates a JSON ingress object.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let spec: IngressSpec = serde_json::from_slice(bytes)
            .map_err(|e| Error::Config(format!("Failed to parse ingress object: {e}")))?;
        let config = IngressConfig::from(spec);
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngressSpec {
    #[serde(default)]
    name: Option<String>,
    disorder: DisorderSpec,
    #[serde(default)]
    punctuation: Option<PunctuationSpec>,
    #[serde(default)]
    diagnostics: bool,
}

#[derive(Debug, Deserialize)]
struct DisorderSpec {
    policy: PolicyKind,
    #[serde(default)]
    lag: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PolicyKind {
    Drop,
    Throw,
    Adjust,
}

#[derive(Debug, Deserialize)]
struct PunctuationSpec {
    period: u64,
}

impl From<IngressSpec> for IngressConfig {
    fn from(spec: IngressSpec) -> Self {
        let disorder = match spec.disorder.policy {
            PolicyKind::Drop => DisorderPolicy::Drop(spec.disorder.lag),
            PolicyKind::Throw => DisorderPolicy::Throw(spec.disorder.lag),
            PolicyKind::Adjust => DisorderPolicy::Adjust(spec.disorder.lag),
        };
        let punctuation = spec
            .punctuation
            .map_or(PunctuationPolicy::None, |p| PunctuationPolicy::Periodic(p.period));

        IngressConfig {
            name: spec
                .name
                .unwrap_or_else(|| DEFAULT_PIPELINE_NAME.to_string()),
            disorder,
            punctuation,
            diagnostics: spec.diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encoded(value: serde_json::Value) -> Vec<(String, String)> {
        vec![
            (
                ENV_INGRESS_OBJECT.to_string(),
                BASE64_STANDARD.encode(value.to_string()),
            ),
            ("UNRELATED".to_string(), "ignored".to_string()),
        ]
    }

    #[test]
    fn test_load_full_object() {
        let env = encoded(json!({
            "name": "orders",
            "disorder": {"policy": "adjust", "lag": 5},
            "punctuation": {"period": 10},
            "diagnostics": true
        }));

        let config = IngressConfig::load(env).unwrap();
        assert_eq!(config.name, "orders");
        assert_eq!(config.disorder, DisorderPolicy::Adjust(5));
        assert_eq!(config.punctuation, PunctuationPolicy::Periodic(10));
        assert!(config.diagnostics);
    }

    #[test]
    fn test_load_defaults() {
        let env = encoded(json!({"disorder": {"policy": "drop"}}));

        let config = IngressConfig::load(env).unwrap();
        assert_eq!(config.name, DEFAULT_PIPELINE_NAME);
        assert_eq!(config.disorder, DisorderPolicy::Drop(0));
        assert_eq!(config.punctuation, PunctuationPolicy::None);
        assert!(!config.diagnostics);
    }

    #[test]
    fn test_load_errors() {
        let missing: Vec<(String, String)> = vec![];
        assert!(matches!(
            IngressConfig::load(missing),
            Err(Error::Config(_))
        ));

        let not_base64 = vec![(ENV_INGRESS_OBJECT, "%%%")];
        assert!(matches!(
            IngressConfig::load(not_base64),
            Err(Error::Config(_))
        ));

        let unknown_policy = encoded(json!({"disorder": {"policy": "retry", "lag": 1}}));
        assert!(matches!(
            IngressConfig::load(unknown_policy),
            Err(Error::Config(_))
        ));

        let zero_period = encoded(json!({
            "disorder": {"policy": "throw", "lag": 1},
            "punctuation": {"period": 0}
        }));
        assert!(matches!(
            IngressConfig::load(zero_period),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_cutoff() {
        assert_eq!(DisorderPolicy::Drop(5).cutoff(12), 7);
        // cutoff can go negative
        assert_eq!(DisorderPolicy::Adjust(5).cutoff(0), -5);
        assert_eq!(DisorderPolicy::Throw(u64::MAX).cutoff(0), -Timestamp::MAX);
        assert_eq!(
            DisorderPolicy::Throw(u64::MAX).cutoff(Timestamp::MIN),
            Timestamp::MIN
        );
    }

    #[test]
    fn test_builder_validate() {
        let config = IngressConfig::new(DisorderPolicy::Throw(3))
            .with_name("clicks")
            .with_punctuation(PunctuationPolicy::Periodic(100))
            .with_diagnostics(true);
        assert!(config.validate().is_ok());
        assert_eq!(config.disorder.lag(), 3);
        assert_eq!(config.disorder.to_string(), "throw(lag=3)");

        let unnamed = IngressConfig::new(DisorderPolicy::Drop(1)).with_name("");
        assert!(unnamed.validate().is_err());
    }
}
