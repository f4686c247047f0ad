//! Protocol condition catalog.
//!
//! Maps a protocol name to the predicates that condition rules for that
//! protocol may reference. The catalog is assembled once at startup (builtin
//! definitions, optionally extended from a YAML file) and is read-only after
//! that; callers share it through an `Arc`.

mod builtin;

use crate::{Error, Result};
use ipnet::IpNet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Predicates available for one protocol, keyed by predicate id.
pub type PredicateSet = BTreeMap<String, PredicateDescriptor>;

/// What part of a traffic unit a predicate inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateKind {
    /// Request method or protocol command equals one of the given tokens
    CommandIs,
    /// Request target (path, command argument) matches a regex
    TargetMatches,
    /// A named header matches a regex
    HeaderMatches,
    /// Raw payload matches a regex
    PayloadMatches,
    /// Raw payload contains a literal substring
    PayloadContains,
    /// Payload size is at least N bytes
    SizeAtLeast,
    /// Payload size is at most N bytes
    SizeAtMost,
    /// Peer address lies inside a network
    PeerInNetwork,
}

impl PredicateKind {
    /// Whether values from `domain` can drive this kind of predicate.
    pub fn accepts(&self, domain: &ValueDomain) -> bool {
        match self {
            PredicateKind::CommandIs => {
                matches!(domain, ValueDomain::OneOf { .. } | ValueDomain::Text)
            }
            PredicateKind::TargetMatches | PredicateKind::PayloadMatches => {
                matches!(domain, ValueDomain::Regex)
            }
            PredicateKind::HeaderMatches => matches!(domain, ValueDomain::HeaderPattern),
            PredicateKind::PayloadContains => matches!(domain, ValueDomain::Text),
            // payload sizes are unsigned
            PredicateKind::SizeAtLeast | PredicateKind::SizeAtMost => {
                matches!(domain, ValueDomain::Integer { min: Some(min), .. } if *min >= 0)
            }
            PredicateKind::PeerInNetwork => matches!(domain, ValueDomain::Cidr),
        }
    }
}

/// Set of values a predicate accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValueDomain {
    Text,
    Regex,
    Integer {
        #[serde(default)]
        min: Option<i64>,
        #[serde(default)]
        max: Option<i64>,
    },
    OneOf {
        values: Vec<String>,
    },
    Cidr,
    /// `{"name": <header>, "pattern": <regex>}`
    HeaderPattern,
}

impl ValueDomain {
    /// Human-readable description shown to rule authors.
    pub fn description(&self) -> String {
        match self {
            ValueDomain::Text => "text".to_string(),
            ValueDomain::Regex => "regular expression".to_string(),
            ValueDomain::Integer { min, max } => match (min, max) {
                (Some(min), Some(max)) => format!("integer between {} and {}", min, max),
                (Some(min), None) => format!("integer >= {}", min),
                (None, Some(max)) => format!("integer <= {}", max),
                (None, None) => "integer".to_string(),
            },
            ValueDomain::OneOf { values } => format!("one of: {}", values.join(", ")),
            ValueDomain::Cidr => "network in CIDR notation (e.g. 10.0.0.0/8)".to_string(),
            ValueDomain::HeaderPattern => {
                "object {\"name\": header name, \"pattern\": regular expression}".to_string()
            }
        }
    }

    /// Check that `value` belongs to this domain.
    pub fn check(&self, value: &Value) -> std::result::Result<(), String> {
        match self {
            ValueDomain::Text => match value.as_str() {
                Some(s) if !s.is_empty() => Ok(()),
                Some(_) => Err("text must not be empty".to_string()),
                None => Err("expected a string".to_string()),
            },
            ValueDomain::Regex => {
                let pattern = value.as_str().ok_or("expected a regex string")?;
                Regex::new(pattern)
                    .map(|_| ())
                    .map_err(|e| format!("invalid regex: {}", e))
            }
            ValueDomain::Integer { min, max } => {
                let n = value.as_i64().ok_or("expected an integer")?;
                if min.is_some_and(|min| n < min) || max.is_some_and(|max| n > max) {
                    return Err(format!("{} is outside the allowed range", n));
                }
                Ok(())
            }
            ValueDomain::OneOf { values } => {
                let token = value.as_str().ok_or("expected a string")?;
                if values.iter().any(|v| v.eq_ignore_ascii_case(token)) {
                    Ok(())
                } else {
                    Err(format!("'{}' is not an accepted value", token))
                }
            }
            ValueDomain::Cidr => {
                let net = value.as_str().ok_or("expected a CIDR string")?;
                net.parse::<IpNet>()
                    .map(|_| ())
                    .map_err(|e| format!("invalid network '{}': {}", net, e))
            }
            ValueDomain::HeaderPattern => {
                let name = value
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or("missing header 'name'")?;
                if name.is_empty() {
                    return Err("header name must not be empty".to_string());
                }
                let pattern = value
                    .get("pattern")
                    .and_then(Value::as_str)
                    .ok_or("missing header 'pattern'")?;
                Regex::new(pattern)
                    .map(|_| ())
                    .map_err(|e| format!("invalid regex: {}", e))
            }
        }
    }
}

impl fmt::Display for ValueDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredicateDescriptor {
    pub kind: PredicateKind,
    #[serde(default)]
    pub description: String,
    pub domain: ValueDomain,
}

impl PredicateDescriptor {
    pub fn new(kind: PredicateKind, domain: ValueDomain, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            domain,
        }
    }

    /// Self-describing form presented to rule authors.
    pub fn to_option(&self, predicate_id: &str) -> ConditionOption {
        ConditionOption {
            predicate_id: predicate_id.to_string(),
            domain_description: self.domain.description(),
            description: self.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionOption {
    pub predicate_id: String,
    pub domain_description: String,
    pub description: String,
}

/// Immutable registry of protocol predicates.
#[derive(Debug, Clone, Default)]
pub struct ConditionCatalog {
    protocols: HashMap<String, PredicateSet>,
}

impl ConditionCatalog {
    /// Catalog with the builtin protocol definitions.
    pub fn builtin() -> Self {
        let mut catalog = Self::default();
        for (protocol, predicates) in builtin::definitions() {
            catalog.protocols.insert(protocol.to_string(), predicates);
        }
        catalog
    }

    /// Parse protocol definitions from YAML.
    ///
    /// Top level keys are protocol names, each mapping predicate ids to
    /// descriptors.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let raw: HashMap<String, PredicateSet> = serde_yaml::from_str(yaml)?;
        let mut catalog = Self::default();

        for (protocol, predicates) in raw {
            for (id, descriptor) in &predicates {
                if !descriptor.kind.accepts(&descriptor.domain) {
                    return Err(Error::config_with_suggestion(
                        format!(
                            "predicate '{}' of kind {:?} cannot take values of type '{}'",
                            id, descriptor.kind, descriptor.domain
                        ),
                        format!("catalog protocol '{}'", protocol),
                        "pick a domain matching the predicate kind",
                    ));
                }
            }
            catalog.protocols.insert(protocol.to_lowercase(), predicates);
        }

        Ok(catalog)
    }

    /// Builtin definitions, extended by the YAML file at `path` when given.
    ///
    /// A protocol present in the file replaces the builtin entry entirely.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut catalog = Self::builtin();

        if let Some(path) = path {
            let yaml = std::fs::read_to_string(path)
                .map_err(|e| Error::file_operation(path, "read condition catalog", e))?;
            let extra = Self::from_yaml_str(&yaml)?;
            for (protocol, predicates) in extra.protocols {
                debug!(protocol = %protocol, count = predicates.len(), "Catalog entry loaded");
                catalog.protocols.insert(protocol, predicates);
            }
        }

        info!(protocols = ?catalog.protocol_names(), "Condition catalog ready");
        Ok(catalog)
    }

    /// Case-insensitive lookup; `None` means the protocol has no predicates
    /// defined at all.
    pub fn lookup(&self, protocol: &str) -> Option<&PredicateSet> {
        self.protocols.get(&protocol.to_lowercase())
    }

    /// Predicate descriptors for rule authors, sorted by predicate id.
    pub fn options(&self, protocol: &str) -> Result<Vec<ConditionOption>> {
        let predicates = self
            .lookup(protocol)
            .ok_or_else(|| Error::protocol_not_found(protocol))?;

        Ok(predicates
            .iter()
            .map(|(id, descriptor)| descriptor.to_option(id))
            .collect())
    }

    pub fn protocol_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.protocols.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
