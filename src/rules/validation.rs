pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum ValidationError {
        // Payload errors
        #[error("Malformed {rule_kind} rule payload: {reason}")]
        MalformedPayload { rule_kind: String, reason: String },

        #[error("Missing required field '{field}' in {context}")]
        MissingRequiredField { field: String, context: String },

        #[error("Invalid field value for '{field}': {reason}")]
        InvalidFieldValue {
            field: String,
            reason: String,
            value: String,
            expected_format: Option<String>,
        },

        // Vocabulary errors
        #[error("Unknown action type '{token}' (expected one of ALLOW, BLOCK, MODIFY, LOG)")]
        UnknownActionType { token: String },

        #[error("Unknown boolean operator '{token}' (expected AND or OR)")]
        UnknownBooleanOperator { token: String },

        // Rule errors
        #[error("Invalid rule: {message}")]
        InvalidRule {
            message: String,
            rule_type: String,
            position: Option<usize>,
        },

        #[error("Unknown predicate '{predicate}' for protocol '{protocol}' in rule #{position}")]
        UnknownPredicate {
            predicate: String,
            protocol: String,
            position: usize,
        },

        #[error("Protocol '{protocol}' has no condition predicates; condition rules cannot be stored")]
        ProtocolHasNoConditions { protocol: String },

        // Evaluation errors
        #[error("Predicate '{predicate}' is not defined in the predicate set used for evaluation")]
        PredicateUndefined { predicate: String },
    }

    impl ValidationError {
        pub fn malformed(rule_kind: impl Into<String>, reason: impl Into<String>) -> Self {
            Self::MalformedPayload {
                rule_kind: rule_kind.into(),
                reason: reason.into(),
            }
        }
    }
}

use crate::Result;
use crate::catalog::{ConditionCatalog, PredicateSet};
use crate::rules::{ConditionExpr, ConditionRule, ScriptRule};
use error::ValidationError;
use tracing::debug;

/// Check every condition rule against the catalog entry for its protocol.
pub fn validate_condition_rules(rules: &[ConditionRule], catalog: &ConditionCatalog) -> Result<()> {
    for (position, rule) in rules.iter().enumerate() {
        let Some(predicates) = catalog.lookup(&rule.protocol) else {
            return Err(ValidationError::ProtocolHasNoConditions {
                protocol: rule.protocol.clone(),
            }
            .into());
        };
        validate_expr(&rule.expression, predicates, &rule.protocol, position)?;
    }

    debug!(count = rules.len(), "Condition rules validated");
    Ok(())
}

fn validate_expr(
    expr: &ConditionExpr,
    predicates: &PredicateSet,
    protocol: &str,
    position: usize,
) -> Result<()> {
    match expr {
        ConditionExpr::Predicate { predicate, value } => {
            let Some(descriptor) = predicates.get(predicate) else {
                return Err(ValidationError::UnknownPredicate {
                    predicate: predicate.clone(),
                    protocol: protocol.to_string(),
                    position,
                }
                .into());
            };

            descriptor.domain.check(value).map_err(|reason| {
                ValidationError::InvalidFieldValue {
                    field: format!("rule #{} predicate '{}'", position, predicate),
                    reason,
                    value: value.to_string(),
                    expected_format: Some(descriptor.domain.description()),
                }
            })?;
            Ok(())
        }
        ConditionExpr::Not { expr } => validate_expr(expr, predicates, protocol, position),
        ConditionExpr::All { exprs } | ConditionExpr::Any { exprs } => {
            if exprs.is_empty() {
                return Err(ValidationError::InvalidRule {
                    message: "boolean group without sub-expressions".to_string(),
                    rule_type: "condition".to_string(),
                    position: Some(position),
                }
                .into());
            }
            for expr in exprs {
                validate_expr(expr, predicates, protocol, position)?;
            }
            Ok(())
        }
    }
}

/// Script bodies are opaque here; only their presence is checked.
pub fn validate_script_rules(rules: &[ScriptRule]) -> Result<()> {
    for (position, rule) in rules.iter().enumerate() {
        if rule.script.trim().is_empty() {
            return Err(ValidationError::MissingRequiredField {
                field: "script".to_string(),
                context: format!("script rule #{}", position),
            }
            .into());
        }
    }

    Ok(())
}
