use crate::Result;
use crate::catalog::{PredicateKind, PredicateSet};
use crate::rules::validation::error::ValidationError;
use crate::rules::{ActionType, ConditionExpr, ConditionRule, ScriptRule};
use bon::Builder;
use ipnet::IpNet;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::net::IpAddr;
use tracing::trace;

/// One unit of intercepted traffic, as seen by the filtering layer.
#[derive(Debug, Clone, Default, Builder)]
pub struct TrafficUnit {
    /// Request method or protocol command
    #[builder(into)]
    pub command: Option<String>,
    /// Request target: HTTP path, FTP argument
    #[builder(into)]
    pub target: Option<String>,
    #[builder(default)]
    pub headers: Vec<(String, String)>,
    #[builder(default, into)]
    pub payload: Vec<u8>,
    pub peer: Option<IpAddr>,
}

/// Result of running condition rules against a traffic unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionOutcome {
    pub verdict: ActionType,
    /// Order of the rule that decided the verdict
    pub matched: Option<i64>,
    /// Orders of matching LOG rules passed on the way
    pub logged: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggeredAction {
    pub name: String,
    pub order: i64,
    pub action: ActionType,
}

/// Result of folding a script chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainOutcome {
    pub verdict: ActionType,
    pub triggered: Vec<TriggeredAction>,
}

/// Seam to the external script runtime.
pub trait ScriptExecutor {
    /// Run `rule` against `unit`; `true` means the script's result is truthy.
    fn execute(&mut self, rule: &ScriptRule, unit: &TrafficUnit) -> Result<bool>;
}

impl<F> ScriptExecutor for F
where
    F: FnMut(&ScriptRule, &TrafficUnit) -> Result<bool>,
{
    fn execute(&mut self, rule: &ScriptRule, unit: &TrafficUnit) -> Result<bool> {
        self(rule, unit)
    }
}

impl ActionType {
    fn precedence(&self) -> u8 {
        match self {
            ActionType::Log => 0,
            ActionType::Allow => 1,
            ActionType::Modify => 2,
            ActionType::Block => 3,
        }
    }
}

impl ConditionExpr {
    pub fn matches(&self, predicates: &PredicateSet, unit: &TrafficUnit) -> Result<bool> {
        match self {
            ConditionExpr::Predicate { predicate, value } => {
                let descriptor = predicates.get(predicate).ok_or_else(|| {
                    ValidationError::PredicateUndefined {
                        predicate: predicate.clone(),
                    }
                })?;
                eval_predicate(descriptor.kind, value, unit).map_err(|reason| {
                    ValidationError::InvalidFieldValue {
                        field: predicate.clone(),
                        reason,
                        value: value.to_string(),
                        expected_format: Some(descriptor.domain.description()),
                    }
                    .into()
                })
            }
            ConditionExpr::Not { expr } => Ok(!expr.matches(predicates, unit)?),
            ConditionExpr::All { exprs } => {
                for expr in exprs {
                    if !expr.matches(predicates, unit)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            ConditionExpr::Any { exprs } => {
                for expr in exprs {
                    if expr.matches(predicates, unit)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

fn eval_predicate(
    kind: PredicateKind,
    value: &Value,
    unit: &TrafficUnit,
) -> std::result::Result<bool, String> {
    match kind {
        PredicateKind::CommandIs => {
            let expected = value.as_str().ok_or("expected a string")?;
            Ok(unit
                .command
                .as_deref()
                .is_some_and(|command| command.eq_ignore_ascii_case(expected)))
        }
        PredicateKind::TargetMatches => {
            let re = compile(value)?;
            Ok(unit.target.as_deref().is_some_and(|t| re.is_match(t)))
        }
        PredicateKind::HeaderMatches => {
            let name = value
                .get("name")
                .and_then(Value::as_str)
                .ok_or("missing header 'name'")?;
            let re = compile(value.get("pattern").unwrap_or(&Value::Null))?;
            Ok(unit
                .headers
                .iter()
                .any(|(k, v)| k.eq_ignore_ascii_case(name) && re.is_match(v)))
        }
        PredicateKind::PayloadMatches => {
            let pattern = value.as_str().ok_or("expected a regex string")?;
            let re = regex::bytes::Regex::new(pattern).map_err(|e| e.to_string())?;
            Ok(re.is_match(&unit.payload))
        }
        PredicateKind::PayloadContains => {
            let needle = value.as_str().ok_or("expected a string")?.as_bytes();
            Ok(needle.is_empty()
                || unit
                    .payload
                    .windows(needle.len())
                    .any(|window| window == needle))
        }
        PredicateKind::SizeAtLeast => {
            let n = value.as_u64().ok_or("expected a non-negative integer")?;
            Ok(unit.payload.len() as u64 >= n)
        }
        PredicateKind::SizeAtMost => {
            let n = value.as_u64().ok_or("expected a non-negative integer")?;
            Ok(unit.payload.len() as u64 <= n)
        }
        PredicateKind::PeerInNetwork => {
            let net: IpNet = value
                .as_str()
                .ok_or("expected a CIDR string")?
                .parse()
                .map_err(|e: ipnet::AddrParseError| e.to_string())?;
            Ok(unit.peer.is_some_and(|ip| net.contains(&ip)))
        }
    }
}

fn compile(value: &Value) -> std::result::Result<Regex, String> {
    let pattern = value.as_str().ok_or("expected a regex string")?;
    Regex::new(pattern).map_err(|e| e.to_string())
}

/// Enabled rules in evaluation order; the sort is stable so equal orders keep
/// their stored sequence.
fn in_order<'a, R, F>(rules: &'a [R], key: F) -> Vec<&'a R>
where
    F: Fn(&R) -> (bool, i64),
{
    let mut ordered: Vec<&R> = rules.iter().filter(|r| key(*r).0).collect();
    ordered.sort_by_key(|r| key(*r).1);
    ordered
}

/// First enabled, matching, non-LOG rule decides; nothing matching allows.
pub fn evaluate_conditions(
    rules: &[ConditionRule],
    predicates: &PredicateSet,
    unit: &TrafficUnit,
) -> Result<ConditionOutcome> {
    let mut logged = Vec::new();

    for rule in in_order(rules, |r| (r.enabled, r.order)) {
        if !rule.expression.matches(predicates, unit)? {
            continue;
        }
        trace!(order = rule.order, action = %rule.action_type, "Condition rule matched");

        if !rule.action_type.is_terminal() {
            logged.push(rule.order);
            continue;
        }

        return Ok(ConditionOutcome {
            verdict: rule.action_type,
            matched: Some(rule.order),
            logged,
        });
    }

    Ok(ConditionOutcome {
        verdict: ActionType::Allow,
        matched: None,
        logged,
    })
}

/// Fold the enabled scripts in order: the first result seeds the cumulative
/// value, every later result joins it through that rule's operator. A rule's
/// action fires whenever the cumulative value is truthy after its step.
pub fn run_script_chain<E>(
    rules: &[ScriptRule],
    unit: &TrafficUnit,
    executor: &mut E,
) -> Result<ChainOutcome>
where
    E: ScriptExecutor + ?Sized,
{
    let mut cumulative: Option<bool> = None;
    let mut triggered = Vec::new();

    for rule in in_order(rules, |r| (r.enabled, r.order)) {
        let result = executor.execute(rule, unit)?;
        let folded = match cumulative {
            None => result,
            Some(previous) => rule.boolean_operator.apply(previous, result),
        };
        cumulative = Some(folded);

        if folded {
            trace!(
                name = %rule.name,
                order = rule.order,
                action = %rule.action_type,
                "Script rule triggered"
            );
            triggered.push(TriggeredAction {
                name: rule.name.clone(),
                order: rule.order,
                action: rule.action_type,
            });
        }
    }

    Ok(ChainOutcome {
        verdict: strongest(triggered.iter().map(|t| t.action)),
        triggered,
    })
}

/// Strongest terminal action; ALLOW when none fired.
pub fn strongest(actions: impl IntoIterator<Item = ActionType>) -> ActionType {
    actions
        .into_iter()
        .filter(ActionType::is_terminal)
        .max_by_key(ActionType::precedence)
        .unwrap_or(ActionType::Allow)
}
