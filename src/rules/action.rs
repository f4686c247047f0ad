use crate::rules::validation::error::ValidationError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Effect applied to traffic when a rule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    Allow,
    Block,
    Modify,
    Log,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Allow => "ALLOW",
            ActionType::Block => "BLOCK",
            ActionType::Modify => "MODIFY",
            ActionType::Log => "LOG",
        }
    }

    /// Whether this action decides the fate of the traffic unit.
    pub fn is_terminal(&self) -> bool {
        match self {
            ActionType::Allow | ActionType::Block | ActionType::Modify => true,
            ActionType::Log => false,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALLOW" => Ok(ActionType::Allow),
            "BLOCK" => Ok(ActionType::Block),
            "MODIFY" => Ok(ActionType::Modify),
            "LOG" => Ok(ActionType::Log),
            _ => Err(ValidationError::UnknownActionType {
                token: s.to_string(),
            }),
        }
    }
}

impl Serialize for ActionType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ActionType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// How a script rule's result folds into the cumulative result of the chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BooleanOperator {
    #[default]
    And,
    Or,
}

impl BooleanOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            BooleanOperator::And => "AND",
            BooleanOperator::Or => "OR",
        }
    }

    pub fn apply(&self, cumulative: bool, current: bool) -> bool {
        match self {
            BooleanOperator::And => cumulative && current,
            BooleanOperator::Or => cumulative || current,
        }
    }
}

impl fmt::Display for BooleanOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BooleanOperator {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" => Ok(BooleanOperator::And),
            "OR" => Ok(BooleanOperator::Or),
            _ => Err(ValidationError::UnknownBooleanOperator {
                token: s.to_string(),
            }),
        }
    }
}

impl Serialize for BooleanOperator {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BooleanOperator {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
