mod action;
mod condition;
pub mod evaluate;
mod script;
pub mod validation;

pub use action::{ActionType, BooleanOperator};
pub use condition::{ConditionExpr, ConditionRule};
pub use evaluate::{
    ChainOutcome, ConditionOutcome, ScriptExecutor, TrafficUnit, evaluate_conditions,
    run_script_chain,
};
pub use script::ScriptRule;
pub use validation::error::ValidationError;
