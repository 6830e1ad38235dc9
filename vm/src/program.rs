//! Contract program format.
//!
//! ```json
//! {
//!   "init": [{ "op": "set", "key": "count", "value": 0 }],
//!   "methods": {
//!     "increment": [{ "op": "add", "key": "count", "value": "$param.amount" }],
//!     "reset":     [{ "op": "set", "key": "count", "value": 0 }]
//!   }
//! }
//! ```
//!
//! Operands are JSON values. Strings starting with `$` are references:
//! `$sender`, `$value`, `$param.<name>` and `$state.<key>`. Anything else is
//! a literal.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ExecutionError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// `state[key] = value`
    Set { key: String, value: serde_json::Value },
    /// `state[key] += value` (missing key counts as 0)
    Add { key: String, value: serde_json::Value },
    /// `state[key] -= value`, failing below zero
    Sub { key: String, value: serde_json::Value },
    /// Abort unless both operands resolve to equal values.
    Require {
        left: serde_json::Value,
        right: serde_json::Value,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub init: Vec<Op>,
    #[serde(default)]
    pub methods: BTreeMap<String, Vec<Op>>,
}

impl Program {
    pub fn parse(code: &str) -> Result<Self, ExecutionError> {
        serde_json::from_str(code).map_err(|e| ExecutionError::InvalidProgram(e.to_string()))
    }

    pub fn method(&self, name: &str) -> Result<&[Op], ExecutionError> {
        self.methods
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| ExecutionError::UnknownMethod(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_counter() {
        let program = Program::parse(
            r#"{"init":[{"op":"set","key":"count","value":0}],
                "methods":{"increment":[{"op":"add","key":"count","value":"$param.amount"}]}}"#,
        )
        .unwrap();
        assert_eq!(program.init.len(), 1);
        assert!(program.method("increment").is_ok());
        assert_eq!(
            program.method("nope"),
            Err(ExecutionError::UnknownMethod("nope".into()))
        );
    }

    #[test]
    fn rejects_unknown_op() {
        let err = Program::parse(r#"{"init":[{"op":"jump","to":0}]}"#).unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidProgram(_)));
    }
}
