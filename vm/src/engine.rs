use rota_types::{Address, Amount, ContractInput, ContractState};
use serde_json::Value;

use crate::program::{Op, Program};
use crate::ExecutionError;

/// Maximum instructions executed by one invocation.
pub const MAX_STEPS: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvocationKind {
    /// Runs `init`, then the method named by the input if any.
    Deploy,
    /// Runs the method named by the input.
    Call,
}

/// Everything a contract may observe.
#[derive(Clone, Copy, Debug)]
pub struct Invocation<'a> {
    pub kind: InvocationKind,
    pub code: &'a str,
    pub state: &'a ContractState,
    pub input: Option<&'a ContractInput>,
    pub sender: &'a Address,
    pub value: Amount,
}

/// Deterministic contract state transition.
///
/// Implementations must return the same result for the same invocation on
/// every node.
pub trait ExecutionEngine: Send + Sync {
    fn execute(&self, invocation: Invocation<'_>) -> Result<ContractState, ExecutionError>;
}

/// Interpreter for [`Program`] contracts.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScriptEngine;

impl ScriptEngine {
    pub fn new() -> Self {
        Self
    }
}

impl ExecutionEngine for ScriptEngine {
    fn execute(&self, invocation: Invocation<'_>) -> Result<ContractState, ExecutionError> {
        let program = Program::parse(invocation.code)?;
        let mut run = Run {
            state: invocation.state.clone(),
            invocation: &invocation,
            steps: 0,
        };

        if invocation.kind == InvocationKind::Deploy {
            run.exec(&program.init)?;
        }
        match (invocation.kind, invocation.input) {
            (_, Some(input)) => run.exec(program.method(&input.method)?)?,
            (InvocationKind::Call, None) => return Err(ExecutionError::MissingInput),
            (InvocationKind::Deploy, None) => {}
        }

        tracing::trace!(steps = run.steps, "contract execution finished");
        Ok(run.state)
    }
}

struct Run<'a, 'b> {
    state: ContractState,
    invocation: &'a Invocation<'b>,
    steps: usize,
}

impl Run<'_, '_> {
    fn exec(&mut self, ops: &[Op]) -> Result<(), ExecutionError> {
        for (index, op) in ops.iter().enumerate() {
            self.steps += 1;
            if self.steps > MAX_STEPS {
                return Err(ExecutionError::StepLimit(MAX_STEPS));
            }
            match op {
                Op::Set { key, value } => {
                    let v = self.resolve(value)?;
                    self.state.insert(key.clone(), v);
                }
                Op::Add { key, value } => {
                    let delta = self.integer(value, key)?;
                    let current = self.current(key)?;
                    let next = current
                        .checked_add(delta)
                        .ok_or_else(|| ExecutionError::Overflow { key: key.clone() })?;
                    self.state.insert(key.clone(), Value::from(next));
                }
                Op::Sub { key, value } => {
                    let delta = self.integer(value, key)?;
                    let current = self.current(key)?;
                    let next = current
                        .checked_sub(delta)
                        .filter(|n| *n >= 0)
                        .ok_or_else(|| ExecutionError::Underflow { key: key.clone() })?;
                    self.state.insert(key.clone(), Value::from(next));
                }
                Op::Require { left, right } => {
                    if self.resolve(left)? != self.resolve(right)? {
                        return Err(ExecutionError::RequireFailed { index });
                    }
                }
            }
        }
        Ok(())
    }

    fn resolve(&self, operand: &Value) -> Result<Value, ExecutionError> {
        let Some(reference) = operand.as_str().and_then(|s| s.strip_prefix('$')) else {
            return Ok(operand.clone());
        };
        match reference {
            "sender" => Ok(Value::from(self.invocation.sender.as_str())),
            "value" => {
                let raw = self.invocation.value.raw();
                Ok(u64::try_from(raw)
                    .map(Value::from)
                    .unwrap_or_else(|_| Value::from(raw.to_string())))
            }
            _ => {
                if let Some(name) = reference.strip_prefix("param.") {
                    self.invocation
                        .input
                        .and_then(|input| input.params.get(name))
                        .cloned()
                        .ok_or_else(|| ExecutionError::MissingParam(name.to_string()))
                } else if let Some(key) = reference.strip_prefix("state.") {
                    Ok(self.state.get(key).cloned().unwrap_or(Value::Null))
                } else {
                    Err(ExecutionError::UnknownReference(reference.to_string()))
                }
            }
        }
    }

    fn integer(&self, operand: &Value, key: &str) -> Result<i64, ExecutionError> {
        self.resolve(operand)?
            .as_i64()
            .ok_or_else(|| ExecutionError::NotAnInteger { key: key.to_string() })
    }

    fn current(&self, key: &str) -> Result<i64, ExecutionError> {
        match self.state.get(key) {
            None | Some(Value::Null) => Ok(0),
            Some(v) => v
                .as_i64()
                .ok_or_else(|| ExecutionError::NotAnInteger { key: key.to_string() }),
        }
    }
}
