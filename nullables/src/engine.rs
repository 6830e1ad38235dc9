//! Nullable execution engine: scripted contract outcomes for testing.

use rota_types::ContractState;
use rota_vm::{ExecutionEngine, ExecutionError, Invocation};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Records invocations and returns a fixed outcome.
///
/// By default every invocation succeeds and returns the prior state with
/// `"calls"` incremented, so tests can observe that execution happened.
#[derive(Default)]
pub struct NullEngine {
    failure: Mutex<Option<ExecutionError>>,
    invocations: AtomicUsize,
}

impl NullEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine whose every invocation fails with `error`.
    pub fn failing(error: ExecutionError) -> Self {
        Self {
            failure: Mutex::new(Some(error)),
            invocations: AtomicUsize::new(0),
        }
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

impl ExecutionEngine for NullEngine {
    fn execute(&self, invocation: Invocation<'_>) -> Result<ContractState, ExecutionError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failure.lock().unwrap_or_else(|e| e.into_inner()).clone() {
            return Err(err);
        }
        let mut state = invocation.state.clone();
        let calls = state.get("calls").and_then(|v| v.as_u64()).unwrap_or(0);
        state.insert("calls".into(), (calls + 1).into());
        Ok(state)
    }
}
