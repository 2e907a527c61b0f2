//! Processor driven by fields of the command document.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use serde_json::Value;

use crate::dispatch::{CommandProcessor, CommandReply, ProcessError};

/// Sleeps for `delay_ms`, fails when `fail` is true and otherwise replies
/// with the command id as its result.
#[derive(Debug, Default)]
pub struct ScriptedProcessor {
    calls: AtomicUsize,
}

impl ScriptedProcessor {
    /// Number of commands processed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CommandProcessor for ScriptedProcessor {
    fn process(&self, command: &Value) -> Result<CommandReply, ProcessError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = command.get("delay_ms").and_then(Value::as_u64) {
            thread::sleep(Duration::from_millis(delay));
        }
        if command.get("fail").and_then(Value::as_bool).unwrap_or(false) {
            return Err(ProcessError::new("scripted failure"));
        }
        let id = command.get("id").and_then(Value::as_str).unwrap_or_default();
        Ok(CommandReply::success(id))
    }
}
