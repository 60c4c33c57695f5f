use crate::types::{Invocation, InvocationStatus};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// In-memory table of invocations issued by a local channel.
///
/// Terminal invocations are immutable: [`InvocationRegistry::set_status`] and
/// [`InvocationRegistry::finish`] refuse to touch them.
#[derive(Debug)]
pub struct InvocationRegistry {
    entries: Mutex<HashMap<String, Invocation>>,
    retention: Duration,
}

impl InvocationRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            retention,
        }
    }

    pub fn insert(&self, inv: Invocation) {
        if let Ok(mut entries) = self.entries.lock() {
            prune(&mut entries, self.retention);
            entries.insert(inv.command_id.clone(), inv);
        }
    }

    /// Look up an invocation; it must belong to `target`.
    pub fn get(&self, command_id: &str, target: &str) -> Option<Invocation> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(command_id)
            .filter(|inv| inv.target == target)
            .cloned()
    }

    /// Move a live invocation to a non-terminal status.
    pub fn set_status(&self, command_id: &str, status: InvocationStatus) -> bool {
        let Ok(mut entries) = self.entries.lock() else {
            return false;
        };
        match entries.get_mut(command_id) {
            Some(inv) if !inv.status.is_terminal() => {
                inv.status = status;
                true
            }
            _ => false,
        }
    }

    /// Record the terminal outcome. Returns false if it was already terminal.
    pub fn finish(
        &self,
        command_id: &str,
        status: InvocationStatus,
        stdout: String,
        stderr: String,
        exit_code: Option<i32>,
    ) -> bool {
        let Ok(mut entries) = self.entries.lock() else {
            return false;
        };
        match entries.get_mut(command_id) {
            Some(inv) if !inv.status.is_terminal() => {
                inv.status = status;
                inv.stdout = stdout;
                inv.stderr = stderr;
                inv.exit_code = exit_code;
                inv.finished_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn prune(entries: &mut HashMap<String, Invocation>, retention: Duration) {
    let Ok(retention) = chrono::Duration::from_std(retention) else {
        return;
    };
    let cutoff = Utc::now() - retention;
    entries.retain(|_, inv| match inv.finished_at {
        Some(done) => done > cutoff,
        None => true,
    });
}
