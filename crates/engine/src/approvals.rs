use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Human approvals keyed by `{trace_id}:{step_name}`. Shared across events;
/// an approval recorded out of band unlocks the gated step on the next
/// submission or replay of the event.
#[derive(Debug, Default)]
pub struct ApprovalLedger {
    entries: RwLock<HashMap<String, HashSet<String>>>,
}

impl ApprovalLedger {
    fn key(trace_id: &str, step_name: &str) -> String {
        format!("{trace_id}:{step_name}")
    }

    pub fn approve(&self, trace_id: &str, step_name: &str, approved_by: &str) {
        let mut entries = match self.entries.write() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.entry(Self::key(trace_id, step_name)).or_default().insert(approved_by.to_string());
    }

    pub fn is_approved(&self, trace_id: &str, step_name: &str) -> bool {
        let entries = match self.entries.read() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.get(&Self::key(trace_id, step_name)).is_some_and(|approvers| !approvers.is_empty())
    }
}
