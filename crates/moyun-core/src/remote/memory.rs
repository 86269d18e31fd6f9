//! In-process remote tree used by tests and offline demos

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};

use super::{RemoteError, RemoteResult, RemoteTransport};

/// Failure returned for an injected path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    Unavailable,
    PermissionDenied,
}

#[derive(Debug, Clone)]
struct FailureRule {
    prefix: String,
    writes_only: bool,
    failure: InjectedFailure,
}

impl FailureRule {
    fn matches(&self, path: &str, is_write: bool) -> bool {
        if self.writes_only && !is_write {
            return false;
        }
        path == self.prefix
            || path
                .strip_prefix(&self.prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    root: Map<String, Value>,
    failures: Vec<FailureRule>,
    offline: bool,
    writes: Vec<String>,
    deletes: Vec<String>,
}

/// Nested JSON tree with failure injection and a write log
#[derive(Debug, Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
}

impl MemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail every operation on `prefix` and its children.
    pub fn fail_path(&self, prefix: &str, failure: InjectedFailure) {
        self.state().failures.push(FailureRule {
            prefix: prefix.to_string(),
            writes_only: false,
            failure,
        });
    }

    /// Fail writes and deletes on `prefix` and its children; reads still work.
    pub fn fail_writes(&self, prefix: &str, failure: InjectedFailure) {
        self.state().failures.push(FailureRule {
            prefix: prefix.to_string(),
            writes_only: true,
            failure,
        });
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Make every operation fail as unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Paths written so far, in order
    #[must_use]
    pub fn writes(&self) -> Vec<String> {
        self.state().writes.clone()
    }

    /// Paths deleted so far, in order
    #[must_use]
    pub fn deletes(&self) -> Vec<String> {
        self.state().deletes.clone()
    }

    pub fn clear_log(&self) {
        let mut state = self.state();
        state.writes.clear();
        state.deletes.clear();
    }

    /// Copy of the whole tree
    #[must_use]
    pub fn snapshot(&self) -> Value {
        Value::Object(self.state().root.clone())
    }

    /// Read a path synchronously, bypassing failure injection.
    #[must_use]
    pub fn peek(&self, path: &str) -> Option<Value> {
        lookup(&self.state().root, path)
    }

    /// Write a path synchronously, bypassing failure injection and the log.
    pub fn seed(&self, path: &str, value: Value) {
        insert(&mut self.state().root, path, value);
    }

    fn check(state: &MemoryState, path: &str, is_write: bool) -> RemoteResult<()> {
        if state.offline {
            return Err(RemoteError::Unavailable("memory transport is offline".to_string()));
        }
        let failure = state
            .failures
            .iter()
            .find(|rule| rule.matches(path, is_write))
            .map(|rule| rule.failure);

        match failure {
            Some(InjectedFailure::Unavailable) => Err(RemoteError::Unavailable(format!(
                "injected failure at {path}"
            ))),
            Some(InjectedFailure::PermissionDenied) => {
                Err(RemoteError::PermissionDenied(path.to_string()))
            }
            None => Ok(()),
        }
    }
}

impl RemoteTransport for MemoryTransport {
    async fn get(&self, path: &str) -> RemoteResult<Option<Value>> {
        let state = self.state();
        Self::check(&state, path, false)?;
        Ok(lookup(&state.root, path))
    }

    async fn put(&self, path: &str, value: &Value) -> RemoteResult<()> {
        let mut state = self.state();
        Self::check(&state, path, true)?;
        insert(&mut state.root, path, value.clone());
        state.writes.push(path.to_string());
        Ok(())
    }

    async fn delete(&self, path: &str) -> RemoteResult<()> {
        let mut state = self.state();
        Self::check(&state, path, true)?;
        remove(&mut state.root, path);
        state.deletes.push(path.to_string());
        Ok(())
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

fn lookup(root: &Map<String, Value>, path: &str) -> Option<Value> {
    let mut parts = segments(path);
    let first = parts.next()?;
    let mut current = root.get(first)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    (!current.is_null()).then(|| current.clone())
}

fn insert(root: &mut Map<String, Value>, path: &str, value: Value) {
    if value.is_null() {
        remove(root, path);
        return;
    }

    let parts: Vec<&str> = segments(path).collect();
    let Some((last, parents)) = parts.split_last() else {
        return;
    };

    let mut current = root;
    for part in parents {
        let slot = current
            .entry((*part).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(next) = slot else {
            return;
        };
        current = next;
    }
    current.insert((*last).to_string(), value);
}

/// Remove a leaf and prune parents left empty, as the real store does.
fn remove(root: &mut Map<String, Value>, path: &str) {
    fn remove_in(map: &mut Map<String, Value>, parts: &[&str]) {
        let Some((first, rest)) = parts.split_first() else {
            return;
        };
        if rest.is_empty() {
            map.remove(*first);
            return;
        }
        let emptied = match map.get_mut(*first) {
            Some(Value::Object(child)) => {
                remove_in(child, rest);
                child.is_empty()
            }
            _ => false,
        };
        if emptied {
            map.remove(*first);
        }
    }

    let parts: Vec<&str> = segments(path).collect();
    remove_in(root, &parts);
}
