//! Diagnostic context snapshots.
//!
//! The pipeline never holds a reference to a thread's live context. At
//! publish time it asks a [`ContextDataInjector`] for immutable snapshots of
//! the key/value map and of the nested stack. Both snapshot types are `Arc`
//! backed, so taking one is a reference-count increment, and the default
//! [`ThreadContext`] store copies on write: mutating the context after a log
//! call detaches the thread's copy and leaves the published snapshot intact.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::event::Property;

/// Immutable key/value snapshot of a thread's diagnostic context.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ContextData(Arc<BTreeMap<String, String>>);

impl ContextData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copy of this snapshot with `properties` added. Keys already captured
    /// from the thread context are left untouched.
    pub fn merged_with(&self, properties: &[Property]) -> ContextData {
        if properties.iter().all(|p| self.contains_key(p.name())) {
            return self.clone();
        }
        let mut map = (*self.0).clone();
        for property in properties {
            map.entry(property.name().to_owned()).or_insert_with(|| property.value().to_owned());
        }
        ContextData(Arc::new(map))
    }

    fn insert(&mut self, key: String, value: String) {
        Arc::make_mut(&mut self.0).insert(key, value);
    }

    fn remove(&mut self, key: &str) -> Option<String> {
        if !self.0.contains_key(key) {
            return None;
        }
        Arc::make_mut(&mut self.0).remove(key)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ContextData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        ContextData(
            Arc::new(
                iter
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect()
            )
        )
    }
}

impl fmt::Debug for ContextData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

/// Immutable snapshot of a thread's nested diagnostic context, oldest first.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ContextStack(Arc<Vec<String>>);

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently pushed entry
    pub fn peek(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ContextStack {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        ContextStack(Arc::new(iter.into_iter().map(Into::into).collect()))
    }
}

impl fmt::Debug for ContextStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

/// Supplies context snapshots on the producer thread.
pub trait ContextDataInjector: Send + Sync {
    fn snapshot_map(&self) -> ContextData;

    fn snapshot_stack(&self) -> ContextStack;
}

thread_local! {
    static CONTEXT_MAP: RefCell<ContextData> = RefCell::new(ContextData::new());
    static CONTEXT_STACK: RefCell<ContextStack> = RefCell::new(ContextStack::new());
}

/// Per-thread diagnostic context store (map and nested stack).
pub struct ThreadContext;

impl ThreadContext {
    pub fn put(key: impl Into<String>, value: impl Into<String>) {
        CONTEXT_MAP.with(|map| map.borrow_mut().insert(key.into(), value.into()));
    }

    pub fn get(key: &str) -> Option<String> {
        CONTEXT_MAP.with(|map| map.borrow().get(key).map(str::to_owned))
    }

    pub fn remove(key: &str) -> Option<String> {
        CONTEXT_MAP.with(|map| map.borrow_mut().remove(key))
    }

    pub fn clear_map() {
        CONTEXT_MAP.with(|map| {
            *map.borrow_mut() = ContextData::new();
        });
    }

    pub fn push(entry: impl Into<String>) {
        CONTEXT_STACK.with(|stack| Arc::make_mut(&mut stack.borrow_mut().0).push(entry.into()));
    }

    pub fn pop() -> Option<String> {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.is_empty() {
                return None;
            }
            Arc::make_mut(&mut stack.0).pop()
        })
    }

    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().depth())
    }

    pub fn clear_stack() {
        CONTEXT_STACK.with(|stack| {
            *stack.borrow_mut() = ContextStack::new();
        });
    }

    pub fn clear_all() {
        Self::clear_map();
        Self::clear_stack();
    }

    /// Shallow snapshot of the calling thread's map; empty during
    /// thread-local teardown
    pub fn map_snapshot() -> ContextData {
        CONTEXT_MAP.try_with(|map| map.borrow().clone()).unwrap_or_else(|_| ContextData::new())
    }

    /// Shallow snapshot of the calling thread's stack
    pub fn stack_snapshot() -> ContextStack {
        CONTEXT_STACK.try_with(|stack| stack.borrow().clone()).unwrap_or_else(|_| ContextStack::new())
    }
}

/// Default injector backed by [`ThreadContext`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadContextInjector;

impl ContextDataInjector for ThreadContextInjector {
    fn snapshot_map(&self) -> ContextData {
        ThreadContext::map_snapshot()
    }

    fn snapshot_stack(&self) -> ContextStack {
        ThreadContext::stack_snapshot()
    }
}
