// ABOUTME: Per-invocation state carried through a render
// ABOUTME: Holds sender details, match metadata, origin tagging, and local variables

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::registry::Match;

/// Where a trigger came from. Anything but `External` was synthesized by a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    External,
    Callback,
    Deferred,
}

#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub invocation_id: String,
    pub trigger: String,
    pub sender_id: String,
    pub group_id: String,
    pub origin: Origin,
    pub depth: usize,
    pub received_at: DateTime<Utc>,
    pub source_name: String,
    pub line: usize,
    pub cost: Duration,
    locals: HashMap<String, String>,
    // Triggers being resolved further up the callback chain.
    ancestors: Vec<String>,
    // Callbacks resolved so far for the whole event, shared by every nested render.
    callbacks: Arc<AtomicUsize>,
}

impl InvocationContext {
    pub fn new(
        trigger: impl Into<String>,
        sender_id: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            invocation_id: uuid::Uuid::new_v4().to_string(),
            trigger: trigger.into(),
            sender_id: sender_id.into(),
            group_id: group_id.into(),
            origin: Origin::External,
            depth: 0,
            received_at: Utc::now(),
            source_name: String::new(),
            line: 0,
            cost: Duration::ZERO,
            locals: HashMap::new(),
            ancestors: Vec::new(),
            callbacks: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Anonymous external invocation, as used by one-shot queries.
    pub fn anonymous(trigger: impl Into<String>) -> Self {
        Self::new(trigger, "", "")
    }

    fn derived(&self, trigger: &str, origin: Origin) -> Self {
        let (depth, ancestors, callbacks) = match origin {
            Origin::Callback => {
                let mut ancestors = self.ancestors.clone();
                ancestors.push(self.trigger.clone());
                (self.depth + 1, ancestors, Arc::clone(&self.callbacks))
            }
            _ => (0, Vec::new(), Arc::new(AtomicUsize::new(0))),
        };

        Self {
            invocation_id: uuid::Uuid::new_v4().to_string(),
            trigger: trigger.to_string(),
            sender_id: self.sender_id.clone(),
            group_id: self.group_id.clone(),
            origin,
            depth,
            received_at: Utc::now(),
            source_name: String::new(),
            line: 0,
            cost: Duration::ZERO,
            locals: HashMap::new(),
            ancestors,
            callbacks,
        }
    }

    /// Nested synchronous invocation one level deeper, charged to the same event.
    pub fn callback(&self, trigger: &str) -> Self {
        self.derived(trigger, Origin::Callback)
    }

    /// Scheduled re-evaluation. Runs as a new event: depth, chain, and budget restart.
    pub fn deferred(&self, trigger: &str) -> Self {
        self.derived(trigger, Origin::Deferred)
    }

    /// Context for rendering one match: match metadata filled in, fresh local scope.
    pub fn for_match(&self, found: &Match) -> Self {
        Self {
            invocation_id: self.invocation_id.clone(),
            trigger: self.trigger.clone(),
            sender_id: self.sender_id.clone(),
            group_id: self.group_id.clone(),
            origin: self.origin,
            depth: self.depth,
            received_at: self.received_at,
            source_name: found.source.name().to_string(),
            line: found.entry.line,
            cost: found.cost,
            locals: HashMap::new(),
            ancestors: self.ancestors.clone(),
            callbacks: Arc::clone(&self.callbacks),
        }
    }

    /// Whether resolving `trigger` here would re-enter a trigger already on the chain.
    pub fn is_cycle(&self, trigger: &str) -> bool {
        self.trigger == trigger || self.ancestors.iter().any(|t| t == trigger)
    }

    /// Charge one callback to the event and return the running total.
    pub fn spend_callback(&self) -> usize {
        self.callbacks.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn callbacks_spent(&self) -> usize {
        self.callbacks.load(Ordering::Relaxed)
    }

    pub fn is_internal(&self) -> bool {
        self.origin != Origin::External
    }

    pub fn set_local(&mut self, key: String, value: String) {
        self.locals.insert(key, value);
    }

    pub fn get_local(&self, key: &str) -> Option<&String> {
        self.locals.get(key)
    }

    pub fn locals(&self) -> &HashMap<String, String> {
        &self.locals
    }

    pub fn cost_ms(&self) -> f64 {
        self.cost.as_secs_f64() * 1000.0
    }
}
