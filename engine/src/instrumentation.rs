//! Publish/subscribe instrumentation of store operations.
//!
//! Subscribers register for an operation name (`store.operation.find`) or a
//! prefix pattern (`store.operation.*`) and receive `before` and `after`
//! callbacks. Both callbacks of one invocation see the same
//! [`InstrumentationContext::operation_id`].

use crate::Timestamp;
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Operation name used for `Store::find`.
pub const FIND_OPERATION: &str = "store.operation.find";

/// Per-invocation data handed to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentationContext {
    /// Correlation id shared by the before/after pair
    pub operation_id: Uuid,
    pub payload: Value,
}

type Callback = Box<dyn Fn(&str, Timestamp, &InstrumentationContext)>;

/// A pair of optional callbacks.
#[derive(Default)]
pub struct Subscriber {
    before: Option<Callback>,
    after: Option<Callback>,
}

impl Subscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, Timestamp, &InstrumentationContext) + 'static,
    {
        self.before = Some(Box::new(callback));
        self
    }

    pub fn after<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, Timestamp, &InstrumentationContext) + 'static,
    {
        self.after = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .finish()
    }
}

/// Handle returned by [`Instrumentation::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

/// An instrumented operation between `begin` and `finish`.
#[derive(Debug)]
#[must_use = "an instrumented operation must be finished"]
pub struct ActiveOperation {
    name: String,
    context: InstrumentationContext,
}

impl ActiveOperation {
    pub fn operation_id(&self) -> Uuid {
        self.context.operation_id
    }
}

#[derive(Debug)]
struct Subscription {
    handle: SubscriptionHandle,
    pattern: String,
    subscriber: Subscriber,
}

impl Subscription {
    fn matches(&self, name: &str) -> bool {
        match self.pattern.strip_suffix('*') {
            Some(prefix) => name.starts_with(prefix),
            None => self.pattern == name,
        }
    }
}

/// Registry of instrumentation subscribers, owned by its store.
#[derive(Debug, Default)]
pub struct Instrumentation {
    subscriptions: Vec<Subscription>,
    next_handle: u64,
}

impl Instrumentation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to an operation name or `prefix*` pattern.
    pub fn subscribe(
        &mut self,
        pattern: impl Into<String>,
        subscriber: Subscriber,
    ) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.next_handle);
        self.next_handle += 1;
        self.subscriptions.push(Subscription {
            handle,
            pattern: pattern.into(),
            subscriber,
        });
        handle
    }

    /// Remove a subscription. Returns true if it existed.
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.handle != handle);
        self.subscriptions.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Start an operation, calling matching `before` callbacks.
    pub fn begin(&self, name: &str, timestamp: Timestamp, payload: Value) -> ActiveOperation {
        let context = InstrumentationContext {
            operation_id: Uuid::new_v4(),
            payload,
        };
        for subscription in self.subscriptions.iter().filter(|s| s.matches(name)) {
            if let Some(before) = &subscription.subscriber.before {
                before(name, timestamp, &context);
            }
        }
        ActiveOperation {
            name: name.to_string(),
            context,
        }
    }

    /// Finish an operation, calling matching `after` callbacks.
    pub fn finish(&self, operation: ActiveOperation, timestamp: Timestamp) {
        let ActiveOperation { name, context } = operation;
        for subscription in self.subscriptions.iter().filter(|s| s.matches(&name)) {
            if let Some(after) = &subscription.subscriber.after {
                after(&name, timestamp, &context);
            }
        }
    }
}
