//! Lifecycle notification bus.
//!
//! Entities announce saves, deletes, and relation mutations through a
//! [`SignalHub`]. Listeners are async closures registered on a [`Signal`],
//! optionally filtered by sender entity; dispatch runs them sequentially in
//! the emitting task, in registration order, and collects each listener's
//! return value. A signal with no matching listener costs one read-lock
//! probe and nothing else.
//!
//! Registration hands back a [`ReceiverHandle`] so a listener can be
//! deregistered again; nothing is keyed on function identity.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use asupersync::Outcome;
use restmodel_core::{Error, Record, Value, try_outcome};

/// Relation mutation phases announced on [`SignalHub::relation_changed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationAction {
    PreAdd,
    PostAdd,
    PreRemove,
    PostRemove,
    PreSet,
    PostSet,
    PreClear,
    PostClear,
}

impl RelationAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreAdd => "pre_add",
            Self::PostAdd => "post_add",
            Self::PreRemove => "pre_remove",
            Self::PostRemove => "post_remove",
            Self::PreSet => "pre_set",
            Self::PostSet => "post_set",
            Self::PreClear => "pre_clear",
            Self::PostClear => "post_clear",
        }
    }
}

/// Payload delivered to every listener.
#[derive(Debug, Clone)]
pub struct SignalEvent {
    /// Entity name (or link table name, for relation mutations) that emitted.
    pub sender: String,
    /// Snapshot of the emitting record.
    pub instance: Record,
    /// Save events: whether the save inserted a new row.
    pub created: Option<bool>,
    /// Save events: the field subset written, when one was requested.
    pub update_fields: Option<Vec<String>>,
    /// Relation mutations: which phase this is.
    pub action: Option<RelationAction>,
    /// Relation mutations: affected target keys, absent for clears.
    pub pk_set: Option<Vec<Value>>,
    /// Relation mutations: the target entity name.
    pub related: Option<String>,
}

impl SignalEvent {
    #[must_use]
    pub fn new(sender: impl Into<String>, instance: Record) -> Self {
        Self {
            sender: sender.into(),
            instance,
            created: None,
            update_fields: None,
            action: None,
            pk_set: None,
            related: None,
        }
    }

    #[must_use]
    pub fn with_created(mut self, created: bool) -> Self {
        self.created = Some(created);
        self
    }

    #[must_use]
    pub fn with_update_fields(mut self, fields: Option<Vec<String>>) -> Self {
        self.update_fields = fields;
        self
    }

    #[must_use]
    pub fn with_action(mut self, action: RelationAction) -> Self {
        self.action = Some(action);
        self
    }

    #[must_use]
    pub fn with_pk_set(mut self, pk_set: Option<Vec<Value>>) -> Self {
        self.pk_set = pk_set;
        self
    }

    #[must_use]
    pub fn with_related(mut self, related: impl Into<String>) -> Self {
        self.related = Some(related.into());
        self
    }
}

/// Boxed future returned by a listener.
pub type ListenerFuture = Pin<Box<dyn Future<Output = Outcome<Value, Error>> + Send + 'static>>;

type Listener = Arc<dyn Fn(SignalEvent) -> ListenerFuture + Send + Sync>;

/// Token identifying one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverHandle(u64);

struct Receiver {
    id: u64,
    sender: Option<String>,
    listener: Listener,
}

/// One named notification channel.
pub struct Signal {
    name: &'static str,
    receivers: RwLock<Vec<Receiver>>,
    next_id: AtomicU64,
}

impl Signal {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            receivers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Register a listener, optionally filtered to one sender name.
    pub fn connect<F, Fut>(&self, sender: Option<&str>, listener: F) -> ReceiverHandle
    where
        F: Fn(SignalEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<Value, Error>> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let erased: Listener = Arc::new(move |event| Box::pin(listener(event)) as ListenerFuture);
        let mut receivers = self
            .receivers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        receivers.push(Receiver {
            id,
            sender: sender.map(str::to_string),
            listener: erased,
        });
        tracing::debug!(signal = self.name, receiver = id, ?sender, "listener connected");
        ReceiverHandle(id)
    }

    /// Deregister a listener. Returns false when the handle is unknown.
    pub fn disconnect(&self, handle: ReceiverHandle) -> bool {
        let mut receivers = self
            .receivers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = receivers.len();
        receivers.retain(|r| r.id != handle.0);
        receivers.len() != before
    }

    /// True when at least one listener matches the sender name.
    #[must_use]
    pub fn has_listeners(&self, sender: &str) -> bool {
        let receivers = self
            .receivers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        receivers
            .iter()
            .any(|r| r.sender.as_deref().is_none_or(|s| s == sender))
    }

    /// Dispatch an event to every matching listener, sequentially and in
    /// registration order.
    ///
    /// Returns `(handle, value)` pairs for the listeners that ran. The
    /// first failing listener aborts the remainder and the error
    /// propagates to the emitter.
    pub async fn send(&self, event: SignalEvent) -> Outcome<Vec<(ReceiverHandle, Value)>, Error> {
        let matching: Vec<(u64, Listener)> = {
            let receivers = self
                .receivers
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            receivers
                .iter()
                .filter(|r| r.sender.as_deref().is_none_or(|s| s == event.sender))
                .map(|r| (r.id, Arc::clone(&r.listener)))
                .collect()
        };
        if matching.is_empty() {
            return Outcome::Ok(Vec::new());
        }
        tracing::debug!(
            signal = self.name,
            sender = %event.sender,
            receivers = matching.len(),
            "dispatching"
        );
        let mut results = Vec::with_capacity(matching.len());
        for (id, listener) in matching {
            let value = try_outcome!(listener(event.clone()).await);
            results.push((ReceiverHandle(id), value));
        }
        Outcome::Ok(results)
    }
}

/// The fixed set of lifecycle signals a store carries.
pub struct SignalHub {
    pub pre_save: Signal,
    pub post_save: Signal,
    pub pre_delete: Signal,
    pub post_delete: Signal,
    pub relation_changed: Signal,
}

impl SignalHub {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pre_save: Signal::new("pre_save"),
            post_save: Signal::new("post_save"),
            pre_delete: Signal::new("pre_delete"),
            post_delete: Signal::new("post_delete"),
            relation_changed: Signal::new("relation_changed"),
        }
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restmodel_core::{EntityMeta, FieldDef};
    use std::sync::Mutex;

    fn run<T>(future: impl Future<Output = T>) -> T {
        let rt = asupersync::runtime::RuntimeBuilder::current_thread()
            .build()
            .expect("runtime");
        rt.block_on(future)
    }

    fn event(sender: &str) -> SignalEvent {
        let meta = Arc::new(EntityMeta::new(sender).field(FieldDef::auto_pk("id")));
        SignalEvent::new(sender, Record::new(meta))
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let signal = Signal::new("post_save");
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            signal.connect(None, move |_event| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push(tag);
                    Outcome::Ok(Value::Text(tag.into()))
                }
            });
        }

        let results = run(async { signal.send(event("note")).await });
        let Outcome::Ok(results) = results else {
            panic!("send failed");
        };
        assert_eq!(results.len(), 3);
        assert_eq!(results[1].1, Value::Text("second".into()));
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn sender_filter_limits_delivery() {
        let signal = Signal::new("pre_save");
        let hits = Arc::new(Mutex::new(Vec::new()));

        for (filter, tag) in [(Some("note"), "note-only"), (Some("user"), "user-only"), (None, "all")] {
            let hits = Arc::clone(&hits);
            signal.connect(filter, move |_event| {
                let hits = Arc::clone(&hits);
                async move {
                    hits.lock().unwrap().push(tag);
                    Outcome::Ok(Value::Null)
                }
            });
        }

        assert!(signal.has_listeners("note"));
        assert!(signal.has_listeners("unfiltered-entity"));

        let results = run(async { signal.send(event("note")).await });
        assert!(matches!(results, Outcome::Ok(r) if r.len() == 2));
        assert_eq!(*hits.lock().unwrap(), vec!["note-only", "all"]);
    }

    #[test]
    fn no_matching_listener_returns_empty() {
        let signal = Signal::new("pre_delete");
        signal.connect(Some("user"), |_event| async { Outcome::Ok(Value::Null) });
        let results = run(async { signal.send(event("note")).await });
        assert!(matches!(results, Outcome::Ok(r) if r.is_empty()));
    }

    #[test]
    fn disconnect_stops_delivery() {
        let signal = Signal::new("post_delete");
        let count = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&count);
        let handle = signal.connect(None, move |_event| {
            let counter = Arc::clone(&counter);
            async move {
                *counter.lock().unwrap() += 1;
                Outcome::Ok(Value::Null)
            }
        });

        assert!(matches!(run(async { signal.send(event("note")).await }), Outcome::Ok(_)));
        assert!(signal.disconnect(handle));
        assert!(!signal.disconnect(handle));
        assert!(matches!(run(async { signal.send(event("note")).await }), Outcome::Ok(_)));
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn failing_listener_aborts_the_remainder() {
        let signal = Signal::new("post_save");
        let later_ran = Arc::new(Mutex::new(false));

        signal.connect(None, |event| async move {
            Outcome::Err(Error::Backend(format!("listener rejected {}", event.sender)))
        });
        let flag = Arc::clone(&later_ran);
        signal.connect(None, move |_event| {
            let flag = Arc::clone(&flag);
            async move {
                *flag.lock().unwrap() = true;
                Outcome::Ok(Value::Null)
            }
        });

        let outcome = run(async { signal.send(event("note")).await });
        assert!(matches!(outcome, Outcome::Err(Error::Backend(_))));
        assert!(!*later_ran.lock().unwrap());
    }
}
