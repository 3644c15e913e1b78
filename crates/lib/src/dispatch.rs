//! Event dispatcher: typed dispatch table from event key to listener list.
//!
//! Listeners are notified synchronously, in registration order, for the exact
//! key they registered on. A failing listener is logged and never prevents
//! delivery to the listeners after it. One-shot listeners self-unregister
//! before they run, so they fire at most once even under concurrent emits.

use crate::events::{EventKey, MessagingEvent};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Classification metadata passed to every listener. `captured` is reserved
/// for conversation-interception logic and is always false today.
#[derive(Debug, Clone, Default)]
pub struct EventMeta {
    pub captured: bool,
}

/// Listener callback. Errors are isolated per listener and logged.
pub type Listener = Arc<dyn Fn(&MessagingEvent, &EventMeta) -> Result<(), String> + Send + Sync>;

/// Token returned from registration; pass to [`Dispatcher::off`] to remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerToken(Uuid);

struct Registration {
    token: ListenerToken,
    once: bool,
    listener: Listener,
}

/// Dispatch table mapping event keys to ordered listener lists.
pub struct Dispatcher {
    table: RwLock<HashMap<EventKey, Vec<Registration>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(HashMap::new()),
        }
    }

    fn register(&self, key: EventKey, listener: Listener, once: bool) -> ListenerToken {
        let token = ListenerToken(Uuid::new_v4());
        let mut table = self.table.write().expect("dispatch table poisoned");
        table.entry(key).or_default().push(Registration {
            token,
            once,
            listener,
        });
        token
    }

    /// Register a listener for every event matching `key`, in registration order.
    pub fn on(&self, key: EventKey, listener: Listener) -> ListenerToken {
        self.register(key, listener, false)
    }

    /// Register a listener that fires exactly once, then self-unregisters.
    pub fn once(&self, key: EventKey, listener: Listener) -> ListenerToken {
        self.register(key, listener, true)
    }

    /// Remove a previously registered listener. Unknown tokens are a no-op.
    pub fn off(&self, key: &EventKey, token: ListenerToken) {
        let mut table = self.table.write().expect("dispatch table poisoned");
        if let Some(list) = table.get_mut(key) {
            list.retain(|r| r.token != token);
            if list.is_empty() {
                table.remove(key);
            }
        }
    }

    /// Number of listeners currently registered for a key.
    pub fn listener_count(&self, key: &EventKey) -> usize {
        let table = self.table.read().expect("dispatch table poisoned");
        table.get(key).map(|l| l.len()).unwrap_or(0)
    }

    /// Notify every listener registered for `key` with the event and metadata.
    /// One-shot listeners are removed from the table before invocation. Returns
    /// the number of listeners notified.
    pub fn emit(&self, key: &EventKey, event: &MessagingEvent, meta: &EventMeta) -> usize {
        let to_run: Vec<Listener> = {
            let mut table = self.table.write().expect("dispatch table poisoned");
            match table.get_mut(key) {
                None => Vec::new(),
                Some(list) => {
                    let snapshot = list.iter().map(|r| Arc::clone(&r.listener)).collect();
                    list.retain(|r| !r.once);
                    if list.is_empty() {
                        table.remove(key);
                    }
                    snapshot
                }
            }
        };
        for listener in &to_run {
            if let Err(e) = listener(event, meta) {
                log::warn!("listener for {:?} failed: {}", key, e);
            }
        }
        to_run.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, Party};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn event() -> MessagingEvent {
        MessagingEvent {
            sender: Party {
                id: "user-1".to_string(),
            },
            recipient: Party {
                id: "page-1".to_string(),
            },
            timestamp: None,
            message: None,
            postback: None,
            optin: None,
            delivery: None,
            read: None,
            account_linking: None,
        }
    }

    fn counting_listener(counter: Arc<AtomicUsize>) -> Listener {
        Arc::new(move |_event, _meta| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let dispatcher = Dispatcher::new();
        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second", "third"] {
            let order = order.clone();
            dispatcher.on(
                EventKey::kind(EventKind::Message),
                Arc::new(move |_e, _m| {
                    order.lock().unwrap().push(name);
                    Ok(())
                }),
            );
        }
        let notified = dispatcher.emit(
            &EventKey::kind(EventKind::Message),
            &event(),
            &EventMeta::default(),
        );
        assert_eq!(notified, 3);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn failing_listener_does_not_block_later_ones() {
        let dispatcher = Dispatcher::new();
        let counter = Arc::new(AtomicUsize::new(0));
        dispatcher.on(
            EventKey::kind(EventKind::Message),
            Arc::new(|_e, _m| Err("boom".to_string())),
        );
        dispatcher.on(
            EventKey::kind(EventKind::Message),
            counting_listener(counter.clone()),
        );
        dispatcher.emit(
            &EventKey::kind(EventKind::Message),
            &event(),
            &EventMeta::default(),
        );
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn once_listener_fires_exactly_once() {
        let dispatcher = Dispatcher::new();
        let counter = Arc::new(AtomicUsize::new(0));
        dispatcher.once(
            EventKey::kind(EventKind::Delivery),
            counting_listener(counter.clone()),
        );
        let key = EventKey::kind(EventKind::Delivery);
        dispatcher.emit(&key, &event(), &EventMeta::default());
        dispatcher.emit(&key, &event(), &EventMeta::default());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.listener_count(&key), 0);
    }

    #[test]
    fn scoped_keys_do_not_receive_generic_emits() {
        let dispatcher = Dispatcher::new();
        let counter = Arc::new(AtomicUsize::new(0));
        dispatcher.on(
            EventKey::scoped(EventKind::Postback, "PARLEY_BUTTON_YES"),
            counting_listener(counter.clone()),
        );
        dispatcher.emit(
            &EventKey::kind(EventKind::Postback),
            &event(),
            &EventMeta::default(),
        );
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        dispatcher.emit(
            &EventKey::scoped(EventKind::Postback, "PARLEY_BUTTON_YES"),
            &event(),
            &EventMeta::default(),
        );
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn off_removes_listener() {
        let dispatcher = Dispatcher::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let key = EventKey::kind(EventKind::Read);
        let token = dispatcher.on(key.clone(), counting_listener(counter.clone()));
        dispatcher.off(&key, token);
        dispatcher.emit(&key, &event(), &EventMeta::default());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
