//! Event Dispatcher
//!
//! Fans every inbound gateway event out to the handlers registered for its name.
//!
//! Handlers for one event run in registration order, each awaited before the
//! next starts. A handler that fails (returns `Err` or panics) is logged and
//! skipped; it never stops the remaining handlers or later events.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use tracing::{debug, error};

use crate::transport::EventSink;

/// A registered event handler.
pub type EventHandler = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Maps event names to their ordered handlers.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<HashMap<String, Vec<EventHandler>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the handlers for `event`.
    ///
    /// The same handler may be added more than once; it then runs once per
    /// registration.
    pub fn add_event_listener<F, Fut>(&self, event: &str, handler: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: EventHandler = Arc::new(move |args| handler(args).boxed());
        self.add_handler(event, handler);
    }

    /// Append an already boxed handler.
    pub fn add_handler(&self, event: &str, handler: EventHandler) {
        let mut listeners = match self.listeners.write() {
            Ok(listeners) => listeners,
            Err(poisoned) => poisoned.into_inner(),
        };
        listeners.entry(event.to_string()).or_default().push(handler);

        debug!(event = %event, "Added event listener");
    }

    /// Number of handlers registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.snapshot(event).len()
    }

    fn snapshot(&self, event: &str) -> Vec<EventHandler> {
        let listeners = match self.listeners.read() {
            Ok(listeners) => listeners,
            Err(poisoned) => poisoned.into_inner(),
        };
        listeners.get(event).cloned().unwrap_or_default()
    }

    /// Run every handler registered for `event` with `args`.
    ///
    /// Iterates over the handlers registered when the call started, so a
    /// handler may register further handlers without deadlocking.
    pub async fn handle_event(&self, event: &str, args: Vec<Value>) {
        debug!(event = %event, args = ?args, "Received event");

        let handlers = self.snapshot(event);
        for handler in handlers {
            let outcome = AssertUnwindSafe(handler(args.clone())).catch_unwind().await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(
                        event = %event,
                        args = ?args,
                        error = %e,
                        "Error while handling event"
                    );
                }
                Err(panic) => {
                    error!(
                        event = %event,
                        args = ?args,
                        panic = %panic_message(panic.as_ref()),
                        "Event handler panicked"
                    );
                }
            }
        }
    }
}

#[async_trait]
impl EventSink for EventDispatcher {
    async fn handle_event(&self, event: &str, args: Vec<Value>) {
        EventDispatcher::handle_event(self, event, args).await
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    type Calls = Arc<Mutex<Vec<(String, Vec<Value>)>>>;

    fn recorder(dispatcher: &EventDispatcher, event: &str, name: &str, calls: &Calls) {
        let calls = Arc::clone(calls);
        let name = name.to_string();
        dispatcher.add_event_listener(event, move |args| {
            let calls = Arc::clone(&calls);
            let name = name.clone();
            async move {
                calls.lock().unwrap().push((name, args));
                Ok(())
            }
        });
    }

    #[tokio::test]
    async fn test_unregistered_event_is_noop() {
        let dispatcher = EventDispatcher::new();
        dispatcher.handle_event("unknown", vec![json!(1)]).await;
        assert_eq!(dispatcher.listener_count("unknown"), 0);
    }

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let dispatcher = EventDispatcher::new();
        let calls: Calls = Arc::default();
        recorder(&dispatcher, "deviceEvent", "first", &calls);
        recorder(&dispatcher, "deviceEvent", "second", &calls);
        recorder(&dispatcher, "deviceEvent", "third", &calls);
        recorder(&dispatcher, "other", "other", &calls);

        dispatcher
            .handle_event("deviceEvent", vec![json!({"id": 7}), json!("x")])
            .await;

        let calls = calls.lock().unwrap();
        let names: Vec<_> = calls.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        for (_, args) in calls.iter() {
            assert_eq!(args, &vec![json!({"id": 7}), json!("x")]);
        }
    }

    #[tokio::test]
    async fn test_duplicate_registration_runs_twice() {
        let dispatcher = EventDispatcher::new();
        let calls: Calls = Arc::default();
        recorder(&dispatcher, "ping", "same", &calls);
        recorder(&dispatcher, "ping", "same", &calls);

        dispatcher.handle_event("ping", vec![]).await;

        assert_eq!(dispatcher.listener_count("ping"), 2);
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_stop_dispatch() {
        let dispatcher = EventDispatcher::new();
        let calls: Calls = Arc::default();

        dispatcher.add_event_listener("ping", |_args| async {
            Err(anyhow::anyhow!("synthetic failure"))
        });
        recorder(&dispatcher, "ping", "after-error", &calls);
        dispatcher.add_event_listener("ping", |args| async move {
            if !args.is_empty() {
                panic!("synthetic panic");
            }
            Ok(())
        });
        recorder(&dispatcher, "ping", "after-panic", &calls);

        dispatcher.handle_event("ping", vec![json!("payload")]).await;
        // Later events are unaffected
        dispatcher.handle_event("ping", vec![json!("again")]).await;

        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                ("after-error".to_string(), vec![json!("payload")]),
                ("after-panic".to_string(), vec![json!("payload")]),
                ("after-error".to_string(), vec![json!("again")]),
                ("after-panic".to_string(), vec![json!("again")]),
            ]
        );
    }

    #[tokio::test]
    async fn test_handler_can_register_handlers() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let calls: Calls = Arc::default();

        let inner = Arc::clone(&dispatcher);
        let inner_calls = Arc::clone(&calls);
        dispatcher.add_event_listener("setup", move |_args| {
            let dispatcher = Arc::clone(&inner);
            let calls = Arc::clone(&inner_calls);
            async move {
                recorder(&dispatcher, "setup", "late", &calls);
                recorder(&dispatcher, "ready", "ready", &calls);
                Ok(())
            }
        });

        dispatcher.handle_event("setup", vec![]).await;
        // Handlers appended during a pass are not part of that pass
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(dispatcher.listener_count("setup"), 2);

        dispatcher.handle_event("ready", vec![]).await;
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(5u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
