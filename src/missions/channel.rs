//! Typed publish/subscribe channels for collaborator notifications.
//!
//! Every observable service event (a chat message, a failed login, a syslog
//! entry) is an [`EventChannel`] of a fixed payload type. Listeners are plain
//! closures registered with [`EventChannel::add_listener`] and removed by the
//! returned [`ListenerId`].
//!
//! Delivery rules:
//! - the listener list is snapshotted before delivery, so a listener may remove
//!   itself (or any other listener) while being notified;
//! - a listener returning `Err` or panicking is logged and skipped, the rest of
//!   the listeners are still notified.
//!
//! Triggers do not know payload types. They subscribe through [`DynChannel`],
//! which flattens a payload into positional condition arguments via [`EmitArgs`].

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::{trace, warn};

use super::condition::Value;

/// Handle returned by `add_listener`, used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<T> = Arc<dyn Fn(&T) -> anyhow::Result<()> + Send + Sync>;

/// Listener over flattened arguments, as used by triggers.
pub type ArgsListener = Arc<dyn Fn(&[Value]) -> anyhow::Result<()> + Send + Sync>;

/// Payloads that can be observed by triggers.
pub trait EmitArgs {
    /// Positional arguments in emission order.
    fn emit_args(&self) -> Vec<Value>;
}

pub struct EventChannel<T> {
    name: &'static str,
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Listener<T>)>>,
}

impl<T> EventChannel<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(listener)));
        trace!("[{}] listener {:?} added", self.name, id);
        id
    }

    /// Returns false when the id was not registered (already removed).
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        let removed = listeners.len() != before;
        if removed {
            trace!("[{}] listener {:?} removed", self.name, id);
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    /// Notify every listener registered at the time of the call.
    pub fn invoke(&self, payload: &T) {
        let snapshot: Vec<(ListenerId, Listener<T>)> = self.lock().clone();
        for (id, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(payload))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("[{}] listener {:?} failed: {}", self.name, id, e),
                Err(_) => warn!("[{}] listener {:?} panicked", self.name, id),
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, Listener<T>)>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Type-erased view of a channel for trigger subscriptions.
pub trait DynChannel: Send + Sync {
    fn channel_name(&self) -> &str;
    fn subscribe_args(&self, listener: ArgsListener) -> ListenerId;
    fn unsubscribe(&self, id: ListenerId) -> bool;
}

impl<T> DynChannel for EventChannel<T>
where
    T: EmitArgs + Send + Sync + 'static,
{
    fn channel_name(&self) -> &str {
        self.name
    }

    fn subscribe_args(&self, listener: ArgsListener) -> ListenerId {
        self.add_listener(move |payload: &T| listener(&payload.emit_args()))
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.remove_listener(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Ping(i64);

    impl EmitArgs for Ping {
        fn emit_args(&self) -> Vec<Value> {
            vec![Value::Number(self.0)]
        }
    }

    #[test]
    fn failing_and_panicking_listeners_do_not_stop_delivery() {
        let channel = EventChannel::<Ping>::new("test");
        let seen = Arc::new(AtomicUsize::new(0));

        channel.add_listener(|_| Err(anyhow::anyhow!("boom")));
        channel.add_listener(|_| panic!("listener panic"));
        let s = seen.clone();
        channel.add_listener(move |p| {
            s.fetch_add(p.0 as usize, Ordering::SeqCst);
            Ok(())
        });

        channel.invoke(&Ping(2));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn listener_can_remove_itself_during_delivery() {
        let channel = Arc::new(EventChannel::<Ping>::new("test"));
        let calls = Arc::new(AtomicUsize::new(0));
        let own_id = Arc::new(Mutex::new(None::<ListenerId>));

        let (c, ch, slot) = (calls.clone(), channel.clone(), own_id.clone());
        let id = channel.add_listener(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *slot.lock().unwrap() {
                ch.remove_listener(id);
            }
            Ok(())
        });
        *own_id.lock().unwrap() = Some(id);

        channel.invoke(&Ping(1));
        channel.invoke(&Ping(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(channel.listener_count(), 0);
    }

    #[test]
    fn dyn_subscription_sees_flattened_args() {
        let channel = EventChannel::<Ping>::new("test");
        let got = Arc::new(Mutex::new(Vec::new()));
        let g = got.clone();
        let dynamic: &dyn DynChannel = &channel;
        let id = dynamic.subscribe_args(Arc::new(move |args: &[Value]| {
            g.lock().unwrap().extend_from_slice(args);
            Ok(())
        }));

        channel.invoke(&Ping(7));
        assert_eq!(*got.lock().unwrap(), vec![Value::Number(7)]);
        assert!(dynamic.unsubscribe(id));
        assert!(!dynamic.unsubscribe(id));
    }
}
