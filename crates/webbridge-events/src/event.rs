use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::warn;

/// Process-wide so a handle from one event never matches another event's subscriber.
static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(1);

/// Handle returned by `subscribe`, used to remove that subscription later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

impl Subscription {
    fn next() -> Self {
        Self(NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub_{}", self.0)
    }
}

/// What happened when one subscriber was offered a value.
enum Delivery {
    Delivered,
    OwnerGone,
    Failed(anyhow::Error),
}

type Handler<T> = Box<dyn Fn(&T) -> Delivery + Send + Sync>;

struct Subscriber<T> {
    id: Subscription,
    handler: Handler<T>,
}

/// Tally of one `raise` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RaiseReport {
    /// Callbacks that ran to completion.
    pub delivered: usize,
    /// Subscriptions whose owner had already been dropped.
    pub stale: usize,
    /// Callbacks that returned an error or panicked.
    pub failed: usize,
}

impl RaiseReport {
    pub fn invoked(&self) -> usize {
        self.delivered + self.failed
    }
}

/// A typed single-topic publish/subscribe cell.
///
/// Subscribers are invoked synchronously, on the raising thread, in the
/// order they subscribed. Cloning an `Event` yields another handle to the
/// same subscriber list.
pub struct Event<T> {
    inner: Arc<Mutex<Vec<Arc<Subscriber<T>>>>>,
}

impl<T: 'static> Event<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Subscribe on behalf of `owner`. Only a weak reference to the owner is
    /// kept; once it is dropped the subscription is skipped on raise.
    pub fn subscribe<O, F>(&self, owner: &Arc<O>, handler: F) -> Subscription
    where
        O: Send + Sync + 'static,
        F: Fn(&O, &T) + Send + Sync + 'static,
    {
        let owner: Weak<O> = Arc::downgrade(owner);
        self.push(Box::new(move |value| match owner.upgrade() {
            Some(owner) => {
                handler(&owner, value);
                Delivery::Delivered
            }
            None => Delivery::OwnerGone,
        }))
    }

    /// Like [`subscribe`](Self::subscribe), for handlers that can fail. Errors
    /// are reported and never reach the raiser.
    pub fn try_subscribe<O, F>(&self, owner: &Arc<O>, handler: F) -> Subscription
    where
        O: Send + Sync + 'static,
        F: Fn(&O, &T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let owner: Weak<O> = Arc::downgrade(owner);
        self.push(Box::new(move |value| match owner.upgrade() {
            Some(owner) => match handler(&owner, value) {
                Ok(()) => Delivery::Delivered,
                Err(e) => Delivery::Failed(e),
            },
            None => Delivery::OwnerGone,
        }))
    }

    /// Subscribe a free-standing callback with no owner. It stays live until
    /// unsubscribed.
    pub fn subscribe_fn<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.push(Box::new(move |value| {
            handler(value);
            Delivery::Delivered
        }))
    }

    fn push(&self, handler: Handler<T>) -> Subscription {
        let id = Subscription::next();
        self.inner.lock().push(Arc::new(Subscriber { id, handler }));
        id
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut subs = self.inner.lock();
        let before = subs.len();
        subs.retain(|s| s.id != subscription);
        subs.len() != before
    }

    /// Deliver `value` to every live subscriber in subscription order.
    ///
    /// The subscriber list is snapshotted first: callbacks may subscribe or
    /// unsubscribe freely, and those changes apply from the next raise.
    pub fn raise(&self, value: &T) -> RaiseReport {
        let snapshot: Vec<Arc<Subscriber<T>>> = self.inner.lock().clone();
        let mut report = RaiseReport::default();

        for sub in &snapshot {
            match catch_unwind(AssertUnwindSafe(|| (sub.handler)(value))) {
                Ok(Delivery::Delivered) => report.delivered += 1,
                Ok(Delivery::OwnerGone) => report.stale += 1,
                Ok(Delivery::Failed(e)) => {
                    warn!(subscription = %sub.id, error = %e, "event subscriber failed");
                    report.failed += 1;
                }
                Err(panic) => {
                    warn!(
                        subscription = %sub.id,
                        panic = panic_message(&*panic),
                        "event subscriber panicked"
                    );
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Number of subscriptions, including ones whose owner is gone.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().len()
    }
}

impl<T: 'static> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("subscribers", &self.inner.lock().len())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
