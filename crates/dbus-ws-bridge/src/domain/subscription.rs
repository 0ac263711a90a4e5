//! Signal subscription record.

use dbus_ws_core::{DBusValue, RequestId, SignalKey, SubscriptionKey};

/// One client subscription: a signal key, its argument filters, and the
/// `requestId` of the `SubscribeSignal` that created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub request_id: RequestId,
    pub key: SubscriptionKey,
}

impl Subscription {
    pub fn new(request_id: RequestId, key: SubscriptionKey) -> Self {
        Self { request_id, key }
    }

    pub fn signal_key(&self) -> &SignalKey {
        &self.key.key
    }

    /// Whether this subscription has the same filters as `key` (same signal
    /// key assumed).
    pub fn same_filters(&self, key: &SubscriptionKey) -> bool {
        self.key.filters == key.filters
    }

    /// Whether a signal with `args` should be delivered to this subscriber.
    pub fn matches(&self, args: &[DBusValue]) -> bool {
        self.key.matches(args)
    }
}
