//! Signal router.
//!
//! Owns every signal subscription on one connection, grouped by
//! [`SignalKey`].  Transport delivery is reference-counted per key: the first
//! subscriber on a key triggers registration with the bus, and the last one
//! to leave releases it.
//!
//! ```text
//!            subscribe (first)            Subscribed(Ok)
//!  (absent) ─────────────────▶ Pending ─────────────────▶ Active
//!      ▲                         │ Subscribed(Err) /          │ last unsubscribe /
//!      │                         │ all waiters cancelled      │ stream ended
//!      └─────────────────────────┴────────────────────────────┘
//! ```
//!
//! Subscribers that arrive while a key is `Pending` wait for the same
//! registration outcome.  Every registration attempt carries a
//! [`Generation`]; transport results for any other generation than the one
//! stored for the key are stale and never touch its subscribers.

use std::collections::HashMap;

use dbus_ws_core::{DBusValue, ErrorType, OutputMessage, RequestId, SignalKey, SubscriptionKey};
use thiserror::Error;

use super::transport::{Generation, TransportError};
use crate::domain::Subscription;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyState {
    /// Registration with the transport is in flight.
    Pending,
    /// Signals for the key are being delivered.
    Active,
}

#[derive(Debug)]
struct KeyEntry {
    generation: Generation,
    state: KeyState,
    subscriptions: Vec<Subscription>,
}

/// What the caller must do after [`SignalRouter::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// Delivery is already live; acknowledge now.
    Active,
    /// First subscriber on the key; ask the transport to start delivery
    /// under this generation.
    RegisterWithTransport(Generation),
    /// Registration is in flight; the reply comes with its outcome.
    AwaitingRegistration,
}

/// Result of a transport registration attempt.
#[derive(Debug, Default, PartialEq)]
pub struct RegistrationOutcome {
    /// `Success` or `Error` for every subscriber that was waiting.
    pub replies: Vec<OutputMessage>,
    /// Request ids answered by `replies`.
    pub completed: Vec<RequestId>,
    /// Delivery came up for a key nobody wants any more; release it.
    pub release: bool,
    /// The result belongs to an attempt that is no longer current.
    pub stale: bool,
}

/// Result of a successful [`SignalRouter::unsubscribe`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Unsubscribed {
    /// Subscribe requests that were still waiting and are now cancelled.
    pub cancelled: Vec<RequestId>,
    /// The key has no subscribers left; release this generation's delivery.
    pub release: Option<Generation>,
}

/// Subscriptions dropped because their signal stream ended.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StreamEnded {
    pub active: Vec<Subscription>,
    pub waiting: Vec<Subscription>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("no subscription matches {}", .0.key)]
    NotSubscribed(SubscriptionKey),
}

#[derive(Debug, Default)]
pub struct SignalRouter {
    entries: HashMap<SignalKey, KeyEntry>,
    next_generation: u64,
}

impl SignalRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscription.  An active subscription with identical filters
    /// is replaced rather than duplicated.
    pub fn subscribe(&mut self, request_id: RequestId, key: SubscriptionKey) -> SubscribeOutcome {
        let subscription = Subscription::new(request_id, key);
        match self.entries.get_mut(subscription.signal_key()) {
            None => {
                self.next_generation += 1;
                let generation = Generation(self.next_generation);
                self.entries.insert(
                    subscription.signal_key().clone(),
                    KeyEntry {
                        generation,
                        state: KeyState::Pending,
                        subscriptions: vec![subscription],
                    },
                );
                SubscribeOutcome::RegisterWithTransport(generation)
            }
            Some(entry) if entry.state == KeyState::Pending => {
                entry.subscriptions.push(subscription);
                SubscribeOutcome::AwaitingRegistration
            }
            Some(entry) => {
                upsert(&mut entry.subscriptions, subscription);
                SubscribeOutcome::Active
            }
        }
    }

    /// Applies the transport's answer to registration attempt `generation`.
    pub fn registration_completed(
        &mut self,
        key: &SignalKey,
        generation: Generation,
        result: Result<(), TransportError>,
    ) -> RegistrationOutcome {
        let mut outcome = RegistrationOutcome::default();

        let current = self
            .entries
            .get(key)
            .is_some_and(|entry| entry.generation == generation);
        if !current {
            // A superseded attempt was already stopped when its successor
            // started; only delivery left behind for an abandoned key needs
            // releasing.
            outcome.stale = true;
            outcome.release = result.is_ok() && !self.entries.contains_key(key);
            return outcome;
        }

        let Some(entry) = self.entries.remove(key) else {
            return outcome;
        };
        match (entry.state, result) {
            (KeyState::Pending, Ok(())) => {
                let mut subscriptions = Vec::with_capacity(entry.subscriptions.len());
                for waiter in entry.subscriptions {
                    outcome.completed.push(waiter.request_id);
                    outcome.replies.push(OutputMessage::Success {
                        request_id: waiter.request_id,
                    });
                    upsert(&mut subscriptions, waiter);
                }
                self.entries.insert(
                    key.clone(),
                    KeyEntry {
                        generation,
                        state: KeyState::Active,
                        subscriptions,
                    },
                );
            }
            (KeyState::Pending, Err(err)) => {
                for waiter in entry.subscriptions {
                    outcome.completed.push(waiter.request_id);
                    outcome.replies.push(OutputMessage::error(
                        Some(waiter.request_id),
                        ErrorType::ServerError,
                        err.to_string(),
                    ));
                }
            }
            (KeyState::Active, _) => {
                outcome.stale = true;
                self.entries.insert(key.clone(), entry);
            }
        }

        outcome
    }

    /// Removes the subscription whose key and filters both match.
    ///
    /// # Errors
    ///
    /// [`RouterError::NotSubscribed`] when nothing matches.
    pub fn unsubscribe(&mut self, key: &SubscriptionKey) -> Result<Unsubscribed, RouterError> {
        let not_subscribed = || RouterError::NotSubscribed(key.clone());
        let entry = self.entries.get_mut(&key.key).ok_or_else(not_subscribed)?;

        let (removed, kept): (Vec<_>, Vec<_>) = entry
            .subscriptions
            .drain(..)
            .partition(|sub| sub.same_filters(key));
        entry.subscriptions = kept;
        if removed.is_empty() {
            return Err(not_subscribed());
        }

        let mut result = Unsubscribed::default();
        if entry.state == KeyState::Pending {
            result.cancelled = removed.into_iter().map(|sub| sub.request_id).collect();
        }
        if entry.subscriptions.is_empty() {
            // A pending registration is released when its late result arrives.
            if entry.state == KeyState::Active {
                result.release = Some(entry.generation);
            }
            self.entries.remove(&key.key);
        }
        Ok(result)
    }

    /// Builds one `Signal` message per subscription on `key` whose filters
    /// accept `args`.
    pub fn on_signal(
        &self,
        key: &SignalKey,
        generation: Generation,
        args: &[DBusValue],
    ) -> Vec<OutputMessage> {
        let Some(entry) = self.entries.get(key) else {
            return Vec::new();
        };
        if entry.state != KeyState::Active || entry.generation != generation {
            return Vec::new();
        }
        entry
            .subscriptions
            .iter()
            .filter(|sub| sub.matches(args))
            .map(|sub| OutputMessage::Signal {
                key: sub.key.clone(),
                args: args.to_vec(),
            })
            .collect()
    }

    /// Drops every subscription on a key whose delivery has stopped.  An end
    /// reported by an older generation leaves the key alone.
    pub fn on_stream_ended(&mut self, key: &SignalKey, generation: Generation) -> StreamEnded {
        let current = self
            .entries
            .get(key)
            .is_some_and(|entry| entry.generation == generation);
        if !current {
            return StreamEnded::default();
        }
        match self.entries.remove(key) {
            Some(KeyEntry {
                state: KeyState::Active,
                subscriptions,
                ..
            }) => StreamEnded {
                active: subscriptions,
                waiting: Vec::new(),
            },
            Some(KeyEntry { subscriptions, .. }) => StreamEnded {
                active: Vec::new(),
                waiting: subscriptions,
            },
            None => StreamEnded::default(),
        }
    }

    /// Number of live or waiting subscriptions on `key`.
    pub fn subscription_count(&self, key: &SignalKey) -> usize {
        self.entries
            .get(key)
            .map_or(0, |entry| entry.subscriptions.len())
    }

    pub fn is_active(&self, key: &SignalKey) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.state == KeyState::Active)
    }

    /// Forgets every subscription and returns the keys whose delivery must
    /// be released, with the generation registered for each.
    pub fn clear(&mut self) -> Vec<(SignalKey, Generation)> {
        self.entries
            .drain()
            .map(|(key, entry)| (key, entry.generation))
            .collect()
    }
}

fn upsert(subscriptions: &mut Vec<Subscription>, subscription: Subscription) {
    match subscriptions
        .iter_mut()
        .find(|existing| existing.same_filters(&subscription.key))
    {
        Some(existing) => *existing = subscription,
        None => subscriptions.push(subscription),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use dbus_ws_core::{ArgFilter, BusName, InterfaceName, MemberName, ObjectPath};

    const FIRST: Generation = Generation(1);

    fn signal_key() -> SignalKey {
        SignalKey {
            destination: BusName::new("org.freedesktop.DBus").unwrap(),
            path: ObjectPath::new("/org/freedesktop/DBus").unwrap(),
            interface: InterfaceName::new("org.freedesktop.DBus").unwrap(),
            member: MemberName::new("NameOwnerChanged").unwrap(),
        }
    }

    fn sub(filters: Vec<ArgFilter>) -> SubscriptionKey {
        SubscriptionKey::new(signal_key(), filters)
    }

    fn active_router(subs: &[(RequestId, Vec<ArgFilter>)]) -> SignalRouter {
        let mut router = SignalRouter::new();
        for (id, filters) in subs {
            router.subscribe(*id, sub(filters.clone()));
        }
        router.registration_completed(&signal_key(), FIRST, Ok(()));
        router
    }

    #[test]
    fn test_first_subscriber_registers_with_transport() {
        let mut router = SignalRouter::new();
        assert_eq!(router.subscribe(1, sub(vec![])), SubscribeOutcome::RegisterWithTransport(FIRST));
        assert!(!router.is_active(&signal_key()));
    }

    #[test]
    fn test_second_subscriber_waits_for_same_registration() {
        let mut router = SignalRouter::new();
        router.subscribe(1, sub(vec![]));

        let outcome = router.subscribe(2, sub(vec![ArgFilter::new(0, "a")]));

        assert_eq!(outcome, SubscribeOutcome::AwaitingRegistration);
    }

    #[test]
    fn test_registration_success_acknowledges_all_waiters() {
        let mut router = SignalRouter::new();
        router.subscribe(1, sub(vec![]));
        router.subscribe(2, sub(vec![ArgFilter::new(0, "a")]));

        let outcome = router.registration_completed(&signal_key(), FIRST, Ok(()));

        assert_eq!(outcome.completed, vec![1, 2]);
        assert_eq!(
            outcome.replies,
            vec![
                OutputMessage::Success { request_id: 1 },
                OutputMessage::Success { request_id: 2 }
            ]
        );
        assert!(!outcome.release);
        assert!(router.is_active(&signal_key()));
    }

    #[test]
    fn test_registration_failure_reports_server_error() {
        let mut router = SignalRouter::new();
        router.subscribe(1, sub(vec![]));

        let outcome =
            router.registration_completed(&signal_key(), FIRST, Err(TransportError("denied".into())));

        let OutputMessage::Error { error_type, .. } = &outcome.replies[0] else {
            panic!("expected an Error reply");
        };
        assert_eq!(*error_type, ErrorType::ServerError);
        assert_eq!(router.subscription_count(&signal_key()), 0);
    }

    #[test]
    fn test_subscribe_to_active_key_is_immediate() {
        let mut router = active_router(&[(1, vec![])]);
        assert_eq!(router.subscribe(2, sub(vec![ArgFilter::new(0, "x")])), SubscribeOutcome::Active);
        assert_eq!(router.subscription_count(&signal_key()), 2);
    }

    #[test]
    fn test_identical_resubscribe_replaces_instead_of_duplicating() {
        let mut router = active_router(&[(1, vec![ArgFilter::new(0, "a")])]);

        router.subscribe(5, sub(vec![ArgFilter::new(0, "a")]));
        let signals = router.on_signal(&signal_key(), FIRST, &[DBusValue::string("a")]);

        assert_eq!(router.subscription_count(&signal_key()), 1);
        assert_eq!(signals.len(), 1);
    }

    #[test]
    fn test_filtered_and_unfiltered_subscribers_fire_independently() {
        let router = active_router(&[(1, vec![ArgFilter::new(0, "a")]), (2, vec![])]);

        let on_a = router.on_signal(&signal_key(), FIRST, &[DBusValue::string("a")]);
        let on_b = router.on_signal(&signal_key(), FIRST, &[DBusValue::string("b")]);

        assert_eq!(on_a.len(), 2);
        assert_eq!(on_b.len(), 1);
        let OutputMessage::Signal { key, .. } = &on_b[0] else {
            panic!("expected a Signal");
        };
        assert!(key.filters.is_empty());
    }

    #[test]
    fn test_signal_key_echoes_subscription_filters() {
        let router = active_router(&[(1, vec![ArgFilter::new(0, "a")])]);
        let signals = router.on_signal(&signal_key(), FIRST, &[DBusValue::string("a")]);
        let OutputMessage::Signal { key, args } = &signals[0] else {
            panic!("expected a Signal");
        };
        assert_eq!(key.filters, vec![ArgFilter::new(0, "a")]);
        assert_eq!(args, &vec![DBusValue::string("a")]);
    }

    #[test]
    fn test_no_signals_before_registration_completes() {
        let mut router = SignalRouter::new();
        router.subscribe(1, sub(vec![]));
        assert!(router.on_signal(&signal_key(), FIRST, &[]).is_empty());
    }

    #[test]
    fn test_unsubscribe_last_subscriber_releases_key() {
        let mut router = active_router(&[(1, vec![])]);

        let result = router.unsubscribe(&sub(vec![])).unwrap();

        assert_eq!(result.release, Some(FIRST));
        assert!(result.cancelled.is_empty());
        assert_eq!(router.subscription_count(&signal_key()), 0);
    }

    #[test]
    fn test_unsubscribe_keeps_key_while_others_remain() {
        let mut router = active_router(&[(1, vec![]), (2, vec![ArgFilter::new(0, "a")])]);

        let result = router.unsubscribe(&sub(vec![])).unwrap();

        assert_eq!(result.release, None);
        assert!(router.is_active(&signal_key()));
    }

    #[test]
    fn test_unsubscribe_requires_matching_filters() {
        let mut router = active_router(&[(1, vec![ArgFilter::new(0, "a")])]);
        let err = router.unsubscribe(&sub(vec![])).unwrap_err();
        assert!(matches!(err, RouterError::NotSubscribed(_)));
    }

    #[test]
    fn test_unsubscribe_without_subscription_fails() {
        let mut router = SignalRouter::new();
        assert!(router.unsubscribe(&sub(vec![])).is_err());
    }

    #[test]
    fn test_unsubscribe_cancels_waiting_subscription() {
        let mut router = SignalRouter::new();
        router.subscribe(1, sub(vec![]));

        let result = router.unsubscribe(&sub(vec![])).unwrap();

        assert_eq!(result.cancelled, vec![1]);
        assert_eq!(result.release, None);
        assert_eq!(router.subscription_count(&signal_key()), 0);
    }

    #[test]
    fn test_late_registration_for_cancelled_key_is_released() {
        let mut router = SignalRouter::new();
        router.subscribe(1, sub(vec![]));
        router.unsubscribe(&sub(vec![])).unwrap();

        let outcome = router.registration_completed(&signal_key(), FIRST, Ok(()));

        assert!(outcome.release);
        assert!(outcome.replies.is_empty());
    }

    #[test]
    fn test_stream_end_drops_all_subscriptions() {
        let mut router = active_router(&[(1, vec![]), (2, vec![ArgFilter::new(1, "x")])]);

        let ended = router.on_stream_ended(&signal_key(), FIRST);

        assert_eq!(ended.active.len(), 2);
        assert!(ended.waiting.is_empty());
        assert_eq!(router.subscription_count(&signal_key()), 0);
    }

    #[test]
    fn test_resubscribed_key_gets_a_new_generation() {
        let mut router = SignalRouter::new();
        router.subscribe(1, sub(vec![]));
        router.unsubscribe(&sub(vec![])).unwrap();

        let outcome = router.subscribe(3, sub(vec![]));

        assert_eq!(outcome, SubscribeOutcome::RegisterWithTransport(Generation(2)));
    }

    #[test]
    fn test_superseded_registration_does_not_answer_new_waiters() {
        let mut router = SignalRouter::new();
        router.subscribe(1, sub(vec![]));
        router.unsubscribe(&sub(vec![])).unwrap();
        router.subscribe(3, sub(vec![]));

        let stale = router.registration_completed(&signal_key(), FIRST, Ok(()));
        assert!(stale.stale);
        assert!(!stale.release);
        assert!(stale.replies.is_empty());
        assert!(!router.is_active(&signal_key()));

        let current = router.registration_completed(
            &signal_key(),
            Generation(2),
            Err(TransportError("AccessDenied".into())),
        );
        assert_eq!(current.completed, vec![3]);
        let OutputMessage::Error { error_type, .. } = &current.replies[0] else {
            panic!("expected an Error reply");
        };
        assert_eq!(*error_type, ErrorType::ServerError);
    }

    #[test]
    fn test_signal_from_other_generation_is_ignored() {
        let router = active_router(&[(1, vec![])]);
        assert!(router
            .on_signal(&signal_key(), Generation(9), &[DBusValue::string("a")])
            .is_empty());
    }

    #[test]
    fn test_stream_end_from_other_generation_keeps_subscriptions() {
        let mut router = active_router(&[(1, vec![])]);

        let ended = router.on_stream_ended(&signal_key(), Generation(9));

        assert_eq!(ended, StreamEnded::default());
        assert!(router.is_active(&signal_key()));
    }

    #[test]
    fn test_clear_returns_every_key() {
        let mut router = active_router(&[(1, vec![])]);
        assert_eq!(router.clear(), vec![(signal_key(), FIRST)]);
        assert_eq!(router.subscription_count(&signal_key()), 0);
    }
}
