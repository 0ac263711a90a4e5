//! Per-connection protocol state machine.
//!
//! A [`Session`] owns the [`Correlator`] and [`SignalRouter`] for one
//! WebSocket connection.  It performs no I/O: every input (a text frame or a
//! transport event) produces a [`Step`] listing the messages to send to the
//! client and the commands to run against the bus.  The caller executes the
//! step; the session never waits.

use dbus_ws_core::{
    decode_input_with, Decoder, ErrorType, InputMessage, MethodCall, OutputMessage, ProtocolError, RequestError,
    RequestId, SignalKey, SubscriptionKey,
};
use tracing::{debug, trace};

use super::correlator::Correlator;
use super::signal_router::{SignalRouter, SubscribeOutcome};
use super::transport::{Generation, TransportCommand, TransportError, TransportEvent};
use crate::domain::{Correlation, RequestKind};

/// Output of one session transition.
#[derive(Debug, Default, PartialEq)]
pub struct Step {
    /// Messages for the client, in send order.
    pub outbound: Vec<OutputMessage>,
    /// Work for the transport, in issue order.
    pub commands: Vec<TransportCommand>,
}

impl Step {
    fn reply(message: OutputMessage) -> Self {
        Self {
            outbound: vec![message],
            commands: Vec::new(),
        }
    }

    fn command(command: TransportCommand) -> Self {
        Self {
            outbound: Vec::new(),
            commands: vec![command],
        }
    }
}

#[derive(Debug)]
pub struct Session {
    decoder: Decoder,
    correlator: Correlator,
    router: SignalRouter,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Decoder::default())
    }
}

impl Session {
    pub fn new(decoder: Decoder) -> Self {
        Self {
            decoder,
            correlator: Correlator::new(),
            router: SignalRouter::new(),
        }
    }

    /// Handles one WebSocket text frame.  A frame that fails to decode is
    /// answered with a single `Error` and changes no state.
    pub fn handle_frame(&mut self, text: &str) -> Step {
        match decode_input_with(text, &self.decoder) {
            Ok(message) => {
                debug!(kind = message.kind(), request_id = ?message.request_id(), "frame decoded");
                self.handle_input(message)
            }
            Err(err) => {
                debug!(request_id = ?err.request_id, error = %err, "frame rejected");
                Step::reply(err.into())
            }
        }
    }

    /// Handles a binary WebSocket frame, which the protocol does not use.
    pub fn handle_binary_frame(&mut self) -> Step {
        Step::reply(
            RequestError::new(
                None,
                ProtocolError::UnsupportedFormat("binary frames are not supported".to_owned()),
            )
            .into(),
        )
    }

    pub fn handle_input(&mut self, message: InputMessage) -> Step {
        match message {
            InputMessage::CallMethod { request_id, call } => self.call_method(request_id, call),
            InputMessage::SubscribeSignal {
                request_id,
                subscription,
            } => self.subscribe(request_id, subscription),
            InputMessage::UnsubscribeSignal {
                request_id,
                subscription,
            } => self.unsubscribe(request_id, subscription),
        }
    }

    fn call_method(&mut self, request_id: Option<RequestId>, call: MethodCall) -> Step {
        match self.correlator.submit_call(request_id, call) {
            Ok(command) => Step::command(command),
            Err(err) => Step::reply(server_error(request_id, err)),
        }
    }

    fn subscribe(&mut self, request_id: RequestId, subscription: SubscriptionKey) -> Step {
        if let Err(err) = self
            .correlator
            .register(Some(request_id), RequestKind::Subscribe)
        {
            return Step::reply(server_error(Some(request_id), err));
        }

        let key = subscription.key.clone();
        match self.router.subscribe(request_id, subscription) {
            SubscribeOutcome::Active => {
                self.correlator.complete(Correlation::Client(request_id));
                Step::reply(OutputMessage::Success { request_id })
            }
            SubscribeOutcome::RegisterWithTransport(generation) => {
                debug!(%key, %generation, "registering signal delivery");
                Step::command(TransportCommand::Subscribe { key, generation })
            }
            SubscribeOutcome::AwaitingRegistration => Step::default(),
        }
    }

    fn unsubscribe(&mut self, request_id: RequestId, subscription: SubscriptionKey) -> Step {
        if let Err(err) = self
            .correlator
            .register(Some(request_id), RequestKind::Unsubscribe)
        {
            return Step::reply(server_error(Some(request_id), err));
        }
        let result = self.router.unsubscribe(&subscription);
        self.correlator.complete(Correlation::Client(request_id));

        let removed = match result {
            Ok(removed) => removed,
            Err(err) => return Step::reply(server_error(Some(request_id), err)),
        };

        let mut step = Step::default();
        for cancelled in removed.cancelled {
            self.correlator.complete(Correlation::Client(cancelled));
            step.outbound.push(OutputMessage::error(
                Some(cancelled),
                ErrorType::ServerError,
                "subscription cancelled before registration completed",
            ));
        }
        if let Some(generation) = removed.release {
            debug!(key = %subscription.key, %generation, "releasing signal delivery");
            step.commands.push(TransportCommand::Unsubscribe {
                key: subscription.key,
                generation,
            });
        }
        step.outbound.push(OutputMessage::Success { request_id });
        step
    }

    /// Handles a result reported by the transport.
    pub fn handle_transport_event(&mut self, event: TransportEvent) -> Step {
        match event {
            TransportEvent::CallReturned {
                correlation,
                result,
            } => match self.correlator.on_transport_return(correlation, result) {
                Some(message) => Step::reply(message),
                None => Step::default(),
            },
            TransportEvent::Subscribed {
                key,
                generation,
                result,
            } => self.registration_completed(key, generation, result),
            TransportEvent::Signal {
                key,
                generation,
                args,
            } => {
                let outbound = self.router.on_signal(&key, generation, &args);
                if outbound.is_empty() {
                    trace!(%key, %generation, "signal matched no subscription");
                }
                Step {
                    outbound,
                    commands: Vec::new(),
                }
            }
            TransportEvent::SignalStreamEnded { key, generation } => {
                self.stream_ended(&key, generation)
            }
        }
    }

    fn registration_completed(
        &mut self,
        key: SignalKey,
        generation: Generation,
        result: Result<(), TransportError>,
    ) -> Step {
        if let Err(err) = &result {
            debug!(%key, %generation, error = %err, "signal registration failed");
        }
        let outcome = self.router.registration_completed(&key, generation, result);
        if outcome.stale {
            trace!(%key, %generation, "registration result for a superseded attempt");
        }
        for request_id in &outcome.completed {
            self.correlator.complete(Correlation::Client(*request_id));
        }
        let mut step = Step {
            outbound: outcome.replies,
            commands: Vec::new(),
        };
        if outcome.release {
            debug!(%key, %generation, "releasing delivery registered for a cancelled subscription");
            step.commands.push(TransportCommand::Unsubscribe { key, generation });
        }
        step
    }

    fn stream_ended(&mut self, key: &SignalKey, generation: Generation) -> Step {
        let ended = self.router.on_stream_ended(key, generation);
        debug!(
            %key,
            %generation,
            active = ended.active.len(),
            waiting = ended.waiting.len(),
            "signal stream ended"
        );

        let mut step = Step::default();
        for sub in ended.waiting {
            self.correlator.complete(Correlation::Client(sub.request_id));
            step.outbound.push(OutputMessage::error(
                Some(sub.request_id),
                ErrorType::DBusError,
                format!("signal delivery for {key} ended before registration completed"),
            ));
        }
        for sub in ended.active {
            step.outbound.push(OutputMessage::error(
                Some(sub.request_id),
                ErrorType::DBusError,
                format!("signal delivery for {key} ended"),
            ));
        }
        step
    }

    /// Tears the session down.  Pending requests are dropped without reply;
    /// the returned commands release every signal key still registered.
    pub fn close(&mut self) -> Vec<TransportCommand> {
        let dropped = self.correlator.clear();
        let keys = self.router.clear();
        debug!(dropped_requests = dropped, released_keys = keys.len(), "session closed");
        keys.into_iter()
            .map(|(key, generation)| TransportCommand::Unsubscribe { key, generation })
            .collect()
    }

    pub fn pending_requests(&self) -> usize {
        self.correlator.len()
    }
}

fn server_error(request_id: Option<RequestId>, err: impl std::fmt::Display) -> OutputMessage {
    RequestError::new(request_id, ProtocolError::Server(err.to_string())).into()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
