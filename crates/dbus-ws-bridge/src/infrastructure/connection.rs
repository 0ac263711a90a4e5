//! Per-connection driver: runs a [`Session`] against a [`Transport`].
//!
//! The session decides, the driver executes.  Each transport command runs on
//! its own Tokio task so a slow method call never delays other requests on
//! the same WebSocket; every task reports back through one unbounded channel
//! that the WebSocket loop polls with [`ConnectionDriver::next_event`].
//!
//! ```text
//!  client frame ──▶ handle_frame ──▶ Session ──▶ commands ──▶ spawned tasks
//!                                       ▲                          │
//!                                       └── handle_transport_event ◀┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use dbus_ws_core::{Decoder, OutputMessage, SignalKey};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::application::{Generation, Session, Transport, TransportCommand, TransportEvent};

pub struct ConnectionDriver<T: Transport> {
    id: Uuid,
    session: Session,
    transport: Arc<T>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    calls: JoinSet<()>,
    signals: HashMap<SignalKey, (Generation, JoinHandle<()>)>,
}

impl<T: Transport> ConnectionDriver<T> {
    pub fn new(transport: Arc<T>, decoder: Decoder) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            id: Uuid::new_v4(),
            session: Session::new(decoder),
            transport,
            events_tx,
            events_rx,
            calls: JoinSet::new(),
            signals: HashMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Handles one client text frame and returns the replies to send now.
    pub fn handle_frame(&mut self, text: &str) -> Vec<OutputMessage> {
        let step = self.session.handle_frame(text);
        self.execute(step.commands);
        step.outbound
    }

    pub fn handle_binary_frame(&mut self) -> Vec<OutputMessage> {
        self.session.handle_binary_frame().outbound
    }

    /// Feeds a transport result back into the session.
    pub fn handle_transport_event(&mut self, event: TransportEvent) -> Vec<OutputMessage> {
        match &event {
            TransportEvent::SignalStreamEnded { key, generation }
            | TransportEvent::Subscribed {
                key,
                generation,
                result: Err(_),
            } => {
                // The task has finished; forget it only if no newer
                // registration took its place.
                self.forget_signal_task(key, *generation);
            }
            _ => {}
        }
        let step = self.session.handle_transport_event(event);
        self.execute(step.commands);
        step.outbound
    }

    /// Waits for the next transport result.  Never returns `None` while the
    /// driver is alive, because the driver holds a sender itself.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        while self.calls.try_join_next().is_some() {}
        self.events_rx.recv().await
    }

    /// Stops all work for this connection.  In-flight calls are abandoned and
    /// their replies discarded; every signal key is released on the bus.
    pub async fn close(mut self) {
        let release = self.session.close();
        self.calls.abort_all();
        for (_, (_, handle)) in self.signals.drain() {
            handle.abort();
        }
        for command in release {
            if let TransportCommand::Unsubscribe { key, .. } = command {
                self.transport.unsubscribe(&key).await;
            }
        }
        debug!(connection = %self.id, "connection driver closed");
    }

    fn execute(&mut self, commands: Vec<TransportCommand>) {
        for command in commands {
            match command {
                TransportCommand::Call { correlation, call } => {
                    let transport = Arc::clone(&self.transport);
                    let events = self.events_tx.clone();
                    self.calls.spawn(async move {
                        let result = transport.call(call).await;
                        // The receiver is gone once the connection closes.
                        let _ = events.send(TransportEvent::CallReturned {
                            correlation,
                            result,
                        });
                    });
                }
                TransportCommand::Subscribe { key, generation } => {
                    let handle = self.spawn_signal_task(key.clone(), generation);
                    if let Some((previous, stale)) = self.signals.insert(key, (generation, handle)) {
                        trace!(connection = %self.id, %previous, "signal registration superseded");
                        stale.abort();
                    }
                }
                TransportCommand::Unsubscribe { key, generation } => {
                    let Some(handle) = self.forget_signal_task(&key, generation) else {
                        trace!(
                            connection = %self.id,
                            %key,
                            %generation,
                            "release for a superseded registration"
                        );
                        continue;
                    };
                    handle.abort();
                    let transport = Arc::clone(&self.transport);
                    self.calls.spawn(async move {
                        transport.unsubscribe(&key).await;
                    });
                }
            }
        }
    }

    /// Removes the task registered for `key` if it belongs to `generation`.
    fn forget_signal_task(
        &mut self,
        key: &SignalKey,
        generation: Generation,
    ) -> Option<JoinHandle<()>> {
        match self.signals.get(key) {
            Some((current, _)) if *current == generation => {
                self.signals.remove(key).map(|(_, handle)| handle)
            }
            _ => None,
        }
    }

    fn spawn_signal_task(&self, key: SignalKey, generation: Generation) -> JoinHandle<()> {
        let transport = Arc::clone(&self.transport);
        let events = self.events_tx.clone();
        let connection = self.id;
        tokio::spawn(async move {
            let mut stream = match transport.subscribe(&key).await {
                Ok(stream) => {
                    let _ = events.send(TransportEvent::Subscribed {
                        key: key.clone(),
                        generation,
                        result: Ok(()),
                    });
                    stream
                }
                Err(err) => {
                    let _ = events.send(TransportEvent::Subscribed {
                        key,
                        generation,
                        result: Err(err),
                    });
                    return;
                }
            };

            while let Some(args) = stream.next().await {
                trace!(%connection, %key, "signal received");
                if events
                    .send(TransportEvent::Signal {
                        key: key.clone(),
                        generation,
                        args,
                    })
                    .is_err()
                {
                    return;
                }
            }
            let _ = events.send(TransportEvent::SignalStreamEnded { key, generation });
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
