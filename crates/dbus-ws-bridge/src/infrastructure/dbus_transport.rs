//! zbus implementation of the [`Transport`] seam.
//!
//! One [`ZbusTransport`] wraps one bus connection, opened when a client
//! completes the WebSocket handshake and closed when the last clone of the
//! connection is dropped.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use dbus_ws_core::{DBusValue, MethodCall, SignalKey};
use futures_util::StreamExt;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use super::dbus_values::{from_body, to_body};
use crate::application::transport::{CallError, RemoteError, SignalStream, Transport, TransportError};
use crate::domain::BusTarget;

#[derive(Debug, Clone)]
pub struct ZbusTransport {
    connection: zbus::Connection,
    call_timeout: Duration,
}

impl ZbusTransport {
    /// Opens a connection to `bus`.  `signal_queue` bounds how many
    /// undelivered messages the connection buffers per signal stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the bus address cannot be resolved or the
    /// authentication handshake fails.
    pub async fn connect(
        bus: BusTarget,
        call_timeout: Duration,
        signal_queue: usize,
    ) -> anyhow::Result<Self> {
        let mut connection = match bus {
            BusTarget::Session => zbus::Connection::session().await,
            BusTarget::System => zbus::Connection::system().await,
        }
        .with_context(|| format!("failed to connect to the {bus} bus"))?;
        connection.set_max_queued(signal_queue);

        debug!(
            %bus,
            unique_name = ?connection.unique_name().map(|name| name.to_string()),
            "D-Bus connection established"
        );
        Ok(Self {
            connection,
            call_timeout,
        })
    }

    async fn dispatch(&self, call: &MethodCall) -> zbus::Result<zbus::Message> {
        let destination = call.destination.as_ref().map(|name| name.as_str());
        let interface = call.interface.as_ref().map(|name| name.as_str());
        let body = to_body(&call.args)
            .map_err(|err| zbus::Error::Failure(format!("invalid arguments: {err}")))?;

        match body {
            Some(body) => {
                self.connection
                    .call_method(destination, call.path.as_str(), interface, call.member.as_str(), &body)
                    .await
            }
            None => {
                self.connection
                    .call_method(destination, call.path.as_str(), interface, call.member.as_str(), &())
                    .await
            }
        }
    }
}

#[async_trait]
impl Transport for ZbusTransport {
    async fn call(&self, call: MethodCall) -> Result<Vec<DBusValue>, CallError> {
        trace!(%call, "dispatching method call");

        let reply = match timeout(self.call_timeout, self.dispatch(&call)).await {
            Ok(reply) => reply,
            Err(_) => {
                debug!(%call, timeout_ms = self.call_timeout.as_millis() as u64, "method call timed out");
                return Err(CallError::Remote(RemoteError::timeout(self.call_timeout)));
            }
        };

        match reply {
            Ok(message) => from_body(&message.body())
                .map_err(|err| CallError::Transport(format!("unreadable reply: {err}"))),
            Err(zbus::Error::MethodError(name, detail, message)) => {
                let args = match from_body(&message.body()) {
                    Ok(args) => args,
                    Err(err) => {
                        warn!(error_name = %name, error = %err, "error reply body unreadable");
                        detail.map(DBusValue::string).into_iter().collect()
                    }
                };
                Err(CallError::Remote(RemoteError {
                    name: name.to_string(),
                    args,
                }))
            }
            Err(err) => Err(CallError::Transport(err.to_string())),
        }
    }

    async fn subscribe(&self, key: &SignalKey) -> Result<SignalStream, TransportError> {
        let proxy = zbus::Proxy::new(
            &self.connection,
            key.destination.as_str().to_owned(),
            key.path.as_str().to_owned(),
            key.interface.as_str().to_owned(),
        )
        .await
        .map_err(|err| TransportError(err.to_string()))?;

        let signals = proxy
            .receive_signal(key.member.as_str().to_owned())
            .await
            .map_err(|err| TransportError(err.to_string()))?;

        debug!(%key, "signal match registered");
        let key = key.clone();
        let stream = signals.filter_map(move |message| {
            let args = match from_body(&message.body()) {
                Ok(args) => Some(args),
                Err(err) => {
                    warn!(%key, error = %err, "dropping signal with unreadable body");
                    None
                }
            };
            async move { args }
        });
        Ok(Box::pin(stream))
    }

    async fn unsubscribe(&self, key: &SignalKey) {
        // The match rule is removed when the signal stream is dropped.
        trace!(%key, "signal match released");
    }
}
