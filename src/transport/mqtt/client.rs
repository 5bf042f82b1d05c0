//! Impure I/O operations for MQTT client
//!
//! Owns the rumqttc client, drives its event loop on a spawned task and
//! reports connection state over a watch channel. There is no reconnection:
//! any event loop error ends the session.

use super::connection::{configure_mqtt_options, parse_broker_url, ConnectionState, MqttError};
use super::message_handler::{EventRoute, MessageHandler};
use crate::config::{BrokerSection, TlsSection};
use crate::transport::Publish;
use async_trait::async_trait;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, EventLoop};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Time the event loop gets to flush DISCONNECT before it is aborted
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// MQTT publishing client for AWS IoT Core
pub struct MqttClient {
    broker: BrokerSection,
    tls: TlsSection,
    client: Option<AsyncClient>,
    event_loop_handle: Option<JoinHandle<()>>,
    state_rx: Option<watch::Receiver<ConnectionState>>,
    shutdown_tx: Option<watch::Sender<bool>>,
}

impl MqttClient {
    /// Create a client without touching the network or the TLS files
    pub fn new(broker: BrokerSection, tls: TlsSection) -> Result<Self, MqttError> {
        parse_broker_url(&broker.url)?;

        Ok(MqttClient {
            broker,
            tls,
            client: None,
            event_loop_handle: None,
            state_rx: None,
            shutdown_tx: None,
        })
    }

    /// Create connection state and shutdown channels
    #[allow(clippy::type_complexity)]
    fn setup_connection_channels() -> (
        (
            watch::Sender<ConnectionState>,
            watch::Receiver<ConnectionState>,
        ),
        (watch::Sender<bool>, watch::Receiver<bool>),
    ) {
        let state_channels = watch::channel(ConnectionState::Connecting);
        let shutdown_channels = watch::channel(false);
        (state_channels, shutdown_channels)
    }

    /// Wait for connection confirmation (ConnAck) with timeout
    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let timeout_result = tokio::time::timeout(timeout, async {
            loop {
                match *state_rx.borrow_and_update() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Disconnected(ref reason) => {
                        return Err(MqttError::ConnectionFailedStr(reason.clone()));
                    }
                    ConnectionState::Connecting => {}
                }
                if state_rx.changed().await.is_err() {
                    return Err(MqttError::ConnectionFailedStr(
                        "State channel closed".to_string(),
                    ));
                }
            }
        })
        .await;

        match timeout_result {
            Ok(result) => result,
            Err(_) => Err(MqttError::ConnectionFailedStr(
                "ConnAck timeout - no connection confirmation received".to_string(),
            )),
        }
    }

    /// Connect to the broker over mutual TLS.
    ///
    /// Returns only after CONNACK. Handshake, network and timeout failures are
    /// final; nothing is retried.
    pub async fn connect(&mut self) -> Result<(), MqttError> {
        if self.client.is_some() {
            return Err(MqttError::ConnectionFailedStr(
                "Client already connected".to_string(),
            ));
        }

        let mqtt_options = configure_mqtt_options(&self.broker, &self.tls)?;
        info!(
            broker = %self.broker.url,
            client_id = %self.broker.client_id,
            "TLS setup completed, connecting to broker"
        );

        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);
        let ((state_tx, state_rx), (shutdown_tx, shutdown_rx)) =
            Self::setup_connection_channels();

        let handle = tokio::spawn(Self::drive_event_loop(
            event_loop,
            state_tx,
            shutdown_rx,
            self.broker.client_id.clone(),
        ));

        self.client = Some(client);
        self.event_loop_handle = Some(handle);
        self.state_rx = Some(state_rx.clone());
        self.shutdown_tx = Some(shutdown_tx);

        let timeout = Duration::from_secs(self.broker.connect_timeout_secs);
        if let Err(e) = Self::wait_for_connection_confirmation(state_rx, timeout).await {
            error!("Failed to connect to broker: {}", e);
            self.stop_event_loop();
            self.client = None;
            return Err(e);
        }

        info!("Connected to broker");
        Ok(())
    }

    /// Poll the event loop until shutdown, DISCONNECT or the first error
    async fn drive_event_loop(
        mut event_loop: EventLoop,
        state_tx: watch::Sender<ConnectionState>,
        mut shutdown_rx: watch::Receiver<bool>,
        client_id: String,
    ) {
        debug!("Starting MQTT event loop for client: {}", client_id);

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        debug!("Shutdown signal received, stopping event loop");
                        break;
                    }
                }

                event_result = event_loop.poll() => {
                    match event_result {
                        Ok(event) => {
                            let route = MessageHandler::route_mqtt_event(&event);
                            if !Self::process_event_route(route, &state_tx) {
                                break;
                            }
                        }
                        Err(e) => {
                            error!("MQTT event loop error for client {}: {}", client_id, e);
                            let _ = state_tx.send(ConnectionState::Disconnected(e.to_string()));
                            break;
                        }
                    }
                }
            }
        }

        debug!("MQTT event loop stopped for client: {}", client_id);
    }

    /// Apply a routed event to the connection state.
    /// Returns true to continue the loop, false to stop it.
    fn process_event_route(route: EventRoute, state_tx: &watch::Sender<ConnectionState>) -> bool {
        match &route {
            EventRoute::ConnectionAcknowledged => {
                let _ = state_tx.send(ConnectionState::Connected);
            }
            EventRoute::PublishAcknowledged { packet_id } => {
                tracing::debug!(target: "mqtt_transport", packet_id, "Publish acknowledged");
            }
            EventRoute::Disconnected => {
                warn!("Broker closed the connection");
                let _ = state_tx.send(ConnectionState::Disconnected(
                    "Broker disconnected".to_string(),
                ));
            }
            EventRoute::DisconnectSent => {
                let _ = state_tx.send(ConnectionState::Disconnected(
                    "Client disconnected".to_string(),
                ));
            }
            EventRoute::InfrastructureEvent(event_str) => {
                tracing::debug!(target: "mqtt_transport", "MQTT event: {}", event_str);
            }
            EventRoute::OutgoingEvent => {}
        }
        route.keeps_loop_running()
    }

    /// Signal the event loop task to stop and abort it if still running
    fn stop_event_loop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
    }

    /// Send DISCONNECT and wait briefly for the event loop to flush it
    pub async fn disconnect(&mut self) -> Result<(), MqttError> {
        let Some(client) = self.client.take() else {
            debug!("Disconnect requested on a client that is not connected");
            self.stop_event_loop();
            return Ok(());
        };

        let result = client
            .disconnect()
            .await
            .map_err(|e| MqttError::ConnectionFailed(Box::new(e)));

        if let Some(handle) = self.event_loop_handle.take() {
            let abort_handle = handle.abort_handle();
            match tokio::time::timeout(DISCONNECT_GRACE, handle).await {
                Ok(Ok(())) => debug!("Event loop task shut down gracefully"),
                Ok(Err(e)) if !e.is_cancelled() => warn!("Event loop task ended with error: {}", e),
                Ok(Err(_)) => {}
                Err(_) => {
                    warn!("Event loop task didn't shut down gracefully, forcing abort");
                    abort_handle.abort();
                }
            }
        }
        self.stop_event_loop();

        info!("MQTT client disconnected");
        result
    }

    /// Get current connection state
    /// Returns None if connection hasn't been established yet
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.state_rx.as_ref().map(|rx| rx.borrow().clone())
    }

    /// Check connection state before operations
    fn check_connection_state(&self) -> Result<&AsyncClient, MqttError> {
        let client = self.client.as_ref().ok_or_else(|| {
            MqttError::ConnectionFailedStr("Client not connected".to_string())
        })?;

        let current_state = self
            .connection_state()
            .unwrap_or(ConnectionState::Connecting);
        if !current_state.can_publish() {
            return Err(MqttError::NotConnected {
                state: current_state,
            });
        }

        Ok(client)
    }

    /// Publish a payload with QoS 1, not retained
    pub async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), MqttError> {
        let client = self.check_connection_state()?;

        let size = payload.len();
        client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))?;

        debug!(topic = %topic, bytes = size, "Queued publish");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some() && matches!(self.connection_state(), Some(ConnectionState::Connected))
    }
}

#[async_trait]
impl Publish for MqttClient {
    type Error = MqttError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        MqttClient::connect(self).await
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), Self::Error> {
        MqttClient::publish(self, topic, payload).await
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        MqttClient::disconnect(self).await
    }

    fn is_connected(&self) -> bool {
        MqttClient::is_connected(self)
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        // Async disconnect is impossible here; only stop the background task
        self.stop_event_loop();
    }
}
