//! # Message Bus Client
//!
//! Owns the single outbound MQTT connection for the lifetime of the process.
//!
//! ## Connection lifecycle:
//! `Disconnected → Connecting → Connected`, tracked from the packets seen by a
//! dedicated driver task that polls the rumqttc event loop. On any I/O failure the
//! state drops to `Disconnected`; the driver then waits for the next triggering
//! event (a publish attempt or the reconnect backoff, whichever comes first)
//! before polling again, which is what re-establishes the connection. There is no
//! unbounded retry loop blocking any caller.
//!
//! ## Publish contract:
//! Events go out at QoS 1; `publish_event` waits for the broker's acknowledgment
//! (counted by the driver) bounded by the configured timeout. All publishes are
//! serialized through one async mutex so a reconnect in progress is never raced
//! by a concurrent publish on a stale handle, and so each awaited ack belongs to
//! the publish that is waiting for it.
//!
//! ## Shutdown:
//! `shutdown()` is guaranteed-once via an atomic swap: it stops the heartbeat
//! timer, waits out any in-flight publish, queues a DISCONNECT and joins the
//! driver. Safe to call when the connection was never established.

use crate::config::BusConfig;
use crate::error::{AppError, AppResult};
use crate::relay::event::{ClassificationEvent, HeartbeatEvent};
use crate::relay::EventPublisher;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle of the process-wide bus connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

/// Backoff before the driver re-polls a failed connection on its own. A publish
/// or heartbeat kick cuts the wait short.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// The process-wide MQTT client.
pub struct BusClient {
    client: AsyncClient,
    state: Arc<RwLock<ConnectionState>>,
    /// Serializes publishes against each other and against shutdown
    publish_lock: Mutex<()>,
    /// Wakes the driver out of its reconnect backoff
    reconnect_kick: Arc<Notify>,
    /// Broker acks observed by the driver, awaited by publishers
    acks: watch::Receiver<u64>,
    event_topic: String,
    heartbeat_topic: String,
    publish_timeout: Duration,
    shutdown_tx: watch::Sender<bool>,
    shutdown_done: AtomicBool,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl BusClient {
    /// Create the client and spawn the event-loop driver task.
    ///
    /// A failed first connection attempt is logged by the driver and leaves the
    /// client in `Disconnected`; it does not fail startup.
    pub fn connect(config: &BusConfig) -> Arc<Self> {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if !config.username.is_empty() {
            options.set_credentials(&config.username, &config.password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 64);

        let state = Arc::new(RwLock::new(ConnectionState::Connecting));
        let reconnect_kick = Arc::new(Notify::new());
        let (ack_tx, ack_rx) = watch::channel(0u64);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let driver_state = state.clone();
        let driver_kick = reconnect_kick.clone();
        let host = config.host.clone();
        let port = config.port;

        let driver = tokio::spawn(async move {
            info!(broker = %host, port = port, "bus driver started");
            loop {
                if *shutdown_rx.borrow() {
                    // Drain until the DISCONNECT makes it onto the wire or the
                    // connection drops, then stop for good. Acks still count so
                    // a publish in flight during shutdown completes instead of
                    // timing out.
                    match eventloop.poll().await {
                        Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                        Ok(Event::Incoming(Packet::PubAck(_))) => {
                            ack_tx.send_modify(|count| *count += 1);
                        }
                        Ok(_) => {}
                    }
                    continue;
                }

                tokio::select! {
                    _ = shutdown_rx.changed() => {}
                    polled = eventloop.poll() => match polled {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            *driver_state.write().unwrap() = ConnectionState::Connected;
                            info!(broker = %host, "bus connected");
                        }
                        Ok(Event::Incoming(Packet::PubAck(_))) => {
                            ack_tx.send_modify(|count| *count += 1);
                        }
                        Ok(event) => {
                            debug!(?event, "bus event");
                        }
                        Err(e) => {
                            *driver_state.write().unwrap() = ConnectionState::Disconnected;
                            warn!(
                                operation = "bus_poll",
                                error = %e,
                                "bus connection lost; reconnecting on next publish or backoff"
                            );
                            tokio::select! {
                                _ = driver_kick.notified() => {}
                                _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
                                _ = shutdown_rx.changed() => {}
                            }
                            if !*shutdown_rx.borrow() {
                                *driver_state.write().unwrap() = ConnectionState::Connecting;
                            }
                        }
                    }
                }
            }
            *driver_state.write().unwrap() = ConnectionState::Disconnected;
            info!("bus driver stopped");
        });

        Arc::new(Self {
            client,
            state,
            publish_lock: Mutex::new(()),
            reconnect_kick,
            acks: ack_rx,
            event_topic: config.event_topic.clone(),
            heartbeat_topic: config.heartbeat_topic.clone(),
            publish_timeout: Duration::from_secs(config.publish_timeout_secs),
            shutdown_tx,
            shutdown_done: AtomicBool::new(false),
            driver: Mutex::new(Some(driver)),
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read().unwrap()
    }

    /// Watch that flips to `true` exactly once, when `shutdown` runs. The
    /// heartbeat timer stops on it.
    pub fn shutdown_watch(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Publish a JSON payload at QoS 1 and wait for the broker acknowledgment,
    /// bounded by the publish timeout.
    ///
    /// Acks are counted, not matched by packet id: if an earlier publish timed
    /// out before its ack arrived, that late ack can satisfy the next waiter
    /// one publish early. Delivery stays at-least-once either way; the count
    /// only decides when the waiter stops blocking.
    async fn publish_acked(&self, topic: &str, payload: serde_json::Value) -> AppResult<()> {
        let _guard = self.publish_lock.lock().await;

        if self.state() != ConnectionState::Connected {
            // Wake the driver so the reconnect attempt happens now rather than
            // at the end of the backoff
            self.reconnect_kick.notify_one();
        }

        let body = serde_json::to_vec(&payload)
            .map_err(|e| AppError::Publish(format!("payload encode: {}", e)))?;

        let mut acks = self.acks.clone();
        let before = *acks.borrow();

        let publish_and_ack = async {
            self.client
                .publish(topic, QoS::AtLeastOnce, false, body)
                .await
                .map_err(|e| AppError::Publish(format!("enqueue on {}: {}", topic, e)))?;

            acks.wait_for(|&count| count > before)
                .await
                .map_err(|_| AppError::Publish("bus driver stopped".to_string()))?;
            Ok::<(), AppError>(())
        };

        tokio::time::timeout(self.publish_timeout, publish_and_ack)
            .await
            .map_err(|_| {
                AppError::Publish(format!(
                    "no broker acknowledgment on {} within {:?}",
                    topic, self.publish_timeout
                ))
            })?
    }

    /// Guaranteed-once teardown. Stops the heartbeat timer, flushes any in-flight
    /// publish, closes the connection and joins the driver. Idempotent, and safe
    /// if the connection was never established.
    pub async fn shutdown(&self) {
        if self.shutdown_done.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("shutting down bus client");

        // Stops the heartbeat task and tells the driver to wind down
        let _ = self.shutdown_tx.send(true);

        // Waits for an in-flight publish to finish before disconnecting
        let _guard = self.publish_lock.lock().await;

        // Queue the DISCONNECT; harmless if there never was a connection
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "disconnect enqueue failed (connection likely never established)");
        }

        if let Some(driver) = self.driver.lock().await.take() {
            let _ = driver.await;
        }

        info!("bus client shut down");
    }
}

#[async_trait]
impl EventPublisher for BusClient {
    async fn publish_event(&self, event: &ClassificationEvent) -> AppResult<()> {
        self.publish_acked(&self.event_topic, event.bus_payload())
            .await
    }

    async fn publish_heartbeat(&self) -> AppResult<()> {
        self.publish_acked(&self.heartbeat_topic, HeartbeatEvent::now().bus_payload())
            .await
    }
}

/// Drive the heartbeat: publish on a fixed cadence, independent of request
/// traffic, until the shutdown watch flips.
///
/// Heartbeat failures are logged and swallowed; they never interrupt the timer.
pub async fn run_heartbeat(
    publisher: Arc<dyn EventPublisher>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // interval fires immediately; consume that tick so the first heartbeat goes
    // out one full period after startup
    ticker.tick().await;

    info!(period_secs = period.as_secs(), "heartbeat timer started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = publisher.publish_heartbeat().await {
                    warn!(operation = "heartbeat", error = %e, "heartbeat publish failed; timer continues");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("heartbeat timer stopped");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classification;
    use std::sync::atomic::AtomicUsize;

    struct CountingPublisher {
        heartbeats: AtomicUsize,
        fail: bool,
    }

    impl CountingPublisher {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                heartbeats: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl EventPublisher for CountingPublisher {
        async fn publish_event(&self, _event: &ClassificationEvent) -> AppResult<()> {
            Ok(())
        }

        async fn publish_heartbeat(&self) -> AppResult<()> {
            self.heartbeats.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(AppError::Publish("broker unreachable".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn test_bus_config() -> BusConfig {
        BusConfig {
            // Nothing listens here; connection attempts fail immediately
            host: "127.0.0.1".to_string(),
            port: 1,
            username: String::new(),
            password: String::new(),
            client_id: "bus-test".to_string(),
            event_topic: "test/events".to_string(),
            heartbeat_topic: "test/heartbeat".to_string(),
            heartbeat_interval_secs: 60,
            publish_timeout_secs: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_fires_at_configured_interval() {
        let publisher = CountingPublisher::new(false);
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(run_heartbeat(
            publisher.clone(),
            Duration::from_secs(60),
            rx,
        ));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(publisher.heartbeats.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(publisher.heartbeats.load(Ordering::SeqCst), 3);

        tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_failures_never_interrupt_the_timer() {
        let publisher = CountingPublisher::new(true);
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(run_heartbeat(
            publisher.clone(),
            Duration::from_secs(60),
            rx,
        ));

        tokio::time::sleep(Duration::from_secs(181)).await;
        assert_eq!(publisher.heartbeats.load(Ordering::SeqCst), 3);

        tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_heartbeats_after_shutdown() {
        let publisher = CountingPublisher::new(false);
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(run_heartbeat(
            publisher.clone(),
            Duration::from_secs(60),
            rx,
        ));

        tokio::time::sleep(Duration::from_secs(61)).await;
        tx.send(true).unwrap();
        task.await.unwrap();

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(publisher.heartbeats.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_publish_without_broker_is_publish_error() {
        let bus = BusClient::connect(&test_bus_config());
        let event = ClassificationEvent::from_classification(
            &Classification {
                label: "bark".to_string(),
                confidence: 0.91,
            },
            None,
        );

        match bus.publish_event(&event).await {
            Err(AppError::Publish(_)) => {}
            other => panic!("expected Publish error, got {:?}", other),
        }
        assert_ne!(bus.state(), ConnectionState::Connected);

        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_concurrent_publishes_are_serialized_not_corrupting() {
        let bus = BusClient::connect(&test_bus_config());
        let event = ClassificationEvent::from_classification(
            &Classification {
                label: "bark".to_string(),
                confidence: 0.91,
            },
            None,
        );

        let (a, b) = tokio::join!(bus.publish_event(&event), bus.publish_event(&event));
        assert!(a.is_err());
        assert!(b.is_err());

        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_without_connection() {
        let bus = BusClient::connect(&test_bus_config());
        bus.shutdown().await;
        bus.shutdown().await;
        assert_eq!(bus.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_then_publish_triggers_exactly_one_reconnect() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = attempts.clone();
        tokio::spawn(async move {
            // The first connection is dropped to knock the client into
            // Disconnected; later ones are held open without a CONNACK so
            // every attempt stays countable
            let mut held = Vec::new();
            loop {
                let (socket, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => break,
                };
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    drop(socket);
                } else {
                    held.push(socket);
                }
            }
        });

        let mut config = test_bus_config();
        config.port = port;
        let bus = BusClient::connect(&config);

        for _ in 0..100 {
            if bus.state() == ConnectionState::Disconnected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(bus.state(), ConnectionState::Disconnected);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        let event = ClassificationEvent::from_classification(
            &Classification {
                label: "bark".to_string(),
                confidence: 0.91,
            },
            None,
        );
        assert!(bus.publish_event(&event).await.is_err());

        // The kick preempts the backoff, so the publish window sees exactly
        // one new connection attempt
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        bus.shutdown().await;
    }

    /// Minimal scripted broker: accept one client, acknowledge its CONNECT,
    /// then ack its first QoS 1 publish after a delay.
    async fn scripted_broker(listener: tokio::net::TcpListener, ack_delay: Duration) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];

        // CONNECT in, CONNACK (accepted) out
        let _ = socket.read(&mut buf).await.unwrap();
        socket.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();

        // PUBLISH in; the first packet id rumqttc assigns is 1
        let _ = socket.read(&mut buf).await.unwrap();
        tokio::time::sleep(ack_delay).await;
        socket.write_all(&[0x40, 0x02, 0x00, 0x01]).await.unwrap();

        // Hold the connection open until the client disconnects
        while socket.read(&mut buf).await.unwrap_or(0) > 0 {}
    }

    #[tokio::test]
    async fn test_shutdown_flushes_in_flight_publish() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(scripted_broker(listener, Duration::from_millis(600)));

        let mut config = test_bus_config();
        config.port = port;
        let bus = BusClient::connect(&config);

        for _ in 0..100 {
            if bus.state() == ConnectionState::Connected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(bus.state(), ConnectionState::Connected);

        let event = ClassificationEvent::from_classification(
            &Classification {
                label: "bark".to_string(),
                confidence: 0.91,
            },
            None,
        );

        // Shutdown lands while the ack is still outstanding; the drain loop
        // must still deliver it so the publish succeeds instead of timing out
        let (published, _) = tokio::join!(bus.publish_event(&event), async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            bus.shutdown().await;
        });
        published.unwrap();
    }
}
