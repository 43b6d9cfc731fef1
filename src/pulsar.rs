//! Talks to a Pulsar WebSocket broker.
//! See <https://pulsar.apache.org/docs/en/client-libraries-websocket/>

use crate::close::{NORMAL_CLOSURE_CODE, NORMAL_CLOSURE_MESSAGE};
use crate::connection::WebSocketClient;
use crate::event::WebSocketEvent;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use log::{debug, error, info, warn};
use serde::Deserialize;
use serde_json::json;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use tokio::task::{spawn_local, JoinHandle};
use tokio::time::{interval, sleep, Duration};

const DEFAULT_MAX_QUEUE_SIZE: usize = 1000;
const PUBLISH_TIMEOUT_MS: u64 = 3000;
const QUEUE_PROCESSOR_INTERVAL_MS: u64 = 100;

pub type OnPublishResponseCallback = Box<dyn FnOnce(bool, &str, &str)>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PulsarStats {
    pub delivered_messages: u64,
    pub dropped_messages: u64,
}

#[derive(Deserialize)]
struct ProducerAck {
    result: Option<String>,
    context: Option<String>,
    #[serde(rename = "messageId")]
    message_id: Option<String>,
}

#[derive(Deserialize)]
struct ConsumerMessage {
    payload: Option<String>,
    #[serde(rename = "messageId")]
    message_id: Option<String>,
}

struct PulsarState {
    base_url: String,
    // One cached connection per producer/consumer URL, created lazily
    // on the first publish or subscribe and kept until close
    clients: HashMap<String, WebSocketClient>,
    publish_callbacks: HashMap<String, OnPublishResponseCallback>,
    publish_timers: HashMap<String, JoinHandle<()>>,
    queue: VecDeque<(String, String)>,
    max_queue_size: usize,
    next_context_id: u64,
    delivered_messages: u64,
    dropped_messages: u64,
    queue_processor: Option<JoinHandle<()>>,
}

/// A Pulsar producer/consumer client multiplexing topics over cached
/// WebSocket connections.
///
/// Publishes go through a bounded FIFO queue drained every 100 ms once
/// the topic's connection is up, each with a 3 s delivery timeout.
/// Exactly one of the two outcomes reaches the publish callback: the
/// broker ack with its message id, or a timeout failure. Must be used
/// from a current-thread runtime inside a `LocalSet`, like the rest of
/// the crate.
pub struct PulsarClient {
    inner: Rc<RefCell<PulsarState>>,
}

impl Clone for PulsarClient {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl PulsarClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_max_queue_size(base_url, DEFAULT_MAX_QUEUE_SIZE)
    }

    pub fn with_max_queue_size(base_url: &str, max_queue_size: usize) -> Self {
        let client = Self {
            inner: Rc::new(RefCell::new(PulsarState {
                base_url: base_url.to_string(),
                clients: HashMap::new(),
                publish_callbacks: HashMap::new(),
                publish_timers: HashMap::new(),
                queue: VecDeque::new(),
                max_queue_size,
                next_context_id: 0,
                delivered_messages: 0,
                dropped_messages: 0,
                queue_processor: None,
            })),
        };
        client.create_queue_processor();
        client
    }

    /// Queues one message for the topic's producer endpoint. The
    /// callback receives `(success, context, message id)` exactly once,
    /// from the broker ack or from the 3 s timeout.
    pub fn publish(
        &self,
        payload: &[u8],
        tenant: &str,
        namespace: &str,
        topic: &str,
        callback: impl FnOnce(bool, &str, &str) + 'static,
    ) {
        // ws://broker:8080/ws/v2/producer/persistent/:tenant/:namespace/:topic
        let url = format!(
            "{}/ws/v2/producer/persistent/{}/{}/{}",
            self.inner.borrow().base_url,
            tenant,
            namespace,
            topic
        );

        // Keep track of the callback
        let context = self.create_context();
        let envelope = serialize_publish_message(payload, &context);
        self.inner
            .borrow_mut()
            .publish_callbacks
            .insert(context.clone(), Box::new(callback));

        self.ensure_producer_connection(&url);
        self.arm_publish_timer(context);

        let mut state = self.inner.borrow_mut();
        if state.queue.len() == state.max_queue_size {
            warn!("publish queue full, dropping the oldest entry");
            state.queue.pop_front();
        }
        state.queue.push_back((url, envelope));
    }

    /// Attaches a consumer to a topic. Returns whether a new consumer
    /// connection was created: a second subscription to the same
    /// consumer URL is refused and the first one stays installed.
    pub fn subscribe(
        &self,
        tenant: &str,
        namespace: &str,
        topic: &str,
        subscription: &str,
        mut callback: impl FnMut(&[u8], &str) -> bool + 'static,
    ) -> bool {
        // ws://broker:8080/ws/v2/consumer/persistent/:tenant/:namespace/:topic/:subscription
        let url = format!(
            "{}/ws/v2/consumer/persistent/{}/{}/{}/{}",
            self.inner.borrow().base_url,
            tenant,
            namespace,
            topic,
            subscription
        );

        if self.inner.borrow().clients.contains_key(&url) {
            warn!("already subscribed to {}, refusing the new subscription", url);
            return false;
        }

        let client = WebSocketClient::new();
        self.inner
            .borrow_mut()
            .clients
            .insert(url.clone(), client.clone());

        let weak = Rc::downgrade(&self.inner);
        let base_url = self.inner.borrow().base_url.clone();
        let callback_url = url.clone();
        client.set_on_message_callback(move |event| {
            let Some(inner) = weak.upgrade() else { return };
            match event {
                WebSocketEvent::Message { payload, binary } if !*binary => {
                    // The connection is looked up from the cache again
                    // so the callback doesn't have to keep the handle
                    // alive
                    let consumer = inner.borrow().clients.get(&callback_url).cloned();
                    let Some(consumer) = consumer else { return };
                    let bridge = PulsarClient { inner };
                    bridge.process_consumer_received_message(payload, &mut callback, &consumer);
                }
                WebSocketEvent::Open(_) => debug!("connection to {} established", base_url),
                WebSocketEvent::Close(_) => debug!("connection to {} closed", base_url),
                _ => {}
            }
        });

        client.connect(&url);
        true
    }

    /// Stops the queue processor, cancels the pending publish timers
    /// and closes every cached connection.
    pub fn close(&self) {
        let (processor, timers, clients) = {
            let mut state = self.inner.borrow_mut();
            let processor = state.queue_processor.take();
            let timers: Vec<JoinHandle<()>> =
                state.publish_timers.drain().map(|(_, timer)| timer).collect();
            let clients: Vec<WebSocketClient> =
                state.clients.drain().map(|(_, client)| client).collect();
            (processor, timers, clients)
        };
        if let Some(processor) = processor {
            processor.abort();
        }
        for timer in timers {
            timer.abort();
        }
        for client in clients {
            client.close(NORMAL_CLOSURE_CODE, NORMAL_CLOSURE_MESSAGE);
        }
    }

    pub fn stats(&self) -> PulsarStats {
        let state = self.inner.borrow();
        PulsarStats {
            delivered_messages: state.delivered_messages,
            dropped_messages: state.dropped_messages,
        }
    }

    pub fn report_stats(&self) {
        let stats = self.stats();
        info!(
            "delivered messages: {}, dropped messages: {}",
            stats.delivered_messages, stats.dropped_messages
        );
    }

    /// Tells whether the queue is empty and all callbacks were invoked,
    /// whether the message delivery was successful or not.
    pub fn all_published_messages_processed(&self) -> bool {
        let state = self.inner.borrow();
        state.queue.is_empty() && state.publish_callbacks.is_empty()
    }

    fn create_context(&self) -> String {
        let mut state = self.inner.borrow_mut();
        let context = state.next_context_id.to_string();
        state.next_context_id += 1;
        context
    }

    fn ensure_producer_connection(&self, url: &str) {
        if self.inner.borrow().clients.contains_key(url) {
            return;
        }

        let client = WebSocketClient::new();
        self.inner
            .borrow_mut()
            .clients
            .insert(url.to_string(), client.clone());

        let weak = Rc::downgrade(&self.inner);
        let base_url = self.inner.borrow().base_url.clone();
        client.set_on_message_callback(move |event| {
            let Some(inner) = weak.upgrade() else { return };
            match event {
                WebSocketEvent::Message { payload, binary } if !*binary => {
                    let bridge = PulsarClient { inner };
                    bridge.process_producer_received_message(payload);
                }
                WebSocketEvent::Open(_) => debug!("connection to {} established", base_url),
                WebSocketEvent::Close(_) => debug!("connection to {} closed", base_url),
                _ => {}
            }
        });

        client.connect(url);
    }

    // A single-shot timer per in-flight publish. When it fires first,
    // the callback resolves as a failure and the entry is dropped, when
    // the ack wins the timer is cancelled
    fn arm_publish_timer(&self, context: String) {
        let weak = Rc::downgrade(&self.inner);
        let timer_context = context.clone();
        let timer = spawn_local(async move {
            sleep(Duration::from_millis(PUBLISH_TIMEOUT_MS)).await;
            let Some(inner) = weak.upgrade() else { return };
            let callback = {
                let mut state = inner.borrow_mut();
                state.publish_timers.remove(&timer_context);
                state.publish_callbacks.remove(&timer_context)
            };
            if let Some(callback) = callback {
                warn!("publish timed out, context: {}", timer_context);
                inner.borrow_mut().dropped_messages += 1;
                callback(false, &timer_context, "n/a");
            }
        });
        self.inner.borrow_mut().publish_timers.insert(context, timer);
    }

    fn create_queue_processor(&self) {
        let weak = Rc::downgrade(&self.inner);
        let processor = spawn_local(async move {
            let mut ticker = interval(Duration::from_millis(QUEUE_PROCESSOR_INTERVAL_MS));
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { return };
                Self::process_queue(&inner);
            }
        });
        self.inner.borrow_mut().queue_processor = Some(processor);
    }

    // Drains the queue front-first. A topic whose connection isn't up
    // yet keeps its entry at the front and the whole queue waits for
    // the next tick
    fn process_queue(inner: &Rc<RefCell<PulsarState>>) {
        loop {
            let front = {
                let state = inner.borrow();
                state.queue.front().map(|(url, envelope)| {
                    (url.clone(), envelope.clone(), state.clients.get(url).cloned())
                })
            };
            let Some((url, envelope, client)) = front else { return };
            let Some(client) = client else {
                // The connection went away underneath the entry
                inner.borrow_mut().queue.pop_front();
                continue;
            };
            if !client.is_connected() {
                return;
            }
            if client.send_text(&envelope) {
                inner.borrow_mut().queue.pop_front();
            } else {
                debug!("error sending data to {}", url); // will retry
                return;
            }
        }
    }

    fn process_producer_received_message(&self, raw: &[u8]) {
        debug!("received message: {}", String::from_utf8_lossy(raw));

        let ack: ProducerAck = match serde_json::from_slice(raw) {
            Ok(ack) => ack,
            Err(err) => {
                error!(
                    "malformed json pdu: {}, error: {}",
                    String::from_utf8_lossy(raw),
                    err
                );
                return;
            }
        };

        let context = ack.context.unwrap_or_else(|| "n/a".to_string());
        let result = ack.result.as_deref().unwrap_or("n/a");
        if result != "ok" {
            error!("error response: {}", result);
            // The broker refused the message, resolve the pending
            // publish right away instead of letting it ride to the
            // timeout
            let callback = self.take_pending_publish(&context);
            if let Some(callback) = callback {
                self.inner.borrow_mut().dropped_messages += 1;
                callback(false, &context, "n/a");
            }
            return;
        }

        match self.take_pending_publish(&context) {
            Some(callback) => {
                self.inner.borrow_mut().delivered_messages += 1;
                let message_id = ack.message_id.unwrap_or_else(|| "n/a".to_string());
                callback(true, &context, &message_id);
            }
            None => warn!("orphan context: {}", context),
        }
    }

    // Removes a pending publish entry and cancels its timer
    fn take_pending_publish(&self, context: &str) -> Option<OnPublishResponseCallback> {
        let mut state = self.inner.borrow_mut();
        if let Some(timer) = state.publish_timers.remove(context) {
            timer.abort();
        }
        state.publish_callbacks.remove(context)
    }

    fn process_consumer_received_message(
        &self,
        raw: &[u8],
        callback: &mut dyn FnMut(&[u8], &str) -> bool,
        client: &WebSocketClient,
    ) {
        debug!("received message: {}", String::from_utf8_lossy(raw));

        let pdu: ConsumerMessage = match serde_json::from_slice(raw) {
            Ok(pdu) => pdu,
            Err(err) => {
                error!(
                    "malformed json pdu: {}, error: {}",
                    String::from_utf8_lossy(raw),
                    err
                );
                return;
            }
        };

        let payload = match BASE64_STANDARD.decode(pdu.payload.unwrap_or_default()) {
            Ok(payload) => payload,
            Err(err) => {
                error!("malformed base64 payload: {}", err);
                return;
            }
        };
        let message_id = pdu.message_id.unwrap_or_else(|| "n/a".to_string());

        if callback(&payload, &message_id) {
            // Acknowledge the message
            let ack = json!({ "messageId": message_id }).to_string();
            if !client.send_text(&ack) {
                error!("error acknowledging message id {}", message_id);
            }
        }
    }
}

fn serialize_publish_message(payload: &[u8], context: &str) -> String {
    json!({
        "payload": BASE64_STANDARD.encode(payload),
        "context": context,
        "properties": { "key1": "val1" },
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::task::LocalSet;

    #[test]
    fn test_serialize_publish_message() {
        let envelope = serialize_publish_message(b"Hello world", "42");
        let value: serde_json::Value = serde_json::from_str(&envelope).unwrap();
        assert_eq!(value["context"], "42");
        assert_eq!(value["properties"]["key1"], "val1");
        let payload = BASE64_STANDARD
            .decode(value["payload"].as_str().unwrap())
            .unwrap();
        assert_eq!(payload, b"Hello world");
    }

    #[tokio::test]
    async fn test_contexts_are_unique_and_monotonic() {
        LocalSet::new()
            .run_until(async {
                let bridge = PulsarClient::new("ws://127.0.0.1:9");
                assert_eq!(bridge.create_context(), "0");
                assert_eq!(bridge.create_context(), "1");
                assert_eq!(bridge.create_context(), "2");
            })
            .await;
    }

    #[tokio::test]
    async fn test_queue_overflow_drops_oldest() {
        LocalSet::new()
            .run_until(async {
                // Nothing listens on the target, so the queue only fills
                let bridge = PulsarClient::with_max_queue_size("ws://127.0.0.1:9", 2);
                for payload in [b"A", b"B", b"C"] {
                    bridge.publish(payload, "tenant", "ns", "topic", |_, _, _| {});
                }

                let state = bridge.inner.borrow();
                assert_eq!(state.queue.len(), 2);
                let payloads: Vec<Vec<u8>> = state
                    .queue
                    .iter()
                    .map(|(_, envelope)| {
                        let value: serde_json::Value = serde_json::from_str(envelope).unwrap();
                        BASE64_STANDARD
                            .decode(value["payload"].as_str().unwrap())
                            .unwrap()
                    })
                    .collect();
                assert_eq!(payloads, vec![b"B".to_vec(), b"C".to_vec()]);
            })
            .await;
    }

    #[tokio::test]
    async fn test_duplicate_subscription_is_refused() {
        LocalSet::new()
            .run_until(async {
                let bridge = PulsarClient::new("ws://127.0.0.1:9");
                assert!(bridge.subscribe("tenant", "ns", "topic", "sub", |_, _| true));
                assert!(!bridge.subscribe("tenant", "ns", "topic", "sub", |_, _| true));
                // A different subscription name is a different URL
                assert!(bridge.subscribe("tenant", "ns", "topic", "other", |_, _| true));
            })
            .await;
    }

    #[tokio::test]
    async fn test_producer_and_consumer_urls() {
        LocalSet::new()
            .run_until(async {
                let bridge = PulsarClient::new("ws://broker:8080");
                bridge.publish(b"x", "public", "default", "my-topic", |_, _, _| {});
                bridge.subscribe("public", "default", "my-topic", "my-sub", |_, _| true);

                let state = bridge.inner.borrow();
                assert!(state
                    .clients
                    .contains_key("ws://broker:8080/ws/v2/producer/persistent/public/default/my-topic"));
                assert!(state.clients.contains_key(
                    "ws://broker:8080/ws/v2/consumer/persistent/public/default/my-topic/my-sub"
                ));
            })
            .await;
    }

    #[tokio::test]
    async fn test_all_published_messages_processed() {
        LocalSet::new()
            .run_until(async {
                let bridge = PulsarClient::new("ws://127.0.0.1:9");
                assert!(bridge.all_published_messages_processed());

                bridge.publish(b"A", "tenant", "ns", "topic", |_, _, _| {});
                assert!(!bridge.all_published_messages_processed());
            })
            .await;
    }
}
