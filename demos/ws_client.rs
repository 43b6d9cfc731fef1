use pulsar_flow::config::ClientConfig;
use pulsar_flow::connection::WebSocketClient;
use pulsar_flow::event::WebSocketEvent;
use std::env;
use tokio::task::LocalSet;
use tokio::time::{interval, Duration};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    let url = env::args()
        .nth(1)
        .unwrap_or_else(|| String::from("ws://127.0.0.1:9001/"));

    LocalSet::new()
        .run_until(async move {
            let config = ClientConfig {
                ping_interval_secs: Some(30),
                ..Default::default()
            };
            let client = WebSocketClient::with_config(config);
            client.set_on_message_callback(|event| match event {
                WebSocketEvent::Open(info) => println!("connected to {}", info.uri),
                WebSocketEvent::Message { payload, binary } if !binary => {
                    println!("received: {}", String::from_utf8_lossy(payload))
                }
                WebSocketEvent::Message { payload, .. } => {
                    println!("received {} binary bytes", payload.len())
                }
                WebSocketEvent::Close(info) => {
                    println!("closed: {} {} remote={}", info.code, info.reason, info.remote)
                }
                WebSocketEvent::Error(info) => eprintln!("error: {}", info.reason),
                _ => {}
            });
            client.connect(&url);

            let mut ticker = interval(Duration::from_secs(5));
            loop {
                ticker.tick().await;
                if client.is_connected() && !client.send_text("Hello world") {
                    eprintln!("failed to send message");
                }
            }
        })
        .await;
}
