use pulsar_flow::pulsar::PulsarClient;
use std::env;
use tokio::task::LocalSet;
use tokio::time::{sleep, Duration};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    let base_url = env::args()
        .nth(1)
        .unwrap_or_else(|| String::from("ws://127.0.0.1:8080"));

    LocalSet::new()
        .run_until(async move {
            let bridge = PulsarClient::new(&base_url);
            bridge.subscribe(
                "public",
                "default",
                "my-topic",
                "my-sub",
                |payload, message_id| {
                    println!(
                        "consumed messageId={} payload={}",
                        message_id,
                        String::from_utf8_lossy(payload)
                    );
                    // Acknowledge everything we managed to print
                    true
                },
            );

            loop {
                sleep(Duration::from_secs(60)).await;
            }
        })
        .await;
}
