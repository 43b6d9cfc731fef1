use pulsar_flow::pulsar::PulsarClient;
use std::env;
use tokio::task::LocalSet;
use tokio::time::{interval, Duration};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    let base_url = env::args()
        .nth(1)
        .unwrap_or_else(|| String::from("ws://127.0.0.1:8080"));

    LocalSet::new()
        .run_until(async move {
            let bridge = PulsarClient::new(&base_url);

            let mut ticker = interval(Duration::from_secs(1));
            for i in 0..10u32 {
                ticker.tick().await;
                let payload = format!("message {}", i);
                bridge.publish(
                    payload.as_bytes(),
                    "public",
                    "default",
                    "my-topic",
                    |success, context, message_id| {
                        println!(
                            "publish context={} success={} messageId={}",
                            context, success, message_id
                        );
                    },
                );
            }

            // Let the in-flight publishes resolve before reporting
            while !bridge.all_published_messages_processed() {
                ticker.tick().await;
            }
            bridge.report_stats();
            bridge.close();
        })
        .await;
}
