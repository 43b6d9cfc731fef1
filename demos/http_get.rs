use pulsar_flow::client;
use std::env;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    let url = env::args()
        .nth(1)
        .unwrap_or_else(|| String::from("http://127.0.0.1:8080/"));

    match client::get(&url).await {
        Ok(response) => {
            println!("{} {}", response.status_code, response.description);
            for (name, value) in &response.headers {
                println!("{}: {}", name, value);
            }
            match response.text() {
                Ok(body) => println!("\n{}", body),
                Err(_) => println!("\n({} binary bytes)", response.body.len()),
            }
        }
        Err(err) => eprintln!("request failed: {}", err),
    }
}
