//! Basic dispatch example
//!
//! Fetches a post asynchronously, cancels a tagged batch, and performs one
//! blocking call.
//!
//! Run with: cargo run --example dispatch_basic [base-url]

use relay_http::{Client, ClientConfig, Priority, RequestBuilder, ResponseShape};
use serde::Deserialize;
use std::sync::mpsc;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct Post {
    id: u64,
    title: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let base = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://jsonplaceholder.typicode.com".to_string());

    println!("Relay Dispatch Basic Example");
    println!("============================\n");

    let client = Client::with_config(ClientConfig {
        user_agent: Some("relay-demo/0.1".to_string()),
        enable_logging: true,
        ..Default::default()
    })?;

    // Typed async request on the immediate pool.
    let (tx, rx) = mpsc::channel();
    client.get_as_parsed::<Post, _>(
        RequestBuilder::get(format!("{}/posts/{{id}}", base))
            .path_param("id", "1")
            .priority(Priority::Immediate)
            .build(),
        move |result| {
            let _ = tx.send(result);
        },
    )?;

    match rx.recv_timeout(Duration::from_secs(30))? {
        Ok(post) => println!("post {}: {}", post.id, post.title),
        Err(e) => println!("request failed: {}", e),
    }

    // A batch of low-priority requests, cancelled as a group.
    let (tx, rx) = mpsc::channel();
    for id in 1..=5 {
        let tx = tx.clone();
        client.get_as_json_array(
            RequestBuilder::get(format!("{}/comments", base))
                .query_param("postId", id.to_string())
                .tag("comments")
                .priority(Priority::Low)
                .build(),
            move |result| {
                let _ = tx.send((id, result.map(|items| items.len())));
            },
        )?;
    }
    drop(tx);
    client.cancel("comments");

    for (id, result) in rx {
        match result {
            Ok(count) => println!("comments {}: {} items", id, count),
            Err(e) if e.is_cancelled() => println!("comments {}: cancelled", id),
            Err(e) => println!("comments {}: {}", id, e),
        }
    }

    // Blocking call on this thread.
    match client.execute_blocking(
        RequestBuilder::get(format!("{}/posts/9999", base)).build(),
        ResponseShape::JsonObject,
    ) {
        Ok(response) => println!("unexpected success: {:?}", response.meta().map(|m| m.status)),
        Err(e) => println!("blocking call: code {} body {:?}", e.code(), e.body()),
    }

    client.shutdown();
    Ok(())
}
