use std::{fs, sync::Arc, time::Duration};

use anyhow::Result;
use httpmock::prelude::*;
use httpmock::Method::PATCH;
use lifehub::{
    config::AppConfig,
    flusher,
    server::{self, ServerState},
    state::AppContext,
    storage::FileQueueStore,
    sync::{HttpApiClient, SyncQueue},
};
use reqwest::Client;
use serde_json::{Value, json};
use serial_test::serial;
use tempfile::TempDir;
use tokio::{net::TcpListener, time::sleep};

mod common;

async fn start_service(root: &std::path::Path) -> Result<(AppContext, String, tokio::task::JoinHandle<Result<(), anyhow::Error>>)> {
    unsafe {
        std::env::set_var("LIFEHUB_APP_ROOT", root);
        std::env::set_var("LIFEHUB_SERVER_BIND", "127.0.0.1:0");
    }

    let config = AppConfig::load()?;
    let client = HttpApiClient::new(&config.sync.api_base)?;
    let store = FileQueueStore::new(&config.data_dir);
    let queue = SyncQueue::restore(Arc::new(store), Arc::new(client), config.sync.max_retries)?;
    let ctx = AppContext::new(config, Arc::new(queue));

    let (flusher_handle, _flusher_join) = flusher::spawn(ctx.clone());
    let state = ServerState::new(ctx.clone(), flusher_handle);

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server = tokio::spawn(server::serve_with_listener(listener, state));
    let base_url = format!("http://{}", addr);

    let probe = Client::new();
    let mut attempts = 0;
    loop {
        match probe.get(format!("{}/healthz", base_url)).send().await {
            Ok(response) if response.status().is_success() => break,
            _ if attempts > 20 => {
                anyhow::bail!("server did not become ready in time");
            }
            _ => {
                attempts += 1;
                sleep(Duration::from_millis(50)).await;
            }
        }
    }

    Ok((ctx, base_url, server))
}

fn clear_env() {
    unsafe {
        std::env::remove_var("LIFEHUB_APP_ROOT");
        std::env::remove_var("LIFEHUB_SERVER_BIND");
    }
}

#[tokio::test]
#[serial]
async fn queued_mutations_replay_upstream_and_survive_on_disk() -> Result<()> {
    let upstream = MockServer::start_async().await;
    let created = upstream
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/tasks")
                .json_body(json!({"title": "water plants"}));
            then.status(201);
        })
        .await;
    let removed = upstream
        .mock_async(|when, then| {
            when.method(DELETE).path("/api/tasks/3");
            then.status(204);
        })
        .await;
    let mut failing = upstream
        .mock_async(|when, then| {
            when.method(PATCH).path("/api/habits/1");
            then.status(500);
        })
        .await;

    let tmp = TempDir::new()?;
    let root = common::install_core_fixture(tmp.path(), &upstream.base_url())?;
    let (ctx, base_url, server) = start_service(&root).await?;
    let client = Client::new();

    for body in [
        json!({"endpoint": "/api/tasks", "method": "POST", "payload": {"title": "water plants"}}),
        json!({"endpoint": "/api/habits/1", "method": "PATCH", "payload": {"streak": 4}}),
        json!({"endpoint": "/api/tasks/3", "method": "DELETE"}),
    ] {
        let response = client
            .post(format!("{}/api/sync/queue", base_url))
            .json(&body)
            .send()
            .await?;
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    }

    let outcome: Value = client
        .post(format!("{}/api/sync/flush", base_url))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(outcome["attempted"], json!(3));
    assert_eq!(outcome["succeeded"], json!(2));
    assert_eq!(outcome["failed"], json!(1));

    created.assert_async().await;
    removed.assert_async().await;
    failing.assert_async().await;

    let queue_view: Value = client
        .get(format!("{}/api/sync/queue", base_url))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(queue_view["length"], json!(1));
    assert_eq!(queue_view["items"][0]["endpoint"], json!("/api/habits/1"));
    assert_eq!(queue_view["items"][0]["retry_count"], json!(1));

    // The stuck item is durable: it is on disk, not just in memory.
    let persisted = fs::read_to_string(ctx.config().data_dir.join("sync/queue.json"))?;
    let persisted: Value = serde_json::from_str(&persisted)?;
    assert_eq!(persisted.as_array().map(Vec::len), Some(1));
    assert_eq!(persisted[0]["method"], json!("PATCH"));

    // Once the upstream recovers, the next pass drains the backlog.
    failing.delete_async().await;
    let recovered = upstream
        .mock_async(|when, then| {
            when.method(PATCH).path("/api/habits/1");
            then.status(200);
        })
        .await;

    let outcome: Value = client
        .post(format!("{}/api/sync/flush", base_url))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(outcome["succeeded"], json!(1));
    recovered.assert_async().await;
    assert!(ctx.queue().is_empty());

    ctx.request_shutdown();
    server.await??;
    clear_env();
    Ok(())
}

#[tokio::test]
#[serial]
async fn dynamic_now_flow_via_http() -> Result<()> {
    let upstream = MockServer::start_async().await;
    let tmp = TempDir::new()?;
    let root = common::install_core_fixture(tmp.path(), &upstream.base_url())?;
    let (ctx, base_url, server) = start_service(&root).await?;
    let client = Client::new();

    let tasks = json!([
        {"id": "1", "energy_level": "high", "title": "Quarterly review"},
        {"id": "2", "energy_level": "medium"},
        {"id": "3"},
    ]);

    // Filter disabled by the fixture config: everything passes through.
    let result: Value = client
        .post(format!("{}/api/tasks/filter", base_url))
        .json(&json!({"tasks": tasks, "hour": 19}))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(result["visible_tasks"].as_array().map(Vec::len), Some(3));
    assert_eq!(result["hidden_reason"], Value::Null);

    let toggled: Value = client
        .post(format!("{}/api/now/toggle", base_url))
        .json(&json!({"enabled": true}))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(toggled["enabled"], json!(true));

    let result: Value = client
        .post(format!("{}/api/tasks/filter", base_url))
        .json(&json!({"tasks": tasks, "hour": 19}))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(result["visible_tasks"].as_array().map(Vec::len), Some(2));
    assert_eq!(result["hidden_tasks"][0]["id"], json!("1"));
    assert_eq!(
        result["hidden_reason"],
        json!("1 high-energy task hidden after 6pm")
    );
    assert_eq!(result["time_block"], json!("evening"));

    // Peeking folds the hidden task back in but keeps the notice.
    client
        .post(format!("{}/api/now/toggle", base_url))
        .json(&json!({"show_hidden": true}))
        .send()
        .await?;
    let result: Value = client
        .post(format!("{}/api/tasks/filter", base_url))
        .json(&json!({"tasks": tasks, "hour": 19}))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(result["visible_tasks"].as_array().map(Vec::len), Some(3));
    assert_eq!(result["visible_tasks"][2]["id"], json!("1"));
    assert_eq!(
        result["hidden_reason"],
        json!("1 high-energy task hidden after 6pm")
    );

    let now: Value = client
        .get(format!("{}/api/now", base_url))
        .send()
        .await?
        .json()
        .await?;
    assert!(now["hour"].as_u64().unwrap() < 24);
    assert_eq!(now["enabled"], json!(true));

    ctx.request_shutdown();
    server.await??;
    clear_env();
    Ok(())
}
