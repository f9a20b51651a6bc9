//! Integration tests for the local event endpoint

#[cfg(feature = "server")]
mod server_tests {
    use std::sync::Arc;
    use std::time::Duration;
    use workflow_sensor_agent::config::BufferConfig;
    use workflow_sensor_agent::delivery::{DeliveryBuffer, MemorySink};
    use workflow_sensor_agent::monitor::InputContext;
    use workflow_sensor_agent::server::{run, ServerConfig, ServerState};

    fn buffer(sink: Arc<MemorySink>) -> DeliveryBuffer {
        let buffer = DeliveryBuffer::new(
            BufferConfig {
                batch_size: 2,
                max_batch_wait: Duration::from_secs(60),
                ..BufferConfig::default()
            },
            sink,
        )
        .unwrap();
        buffer.set_session("TEST-123");
        buffer
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let sink = Arc::new(MemorySink::new());
        let (addr, shutdown_tx) = run(ServerConfig::new(0), ServerState::new(buffer(sink)))
            .await
            .expect("Failed to start server");

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert!(body["version"].as_str().is_some());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_events_endpoint_counts_and_delivers() {
        let sink = Arc::new(MemorySink::new());
        let buffer = buffer(sink.clone());
        let (addr, shutdown_tx) = run(ServerConfig::new(0), ServerState::new(buffer.clone()))
            .await
            .expect("Failed to start server");

        let events = serde_json::json!([
            {
                "type": "prompt_submit",
                "session_id": "TEST-123",
                "timestamp": "2024-01-22T10:00:01Z",
                "app_id": "chatgpt"
            },
            {
                "type": "keystroke",
                "session_id": "TEST-123",
                "timestamp": "2024-01-22T10:00:02Z"
            },
            {
                "type": "app_focus",
                "session_id": "TEST-123",
                "timestamp": "2024-01-22T10:00:03Z",
                "app_id": "vscode"
            }
        ]);

        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://{}/events", addr))
            .json(&events)
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["accepted"], 2);
        assert_eq!(body["rejected"], 1);

        // Two accepted events fill one batch.
        buffer.flush().await;
        let delivered: Vec<String> = sink
            .events()
            .iter()
            .map(|e| e.app_id().to_string())
            .collect();
        assert_eq!(delivered, vec!["chatgpt", "vscode"]);

        let stats: serde_json::Value = client
            .get(format!("http://{}/stats", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(stats["buffer"]["sent"], 2);
        assert_eq!(stats["buffer"]["rejected"], 1);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_events_endpoint_rejects_non_events() {
        let sink = Arc::new(MemorySink::new());
        let (addr, shutdown_tx) = run(ServerConfig::new(0), ServerState::new(buffer(sink)))
            .await
            .expect("Failed to start server");

        let response = reqwest::Client::new()
            .post(format!("http://{}/events", addr))
            .json(&serde_json::json!("not an event"))
            .send()
            .await
            .expect("Failed to send request");

        assert_eq!(response.status().as_u16(), 400);
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["code"], "INVALID_BODY");

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_page_events_reach_the_input_context() {
        let sink = Arc::new(MemorySink::new());
        let input = InputContext::default();
        let mut rx = input.subscribe();
        let state = ServerState::new(buffer(sink)).with_input(input);
        let (addr, shutdown_tx) = run(ServerConfig::new(0), state)
            .await
            .expect("Failed to start server");

        let response = reqwest::Client::new()
            .post(format!("http://{}/page-events", addr))
            .json(&serde_json::json!({
                "hostname": "claude.ai",
                "type": "focus",
                "target": {"node_id": 4, "tag": "div", "contenteditable": true}
            }))
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["delivered_to"], 1);

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert_eq!(event.hostname, "claude.ai");
        assert_eq!(event.target.node_id, 4);

        let _ = shutdown_tx.send(());
    }
}
