use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum_test::TestServer;
use db::{KeyValueStore, MemoryStore, SqliteStore};
use events::EventBus;
use futures::StreamExt;
use orchestrator::{
    AdapterRegistry, CommandExecutor, ExecutionMode, OrchestrationEngine, OrchestratorConfig,
    SimulationConfig,
};
use serde_json::{json, Value};
use server::{create_router, routes, state::AppState};
use tempfile::TempDir;

fn instant_engine(store: Arc<dyn KeyValueStore>) -> OrchestrationEngine {
    let executor = CommandExecutor::new(ExecutionMode::DryRun, Arc::new(AdapterRegistry::new()))
        .with_simulation(SimulationConfig::instant());
    OrchestrationEngine::from_config(&OrchestratorConfig::default(), store, EventBus::new())
        .with_executor(executor)
}

fn setup_test_server() -> (TestServer, AppState) {
    let state = AppState::new(instant_engine(Arc::new(MemoryStore::new())));
    let server = TestServer::new(create_router(state.clone())).expect("Failed to create test server");
    (server, state)
}

async fn wait_for_status(server: &TestServer, job_id: &str, status: &str) -> Value {
    for _ in 0..400 {
        let body: Value = server.get(&format!("/api/jobs/{}", job_id)).await.json();
        if body["job"]["status"] == status {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {} never reached {}", job_id, status);
}

mod health {
    use super::*;

    #[tokio::test]
    async fn test_health_endpoint() {
        let (server, _state) = setup_test_server();

        let response = server.get("/health").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "ok");
    }
}

mod orchestrate {
    use super::*;

    #[tokio::test]
    async fn test_submit_accepts_and_completes() {
        let (server, _state) = setup_test_server();

        let response = server
            .post("/api/orchestrate")
            .json(&json!({ "description": "  A habit tracker  " }))
            .await;

        response.assert_status(axum::http::StatusCode::ACCEPTED);
        let body: Value = response.json();
        assert_eq!(body["status"], "queued");
        assert_eq!(body["message"], "Orchestration request accepted.");
        let job_id = body["jobId"].as_str().unwrap().to_string();
        assert!(job_id.starts_with("job_"));

        let details = wait_for_status(&server, &job_id, "completed").await;
        assert_eq!(details["job"]["description"], "A habit tracker");

        let steps = details["steps"].as_array().unwrap();
        assert_eq!(steps.len(), 14);
        assert!(steps.iter().all(|s| s["status"] == "success"));
        let ids: Vec<u64> = steps.iter().map(|s| s["id"].as_u64().unwrap()).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
    }

    #[tokio::test]
    async fn test_empty_description_rejected() {
        let (server, state) = setup_test_server();

        for payload in [json!({ "description": "   " }), json!({}), json!({ "description": 4 })] {
            let response = server.post("/api/orchestrate").json(&payload).await;
            response.assert_status_bad_request();
        }

        assert!(state.engine.list_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_json_rejected() {
        let (server, _state) = setup_test_server();

        let response = server.post("/api/orchestrate").text("not json").await;

        response.assert_status_bad_request();
        let body: Value = response.json();
        assert_eq!(body["error"], "bad_request");
    }

    #[tokio::test]
    async fn test_list_jobs() {
        let (server, _state) = setup_test_server();

        let empty: Value = server.get("/api/orchestrate").await.json();
        assert_eq!(empty["jobs"], json!([]));

        for description in ["First app", "Second app"] {
            server
                .post("/api/orchestrate")
                .json(&json!({ "description": description }))
                .await
                .assert_status(axum::http::StatusCode::ACCEPTED);
        }

        let response = server.get("/api/orchestrate").await;
        response.assert_status_ok();
        let body: Value = response.json();
        let descriptions: Vec<&str> = body["jobs"]
            .as_array()
            .unwrap()
            .iter()
            .map(|job| job["description"].as_str().unwrap())
            .collect();
        assert_eq!(descriptions, vec!["First app", "Second app"]);
    }
}

mod jobs {
    use super::*;

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let (server, _state) = setup_test_server();

        let response = server.get("/api/jobs/job_0_0").await;

        response.assert_status_not_found();
        let body: Value = response.json();
        assert_eq!(body["error"], "not_found");
        assert_eq!(body["message"], "Job job_0_0 not found.");
    }

    #[tokio::test]
    async fn test_jobs_survive_restart_with_sqlite() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_url = format!("sqlite:{}", temp_dir.path().join("jobs.db").display());

        let job_id = {
            let store = SqliteStore::connect(&db_url).await.expect("Failed to open store");
            let state = AppState::new(instant_engine(Arc::new(store)));
            let server = TestServer::new(create_router(state)).expect("Failed to create test server");

            let body: Value = server
                .post("/api/orchestrate")
                .json(&json!({ "description": "Durable app" }))
                .await
                .json();
            let job_id = body["jobId"].as_str().unwrap().to_string();
            wait_for_status(&server, &job_id, "completed").await;
            job_id
        };

        let store = SqliteStore::connect(&db_url).await.expect("Failed to reopen store");
        let state = AppState::new(instant_engine(Arc::new(store)));
        let server = TestServer::new(create_router(state)).expect("Failed to create test server");

        let response = server.get(&format!("/api/jobs/{}", job_id)).await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["job"]["status"], "completed");
        assert_eq!(body["steps"].as_array().unwrap().len(), 14);
    }
}

mod events_stream {
    use super::*;

    async fn next_frame(stream: &mut (impl futures::Stream<Item = Result<axum::body::Bytes, axum::Error>> + Unpin)) -> String {
        let chunk = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("body error");
        String::from_utf8(chunk.to_vec()).unwrap()
    }

    fn frame_event(frame: &str) -> Value {
        let data = frame
            .lines()
            .find_map(|line| line.strip_prefix("data: "))
            .expect("frame without data");
        serde_json::from_str(data).unwrap()
    }

    #[tokio::test]
    async fn test_stream_starts_with_ack_then_relays_broadcasts() {
        let (_server, state) = setup_test_server();

        let response = routes::sse::events_stream(State(state.clone()))
            .await
            .into_response();
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "text/event-stream"
        );
        assert_eq!(state.event_bus.client_count(), 1);

        let mut body = response.into_body().into_data_stream();

        let ack = frame_event(&next_frame(&mut body).await);
        assert_eq!(ack["type"], "connection:ack");

        let job = state.engine.create_job("Streamed app").await.unwrap();
        let queued = frame_event(&next_frame(&mut body).await);
        assert_eq!(queued["type"], "job:queued");
        assert_eq!(queued["jobId"], job.id.as_str());
        assert_eq!(queued["description"], "Streamed app");
    }

    #[tokio::test]
    async fn test_dropping_stream_unregisters_client() {
        let (_server, state) = setup_test_server();

        let response = routes::sse::events_stream(State(state.clone()))
            .await
            .into_response();
        assert_eq!(state.event_bus.client_count(), 1);

        drop(response);

        assert_eq!(state.event_bus.client_count(), 0);
    }
}
