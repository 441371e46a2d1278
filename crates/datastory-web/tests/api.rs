use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use datastory_agents::Scheduler;
use datastory_sandbox::FigureStore;
use datastory_storage::{DatasetCatalog, InMemoryMetadataStore, InMemoryObjectStore};
use datastory_test_utils::fixtures::sales_csv;
use datastory_test_utils::{Reply, ScriptedBackend, StubExecutor};
use datastory_web::{build_router, AppState};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "datastory-test-boundary";

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a str),
}

fn multipart(parts: &[Part]) -> Body {
    let mut body = String::new();
    for part in parts {
        body.push_str(&format!("--{BOUNDARY}\r\n"));
        match part {
            Part::Text(name, value) => {
                body.push_str(&format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"));
            }
            Part::File(name, filename, contents) => {
                body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                     Content-Type: text/csv\r\n\r\n{contents}\r\n"
                ));
            }
        }
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    Body::from(body)
}

fn post_form(uri: &str, parts: &[Part]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(multipart(parts))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

struct TestApp {
    router: Router,
    figures: FigureStore,
    _dir: TempDir,
}

fn app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(
        ScriptedBackend::new()
            .on("background research", Reply::Json(json!({"summary": "Retail context."})))
            .on("Write Python code", Reply::text("results = {'top_region': 'north'}"))
            .on(
                "data story",
                Reply::Json(json!({
                    "title": "Growth", "summary": "North led.", "sections": [],
                    "insights": ["North"], "next_steps": []
                })),
            ),
    );
    let exec = Arc::new(StubExecutor::succeeding(json!({"top_region": "north"})));
    let figures = FigureStore::new(dir.path());
    let scheduler = Arc::new(Scheduler::standard(llm, exec, figures.clone()));
    let catalog = DatasetCatalog::new(Arc::new(InMemoryObjectStore::new()), Arc::new(InMemoryMetadataStore::new()));

    let router = build_router(AppState::new(scheduler, catalog, figures.clone()));
    TestApp { router, figures, _dir: dir }
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(resp: axum::response::Response) -> String {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn upload(app: &TestApp) -> Value {
    let csv = sales_csv();
    let resp = app
        .router
        .clone()
        .oneshot(post_form(
            "/api/datasets",
            &[Part::File("file", "sales.csv", &csv), Part::Text("description", "Monthly sales")],
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    body_json(resp).await
}

fn data_frames(body: &str) -> Vec<Value> {
    body.split("\n\n")
        .filter_map(|frame| frame.strip_prefix("data: "))
        .filter(|data| *data != "{}")
        .map(|data| serde_json::from_str(data).unwrap())
        .collect()
}

#[tokio::test]
async fn test_dataset_lifecycle() {
    let app = app();
    let created = upload(&app).await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["rows"], 24);
    assert_eq!(created["description"], "Monthly sales");
    assert_eq!(created["columns"], json!(["date", "revenue", "region"]));

    let resp = app.router.clone().oneshot(get(&format!("/api/datasets/{id}/meta"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let meta = body_json(resp).await;
    assert_eq!(meta["rows"], 24);
    assert!(meta["summary"]["revenue"]["mean"].is_number());
    assert!(meta.get("id").is_none());

    let resp = app.router.clone().oneshot(get("/api/datasets")).await.unwrap();
    let listed = body_json(resp).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/api/datasets/{id}"))
        .body(Body::empty())
        .unwrap();
    let resp = app.router.clone().oneshot(delete).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app.router.clone().oneshot(get(&format!("/api/datasets/{id}/meta"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(body_json(resp).await["detail"].as_str().unwrap().contains(&id));
}

#[tokio::test]
async fn test_list_pagination() {
    let app = app();
    for _ in 0..3 {
        upload(&app).await;
    }
    let resp = app.router.clone().oneshot(get("/api/datasets?skip=1&limit=1")).await.unwrap();
    assert_eq!(body_json(resp).await.as_array().unwrap().len(), 1);
    let resp = app.router.clone().oneshot(get("/api/datasets?skip=2")).await.unwrap();
    assert_eq!(body_json(resp).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_upload_without_file_is_rejected() {
    let app = app();
    let resp = app
        .router
        .clone()
        .oneshot(post_form("/api/datasets", &[Part::Text("description", "nothing")]))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_analyze_registered_dataset_streams_stages_then_done() {
    let app = app();
    let id = upload(&app).await["id"].as_str().unwrap().to_string();

    let resp = app
        .router
        .clone()
        .oneshot(post_form(
            "/api/analyze",
            &[Part::Text("query", "what drove growth"), Part::Text("dataset_id", &id)],
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/event-stream"));

    let body = body_text(resp).await;
    assert!(body.ends_with("event: done\ndata: {}\n\n"));
    assert_eq!(body.matches("event: done").count(), 1);

    let frames = data_frames(&body);
    let stages: Vec<String> = frames
        .iter()
        .map(|f| f["data"].as_object().unwrap().keys().next().unwrap().clone())
        .collect();
    assert_eq!(stages.len(), 4);
    assert_eq!(stages.last().unwrap(), "story");
    assert!(frames.iter().all(|f| f["timestamp"].is_string()));
    assert!(frames[3]["data"]["story"]["display"].as_str().unwrap().starts_with("# Growth"));
}

#[tokio::test]
async fn test_analyze_uploaded_file() {
    let app = app();
    let csv = sales_csv();
    let resp = app
        .router
        .clone()
        .oneshot(post_form(
            "/api/analyze",
            &[Part::Text("query", "what drove growth"), Part::File("file", "sales.csv", &csv)],
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_text(resp).await;
    let eda = data_frames(&body).into_iter().find(|f| f["data"].get("eda").is_some()).unwrap();
    assert_eq!(eda["data"]["eda"]["dataset_info"]["rows"], 24);
}

#[tokio::test]
async fn test_analyze_requires_query_and_dataset() {
    let app = app();
    let resp = app
        .router
        .clone()
        .oneshot(post_form("/api/analyze", &[Part::Text("dataset_id", "abc")]))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .router
        .clone()
        .oneshot(post_form("/api/analyze", &[Part::Text("query", "why")]))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .router
        .clone()
        .oneshot(post_form("/api/analyze", &[Part::Text("query", "why"), Part::Text("dataset_id", "missing")]))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_figures_are_served_by_name() {
    let app = app();
    let png = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    let path = app.figures.save_png("run1", "figure_0", &png).await.unwrap();
    let name = path.file_name().unwrap().to_str().unwrap().to_string();

    let resp = app.router.clone().oneshot(get(&format!("/api/figures/{name}"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes.as_ref(), &png);

    let resp = app.router.clone().oneshot(get("/api/figures/..%2Fsecret.png")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let resp = app.router.clone().oneshot(get("/api/figures/nope.png")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
