//! HttpGateway tests against a local axum server

use axum::extract::{Multipart, Path};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::time::Duration;
use xlio_import::gateway::{GatewayError, HttpGateway, ImportGateway, TaskStatus};
use xlio_import::models::SelectedFile;

async fn validate_excel(mut multipart: Multipart) -> impl IntoResponse {
    let mut filename = String::new();
    let mut size = 0usize;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("file") {
            filename = field.file_name().unwrap_or_default().to_string();
            size = field.bytes().await.map(|b| b.len()).unwrap_or(0);
        }
    }

    if filename.contains("reject") {
        // Error reported in the envelope with HTTP 200
        return Json(json!({"status": 400, "message": "Sheet 'Users' is missing column 'email'"}));
    }

    Json(json!({
        "status": 200,
        "message": "ok",
        "data": {
            "filename": filename,
            "sheets": [
                {
                    "sheet_name": "Users",
                    "total_rows": size,
                    "columns": ["username", "email"],
                    "preview": [{"username": "ana", "email": "ana@example.com"}]
                }
            ]
        }
    }))
}

async fn upload_excel() -> Json<Value> {
    Json(json!({"status": "success", "message": "queued", "data": {"task_id": "t-123"}}))
}

async fn import_validated_data(Json(body): Json<Value>) -> impl IntoResponse {
    let sheet = body["sheet_name"].as_str().unwrap_or_default().to_string();
    let rows = body["data"].as_array().map(|a| a.len()).unwrap_or(0);

    if sheet == "Broken" {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"status": 500, "message": "duplicate key 'username'"})),
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "status": 200,
            "data": {
                "inserted": rows,
                "skipped": [{"row": 3, "sheet": sheet, "reason": "Duplicado"}]
            }
        })),
    )
}

async fn task_status(Path(task_id): Path<String>) -> impl IntoResponse {
    match task_id.as_str() {
        "t-done" => (
            StatusCode::OK,
            Json(json!({"status": 200, "data": {"state": "SUCCESS", "result": {"rows": 12}}})),
        ),
        "t-failed" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"status": 500, "message": "failed", "data": {"state": "FAILURE", "error": "bad row 7"}})),
        ),
        "t-running" => (
            StatusCode::OK,
            Json(json!({"status": 200, "data": {"state": "PROGRESS", "percent": 42.5}})),
        ),
        _ => (
            StatusCode::OK,
            Json(json!({"status": 200, "data": {"state": "PENDING"}})),
        ),
    }
}

async fn start_server() -> String {
    let app = Router::new()
        .route("/validate-excel", post(validate_excel))
        .route("/upload-excel", post(upload_excel))
        .route("/import-validated-data", post(import_validated_data))
        .route("/task-status/:task_id", get(task_status));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn gateway() -> HttpGateway {
    HttpGateway::new(start_server().await, Duration::from_secs(5)).unwrap()
}

fn rows(count: usize) -> Vec<serde_json::Map<String, Value>> {
    (0..count)
        .filter_map(|i| json!({"username": format!("u{}", i)}).as_object().cloned())
        .collect()
}

#[tokio::test]
async fn test_validate_sends_multipart_file() {
    let gateway = gateway().await;
    let file = SelectedFile::from_bytes("report.xlsx", vec![7u8; 42]);

    let workbook = gateway.validate(&file).await.unwrap();

    assert_eq!(workbook.filename, "report.xlsx");
    assert_eq!(workbook.sheets.len(), 1);
    assert_eq!(workbook.sheets[0].name, "Users");
    assert_eq!(workbook.sheets[0].total_rows, 42);
    assert_eq!(workbook.sheets[0].preview.len(), 1);
    assert!(workbook.sheets[0].full_data.is_none());
}

#[tokio::test]
async fn test_envelope_error_status_is_rejected() {
    let gateway = gateway().await;
    let file = SelectedFile::from_bytes("reject-me.xlsx", vec![1, 2, 3]);

    match gateway.validate(&file).await {
        Err(GatewayError::Rejected { status, message }) => {
            assert_eq!(status, 400);
            assert!(message.contains("missing column"));
        }
        other => panic!("expected Rejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_upload_returns_task_id() {
    let gateway = gateway().await;
    let receipt = gateway
        .enqueue_import(&SelectedFile::from_bytes("one.xlsx", vec![0u8; 8]))
        .await
        .unwrap();
    assert_eq!(receipt.task_id.as_deref(), Some("t-123"));
}

#[tokio::test]
async fn test_import_sheet_receipt_and_http_error() {
    let gateway = gateway().await;

    let receipt = gateway.import_sheet("Users", &rows(4)).await.unwrap();
    assert_eq!(receipt.inserted, Some(4));
    assert_eq!(receipt.skipped.len(), 1);
    assert_eq!(receipt.skipped[0].reason, "Duplicado");

    match gateway.import_sheet("Broken", &rows(1)).await {
        Err(GatewayError::Rejected { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "duplicate key 'username'");
        }
        other => panic!("expected Rejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_task_status_states() {
    let gateway = gateway().await;

    assert_eq!(
        gateway.task_status("t-done").await.unwrap(),
        TaskStatus::Succeeded { inserted: Some(12) }
    );
    assert_eq!(
        gateway.task_status("t-failed").await.unwrap(),
        TaskStatus::Failed {
            detail: "bad row 7".to_string()
        }
    );
    assert_eq!(
        gateway.task_status("t-running").await.unwrap(),
        TaskStatus::Running { percent: 42 }
    );
    assert_eq!(
        gateway.task_status("anything").await.unwrap(),
        TaskStatus::Pending
    );
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let gateway = HttpGateway::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
    let result = gateway
        .validate(&SelectedFile::from_bytes("a.xlsx", vec![0]))
        .await;
    assert!(matches!(result, Err(GatewayError::Network(_))));
}
