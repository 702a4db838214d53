//! reqwest-backed implementation of [`ImportGateway`]

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use xlio_common::events::clamp_percent;

use super::{
    EnqueueReceipt, Envelope, GatewayError, ImportGateway, SheetImportReceipt, TaskStatus,
    ValidatedWorkbook,
};
use crate::models::{RowRecord, SelectedFile};

const USER_AGENT: &str = concat!("xlio-import/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the import REST endpoints
pub struct HttpGateway {
    http_client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct TaskStatusData {
    #[serde(default)]
    state: String,
    #[serde(default)]
    percent: Option<f64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    result: Option<Value>,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn file_form(file: &SelectedFile) -> Result<Form, GatewayError> {
        let bytes = file
            .read_contents()
            .await
            .map_err(|e| GatewayError::File(e.to_string()))?;
        let part = Part::bytes(bytes).file_name(file.name().to_string());
        Ok(Form::new().part("file", part))
    }

    /// Read a response body as an envelope, enforcing both status layers
    async fn read_envelope<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Envelope<T>, GatewayError> {
        let http_status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        if !http_status.is_success() {
            let message = serde_json::from_str::<Envelope<Value>>(&body)
                .ok()
                .and_then(|env| env.message)
                .unwrap_or_else(|| http_status.canonical_reason().unwrap_or("error").to_string());
            return Err(GatewayError::Rejected {
                status: http_status.as_u16(),
                message,
            });
        }

        let envelope: Envelope<T> =
            serde_json::from_str(&body).map_err(|e| GatewayError::Parse(e.to_string()))?;

        if !envelope.is_success() {
            return Err(GatewayError::Rejected {
                status: envelope.status_code().unwrap_or(http_status.as_u16()),
                message: envelope.message.unwrap_or_default(),
            });
        }

        Ok(envelope)
    }
}

#[async_trait]
impl ImportGateway for HttpGateway {
    async fn validate(&self, file: &SelectedFile) -> Result<ValidatedWorkbook, GatewayError> {
        let form = Self::file_form(file).await?;

        tracing::debug!(file = %file.name(), size = file.size_bytes(), "POST /validate-excel");

        let response = self
            .http_client
            .post(self.url("validate-excel"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let envelope: Envelope<ValidatedWorkbook> = Self::read_envelope(response).await?;
        envelope
            .data
            .ok_or_else(|| GatewayError::Parse("validation response has no data".to_string()))
    }

    async fn enqueue_import(&self, file: &SelectedFile) -> Result<EnqueueReceipt, GatewayError> {
        let form = Self::file_form(file).await?;

        tracing::debug!(file = %file.name(), "POST /upload-excel");

        let response = self
            .http_client
            .post(self.url("upload-excel"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let envelope: Envelope<EnqueueReceipt> = Self::read_envelope(response).await?;
        Ok(envelope.data.unwrap_or_default())
    }

    async fn import_sheet(
        &self,
        sheet_name: &str,
        rows: &[RowRecord],
    ) -> Result<SheetImportReceipt, GatewayError> {
        tracing::debug!(sheet = sheet_name, rows = rows.len(), "POST /import-validated-data");

        let response = self
            .http_client
            .post(self.url("import-validated-data"))
            .json(&json!({ "sheet_name": sheet_name, "data": rows }))
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let envelope: Envelope<SheetImportReceipt> = Self::read_envelope(response).await?;
        Ok(envelope.data.unwrap_or_default())
    }

    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, GatewayError> {
        let response = self
            .http_client
            .get(self.url(&format!("task-status/{}", task_id)))
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        // FAILURE is reported with HTTP 500 but still carries the task data
        let http_status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;
        let envelope: Envelope<TaskStatusData> =
            serde_json::from_str(&body).map_err(|e| GatewayError::Parse(e.to_string()))?;

        let Some(data) = envelope.data else {
            return Err(GatewayError::Rejected {
                status: http_status.as_u16(),
                message: envelope.message.unwrap_or_default(),
            });
        };

        let status = match data.state.to_ascii_uppercase().as_str() {
            "PENDING" => TaskStatus::Pending,
            "PROGRESS" => TaskStatus::Running {
                percent: data.percent.map(clamp_percent).unwrap_or(0),
            },
            "SUCCESS" => TaskStatus::Succeeded {
                inserted: data
                    .result
                    .as_ref()
                    .and_then(|r| r.get("rows"))
                    .and_then(Value::as_u64),
            },
            "FAILURE" => TaskStatus::Failed {
                detail: data.error.unwrap_or_else(|| "task failed".to_string()),
            },
            other => TaskStatus::Other(other.to_string()),
        };

        Ok(status)
    }
}
