//! Backend API client
//!
//! Thin request/response wrappers around the verification service. Every call
//! is a single attempt; callers decide how to surface failures.

use chrono::NaiveDate;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::navigator::{route_url, verification_url};

const PING_ROUTE: &str = "/api/admin/ping";
const REGISTER_ROUTE: &str = "/api/admin/register";
const MARK_CHECKED_ROUTE: &str = "/admin/reports/mark_checked";
const VERIFY_API_ROUTE: &str = "/api/verify";
const REPORT_ROUTE: &str = "/api/report";

/// Date format used by the backend and by HTML date inputs
const DATE_FORMAT: &str = "%Y-%m-%d";
/// How much of a non-JSON error body is shown to the operator
const ERROR_BODY_PREVIEW: usize = 100;

/// Client-side rejection, raised before any request is sent
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please fill in all fields.")]
    MissingFields(Vec<&'static str>),
    #[error("{field} must be a date in YYYY-MM-DD format (got {value:?})")]
    InvalidDate { field: &'static str, value: String },
    #[error("Batch number is required to report.")]
    MissingBatchNumber,
    #[error("Please enter a batch number.")]
    EmptyBatchNumber,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// Server answered with a JSON `{error}` body
    #[error("{0}")]
    Rejected(String),
    /// Server answered with a non-JSON error body
    #[error("Server error: {0}")]
    Server(String),
    #[error("server returned {0}")]
    Status(StatusCode),
    #[error("Unexpected response type: {0}")]
    UnexpectedContentType(String),
    #[error("invalid server URL {0}")]
    InvalidBaseUrl(String),
}

// ---------------------------------------------------------------------------
// Request and response bodies
// ---------------------------------------------------------------------------

/// New drug batch, as entered by the operator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRegistration {
    pub name: String,
    pub batch_number: String,
    pub mfg_date: String,
    pub expiry_date: String,
    pub manufacturer: String,
}

impl BatchRegistration {
    /// Trim every field and check the form is complete.
    pub fn validated(&self) -> Result<Self, ValidationError> {
        let trimmed = Self {
            name: self.name.trim().to_string(),
            batch_number: self.batch_number.trim().to_string(),
            mfg_date: self.mfg_date.trim().to_string(),
            expiry_date: self.expiry_date.trim().to_string(),
            manufacturer: self.manufacturer.trim().to_string(),
        };

        let missing: Vec<&'static str> = [
            ("name", &trimmed.name),
            ("batch_number", &trimmed.batch_number),
            ("mfg_date", &trimmed.mfg_date),
            ("expiry_date", &trimmed.expiry_date),
            ("manufacturer", &trimmed.manufacturer),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(field, _)| field)
        .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields(missing));
        }

        for (field, value) in [
            ("mfg_date", &trimmed.mfg_date),
            ("expiry_date", &trimmed.expiry_date),
        ] {
            if NaiveDate::parse_from_str(value, DATE_FORMAT).is_err() {
                return Err(ValidationError::InvalidDate {
                    field,
                    value: value.clone(),
                });
            }
        }

        Ok(trimmed)
    }
}

/// Counterfeit report filed by an end user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterfeitReport {
    pub drug_name: String,
    pub batch_number: String,
    pub location: String,
    pub note: String,
}

impl CounterfeitReport {
    /// Trim every field; only the batch number is required.
    pub fn validated(&self) -> Result<Self, ValidationError> {
        let trimmed = Self {
            drug_name: self.drug_name.trim().to_string(),
            batch_number: self.batch_number.trim().to_string(),
            location: self.location.trim().to_string(),
            note: self.note.trim().to_string(),
        };
        if trimmed.batch_number.is_empty() {
            return Err(ValidationError::MissingBatchNumber);
        }
        Ok(trimmed)
    }
}

/// Authenticity verdict for a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Valid,
    Expired,
    Counterfeit,
    #[serde(other)]
    Unknown,
}

impl VerificationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Valid => "Valid",
            Self::Expired => "Expired",
            Self::Counterfeit => "Counterfeit",
            Self::Unknown => "Unknown status",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VerificationResult {
    pub status: VerificationStatus,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SuccessBody {
    #[serde(default)]
    success: bool,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client bound to one backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base: Url,
}

impl ApiClient {
    pub fn new(base: Url) -> Self {
        Self {
            http: Client::new(),
            base,
        }
    }

    /// Parse a base URL such as `http://127.0.0.1:5000`.
    pub fn from_base_str(base: &str) -> Result<Self, ApiError> {
        Url::parse(base)
            .map(Self::new)
            .map_err(|e| ApiError::InvalidBaseUrl(format!("{base}: {e}")))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn url(&self, route: &str) -> Url {
        route_url(&self.base, route)
    }

    fn url_with_segment(&self, route: &str, segment: &str) -> Url {
        let mut url = self.url(route);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(segment);
        }
        url
    }

    /// Tell the backend the admin session is still in use. Any 2xx counts.
    pub async fn ping(&self) -> Result<(), ApiError> {
        let res = self.http.post(self.url(PING_ROUTE)).send().await?;
        let status = res.status();
        debug!(%status, "keep-alive response");
        if status.is_success() {
            Ok(())
        } else {
            Err(ApiError::Status(status))
        }
    }

    /// Register a batch and return the PNG of its scannable code.
    ///
    /// The form is validated first; an incomplete form never reaches the network.
    pub async fn register_batch(&self, batch: &BatchRegistration) -> Result<Vec<u8>, ApiError> {
        let batch = batch.validated()?;
        info!(batch_number = %batch.batch_number, "registering batch");

        let res = self
            .http
            .post(self.url(REGISTER_ROUTE))
            .json(&batch)
            .send()
            .await?;

        let content_type = content_type(&res);
        if !res.status().is_success() {
            return Err(error_from_response(res, &content_type).await);
        }
        if content_type.contains("image/png") {
            Ok(res.bytes().await?.to_vec())
        } else {
            Err(ApiError::UnexpectedContentType(content_type))
        }
    }

    /// Mark a counterfeit report as reviewed. Returns the server's `success` flag.
    pub async fn mark_report_checked(&self, report_id: &str) -> Result<bool, ApiError> {
        let res = self
            .http
            .post(self.url_with_segment(MARK_CHECKED_ROUTE, report_id))
            .send()
            .await?;
        let body: SuccessBody = res.json().await?;
        Ok(body.success)
    }

    /// Inline verification (JSON) of a batch number.
    pub async fn verify_batch(&self, batch_number: &str) -> Result<VerificationResult, ApiError> {
        let batch_number = batch_number.trim();
        if batch_number.is_empty() {
            return Err(ValidationError::EmptyBatchNumber.into());
        }
        let res = self
            .http
            .get(self.url_with_segment(VERIFY_API_ROUTE, batch_number))
            .send()
            .await?;
        Ok(res.json().await?)
    }

    /// File a counterfeit report. Returns the server's confirmation message.
    pub async fn submit_report(&self, report: &CounterfeitReport) -> Result<String, ApiError> {
        let report = report.validated()?;
        info!(batch_number = %report.batch_number, "submitting report");
        let res = self
            .http
            .post(self.url(REPORT_ROUTE))
            .json(&report)
            .send()
            .await?;
        let body: MessageBody = res.json().await?;
        Ok(body
            .message
            .unwrap_or_else(|| "Report submitted successfully".to_string()))
    }

    /// Server-rendered verification page for a batch.
    pub fn verification_page(&self, batch_number: &str) -> Result<Url, ValidationError> {
        verification_url(&self.base, batch_number).ok_or(ValidationError::EmptyBatchNumber)
    }
}

fn content_type(res: &Response) -> String {
    res.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn error_from_response(res: Response, content_type: &str) -> ApiError {
    let status = res.status();
    if content_type.contains("application/json") {
        return match res.json::<ErrorBody>().await {
            Ok(body) => ApiError::Rejected(body.error.unwrap_or_else(|| "Unknown error".into())),
            Err(e) => {
                warn!(%status, "unreadable error body: {}", e);
                ApiError::Status(status)
            }
        };
    }
    match res.text().await {
        Ok(text) => ApiError::Server(text.chars().take(ERROR_BODY_PREVIEW).collect()),
        Err(_) => ApiError::Status(status),
    }
}
