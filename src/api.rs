//! A client for the hospital backend's REST API.
//!
//! Every dashboard page pairs the live alert channel with plain REST calls.
//! `ApiClient::request` is the shared request wrapper; the typed methods
//! below it cover the endpoints the doctor, nurse and admission pages use.

use crate::config::ApiConfig;
use reqwest::{header, Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Errors returned by the REST client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("session expired or unauthorized")]
    Unauthorized,
    #[error("login rejected for user '{0}'")]
    LoginFailed(String),
    #[error("request to {endpoint} failed with status {status}: {body}")]
    Status {
        endpoint: String,
        status: StatusCode,
        body: String,
    },
    #[error("request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A patient record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub age: u32,
    pub gender: Option<String>,
    /// `IN_PATIENT` or `OUT_PATIENT`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub doctor: Option<String>,
    pub nurse: Option<String>,
    pub room: Option<String>,
    pub condition: Option<String>,
    pub contact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admission_date: Option<String>,
}

impl Patient {
    /// The condition shown on dashboards; the backend defaults it to `Stable`.
    pub fn condition_or_default(&self) -> &str {
        self.condition.as_deref().unwrap_or("Stable")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MedicationStatus {
    Pending,
    Given,
}

/// A prescription for a patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    pub id: i64,
    pub patient_id: i64,
    pub medicine_name: String,
    pub status: MedicationStatus,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub role: String,
    pub username: Option<String>,
}

/// Client for the REST API rooted at `ApiConfig::base_url`.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Creates a client from configuration.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|source| ApiError::Http {
                endpoint: config.base_url.clone(),
                source,
            })?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Sends a request and decodes the JSON response.
    ///
    /// An empty response body decodes to an empty JSON object.
    #[instrument(skip(self, method, body), fields(method = %method))]
    pub async fn request(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let text = self.request_text(endpoint, method, body).await?;
        if text.is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        serde_json::from_str(&text).map_err(|source| ApiError::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
    }

    async fn request_text(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<&Value>,
    ) -> Result<String, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let http_error = |source| ApiError::Http {
            endpoint: endpoint.to_string(),
            source,
        };

        let mut request = self
            .http
            .request(method, &url)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.body(body.to_string());
        }

        let response = request.send().await.map_err(http_error)?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!(endpoint, "Session expired or unauthorized");
            return Err(ApiError::Unauthorized);
        }
        let text = response.text().await.map_err(http_error)?;
        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status,
                body: text,
            });
        }
        debug!(endpoint, %status, bytes = text.len(), "API request completed");
        Ok(text)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<&Value>,
    ) -> Result<T, ApiError> {
        let value = self.request(endpoint, method, body).await?;
        decode(endpoint, value)
    }

    /// Like `fetch`, but maps the backend's empty "not found" reply to `None`.
    async fn fetch_optional<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<&Value>,
    ) -> Result<Option<T>, ApiError> {
        let value = self.request(endpoint, method, body).await?;
        if value.as_object().is_some_and(|o| o.is_empty()) || value.is_null() {
            return Ok(None);
        }
        decode(endpoint, value).map(Some)
    }

    /// Logs in and keeps the returned token for later requests.
    ///
    /// # Returns
    /// * `Ok(role)` on success
    /// * `Err(ApiError::LoginFailed)` if the backend rejected the credentials
    pub async fn login(&mut self, username: &str, password: &str) -> Result<String, ApiError> {
        let body = json!({ "username": username, "password": password });
        let response: Option<LoginResponse> = self
            .fetch_optional("/auth/login", Method::POST, Some(&body))
            .await?;
        let response = response.ok_or_else(|| ApiError::LoginFailed(username.to_string()))?;
        self.token = Some(response.token);
        Ok(response.role)
    }

    pub async fn patients_for_doctor(&self, username: &str) -> Result<Vec<Patient>, ApiError> {
        self.fetch(&format!("/patients/doctor/{}", username), Method::GET, None)
            .await
    }

    pub async fn patients_for_nurse(&self, username: &str) -> Result<Vec<Patient>, ApiError> {
        self.fetch(&format!("/patients/nurse/{}", username), Method::GET, None)
            .await
    }

    pub async fn register_patient(&self, patient: &Patient) -> Result<Patient, ApiError> {
        let body = serde_json::to_value(patient).map_err(|source| ApiError::Decode {
            endpoint: "/patients/register".to_string(),
            source,
        })?;
        self.fetch("/patients/register", Method::POST, Some(&body))
            .await
    }

    /// Sets a patient's condition. The condition is sent as a JSON string.
    pub async fn update_condition(
        &self,
        patient_id: i64,
        condition: &str,
    ) -> Result<Option<Patient>, ApiError> {
        let body = Value::String(condition.to_string());
        self.fetch_optional(
            &format!("/patients/{}/condition", patient_id),
            Method::PUT,
            Some(&body),
        )
        .await
    }

    /// Discharges a patient and returns the backend's confirmation text.
    pub async fn discharge_patient(&self, patient_id: i64) -> Result<String, ApiError> {
        self.request_text(&format!("/patients/{}", patient_id), Method::DELETE, None)
            .await
    }

    pub async fn medications_for_patient(
        &self,
        patient_id: i64,
    ) -> Result<Vec<Medication>, ApiError> {
        self.fetch(
            &format!("/medications/patient/{}", patient_id),
            Method::GET,
            None,
        )
        .await
    }

    pub async fn add_medication(
        &self,
        patient_id: i64,
        medicine_name: &str,
    ) -> Result<Medication, ApiError> {
        let body = json!({ "patientId": patient_id, "medicineName": medicine_name });
        self.fetch("/medications/add", Method::POST, Some(&body))
            .await
    }

    /// Marks a medication as given.
    pub async fn give_medication(&self, medication_id: i64) -> Result<Option<Medication>, ApiError> {
        self.fetch_optional(
            &format!("/medications/{}/give", medication_id),
            Method::PUT,
            None,
        )
        .await
    }

    /// Returns the admin dashboard statistics as raw JSON.
    pub async fn admin_stats(&self) -> Result<Value, ApiError> {
        self.request("/admin/stats", Method::GET, None).await
    }
}

fn decode<T: DeserializeOwned>(endpoint: &str, value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|source| ApiError::Decode {
        endpoint: endpoint.to_string(),
        source,
    })
}
