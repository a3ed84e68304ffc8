//! services/api/src/adapters/functions.rs
//!
//! Implements `RemoteFunctions` against the hosted serverless runtime.
//!
//! The `advisorpro-api` function multiplexes several operations through one
//! `{ endpoint, method, body }` envelope. Callers never see it: each port
//! method builds an `AdvisorRequest` variant and only `envelope()` knows how
//! that variant is spelled on the wire.

use async_trait::async_trait;
use coaching_core::domain::PackageTemplate;
use coaching_core::ports::{
    CreatePackageRequest, HealthSubmission, PortError, PortResult, RemoteFunctions,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

const HEALTH_SUBMISSION_FUNCTION: &str = "business-health-submission";
const ADVISOR_FUNCTION: &str = "advisorpro-api";

/// The operations served by the multiplexed advisor function.
#[derive(Debug, Clone)]
enum AdvisorRequest<'a> {
    CoachPackages,
    CreatePackage(&'a CreatePackageRequest),
}

#[derive(Debug, Serialize)]
struct Envelope {
    endpoint: &'static str,
    method: &'static str,
    body: Value,
}

impl AdvisorRequest<'_> {
    fn envelope(&self) -> PortResult<Envelope> {
        Ok(match self {
            AdvisorRequest::CoachPackages => Envelope {
                endpoint: "/coach-packages",
                method: "GET",
                body: Value::Null,
            },
            AdvisorRequest::CreatePackage(request) => Envelope {
                endpoint: "/packages",
                method: "POST",
                body: serde_json::to_value(request)
                    .map_err(|e| PortError::Unexpected(e.to_string()))?,
            },
        })
    }
}

/// Every function answers with this shape.
#[derive(Debug, Deserialize)]
struct FunctionReply<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

#[derive(Clone)]
pub struct HttpFunctionsAdapter {
    http: Client,
    base_url: String,
    service_key: Option<String>,
}

impl HttpFunctionsAdapter {
    pub fn new(http: Client, base_url: String, service_key: Option<String>) -> Self {
        Self {
            http,
            base_url,
            service_key,
        }
    }

    async fn invoke<T: DeserializeOwned>(&self, function: &str, payload: &impl Serialize) -> PortResult<Option<T>> {
        let url = format!("{}/{}", self.base_url, function);
        let mut request = self.http.post(&url).json(payload);
        if let Some(key) = &self.service_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(PortError::Unauthorized);
        }

        let reply: FunctionReply<T> = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("{} returned an unreadable reply: {}", function, e)))?;

        if !status.is_success() || !reply.success {
            let message = reply.error.unwrap_or_else(|| format!("status {}", status));
            error!(function, %status, %message, "Remote function failed");
            return Err(PortError::Unexpected(message));
        }
        debug!(function, "Remote function succeeded");
        Ok(reply.data)
    }

    async fn advisor<T: DeserializeOwned>(&self, request: AdvisorRequest<'_>) -> PortResult<Option<T>> {
        let envelope = request.envelope()?;
        self.invoke(ADVISOR_FUNCTION, &envelope).await
    }
}

#[async_trait]
impl RemoteFunctions for HttpFunctionsAdapter {
    async fn submit_business_health(&self, submission: &HealthSubmission) -> PortResult<()> {
        self.invoke::<Value>(HEALTH_SUBMISSION_FUNCTION, submission).await?;
        Ok(())
    }

    async fn coach_packages(&self) -> PortResult<Vec<PackageTemplate>> {
        let templates = self
            .advisor::<Vec<PackageTemplate>>(AdvisorRequest::CoachPackages)
            .await?;
        Ok(templates.unwrap_or_default())
    }

    async fn create_package(&self, request: &CreatePackageRequest) -> PortResult<()> {
        self.advisor::<Value>(AdvisorRequest::CreatePackage(request)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn create_package_is_wrapped_in_envelope() {
        let request = CreatePackageRequest {
            report_id: Uuid::nil(),
            user_id: Uuid::nil(),
            package_name: "Growth".into(),
            documents: vec!["Plan".into()],
            credits_charged: 5,
        };
        let envelope = AdvisorRequest::CreatePackage(&request).envelope().unwrap();
        assert_eq!(envelope.endpoint, "/packages");
        assert_eq!(envelope.method, "POST");
        assert_eq!(envelope.body["packageName"], "Growth");
        assert_eq!(envelope.body["creditsCharged"], 5);
    }

    #[test]
    fn coach_packages_has_no_body() {
        let envelope = AdvisorRequest::CoachPackages.envelope().unwrap();
        assert_eq!(envelope.method, "GET");
        assert!(envelope.body.is_null());
    }

    #[test]
    fn failed_reply_parses_without_data() {
        let reply: FunctionReply<Value> =
            serde_json::from_str(r#"{"success": false, "error": "quota"}"#).unwrap();
        assert!(!reply.success);
        assert_eq!(reply.error.as_deref(), Some("quota"));
    }
}
