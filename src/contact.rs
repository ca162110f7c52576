//! Client for the public contact-form relay.
use crate::bootstrap::InitService;
use crate::config::Contact;
use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

#[derive(Debug, Error)]
pub enum ContactError {
    #[error("invalid contact form: {0}")]
    Invalid(&'static str),
    #[error("contact endpoint returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed to reach contact endpoint: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub message: String,
}

impl ContactForm {
    pub fn validate(&self) -> Result<(), ContactError> {
        if self.name.trim().is_empty() {
            return Err(ContactError::Invalid("name must be non-empty"));
        }
        if !EMAIL_RE.is_match(self.email.trim()) {
            return Err(ContactError::Invalid("email is not a valid address"));
        }
        if self.message.trim().is_empty() {
            return Err(ContactError::Invalid("message must be non-empty"));
        }
        Ok(())
    }
}

/// Acknowledgement for one submitted form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactReceipt {
    pub request_id: Uuid,
    pub status: u16,
}

pub struct ContactClient {
    http: Client,
    endpoint: Url,
    initialized: AtomicBool,
}

impl fmt::Debug for ContactClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContactClient")
            .field("endpoint", &self.endpoint)
            .field("initialized", &self.initialized.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ContactClient {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("rangeops/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .no_proxy()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            endpoint,
            initialized: AtomicBool::new(false),
        })
    }

    pub fn from_config(cfg: &Contact) -> Result<Self> {
        let endpoint = Url::parse(cfg.endpoint.trim())
            .with_context(|| format!("invalid contact endpoint {}", cfg.endpoint))?;
        Self::new(endpoint, cfg.timeout())
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn build_request(
        &self,
        form: &ContactForm,
        request_id: Uuid,
    ) -> Result<reqwest::Request, ContactError> {
        Ok(self
            .http
            .post(self.endpoint.clone())
            .header("X-Request-Id", request_id.to_string())
            .json(form)
            .build()?)
    }

    pub async fn submit(&self, form: &ContactForm) -> Result<ContactReceipt, ContactError> {
        form.validate()?;
        let request_id = Uuid::new_v4();
        let request = self.build_request(form, request_id)?;
        info!(url = %request.url(), %request_id, "submitting contact form");

        let res = self.http.execute(request).await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(%status, %request_id, "contact endpoint rejected submission");
            return Err(ContactError::Status { status, body });
        }
        Ok(ContactReceipt {
            request_id,
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl InitService for ContactClient {
    fn name(&self) -> &str {
        "contact-relay"
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Any HTTP answer counts as reachable; only transport failures retry.
    async fn initialize(&self) -> Result<()> {
        let res = self
            .http
            .head(self.endpoint.clone())
            .send()
            .await
            .context("contact endpoint unreachable")?;
        info!(status = %res.status(), "contact endpoint reachable");
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> ContactForm {
        ContactForm {
            name: "Kim Lee".into(),
            email: "kim@example.org".into(),
            phone: None,
            company: Some("Lee Protection".into()),
            message: "Need a two-day course for six guards.".into(),
        }
    }

    #[test]
    fn validation() {
        assert!(form().validate().is_ok());

        let mut f = form();
        f.email = "not-an-email".into();
        assert!(matches!(f.validate(), Err(ContactError::Invalid(msg)) if msg.contains("email")));

        let mut f = form();
        f.name = "  ".into();
        assert!(matches!(f.validate(), Err(ContactError::Invalid(msg)) if msg.contains("name")));

        let mut f = form();
        f.message = String::new();
        assert!(matches!(f.validate(), Err(ContactError::Invalid(msg)) if msg.contains("message")));
    }

    #[test]
    fn request_shape() {
        let client = ContactClient::new(
            Url::parse("https://relay.example.com/api/contact").unwrap(),
            Duration::from_secs(15),
        )
        .unwrap();
        let id = Uuid::new_v4();
        let req = client.build_request(&form(), id).unwrap();
        assert_eq!(req.method(), &reqwest::Method::POST);
        assert_eq!(req.url().path(), "/api/contact");
        assert_eq!(req.headers()["X-Request-Id"], id.to_string().as_str());
        assert_eq!(req.headers()["Content-Type"], "application/json");

        let body = req.body().and_then(|b| b.as_bytes()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(body).unwrap();
        assert_eq!(json["email"], "kim@example.org");
        assert!(json.get("phone").is_none());
    }
}
