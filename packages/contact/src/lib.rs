#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Landowner contact lookup.
//!
//! The enrichment provider's API key only ever lives on the server. When
//! the provider is unavailable outside production, a fixed placeholder
//! contact is returned so the UI stays usable during development.

use std::sync::Arc;
use std::time::Duration;

use parcel_map_parcel_models::ContactInfo;
use parcel_map_parcel_models::events::{EventKind, EventReporter, ObservabilityEvent};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Path of the owner search endpoint, relative to the provider base URL.
pub const OWNER_SEARCH_PATH: &str = "/v1/direct-owner-search";

/// Default request timeout for the enrichment provider.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Placeholder phone number served outside production.
pub const PLACEHOLDER_PHONE: &str = "(573) 555-0123";
/// Placeholder email served outside production.
pub const PLACEHOLDER_EMAIL: &str = "landowner@missouri.com";
/// Placeholder mailing address served outside production.
pub const PLACEHOLDER_ADDRESS: &str = "123 Farm Road, Jefferson City, MO 65101";

/// The fixed placeholder contact.
#[must_use]
pub fn placeholder_contact() -> ContactInfo {
    ContactInfo {
        phone: Some(PLACEHOLDER_PHONE.to_string()),
        email: Some(PLACEHOLDER_EMAIL.to_string()),
        address: Some(PLACEHOLDER_ADDRESS.to_string()),
        verified: true,
    }
}

/// Errors from the enrichment provider itself.
#[derive(Debug, Error)]
pub enum ContactServiceError {
    /// Network failure, timeout, or unreadable body.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("Contact provider returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The response body was not a contact record.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },
}

/// Errors from [`ContactResolver::resolve`].
#[derive(Debug, Error)]
pub enum ContactError {
    /// The request was missing required input.
    #[error("{0}")]
    Validation(String),

    /// No provider is configured and placeholders are not allowed.
    #[error("Contact provider is not configured")]
    NotConfigured,

    /// The provider failed and placeholders are not allowed.
    #[error("Failed to fetch owner data: {0}")]
    Upstream(#[from] ContactServiceError),
}

/// An owner contact enrichment provider.
#[async_trait::async_trait]
pub trait ContactService: Send + Sync {
    /// Looks up contact details for an owner.
    ///
    /// # Errors
    ///
    /// Returns [`ContactServiceError`] if the provider is unreachable or
    /// answers with an error.
    async fn lookup(
        &self,
        owner_name: &str,
        parcel_id: Option<&str>,
    ) -> Result<ContactInfo, ContactServiceError>;
}

#[derive(Debug, Serialize)]
struct OwnerSearchRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parcel_id: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
struct OwnerSearchResponse {
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    verified: Option<bool>,
}

impl From<OwnerSearchResponse> for ContactInfo {
    fn from(value: OwnerSearchResponse) -> Self {
        let non_empty = |s: Option<String>| s.filter(|s| !s.trim().is_empty());
        Self {
            phone: non_empty(value.phone),
            email: non_empty(value.email),
            address: non_empty(value.address),
            verified: value.verified.unwrap_or(false),
        }
    }
}

/// Parses an owner search response body. Absent fields become `None` or
/// `false`.
///
/// # Errors
///
/// Returns [`ContactServiceError::Parse`] if the body is not a JSON object.
pub fn parse_contact_response(body: &str) -> Result<ContactInfo, ContactServiceError> {
    let response: OwnerSearchResponse =
        serde_json::from_str(body).map_err(|e| ContactServiceError::Parse {
            message: format!("Failed to parse contact response: {e}"),
        })?;
    Ok(response.into())
}

/// HTTP client for the enrichment provider.
pub struct ContactClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ContactClient {
    /// Creates a client for `base_url` authenticating with `api_key`.
    ///
    /// # Errors
    ///
    /// Returns [`ContactServiceError::Http`] if the HTTP client cannot be
    /// built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ContactServiceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn search_url(&self) -> String {
        format!("{}{OWNER_SEARCH_PATH}", self.base_url)
    }
}

#[async_trait::async_trait]
impl ContactService for ContactClient {
    async fn lookup(
        &self,
        owner_name: &str,
        parcel_id: Option<&str>,
    ) -> Result<ContactInfo, ContactServiceError> {
        let resp = self
            .client
            .post(self.search_url())
            .bearer_auth(&self.api_key)
            .json(&OwnerSearchRequest {
                name: owner_name,
                parcel_id,
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ContactServiceError::Status {
                status: resp.status().as_u16(),
            });
        }

        let body = resp.text().await?;
        parse_contact_response(&body)
    }
}

/// Resolves owner contacts, substituting the placeholder when allowed.
pub struct ContactResolver {
    service: Option<Arc<dyn ContactService>>,
    allow_placeholder: bool,
    reporter: Arc<dyn EventReporter>,
}

impl ContactResolver {
    /// Creates a resolver. `allow_placeholder` should be `false` in
    /// production.
    #[must_use]
    pub fn new(
        service: Option<Arc<dyn ContactService>>,
        allow_placeholder: bool,
        reporter: Arc<dyn EventReporter>,
    ) -> Self {
        Self {
            service,
            allow_placeholder,
            reporter,
        }
    }

    /// Looks up contact details for `owner_name`.
    ///
    /// # Errors
    ///
    /// * [`ContactError::Validation`] if `owner_name` is blank
    /// * [`ContactError::Upstream`] / [`ContactError::NotConfigured`] if the
    ///   provider cannot answer and placeholders are not allowed
    pub async fn resolve(
        &self,
        owner_name: &str,
        parcel_id: Option<&str>,
    ) -> Result<ContactInfo, ContactError> {
        let owner_name = owner_name.trim();
        if owner_name.is_empty() {
            return Err(ContactError::Validation(
                "Owner name is required".to_string(),
            ));
        }

        let result = match &self.service {
            Some(service) => service
                .lookup(owner_name, parcel_id)
                .await
                .map_err(ContactError::from),
            None => Err(ContactError::NotConfigured),
        };

        match result {
            Ok(contact) => Ok(contact),
            Err(e) if self.allow_placeholder => {
                self.reporter.report(
                    &ObservabilityEvent::new(
                        EventKind::ContactFallback,
                        "Contact provider unavailable, served placeholder contact",
                    )
                    .with("owner", owner_name)
                    .with("parcel_id", parcel_id.unwrap_or("-"))
                    .with("error", &e),
                );
                Ok(placeholder_contact())
            }
            Err(e) => {
                log::error!("Owner contact lookup failed for {owner_name:?}: {e}");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parcel_map_parcel_models::events::MemoryReporter;

    struct StubService(Option<ContactInfo>);

    #[async_trait::async_trait]
    impl ContactService for StubService {
        async fn lookup(
            &self,
            _owner_name: &str,
            _parcel_id: Option<&str>,
        ) -> Result<ContactInfo, ContactServiceError> {
            self.0
                .clone()
                .ok_or(ContactServiceError::Status { status: 503 })
        }
    }

    fn resolver(
        service: Option<ContactInfo>,
        allow_placeholder: bool,
    ) -> (ContactResolver, Arc<MemoryReporter>) {
        let reporter = Arc::new(MemoryReporter::new());
        let service: Arc<dyn ContactService> = Arc::new(StubService(service));
        (
            ContactResolver::new(Some(service), allow_placeholder, reporter.clone()),
            reporter,
        )
    }

    #[test]
    fn absent_fields_default() {
        let contact = parse_contact_response(r#"{"phone": "555-1000"}"#).unwrap();
        assert_eq!(contact.phone.as_deref(), Some("555-1000"));
        assert_eq!(contact.email, None);
        assert_eq!(contact.address, None);
        assert!(!contact.verified);

        let contact = parse_contact_response(r#"{"email": "", "verified": true}"#).unwrap();
        assert_eq!(contact.email, None);
        assert!(contact.verified);
    }

    #[test]
    fn non_object_body_is_parse_error() {
        assert!(matches!(
            parse_contact_response("not json"),
            Err(ContactServiceError::Parse { .. })
        ));
    }

    #[test]
    fn search_url_joins_path() {
        let client = ContactClient::new("https://api.example.com/", "k", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(
            client.search_url(),
            "https://api.example.com/v1/direct-owner-search"
        );
    }

    #[tokio::test]
    async fn provider_answer_is_returned() {
        let expected = ContactInfo {
            phone: Some("555-2000".to_string()),
            verified: true,
            ..ContactInfo::default()
        };
        let (resolver, reporter) = resolver(Some(expected.clone()), false);
        let contact = resolver.resolve("Smith, John", Some("17-1")).await.unwrap();
        assert_eq!(contact, expected);
        assert!(reporter.events().is_empty());
    }

    #[tokio::test]
    async fn blank_owner_is_rejected() {
        let (resolver, _) = resolver(None, true);
        assert!(matches!(
            resolver.resolve("   ", None).await,
            Err(ContactError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn development_failure_serves_placeholder() {
        let (resolver, reporter) = resolver(None, true);
        let contact = resolver.resolve("Smith, John", None).await.unwrap();
        assert_eq!(contact, placeholder_contact());
        assert_eq!(reporter.kinds(), vec![EventKind::ContactFallback]);
    }

    #[tokio::test]
    async fn production_failure_propagates() {
        let (resolver, reporter) = resolver(None, false);
        let err = resolver.resolve("Smith, John", None).await.unwrap_err();
        assert!(matches!(
            err,
            ContactError::Upstream(ContactServiceError::Status { status: 503 })
        ));
        assert!(reporter.events().is_empty());
    }

    #[tokio::test]
    async fn missing_provider_in_development_serves_placeholder() {
        let reporter = Arc::new(MemoryReporter::new());
        let resolver = ContactResolver::new(None, true, reporter.clone());
        let contact = resolver.resolve("Smith, John", None).await.unwrap();
        assert!(contact.verified);
        assert_eq!(reporter.kinds(), vec![EventKind::ContactFallback]);

        let resolver = ContactResolver::new(None, false, reporter);
        assert!(matches!(
            resolver.resolve("Smith, John", None).await,
            Err(ContactError::NotConfigured)
        ));
    }
}
