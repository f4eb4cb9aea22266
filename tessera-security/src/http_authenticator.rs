//! HTTP reference authenticator
//!
//! Posts the credentials as request headers to an external endpoint and picks
//! the external session id out of a response header. The session id is handed
//! back as a session option so downstream functions can forward it.

use crate::provider::{AuthenticationProvider, SecurityExtension};
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use std::time::Duration;
use tessera_core::{
    ErrorContext, MissingSessionTokenPolicy, OptionScope, OptionValue, ProviderConfig,
    TesseraError, TesseraResult,
};
use tracing::{debug, info, warn};
use url::Url;

/// Session option under which the external session id is stored
pub const SESSION_ID_OPTION: &str = "security.user.auth.custom_authenticator_session_id";

const COMPONENT: &str = "http_authenticator";

struct Endpoint {
    client: reqwest::Client,
    url: Url,
    user_header: HeaderName,
    password_header: HeaderName,
    session_id_header: HeaderName,
    missing_token_policy: MissingSessionTokenPolicy,
}

/// Authenticator backed by an external HTTP login endpoint
#[derive(Default)]
pub struct CustomHttpAuthenticator {
    endpoint: Option<Endpoint>,
}

impl CustomHttpAuthenticator {
    pub const TYPE: &'static str = "customAuthenticator";

    pub fn new() -> Self {
        Self::default()
    }

    fn header_name(value: &str, key: &str) -> TesseraResult<HeaderName> {
        HeaderName::from_bytes(value.as_bytes()).map_err(|e| {
            TesseraError::provider_startup(
                format!("Invalid header name '{}' for custom_authenticator.{}", value, key),
                Some(Box::new(e)),
                COMPONENT,
            )
        })
    }

    /// Send the login request; any error here becomes a uniform auth failure
    async fn request_session_id(
        endpoint: &Endpoint,
        user: &str,
        password: &str,
    ) -> Result<Option<String>, String> {
        let user_value = HeaderValue::from_str(user).map_err(|e| format!("bad user header: {}", e))?;
        let mut password_value =
            HeaderValue::from_str(password).map_err(|e| format!("bad password header: {}", e))?;
        password_value.set_sensitive(true);

        let response = endpoint
            .client
            .post(endpoint.url.clone())
            .header(endpoint.user_header.clone(), user_value)
            .header(endpoint.password_header.clone(), password_value)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("endpoint answered HTTP {}", status.as_u16()));
        }

        // The last occurrence wins when the header is repeated
        match response
            .headers()
            .get_all(&endpoint.session_id_header)
            .iter()
            .last()
        {
            Some(value) => value
                .to_str()
                .map(|s| Some(s.to_string()))
                .map_err(|e| format!("unreadable session id header: {}", e)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SecurityExtension for CustomHttpAuthenticator {
    async fn setup(&mut self, config: &ProviderConfig) -> TesseraResult<()> {
        let settings = &config.security.custom_authenticator;

        let url = Url::parse(&format!("{}{}", settings.protocol, settings.url)).map_err(|e| {
            TesseraError::ProviderStartup {
                message: format!(
                    "Invalid authenticator endpoint '{}{}': {}",
                    settings.protocol, settings.url, e
                ),
                source: Some(Box::new(e)),
                context: ErrorContext::new(COMPONENT)
                    .with_operation("setup")
                    .with_suggestion("Set custom_authenticator.protocol and custom_authenticator.url"),
            }
        })?;

        if settings.timeout_seconds == 0 {
            return Err(TesseraError::provider_startup(
                "custom_authenticator.timeout_seconds must be greater than 0",
                None,
                COMPONENT,
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|e| {
                TesseraError::provider_startup(
                    format!("Failed to create HTTP client: {}", e),
                    Some(Box::new(e)),
                    COMPONENT,
                )
            })?;

        self.endpoint = Some(Endpoint {
            client,
            url,
            user_header: Self::header_name(&settings.user_header, "user_header")?,
            password_header: Self::header_name(&settings.password_header, "password_header")?,
            session_id_header: Self::header_name(
                &settings.session_id_header,
                "session_id_header",
            )?,
            missing_token_policy: config.security.missing_session_token_policy,
        });

        info!(endpoint = %format!("{}{}", settings.protocol, settings.url), "HTTP authenticator configured");
        Ok(())
    }

    async fn close(&self) -> TesseraResult<()> {
        // reqwest pools are dropped with the client
        Ok(())
    }
}

#[async_trait]
impl AuthenticationProvider for CustomHttpAuthenticator {
    async fn authenticate(&self, user: &str, password: &str) -> TesseraResult<Vec<OptionValue>> {
        let endpoint = self.endpoint.as_ref().ok_or_else(|| TesseraError::Internal {
            message: "HTTP authenticator used before setup".to_string(),
            source: None,
            context: ErrorContext::new(COMPONENT).with_operation("authenticate"),
        })?;

        let session_id = match Self::request_session_id(endpoint, user, password).await {
            Ok(session_id) => session_id,
            Err(reason) => {
                warn!(user = user, reason = %reason, "Authentication failed");
                return Err(TesseraError::authentication_failed(user, COMPONENT));
            }
        };

        match session_id {
            Some(session_id) => {
                debug!(user = user, "Authentication succeeded");
                Ok(vec![OptionValue::string(
                    OptionScope::Session,
                    SESSION_ID_OPTION,
                    session_id,
                )])
            }
            None => match endpoint.missing_token_policy {
                MissingSessionTokenPolicy::Accept => {
                    debug!(user = user, "Authentication succeeded without a session id");
                    Ok(Vec::new())
                }
                MissingSessionTokenPolicy::Reject => {
                    warn!(user = user, reason = "missing session id header", "Authentication failed");
                    Err(TesseraError::authentication_failed(user, COMPONENT))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::ServerConfig;

    #[tokio::test]
    async fn test_setup_rejects_malformed_endpoint() {
        let mut config = ServerConfig::default();
        config.security.custom_authenticator.protocol = "not a scheme".to_string();
        config.security.custom_authenticator.url = "::".to_string();

        let mut authenticator = CustomHttpAuthenticator::new();
        let result = authenticator.setup(&config.into_provider_config()).await;
        assert!(matches!(result, Err(TesseraError::ProviderStartup { .. })));
    }

    #[tokio::test]
    async fn test_setup_rejects_invalid_header_name() {
        let mut config = ServerConfig::default();
        config.security.custom_authenticator.url = "localhost/login".to_string();
        config.security.custom_authenticator.user_header = "bad header".to_string();

        let mut authenticator = CustomHttpAuthenticator::new();
        let result = authenticator.setup(&config.into_provider_config()).await;
        assert!(matches!(result, Err(TesseraError::ProviderStartup { .. })));
    }

    #[tokio::test]
    async fn test_setup_rejects_zero_timeout() {
        let mut config = ServerConfig::default();
        config.security.custom_authenticator.url = "localhost/login".to_string();
        config.security.custom_authenticator.timeout_seconds = 0;

        let mut authenticator = CustomHttpAuthenticator::new();
        let result = authenticator.setup(&config.into_provider_config()).await;
        assert!(matches!(result, Err(TesseraError::ProviderStartup { .. })));
        assert!(authenticator.endpoint.is_none());
    }

    #[tokio::test]
    async fn test_authenticate_before_setup_is_internal_error() {
        let authenticator = CustomHttpAuthenticator::new();
        let result = authenticator.authenticate("alice", "secret").await;
        assert!(matches!(result, Err(TesseraError::Internal { .. })));
    }
}
