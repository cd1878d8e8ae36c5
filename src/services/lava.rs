//! Lava payment metering client.
//!
//! Model calls can be routed through Lava's forward proxy so that usage is
//! metered per connection. The forward token is a base64-encoded JSON
//! document carrying the account secrets.
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Value, json};

use crate::models::config::Settings;
use crate::services::{ServiceError, ServiceResult};

const LAVA_API_BASE: &str = "https://api.lavapayments.com/v1";

#[derive(Clone)]
pub struct LavaClient {
    http: reqwest::Client,
    secret_key: String,
    connection_secret: String,
    product_secret: String,
    enabled: bool,
}

impl LavaClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key: settings.lava_secret_key.clone(),
            connection_secret: settings.lava_connection_secret.clone(),
            product_secret: settings.lava_product_secret.clone(),
            enabled: settings.enable_lava,
        }
    }

    pub fn disabled() -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key: String::new(),
            connection_secret: String::new(),
            product_secret: String::new(),
            enabled: false,
        }
    }

    /// Metering is only usable with both the flag and a secret key set.
    pub fn enabled(&self) -> bool {
        self.enabled && !self.secret_key.is_empty()
    }

    /// Proxy endpoint that forwards to `target` while metering the call.
    pub fn forward_url(&self, target: &str) -> String {
        format!("{LAVA_API_BASE}/forward?u={target}")
    }

    /// Bearer token for the forward proxy: base64 of the secrets document.
    pub fn forward_token(&self) -> String {
        let mut claims = json!({
            "secret_key": self.secret_key,
            "connection_secret": self.connection_secret,
        });
        if !self.product_secret.is_empty() {
            claims["product_secret"] = Value::String(self.product_secret.clone());
        }
        STANDARD.encode(claims.to_string())
    }

    /// Account-level usage totals.
    pub async fn usage(&self) -> ServiceResult<Value> {
        if !self.enabled() {
            return Err(ServiceError::Disabled("lava"));
        }
        let response = self
            .http
            .get(format!("{LAVA_API_BASE}/usage"))
            .bearer_auth(&self.secret_key)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Paged list of metered requests.
    pub async fn requests(
        &self,
        limit: Option<u32>,
        cursor: Option<&str>,
    ) -> ServiceResult<Value> {
        if !self.enabled() {
            return Err(ServiceError::Disabled("lava"));
        }
        let mut query: Vec<(&str, String)> =
            vec![("limit", limit.unwrap_or(50).to_string())];
        if let Some(cursor) = cursor {
            query.push(("starting_after", cursor.to_string()));
        }
        let response = self
            .http
            .get(format!("{LAVA_API_BASE}/requests"))
            .query(&query)
            .bearer_auth(&self.secret_key)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Configuration summary exposed on the status endpoint.
    pub fn status(&self) -> Value {
        json!({
            "enabled": self.enabled(),
            "configured": !self.secret_key.is_empty(),
            "has_connection_secret": !self.connection_secret.is_empty(),
            "has_product_secret": !self.product_secret.is_empty(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(enable: bool, secret: &str) -> Settings {
        let mut settings = Settings::from_vars(&[]).unwrap();
        settings.enable_lava = enable;
        settings.lava_secret_key = secret.to_string();
        settings.lava_connection_secret = "conn_123".to_string();
        settings
    }

    #[test]
    fn enabled_requires_flag_and_secret() {
        assert!(!LavaClient::new(&settings(false, "sk_live")).enabled());
        assert!(!LavaClient::new(&settings(true, "")).enabled());
        assert!(LavaClient::new(&settings(true, "sk_live")).enabled());
    }

    #[test]
    fn forward_token_encodes_secrets() {
        let client = LavaClient::new(&settings(true, "sk_live"));
        let decoded = STANDARD.decode(client.forward_token()).unwrap();
        let claims: Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(claims["secret_key"], "sk_live");
        assert_eq!(claims["connection_secret"], "conn_123");
        assert!(claims.get("product_secret").is_none());
    }

    #[test]
    fn forward_token_includes_product_secret_when_set() {
        let mut settings = settings(true, "sk_live");
        settings.lava_product_secret = "prod_9".to_string();
        let client = LavaClient::new(&settings);
        let decoded = STANDARD.decode(client.forward_token()).unwrap();
        let claims: Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(claims["product_secret"], "prod_9");
    }

    #[test]
    fn status_reports_configuration() {
        let status = LavaClient::new(&settings(true, "sk_live")).status();
        assert_eq!(status["enabled"], true);
        assert_eq!(status["has_connection_secret"], true);
        assert_eq!(status["has_product_secret"], false);

        let status = LavaClient::disabled().status();
        assert_eq!(status["enabled"], false);
        assert_eq!(status["configured"], false);
    }

    #[tokio::test]
    async fn disabled_client_refuses_api_calls() {
        let client = LavaClient::disabled();
        assert!(matches!(
            client.usage().await,
            Err(ServiceError::Disabled(_))
        ));
        assert!(matches!(
            client.requests(None, None).await,
            Err(ServiceError::Disabled(_))
        ));
    }
}
