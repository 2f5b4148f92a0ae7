use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;

use crate::error::{Error, Result};

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Where the device flow talks to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OAuthEndpoints {
    pub device_code_url: String,
    pub access_token_url: String,
    pub identity_url: String,
}

impl OAuthEndpoints {
    #[must_use]
    pub fn github() -> Self {
        Self::from_base_urls("https://github.com/login", "https://api.github.com")
    }

    /// Derives the three endpoints from the provider's login and API bases.
    #[must_use]
    pub fn from_base_urls(provider_url: &str, api_url: &str) -> Self {
        let mut endpoints = Self {
            device_code_url: String::new(),
            access_token_url: String::new(),
            identity_url: String::new(),
        };
        endpoints.set_provider_url(provider_url);
        endpoints.set_api_url(api_url);
        endpoints
    }

    /// Points the device code and access token endpoints at `provider_url`.
    pub fn set_provider_url(&mut self, provider_url: &str) {
        let provider_url = provider_url.trim_end_matches('/');
        self.device_code_url = format!("{provider_url}/device/code");
        self.access_token_url = format!("{provider_url}/oauth/access_token");
    }

    pub fn set_api_url(&mut self, api_url: &str) {
        self.identity_url = format!("{}/user", api_url.trim_end_matches('/'));
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceCode {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    /// Seconds until the device code expires.
    pub expires_in: u64,
    /// Minimum seconds between two access token polls.
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

/// The provider's verdict on one access token poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenPoll {
    Granted { access_token: String },
    AuthorizationPending,
    SlowDown { interval: Option<u64> },
    ExpiredToken,
    UnsupportedGrantType,
    IncorrectClientCredentials,
    IncorrectDeviceCode,
    AccessDenied,
    /// An error code outside the device flow vocabulary.
    Unrecognized { code: String, description: Option<String> },
}

/// The subset of the provider's user profile the identity layer keeps.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderIdentity {
    pub login: String,
    pub node_id: String,
}

/// An OAuth 2.0 device authorization provider.
///
/// Transport failures are returned as errors; protocol level answers from
/// the token endpoint are returned as [`TokenPoll`] values.
#[async_trait]
pub trait DeviceFlowProvider: Send + Sync {
    async fn request_device_code(&self) -> Result<DeviceCode>;

    async fn poll_access_token(&self, device_code: &str) -> Result<TokenPoll>;

    async fn fetch_identity(&self, access_token: &str) -> Result<ProviderIdentity>;
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
    interval: Option<u64>,
}

impl TokenBody {
    fn into_poll(self) -> Result<TokenPoll> {
        if let Some(code) = self.error {
            return Ok(match code.as_str() {
                "authorization_pending" => TokenPoll::AuthorizationPending,
                "slow_down" => TokenPoll::SlowDown {
                    interval: self.interval,
                },
                "expired_token" => TokenPoll::ExpiredToken,
                "unsupported_grant_type" => TokenPoll::UnsupportedGrantType,
                "incorrect_client_credentials" => TokenPoll::IncorrectClientCredentials,
                "incorrect_device_code" => TokenPoll::IncorrectDeviceCode,
                "access_denied" => TokenPoll::AccessDenied,
                _ => TokenPoll::Unrecognized {
                    code,
                    description: self.error_description,
                },
            });
        }

        match self.access_token {
            Some(access_token) if !access_token.is_empty() => {
                Ok(TokenPoll::Granted { access_token })
            }
            _ => Err(Error::Provider(
                "token response carried neither a token nor an error".into(),
            )),
        }
    }
}

/// Device flow client for GitHub and any provider speaking the same wire
/// format.
#[derive(Clone)]
pub struct GithubClient {
    client: Client,
    client_id: String,
    endpoints: OAuthEndpoints,
}

impl GithubClient {
    pub fn new(client_id: impl Into<String>, endpoints: OAuthEndpoints) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("headb/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            client_id: client_id.into(),
            endpoints,
        })
    }
}

#[async_trait]
impl DeviceFlowProvider for GithubClient {
    async fn request_device_code(&self) -> Result<DeviceCode> {
        let resp = self
            .client
            .post(&self.endpoints.device_code_url)
            .header(ACCEPT, "application/json")
            .form(&[("client_id", self.client_id.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Provider(format!(
                "device code request failed with status {status}"
            )));
        }

        Ok(resp.json().await?)
    }

    async fn poll_access_token(&self, device_code: &str) -> Result<TokenPoll> {
        let resp = self
            .client
            .post(&self.endpoints.access_token_url)
            .header(ACCEPT, "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("device_code", device_code),
                ("grant_type", DEVICE_CODE_GRANT),
            ])
            .send()
            .await?;

        // Errors arrive as JSON bodies regardless of status.
        let body: TokenBody = resp.json().await?;
        body.into_poll()
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<ProviderIdentity> {
        let resp = self
            .client
            .get(&self.endpoints.identity_url)
            .header(ACCEPT, "application/vnd.github.v3+json")
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Provider(format!(
                "identity request failed with status {status}"
            )));
        }

        Ok(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(json: &str) -> TokenBody {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_github_endpoints() {
        let endpoints = OAuthEndpoints::github();
        assert_eq!(endpoints.device_code_url, "https://github.com/login/device/code");
        assert_eq!(
            endpoints.access_token_url,
            "https://github.com/login/oauth/access_token"
        );
        assert_eq!(endpoints.identity_url, "https://api.github.com/user");
    }

    #[test]
    fn test_from_base_urls_trims_slashes() {
        let endpoints = OAuthEndpoints::from_base_urls("http://127.0.0.1:9000/", "http://127.0.0.1:9000/api/");
        assert_eq!(endpoints.device_code_url, "http://127.0.0.1:9000/device/code");
        assert_eq!(endpoints.identity_url, "http://127.0.0.1:9000/api/user");
    }

    #[test]
    fn test_granted() {
        let poll = body(r#"{"access_token":"AT","token_type":"bearer","scope":""}"#)
            .into_poll()
            .unwrap();
        assert_eq!(
            poll,
            TokenPoll::Granted {
                access_token: "AT".into()
            }
        );
    }

    #[test]
    fn test_error_codes() {
        let cases = [
            ("authorization_pending", TokenPoll::AuthorizationPending),
            ("expired_token", TokenPoll::ExpiredToken),
            ("unsupported_grant_type", TokenPoll::UnsupportedGrantType),
            ("incorrect_client_credentials", TokenPoll::IncorrectClientCredentials),
            ("incorrect_device_code", TokenPoll::IncorrectDeviceCode),
            ("access_denied", TokenPoll::AccessDenied),
        ];
        for (code, expected) in cases {
            let json = format!(r#"{{"error":"{code}","error_description":"x"}}"#);
            assert_eq!(body(&json).into_poll().unwrap(), expected, "{code}");
        }
    }

    #[test]
    fn test_slow_down_keeps_server_interval() {
        let poll = body(r#"{"error":"slow_down","interval":10}"#).into_poll().unwrap();
        assert_eq!(poll, TokenPoll::SlowDown { interval: Some(10) });

        let poll = body(r#"{"error":"slow_down"}"#).into_poll().unwrap();
        assert_eq!(poll, TokenPoll::SlowDown { interval: None });
    }

    #[test]
    fn test_unknown_error_code() {
        let poll = body(r#"{"error":"teapot","error_description":"short and stout"}"#)
            .into_poll()
            .unwrap();
        assert!(matches!(poll, TokenPoll::Unrecognized { code, .. } if code == "teapot"));
    }

    #[test]
    fn test_empty_body_is_error() {
        assert!(body("{}").into_poll().is_err());
    }

    #[test]
    fn test_device_code_default_interval() {
        let code: DeviceCode = serde_json::from_str(
            r#"{"device_code":"d","user_code":"U-1","verification_uri":"https://x","expires_in":900}"#,
        )
        .unwrap();
        assert_eq!(code.interval, 5);
    }
}
