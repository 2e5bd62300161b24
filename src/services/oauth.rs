use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

use crate::core::config::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OAuthProvider {
    Google,
    Facebook,
    Linkedin,
}

impl OAuthProvider {
    pub(crate) fn from_path(value: &str) -> Option<Self> {
        match value {
            "google" => Some(Self::Google),
            "facebook" => Some(Self::Facebook),
            "linkedin" => Some(Self::Linkedin),
            _ => None,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Facebook => "facebook",
            Self::Linkedin => "linkedin",
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum OAuthError {
    #[error("oauth provider {0} is not configured")]
    NotConfigured(&'static str),
    #[error("oauth exchange failed: {0}")]
    Exchange(String),
    #[error("oauth provider returned no email")]
    MissingEmail,
}

/// Identity fields the callback needs to provision a local account.
#[derive(Debug, Clone)]
pub(crate) struct ProviderProfile {
    pub(crate) name: String,
    pub(crate) email: String,
}

#[derive(Debug, Clone)]
struct ProviderCredentials {
    client_id: String,
    client_secret: String,
}

#[derive(Debug, Clone)]
pub(crate) struct OAuthService {
    client: Client,
    redirect_base_url: String,
    google: ProviderCredentials,
    facebook: ProviderCredentials,
    linkedin: ProviderCredentials,
}

impl OAuthService {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;
        let oauth = settings.oauth();

        Ok(Self {
            client,
            redirect_base_url: oauth.redirect_base_url.trim_end_matches('/').to_string(),
            google: ProviderCredentials {
                client_id: oauth.google_client_id.clone(),
                client_secret: oauth.google_client_secret.clone(),
            },
            facebook: ProviderCredentials {
                client_id: oauth.facebook_app_id.clone(),
                client_secret: oauth.facebook_app_secret.clone(),
            },
            linkedin: ProviderCredentials {
                client_id: oauth.linkedin_client_id.clone(),
                client_secret: oauth.linkedin_client_secret.clone(),
            },
        })
    }

    fn credentials(&self, provider: OAuthProvider) -> Result<&ProviderCredentials, OAuthError> {
        let credentials = match provider {
            OAuthProvider::Google => &self.google,
            OAuthProvider::Facebook => &self.facebook,
            OAuthProvider::Linkedin => &self.linkedin,
        };
        if credentials.client_id.is_empty() || credentials.client_secret.is_empty() {
            return Err(OAuthError::NotConfigured(provider.as_str()));
        }
        Ok(credentials)
    }

    pub(crate) fn redirect_uri(&self, provider: OAuthProvider) -> String {
        format!("{}/auth/{}/callback", self.redirect_base_url, provider.as_str())
    }

    /// Builds the provider's consent URL carrying the anti-forgery state.
    pub(crate) fn authorize_url(
        &self,
        provider: OAuthProvider,
        state: &str,
    ) -> Result<String, OAuthError> {
        let credentials = self.credentials(provider)?;
        let redirect_uri = self.redirect_uri(provider);

        let (endpoint, scope) = match provider {
            OAuthProvider::Google => {
                ("https://accounts.google.com/o/oauth2/v2/auth", "openid email profile")
            }
            OAuthProvider::Facebook => {
                ("https://www.facebook.com/v18.0/dialog/oauth", "email,public_profile")
            }
            OAuthProvider::Linkedin => {
                ("https://www.linkedin.com/oauth/v2/authorization", "openid profile email")
            }
        };

        let mut url = reqwest::Url::parse(endpoint)
            .map_err(|err| OAuthError::Exchange(err.to_string()))?;
        url.query_pairs_mut()
            .append_pair("client_id", &credentials.client_id)
            .append_pair("redirect_uri", &redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", scope)
            .append_pair("state", state);
        Ok(url.to_string())
    }

    /// Exchanges the callback code for an access token and resolves the
    /// profile behind it.
    pub(crate) async fn exchange_code(
        &self,
        provider: OAuthProvider,
        code: &str,
    ) -> Result<ProviderProfile, OAuthError> {
        let credentials = self.credentials(provider)?;
        let redirect_uri = self.redirect_uri(provider);

        let token_endpoint = match provider {
            OAuthProvider::Google => "https://oauth2.googleapis.com/token",
            OAuthProvider::Facebook => "https://graph.facebook.com/v18.0/oauth/access_token",
            OAuthProvider::Linkedin => "https://www.linkedin.com/oauth/v2/accessToken",
        };

        let token_body: Value = self
            .client
            .post(token_endpoint)
            .form(&[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|err| OAuthError::Exchange(err.to_string()))?
            .json()
            .await
            .map_err(|err| OAuthError::Exchange(err.to_string()))?;

        let access_token = token_body
            .get("access_token")
            .and_then(|value| value.as_str())
            .ok_or_else(|| OAuthError::Exchange(format!("no access_token in {token_body}")))?;

        let profile_body: Value = match provider {
            OAuthProvider::Google => {
                self.fetch_profile("https://www.googleapis.com/oauth2/v2/userinfo", access_token)
                    .await?
            }
            OAuthProvider::Facebook => {
                self.fetch_profile(
                    "https://graph.facebook.com/me?fields=id,name,email",
                    access_token,
                )
                .await?
            }
            OAuthProvider::Linkedin => {
                self.fetch_profile("https://api.linkedin.com/v2/userinfo", access_token).await?
            }
        };

        let email = profile_body
            .get("email")
            .and_then(|value| value.as_str())
            .map(|value| value.to_lowercase())
            .ok_or(OAuthError::MissingEmail)?;
        let name = profile_body
            .get("name")
            .and_then(|value| value.as_str())
            .unwrap_or(&email)
            .to_string();

        Ok(ProviderProfile { name, email })
    }

    async fn fetch_profile(&self, url: &str, access_token: &str) -> Result<Value, OAuthError> {
        self.client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|err| OAuthError::Exchange(err.to_string()))?
            .json()
            .await
            .map_err(|err| OAuthError::Exchange(err.to_string()))
    }
}
