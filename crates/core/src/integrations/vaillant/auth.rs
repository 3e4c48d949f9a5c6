use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use regex::Regex;
use reqwest::header::LOCATION;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::config::VaillantCredentials;
use crate::error::{ToolError, ToolResult};

pub const IDENTITY_BASE: &str = "https://identity.vaillant-group.com/auth/realms";
const CLIENT_ID: &str = "myvaillant";
const REDIRECT_URI: &str = "enduservaillant.page.link://login";

#[derive(Debug, Clone)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
}

pub fn realm(brand: &str, country: &str) -> String {
    format!(
        "{}-{}-b2c",
        brand.trim().to_lowercase(),
        country.trim().to_lowercase()
    )
}

pub fn realm_url(identity_base: &str, credentials: &VaillantCredentials) -> String {
    format!(
        "{}/{}",
        identity_base.trim_end_matches('/'),
        realm(&credentials.brand, &credentials.country)
    )
}

pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    pub fn generate() -> Self {
        let verifier = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        );
        Self::from_verifier(verifier)
    }

    pub fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}

pub fn login_form_action(html: &str) -> Option<String> {
    let re = Regex::new(r#"<form[^>]*\saction="([^"]+)""#).ok()?;
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().replace("&amp;", "&"))
}

pub fn authorization_code(location: &str) -> Option<String> {
    let re = Regex::new(r"[?&#]code=([^&#]+)").ok()?;
    re.captures(location)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

async fn error_for(response: reqwest::Response) -> ToolError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ToolError::http(status, body)
}

/// Authorization-code login with PKCE. The client must not follow redirects, since
/// the code arrives in the `Location` header of the credentials post.
pub async fn login(
    client: &Client,
    identity_base: &str,
    credentials: &VaillantCredentials,
) -> ToolResult<Token> {
    let realm_url = realm_url(identity_base, credentials);
    let pkce = Pkce::generate();

    let page = client
        .get(format!("{}/protocol/openid-connect/auth", realm_url))
        .query(&[
            ("response_type", "code"),
            ("client_id", CLIENT_ID),
            ("code", "code_challenge"),
            ("redirect_uri", REDIRECT_URI),
            ("code_challenge_method", "S256"),
            ("code_challenge", pkce.challenge.as_str()),
        ])
        .send()
        .await?;
    if !page.status().is_success() {
        return Err(error_for(page).await);
    }

    let html = page.text().await?;
    let action = login_form_action(&html)
        .ok_or_else(|| ToolError::external("Vaillant login page did not contain a login form"))?;

    let submitted = client
        .post(&action)
        .form(&[
            ("username", credentials.email.as_str()),
            ("password", credentials.password.as_str()),
            ("credentialId", ""),
        ])
        .send()
        .await?;

    let code = submitted
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .and_then(authorization_code)
        .ok_or_else(|| ToolError::external("Vaillant login failed, check email and password"))?;

    let response = client
        .post(format!("{}/protocol/openid-connect/token", realm_url))
        .form(&[
            ("grant_type", "authorization_code"),
            ("client_id", CLIENT_ID),
            ("code", code.as_str()),
            ("code_verifier", pkce.verifier.as_str()),
            ("redirect_uri", REDIRECT_URI),
        ])
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(error_for(response).await);
    }

    let token: TokenResponse = response.json().await?;
    tracing::debug!(realm = %realm(&credentials.brand, &credentials.country), "logged in to myVAILLANT");

    Ok(Token {
        access_token: token.access_token,
        refresh_token: token.refresh_token,
    })
}

pub async fn logout(client: &Client, realm_url: &str, refresh_token: &str) -> ToolResult<()> {
    let response = client
        .post(format!("{}/protocol/openid-connect/logout", realm_url))
        .form(&[("client_id", CLIENT_ID), ("refresh_token", refresh_token)])
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(error_for(response).await);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realm_combines_brand_and_country() {
        assert_eq!(realm("Vaillant", "Germany"), "vaillant-germany-b2c");
        assert_eq!(realm("bulex", "belgium"), "bulex-belgium-b2c");
    }

    #[test]
    fn pkce_challenge_is_s256_of_verifier() {
        // RFC 7636 appendix B
        let pkce = Pkce::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string());
        assert_eq!(pkce.challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");

        let generated = Pkce::generate();
        assert_eq!(generated.verifier.len(), 64);
        assert_eq!(generated.challenge.len(), 43);
    }

    #[test]
    fn form_action_is_unescaped() {
        let html = r#"<html><form id="kc-form-login" onsubmit="return true;" action="https://id.example/auth?session_code=a&amp;execution=b" method="post"></form></html>"#;
        assert_eq!(
            login_form_action(html).as_deref(),
            Some("https://id.example/auth?session_code=a&execution=b")
        );
        assert!(login_form_action("<html>maintenance</html>").is_none());
    }

    #[test]
    fn code_is_read_from_redirect() {
        assert_eq!(
            authorization_code("enduservaillant.page.link://login?state=s&code=abc.def").as_deref(),
            Some("abc.def")
        );
        assert!(authorization_code("https://id.example/login?error=invalid").is_none());
    }
}
