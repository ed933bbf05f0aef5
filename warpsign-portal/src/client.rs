// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Developer Portal login state machine and the retrying HTTP
//! transport every typed operation in [`crate::api`] is built on.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::thread::sleep;
use std::time::Duration;

use log::{debug, info, warn};
use rand::Rng;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{Error, Result, NON_RETRYABLE_RESULT_CODES};
use crate::session::{SessionData, SessionStore, StoredCookie};
use crate::srp::{stretch_password, SrpExchange, StretchAlgorithm};

const SRP_INIT_URL: &str = "https://idmsa.apple.com/appleauth/auth/signin/init";
const SRP_COMPLETE_URL: &str = "https://idmsa.apple.com/appleauth/auth/signin/complete";
const TWO_FACTOR_URL: &str = "https://idmsa.apple.com/appleauth/auth/verify/trusteddevice/securitycode";
const WIDGET_KEY_URL: &str = "https://appstoreconnect.apple.com/olympus/v1/app/config?hostname=itunesconnect.apple.com";
const QH_BASE_URL: &str = "https://developerservices2.apple.com/services/QH65B2";

const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
const RETRY_FACTOR: f64 = 2.0;
const RETRY_MAX_ATTEMPTS: u32 = 5;
const RATE_LIMIT_DELAY: Duration = Duration::from_secs(60);

/// Second factor challenge mode the portal asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoFactorMode {
    TrustedDevice,
    Sms,
    SecurityKey,
}

impl TwoFactorMode {
    fn from_tag(tag: &str) -> Self {
        match tag {
            "sms" => Self::Sms,
            "securityKey" => Self::SecurityKey,
            _ => Self::TrustedDevice,
        }
    }
}

/// Caller-supplied two-factor code prompt, per spec §4.1 step 2:
/// `prompt(mode, hint) -> code-string`.
pub trait TwoFactorPrompt: Send + Sync {
    fn prompt(&self, mode: TwoFactorMode, hint: Option<&str>) -> Result<String>;
}

/// The client's current position in the login state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    Anonymous,
    SrpChallenging,
    AwaitingSecondFactor(TwoFactorMode),
    TrustedSession,
    Expired,
}

#[derive(Debug, Serialize)]
struct InitRequest<'a> {
    a2k: String,
    #[serde(rename = "accountName")]
    account_name: &'a str,
    #[serde(rename = "rememberMe")]
    remember_me: bool,
}

#[derive(Debug, Deserialize)]
struct InitResponse {
    salt: String,
    #[serde(rename = "b")]
    b_pub: String,
    iteration: u32,
    #[serde(rename = "protocol")]
    algorithm: String,
}

#[derive(Debug, Serialize)]
struct CompleteRequest<'a> {
    #[serde(rename = "accountName")]
    account_name: &'a str,
    m1: String,
    c: &'a str,
    #[serde(rename = "rememberMe")]
    remember_me: bool,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize, Default)]
struct ServiceErrorsBody {
    #[serde(rename = "serviceErrors", default)]
    service_errors: Vec<ServiceError>,
}

/// A buffered response from `send_raw_with_retry`. The body is read exactly
/// once (blocking `reqwest::Response` bodies can't be read twice), so every
/// caller — JSON decoding, `serviceErrors` inspection, plist decoding — works
/// off this instead of the original `Response`.
pub(crate) struct PortalResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl PortalResponse {
    pub(crate) fn status(&self) -> StatusCode {
        self.status
    }

    pub(crate) fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.body
    }

    pub(crate) fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// The authenticated portal client. Holds the HTTP transport, the login
/// state machine, and the persisted session.
pub struct PortalClient {
    http: Client,
    pub(crate) apple_id: String,
    state: LoginState,
    widget_token: Option<String>,
    session_store: SessionStore,
    prompt: Box<dyn TwoFactorPrompt>,
    hsa_token: Option<String>,
    /// `name -> cookie`, populated from every response's `Set-Cookie`
    /// headers and replayed as a `Cookie:` request header on every
    /// outgoing request. reqwest's blocking jar (`cookie_store(true)`)
    /// doesn't expose enumeration, so session persistence manages cookies
    /// itself rather than through it.
    cookies: Mutex<HashMap<String, StoredCookie>>,
}

impl PortalClient {
    pub fn new(
        apple_id: impl Into<String>,
        sessions_dir: &Path,
        prompt: Box<dyn TwoFactorPrompt>,
    ) -> Result<Self> {
        let apple_id = apple_id.into();
        let http = Client::builder().build()?;
        let session_store = SessionStore::open(sessions_dir, &apple_id)?;

        let mut client = Self {
            http,
            apple_id,
            state: LoginState::Anonymous,
            widget_token: None,
            session_store,
            prompt,
            hsa_token: None,
            cookies: Mutex::new(HashMap::new()),
        };

        if let Some(existing) = client.session_store.load()? {
            client.widget_token = existing.widget_token.clone();
            {
                let mut jar = client.cookies.lock().unwrap();
                for cookie in &existing.cookies {
                    jar.insert(cookie.name.clone(), cookie.clone());
                }
            }
            if existing.hsa_trusted && !existing.cookies.is_empty() {
                client.state = LoginState::TrustedSession;
            }
        }

        Ok(client)
    }

    pub fn state(&self) -> &LoginState {
        &self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == LoginState::TrustedSession
    }

    /// Run the full login state machine, reusing a persisted session when
    /// one is trusted (zero SRP exchanges — see spec §8 "Session reuse").
    pub fn login(&mut self, password: &str) -> Result<()> {
        if self.is_authenticated() {
            debug!("reusing persisted session for {}", self.apple_id);
            return Ok(());
        }

        self.state = LoginState::SrpChallenging;
        let exchange = SrpExchange::new();

        let init_body = InitRequest {
            a2k: hex::encode(exchange.public_ephemeral()),
            account_name: &self.apple_id,
            remember_me: true,
        };
        let init_response: InitResponse =
            self.send_with_retry(|http| http.post(SRP_INIT_URL).json(&init_body))?;

        let salt = hex::decode(&init_response.salt)
            .map_err(|e| Error::UnexpectedResponse(format!("bad salt encoding: {e}")))?;
        let b_pub = hex::decode(&init_response.b_pub)
            .map_err(|e| Error::UnexpectedResponse(format!("bad B encoding: {e}")))?;
        let algorithm = StretchAlgorithm::from_tag(&init_response.algorithm)?;

        let stretched = stretch_password(password, &salt, init_response.iteration, algorithm);
        let verifier = exchange.process_challenge(&self.apple_id, &stretched, &salt, &b_pub)?;

        let complete_body = CompleteRequest {
            account_name: &self.apple_id,
            m1: hex::encode(verifier.proof()),
            c: "",
            remember_me: true,
        };

        let complete_response = self.send_raw_with_retry(|http| {
            http.post(SRP_COMPLETE_URL).json(&complete_body)
        })?;

        if complete_response.status() == StatusCode::UNAUTHORIZED {
            return Err(Error::BadCredentials);
        }

        self.hsa_token = complete_response
            .headers()
            .get("x-apple-id-session-id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        self.persist_cookies_from(&complete_response)?;

        if let Some(second_factor) = self.second_factor_required(&complete_response)? {
            self.state = LoginState::AwaitingSecondFactor(second_factor);
            self.complete_second_factor(second_factor)?;
        }

        self.fetch_widget_token()?;
        self.state = LoginState::TrustedSession;
        self.persist_session(true)?;

        info!("authenticated as {}", self.apple_id);
        Ok(())
    }

    fn second_factor_required(&self, response: &PortalResponse) -> Result<Option<TwoFactorMode>> {
        match response.status() {
            StatusCode::OK => Ok(None),
            StatusCode::CONFLICT => {
                let mode_header = response
                    .headers()
                    .get("x-apple-hsa-challenge")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("trustedDevice");
                Ok(Some(TwoFactorMode::from_tag(mode_header)))
            }
            other => Err(Error::UnexpectedResponse(format!(
                "unexpected SRP complete status {other}"
            ))),
        }
    }

    fn complete_second_factor(&mut self, mode: TwoFactorMode) -> Result<()> {
        let code = self.prompt.prompt(mode, None)?;

        #[derive(Serialize)]
        struct VerifyBody<'a> {
            #[serde(rename = "securityCode")]
            security_code: SecurityCode<'a>,
        }
        #[derive(Serialize)]
        struct SecurityCode<'a> {
            code: &'a str,
        }

        let body = VerifyBody {
            security_code: SecurityCode { code: &code },
        };

        let response = self.send_raw_with_retry(|http| http.post(TWO_FACTOR_URL).json(&body))?;
        if !response.status().is_success() {
            return Err(Error::TwoFactorFailed);
        }
        self.persist_cookies_from(&response)?;
        Ok(())
    }

    fn fetch_widget_token(&mut self) -> Result<()> {
        #[derive(Deserialize)]
        struct WidgetConfig {
            #[serde(rename = "authServiceKey")]
            auth_service_key: String,
        }
        let config: WidgetConfig = self.send_with_retry(|http| http.get(WIDGET_KEY_URL))?;
        self.widget_token = Some(config.auth_service_key);
        Ok(())
    }

    fn persist_cookies_from(&mut self, _response: &PortalResponse) -> Result<()> {
        // Cookies are captured as each response arrives, in
        // `send_raw_with_retry`; by the time a caller gets here the jar
        // already reflects this response's Set-Cookie headers.
        self.persist_session(matches!(self.state, LoginState::TrustedSession))
    }

    fn persist_session(&self, trusted: bool) -> Result<()> {
        let data = SessionData {
            apple_id: self.apple_id.clone(),
            cookies: self.snapshot_cookies(),
            widget_token: self.widget_token.clone(),
            hsa_trusted: trusted,
        };
        self.session_store.save(&data)
    }

    fn snapshot_cookies(&self) -> Vec<StoredCookie> {
        self.cookies.lock().unwrap().values().cloned().collect()
    }

    /// Merge `Set-Cookie` headers from a response into the jar.
    fn store_set_cookies(&self, headers: &HeaderMap) {
        let mut jar = self.cookies.lock().unwrap();
        for value in headers.get_all(reqwest::header::SET_COOKIE) {
            let Ok(text) = value.to_str() else { continue };
            if let Some(cookie) = parse_set_cookie(text) {
                jar.insert(cookie.name.clone(), cookie);
            }
        }
    }

    /// The accumulated jar as a single `Cookie:` request header value.
    fn cookie_header(&self) -> Option<String> {
        let jar = self.cookies.lock().unwrap();
        if jar.is_empty() {
            return None;
        }
        Some(
            jar.values()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Any `401`/`403` triggers exactly one silent re-login (spec §4.1
    /// retry policy); a second failure is fatal.
    pub fn ensure_authenticated(&mut self, password: &str) -> Result<()> {
        if self.is_authenticated() {
            return Ok(());
        }
        self.login(password)
    }

    /// Send a JSON request with the retry/backoff policy from spec §4.1,
    /// deserializing a successful body into `T`.
    pub(crate) fn send_with_retry<T: DeserializeOwned>(
        &self,
        build: impl Fn(&Client) -> RequestBuilder,
    ) -> Result<T> {
        let response = self.send_raw_with_retry(build)?;
        response.json()
    }

    /// Send a request, retrying transient failures with exponential
    /// backoff (base 500ms, factor 2, ±25% jitter, capped at 5 attempts).
    /// `serviceErrors` carrying a non-retryable result code are translated
    /// immediately; `401`/`403` is surfaced to the caller to drive a
    /// silent re-login; a `RateLimited` response waits 60s and retries
    /// once more.
    pub(crate) fn send_raw_with_retry(
        &self,
        build: impl Fn(&Client) -> RequestBuilder,
    ) -> Result<PortalResponse> {
        let mut attempt = 0u32;
        let mut rate_limited_retry_used = false;

        loop {
            attempt += 1;
            let mut request = build(&self.http);
            if let Some(token) = &self.widget_token {
                request = request.header("X-Apple-Widget-Key", token);
            }
            if let Some(hsa) = &self.hsa_token {
                request = request.header("X-Apple-Id-Session-Id", hsa);
            }
            if let Some(cookie_header) = self.cookie_header() {
                request = request.header(reqwest::header::COOKIE, cookie_header);
            }

            let result = request.send();

            match result {
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    if rate_limited_retry_used {
                        return Err(Error::RateLimited);
                    }
                    rate_limited_retry_used = true;
                    warn!("rate limited by developer portal, waiting 60s");
                    sleep(RATE_LIMIT_DELAY);
                    continue;
                }
                Ok(response) if response.status().is_server_error() => {
                    if attempt >= RETRY_MAX_ATTEMPTS {
                        return Err(Error::PortalUnavailable);
                    }
                    backoff_sleep(attempt);
                    continue;
                }
                Ok(response) => {
                    let status = response.status();
                    let headers = response.headers().clone();
                    let body = response.bytes().map_err(Error::Reqwest)?.to_vec();
                    self.store_set_cookies(&headers);

                    let portal_response = PortalResponse {
                        status,
                        headers,
                        body,
                    };
                    if let Some(semantic) = self.translate_service_error(&portal_response)? {
                        return Err(semantic);
                    }
                    return Ok(portal_response);
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    if attempt >= RETRY_MAX_ATTEMPTS {
                        return Err(Error::PortalUnavailable);
                    }
                    backoff_sleep(attempt);
                    continue;
                }
                Err(e) => return Err(Error::Reqwest(e)),
            }
        }
    }

    /// Call a legacy QH65B2 developer-services action, posting `body` as an
    /// XML plist and decoding the plist response into `T`. This is the
    /// transport every operation in [`crate::api`] is built on.
    pub(crate) fn qh_request<T: DeserializeOwned>(
        &self,
        action: &str,
        mut body: plist::Dictionary,
    ) -> Result<T> {
        body.insert("clientId".to_string(), plist::Value::String("XABBG36SBA".to_string()));
        body.insert(
            "DTDK_Platform".to_string(),
            plist::Value::String("ios".to_string()),
        );

        let mut payload = Vec::new();
        plist::to_writer_xml(&mut payload, &plist::Value::Dictionary(body))?;

        let url = format!("{QH_BASE_URL}/{action}.action");
        let response = self.send_raw_with_retry(|http| {
            http.post(&url)
                .header("Content-Type", "text/x-xml-plist")
                .body(payload.clone())
        })?;

        let value: plist::Value = plist::from_bytes(response.bytes())?;
        self.check_qh_response(&value)?;
        Ok(plist::from_value(&value)?)
    }

    /// QH65B2 responses embed their own `resultCode`/`userString`/
    /// `creationExists` style failure markers inside a `200 OK` body; this
    /// is where the non-retryable result codes from spec §4.1/§7 are
    /// translated into semantic errors.
    fn check_qh_response(&self, value: &plist::Value) -> Result<()> {
        let dict = match value.as_dictionary() {
            Some(d) => d,
            None => return Ok(()),
        };
        let result_code = dict
            .get("resultCode")
            .and_then(|v| v.as_signed_integer());
        let Some(code) = result_code else {
            return Ok(());
        };
        if code == 0 {
            return Ok(());
        }
        let message = dict
            .get("userString")
            .and_then(|v| v.as_string())
            .unwrap_or("unknown portal error")
            .to_string();

        if NON_RETRYABLE_RESULT_CODES.contains(&code) {
            return Err(Error::IdentifierConflict(message));
        }
        Err(Error::UnexpectedResponse(format!("resultCode {code}: {message}")))
    }

    /// Inspect a JSON response body for `serviceErrors` (the idmsa/SRP
    /// transport's failure shape, as opposed to QH65B2's `resultCode`) and
    /// translate a non-retryable code into a semantic error.
    fn translate_service_error(&self, response: &PortalResponse) -> Result<Option<Error>> {
        if response.status().is_success() {
            return Ok(None);
        }
        let Ok(errors) = serde_json::from_slice::<ServiceErrorsBody>(response.bytes()) else {
            return Ok(None);
        };
        for error in &errors.service_errors {
            let Ok(code) = error.code.parse::<i64>() else {
                continue;
            };
            if NON_RETRYABLE_RESULT_CODES.contains(&code) {
                let message = if error.message.is_empty() {
                    format!("serviceErrors code {code}")
                } else {
                    error.message.clone()
                };
                return Ok(Some(Error::IdentifierConflict(message)));
            }
        }
        Ok(None)
    }
}

fn parse_set_cookie(text: &str) -> Option<StoredCookie> {
    let mut parts = text.split(';');
    let (name, value) = parts.next()?.trim().split_once('=')?;
    if name.is_empty() {
        return None;
    }

    let mut domain = "idmsa.apple.com".to_string();
    for attr in parts {
        let attr = attr.trim();
        let lower = attr.to_ascii_lowercase();
        if let Some(rest) = lower.strip_prefix("domain=") {
            domain = attr[attr.len() - rest.len()..].trim_start_matches('.').to_string();
        }
    }

    Some(StoredCookie {
        name: name.trim().to_string(),
        value: value.trim().to_string(),
        domain,
    })
}

fn backoff_sleep(attempt: u32) {
    let base_millis = RETRY_BASE_DELAY.as_millis() as f64 * RETRY_FACTOR.powi(attempt as i32 - 1);
    let jitter = rand::thread_rng().gen_range(-0.25..=0.25);
    let delay_millis = (base_millis * (1.0 + jitter)).max(0.0) as u64;
    sleep(Duration::from_millis(delay_millis));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_value_and_domain() {
        let cookie = parse_set_cookie("myacinfo=abc123; Domain=.apple.com; Path=/; Secure").unwrap();
        assert_eq!(cookie.name, "myacinfo");
        assert_eq!(cookie.value, "abc123");
        assert_eq!(cookie.domain, "apple.com");
    }

    #[test]
    fn parses_cookie_without_domain_attribute() {
        let cookie = parse_set_cookie("session=xyz; Path=/; HttpOnly").unwrap();
        assert_eq!(cookie.name, "session");
        assert_eq!(cookie.value, "xyz");
        assert_eq!(cookie.domain, "idmsa.apple.com");
    }

    #[test]
    fn rejects_malformed_pair() {
        assert!(parse_set_cookie("not-a-cookie-pair").is_none());
    }
}
