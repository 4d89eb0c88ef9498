// Unary HTTP client for the vendor consoles.
//
// Wraps `reqwest::Client` with session-cookie injection and outcome
// classification. URL catalogs and payload navigation are the drivers'
// business; this module only guarantees that callers can tell apart
// "the console rejected the request" (HTTP status), "the console was
// unreachable" (transport), and "the cached session is dead"
// (authorization) — and that the third case invalidates the session store
// so the next run re-authenticates.

use std::sync::Arc;

use reqwest::header::{COOKIE, HeaderMap, SET_COOKIE};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::session::Session;
use crate::transport::TransportConfig;

// ── RawResponse ──────────────────────────────────────────────────────

/// A successful (2xx) console response.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl RawResponse {
    /// `name=value` pairs from the `Set-Cookie` response headers, with
    /// attributes stripped. Login flows pick their session cookies out of
    /// these.
    pub fn cookie_pairs(&self) -> Vec<String> {
        self.headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .map(|pair| pair.trim().to_owned())
            .filter(|pair| !pair.is_empty())
            .collect()
    }

    /// Parse the body as JSON.
    pub fn json(&self) -> Result<serde_json::Value, Error> {
        serde_json::from_str(&self.body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: self.body.clone(),
        })
    }
}

// ── ApiClient ────────────────────────────────────────────────────────

/// Authenticated HTTP access to one console.
///
/// Holds the shared [`Session`]; every call except the login-phase ones
/// carries the current token as a `Cookie` header.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    session: Arc<Session>,
}

impl ApiClient {
    pub fn new(
        base_url: Url,
        session: Arc<Session>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            session,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Resolve a path against the console base URL.
    pub fn url(&self, path: &str) -> Result<Url, Error> {
        self.base_url.join(path).map_err(Error::InvalidUrl)
    }

    /// Start a request for [`send`](Self::send) /
    /// [`send_unauthenticated`](Self::send_unauthenticated).
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http.request(method, url)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Authenticated GET.
    pub async fn get(&self, url: Url) -> Result<RawResponse, Error> {
        debug!("GET {url}");
        self.send(self.http.get(url)).await
    }

    /// Authenticated POST with a JSON body.
    pub async fn post_json(
        &self,
        url: Url,
        body: &impl Serialize,
    ) -> Result<RawResponse, Error> {
        debug!("POST {url}");
        self.send(self.http.post(url).json(body)).await
    }

    /// Authenticated POST with a form-urlencoded body.
    pub async fn post_form(
        &self,
        url: Url,
        form: &[(&str, &str)],
    ) -> Result<RawResponse, Error> {
        debug!("POST {url}");
        self.send(self.http.post(url).form(form)).await
    }

    /// Send with the session cookie attached.
    pub async fn send(&self, builder: RequestBuilder) -> Result<RawResponse, Error> {
        let builder = match self.session.current().await {
            Some(token) => builder.header(COOKIE, token.as_str()),
            None => builder,
        };
        self.execute(builder, true).await
    }

    /// Send without the session cookie — the login calls, which must not
    /// present a (possibly stale) credential.
    pub async fn send_unauthenticated(
        &self,
        builder: RequestBuilder,
    ) -> Result<RawResponse, Error> {
        self.execute(builder, false).await
    }

    // ── Outcome classification ───────────────────────────────────────

    async fn execute(
        &self,
        builder: RequestBuilder,
        authenticated: bool,
    ) -> Result<RawResponse, Error> {
        let resp = builder.send().await.map_err(Error::Transport)?;
        let status = resp.status();

        if status == StatusCode::UNAUTHORIZED {
            if authenticated {
                // The console no longer honors the cached token. Drop it
                // so the next run logs in fresh; no retry inside this call.
                if let Err(e) = self.session.invalidate().await {
                    warn!(error = %e, "failed to invalidate session store");
                }
                return Err(Error::SessionExpired);
            }
            return Err(Error::Authentication {
                message: "console rejected the login call (HTTP 401)".into(),
            });
        }

        let headers = resp.headers().clone();
        let body = resp.text().await.map_err(Error::Transport)?;

        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(RawResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn response_with_cookies(cookies: &[&str]) -> RawResponse {
        let mut headers = HeaderMap::new();
        for cookie in cookies {
            headers.append(SET_COOKIE, HeaderValue::from_str(cookie).unwrap());
        }
        RawResponse {
            status: 200,
            headers,
            body: String::new(),
        }
    }

    #[test]
    fn cookie_pairs_strips_attributes() {
        let resp = response_with_cookies(&[
            "JSESSIONID=0000abcd; Path=/; HttpOnly",
            "_auth=deadbeef; Secure",
        ]);
        assert_eq!(
            resp.cookie_pairs(),
            vec!["JSESSIONID=0000abcd".to_owned(), "_auth=deadbeef".to_owned()]
        );
    }

    #[test]
    fn cookie_pairs_empty_without_set_cookie() {
        let resp = response_with_cookies(&[]);
        assert!(resp.cookie_pairs().is_empty());
    }

    #[test]
    fn json_reports_the_offending_body() {
        let resp = RawResponse {
            status: 200,
            headers: HeaderMap::new(),
            body: "not json".into(),
        };
        match resp.json() {
            Err(Error::Deserialization { body, .. }) => assert_eq!(body, "not json"),
            other => panic!("expected Deserialization error, got {other:?}"),
        }
    }
}
