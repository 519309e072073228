use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{header, Client, StatusCode};
use serde_json::Value;

use super::ApiError;

/// One outbound POST, fully assembled.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub url: String,
    pub headers: header::HeaderMap,
    pub body: Value,
}

/// What came back, before any interpretation of the status.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    /// `(name, value)` of every `Set-Cookie` header; `None` deletes the cookie.
    pub set_cookies: Vec<(String, Option<String>)>,
    pub body: String,
}

/// The HTTP seam. Network failures come back as `ApiError::NetworkError`.
pub trait Transport: Send + Sync {
    fn post(
        &self,
        request: TransportRequest,
    ) -> impl Future<Output = Result<TransportResponse>> + Send;
}

/// reqwest-backed transport.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn post(
        &self,
        request: TransportRequest,
    ) -> impl Future<Output = Result<TransportResponse>> + Send {
        let client = self.client.clone();
        async move {
            let response = client
                .post(&request.url)
                .headers(request.headers)
                .json(&request.body)
                .send()
                .await
                .map_err(ApiError::NetworkError)?;

            let status = response.status();
            let set_cookies = response
                .headers()
                .get_all(header::SET_COOKIE)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .filter_map(parse_set_cookie)
                .collect();
            let body = response.text().await.map_err(ApiError::NetworkError)?;

            Ok(TransportResponse {
                status,
                set_cookies,
                body,
            })
        }
    }
}

/// Extract `name=value` from a `Set-Cookie` header. The value is `None`
/// when the header deletes the cookie.
pub fn parse_set_cookie(header: &str) -> Option<(String, Option<String>)> {
    parse_set_cookie_at(header, Utc::now())
}

fn parse_set_cookie_at(header: &str, now: DateTime<Utc>) -> Option<(String, Option<String>)> {
    let mut segments = header.split(';');
    let (name, value) = segments.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut max_age = None;
    let mut expires = None;
    for attribute in segments {
        let (key, raw) = attribute.split_once('=').unwrap_or((attribute, ""));
        let key = key.trim();
        if key.eq_ignore_ascii_case("max-age") {
            max_age = raw.trim().parse::<i64>().ok();
        } else if key.eq_ignore_ascii_case("expires") {
            expires = parse_cookie_date(raw.trim());
        }
    }

    // Max-Age wins over Expires when both are present
    let deleted = match max_age {
        Some(seconds) => seconds <= 0,
        None => expires.is_some_and(|at| at <= now),
    };
    let value = (!deleted).then(|| value.trim().to_string());
    Some((name.to_string(), value))
}

/// `Expires` in either the RFC 1123 form or the older dashed one.
fn parse_cookie_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc2822(raw) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%a, %d-%b-%Y %H:%M:%S GMT")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;

    use parking_lot::Mutex;

    use super::*;

    enum Step {
        Reply(Result<TransportResponse>),
        Hang,
    }

    /// Replays queued responses in order and records every request.
    #[derive(Default)]
    pub struct ScriptedTransport {
        steps: Mutex<VecDeque<Step>>,
        requests: Mutex<Vec<TransportRequest>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, status: u16, body: Value) -> Self {
            self.reply_with_cookies(status, body, &[])
        }

        /// `cookies` are raw `Set-Cookie` header values.
        pub fn reply_with_cookies(self, status: u16, body: Value, cookies: &[&str]) -> Self {
            let response = TransportResponse {
                status: StatusCode::from_u16(status).expect("valid status"),
                set_cookies: cookies.iter().filter_map(|h| parse_set_cookie(h)).collect(),
                body: body.to_string(),
            };
            self.steps.lock().push_back(Step::Reply(Ok(response)));
            self
        }

        pub fn fail(self, error: anyhow::Error) -> Self {
            self.steps.lock().push_back(Step::Reply(Err(error)));
            self
        }

        /// Next request never completes.
        pub fn hang(self) -> Self {
            self.steps.lock().push_back(Step::Hang);
            self
        }

        pub fn requests(&self) -> Vec<TransportRequest> {
            self.requests.lock().clone()
        }

        /// Last path segment of every request, in order.
        pub fn endpoints(&self) -> Vec<String> {
            self.requests
                .lock()
                .iter()
                .map(|r| r.url.rsplit('/').next().unwrap_or_default().to_string())
                .collect()
        }
    }

    impl Transport for ScriptedTransport {
        fn post(
            &self,
            request: TransportRequest,
        ) -> impl Future<Output = Result<TransportResponse>> + Send {
            self.requests.lock().push(request);
            let step = self.steps.lock().pop_front();
            async move {
                match step {
                    Some(Step::Reply(result)) => result,
                    Some(Step::Hang) => std::future::pending().await,
                    None => Err(anyhow::anyhow!("no scripted response left")),
                }
            }
        }
    }
}
