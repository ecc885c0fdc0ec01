//! # logchan-http
//!
//! [`HttpLogInfo`] records one outbound HTTP call. Before it is queued it renders a
//! `curl` command that replays the request, so a handler can print something a
//! developer can paste into a shell.
//!
//! ```rust,no_run
//! use logchan::{Dispatcher, DispatcherConfig};
//! use logchan_http::HttpLogInfo;
//!
//! # fn main() -> logchan::Result<()> {
//! let dispatcher = Dispatcher::new(DispatcherConfig::default())?;
//! dispatcher.send(
//!     HttpLogInfo::new("GET", "https://api.example.com/users?page=2")
//!         .with_name("list-users")
//!         .with_input(r#"{"limit":"50"}"#),
//! );
//! # Ok(())
//! # }
//! ```

use logchan::{EventError, HookError, LogEvent, LogLevel, LogName, Metadata};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Name every [`HttpLogInfo`] reports to handlers
pub const HTTP_LOG_INFO_NAME: LogName = LogName::from_static("HttpLogInfo");

/// Why a curl command could not be rendered
#[derive(Error, Debug)]
pub enum CurlError {
    #[error("Invalid request URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("GET input is not a JSON object of string values: {0}")]
    Input(#[from] serde_json::Error),
}

/// One outbound HTTP call
#[derive(Clone, Serialize)]
pub struct HttpLogInfo {
    /// Caller's label for the call
    pub name: String,
    pub method: String,
    pub url: String,
    /// Request body, or a JSON object of query parameters for GET
    pub input: String,
    /// Response body
    pub output: String,
    /// Filled by `before_send`
    pub curl: String,
    pub level: LogLevel,
    #[serde(skip)]
    pub err: Option<Arc<EventError>>,
}

impl HttpLogInfo {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            method: method.into(),
            url: url.into(),
            input: String::new(),
            output: String::new(),
            curl: String::new(),
            level: LogLevel::Info,
            err: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = input.into();
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Attach the call's failure; raises the level to at least `Error`
    pub fn with_error<E>(mut self, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.err = Some(Arc::new(err));
        if self.level > LogLevel::Error {
            self.level = LogLevel::Error;
        }
        self
    }

    /// Shell command replaying this request.
    ///
    /// POST sends `input` as the body. GET merges a JSON object in `input` into the
    /// query string without replacing parameters already in the URL, with keys sorted.
    /// Any other method renders as an empty string.
    pub fn curl_cli(&self) -> Result<String, CurlError> {
        let method = self.method.to_uppercase();

        match method.as_str() {
            "POST" => Ok(format!(
                "curl -X{} -d'{}' '{}'",
                method, self.input, self.url
            )),
            "GET" => {
                let url = merge_query(&self.url, &self.input)?;
                Ok(format!("curl -X{}  '{}'", method, url))
            }
            _ => Ok(String::new()),
        }
    }
}

fn merge_query(raw_url: &str, input: &str) -> Result<Url, CurlError> {
    let mut url = Url::parse(raw_url)?;
    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

    if !input.is_empty() {
        let params: BTreeMap<String, String> = serde_json::from_str(input)?;
        for (key, value) in params {
            if !pairs.iter().any(|(k, _)| *k == key) {
                pairs.push((key, value));
            }
        }
    }

    // Stable: repeated keys keep their relative order.
    pairs.sort_by(|(a, _), (b, _)| a.cmp(b));

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }

    Ok(url)
}

impl LogEvent for HttpLogInfo {
    fn name(&self) -> LogName {
        HTTP_LOG_INFO_NAME
    }

    fn error(&self) -> Option<&EventError> {
        self.err.as_deref()
    }

    fn level(&self) -> LogLevel {
        self.level
    }

    fn before_send(&mut self, _metadata: &Metadata) -> Result<(), HookError> {
        // The call's own error is untouched when rendering fails.
        self.curl = self.curl_cli()?;
        Ok(())
    }
}

impl fmt::Debug for HttpLogInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpLogInfo")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("url", &self.url)
            .field("level", &self.level)
            .field("err", &self.err.as_ref().map(|e| e.to_string()))
            .finish()
    }
}
