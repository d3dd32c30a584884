//! Request/response fallback sync over HTTP.
//!
//! Each push runs on its own worker thread so a slow server never stalls the
//! host's poll loop; the engine collects the outcome with
//! [`FallbackSync::poll_delivery`].

use serde::Serialize;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::Duration;

use crate::error::{LayoutError, Result};
use crate::layout::Layout;
use crate::sync::transport::{Delivery, FallbackSync};

/// Default request timeout for the fallback POST.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Body of the fallback POST.
#[derive(Debug, Serialize)]
struct LayoutPost<'a> {
    layout: &'a Layout,
    timestamp: i64,
}

/// POSTs `{layout, timestamp}` to the layout endpoint.
#[derive(Debug)]
pub struct HttpFallbackSync {
    url: String,
    timeout: Duration,
    pending: Option<Receiver<Result<()>>>,
}

impl HttpFallbackSync {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: DEFAULT_HTTP_TIMEOUT,
            pending: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(feature = "remote")]
fn post_layout(url: &str, timeout: Duration, body: Vec<u8>) -> Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LayoutError::FallbackSyncFailed {
            reason: e.to_string(),
        })?;

    let response = client
        .post(url)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .map_err(|e| {
            let reason = if e.is_timeout() {
                format!("timed out after {}ms", timeout.as_millis())
            } else if e.is_connect() {
                format!("cannot connect to {}: {}", url, e)
            } else {
                e.to_string()
            };
            LayoutError::FallbackSyncFailed { reason }
        })?;

    if !response.status().is_success() {
        return Err(LayoutError::FallbackSyncFailed {
            reason: format!("server returned {}", response.status()),
        });
    }
    Ok(())
}

impl FallbackSync for HttpFallbackSync {
    #[cfg(feature = "remote")]
    fn push_layout(&mut self, layout: &Layout, timestamp: i64) -> Result<Delivery> {
        let body = serde_json::to_vec(&LayoutPost { layout, timestamp })?;
        let url = self.url.clone();
        let timeout = self.timeout;
        let items = layout.len();
        let (tx, rx) = std::sync::mpsc::channel();

        std::thread::Builder::new()
            .name("gridsync-http".to_string())
            .spawn(move || {
                let outcome = post_layout(&url, timeout, body);
                if outcome.is_ok() {
                    log::debug!("Pushed {} items to {}", items, url);
                }
                // The engine may have moved on; a dropped receiver is fine.
                let _ = tx.send(outcome);
            })
            .map_err(|e| LayoutError::FallbackSyncFailed {
                reason: format!("cannot start request worker: {}", e),
            })?;

        if self.pending.replace(rx).is_some() {
            log::debug!("Superseding in-flight push to {}", self.url);
        }
        Ok(Delivery::InFlight)
    }

    #[cfg(not(feature = "remote"))]
    fn push_layout(&mut self, _layout: &Layout, _timestamp: i64) -> Result<Delivery> {
        Err(LayoutError::RemoteUnavailable)
    }

    fn poll_delivery(&mut self) -> Option<Result<()>> {
        let outcome = match self.pending.as_ref()?.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(LayoutError::FallbackSyncFailed {
                reason: "request worker exited without a result".to_string(),
            }),
        };
        self.pending = None;
        Some(outcome)
    }
}
