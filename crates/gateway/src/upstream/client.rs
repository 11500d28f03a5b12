// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the upstream ERP checkin API.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, EXPECT};
use reqwest::{Client, StatusCode};

use crate::config::GatewayConfig;
use crate::event::AttendanceEvent;

use super::limiter::RateGate;
use super::SubmitOutcome;

/// Retrying, rate-limited façade over the ERP checkin endpoint.
pub struct ErpClient {
    http: Client,
    base_url: String,
    gate: RateGate,
    retries: u32,
    retry_base_delay: Duration,
    batch_size: usize,
    batch_delay: Duration,
}

impl ErpClient {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            config.erp_url.clone(),
            &config.erp_api_key,
            &config.erp_api_secret,
            config.upstream_timeout(),
            RateGate::new(
                config.max_concurrent,
                config.reservoir,
                config.reservoir_refresh,
                config.reservoir_window(),
                config.min_spacing(),
            ),
            config.retry_count,
            config.retry_base_delay(),
            config.upstream_batch_size,
            config.batch_delay(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        base_url: String,
        api_key: &str,
        api_secret: &str,
        timeout: Duration,
        gate: RateGate,
        retries: u32,
        retry_base_delay: Duration,
        batch_size: usize,
        batch_delay: Duration,
    ) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(auth) = HeaderValue::from_str(&format!("token {api_key}:{api_secret}")) {
            headers.insert(AUTHORIZATION, auth);
        }
        // Blank Expect suppresses 100-continue; some proxies answer it with 417.
        headers.insert(EXPECT, HeaderValue::from_static(""));

        let http = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .unwrap_or_default();

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            gate,
            retries: retries.max(1),
            retry_base_delay,
            batch_size: batch_size.max(1),
            batch_delay,
        }
    }

    fn checkin_url(&self) -> String {
        format!("{}/api/resource/Employee Checkin", self.base_url)
    }

    /// Submit one event. Network errors, 5xx, and 417 are retried with
    /// exponential backoff; other 4xx are terminal.
    pub async fn submit_one(&self, event: &AttendanceEvent) -> SubmitOutcome {
        let body = checkin_payload(event);

        for attempt in 1..=self.retries {
            let result = {
                let _permit = self.gate.acquire().await;
                self.http.post(self.checkin_url()).json(&body).send().await
            };

            let (outcome, retryable) = match result {
                Ok(resp) => classify_response(resp).await,
                Err(e) => {
                    let detail = if e.is_timeout() { "timed out" } else { "unreachable" };
                    (SubmitOutcome::rejected(format!("upstream {detail}: {e}"), None), true)
                }
            };

            if outcome.success || !retryable || attempt == self.retries {
                return outcome;
            }

            let backoff = self
                .retry_base_delay
                .saturating_mul(1u32 << (attempt - 1).min(16))
                .min(Duration::from_secs(60));
            tracing::debug!(
                attempt,
                employee_id = %event.employee_id,
                err = outcome.error.as_deref().unwrap_or(""),
                "checkin attempt failed, retrying"
            );
            tokio::time::sleep(backoff).await;
        }

        SubmitOutcome::rejected("retries exhausted", None)
    }

    /// Submit many events, one outcome per input in input order. Input is
    /// processed in slices of `batch_size`; slices run sequentially with
    /// `batch_delay` between them, requests within a slice concurrently.
    pub async fn submit_many(&self, events: &[AttendanceEvent]) -> Vec<SubmitOutcome> {
        let mut outcomes = Vec::with_capacity(events.len());
        let mut first = true;
        for slice in events.chunks(self.batch_size) {
            if !first && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
            first = false;
            let slice_outcomes =
                futures_util::future::join_all(slice.iter().map(|ev| self.submit_one(ev))).await;
            outcomes.extend(slice_outcomes);
        }
        outcomes
    }
}

/// ERP checkin wire payload. `time` is local-naive: `YYYY-MM-DD HH:MM:SS`.
fn checkin_payload(event: &AttendanceEvent) -> serde_json::Value {
    let mut body = serde_json::json!({
        "employee": event.employee_id,
        "time": event.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        "log_type": event.kind.log_type(),
        "device_id": event.device_id.as_deref().unwrap_or(""),
    });
    if let Some(map) = body.as_object_mut() {
        if let Some(site) = &event.site_id {
            map.insert("custom_site".to_owned(), serde_json::json!(site));
        }
        if let Some(lat) = event.latitude {
            map.insert("custom_latitude".to_owned(), serde_json::json!(lat));
        }
        if let Some(lon) = event.longitude {
            map.insert("custom_longitude".to_owned(), serde_json::json!(lon));
        }
    }
    body
}

/// Sort a response into an outcome and whether the failure is retryable.
async fn classify_response(resp: reqwest::Response) -> (SubmitOutcome, bool) {
    let status = resp.status();
    if status.is_success() {
        let data = resp.json::<serde_json::Value>().await.ok();
        let echoed = data.as_ref().and_then(|v| v.get("data").cloned()).or(data);
        return (SubmitOutcome::accepted(echoed), false);
    }

    let retryable = status.is_server_error() || status == StatusCode::EXPECTATION_FAILED;
    let body = resp.text().await.unwrap_or_default();
    let detail = if body.is_empty() { status.to_string() } else { format!("{status}: {body}") };
    (SubmitOutcome::rejected(detail, Some(status.as_u16())), retryable)
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
