//! C2 Upstream Audio Client: fetches one audio blob per sub-window from the
//! wearable service and classifies the HTTP outcome.

use crate::constants::UPSTREAM_MAX_WINDOW_SECS;
use crate::error::Error;
use crate::store::ApiCallRecord;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tracing::debug;

/// Result of one fetch attempt.
pub enum Outcome {
    /// `200` with a body; laughs at Ogg-magic validation rather than
    /// rejecting on it, since the upstream contract only promises bytes.
    Blob {
        /// Raw response body.
        bytes: Vec<u8>,
    },
    /// `404`: the wearable had no audio for this window. Not an error.
    NoData,
    /// `502`/`503`/`504`: skip this chunk, continue the run.
    Transient,
    /// Unrecoverable for this run.
    Fatal(FatalReason),
}

/// Why a fetch was classified as [`Outcome::Fatal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalReason {
    /// `401`.
    InvalidCredential,
    /// `429`.
    RateLimited,
    /// Any other non-2xx/404/5xx status.
    Upstream(u16),
}

/// Thin HTTP client for the upstream wearable audio service.
pub struct UpstreamClient {
    http: Client,
    base_url: String,
}

impl UpstreamClient {
    /// Build a client bound to `base_url`, with the 5-minute timeout the
    /// upstream contract requires.
    #[must_use]
    pub fn new(base_url: String) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(5 * 60))
            .build()
            .unwrap_or_default();
        Self { http, base_url }
    }

    /// Fetch the audio blob covering `[start, end)`, classifying the
    /// response into one of the four [`Outcome`] variants and emitting an
    /// [`ApiCallRecord`] plus a `tracing::debug!` line with the same fields.
    ///
    /// # Errors
    /// Returns [`Error::WindowTooLarge`] before making any network call if
    /// `end - start` exceeds the upstream's 2-hour cap.
    pub async fn fetch(
        &self,
        secret: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(Outcome, ApiCallRecord), Error> {
        let span_secs = (end - start).num_seconds();
        if span_secs > UPSTREAM_MAX_WINDOW_SECS {
            return Err(Error::WindowTooLarge { span_secs });
        }

        let endpoint = "/v1/download-audio";
        let params = serde_json::json!({
            "startMs": start.timestamp_millis(),
            "endMs": end.timestamp_millis(),
        });

        let started = Instant::now();
        let result = self
            .http
            .get(format!("{}{endpoint}", self.base_url))
            .query(&[
                ("startMs", start.timestamp_millis().to_string()),
                ("endMs", end.timestamp_millis().to_string()),
            ])
            .header("X-API-Key", secret)
            .send()
            .await;

        let duration_ms = started.elapsed().as_millis() as u64;

        let (outcome, status, response_size, error) = match result {
            Ok(response) => {
                let status = response.status();
                match classify_status(status) {
                    Classification::Blob => match response.bytes().await {
                        Ok(bytes) => {
                            let size = bytes.len() as u64;
                            (
                                Outcome::Blob {
                                    bytes: bytes.to_vec(),
                                },
                                Some(status.as_u16()),
                                Some(size),
                                None,
                            )
                        }
                        Err(e) => (
                            Outcome::Fatal(FatalReason::Upstream(status.as_u16())),
                            Some(status.as_u16()),
                            None,
                            Some(e.to_string()),
                        ),
                    },
                    Classification::NoData => {
                        (Outcome::NoData, Some(status.as_u16()), None, None)
                    }
                    Classification::Transient => {
                        (Outcome::Transient, Some(status.as_u16()), None, None)
                    }
                    Classification::Fatal(reason) => {
                        (Outcome::Fatal(reason), Some(status.as_u16()), None, None)
                    }
                }
            }
            Err(e) => (
                Outcome::Fatal(FatalReason::Upstream(0)),
                None,
                None,
                Some(e.to_string()),
            ),
        };

        let record = ApiCallRecord {
            endpoint: endpoint.to_string(),
            status,
            duration_ms,
            response_size,
            params,
            error: error.clone(),
        };

        debug!(
            endpoint = record.endpoint,
            status = record.status,
            duration_ms = record.duration_ms,
            response_size = record.response_size,
            error = record.error.as_deref(),
            "upstream call completed"
        );

        Ok((outcome, record))
    }
}

enum Classification {
    Blob,
    NoData,
    Transient,
    Fatal(FatalReason),
}

fn classify_status(status: StatusCode) -> Classification {
    match status {
        s if s.is_success() => Classification::Blob,
        StatusCode::NOT_FOUND => Classification::NoData,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            Classification::Transient
        }
        StatusCode::UNAUTHORIZED => Classification::Fatal(FatalReason::InvalidCredential),
        StatusCode::TOO_MANY_REQUESTS => Classification::Fatal(FatalReason::RateLimited),
        other => Classification::Fatal(FatalReason::Upstream(other.as_u16())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_success_is_blob() {
        assert!(matches!(
            classify_status(StatusCode::OK),
            Classification::Blob
        ));
    }

    #[test]
    fn test_classify_404_is_no_data() {
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND),
            Classification::NoData
        ));
    }

    #[test]
    fn test_classify_5xx_is_transient() {
        for code in [
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::GATEWAY_TIMEOUT,
        ] {
            assert!(matches!(classify_status(code), Classification::Transient));
        }
    }

    #[test]
    fn test_classify_401_is_invalid_credential() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED),
            Classification::Fatal(FatalReason::InvalidCredential)
        ));
    }

    #[test]
    fn test_classify_429_is_rate_limited() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            Classification::Fatal(FatalReason::RateLimited)
        ));
    }

    #[test]
    fn test_classify_other_non_2xx_is_fatal_upstream() {
        assert!(matches!(
            classify_status(StatusCode::IM_A_TEAPOT),
            Classification::Fatal(FatalReason::Upstream(418))
        ));
    }

    #[tokio::test]
    async fn test_window_too_large_rejected_before_network_call() {
        let client = UpstreamClient::new("http://127.0.0.1:1".to_string());
        let start = Utc::now();
        let end = start + chrono::TimeDelta::hours(2) + chrono::TimeDelta::minutes(1);
        let err = client.fetch("secret", start, end).await.unwrap_err();
        assert!(matches!(err, Error::WindowTooLarge { .. }));
    }
}
