//! InfluxDB 2.x HTTP sink.

use crate::output::line_protocol::{DataPoint, encode_lines};
use crate::output::{Sink, SinkError, SinkFuture};
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;

/// Writes line protocol batches through the InfluxDB v2 write API.
#[derive(Debug, Clone)]
pub struct InfluxDbClient {
    client: Client,
    base_url: String,
    org: String,
    token: String,
}

impl InfluxDbClient {
    /// Create a client for the server at `url` (e.g. `http://localhost:8086`).
    pub fn new(url: &str, org: &str, token: &str, timeout: Duration) -> Result<Self, SinkError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            org: org.to_string(),
            token: token.to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn ping_server(&self) -> Result<(), SinkError> {
        let response = self.client.get(self.endpoint("/ping")).send().await?;
        if !response.status().is_success() {
            return Err(SinkError::Unavailable(format!(
                "ping {} returned {}",
                self.base_url,
                response.status()
            )));
        }
        Ok(())
    }

    async fn write_points(&self, bucket: &str, points: &[DataPoint]) -> Result<(), SinkError> {
        if points.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .post(self.endpoint("/api/v2/write"))
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", bucket),
                ("precision", "ns"),
            ])
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(encode_lines(points))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                destination: bucket.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

impl Sink for InfluxDbClient {
    fn ping(&self) -> SinkFuture<'_> {
        Box::pin(self.ping_server())
    }

    fn write<'a>(&'a self, destination: &'a str, points: &'a [DataPoint]) -> SinkFuture<'a> {
        Box::pin(self.write_points(destination, points))
    }
}
