// SPDX-License-Identifier: MPL-2.0

//! REST client for the repeater backend
//!
//! One method per endpoint. Non-2xx responses and `success: false`
//! envelopes are errors; nothing is retried here. The scheduler decides
//! what a failure means for the view.

use super::types::*;
use crate::config::Config;
use crate::error::{Error, Result};
use reqwest::{Client, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

/// Typed client for the repeater's `/api/` endpoints. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    client: Client,
}

impl ApiClient {
    /// Create a client for the given backend origin.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, client })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.api_url.clone(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/{}", self.base_url, endpoint)
    }

    // ------------------------------------------------------------------------
    // Transport helpers
    // ------------------------------------------------------------------------

    async fn checked(response: Response, endpoint: &'static str) -> Result<Vec<u8>> {
        let status = response.status();
        if !status.is_success() {
            log::debug!("{endpoint} returned {status}");
            return Err(Error::Http {
                status: status.as_u16(),
                endpoint,
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn get_raw(
        &self,
        endpoint: &'static str,
        query: &[(&str, String)],
    ) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(self.url(endpoint))
            .query(query)
            .send()
            .await?;
        Self::checked(response, endpoint).await
    }

    /// GET an endpoint that wraps its payload in an [`Envelope`].
    async fn get_enveloped<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let body = self.get_raw(endpoint, query).await?;
        let envelope: Envelope<T> = serde_json::from_slice(&body)?;
        envelope.into_result(endpoint)
    }

    /// GET an endpoint that returns a bare JSON object.
    async fn get_bare<T: DeserializeOwned>(&self, endpoint: &'static str) -> Result<T> {
        let body = self.get_raw(endpoint, &[]).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// POST a JSON command. A missing `data` field is fine for commands.
    async fn post_command<B: Serialize + ?Sized>(
        &self,
        endpoint: &'static str,
        body: &B,
    ) -> Result<Ack> {
        let response = self
            .client
            .post(self.url(endpoint))
            .json(body)
            .send()
            .await?;
        let body = Self::checked(response, endpoint).await?;
        let envelope: Envelope<serde_json::Value> = serde_json::from_slice(&body)?;
        match envelope.into_result(endpoint) {
            Ok(data) => Ok(Ack::from_data(&data)),
            Err(Error::MissingData(_)) => Ok(Ack::default()),
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------------
    // Read endpoints
    // ------------------------------------------------------------------------

    pub async fn stats(&self) -> Result<Stats> {
        self.get_bare("stats").await
    }

    pub async fn logs(&self) -> Result<Vec<LogEntry>> {
        self.get_enveloped("logs", &[]).await
    }

    pub async fn recent_packets(&self, limit: u32) -> Result<Vec<Packet>> {
        self.get_enveloped("recent_packets", &[("limit", limit.to_string())])
            .await
    }

    pub async fn filtered_packets(&self, filter: &PacketFilter) -> Result<Vec<Packet>> {
        self.get_enveloped("filtered_packets", &filter.query()).await
    }

    pub async fn packet_by_hash(&self, packet_hash: &str) -> Result<Packet> {
        self.get_enveloped("packet_by_hash", &[("packet_hash", packet_hash.to_string())])
            .await
    }

    pub async fn packet_type_graph_data(&self, hours: u32) -> Result<GraphData> {
        self.get_enveloped("packet_type_graph_data", &[("hours", hours.to_string())])
            .await
    }

    pub async fn metrics_graph_data(&self, hours: u32) -> Result<GraphData> {
        self.get_enveloped("metrics_graph_data", &[("hours", hours.to_string())])
            .await
    }

    pub async fn noise_floor_history(&self, hours: u32) -> Result<Vec<NoiseFloorSample>> {
        self.get_enveloped("noise_floor_history", &[("hours", hours.to_string())])
            .await
    }

    pub async fn noise_floor_stats(&self, hours: u32) -> Result<NoiseFloorStats> {
        self.get_enveloped("noise_floor_stats", &[("hours", hours.to_string())])
            .await
    }

    pub async fn hardware_stats(&self) -> Result<HardwareStats> {
        self.get_bare("hardware_stats").await
    }

    /// Histogram of the last `minutes`, split into `buckets` windows.
    ///
    /// The response is rejected unless every series has exactly `buckets`
    /// entries in ascending time order.
    pub async fn bucketed_stats(&self, minutes: u32, buckets: usize) -> Result<BucketedStats> {
        let stats: BucketedStats = self
            .get_enveloped(
                "bucketed_stats",
                &[("minutes", minutes.to_string()), ("buckets", buckets.to_string())],
            )
            .await?;
        stats.validate(buckets)?;
        Ok(stats)
    }

    pub async fn utilization_stats(&self, minutes: u32) -> Result<UtilizationStats> {
        self.get_enveloped("utilization_stats", &[("minutes", minutes.to_string())])
            .await
    }

    pub async fn radio_presets(&self) -> Result<Vec<RadioPreset>> {
        self.get_enveloped("radio_presets", &[]).await
    }

    // ------------------------------------------------------------------------
    // Control endpoints
    // ------------------------------------------------------------------------

    pub async fn update_radio_config(&self, update: &RadioConfigUpdate) -> Result<Ack> {
        log::info!("Updating radio config: {update:?}");
        self.post_command("update_radio_config", update).await
    }

    pub async fn set_mode(&self, mode: Mode) -> Result<Ack> {
        log::info!("Setting mode to {mode:?}");
        self.post_command("set_mode", &json!({ "mode": mode })).await
    }

    pub async fn set_duty_cycle(&self, enabled: bool) -> Result<Ack> {
        log::info!("Setting duty cycle enforcement to {enabled}");
        self.post_command("set_duty_cycle", &json!({ "enabled": enabled }))
            .await
    }

    pub async fn set_log_level(&self, level: LogLevel) -> Result<Ack> {
        self.post_command("set_log_level", &json!({ "level": level }))
            .await
    }

    pub async fn send_advert(&self) -> Result<Ack> {
        log::info!("Requesting advert broadcast");
        self.post_command("send_advert", &json!({})).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, method, path, query_param},
    };

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(server.uri(), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_recent_packets_sends_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/recent_packets"))
            .and(query_param("limit", "25"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": [{"timestamp": 1700000000.5, "packet_hash": "ab12", "type": 2, "route": 1, "rssi": -101, "snr": -3.25}]
            })))
            .mount(&server)
            .await;

        let packets = client(&server).recent_packets(25).await.unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].packet_hash, "ab12");
        assert_eq!(packets[0].type_name(), "TXT_MSG");
    }

    #[tokio::test]
    async fn test_stats_is_bare_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "node_name": "hilltop", "rx_count": 120, "tx_count": 40, "uptime_seconds": 3600
            })))
            .mount(&server)
            .await;

        let stats = client(&server).stats().await.unwrap();
        assert_eq!(stats.node_name, "hilltop");
        assert_eq!(stats.rx_count, 120);
    }

    #[tokio::test]
    async fn test_non_2xx_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/hardware_stats"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        match client(&server).hardware_stats().await {
            Err(Error::Http { status, endpoint }) => {
                assert_eq!(status, 503);
                assert_eq!(endpoint, "hardware_stats");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_success_false_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/logs"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"success": false, "error": "x"})),
            )
            .mount(&server)
            .await;

        assert!(matches!(client(&server).logs().await, Err(Error::Api(e)) if e == "x"));
    }

    #[tokio::test]
    async fn test_bucketed_stats_validates_count() {
        let server = MockServer::start().await;
        let bucket = |start: f64| json!({"start": start, "end": start + 300.0, "count": 2});
        Mock::given(method("GET"))
            .and(path("/api/bucketed_stats"))
            .and(query_param("buckets", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {
                    "bucket_count": 2,
                    "time_range_minutes": 15,
                    "received": [bucket(0.0), bucket(300.0)],
                    "forwarded": [bucket(0.0), bucket(300.0)],
                    "dropped": [bucket(0.0), bucket(300.0)],
                    "transmitted": [bucket(0.0), bucket(300.0)]
                }
            })))
            .mount(&server)
            .await;

        assert!(matches!(
            client(&server).bucketed_stats(15, 3).await,
            Err(Error::InvalidBuckets(_))
        ));
    }

    #[tokio::test]
    async fn test_bucket_total_matches_utilization_packet_count() {
        let server = MockServer::start().await;
        let counts = [3u64, 0, 5, 1, 0, 0, 7, 2, 4, 0, 1, 4];
        let series: Vec<_> = counts
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let start = 1_700_000_000.0 + i as f64 * 300.0;
                json!({"start": start, "end": start + 300.0, "count": c})
            })
            .collect();
        Mock::given(method("GET"))
            .and(path("/api/bucketed_stats"))
            .and(query_param("minutes", "60"))
            .and(query_param("buckets", "12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {
                    "bucket_count": 12,
                    "time_range_minutes": 60,
                    "received": series,
                    "forwarded": series,
                    "dropped": series,
                    "transmitted": series
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/utilization_stats"))
            .and(query_param("minutes", "60"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {"time_range_minutes": 60, "packet_count": 27, "utilization_percent": 1.5}
            })))
            .mount(&server)
            .await;

        let api = client(&server);
        let buckets = api.bucketed_stats(60, 12).await.unwrap();
        let whole_range = api.utilization_stats(60).await.unwrap();
        assert_eq!(
            crate::metrics::bucket_total(&buckets.received),
            whole_range.packet_count
        );
    }

    #[tokio::test]
    async fn test_set_mode_posts_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/set_mode"))
            .and(body_json(json!({"mode": "monitor"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        let ack = client(&server).set_mode(Mode::Monitor).await.unwrap();
        assert!(ack.message.is_none());
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/radio_presets"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        assert!(matches!(
            client(&server).radio_presets().await,
            Err(Error::Decode(_))
        ));
    }
}
