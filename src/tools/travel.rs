//! City lookups through RapidAPI: current weather, restaurants and hotels.
//! Response bodies are handed back to the model verbatim.

use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::common::required_str;
use super::{ParamType, ToolArgs, ToolHandler, ToolRegistry, ToolSchema};

pub const WEATHER_HOST: &str = "weatherapi-com.p.rapidapi.com";
pub const TRIPADVISOR_HOST: &str = "tripadvisor16.p.rapidapi.com";
pub const BOOKING_HOST: &str = "booking-com18.p.rapidapi.com";

static GEO_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"g(\d+)").expect("geo id pattern is valid"));

/// Pull the numeric geo id out of a TripAdvisor document id such as `loc;60763;g60763`.
pub fn extract_geo_id(document_id: &str) -> Option<&str> {
    GEO_ID_RE
        .captures(document_id)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

#[derive(Debug, Clone)]
pub struct RapidApiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    /// Replaces `https://{host}` for every host; used against local mock servers.
    base_override: Option<String>,
}

impl RapidApiClient {
    pub fn new(http: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            http,
            api_key,
            base_override: None,
        }
    }

    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base_override = Some(base.into());
        self
    }

    fn url(&self, host: &str, path: &str) -> String {
        match &self.base_override {
            Some(base) => format!("{}{}", base.trim_end_matches('/'), path),
            None => format!("https://{host}{path}"),
        }
    }

    async fn get_text(&self, host: &str, path: &str, query: &[(&str, &str)]) -> Result<String> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("RAPIDAPI_KEY is not set"))?;
        let url = self.url(host, path);
        debug!(%host, %path, ?query, "rapidapi request");
        let resp = self
            .http
            .get(&url)
            .header("x-rapidapi-key", key)
            .header("x-rapidapi-host", host)
            .query(query)
            .send()
            .await
            .with_context(|| format!("send request to {host}"))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .with_context(|| format!("read response from {host}"))?;
        if !status.is_success() {
            return Err(anyhow!("{host} returned {status}: {body}"));
        }
        Ok(body)
    }

    pub async fn weather(&self, city: &str) -> Result<String> {
        self.get_text(WEATHER_HOST, "/current.json", &[("q", city)])
            .await
    }

    pub async fn restaurants(&self, city: &str) -> Result<String> {
        let location = self
            .get_text(
                TRIPADVISOR_HOST,
                "/api/v1/restaurant/searchLocation",
                &[("query", city)],
            )
            .await?;
        let location: Value =
            serde_json::from_str(&location).context("decode restaurant location search")?;
        let document_id = location
            .pointer("/data/0/documentId")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("no restaurant location found for {city}"))?;
        let geo_id = extract_geo_id(document_id)
            .ok_or_else(|| anyhow!("no geo id in document id {document_id}"))?;
        self.get_text(
            TRIPADVISOR_HOST,
            "/api/v1/restaurant/searchRestaurants",
            &[("locationId", geo_id)],
        )
        .await
    }

    pub async fn hotels(&self, city: &str) -> Result<String> {
        self.get_text(BOOKING_HOST, "/stays/auto-complete", &[("query", city)])
            .await
    }
}

#[derive(Clone, Copy)]
enum Lookup {
    Weather,
    Restaurants,
    Hotels,
}

struct CityLookup {
    client: RapidApiClient,
    lookup: Lookup,
}

#[async_trait]
impl ToolHandler for CityLookup {
    async fn call(&self, args: &ToolArgs) -> Result<String> {
        let city = required_str(args, "city")?;
        match self.lookup {
            Lookup::Weather => self.client.weather(city).await,
            Lookup::Restaurants => self.client.restaurants(city).await,
            Lookup::Hotels => self.client.hotels(city).await,
        }
    }
}

pub fn register(registry: &mut ToolRegistry, client: RapidApiClient) -> Result<()> {
    let tools = [
        (
            "get_weather_for_city",
            "Retrieves the current weather for a city.",
            Lookup::Weather,
        ),
        (
            "get_restaurants_for_city",
            "Retrieves the restaurants for a city.",
            Lookup::Restaurants,
        ),
        (
            "get_hotels_for_city",
            "Retrieves the hotels for a city.",
            Lookup::Hotels,
        ),
    ];
    for (name, description, lookup) in tools {
        registry.register(
            ToolSchema::new(name, description).required(
                "city",
                ParamType::String,
                "The city (e.g., 'Phoenix', 'Sacramento').",
            ),
            CityLookup {
                client: client.clone(),
                lookup,
            },
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use serde_json::json;

    fn client(server: &Server) -> RapidApiClient {
        RapidApiClient::new(reqwest::Client::new(), Some("k".into()))
            .with_base_url(server.url_str(""))
    }

    #[test]
    fn geo_id_from_document_id() {
        assert_eq!(extract_geo_id("loc;60763;g60763"), Some("60763"));
        assert_eq!(extract_geo_id("g187147"), Some("187147"));
        assert_eq!(extract_geo_id("nothing here"), None);
    }

    #[tokio::test]
    async fn weather_sends_rapidapi_headers() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/current.json"),
                request::headers(contains(key("x-rapidapi-key"))),
                request::headers(contains(key("x-rapidapi-host"))),
                request::query(url_decoded(contains(("q", "New York")))),
            ])
            .respond_with(status_code(200).body(r#"{"current":{"temp_c":21}}"#)),
        );
        let body = client(&server).weather("New York").await.unwrap();
        assert_eq!(body, r#"{"current":{"temp_c":21}}"#);
    }

    #[tokio::test]
    async fn restaurants_resolve_geo_id_first() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/api/v1/restaurant/searchLocation"),
                request::query(url_decoded(contains(("query", "Paris")))),
            ])
            .respond_with(json_encoded(json!({
                "data": [{"documentId": "loc;187147;g187147", "localizedName": "Paris"}]
            }))),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/api/v1/restaurant/searchRestaurants"),
                request::query(url_decoded(contains(("locationId", "187147")))),
            ])
            .respond_with(status_code(200).body("restaurants!")),
        );
        let body = client(&server).restaurants("Paris").await.unwrap();
        assert_eq!(body, "restaurants!");
    }

    #[tokio::test]
    async fn restaurants_without_location_fail() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path(
                "GET",
                "/api/v1/restaurant/searchLocation",
            ))
            .respond_with(json_encoded(json!({"data": []}))),
        );
        let err = client(&server).restaurants("Atlantis").await.unwrap_err();
        assert!(err.to_string().contains("Atlantis"));
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/stays/auto-complete"))
                .respond_with(status_code(429).body("quota")),
        );
        let err = client(&server).hotels("Rome").await.unwrap_err();
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let client = RapidApiClient::new(reqwest::Client::new(), None)
            .with_base_url("http://127.0.0.1:9");
        let err = client.weather("Paris").await.unwrap_err();
        assert!(err.to_string().contains("RAPIDAPI_KEY"));
    }
}
