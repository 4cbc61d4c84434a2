/*
 *  provider.rs
 *
 *  SkyPane - weather worth watching
 *  (c) 2025-26 SkyPane contributors
 *
 *  Weather provider seam - abstract contract plus the HTTP client that
 *  talks to the signage host's weather service
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use async_trait::async_trait;
use flate2::read::GzDecoder;
use log::debug;
use reqwest::{Client, header};
use serde_json::Value;
use std::io::Read;
use std::time::Duration;
use thiserror::Error;

use crate::config::UnitSystem;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
    #[error("Malformed provider response: {0}")]
    Malformed(String),
    #[error("Provider client setup failed: {0}")]
    Setup(String),
}

/// Location selector for a fetch. `city = None` asks the host service to
/// fall back to device/IP geolocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastQuery {
    pub unit: UnitSystem,
    pub city: Option<String>,
}

/// Current conditions for the queried location.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurrentConditions {
    pub condition_text: String,
    pub localized_city: Option<String>,
    /// IANA timezone id, carried verbatim for display.
    pub timezone_id: Option<String>,
    /// UTC offset used for local-time label rendering.
    pub utc_offset_seconds: Option<i32>,
}

impl CurrentConditions {
    /// Build from a raw response object, trying each known field shape in
    /// order. Everything is optional; a bare `{}` yields the default.
    pub fn from_value(v: &Value) -> Self {
        let text_at = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| v.get(k).and_then(Value::as_str))
                .map(str::to_string)
        };
        Self {
            condition_text: text_at(&["WeatherText", "ConditionText"]).unwrap_or_default(),
            localized_city: text_at(&["LocalizedName", "City"]),
            timezone_id: text_at(&["Timezone", "TimezoneId"]),
            utc_offset_seconds: ["UtcOffsetSeconds", "GmtOffset"]
                .iter()
                .find_map(|k| v.get(*k).and_then(Value::as_i64))
                .map(|n| n as i32),
        }
    }
}

/// Abstract forecast source. Records come back as raw JSON values so the
/// normalizer owns all shape handling; transports stay dumb.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn hourly_forecast(
        &self,
        query: &ForecastQuery,
        hours: u32,
    ) -> Result<Vec<Value>, ProviderError>;

    async fn daily_forecast(
        &self,
        query: &ForecastQuery,
        days: u32,
    ) -> Result<Vec<Value>, ProviderError>;

    async fn current_conditions(
        &self,
        query: &ForecastQuery,
    ) -> Result<CurrentConditions, ProviderError>;
}

/// HTTP implementation against the host weather service.
///
/// One attempt per call; the scheduler's next tick is the retry policy.
#[derive(Debug)]
pub struct HttpWeatherProvider {
    client: Client,
    base_url: String,
}

impl HttpWeatherProvider {
    pub fn new(base_url: &str) -> Result<Self, ProviderError> {
        const VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

        let mut headers = header::HeaderMap::new();
        headers.insert("User-Agent", header::HeaderValue::from_static(VERSION));
        headers.insert("Accept", header::HeaderValue::from_static("application/json"));
        headers.insert("Accept-Encoding", header::HeaderValue::from_static("deflate, gzip, br"));
        headers.insert("Connection", header::HeaderValue::from_static("close"));

        let client = Client::builder()
            .connect_timeout(Duration::from_millis(500))
            .default_headers(headers)
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ProviderError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn query_params(query: &ForecastQuery) -> Vec<(String, String)> {
        let mut params = vec![("units".to_string(), query.unit.as_str().to_string())];
        if let Some(city) = &query.city {
            params.push(("city".to_string(), city.clone()));
        }
        params
    }

    async fn get_json(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<Value, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {} {:?}", url, params);
        let response = self.client.get(&url).query(params).send().await?;
        let raw = response.error_for_status()?.bytes().await?;
        let plain = decode_body(&raw);
        Ok(serde_json::from_str(&plain)?)
    }

    async fn get_records(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<Vec<Value>, ProviderError> {
        let body = self.get_json(path, params).await?;
        records_from(&body)
    }
}

/// Try to decode as gzip first, fall back to plain text if it fails.
fn decode_body(raw: &[u8]) -> String {
    let mut decoder = GzDecoder::new(raw);
    let mut decoded = String::new();
    match decoder.read_to_string(&mut decoded) {
        Ok(_) => decoded,
        Err(_) => String::from_utf8_lossy(raw).to_string(),
    }
}

/// Accept either a bare JSON array or an `{"items": [...]}` envelope.
fn records_from(body: &Value) -> Result<Vec<Value>, ProviderError> {
    if let Some(arr) = body.as_array() {
        return Ok(arr.clone());
    }
    if let Some(arr) = body.get("items").and_then(Value::as_array) {
        return Ok(arr.clone());
    }
    Err(ProviderError::Malformed(
        "expected a forecast record array".to_string(),
    ))
}

#[async_trait]
impl WeatherProvider for HttpWeatherProvider {
    async fn hourly_forecast(
        &self,
        query: &ForecastQuery,
        hours: u32,
    ) -> Result<Vec<Value>, ProviderError> {
        let mut params = Self::query_params(query);
        params.push(("hours".to_string(), hours.to_string()));
        self.get_records("/v1/forecast/hourly", &params).await
    }

    async fn daily_forecast(
        &self,
        query: &ForecastQuery,
        days: u32,
    ) -> Result<Vec<Value>, ProviderError> {
        let mut params = Self::query_params(query);
        params.push(("days".to_string(), days.to_string()));
        self.get_records("/v1/forecast/daily", &params).await
    }

    async fn current_conditions(
        &self,
        query: &ForecastQuery,
    ) -> Result<CurrentConditions, ProviderError> {
        let params = Self::query_params(query);
        let body = self.get_json("/v1/conditions", &params).await?;
        Ok(CurrentConditions::from_value(&body))
    }
}
