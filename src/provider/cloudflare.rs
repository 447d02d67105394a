// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! Cloudflare DNS adapter.
//!
//! Talks to the Cloudflare v4 API with either an API token or the legacy
//! key + email pair. The zone id is resolved by name once, at adapter
//! construction, so every record operation is a single call.
//!
//! Duplicate handling: when `matchExistsRecord` is set and a create runs into
//! error code 81058 (record already exists), the adapter looks the record up
//! by (name, type, content) and adopts its id instead of failing.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{
    EXTRA_KEY_CLOUDFLARE_COMMENT, EXTRA_KEY_CLOUDFLARE_PROXIED, EXTRA_KEY_CLOUDFLARE_TAGS,
};
use crate::crd::{ProviderType, RecordSpecInner};

use super::{DnsProvider, FactoryInput, Payload, ProviderError};

const API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Error code Cloudflare reports for an already-existing identical record.
const CODE_RECORD_ALREADY_EXISTS: &str = "81058";

pub struct CloudflareProvider {
    http: reqwest::Client,
    api_base: String,
    zone_id: String,
    match_exists_record: bool,
}

#[derive(Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiError>,
    result: Option<T>,
}

#[derive(Deserialize)]
struct ApiError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct DnsRecord {
    id: String,
}

#[derive(Deserialize)]
struct Zone {
    id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DnsRecordRequest<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    record_type: String,
    content: &'a str,
    ttl: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxied: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<Vec<String>>,
}

impl<'a> DnsRecordRequest<'a> {
    fn from_record(record: &'a RecordSpecInner) -> Self {
        Self {
            name: &record.name,
            record_type: record.r#type.to_string(),
            content: &record.value,
            // TTL 1 means "automatic" at Cloudflare.
            ttl: record.ttl.unwrap_or(1),
            proxied: record.extra_bool(EXTRA_KEY_CLOUDFLARE_PROXIED),
            comment: record.extra_str(EXTRA_KEY_CLOUDFLARE_COMMENT),
            tags: record.extra_strings(EXTRA_KEY_CLOUDFLARE_TAGS),
        }
    }
}

fn is_not_found(err: &ProviderError) -> bool {
    matches!(err, ProviderError::Backend { status, .. } if *status == StatusCode::NOT_FOUND.as_u16())
}

fn is_duplicate(err: &ProviderError) -> bool {
    matches!(err, ProviderError::Backend { code, .. } if code == CODE_RECORD_ALREADY_EXISTS)
}

impl CloudflareProvider {
    /// Build the adapter: set up authentication and resolve the zone id by
    /// name (`zoneName`, falling back to `selector.domain`).
    pub async fn connect(input: &FactoryInput) -> Result<Self, ProviderError> {
        let config = input.spec.cloudflare.as_ref().ok_or_else(|| {
            ProviderError::InvalidConfig("cloudflare provider requires spec.cloudflare".into())
        })?;

        let mut headers = HeaderMap::new();
        if !config.api_token.is_empty() {
            let value = format!("Bearer {}", config.api_token);
            headers.insert(
                reqwest::header::AUTHORIZATION,
                HeaderValue::from_str(&value).map_err(|_| {
                    ProviderError::InvalidConfig("cloudflare apiToken is not a valid header".into())
                })?,
            );
        } else if !config.key.is_empty() && !config.email.is_empty() {
            let key = HeaderValue::from_str(&config.key).map_err(|_| {
                ProviderError::InvalidConfig("cloudflare key is not a valid header".into())
            })?;
            let email = HeaderValue::from_str(&config.email).map_err(|_| {
                ProviderError::InvalidConfig("cloudflare email is not a valid header".into())
            })?;
            headers.insert("X-Auth-Key", key);
            headers.insert("X-Auth-Email", email);
        } else {
            return Err(ProviderError::InvalidConfig(
                "cloudflare provider requires either apiToken or key/email to be set".into(),
            ));
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        let mut provider = Self {
            http,
            api_base: API_BASE.to_string(),
            zone_id: String::new(),
            match_exists_record: config.match_exists_record,
        };

        let zone_name = if config.zone_name.is_empty() {
            &input.spec.selector.domain
        } else {
            &config.zone_name
        };
        provider.zone_id = provider.zone_id_by_name(zone_name).await?;

        Ok(provider)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&impl Serialize>,
    ) -> Result<T, ProviderError> {
        let url = format!("{}{path}", self.api_base);
        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        let envelope: Envelope<T> = response.json().await?;

        if !envelope.success || !status.is_success() {
            let (code, message) = envelope
                .errors
                .first()
                .map(|e| (e.code.to_string(), e.message.clone()))
                .unwrap_or_else(|| (status.as_u16().to_string(), "request failed".into()));
            return Err(ProviderError::Backend {
                status: status.as_u16(),
                code,
                message,
            });
        }

        envelope.result.ok_or_else(|| ProviderError::Backend {
            status: status.as_u16(),
            code: status.as_u16().to_string(),
            message: "response carried no result".into(),
        })
    }

    async fn zone_id_by_name(&self, zone_name: &str) -> Result<String, ProviderError> {
        let zones: Vec<Zone> = self
            .call(
                Method::GET,
                &format!("/zones?name={zone_name}"),
                None::<&()>,
            )
            .await?;
        zones
            .into_iter()
            .next()
            .map(|zone| zone.id)
            .ok_or_else(|| ProviderError::InvalidConfig(format!("cloudflare zone {zone_name} not found")))
    }

    /// Look up an existing record by (name, type, content); empty when none.
    async fn find(&self, record: &RecordSpecInner) -> Result<String, ProviderError> {
        let path = format!(
            "/zones/{}/dns_records?name={}&type={}&content={}",
            self.zone_id, record.name, record.r#type, record.value
        );
        let records: Vec<DnsRecord> = self.call(Method::GET, &path, None::<&()>).await?;
        Ok(records.into_iter().next().map(|r| r.id).unwrap_or_default())
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn create(&self, payload: &mut Payload) -> Result<(), ProviderError> {
        let request = DnsRecordRequest::from_record(&payload.record);
        let result: Result<DnsRecord, _> = self
            .call(
                Method::POST,
                &format!("/zones/{}/dns_records", self.zone_id),
                Some(&request),
            )
            .await;

        match result {
            Ok(record) => {
                payload.id = record.id;
                Ok(())
            }
            Err(err) if self.match_exists_record && is_duplicate(&err) => {
                debug!(name = %payload.record.name, "record already exists, adopting");
                payload.id = self.find(&payload.record).await?;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn update(&self, payload: &mut Payload) -> Result<(), ProviderError> {
        let request = DnsRecordRequest::from_record(&payload.record);
        let result: Result<DnsRecord, _> = self
            .call(
                Method::PUT,
                &format!("/zones/{}/dns_records/{}", self.zone_id, payload.id),
                Some(&request),
            )
            .await;

        match result {
            Ok(record) => {
                payload.id = record.id;
                Ok(())
            }
            Err(err) if is_not_found(&err) => self.create(payload).await,
            Err(err) => Err(err),
        }
    }

    async fn delete(&self, payload: &mut Payload) -> Result<(), ProviderError> {
        let result: Result<DnsRecord, _> = self
            .call(
                Method::DELETE,
                &format!("/zones/{}/dns_records/{}", self.zone_id, payload.id),
                None::<&()>,
            )
            .await;

        match result {
            Ok(_) => {}
            Err(err) if is_not_found(&err) => {}
            Err(err) => return Err(err),
        }
        payload.id.clear();
        payload.data.clear();
        Ok(())
    }
}

/// Register the Cloudflare factory.
pub fn register() {
    super::register(
        ProviderType::Cloudflare,
        Box::new(|input| {
            Box::pin(async move {
                let provider = CloudflareProvider::connect(&input).await?;
                Ok(Box::new(provider) as Box<dyn DnsProvider>)
            })
        }),
    );
}

#[cfg(test)]
#[path = "cloudflare_tests.rs"]
mod cloudflare_tests;
