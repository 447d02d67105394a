// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! Aliyun DNS adapter.
//!
//! Talks to the Alidns RPC API (`Version=2015-01-09`) with HMAC-SHA1 request
//! signing. The managed domain comes from `spec.aliyun.domainName`, falling
//! back to `spec.selector.domain`; construction verifies the domain exists.
//!
//! The RR field is derived from the record name: the bare domain maps to an
//! empty RR, `www.example.com` under `example.com` maps to `www`. A record
//! whose create runs into `DomainRecordDuplicate` is looked up by
//! (domain, RR, type, value) and its id adopted; an update that reports
//! `DomainRecordNotBelongToUser` falls back to create.

use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha1::Sha1;

use crate::constants::EXTRA_KEY_ALIYUN_LINE;
use crate::crd::{ProviderType, RecordSpecInner};

use super::{DnsProvider, FactoryInput, Payload, ProviderError};

const DEFAULT_ENDPOINT: &str = "dns.aliyuncs.com";
const API_VERSION: &str = "2015-01-09";

const CODE_RECORD_DUPLICATE: &str = "DomainRecordDuplicate";
const CODE_RECORD_NOT_FOUND: &str = "DomainRecordNotBelongToUser";

/// RFC 3986 unreserved characters stay literal; everything else is escaped.
const RPC_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub struct AliyunProvider {
    client: AliyunClient,
    domain_name: String,
}

/// Minimal signed client for the Alidns RPC API.
struct AliyunClient {
    http: reqwest::Client,
    endpoint: String,
    access_key_id: String,
    access_key_secret: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RpcError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecordIdResponse {
    record_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeRecordsResponse {
    total_count: i64,
    #[serde(default)]
    domain_records: DomainRecords,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
struct DomainRecords {
    #[serde(default)]
    record: Vec<DomainRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DomainRecord {
    record_id: String,
}

#[derive(Deserialize)]
struct IgnoredResponse {}

fn percent(value: &str) -> String {
    utf8_percent_encode(value, RPC_ENCODE_SET).to_string()
}

fn is_duplicate(err: &ProviderError) -> bool {
    matches!(err, ProviderError::Backend { code, .. } if code == CODE_RECORD_DUPLICATE)
}

fn is_not_found(err: &ProviderError) -> bool {
    matches!(err, ProviderError::Backend { code, .. } if code == CODE_RECORD_NOT_FOUND)
}

impl AliyunClient {
    /// Issue one signed RPC call.
    ///
    /// Signature: sorted, percent-encoded query canonicalized into
    /// `GET&%2F&<query>` and HMAC-SHA1 signed with `<secret>&`.
    async fn rpc<T: DeserializeOwned>(
        &self,
        action: &str,
        params: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let mut query: Vec<(String, String)> = vec![
            ("Action".into(), action.into()),
            ("Format".into(), "JSON".into()),
            ("Version".into(), API_VERSION.into()),
            ("AccessKeyId".into(), self.access_key_id.clone()),
            ("SignatureMethod".into(), "HMAC-SHA1".into()),
            ("SignatureVersion".into(), "1.0".into()),
            ("SignatureNonce".into(), uuid::Uuid::new_v4().to_string()),
            (
                "Timestamp".into(),
                Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            ),
        ];
        for (key, value) in params {
            query.push(((*key).into(), value.clone()));
        }
        query.sort();

        let canonical = query
            .iter()
            .map(|(k, v)| format!("{}={}", percent(k), percent(v)))
            .collect::<Vec<_>>()
            .join("&");
        let string_to_sign = format!("GET&{}&{}", percent("/"), percent(&canonical));

        let mut mac = Hmac::<Sha1>::new_from_slice(format!("{}&", self.access_key_secret).as_bytes())
            .expect("hmac accepts any key length");
        mac.update(string_to_sign.as_bytes());
        let signature =
            base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        let url = format!(
            "https://{}/?{}&Signature={}",
            self.endpoint,
            canonical,
            percent(&signature)
        );

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let error: RpcError = response.json().await.unwrap_or(RpcError {
                code: status.as_u16().to_string(),
                message: "request failed".into(),
            });
            return Err(ProviderError::Backend {
                status: status.as_u16(),
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.json().await?)
    }
}

impl AliyunProvider {
    /// Build the adapter and verify the managed domain exists.
    pub async fn connect(input: &FactoryInput) -> Result<Self, ProviderError> {
        let config = input.spec.aliyun.as_ref().ok_or_else(|| {
            ProviderError::InvalidConfig("aliyun provider requires spec.aliyun".into())
        })?;

        let domain_name = if !config.domain_name.is_empty() {
            config.domain_name.clone()
        } else if !input.spec.selector.domain.is_empty() {
            input.spec.selector.domain.clone()
        } else {
            return Err(ProviderError::InvalidConfig(
                "aliyun DNS provider requires a domain name".into(),
            ));
        };

        let endpoint = if config.endpoint.is_empty() {
            DEFAULT_ENDPOINT.to_string()
        } else {
            config.endpoint.clone()
        };

        let provider = Self {
            client: AliyunClient {
                http: reqwest::Client::new(),
                endpoint,
                access_key_id: config.access_key_id.clone(),
                access_key_secret: config.access_key_secret.clone(),
            },
            domain_name,
        };

        let _: IgnoredResponse = provider
            .client
            .rpc(
                "DescribeDomainInfo",
                &[("DomainName", provider.domain_name.clone())],
            )
            .await?;

        Ok(provider)
    }

    /// RR for a record name: empty for the bare domain, otherwise the name
    /// with the `.<domain>` suffix stripped.
    fn rr(&self, name: &str) -> String {
        if name == self.domain_name {
            return String::new();
        }
        name.strip_suffix(&format!(".{}", self.domain_name))
            .unwrap_or(name)
            .to_string()
    }

    fn record_params(&self, record: &RecordSpecInner) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("RR", self.rr(&record.name)),
            ("Type", record.r#type.to_string()),
            ("Value", record.value.clone()),
        ];
        // TTL zero / unset is omitted so the backend applies its default.
        if let Some(ttl) = record.ttl.filter(|ttl| *ttl != 0) {
            params.push(("TTL", ttl.to_string()));
        }
        if let Some(line) = record.extra_str(EXTRA_KEY_ALIYUN_LINE) {
            params.push(("Line", line.to_string()));
        }
        params
    }

    /// Look up an existing record by (domain, RR, type, value); empty when none.
    async fn find(&self, record: &RecordSpecInner) -> Result<String, ProviderError> {
        let response: DescribeRecordsResponse = self
            .client
            .rpc(
                "DescribeDomainRecords",
                &[
                    ("DomainName", self.domain_name.clone()),
                    ("RRKeyWord", self.rr(&record.name)),
                    ("TypeKeyWord", record.r#type.to_string()),
                    ("ValueKeyWord", record.value.clone()),
                ],
            )
            .await?;
        if response.total_count == 0 {
            return Ok(String::new());
        }
        Ok(response
            .domain_records
            .record
            .into_iter()
            .next()
            .map(|r| r.record_id)
            .unwrap_or_default())
    }
}

#[async_trait]
impl DnsProvider for AliyunProvider {
    async fn create(&self, payload: &mut Payload) -> Result<(), ProviderError> {
        let mut params = vec![("DomainName", self.domain_name.clone())];
        params.extend(self.record_params(&payload.record));

        let result: Result<RecordIdResponse, _> =
            self.client.rpc("AddDomainRecord", &params).await;

        match result {
            Ok(response) => {
                payload.id = response.record_id;
                Ok(())
            }
            Err(err) if is_duplicate(&err) => {
                let id = self.find(&payload.record).await?;
                if id.is_empty() {
                    Err(err)
                } else {
                    payload.id = id;
                    Ok(())
                }
            }
            Err(err) => Err(err),
        }
    }

    async fn update(&self, payload: &mut Payload) -> Result<(), ProviderError> {
        let mut params = vec![("RecordId", payload.id.clone())];
        params.extend(self.record_params(&payload.record));

        let result: Result<RecordIdResponse, _> =
            self.client.rpc("UpdateDomainRecord", &params).await;

        match result {
            Ok(response) => {
                payload.id = response.record_id;
                Ok(())
            }
            // The backend no longer knows the id; ensure the record exists.
            Err(err) if is_not_found(&err) => self.create(payload).await,
            // Content already matches; nothing to change.
            Err(err) if is_duplicate(&err) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn delete(&self, payload: &mut Payload) -> Result<(), ProviderError> {
        let result: Result<IgnoredResponse, _> = self
            .client
            .rpc("DeleteDomainRecord", &[("RecordId", payload.id.clone())])
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

/// Register the Aliyun factory.
pub fn register() {
    super::register(
        ProviderType::Aliyun,
        Box::new(|input| {
            Box::pin(async move {
                let provider = AliyunProvider::connect(&input).await?;
                Ok(Box::new(provider) as Box<dyn DnsProvider>)
            })
        }),
    );
}

#[cfg(test)]
#[path = "aliyun_tests.rs"]
mod aliyun_tests;
