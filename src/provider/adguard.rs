// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! AdGuard Home rewrite adapter.
//!
//! AdGuard Home has no server-side record identity: a rewrite is just a
//! `{domain, answer}` pair managed through `control/rewrite/add`,
//! `control/rewrite/delete` and `control/rewrite/list`. The adapter therefore
//! persists the JSON-encoded pair itself as the payload id, and an update is
//! a delete of the old pair followed by a create of the new one, skipped
//! entirely when the pair is unchanged.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crd::ProviderType;

use super::{DnsProvider, FactoryInput, Payload, ProviderError};

pub struct AdguardProvider {
    http: reqwest::Client,
    base_url: reqwest::Url,
    username: String,
    password: String,
}

/// One AdGuard Home DNS rewrite.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RewriteEntry {
    pub domain: String,
    pub answer: String,
}

impl RewriteEntry {
    fn from_payload(payload: &Payload) -> Self {
        Self {
            domain: payload.record.name.clone(),
            answer: payload.record.value.clone(),
        }
    }
}

impl AdguardProvider {
    pub fn connect(input: &FactoryInput) -> Result<Self, ProviderError> {
        let config = input.spec.adguard.as_ref().ok_or_else(|| {
            ProviderError::InvalidConfig("adguard provider requires spec.adguard".into())
        })?;
        let base_url = reqwest::Url::parse(&config.url)
            .map_err(|err| ProviderError::InvalidConfig(format!("adguard url: {err}")))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<reqwest::Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|err| ProviderError::InvalidConfig(format!("adguard url: {err}")))
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.username.is_empty() {
            request
        } else {
            request.basic_auth(&self.username, Some(&self.password))
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(ProviderError::Backend {
            status: status.as_u16(),
            code: status.as_u16().to_string(),
            message,
        })
    }

    async fn list(&self) -> Result<Vec<RewriteEntry>, ProviderError> {
        let url = self.endpoint("control/rewrite/list")?;
        let response = self.authorized(self.http.get(url)).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn add(&self, entry: &RewriteEntry) -> Result<(), ProviderError> {
        let url = self.endpoint("control/rewrite/add")?;
        let response = self.authorized(self.http.post(url).json(entry)).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn remove(&self, entry: &RewriteEntry) -> Result<(), ProviderError> {
        let url = self.endpoint("control/rewrite/delete")?;
        let response = self.authorized(self.http.post(url).json(entry)).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl DnsProvider for AdguardProvider {
    async fn create(&self, payload: &mut Payload) -> Result<(), ProviderError> {
        let entry = RewriteEntry::from_payload(payload);
        let id = serde_json::to_string(&entry)?;
        self.add(&entry).await?;
        payload.id = id;
        Ok(())
    }

    async fn update(&self, payload: &mut Payload) -> Result<(), ProviderError> {
        if !payload.id.is_empty() {
            let old: RewriteEntry = serde_json::from_str(&payload.id)?;
            let new = RewriteEntry::from_payload(payload);
            if old == new {
                return Ok(());
            }
            self.remove(&old).await?;
        }
        self.create(payload).await
    }

    async fn delete(&self, payload: &mut Payload) -> Result<(), ProviderError> {
        let entry = RewriteEntry::from_payload(payload);
        // A rewrite someone already removed is success, not an error.
        if self.list().await?.contains(&entry) {
            self.remove(&entry).await?;
        }
        payload.id.clear();
        payload.data.clear();
        Ok(())
    }
}

/// Register the AdGuard Home factory.
pub fn register() {
    super::register(
        ProviderType::Adguard,
        Box::new(|input| {
            Box::pin(async move {
                let provider = AdguardProvider::connect(&input)?;
                Ok(Box::new(provider) as Box<dyn DnsProvider>)
            })
        }),
    );
}

#[cfg(test)]
#[path = "adguard_tests.rs"]
mod adguard_tests;
