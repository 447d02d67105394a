// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! Unit tests for the provider registry, payload contract and adapter cache.

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use crate::crd::{
        NamespacedName, ProviderType, RecordProviderStatus, RecordSpecInner, RecordType,
    };
    use crate::provider::{cache_lookup, cache_store, DnsProvider, Payload, ProviderError};

    fn record_spec() -> RecordSpecInner {
        RecordSpecInner {
            name: "a.example.com".to_string(),
            r#type: RecordType::A,
            value: "1.2.3.4".to_string(),
            ttl: None,
            extra: None,
        }
    }

    /// Adapter that fulfils the payload contract without a backend.
    struct FakeProvider;

    #[async_trait]
    impl DnsProvider for FakeProvider {
        async fn create(&self, payload: &mut Payload) -> Result<(), ProviderError> {
            payload.id = "fake-id".to_string();
            Ok(())
        }

        async fn update(&self, _payload: &mut Payload) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn delete(&self, payload: &mut Payload) -> Result<(), ProviderError> {
            payload.id.clear();
            payload.data.clear();
            Ok(())
        }
    }

    #[test]
    fn test_payload_from_status() {
        let status = RecordProviderStatus {
            provider: NamespacedName::new("ns", "p"),
            record_id: "id-1".to_string(),
            data: "blob".to_string(),
            message: "stale".to_string(),
        };
        let payload = Payload::from_status(&status, &record_spec());
        assert_eq!(payload.id, "id-1");
        assert_eq!(payload.data, "blob");
        assert_eq!(payload.record.name, "a.example.com");
    }

    #[tokio::test]
    async fn test_payload_cleared_after_delete() {
        let provider = FakeProvider;
        let mut payload = Payload {
            id: "id-1".to_string(),
            data: "blob".to_string(),
            record: record_spec(),
        };
        provider.delete(&mut payload).await.unwrap();
        assert!(payload.id.is_empty());
        assert!(payload.data.is_empty());
    }

    #[test]
    fn test_cache_miss() {
        assert!(cache_lookup("no-such-uid").is_none());
    }

    #[test]
    fn test_cache_store_and_generation() {
        cache_store("uid-cache-test", Box::new(FakeProvider), 3);

        let cached = cache_lookup("uid-cache-test").expect("entry published");
        assert_eq!(cached.generation, 3);

        // A provider spec change republishes under a new generation.
        cache_store("uid-cache-test", Box::new(FakeProvider), 4);
        let cached = cache_lookup("uid-cache-test").expect("entry published");
        assert_eq!(cached.generation, 4);
    }

    #[test]
    fn test_job_running_classification() {
        assert!(ProviderError::JobRunning.is_job_running());
        assert!(!ProviderError::NotRegistered(ProviderType::Job).is_job_running());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ProviderError::NotRegistered(ProviderType::Cloudflare).to_string(),
            "provider not found: CLOUDFLARE"
        );
        assert_eq!(ProviderError::JobRunning.to_string(), "job is running");
        assert_eq!(
            ProviderError::JobFailed {
                reason: "BackoffLimitExceeded".to_string(),
                message: "too many retries".to_string(),
            }
            .to_string(),
            "job failed, BackoffLimitExceeded: too many retries"
        );
    }
}
