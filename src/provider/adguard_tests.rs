// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! Unit tests for the AdGuard Home adapter's id encoding.

#[cfg(test)]
mod tests {
    use crate::crd::{AdguardProviderConfig, ProviderCommonSpec, ProviderType};
    use crate::provider::adguard::{AdguardProvider, RewriteEntry};
    use crate::provider::{FactoryInput, ProviderError};

    fn input(url: &str) -> FactoryInput {
        FactoryInput {
            client: stub_client(),
            name: "adguard".to_string(),
            namespace: Some("dns".to_string()),
            spec: ProviderCommonSpec {
                r#type: ProviderType::Adguard,
                adguard: Some(AdguardProviderConfig {
                    url: url.to_string(),
                    username: String::new(),
                    password: String::new(),
                }),
                ..Default::default()
            },
        }
    }

    // Connect never touches the cluster; any client value works for these
    // tests, and building one from a fixed config needs no environment.
    fn stub_client() -> kube::Client {
        let config = kube::Config::new("http://localhost:8080".parse().unwrap());
        kube::Client::try_from(config).expect("static config is valid")
    }

    #[test]
    fn test_id_is_json_encoded_pair() {
        let entry = RewriteEntry {
            domain: "a.example.com".to_string(),
            answer: "1.2.3.4".to_string(),
        };
        let id = serde_json::to_string(&entry).unwrap();
        assert_eq!(id, r#"{"domain":"a.example.com","answer":"1.2.3.4"}"#);

        let parsed: RewriteEntry = serde_json::from_str(&id).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn test_entry_equality_drives_update_noop() {
        let old = RewriteEntry {
            domain: "a.example.com".to_string(),
            answer: "1.2.3.4".to_string(),
        };
        let unchanged = old.clone();
        let changed = RewriteEntry {
            domain: "a.example.com".to_string(),
            answer: "5.6.7.8".to_string(),
        };
        assert_eq!(old, unchanged);
        assert_ne!(old, changed);
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_url() {
        let result = AdguardProvider::connect(&input("not a url"));
        assert!(matches!(result, Err(ProviderError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_connect_accepts_base_url() {
        assert!(AdguardProvider::connect(&input("http://adguard.dns:3000/")).is_ok());
    }
}
