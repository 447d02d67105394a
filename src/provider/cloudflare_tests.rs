// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! Unit tests for the Cloudflare adapter's request shaping and error
//! classification.

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::constants::{
        EXTRA_KEY_CLOUDFLARE_COMMENT, EXTRA_KEY_CLOUDFLARE_PROXIED, EXTRA_KEY_CLOUDFLARE_TAGS,
    };
    use crate::crd::{RecordSpecInner, RecordType};
    use crate::provider::cloudflare::{is_duplicate, is_not_found, DnsRecordRequest};
    use crate::provider::ProviderError;

    fn record(extra: &[(&str, &str)]) -> RecordSpecInner {
        RecordSpecInner {
            name: "a.example.com".to_string(),
            r#type: RecordType::A,
            value: "1.2.3.4".to_string(),
            ttl: None,
            extra: if extra.is_empty() {
                None
            } else {
                Some(
                    extra
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<BTreeMap<_, _>>(),
                )
            },
        }
    }

    fn backend(status: u16, code: &str) -> ProviderError {
        ProviderError::Backend {
            status,
            code: code.to_string(),
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_request_defaults_to_automatic_ttl() {
        let record = record(&[]);
        let request = DnsRecordRequest::from_record(&record);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["ttl"], 1);
        assert_eq!(value["type"], "A");
        assert_eq!(value["name"], "a.example.com");
        assert_eq!(value["content"], "1.2.3.4");
        assert!(value.get("proxied").is_none());
        assert!(value.get("comment").is_none());
        assert!(value.get("tags").is_none());
    }

    #[test]
    fn test_request_carries_extra_keys() {
        let record = record(&[
            (EXTRA_KEY_CLOUDFLARE_PROXIED, "true"),
            (EXTRA_KEY_CLOUDFLARE_COMMENT, "managed"),
            (EXTRA_KEY_CLOUDFLARE_TAGS, "team:dns,env:prod"),
        ]);
        let request = DnsRecordRequest::from_record(&record);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["proxied"], true);
        assert_eq!(value["comment"], "managed");
        assert_eq!(
            value["tags"],
            serde_json::json!(["team:dns", "env:prod"])
        );
    }

    #[test]
    fn test_request_explicit_ttl() {
        let mut record = record(&[]);
        record.ttl = Some(300);
        let request = DnsRecordRequest::from_record(&record);
        assert_eq!(serde_json::to_value(&request).unwrap()["ttl"], 300);
    }

    #[test]
    fn test_duplicate_classification() {
        assert!(is_duplicate(&backend(400, "81058")));
        assert!(!is_duplicate(&backend(400, "81057")));
        assert!(!is_duplicate(&ProviderError::JobRunning));
    }

    #[test]
    fn test_not_found_classification() {
        assert!(is_not_found(&backend(404, "81044")));
        assert!(is_not_found(&backend(404, "404")));
        assert!(!is_not_found(&backend(400, "81058")));
    }
}
