// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! Unit tests for the shared reconciler helpers.

#[cfg(test)]
mod tests {
    use crate::constants::FINALIZER;
    use crate::crd::{Record, RecordSpec, RecordSpecInner, RecordType};
    use crate::reconcilers::has_finalizer;

    fn record() -> Record {
        Record::new(
            "r",
            RecordSpec {
                inner: RecordSpecInner {
                    name: "a.example.com".to_string(),
                    r#type: RecordType::A,
                    value: "1.2.3.4".to_string(),
                    ttl: None,
                    extra: None,
                },
            },
        )
    }

    #[test]
    fn test_has_finalizer_absent() {
        assert!(!has_finalizer(&record()));
    }

    #[test]
    fn test_has_finalizer_present() {
        let mut record = record();
        record.metadata.finalizers = Some(vec![FINALIZER.to_string()]);
        assert!(has_finalizer(&record));
    }

    #[test]
    fn test_has_finalizer_ignores_foreign_finalizers() {
        let mut record = record();
        record.metadata.finalizers = Some(vec!["other.io/finalizer".to_string()]);
        assert!(!has_finalizer(&record));
    }

    #[test]
    fn test_finalizer_string() {
        assert_eq!(FINALIZER, "dns.xzzpig.com/finalizer");
    }
}
