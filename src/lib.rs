// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! # kube-dns-manager
//!
//! A Kubernetes controller that synchronizes declarative DNS-record
//! resources with external DNS provider APIs (Aliyun, Cloudflare, AdGuard
//! Home, and a Job-dispatched extension mechanism).
//!
//! Cluster objects flow through a four-stage pipeline: a Generator selects
//! source resources by label and materializes one ResourceWatcher per match;
//! each ResourceWatcher renders a user template against a resource data graph
//! into child Records; the Record loop fans every Record out to the matching
//! Providers; the Provider loop validates and caches a handle to each
//! external backend.
//!
//! ## Modules
//!
//! - [`crd`] - Custom Resource Definition types
//! - [`reconcilers`] - the four control loops
//! - [`provider`] - provider registry, payload contract and adapters
//! - [`template`] - template engine, cache and resource data graph
//! - [`context`] - shared client + reflector stores
//!
//! ## Example
//!
//! ```yaml
//! apiVersion: dns.xzzpig.com/v1
//! kind: Provider
//! metadata:
//!   name: cloudflare
//! spec:
//!   type: CLOUDFLARE
//!   selector:
//!     domain: example.com
//!   cloudflare:
//!     apiToken: "..."
//! ```

pub mod constants;
pub mod context;
pub mod crd;
pub mod metrics;
pub mod provider;
pub mod reconcilers;
pub mod selector;
pub mod template;
