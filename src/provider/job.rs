// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! Kubernetes Job adapter: the extension mechanism for backends without a
//! built-in adapter.
//!
//! Each record operation renders a user-supplied Job manifest template
//! (create/update/delete variants, the latter two defaulting to the create
//! template), submits it, and tracks it through the payload id as
//! `namespace/name`. While the Job runs the adapter returns the non-fatal
//! [`ProviderError::JobRunning`] sentinel so the Record loop requeues.
//!
//! On `Complete=True` the optional `dataTemplate` is rendered into the
//! payload's opaque `data` slot according to `dataUpdateStrategy`, the Job is
//! deleted with background propagation, and the operation succeeds. On
//! `Failed=True` the Job's reason and message surface as the operation error.

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use kube::api::{Api, DeleteParams, PostParams, PropagationPolicy};
use kube::{Client, ResourceExt};
use minijinja::{context, Environment, UndefinedBehavior};
use tracing::debug;

use crate::crd::{DataUpdateStrategy, JobProviderConfig, ProviderType};

use super::{DnsProvider, Payload, ProviderError};

const TPL_CREATE: &str = "create";
const TPL_UPDATE: &str = "update";
const TPL_DELETE: &str = "delete";
const TPL_DATA: &str = "data";

/// The parsed template set and namespace policy, separate from the cluster
/// client so rendering stays testable.
struct JobTemplates {
    env: Environment<'static>,
    /// The owning Provider's namespace; empty for cluster-scoped providers,
    /// in which case the manifest (or `POD_NAMESPACE`) decides.
    namespace: String,
    has_data_template: bool,
    data_update_strategy: DataUpdateStrategy,
}

impl JobTemplates {
    fn new(namespace: String, config: &JobProviderConfig) -> Result<Self, ProviderError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);

        env.add_template_owned(TPL_CREATE.to_string(), config.create_job_template.clone())?;
        let update = if config.update_job_template.is_empty() {
            config.create_job_template.clone()
        } else {
            config.update_job_template.clone()
        };
        env.add_template_owned(TPL_UPDATE.to_string(), update)?;
        let delete = if config.delete_job_template.is_empty() {
            config.create_job_template.clone()
        } else {
            config.delete_job_template.clone()
        };
        env.add_template_owned(TPL_DELETE.to_string(), delete)?;

        let has_data_template = !config.data_template.is_empty();
        if has_data_template {
            env.add_template_owned(TPL_DATA.to_string(), config.data_template.clone())?;
        }

        Ok(Self {
            env,
            namespace,
            has_data_template,
            data_update_strategy: config.data_update_strategy,
        })
    }

    fn render(
        &self,
        template: &str,
        action: &str,
        payload: &Payload,
    ) -> Result<String, ProviderError> {
        let rendered = self.env.get_template(template)?.render(context! {
            action => action,
            id => &payload.id,
            data => &payload.data,
            record => &payload.record,
        })?;
        Ok(rendered)
    }

    fn render_data(&self, action: &str, payload: &Payload) -> Result<String, ProviderError> {
        if !self.has_data_template {
            return Ok(String::new());
        }
        self.render(TPL_DATA, action, payload)
    }

    /// Render a Job manifest and resolve its namespace: the provider's own
    /// namespace overrides the manifest, `POD_NAMESPACE` fills a blank.
    fn materialize(
        &self,
        template: &str,
        action: &str,
        payload: &Payload,
    ) -> Result<Job, ProviderError> {
        let manifest = self.render(template, action, payload)?;
        let mut job: Job = serde_yaml::from_str(&manifest)?;

        if !self.namespace.is_empty() {
            job.metadata.namespace = Some(self.namespace.clone());
        } else if job
            .metadata
            .namespace
            .as_deref()
            .unwrap_or_default()
            .is_empty()
        {
            job.metadata.namespace = Some(std::env::var("POD_NAMESPACE").unwrap_or_default());
        }
        Ok(job)
    }
}

pub struct JobProvider {
    client: Client,
    templates: JobTemplates,
}

impl JobProvider {
    pub fn new(
        client: Client,
        provider_namespace: Option<&str>,
        config: &JobProviderConfig,
    ) -> Result<Self, ProviderError> {
        let namespace = provider_namespace.unwrap_or_default().to_string();
        Ok(Self {
            client,
            templates: JobTemplates::new(namespace, config)?,
        })
    }

    /// Inspect a previously submitted Job and drive the state machine one
    /// step.
    ///
    /// Returns `Ok(true)` when the Job reached completion and the operation
    /// is done, `Ok(false)` when no tracked Job exists (submit one), and an
    /// error (including the `JobRunning` sentinel) otherwise.
    async fn check_submitted(
        &self,
        action: &str,
        payload: &mut Payload,
    ) -> Result<bool, ProviderError> {
        let Some((namespace, name)) = payload.id.split_once('/') else {
            return Ok(false);
        };

        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        let Some(job) = api.get_opt(name).await? else {
            // The tracked Job is gone; resubmit.
            return Ok(false);
        };

        let conditions = job
            .status
            .as_ref()
            .and_then(|status| status.conditions.clone())
            .unwrap_or_default();
        let Some(condition) = conditions.first() else {
            return Err(ProviderError::JobRunning);
        };

        if condition.type_ == "Complete" && condition.status == "True" {
            let data = match self.templates.data_update_strategy {
                DataUpdateStrategy::OnComplete | DataUpdateStrategy::OnCompleteOrFailed => {
                    Some(self.templates.render_data(action, payload)?)
                }
                DataUpdateStrategy::OnCreate => None,
            };
            api.delete(
                name,
                &DeleteParams {
                    propagation_policy: Some(PropagationPolicy::Background),
                    ..Default::default()
                },
            )
            .await?;
            if let Some(data) = data {
                payload.data = data;
            }
            debug!(job = %payload.id, action, "job completed");
            Ok(true)
        } else if condition.type_ == "Failed" && condition.status == "True" {
            if self.templates.data_update_strategy == DataUpdateStrategy::OnCompleteOrFailed {
                payload.data = self.templates.render_data(action, payload)?;
            }
            Err(ProviderError::JobFailed {
                reason: condition.reason.clone().unwrap_or_default(),
                message: condition.message.clone().unwrap_or_default(),
            })
        } else {
            Err(ProviderError::JobRunning)
        }
    }

    async fn execute(
        &self,
        template: &str,
        action: &str,
        payload: &mut Payload,
    ) -> Result<(), ProviderError> {
        if !payload.id.is_empty() && self.check_submitted(action, payload).await? {
            return Ok(());
        }

        let job = self.templates.materialize(template, action, payload)?;
        let namespace = job.metadata.namespace.clone().unwrap_or_default();

        let data = if self.templates.data_update_strategy == DataUpdateStrategy::OnCreate {
            Some(self.templates.render_data(action, payload)?)
        } else {
            None
        };

        let api: Api<Job> = Api::namespaced(self.client.clone(), &namespace);
        let created = api.create(&PostParams::default(), &job).await?;

        if let Some(data) = data {
            payload.data = data;
        }
        payload.id = format!("{namespace}/{}", created.name_any());
        debug!(job = %payload.id, action, "job submitted");

        Err(ProviderError::JobRunning)
    }
}

#[async_trait]
impl DnsProvider for JobProvider {
    async fn create(&self, payload: &mut Payload) -> Result<(), ProviderError> {
        self.execute(TPL_CREATE, "create", payload).await
    }

    async fn update(&self, payload: &mut Payload) -> Result<(), ProviderError> {
        self.execute(TPL_UPDATE, "update", payload).await
    }

    async fn delete(&self, payload: &mut Payload) -> Result<(), ProviderError> {
        self.execute(TPL_DELETE, "delete", payload).await?;
        payload.id.clear();
        payload.data.clear();
        Ok(())
    }
}

/// Register the Job factory.
pub fn register() {
    super::register(
        ProviderType::Job,
        Box::new(|input| {
            Box::pin(async move {
                let config = input.spec.job.as_ref().ok_or_else(|| {
                    ProviderError::InvalidConfig("job provider requires spec.job".into())
                })?;
                let provider =
                    JobProvider::new(input.client.clone(), input.namespace.as_deref(), config)?;
                Ok(Box::new(provider) as Box<dyn DnsProvider>)
            })
        }),
    );
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod job_tests;
