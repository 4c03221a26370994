//! Resource operations.

use crate::auth::AccessToken;
use crate::batch::{Mutation, MutationPlan, MutationResult};
use crate::client::{encode_path_segment, OfscClient};
use crate::errors::{OfscError, OfscResult};
use crate::pagination::{PageQuery, PaginationStrategy};
use crate::resilience::{ApiCall, Authorized};
use crate::types::Entity;
use serde::Serialize;
use serde_json::{json, Value};

/// Domain used by the email reset when none is given.
pub const DEFAULT_EMAIL_DOMAIN: &str = "noreply.com";

/// Service for resource operations.
pub struct ResourcesService<'a> {
    client: &'a OfscClient,
}

impl<'a> ResourcesService<'a> {
    /// Creates a new resources service.
    pub fn new(client: &'a OfscClient) -> Self {
        Self { client }
    }

    /// Lists every resource of the instance.
    pub async fn list_all(&self, token: Option<AccessToken>) -> OfscResult<Authorized<Vec<Entity>>> {
        let query = PageQuery::new(
            "resources",
            PaginationStrategy::TotalResults,
            self.client.config().page_sizes.resources,
        );

        self.client
            .collector()
            .collect_all(
                &query,
                |page| {
                    self.client.build_url(&format!(
                        "resources/?offset={}&limit={}",
                        page.offset, page.limit
                    ))
                },
                token,
            )
            .await
    }

    /// Updates a resource with the given payload.
    pub async fn update<B: Serialize>(
        &self,
        resource_id: &str,
        payload: &B,
        token: Option<AccessToken>,
    ) -> OfscResult<Authorized<Entity>> {
        if resource_id.is_empty() {
            return Err(OfscError::validation("Resource ID cannot be empty"));
        }

        self.client
            .patch(
                &format!("resources/{}", encode_path_segment(resource_id)),
                payload,
                token,
            )
            .await
    }

    /// Moves every resource email to `new_domain`.
    ///
    /// Resources without an email are ignored. Results are pushed into
    /// `results` as each resource is handled. Returns the latest token.
    pub async fn reset_emails(
        &self,
        new_domain: &str,
        token: Option<AccessToken>,
        results: &mut Vec<MutationResult>,
    ) -> OfscResult<AccessToken> {
        if new_domain.is_empty() || new_domain.contains('@') {
            return Err(OfscError::validation(format!(
                "Invalid email domain: {:?}",
                new_domain
            )));
        }

        let listed = self.list_all(token).await?;
        let with_email: Vec<Entity> = listed
            .data
            .into_iter()
            .filter(|resource| email_of(resource).is_some())
            .collect();

        tracing::info!(
            resources = with_email.len(),
            domain = new_domain,
            "Resetting resource emails"
        );

        let mutation = EmailReset::new(new_domain, self.client.build_url("resources"));
        let token = self
            .client
            .batch_mutator()
            .apply_in_batches(&with_email, &mutation, Some(listed.token.clone()), results)
            .await?;

        Ok(token.unwrap_or(listed.token))
    }
}

/// Rewrites a resource's email domain, skipping resources already moved.
#[derive(Debug, Clone)]
pub struct EmailReset {
    domain: String,
    resources_url: String,
}

impl EmailReset {
    /// Creates the mutation; `resources_url` is the `.../resources` collection URL.
    pub fn new(domain: impl Into<String>, resources_url: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            resources_url: resources_url.into(),
        }
    }

    /// Returns the new address, or `None` when `email` already uses the domain.
    ///
    /// An address without `@` counts as already moved when the domain appears
    /// in it, e.g. `jdoenoreply.com`.
    pub fn target_email(&self, email: &str) -> Option<String> {
        let mut probe = email.to_string();
        if !probe.contains('@') {
            probe = probe.replacen(&self.domain, &format!("@{}", self.domain), 1);
        }

        if probe.contains(&self.domain) {
            return None;
        }

        let local = email.split('@').next().unwrap_or_default();
        Some(format!("{}@{}", local, self.domain))
    }
}

impl Mutation<Entity> for EmailReset {
    fn plan(&self, resource: &Entity) -> OfscResult<MutationPlan> {
        let Some(email) = email_of(resource) else {
            return Ok(MutationPlan::Skip(MutationResult::skipped(
                resource_id_of(resource),
                "No email",
            )));
        };

        let Some(id) = resource_id_of(resource) else {
            tracing::warn!(resource = %resource, "Resource ID not found");
            return Ok(MutationPlan::Skip(
                MutationResult::skipped(None, "Resource ID not found").with_field("email", email),
            ));
        };

        match self.target_email(email) {
            None => Ok(MutationPlan::Skip(
                MutationResult::skipped(Some(id), "Email already updated")
                    .with_field("email", email)
                    .with_field("newEmail", ""),
            )),
            Some(new_email) => {
                tracing::debug!(resource_id = %id, from = email, to = %new_email, "Updating email");
                let url = format!("{}/{}", self.resources_url, encode_path_segment(&id));
                Ok(MutationPlan::Apply(ApiCall::patch(url, &json!({ "email": new_email }))?))
            }
        }
    }

    fn applied(&self, resource: &Entity, response: Value) -> MutationResult {
        let id = response
            .get("resourceId")
            .and_then(value_as_id)
            .or_else(|| resource_id_of(resource))
            .unwrap_or_default();
        let new_email = response.get("email").cloned().unwrap_or(Value::Null);

        MutationResult::applied(id)
            .with_field("email", email_of(resource).unwrap_or_default())
            .with_field("newEmail", new_email)
    }
}

fn email_of(resource: &Entity) -> Option<&str> {
    resource
        .get("email")
        .and_then(Value::as_str)
        .filter(|email| !email.is_empty())
}

fn resource_id_of(resource: &Entity) -> Option<String> {
    resource.get("resourceId").and_then(value_as_id)
}

fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
