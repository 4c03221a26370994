//! User operations.

use crate::auth::AccessToken;
use crate::client::OfscClient;
use crate::errors::OfscResult;
use crate::pagination::{PageQuery, PaginationStrategy};
use crate::resilience::Authorized;
use crate::types::Entity;

/// Service for user operations.
pub struct UsersService<'a> {
    client: &'a OfscClient,
}

impl<'a> UsersService<'a> {
    /// Creates a new users service.
    pub fn new(client: &'a OfscClient) -> Self {
        Self { client }
    }

    /// Lists every user of the instance.
    pub async fn list_all(&self, token: Option<AccessToken>) -> OfscResult<Authorized<Vec<Entity>>> {
        let query = PageQuery::new(
            "users",
            PaginationStrategy::TotalResults,
            self.client.config().page_sizes.resources,
        );

        self.client
            .collector()
            .collect_all(
                &query,
                |page| {
                    self.client
                        .build_url(&format!("users/?offset={}&limit={}", page.offset, page.limit))
                },
                token,
            )
            .await
    }
}
