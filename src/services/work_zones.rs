//! Work zone operations.

use crate::auth::AccessToken;
use crate::client::OfscClient;
use crate::errors::OfscResult;
use crate::pagination::{PageQuery, PaginationStrategy};
use crate::resilience::Authorized;
use crate::types::WorkZone;

/// Service for work zone operations.
pub struct WorkZonesService<'a> {
    client: &'a OfscClient,
}

impl<'a> WorkZonesService<'a> {
    /// Creates a new work zones service.
    pub fn new(client: &'a OfscClient) -> Self {
        Self { client }
    }

    /// Lists every work zone, stopping when the server reports `hasMore: false`.
    pub async fn list_all(&self, token: Option<AccessToken>) -> OfscResult<Authorized<Vec<WorkZone>>> {
        let query = PageQuery::new(
            "workZones",
            PaginationStrategy::TotalResults,
            self.client.config().page_sizes.work_zones,
        );

        self.client
            .collector()
            .collect_all(
                &query,
                |page| {
                    self.client
                        .build_url(&format!("workZones/?offset={}&limit={}", page.offset, page.limit))
                },
                token,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use crate::auth::{AccessToken, Credentials};
    use crate::client::OfscClient;
    use crate::config::OfscConfig;
    use crate::transport::MockHttpTransport;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_list_all_stops_on_has_more_false() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(
            200,
            &json!({
                "items": [{"workZoneLabel": "NORTH", "workZoneName": "North", "status": "active",
                           "travelArea": "routing", "keys": ["1000"]}],
                "hasMore": true,
                "offset": 0
            }),
        );
        transport.queue_json_response(
            200,
            &json!({"items": [{"workZoneLabel": "SOUTH"}], "hasMore": false, "offset": 1}),
        );

        let config = OfscConfig::builder()
            .credentials(Credentials::new("client", "secret", "acme"))
            .build()
            .unwrap();
        let client = OfscClient::with_transport(config, transport.clone()).unwrap();

        let zones = client
            .work_zones()
            .list_all(Some(AccessToken::new("t0")))
            .await
            .unwrap();

        assert_eq!(zones.data.len(), 2);
        assert_eq!(zones.data[0].keys, vec!["1000".to_string()]);
        assert_eq!(zones.data[1].work_zone_label, "SOUTH");
        assert_eq!(zones.data[1].status, "");
        assert_eq!(transport.request_count(), 2);
    }
}
