//! Activity operations.

use crate::auth::AccessToken;
use crate::client::OfscClient;
use crate::errors::{OfscError, OfscResult};
use crate::pagination::{PageQuery, PaginationStrategy};
use crate::resilience::Authorized;
use crate::types::Entity;
use chrono::NaiveDate;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Filters for listing activities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityQuery {
    /// Resource IDs whose activities are listed. Required.
    pub resources: Vec<String>,
    /// First day, `YYYY-MM-DD`. Required.
    pub date_from: String,
    /// Last day, `YYYY-MM-DD`. Required.
    pub date_to: String,
    /// Optional filter expression.
    pub q: Option<String>,
    /// Fields to return; all when empty.
    pub fields: Vec<String>,
    /// Whether non-scheduled activities are included; sent only when set.
    pub include_non_scheduled: bool,
}

impl ActivityQuery {
    /// Creates a query over a date range.
    pub fn new(date_from: impl Into<String>, date_to: impl Into<String>) -> Self {
        Self {
            date_from: date_from.into(),
            date_to: date_to.into(),
            ..Default::default()
        }
    }

    /// Adds a resource ID.
    pub fn resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resources.push(resource_id.into());
        self
    }

    /// Sets the filter expression.
    pub fn q(mut self, q: impl Into<String>) -> Self {
        self.q = Some(q.into());
        self
    }

    /// Adds a returned field.
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.fields.push(field.into());
        self
    }

    /// Includes non-scheduled activities.
    pub fn include_non_scheduled(mut self, include: bool) -> Self {
        self.include_non_scheduled = include;
        self
    }

    /// Checks required filters and date formats.
    pub fn validate(&self) -> OfscResult<()> {
        if self.resources.iter().all(|r| r.is_empty()) {
            return Err(OfscError::validation("At least one resource is required"));
        }
        validate_date("dateFrom", &self.date_from)?;
        validate_date("dateTo", &self.date_to)?;
        Ok(())
    }

    /// Encodes every filter after `offset` and `limit`.
    fn encode_filters(&self) -> OfscResult<String> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(q) = &self.q {
            params.push(("q", q.clone()));
        }
        params.push(("resources", self.resources.join(",")));
        if !self.fields.is_empty() {
            params.push(("fields", self.fields.join(",")));
        }
        params.push(("dateFrom", self.date_from.clone()));
        params.push(("dateTo", self.date_to.clone()));
        if self.include_non_scheduled {
            params.push(("includeNonScheduled", "true".to_string()));
        }

        serde_urlencoded::to_string(&params)
            .map_err(|e| OfscError::validation(format!("Cannot encode activity query: {}", e)))
    }
}

fn validate_date(name: &str, value: &str) -> OfscResult<()> {
    if value.len() != 10 || NaiveDate::parse_from_str(value, DATE_FORMAT).is_err() {
        return Err(OfscError::validation(format!(
            "{} must be a YYYY-MM-DD date, got {:?}",
            name, value
        )));
    }
    Ok(())
}

/// Service for activity operations.
pub struct ActivitiesService<'a> {
    client: &'a OfscClient,
}

impl<'a> ActivitiesService<'a> {
    /// Creates a new activities service.
    pub fn new(client: &'a OfscClient) -> Self {
        Self { client }
    }

    /// Lists every activity matching `query`.
    ///
    /// The query is validated before any request is sent.
    pub async fn list_all(
        &self,
        query: &ActivityQuery,
        token: Option<AccessToken>,
    ) -> OfscResult<Authorized<Vec<Entity>>> {
        query.validate()?;
        let filters = query.encode_filters()?;

        let page_query = PageQuery::new(
            "activities",
            PaginationStrategy::ServerLimit,
            self.client.config().page_sizes.activities,
        );

        self.client
            .collector()
            .collect_all(
                &page_query,
                |page| {
                    self.client.build_url(&format!(
                        "activities/?offset={}&limit={}&{}",
                        page.offset, page.limit, filters
                    ))
                },
                token,
            )
            .await
    }

    /// Gets a single activity.
    pub async fn get(&self, activity_id: u64, token: Option<AccessToken>) -> OfscResult<Authorized<Entity>> {
        self.client
            .get(&format!("activities/{}/", activity_id), token)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credentials;
    use crate::config::OfscConfig;
    use crate::errors::OfscErrorKind;
    use crate::transport::MockHttpTransport;
    use serde_json::json;
    use std::sync::Arc;
    use test_case::test_case;

    fn client(transport: Arc<MockHttpTransport>) -> OfscClient {
        let config = OfscConfig::builder()
            .credentials(Credentials::new("client", "secret", "acme"))
            .build()
            .unwrap();
        OfscClient::with_transport(config, transport).unwrap()
    }

    #[test_case("2024-01-31", true ; "valid date")]
    #[test_case("2024-1-31", false ; "short month")]
    #[test_case("2024-02-30", false ; "impossible day")]
    #[test_case("31/01/2024", false ; "wrong layout")]
    #[test_case("", false ; "empty")]
    fn test_validate_date(value: &str, ok: bool) {
        assert_eq!(validate_date("dateFrom", value).is_ok(), ok);
    }

    #[test]
    fn test_validate_requires_resources() {
        let err = ActivityQuery::new("2024-01-01", "2024-01-31")
            .validate()
            .unwrap_err();
        assert_eq!(*err.kind(), OfscErrorKind::ValidationError);
    }

    #[test]
    fn test_encode_filters_order() {
        let query = ActivityQuery::new("2024-01-01", "2024-01-31")
            .resource("R1")
            .resource("R2")
            .q("status=='pending'")
            .field("activityId")
            .field("status");

        assert_eq!(
            query.encode_filters().unwrap(),
            "q=status%3D%3D%27pending%27&resources=R1%2CR2&fields=activityId%2Cstatus\
             &dateFrom=2024-01-01&dateTo=2024-01-31"
        );
    }

    #[test]
    fn test_include_non_scheduled_sent_only_when_set() {
        let query = ActivityQuery::new("2024-01-01", "2024-01-31").resource("R1");
        assert!(!query.encode_filters().unwrap().contains("includeNonScheduled"));

        let query = query.include_non_scheduled(true);
        assert!(query
            .encode_filters()
            .unwrap()
            .ends_with("&includeNonScheduled=true"));
    }

    #[tokio::test]
    async fn test_list_all_rejects_bad_dates_before_network() {
        let transport = Arc::new(MockHttpTransport::new());
        let client = client(transport.clone());
        let query = ActivityQuery::new("2024-13-01", "2024-01-31").resource("R1");

        let err = client.activities().list_all(&query, None).await.unwrap_err();

        assert_eq!(*err.kind(), OfscErrorKind::ValidationError);
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_list_all_follows_server_limit() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(
            200,
            &json!({"items": [{"activityId": 1}, {"activityId": 2}], "offset": 0, "limit": 500}),
        );
        transport.queue_json_response(
            200,
            &json!({"items": [{"activityId": 3}], "offset": 500, "limit": 500}),
        );
        transport.queue_json_response(200, &json!({"items": [], "offset": 1000, "limit": 500}));

        let client = client(transport.clone());
        let query = ActivityQuery::new("2024-01-01", "2024-01-31").resource("R1");
        let result = client
            .activities()
            .list_all(&query, Some(AccessToken::new("t0")))
            .await
            .unwrap();

        assert_eq!(result.data.len(), 3);
        let urls: Vec<String> = transport.get_requests().into_iter().map(|r| r.url).collect();
        assert!(urls[0].contains("/activities/?offset=0&limit=1000&resources=R1"));
        assert!(urls[1].contains("/activities/?offset=500&limit=500&"));
        assert!(urls[2].contains("/activities/?offset=1000&limit=500&"));
    }

    #[tokio::test]
    async fn test_get_activity() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(200, &json!({"activityId": 42, "status": "pending"}));

        let client = client(transport.clone());
        let activity = client
            .activities()
            .get(42, Some(AccessToken::new("t0")))
            .await
            .unwrap();

        assert_eq!(activity.data["status"], "pending");
        assert_eq!(
            transport.get_last_request().unwrap().url,
            "https://acme.fs.ocs.oraclecloud.com/rest/ofscCore/v1/activities/42/"
        );
    }
}
