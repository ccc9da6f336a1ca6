//! Microsoft Graph workbook connector
//!
//! Implements [`DocumentSource`] for an Excel workbook stored in a SharePoint
//! document library.

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::source::{ChangeToken, DocumentRef, DocumentSource, SheetSchema};
use bridge_traits::table::Table;
use core_auth::TokenProvider;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::error::SharePointError;
use crate::normalize::normalize_sheet;
use crate::types::{DriveItem, DriveList, Site, UsedRange};

/// Name of the default document library of a SharePoint site.
pub const DOCUMENTS_DRIVE: &str = "Documents";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Site coordinates of the workbook.
#[derive(Debug, Clone)]
pub struct GraphSiteConfig {
    /// e.g. `https://graph.microsoft.com/v1.0`
    pub graph_api_base: String,
    /// e.g. `contoso.sharepoint.com`
    pub site_domain: String,
    pub site_name: String,
}

/// Site and drive ids, resolved once per connector.
#[derive(Debug, Clone)]
struct DriveLocation {
    site_id: String,
    drive_id: String,
}

/// Graph workbook connector
///
/// # Features
///
/// - Site and drive ids resolved lazily and cached
/// - `lastModifiedDateTime` of the workbook as the change token
/// - Worksheet reads through `usedRange(valuesOnly=true)`
/// - Exponential backoff on 429 and 5xx responses
///
/// # Example
///
/// ```ignore
/// use provider_sharepoint::{GraphSiteConfig, GraphWorkbookConnector};
/// use bridge_traits::source::{DocumentRef, DocumentSource};
///
/// let connector = GraphWorkbookConnector::new(http_client, token_provider, site_config);
/// let token = connector.fetch_change_token(&DocumentRef::new("Depot Master", "depots.xlsx")).await?;
/// ```
pub struct GraphWorkbookConnector {
    http_client: Arc<dyn HttpClient>,
    token_provider: Arc<dyn TokenProvider>,
    config: GraphSiteConfig,
    retry_policy: RetryPolicy,
    location: OnceCell<DriveLocation>,
}

impl GraphWorkbookConnector {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        token_provider: Arc<dyn TokenProvider>,
        config: GraphSiteConfig,
    ) -> Self {
        Self {
            http_client,
            token_provider,
            config: GraphSiteConfig {
                graph_api_base: config.graph_api_base.trim_end_matches('/').to_string(),
                ..config
            },
            retry_policy: RetryPolicy::default(),
            location: OnceCell::new(),
        }
    }

    /// Override the retry policy used for Graph requests
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    fn encode_path(path: &str) -> String {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// OData string literal for a worksheet name, URL-encoded.
    fn encode_sheet_name(name: &str) -> String {
        urlencoding::encode(&name.replace('\'', "''")).into_owned()
    }

    fn site_url(&self) -> String {
        format!(
            "{}/sites/{}:/sites/{}",
            self.config.graph_api_base,
            self.config.site_domain,
            urlencoding::encode(&self.config.site_name)
        )
    }

    fn item_url(&self, location: &DriveLocation, document: &DocumentRef) -> String {
        format!(
            "{}/sites/{}/drives/{}/root:/{}",
            self.config.graph_api_base,
            location.site_id,
            location.drive_id,
            Self::encode_path(&document.path())
        )
    }

    fn used_range_url(
        &self,
        location: &DriveLocation,
        document: &DocumentRef,
        sheet_name: &str,
    ) -> String {
        format!(
            "{}:/workbook/worksheets('{}')/usedRange(valuesOnly=true)",
            self.item_url(location, document),
            Self::encode_sheet_name(sheet_name)
        )
    }

    /// GET a Graph resource with retry on throttling and server errors.
    ///
    /// `not_found` builds the error reported for a 404.
    #[instrument(skip_all, fields(url = %url))]
    async fn get_json<T, F>(&self, url: String, not_found: F) -> crate::error::Result<T>
    where
        T: DeserializeOwned,
        F: FnOnce() -> SharePointError,
    {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let token = self.token_provider.access_token().await?;
            let request = HttpRequest::new(HttpMethod::Get, url.clone())
                .bearer_token(token)
                .header("Accept", "application/json")
                .timeout(REQUEST_TIMEOUT);

            let response: HttpResponse = match self.http_client.execute(request).await {
                Ok(response) => response,
                Err(e) if attempt < max_attempts => {
                    let delay = self.retry_policy.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Graph request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => {
                    warn!(attempts = attempt, error = %e, "Graph request failed");
                    return Err(SharePointError::NetworkError(e.to_string()));
                }
            };

            let status = response.status;
            if response.is_success() {
                debug!(status, "Graph request succeeded");
                return response
                    .json::<T>()
                    .map_err(|e| SharePointError::ParseError(e.to_string()));
            }

            if status == 404 {
                return Err(not_found());
            }

            if response.is_retryable() {
                if attempt < max_attempts {
                    let delay = self.retry_policy.delay_for(attempt);
                    warn!(
                        status,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Graph request throttled or failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                warn!(status, attempts = attempt, "Graph request failed after retries");
                return Err(SharePointError::ApiError {
                    status_code: status,
                    message: format!("Request failed after {} attempts", attempt),
                });
            }

            warn!(status, "Graph request rejected");
            return Err(SharePointError::ApiError {
                status_code: status,
                message: response.body_lossy(),
            });
        }
    }

    async fn resolve_location(&self) -> crate::error::Result<DriveLocation> {
        let site: Site = self
            .get_json(self.site_url(), || {
                SharePointError::SiteNotFound(format!(
                    "{}/sites/{}",
                    self.config.site_domain, self.config.site_name
                ))
            })
            .await?;

        let drives: DriveList = self
            .get_json(
                format!("{}/sites/{}/drives", self.config.graph_api_base, site.id),
                || SharePointError::SiteNotFound(site.id.clone()),
            )
            .await?;

        let drive = drives
            .value
            .into_iter()
            .find(|drive| drive.name == DOCUMENTS_DRIVE)
            .ok_or_else(|| SharePointError::DriveNotFound(DOCUMENTS_DRIVE.to_string()))?;

        info!(site_id = %site.id, drive_id = %drive.id, "Resolved SharePoint drive");
        Ok(DriveLocation {
            site_id: site.id,
            drive_id: drive.id,
        })
    }

    async fn location(&self) -> crate::error::Result<&DriveLocation> {
        self.location
            .get_or_try_init(|| self.resolve_location())
            .await
    }
}

#[async_trait]
impl DocumentSource for GraphWorkbookConnector {
    #[instrument(skip(self), fields(file = %document.file_name))]
    async fn fetch_change_token(&self, document: &DocumentRef) -> Result<ChangeToken> {
        let location = self.location().await?;
        let path = document.path();

        let item: DriveItem = self
            .get_json(self.item_url(location, document), || {
                SharePointError::FileNotFound { path: path.clone() }
            })
            .await?;

        let modified = item.last_modified_date_time.ok_or_else(|| {
            SharePointError::ParseError(format!("{} has no lastModifiedDateTime", path))
        })?;

        debug!(token = %modified, "Fetched change token");
        Ok(ChangeToken::new(modified))
    }

    #[instrument(skip(self, sheet), fields(file = %document.file_name, sheet = %sheet.name))]
    async fn read_table(&self, document: &DocumentRef, sheet: &SheetSchema) -> Result<Table> {
        let location = self.location().await?;

        let range: UsedRange = self
            .get_json(self.used_range_url(location, document, &sheet.name), || {
                SharePointError::WorksheetNotFound(format!(
                    "{} in {}",
                    sheet.name,
                    document.path()
                ))
            })
            .await?;

        let table = normalize_sheet(sheet, &range.values)?;
        info!(
            rows = table.len(),
            columns = table.columns().len(),
            "Read worksheet"
        );
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use bridge_traits::source::ColumnSpec;
    use bridge_traits::table::{CellValue, ColumnType};
    use bytes::Bytes;
    use core_auth::AuthError;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
        }
    }

    mock! {
        TokenProvider {}

        #[async_trait]
        impl TokenProvider for TokenProvider {
            async fn access_token(&self) -> core_auth::Result<String>;
        }
    }

    const BASE: &str = "https://graph.test/v1.0";

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn tokens() -> Arc<MockTokenProvider> {
        let mut provider = MockTokenProvider::new();
        provider
            .expect_access_token()
            .returning(|| Ok("graph-token".to_string()));
        Arc::new(provider)
    }

    fn site_config() -> GraphSiteConfig {
        GraphSiteConfig {
            graph_api_base: format!("{}/", BASE),
            site_domain: "contoso.sharepoint.com".to_string(),
            site_name: "Ops Team".to_string(),
        }
    }

    fn fast_retries() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    /// Answers the site and drive lookups, delegating everything else.
    fn graph_mock<F>(mut other: F) -> MockHttpClient
    where
        F: FnMut(&HttpRequest) -> Result<HttpResponse> + Send + 'static,
    {
        let mut http = MockHttpClient::new();
        http.expect_execute().returning(move |req| {
            if req.url.ends_with(":/sites/Ops%20Team") {
                Ok(response(200, r#"{"id":"site-1","displayName":"Ops Team"}"#))
            } else if req.url.ends_with("/sites/site-1/drives") {
                Ok(response(
                    200,
                    r#"{"value":[{"id":"drive-x","name":"Archive"},{"id":"drive-1","name":"Documents"}]}"#,
                ))
            } else {
                other(&req)
            }
        });
        http
    }

    fn document() -> DocumentRef {
        DocumentRef::new("Depot Master", "depots 2024.xlsx")
    }

    #[test]
    fn test_url_encoding() {
        assert_eq!(
            GraphWorkbookConnector::encode_path("Depot Master/depots 2024.xlsx"),
            "Depot%20Master/depots%202024.xlsx"
        );
        assert_eq!(
            GraphWorkbookConnector::encode_sheet_name("Bob's Rates"),
            "Bob%27%27s%20Rates"
        );
    }

    #[tokio::test]
    async fn test_fetch_change_token() {
        let http = graph_mock(|req| {
            assert_eq!(
                req.url,
                "https://graph.test/v1.0/sites/site-1/drives/drive-1/root:/Depot%20Master/depots%202024.xlsx"
            );
            assert_eq!(
                req.headers.get("Authorization").map(String::as_str),
                Some("Bearer graph-token")
            );
            Ok(response(
                200,
                r#"{"id":"item-1","name":"depots 2024.xlsx","lastModifiedDateTime":"2024-05-01T10:00:00Z"}"#,
            ))
        });

        let connector = GraphWorkbookConnector::new(Arc::new(http), tokens(), site_config());
        let token = connector.fetch_change_token(&document()).await.unwrap();

        assert_eq!(token, ChangeToken::new("2024-05-01T10:00:00Z"));
    }

    #[tokio::test]
    async fn test_site_and_drive_are_resolved_once() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|req| req.url.ends_with(":/sites/Ops%20Team"))
            .times(1)
            .returning(|_| Ok(response(200, r#"{"id":"site-1"}"#)));
        http.expect_execute()
            .withf(|req| req.url.ends_with("/drives"))
            .times(1)
            .returning(|_| Ok(response(200, r#"{"value":[{"id":"drive-1","name":"Documents"}]}"#)));
        http.expect_execute()
            .withf(|req| req.url.contains("/root:/"))
            .times(2)
            .returning(|_| Ok(response(200, r#"{"lastModifiedDateTime":"2024-05-01T10:00:00Z"}"#)));

        let connector = GraphWorkbookConnector::new(Arc::new(http), tokens(), site_config());
        connector.fetch_change_token(&document()).await.unwrap();
        connector.fetch_change_token(&document()).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_documents_drive() {
        let mut http = MockHttpClient::new();
        http.expect_execute().returning(|req| {
            if req.url.ends_with("/drives") {
                Ok(response(200, r#"{"value":[{"id":"drive-x","name":"Archive"}]}"#))
            } else {
                Ok(response(200, r#"{"id":"site-1"}"#))
            }
        });

        let connector = GraphWorkbookConnector::new(Arc::new(http), tokens(), site_config());
        let err = connector.fetch_change_token(&document()).await.unwrap_err();

        assert!(matches!(err, BridgeError::SourceUnavailable(ref m) if m.contains("Documents")));
    }

    #[tokio::test]
    async fn test_file_not_found() {
        let http = graph_mock(|_| Ok(response(404, r#"{"error":{"code":"itemNotFound"}}"#)));

        let connector = GraphWorkbookConnector::new(Arc::new(http), tokens(), site_config());
        let err = connector.fetch_change_token(&document()).await.unwrap_err();

        assert!(
            matches!(err, BridgeError::SourceUnavailable(ref m) if m.contains("File not found"))
        );
    }

    #[tokio::test]
    async fn test_missing_last_modified_is_parse_error() {
        let http = graph_mock(|_| Ok(response(200, r#"{"id":"item-1"}"#)));

        let connector = GraphWorkbookConnector::new(Arc::new(http), tokens(), site_config());
        let err = connector.fetch_change_token(&document()).await.unwrap_err();

        assert!(matches!(err, BridgeError::OperationFailed(_)));
    }

    #[tokio::test]
    async fn test_retries_throttled_requests() {
        let mut calls = 0;
        let http = graph_mock(move |_| {
            calls += 1;
            if calls < 3 {
                Ok(response(429, ""))
            } else {
                Ok(response(200, r#"{"lastModifiedDateTime":"2024-05-01T10:00:00Z"}"#))
            }
        });

        let connector = GraphWorkbookConnector::new(Arc::new(http), tokens(), site_config())
            .with_retry_policy(fast_retries());

        assert!(connector.fetch_change_token(&document()).await.is_ok());
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let http = graph_mock(|_| Ok(response(503, "")));

        let connector = GraphWorkbookConnector::new(Arc::new(http), tokens(), site_config())
            .with_retry_policy(fast_retries());
        let err = connector.fetch_change_token(&document()).await.unwrap_err();

        assert!(matches!(err, BridgeError::SourceUnavailable(ref m) if m.contains("503")));
    }

    #[tokio::test]
    async fn test_auth_failure_is_source_unavailable() {
        let mut provider = MockTokenProvider::new();
        provider.expect_access_token().returning(|| {
            Err(AuthError::AuthenticationFailed {
                authority: "login".to_string(),
                reason: "HTTP 401".to_string(),
            })
        });

        let connector = GraphWorkbookConnector::new(
            Arc::new(MockHttpClient::new()),
            Arc::new(provider),
            site_config(),
        );
        let err = connector.fetch_change_token(&document()).await.unwrap_err();

        assert!(matches!(err, BridgeError::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_read_table() {
        let http = graph_mock(|req| {
            assert!(req
                .url
                .ends_with(":/workbook/worksheets('Depot%20List')/usedRange(valuesOnly=true)"));
            Ok(response(
                200,
                r#"{"address":"'Depot List'!A1:C3","values":[
                    ["Depot Name","Capacity","Opened"],
                    ["North",120,45292],
                    ["","",""]
                ]}"#,
            ))
        });

        let sheet = SheetSchema::new("Depot List", "depot_list")
            .with_column(ColumnSpec {
                source: "Depot Name".to_string(),
                column: "depot_name".to_string(),
                column_type: Some(ColumnType::Text),
                position: 0,
            })
            .with_column(ColumnSpec {
                source: "Capacity".to_string(),
                column: "capacity".to_string(),
                column_type: Some(ColumnType::Integer),
                position: 1,
            });

        let connector = GraphWorkbookConnector::new(Arc::new(http), tokens(), site_config());
        let table = connector.read_table(&document(), &sheet).await.unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.column_names(), vec!["depot_name", "capacity"]);
        assert_eq!(
            table.rows()[0].values,
            vec![CellValue::from("North"), CellValue::Integer(120)]
        );
    }
}
