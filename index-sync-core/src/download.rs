//! HTTP source client and the paginated fetch loop.
//!
//! Upstream payloads come in several shapes. [`PagePayload::parse`] is the
//! single place that tells them apart; everything after it sees a [`Page`] of
//! [`RawDocument`]s.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::config::{PluginSettings, SourceAuth, SourceSettings};
use crate::contract::{Page, SourceClient};
use crate::document::{json_kind, RawDocument};
use crate::error::SourceError;

const HAS_MORE_KEYS: [&str; 4] = ["hasMore", "has_more", "hasNext", "has_next"];
const TOTAL_KEYS: [&str; 3] = ["totalCount", "total_count", "total"];

/// The accepted upstream page shapes, in priority order.
#[derive(Debug, Clone, PartialEq)]
pub enum PagePayload {
    /// `{"documents": [...], ...}`
    Documents {
        documents: Vec<Value>,
        meta: Map<String, Value>,
    },
    /// `{"items": [...], ...}`
    Items {
        items: Vec<Value>,
        meta: Map<String, Value>,
    },
    /// `[...]`
    Bare(Vec<Value>),
}

impl PagePayload {
    pub fn parse(value: Value) -> Result<Self, SourceError> {
        match value {
            Value::Array(items) => Ok(PagePayload::Bare(items)),
            Value::Object(mut meta) => {
                if let Some(Value::Array(documents)) = meta.remove("documents") {
                    return Ok(PagePayload::Documents { documents, meta });
                }
                if let Some(Value::Array(items)) = meta.remove("items") {
                    return Ok(PagePayload::Items { items, meta });
                }
                Err(SourceError::UnexpectedShape(
                    "object has neither a `documents` nor an `items` array".into(),
                ))
            }
            other => Err(SourceError::UnexpectedShape(format!(
                "expected an object or array, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn into_page(self) -> Result<Page, SourceError> {
        let (records, meta) = match self {
            PagePayload::Documents { documents, meta } => (documents, Some(meta)),
            PagePayload::Items { items, meta } => (items, Some(meta)),
            PagePayload::Bare(items) => (items, None),
        };

        let documents = records
            .into_iter()
            .map(RawDocument::from_value)
            .collect::<Result<Vec<_>, _>>()?;

        let has_more = meta
            .as_ref()
            .and_then(|m| HAS_MORE_KEYS.iter().find_map(|k| m.get(*k)))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let total_count = meta
            .as_ref()
            .and_then(|m| TOTAL_KEYS.iter().find_map(|k| m.get(*k)))
            .and_then(Value::as_u64)
            .unwrap_or(documents.len() as u64);

        Ok(Page {
            documents,
            has_more,
            total_count,
        })
    }
}

/// Fetch every page, starting at 1, until a page is empty or reports no more.
///
/// Sleeps `page_delay` between requests. The first failing request aborts the
/// whole fetch.
pub async fn fetch_all<S>(source: &S, page_delay: Duration) -> Result<Vec<RawDocument>, SourceError>
where
    S: SourceClient + ?Sized,
{
    let mut all = Vec::new();
    let mut page_number: u32 = 1;
    let mut pages: u32 = 0;

    loop {
        let page = source.fetch_page(page_number).await.map_err(|e| {
            error!(page = page_number, error = %e, "Failed to fetch page");
            e
        })?;
        let received = page.documents.len();
        debug!(
            page = page_number,
            received,
            has_more = page.has_more,
            total_count = page.total_count,
            "Fetched page"
        );

        if received == 0 {
            break;
        }
        pages += 1;
        all.extend(page.documents);
        if !page.has_more {
            break;
        }

        page_number += 1;
        if !page_delay.is_zero() {
            tokio::time::sleep(page_delay).await;
        }
    }

    info!(documents = all.len(), pages, "Fetched all documents");
    Ok(all)
}

/// [`SourceClient`] over a REST API.
///
/// Endpoints, relative to the base URL: `GET /documents?page=&limit=`,
/// `GET /documents/{id}`, `GET /documents/changes?since=`, `GET /health`.
pub struct HttpSourceClient {
    client: Client,
    base_url: String,
    auth: SourceAuth,
    page_size: u32,
}

impl HttpSourceClient {
    pub fn new(settings: &SourceSettings, plugin: &PluginSettings) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .user_agent(plugin.user_agent())
            .build()?;
        info!(
            base_url = %settings.base_url,
            auth = settings.auth.kind(),
            timeout_secs = settings.timeout.as_secs(),
            "Initialized source client"
        );
        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            auth: settings.auth.clone(),
            page_size: settings.page_size,
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let request = self.client.get(format!("{}{}", self.base_url, path));
        match &self.auth {
            SourceAuth::None => request,
            SourceAuth::Bearer(token) => request.bearer_auth(token),
            SourceAuth::Basic { username, password } => {
                request.basic_auth(username, password.as_deref())
            }
        }
    }

    async fn get_json(&self, request: RequestBuilder) -> Result<Value, SourceError> {
        let response = request.send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json::<Value>().await?)
    }
}

async fn ensure_success(response: Response) -> Result<Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<Failed to decode response body>"));
    error!(status = %status, url = %url, "Source API returned error. Response body: {body}");
    Err(SourceError::Status {
        status: status.as_u16(),
        url,
        body,
    })
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    async fn fetch_page(&self, page: u32) -> Result<Page, SourceError> {
        let request = self.get("/documents").query(&[
            ("page", page.to_string()),
            ("limit", self.page_size.to_string()),
        ]);
        let body = self.get_json(request).await?;
        PagePayload::parse(body)?.into_page()
    }

    async fn fetch_by_id(&self, id: &str) -> Result<RawDocument, SourceError> {
        let body = self.get_json(self.get(&format!("/documents/{id}"))).await?;
        RawDocument::from_value(body)
    }

    async fn fetch_incremental(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<RawDocument>, SourceError> {
        let request = self
            .get("/documents/changes")
            .query(&[("since", since.to_rfc3339_opts(SecondsFormat::Millis, true))]);
        let body = self.get_json(request).await?;
        let page = PagePayload::parse(body)?.into_page()?;
        info!(documents = page.documents.len(), %since, "Fetched incremental changes");
        Ok(page.documents)
    }

    async fn test_connection(&self) -> bool {
        match self.get("/health").send().await {
            Ok(response) if response.status().is_success() => {
                info!(base_url = %self.base_url, "Source connection OK");
                true
            }
            Ok(response) => {
                warn!(status = %response.status(), "Source health check returned error status");
                false
            }
            Err(e) => {
                warn!(error = %e, "Source health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockSourceClient;
    use mockall::Sequence;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn documents_take_priority_over_items() {
        let page = PagePayload::parse(json!({
            "documents": [{ "id": "d" }],
            "items": [{ "id": "i" }],
            "has_more": true,
            "total": 7,
        }))
        .unwrap()
        .into_page()
        .unwrap();

        assert_eq!(page.documents.len(), 1);
        assert_eq!(page.documents[0].id.as_deref(), Some("d"));
        assert!(page.has_more);
        assert_eq!(page.total_count, 7);
    }

    #[test]
    fn items_and_bare_arrays_are_accepted() {
        let items = PagePayload::parse(json!({ "items": [{}, {}], "hasNext": true })).unwrap();
        assert!(matches!(items, PagePayload::Items { .. }));
        let page = items.into_page().unwrap();
        assert_eq!(page.documents.len(), 2);
        assert!(page.has_more);
        assert_eq!(page.total_count, 2);

        let bare = PagePayload::parse(json!([{ "title": "x" }])).unwrap();
        let page = bare.into_page().unwrap();
        assert_eq!(page.documents.len(), 1);
        assert!(!page.has_more);
    }

    #[test]
    fn unknown_shapes_are_errors() {
        assert!(matches!(
            PagePayload::parse(json!({ "results": [] })),
            Err(SourceError::UnexpectedShape(_))
        ));
        assert!(matches!(
            PagePayload::parse(json!(3)),
            Err(SourceError::UnexpectedShape(_))
        ));
        let bad_element = PagePayload::parse(json!([1, 2])).unwrap().into_page();
        assert!(matches!(bad_element, Err(SourceError::UnexpectedShape(_))));
    }

    fn page_of(n: usize, has_more: bool) -> Page {
        Page {
            documents: (0..n)
                .map(|i| RawDocument {
                    id: Some(format!("doc-{i}")),
                    ..Default::default()
                })
                .collect(),
            has_more,
            total_count: n as u64,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_all_walks_pages_in_order_until_has_more_is_false() {
        let mut source = MockSourceClient::new();
        let mut seq = Sequence::new();
        for (n, size, more) in [(1u32, 3usize, true), (2, 3, true), (3, 1, false)] {
            source
                .expect_fetch_page()
                .withf(move |p| *p == n)
                .times(1)
                .in_sequence(&mut seq)
                .returning(move |_| Ok(page_of(size, more)));
        }

        let start = tokio::time::Instant::now();
        let docs = fetch_all(&source, Duration::from_millis(100)).await.unwrap();
        assert_eq!(docs.len(), 7);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(210), "{elapsed:?}");
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_all_stops_on_an_empty_page() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut source = MockSourceClient::new();
        let mut seq = Sequence::new();
        source
            .expect_fetch_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(page_of(2, true)));
        source
            .expect_fetch_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(page_of(0, true)));

        let docs = fetch_all(&source, Duration::ZERO).await.unwrap();
        assert_eq!(docs.len(), 2);

        let logs = logs.text();
        assert!(logs.contains("Fetched all documents"), "{logs}");
        assert!(logs.contains("pages=1"), "{logs}");
    }

    #[tokio::test]
    async fn fetch_all_propagates_the_first_failure() {
        let mut source = MockSourceClient::new();
        let mut seq = Sequence::new();
        source
            .expect_fetch_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(page_of(2, true)));
        source
            .expect_fetch_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(SourceError::UnexpectedShape("boom".into())));

        let err = fetch_all(&source, Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, SourceError::UnexpectedShape(_)));
    }
}
