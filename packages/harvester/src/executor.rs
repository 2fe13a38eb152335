//! Query execution against the currently bound tenant.
//!
//! One executor handles a single call ([`QueryExecutor::run`]) or a full
//! cursor-paginated sequence ([`QueryExecutor::run_paginated`]), with
//! outcome classification:
//!
//! - authorization failure → [`HarvestError::SessionInvalid`], propagated
//!   without retry (the shared session is dead, not just this call)
//! - structurally malformed response → [`HarvestError::QueryFatal`]
//! - anything else (timeout, 5xx, connection reset) → bounded retries with
//!   exponential backoff, then [`HarvestError::QueryTransient`]

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::auth::{CredentialRefresher, RetryPolicy};
use crate::error::{HarvestError, Result, TransportError};
use crate::traits::transport::Transport;
use crate::types::query::{PageCursor, QueryEnvelope, QueryOperation};
use crate::types::session::SessionState;

const DEFAULT_PAGE_SIZE: u32 = 100;
const DEFAULT_MAX_PAGES: usize = 500;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    end_cursor: Option<String>,
    has_next_page: bool,
}

#[derive(Debug, Deserialize)]
struct PagePayload {
    items: Vec<Value>,
    #[serde(rename = "pageInfo")]
    page_info: PageInfo,
}

/// Executes named query operations with retry, classification, and
/// pagination.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    refresher: CredentialRefresher,
    retry: RetryPolicy,
    page_size: u32,
    max_pages: usize,
}

impl QueryExecutor {
    pub fn new(refresher: CredentialRefresher, retry: RetryPolicy) -> Self {
        Self {
            refresher,
            retry,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Records requested per page.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Circuit breaker on runaway pagination.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Execute one operation and return its `data` payload.
    pub async fn run<T: Transport>(
        &self,
        transport: &T,
        session: &mut SessionState,
        operation: &QueryOperation,
        variables: Value,
    ) -> Result<Value> {
        self.refresher
            .ensure_token(transport, session, false)
            .await?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match transport.execute(session, operation, variables.clone()).await {
                Ok(raw) => return self.classify_response(operation, raw),
                Err(TransportError::Unauthorized) => {
                    warn!(operation = %operation.name, "query rejected; session is invalid");
                    return Err(HarvestError::SessionInvalid);
                }
                Err(TransportError::Malformed(detail)) => {
                    return Err(HarvestError::QueryFatal {
                        operation: operation.name.clone(),
                        detail,
                    });
                }
                Err(err) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        operation = %operation.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "query failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    return Err(HarvestError::QueryTransient {
                        operation: operation.name.clone(),
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    }

    /// Execute a paginated operation, accumulating all pages in arrival
    /// order.
    ///
    /// The cursor from each page feeds the next call; the token is resolved
    /// once per sequence, not force-refreshed between pages. A cursor that
    /// reports more pages but fails to advance is treated as
    /// [`HarvestError::PaginationInconsistency`], as is blowing the
    /// max-page circuit breaker.
    pub async fn run_paginated<T: Transport>(
        &self,
        transport: &T,
        session: &mut SessionState,
        operation: &QueryOperation,
        base_variables: Value,
    ) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut cursor = PageCursor::start();
        let mut page = 0usize;

        while cursor.has_next {
            page += 1;
            if page > self.max_pages {
                warn!(operation = %operation.name, page, "pagination exceeded page budget");
                return Err(HarvestError::PaginationInconsistency {
                    operation: operation.name.clone(),
                    page,
                });
            }

            let variables = Self::page_variables(&base_variables, &cursor, self.page_size);
            let data = self.run(transport, session, operation, variables).await?;
            let payload = Self::extract_page(operation, &data)?;

            debug!(
                operation = %operation.name,
                page,
                items = payload.items.len(),
                has_next = payload.page_info.has_next_page,
                "page received"
            );
            items.extend(payload.items);

            let next = PageCursor {
                cursor: payload.page_info.end_cursor,
                has_next: payload.page_info.has_next_page,
            };
            if next.has_next && (next.cursor.is_none() || next.cursor == cursor.cursor) {
                return Err(HarvestError::PaginationInconsistency {
                    operation: operation.name.clone(),
                    page,
                });
            }
            cursor = next;
        }

        Ok(items)
    }

    fn page_variables(base: &Value, cursor: &PageCursor, page_size: u32) -> Value {
        let mut variables = match base {
            Value::Object(map) => Value::Object(map.clone()),
            Value::Null => json!({}),
            other => other.clone(),
        };
        if let Value::Object(map) = &mut variables {
            map.insert("first".into(), json!(page_size));
            match &cursor.cursor {
                Some(c) => map.insert("after".into(), json!(c)),
                None => map.insert("after".into(), Value::Null),
            };
        }
        variables
    }

    /// Parse the envelope and classify application-level errors.
    fn classify_response(&self, operation: &QueryOperation, raw: Value) -> Result<Value> {
        let envelope: QueryEnvelope = serde_json::from_value(raw).map_err(|e| {
            HarvestError::QueryFatal {
                operation: operation.name.clone(),
                detail: format!("unparseable envelope: {e}"),
            }
        })?;

        if !envelope.errors.is_empty() {
            if envelope.errors.iter().any(|e| e.is_auth_error()) {
                warn!(operation = %operation.name, "application reported an authorization error");
                return Err(HarvestError::SessionInvalid);
            }
            return Err(HarvestError::QueryFatal {
                operation: operation.name.clone(),
                detail: envelope.errors[0].message.clone(),
            });
        }

        envelope.data.ok_or_else(|| HarvestError::QueryFatal {
            operation: operation.name.clone(),
            detail: "response carried neither data nor errors".into(),
        })
    }

    /// Find the paginated payload inside the `data` object.
    ///
    /// The payload is the single field whose value carries `items` and
    /// `pageInfo`; the field name varies per operation.
    fn extract_page(operation: &QueryOperation, data: &Value) -> Result<PagePayload> {
        let fields = data.as_object().ok_or_else(|| HarvestError::QueryFatal {
            operation: operation.name.clone(),
            detail: "data is not an object".into(),
        })?;

        for value in fields.values() {
            if value.get("items").is_some() && value.get("pageInfo").is_some() {
                return serde_json::from_value(value.clone()).map_err(|e| {
                    HarvestError::QueryFatal {
                        operation: operation.name.clone(),
                        detail: format!("unparseable page payload: {e}"),
                    }
                });
            }
        }

        Err(HarvestError::QueryFatal {
            operation: operation.name.clone(),
            detail: "no paginated payload in response".into(),
        })
    }
}
