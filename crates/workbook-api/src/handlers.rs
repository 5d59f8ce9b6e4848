//! HTTP handlers.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use tracing::debug;

use workbook_metrics::{render_prometheus, CONTENT_TYPE};

use crate::ApiState;

/// GET /metrics
///
/// Every request runs a fresh scrape. Source failures show up in the body
/// (`workbook_up`, `workbook_collector_up`), never as an HTTP error.
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.collector.collect().await;
    debug!(families = snapshot.families.len(), "rendering snapshot");

    let body = render_prometheus(&snapshot.families);
    (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], body)
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::to_bytes;
    use workbook_core::*;
    use workbook_metrics::SnapshotCollector;

    /// Workbook without any data, or unreachable when `online` is false.
    struct EmptySource {
        online: bool,
    }

    impl EmptySource {
        fn reply<T: Default>(&self) -> SourceResult<T> {
            if self.online {
                Ok(T::default())
            } else {
                Err(SourceError::Unavailable("offline".into()))
            }
        }
    }

    #[async_trait]
    impl DataSource for EmptySource {
        async fn currencies(&self) -> SourceResult<Vec<Currency>> {
            self.reply()
        }
        async fn companies(&self, _active_only: bool) -> SourceResult<Vec<Company>> {
            self.reply()
        }
        async fn company_detail(&self, company_id: CompanyId) -> SourceResult<CompanyDetail> {
            Err(SourceError::Unavailable(format!("company {company_id}")))
        }
        async fn employees(&self, _active_only: bool) -> SourceResult<Vec<Employee>> {
            self.reply()
        }
        async fn capacity_profiles(&self, _employee_id: EmployeeId) -> SourceResult<Vec<CapacityProfile>> {
            self.reply()
        }
        async fn departments(&self) -> SourceResult<Vec<Department>> {
            self.reply()
        }
        async fn jobs(&self, _status_ids: &[i64]) -> SourceResult<Vec<Job>> {
            self.reply()
        }
        async fn creditors(&self) -> SourceResult<Vec<Balance>> {
            self.reply()
        }
        async fn employee_prices(&self) -> SourceResult<Vec<EmployeePrice>> {
            self.reply()
        }
        async fn finance_accounts(&self) -> SourceResult<Vec<FinanceAccount>> {
            self.reply()
        }
        async fn finance_account_balances(&self, _account_id: AccountId) -> SourceResult<Vec<FinanceBalance>> {
            self.reply()
        }
        async fn time_entries(&self, _from: Timestamp, _to: Timestamp) -> SourceResult<Vec<TimeEntry>> {
            self.reply()
        }
        async fn debtor_balances(&self, _company_id: CompanyId) -> SourceResult<Vec<Balance>> {
            self.reply()
        }
    }

    fn test_state(online: bool) -> ApiState {
        let collector = SnapshotCollector::new(
            Arc::new(EmptySource { online }),
            Arc::new(ExporterConfig::default()),
        );
        ApiState {
            collector: Arc::new(collector),
        }
    }

    async fn body_text(resp: axum::response::Response) -> String {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn prometheus_endpoint_returns_text() {
        let resp = prometheus_metrics(State(test_state(true))).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
        assert_eq!(content_type, "text/plain; version=0.0.4; charset=utf-8");

        let body = body_text(resp).await;
        assert!(body.contains("# TYPE workbook_up gauge"));
        assert!(body.contains("\nworkbook_up 1\n"));
        assert!(body.contains("workbook_collector_up{collector=\"jobs\"} 1"));
    }

    #[tokio::test]
    async fn unreachable_workbook_still_answers_200() {
        let resp = prometheus_metrics(State(test_state(false))).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_text(resp).await;
        assert!(body.contains("\nworkbook_up 0\n"));
        assert!(!body.contains("workbook_collector_up"));
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let resp = healthz().await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_text(resp).await, "ok");
    }

    #[tokio::test]
    async fn router_serves_both_routes() {
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let app = crate::build_router(test_state(true).collector);

        let resp = app
            .clone()
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
