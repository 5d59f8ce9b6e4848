//! HTTP implementation of [`DataSource`] for the Workbook REST API.
//!
//! Every read is a single `GET` with basic auth, bounded by the configured
//! per-call timeout. Non-2xx responses, transport errors, undecodable bodies
//! and timeouts all surface as [`SourceError`].

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use workbook_core::config::WorkbookConfig;
use workbook_core::*;

/// Workbook API routes, relative to the configured base URL.
pub mod routes {
    pub const CURRENCIES: &str = "/api/core/currencies";
    pub const COMPANIES: &str = "/api/core/resource/companies";
    pub const EMPLOYEES: &str = "/api/resource/employees";
    pub const EMPLOYEE_PRICES: &str = "/api/resource/employees/prices/hour";
    pub const DEPARTMENTS: &str = "/api/core/departments";
    pub const JOBS: &str = "/api/job/list";
    pub const CREDITORS: &str = "/api/finance/creditors/balance";
    pub const DEBTORS: &str = "/api/finance/debtors/balance";
    pub const FINANCE_ACCOUNTS: &str = "/api/finance/accounts";
    pub const TIME_ENTRIES: &str = "/api/timeentries";

    pub fn company(id: i64) -> String {
        format!("/api/core/resource/company/{id}")
    }

    pub fn capacity_profiles(employee_id: i64) -> String {
        format!("/api/resource/{employee_id}/capacityprofiles")
    }

    pub fn account_balances(account_id: i64) -> String {
        format!("/api/finance/account/{account_id}/balances")
    }
}

/// Client for the Workbook REST API.
#[derive(Clone)]
pub struct WorkbookClient {
    http: reqwest::Client,
    base_url: String,
    user: String,
    password: String,
    timeout: Duration,
}

impl WorkbookClient {
    /// Create a client from the `[workbook]` config section.
    pub fn new(config: &WorkbookConfig) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("workbook-exporter/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Transport {
                endpoint: config.url.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            user: config.user.clone(),
            password: config.password.clone(),
            timeout: config.timeout(),
        })
    }

    /// Override the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> SourceResult<T> {
        let url = format!("{}{}", self.base_url, path);

        let result = tokio::time::timeout(self.timeout, async {
            let resp = self
                .http
                .get(&url)
                .basic_auth(&self.user, Some(&self.password))
                .header(reqwest::header::ACCEPT, "application/json")
                .query(query)
                .send()
                .await
                .map_err(|e| SourceError::Transport {
                    endpoint: path.to_string(),
                    message: e.to_string(),
                })?;

            let status = resp.status();
            if !status.is_success() {
                debug!(%status, endpoint = path, "workbook request non-2xx");
                return Err(SourceError::Status {
                    endpoint: path.to_string(),
                    status: status.as_u16(),
                });
            }

            let body = resp.bytes().await.map_err(|e| SourceError::Transport {
                endpoint: path.to_string(),
                message: e.to_string(),
            })?;

            serde_json::from_slice::<T>(&body).map_err(|e| SourceError::Decode {
                endpoint: path.to_string(),
                message: e.to_string(),
            })
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => {
                debug!(endpoint = path, "workbook request timed out");
                Err(SourceError::Timeout {
                    endpoint: path.to_string(),
                    secs: self.timeout.as_secs(),
                })
            }
        }
    }
}

fn flag(value: bool) -> String {
    value.to_string()
}

#[async_trait]
impl DataSource for WorkbookClient {
    async fn currencies(&self) -> SourceResult<Vec<Currency>> {
        self.get(routes::CURRENCIES, &[]).await
    }

    async fn companies(&self, active_only: bool) -> SourceResult<Vec<Company>> {
        self.get(routes::COMPANIES, &[("Active", flag(active_only))]).await
    }

    async fn company_detail(&self, company_id: CompanyId) -> SourceResult<CompanyDetail> {
        self.get(&routes::company(company_id), &[]).await
    }

    async fn employees(&self, active_only: bool) -> SourceResult<Vec<Employee>> {
        self.get(routes::EMPLOYEES, &[("Active", flag(active_only))]).await
    }

    async fn capacity_profiles(&self, employee_id: EmployeeId) -> SourceResult<Vec<CapacityProfile>> {
        self.get(&routes::capacity_profiles(employee_id), &[]).await
    }

    async fn departments(&self) -> SourceResult<Vec<Department>> {
        self.get(routes::DEPARTMENTS, &[]).await
    }

    async fn jobs(&self, status_ids: &[i64]) -> SourceResult<Vec<Job>> {
        let query: Vec<(&str, String)> = status_ids
            .iter()
            .map(|id| ("Status", id.to_string()))
            .collect();
        self.get(routes::JOBS, &query).await
    }

    async fn creditors(&self) -> SourceResult<Vec<Balance>> {
        self.get(routes::CREDITORS, &[]).await
    }

    async fn employee_prices(&self) -> SourceResult<Vec<EmployeePrice>> {
        self.get(routes::EMPLOYEE_PRICES, &[("ActiveEmployees", flag(true))])
            .await
    }

    async fn finance_accounts(&self) -> SourceResult<Vec<FinanceAccount>> {
        self.get(routes::FINANCE_ACCOUNTS, &[]).await
    }

    async fn finance_account_balances(
        &self,
        account_id: AccountId,
    ) -> SourceResult<Vec<FinanceBalance>> {
        self.get(&routes::account_balances(account_id), &[]).await
    }

    async fn time_entries(&self, from: Timestamp, to: Timestamp) -> SourceResult<Vec<TimeEntry>> {
        let query = [
            ("DateFrom", from.format("%Y-%m-%d").to_string()),
            ("DateTo", to.format("%Y-%m-%d").to_string()),
        ];
        self.get(routes::TIME_ENTRIES, &query).await
    }

    async fn debtor_balances(&self, company_id: CompanyId) -> SourceResult<Vec<Balance>> {
        self.get(routes::DEBTORS, &[("CompanyId", company_id.to_string())])
            .await
    }
}
