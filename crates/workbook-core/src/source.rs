//! The read-only interface to the Workbook API.
//!
//! The exporter core only ever talks to a [`DataSource`]; the HTTP client in
//! `workbook-client` is one implementation, test fakes are another.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::*;

/// Result type alias for data-source reads.
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors a single read can fail with. The collector treats them all alike.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("could not decode {endpoint} response: {message}")]
    Decode { endpoint: String, message: String },

    #[error("{endpoint} timed out after {secs}s")]
    Timeout { endpoint: String, secs: u64 },

    #[error("source unavailable: {0}")]
    Unavailable(String),
}

/// One async read per Workbook collection.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn currencies(&self) -> SourceResult<Vec<Currency>>;

    async fn companies(&self, active_only: bool) -> SourceResult<Vec<Company>>;

    async fn company_detail(&self, company_id: CompanyId) -> SourceResult<CompanyDetail>;

    async fn employees(&self, active_only: bool) -> SourceResult<Vec<Employee>>;

    async fn capacity_profiles(&self, employee_id: EmployeeId) -> SourceResult<Vec<CapacityProfile>>;

    async fn departments(&self) -> SourceResult<Vec<Department>>;

    async fn jobs(&self, status_ids: &[i64]) -> SourceResult<Vec<Job>>;

    async fn creditors(&self) -> SourceResult<Vec<Balance>>;

    /// Price history of all active employees.
    async fn employee_prices(&self) -> SourceResult<Vec<EmployeePrice>>;

    async fn finance_accounts(&self) -> SourceResult<Vec<FinanceAccount>>;

    async fn finance_account_balances(&self, account_id: AccountId)
        -> SourceResult<Vec<FinanceBalance>>;

    /// Time registrations with a date in `[from, to]`.
    async fn time_entries(&self, from: Timestamp, to: Timestamp) -> SourceResult<Vec<TimeEntry>>;

    async fn debtor_balances(&self, company_id: CompanyId) -> SourceResult<Vec<Balance>>;
}
