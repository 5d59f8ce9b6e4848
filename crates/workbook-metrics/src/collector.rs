//! Snapshot collector: one full Workbook scrape per call.
//!
//! A scrape walks `Fetching → Aggregating → Done`. Every read is guarded on
//! its own: a failed read marks its stage unavailable and only drops the
//! families that depend on it. The critical batch (currencies, companies,
//! employees) is the exception; without it nothing can be indexed and the
//! scrape aborts with `workbook_up 0` alone.
//!
//! Overlapping scrapes are serialized by an in-flight mutex held for the
//! whole scrape. No state survives between scrapes.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use workbook_core::*;

use crate::convert::CurrencyConverter;
use crate::families::{self, FamilyContext};
use crate::family::{GaugeFamily, MetricDesc, MetricFamily};
use crate::index::EntityIndex;
use crate::resolve::{resolve_by_subject, resolve_effective};

pub const UP: MetricDesc = MetricDesc {
    name: "workbook_up",
    help: "Whether every Workbook read of the last scrape succeeded",
    labels: &[],
};
pub const SCRAPE_REQUESTS: MetricDesc = MetricDesc {
    name: "workbook_scrape_requests",
    help: "Workbook API requests made during the last scrape",
    labels: &[],
};
pub const SCRAPE_DURATION: MetricDesc = MetricDesc {
    name: "workbook_scrape_duration_seconds",
    help: "Duration of the last scrape in seconds",
    labels: &[],
};
pub const COLLECTOR_UP: MetricDesc = MetricDesc {
    name: "workbook_collector_up",
    help: "Whether the inputs of a metric family were available in the last scrape",
    labels: &["collector"],
};

/// Source of "now" for effective-record resolution and ages.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Timestamp);

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}

// ── Stages and families ──────────────────────────────────────────

/// One independently guarded group of Workbook reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Currencies,
    Companies,
    Employees,
    CompanyCurrencies,
    CapacityProfiles,
    Departments,
    Jobs,
    Creditors,
    EmployeePrices,
    FinanceAccounts,
    FinanceBalances,
    TimeEntries,
    Debtors,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Currencies => "currencies",
            Stage::Companies => "companies",
            Stage::Employees => "employees",
            Stage::CompanyCurrencies => "company_currencies",
            Stage::CapacityProfiles => "capacity_profiles",
            Stage::Departments => "departments",
            Stage::Jobs => "jobs",
            Stage::Creditors => "creditors",
            Stage::EmployeePrices => "employee_prices",
            Stage::FinanceAccounts => "finance_accounts",
            Stage::FinanceBalances => "finance_balances",
            Stage::TimeEntries => "time_entries",
            Stage::Debtors => "debtors",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageStatus {
    Ok,
    /// Some per-subject reads of a batch failed; those subjects are left out.
    Partial {
        failed: usize,
        total: usize,
        reason: String,
    },
    Unavailable {
        reason: String,
    },
}

impl StageStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, StageStatus::Ok)
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, StageStatus::Unavailable { .. })
    }
}

/// A group of metric families built together from the same inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    EmployeePrices,
    Employees,
    Departments,
    Capacity,
    Jobs,
    Customers,
    Credit,
    Debit,
    Finance,
    TimeEntryHours,
    TimeEntryCounts,
    Utilization,
}

impl Family {
    pub const ALL: [Family; 12] = [
        Family::EmployeePrices,
        Family::Employees,
        Family::Departments,
        Family::Capacity,
        Family::Jobs,
        Family::Customers,
        Family::Credit,
        Family::Debit,
        Family::Finance,
        Family::TimeEntryHours,
        Family::TimeEntryCounts,
        Family::Utilization,
    ];

    /// Value of the `collector` label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::EmployeePrices => "employee_prices",
            Family::Employees => "employees",
            Family::Departments => "departments",
            Family::Capacity => "capacity",
            Family::Jobs => "jobs",
            Family::Customers => "customers",
            Family::Credit => "credit",
            Family::Debit => "debit",
            Family::Finance => "finance",
            Family::TimeEntryHours => "time_entry_hours",
            Family::TimeEntryCounts => "time_entry_counts",
            Family::Utilization => "utilization",
        }
    }

    /// Stages beyond the critical batch this family reads.
    pub fn requires(&self) -> &'static [Stage] {
        match self {
            Family::EmployeePrices => &[Stage::EmployeePrices, Stage::CompanyCurrencies],
            Family::Employees => &[],
            Family::Departments => &[Stage::Departments],
            Family::Capacity => &[Stage::Departments, Stage::CapacityProfiles],
            Family::Jobs | Family::Customers => &[Stage::Jobs],
            Family::Credit => &[Stage::Creditors, Stage::CompanyCurrencies],
            Family::Debit => &[Stage::Debtors, Stage::CompanyCurrencies],
            Family::Finance => &[
                Stage::FinanceAccounts,
                Stage::FinanceBalances,
                Stage::CompanyCurrencies,
            ],
            Family::TimeEntryHours => &[Stage::TimeEntries, Stage::Departments],
            Family::TimeEntryCounts => &[Stage::TimeEntries, Stage::Jobs],
            Family::Utilization => &[
                Stage::TimeEntries,
                Stage::Departments,
                Stage::CapacityProfiles,
            ],
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FamilyStatus {
    Available,
    Unavailable { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeOutcome {
    Success,
    /// Completed with some inputs missing.
    Degraded,
    /// Critical batch failed; only `workbook_up 0` was emitted.
    Aborted,
}

impl ScrapeOutcome {
    /// Value of `workbook_up`.
    pub fn up(&self) -> f64 {
        match self {
            ScrapeOutcome::Success => 1.0,
            ScrapeOutcome::Degraded | ScrapeOutcome::Aborted => 0.0,
        }
    }
}

/// Result of one scrape.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub families: Vec<MetricFamily>,
    pub outcome: ScrapeOutcome,
    pub stages: Vec<(Stage, StageStatus)>,
    pub collectors: Vec<(Family, FamilyStatus)>,
    pub external_calls: u64,
    pub duration: Duration,
}

impl Snapshot {
    pub fn family(&self, name: &str) -> Option<&MetricFamily> {
        self.families.iter().find(|f| f.name() == name)
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageStatus> {
        self.stages.iter().find(|(s, _)| *s == stage).map(|(_, st)| st)
    }

    pub fn collector(&self, family: Family) -> Option<&FamilyStatus> {
        self.collectors
            .iter()
            .find(|(f, _)| *f == family)
            .map(|(_, st)| st)
    }
}

// ── Collector ────────────────────────────────────────────────────

/// Produces a fresh [`Snapshot`] per call.
pub struct SnapshotCollector {
    source: Arc<dyn DataSource>,
    config: Arc<ExporterConfig>,
    clock: Arc<dyn Clock>,
    in_flight: Mutex<()>,
}

impl SnapshotCollector {
    pub fn new(source: Arc<dyn DataSource>, config: Arc<ExporterConfig>) -> Self {
        Self {
            source,
            config,
            clock: Arc::new(SystemClock),
            in_flight: Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ExporterConfig {
        &self.config
    }

    /// Run one scrape. Waits for any scrape already in flight.
    pub async fn collect(&self) -> Snapshot {
        let _guard = self.in_flight.lock().await;
        let scrape = Scrape::new(self.source.as_ref(), &self.config, self.clock.now());
        let snapshot = scrape.run().await;
        info!(
            outcome = ?snapshot.outcome,
            families = snapshot.families.len(),
            external_calls = snapshot.external_calls,
            duration_ms = snapshot.duration.as_millis() as u64,
            "scrape finished"
        );
        snapshot
    }
}

// ── One scrape ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScrapeState {
    Fetching,
    Aggregating,
    Done(ScrapeOutcome),
}

/// Outcome tally of a per-subject batch (N+1 reads).
#[derive(Debug, Default)]
struct BatchTally {
    total: usize,
    failed: usize,
    first_error: Option<SourceError>,
}

impl BatchTally {
    fn status(self) -> StageStatus {
        match self.first_error {
            None => StageStatus::Ok,
            Some(e) if self.failed == self.total => StageStatus::Unavailable {
                reason: e.to_string(),
            },
            Some(e) => StageStatus::Partial {
                failed: self.failed,
                total: self.total,
                reason: e.to_string(),
            },
        }
    }
}

/// Stage data that is not kept in the index.
#[derive(Default)]
struct Fetched {
    prices: BTreeMap<EmployeeId, EmployeePrice>,
    accounts: Vec<(FinanceAccount, Vec<FinanceBalance>)>,
    time_entries: Vec<TimeEntry>,
    debtors: Vec<Balance>,
}

struct Scrape<'a> {
    source: &'a dyn DataSource,
    config: &'a ExporterConfig,
    now: Timestamp,
    started: Instant,
    state: ScrapeState,
    calls: u64,
    stages: Vec<(Stage, StageStatus)>,
}

impl<'a> Scrape<'a> {
    fn new(source: &'a dyn DataSource, config: &'a ExporterConfig, now: Timestamp) -> Self {
        Self {
            source,
            config,
            now,
            started: Instant::now(),
            state: ScrapeState::Fetching,
            calls: 0,
            stages: Vec::new(),
        }
    }

    fn advance(&mut self, next: ScrapeState) {
        debug!(from = ?self.state, to = ?next, "scrape state");
        self.state = next;
    }

    async fn run(mut self) -> Snapshot {
        let Some(mut index) = self.fetch_critical().await else {
            return self.abort();
        };
        let fetched = self.fetch_rest(&mut index).await;

        self.advance(ScrapeState::Aggregating);
        let (mut families, collectors) = self.aggregate(&index, &fetched);

        let outcome = if self.stages.iter().all(|(_, s)| s.is_ok()) {
            ScrapeOutcome::Success
        } else {
            ScrapeOutcome::Degraded
        };
        self.advance(ScrapeState::Done(outcome));

        let duration = self.started.elapsed();
        families.push(GaugeFamily::single(&UP, outcome.up()).into());
        families.push(GaugeFamily::single(&SCRAPE_REQUESTS, self.calls as f64).into());
        families.push(GaugeFamily::single(&SCRAPE_DURATION, duration.as_secs_f64()).into());
        let mut collector_up = GaugeFamily::new(&COLLECTOR_UP);
        for (family, status) in &collectors {
            let up = if *status == FamilyStatus::Available { 1.0 } else { 0.0 };
            collector_up.add(vec![family.to_string()], up);
        }
        families.push(collector_up.into());

        Snapshot {
            families,
            outcome,
            stages: self.stages,
            collectors,
            external_calls: self.calls,
            duration,
        }
    }

    fn abort(mut self) -> Snapshot {
        self.advance(ScrapeState::Done(ScrapeOutcome::Aborted));
        Snapshot {
            families: vec![GaugeFamily::single(&UP, 0.0).into()],
            outcome: ScrapeOutcome::Aborted,
            stages: self.stages,
            collectors: Vec::new(),
            external_calls: self.calls,
            duration: self.started.elapsed(),
        }
    }

    /// Record a single read's outcome for `stage`.
    fn settle<T>(&mut self, stage: Stage, result: SourceResult<T>) -> Option<T> {
        self.calls += 1;
        match result {
            Ok(value) => {
                debug!(%stage, "stage fetched");
                self.stages.push((stage, StageStatus::Ok));
                Some(value)
            }
            Err(e) => {
                warn!(%stage, error = %e, "workbook read failed");
                self.stages.push((
                    stage,
                    StageStatus::Unavailable {
                        reason: e.to_string(),
                    },
                ));
                None
            }
        }
    }

    /// Record one per-subject read of a batch.
    fn settle_item<T>(
        &mut self,
        tally: &mut BatchTally,
        stage: Stage,
        subject: i64,
        result: SourceResult<T>,
    ) -> Option<T> {
        self.calls += 1;
        tally.total += 1;
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(%stage, subject, error = %e, "workbook read failed");
                tally.failed += 1;
                if tally.first_error.is_none() {
                    tally.first_error = Some(e);
                }
                None
            }
        }
    }

    fn close_batch(&mut self, stage: Stage, tally: BatchTally) {
        let status = tally.status();
        debug!(%stage, status = ?status, "batch fetched");
        self.stages.push((stage, status));
    }

    fn stage_available(&self, stage: Stage) -> bool {
        self.stages
            .iter()
            .any(|(s, status)| *s == stage && status.is_available())
    }

    async fn fetch_critical(&mut self) -> Option<EntityIndex> {
        let source = self.source;

        let result = source.currencies().await;
        let Some(currencies) = self.settle(Stage::Currencies, result) else {
            error!(stage = %Stage::Currencies, "critical read failed, aborting scrape");
            return None;
        };

        let result = source.companies(true).await;
        let Some(companies) = self.settle(Stage::Companies, result) else {
            error!(stage = %Stage::Companies, "critical read failed, aborting scrape");
            return None;
        };

        let result = source.employees(true).await;
        let Some(employees) = self.settle(Stage::Employees, result) else {
            error!(stage = %Stage::Employees, "critical read failed, aborting scrape");
            return None;
        };

        Some(EntityIndex::new(
            currencies,
            companies,
            employees,
            &self.config.filters.company_ids,
        ))
    }

    async fn fetch_rest(&mut self, index: &mut EntityIndex) -> Fetched {
        let source = self.source;
        let config = self.config;
        let now = self.now;
        let mut fetched = Fetched::default();

        // Company currencies, one detail read per company.
        let mut tally = BatchTally::default();
        for company_id in index.company_ids() {
            let result = source.company_detail(company_id).await;
            let stage = Stage::CompanyCurrencies;
            if let Some(detail) = self.settle_item(&mut tally, stage, company_id, result) {
                match detail.currency_id {
                    Some(currency_id) => index.set_company_currency(company_id, currency_id),
                    None => debug!(company_id, "company detail has no currency"),
                }
            }
        }
        self.close_batch(Stage::CompanyCurrencies, tally);

        // Capacity profiles, one read per employee.
        let mut tally = BatchTally::default();
        for employee_id in index.employee_ids() {
            let result = source.capacity_profiles(employee_id).await;
            let stage = Stage::CapacityProfiles;
            let Some(profiles) = self.settle_item(&mut tally, stage, employee_id, result) else {
                continue;
            };
            match resolve_effective(&profiles, now) {
                Some(profile) => index.set_weekly_capacity(employee_id, profile.weekly_hours()),
                None => debug!(employee_id, "no effective capacity profile"),
            }
        }
        self.close_batch(Stage::CapacityProfiles, tally);

        let result = source.departments().await;
        if let Some(departments) = self.settle(Stage::Departments, result) {
            index.add_departments(departments);
        }

        let status_ids = &config.filters.active_job_status_ids;
        let result = source.jobs(status_ids).await;
        if let Some(jobs) = self.settle(Stage::Jobs, result) {
            index.add_jobs(jobs, status_ids);
        }

        let result = source.creditors().await;
        if let Some(creditors) = self.settle(Stage::Creditors, result) {
            index.add_creditors(creditors);
        }

        let result = source.employee_prices().await;
        if let Some(prices) = self.settle(Stage::EmployeePrices, result) {
            let idx: &EntityIndex = &*index;
            fetched.prices = resolve_by_subject(prices, now, |p: &EmployeePrice| {
                idx.employee(p.employee_id).map(|e| e.id)
            });
        }

        let result = source.finance_accounts().await;
        if let Some(accounts) = self.settle(Stage::FinanceAccounts, result) {
            let ctx = FamilyContext {
                index: &*index,
                config,
                now,
            };
            let reportable: Vec<FinanceAccount> = accounts
                .into_iter()
                .filter(|a| families::reportable_account(&ctx, a))
                .collect();
            let mut tally = BatchTally::default();
            for account in reportable {
                let result = source.finance_account_balances(account.id).await;
                let stage = Stage::FinanceBalances;
                if let Some(entries) = self.settle_item(&mut tally, stage, account.id, result) {
                    fetched.accounts.push((account, entries));
                }
            }
            self.close_batch(Stage::FinanceBalances, tally);
        } else {
            self.stages.push((
                Stage::FinanceBalances,
                StageStatus::Unavailable {
                    reason: format!("{} unavailable", Stage::FinanceAccounts),
                },
            ));
        }

        let from = now - chrono::Duration::days(i64::from(config.time_entries.window_days));
        let result = source.time_entries(from, now).await;
        if let Some(entries) = self.settle(Stage::TimeEntries, result) {
            fetched.time_entries = entries;
        }

        // Debtor balances, one read per company.
        let mut tally = BatchTally::default();
        for company_id in index.company_ids() {
            let result = source.debtor_balances(company_id).await;
            if let Some(balances) =
                self.settle_item(&mut tally, Stage::Debtors, company_id, result)
            {
                fetched.debtors.extend(balances);
            }
        }
        self.close_batch(Stage::Debtors, tally);

        fetched
    }

    /// First required stage that did not deliver, if any.
    fn missing_input(&self, family: Family) -> Option<String> {
        family.requires().iter().find_map(|stage| {
            (!self.stage_available(*stage)).then(|| format!("{stage} unavailable"))
        })
    }

    fn aggregate(
        &self,
        index: &EntityIndex,
        fetched: &Fetched,
    ) -> (Vec<MetricFamily>, Vec<(Family, FamilyStatus)>) {
        let ctx = FamilyContext {
            index,
            config: self.config,
            now: self.now,
        };

        let mut out = Vec::new();
        let mut collectors = Vec::with_capacity(Family::ALL.len());
        for family in Family::ALL {
            if let Some(reason) = self.missing_input(family) {
                debug!(collector = %family, %reason, "family skipped");
                collectors.push((family, FamilyStatus::Unavailable { reason }));
                continue;
            }
            out.extend(build(family, &ctx, fetched));
            collectors.push((family, FamilyStatus::Available));
        }

        if let Some(converter) = CurrencyConverter::from_config(&self.config.currency, index) {
            converter.apply(&mut out);
        }
        (out, collectors)
    }
}

fn build(family: Family, ctx: &FamilyContext<'_>, fetched: &Fetched) -> Vec<MetricFamily> {
    match family {
        Family::EmployeePrices => families::employee_prices(ctx, &fetched.prices),
        Family::Employees => families::employees(ctx),
        Family::Departments => families::departments(ctx),
        Family::Capacity => families::capacity(ctx),
        Family::Jobs => families::jobs(ctx),
        Family::Customers => families::customers(ctx),
        Family::Credit => families::credit(ctx),
        Family::Debit => families::debit(ctx, &fetched.debtors),
        Family::Finance => families::finance(ctx, &fetched.accounts),
        Family::TimeEntryHours => families::time_entry_hours(ctx, &fetched.time_entries),
        Family::TimeEntryCounts => families::time_entry_counts(ctx, &fetched.time_entries),
        Family::Utilization => families::utilization(ctx, &fetched.time_entries),
    }
}
