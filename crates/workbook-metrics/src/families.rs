//! Metric family builders.
//!
//! Each builder reads the scrape's [`EntityIndex`] (plus whatever stage data
//! is not indexed) and returns finished families. Builders never fail: stale
//! references are skipped and missing fields become a `0.0` observation with
//! a warning.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use workbook_core::*;

use crate::aggregate::{flag_label, Distinct, Grouped};
use crate::family::{GaugeFamily, MetricDesc, MetricFamily};
use crate::index::EntityIndex;
use crate::resolve::latest_balance;

// ── Descriptions ─────────────────────────────────────────────────

pub const PROFIT_RATIO: MetricDesc = MetricDesc {
    name: "workbook_employees_profit_ratio",
    help: "Profit ratio of the effective employee hourly price",
    labels: &["company_id"],
};
pub const HOURS_SALE: MetricDesc = MetricDesc {
    name: "workbook_employees_hours_sale",
    help: "Hourly sale price of the effective employee price",
    labels: &["company_id", "currency"],
};
pub const HOURS_COST: MetricDesc = MetricDesc {
    name: "workbook_employees_hours_cost",
    help: "Hourly cost price of the effective employee price",
    labels: &["company_id", "currency"],
};
pub const DAYS_EMPLOYED: MetricDesc = MetricDesc {
    name: "workbook_employees_days_employed",
    help: "Days since the employee was hired",
    labels: &["company_id"],
};
pub const DEPARTMENT_EMPLOYEES: MetricDesc = MetricDesc {
    name: "workbook_department_employees",
    help: "Active employees per department",
    labels: &["company_id", "department_id", "department"],
};
pub const DEPARTMENT_CAPACITY: MetricDesc = MetricDesc {
    name: "workbook_department_capacity_hours",
    help: "Weekly capacity hours per department from effective capacity profiles",
    labels: &["company_id", "department_id", "department"],
};
pub const JOBS_AGE: MetricDesc = MetricDesc {
    name: "workbook_jobs_age_days",
    help: "Days since job was created",
    labels: &["company_id", "billable"],
};
pub const ACTIVE_JOBS: MetricDesc = MetricDesc {
    name: "workbook_active_jobs",
    help: "Number of active jobs",
    labels: &["company_id", "billable"],
};
pub const ACTIVE_CUSTOMERS: MetricDesc = MetricDesc {
    name: "workbook_active_customers",
    help: "Customers with at least one active job",
    labels: &["company_id"],
};
pub const ACTIVE_CUSTOMERS_BILLABLE: MetricDesc = MetricDesc {
    name: "workbook_active_customers_billable_jobs",
    help: "Customers with at least one active billable job",
    labels: &["company_id"],
};
pub const CUSTOMERS_AGE: MetricDesc = MetricDesc {
    name: "workbook_customers_age_days",
    help: "Days since the customer's oldest active job was created",
    labels: &["company_id"],
};
pub const FINANCE_ACCOUNT_BALANCE: MetricDesc = MetricDesc {
    name: "workbook_finance_account_balance",
    help: "Latest balance of a finance account",
    labels: &["company_id", "account_id", "account_number", "account", "type_id", "currency"],
};
pub const TIME_ENTRIES_HOURS: MetricDesc = MetricDesc {
    name: "workbook_time_entries_hours",
    help: "Hours registered in the trailing window",
    labels: &["company_id", "department_id", "department", "billable"],
};
pub const TIME_ENTRIES_RESOURCES: MetricDesc = MetricDesc {
    name: "workbook_time_entries_resources",
    help: "Employees with time registered in the trailing window",
    labels: &["company_id"],
};
pub const TIME_ENTRIES_JOBS: MetricDesc = MetricDesc {
    name: "workbook_time_entries_jobs",
    help: "Jobs with time registered in the trailing window",
    labels: &["company_id"],
};
pub const TIME_ENTRIES_CUSTOMERS: MetricDesc = MetricDesc {
    name: "workbook_time_entries_customers",
    help: "Customers of active jobs with time registered in the trailing window",
    labels: &["company_id"],
};
pub const DEPARTMENT_UTILIZATION: MetricDesc = MetricDesc {
    name: "workbook_department_utilization_ratio",
    help: "Billable hours in the trailing window over capacity hours in the same window",
    labels: &["company_id", "department_id", "department"],
};

/// Descriptions of one side of the ledger (creditors or debtors).
#[derive(Debug, Clone, Copy)]
pub struct BalanceDescs {
    pub total: MetricDesc,
    pub due: MetricDesc,
    pub total_amount: MetricDesc,
    pub due_amount: MetricDesc,
}

const BY_COMPANY_CURRENCY: &[&str] = &["company_id", "currency"];

pub const CREDIT: BalanceDescs = BalanceDescs {
    total: MetricDesc {
        name: "workbook_credit_total",
        help: "Remaining amount owed to creditors",
        labels: BY_COMPANY_CURRENCY,
    },
    due: MetricDesc {
        name: "workbook_credit_due",
        help: "Remaining amount due to creditors",
        labels: BY_COMPANY_CURRENCY,
    },
    total_amount: MetricDesc {
        name: "workbook_credit_total_amount",
        help: "Sum of the remaining amount owed to creditors",
        labels: BY_COMPANY_CURRENCY,
    },
    due_amount: MetricDesc {
        name: "workbook_credit_due_amount",
        help: "Sum of the remaining amount due to creditors",
        labels: BY_COMPANY_CURRENCY,
    },
};

pub const DEBIT: BalanceDescs = BalanceDescs {
    total: MetricDesc {
        name: "workbook_debit_total",
        help: "Remaining amount owed by debtors",
        labels: BY_COMPANY_CURRENCY,
    },
    due: MetricDesc {
        name: "workbook_debit_due",
        help: "Remaining amount due from debtors",
        labels: BY_COMPANY_CURRENCY,
    },
    total_amount: MetricDesc {
        name: "workbook_debit_total_amount",
        help: "Sum of the remaining amount owed by debtors",
        labels: BY_COMPANY_CURRENCY,
    },
    due_amount: MetricDesc {
        name: "workbook_debit_due_amount",
        help: "Sum of the remaining amount due from debtors",
        labels: BY_COMPANY_CURRENCY,
    },
};

// ── Context ──────────────────────────────────────────────────────

/// Everything a builder may read besides its own stage data.
#[derive(Clone, Copy)]
pub struct FamilyContext<'a> {
    pub index: &'a EntityIndex,
    pub config: &'a ExporterConfig,
    pub now: Timestamp,
}

impl FamilyContext<'_> {
    fn days_since(&self, from: Timestamp) -> f64 {
        (self.now - from).num_days() as f64
    }

    fn department_labels(&self, company_id: CompanyId, department_id: DepartmentId) -> Vec<String> {
        vec![
            company_id.to_string(),
            department_id.to_string(),
            self.index.department_name(department_id).to_string(),
        ]
    }

    /// (company, department) of an indexed employee with an indexed department.
    fn employee_department_key(&self, employee_id: EmployeeId) -> Option<(CompanyId, DepartmentId)> {
        self.index
            .employee_department(employee_id)
            .map(|d| (d.company_id, d.id))
    }
}

fn company_label(company_id: &CompanyId) -> Vec<String> {
    vec![company_id.to_string()]
}

fn company_currency_labels((company_id, currency): &(CompanyId, String)) -> Vec<String> {
    vec![company_id.to_string(), currency.clone()]
}

/// Field value or the `0.0` sentinel, with a warning naming the gap.
fn or_zero(value: Option<f64>, field: &'static str, subject: &'static str, id: i64) -> f64 {
    value.unwrap_or_else(|| {
        warn!(field, subject, id, "missing field, using 0");
        0.0
    })
}

// ── Employees ────────────────────────────────────────────────────

/// Profit ratio, hourly sale and hourly cost histograms from each employee's
/// effective price.
///
/// `prices` are already resolved per employee. Sale and cost carry the
/// company currency, so companies without a resolved currency only appear in
/// the profit ratio histogram.
pub fn employee_prices(
    ctx: &FamilyContext<'_>,
    prices: &BTreeMap<EmployeeId, EmployeePrice>,
) -> Vec<MetricFamily> {
    let buckets = &ctx.config.buckets;
    let index = ctx.index;

    let company_of = |p: &&EmployeePrice| index.employee_company(p.employee_id);
    let with_currency = |p: &&EmployeePrice| {
        let company_id = index.employee_company(p.employee_id)?;
        let currency = index.company_currency_code(company_id)?;
        Some((company_id, currency.to_string()))
    };
    let currency_seed = index.companies_with_currency();

    let profit = Grouped::new()
        .seed(index.company_ids())
        .extend(prices.values(), company_of, |p| {
            Some(or_zero(p.profit, "Profit", "employee", p.employee_id))
        })
        .into_histogram(&PROFIT_RATIO, &buckets.profit_ratio, company_label);

    let sale = Grouped::new()
        .seed(currency_seed.clone())
        .extend(prices.values(), with_currency, |p| {
            Some(or_zero(p.hours_sale, "HoursSale", "employee", p.employee_id))
        })
        .into_histogram(&HOURS_SALE, &buckets.hours_sale, company_currency_labels);

    let cost = Grouped::new()
        .seed(currency_seed)
        .extend(prices.values(), with_currency, |p| {
            Some(or_zero(p.hours_cost, "HoursCost", "employee", p.employee_id))
        })
        .into_histogram(&HOURS_COST, &buckets.hours_cost, company_currency_labels);

    vec![profit.into(), sale.into(), cost.into()]
}

/// Days employed per company, from every indexed employee's hire date.
pub fn employees(ctx: &FamilyContext<'_>) -> Vec<MetricFamily> {
    let histogram = Grouped::new()
        .seed(ctx.index.company_ids())
        .extend(
            ctx.index.employees(),
            |e| Some(e.company_id),
            |e| match e.hire_date {
                Some(hired) => Some(ctx.days_since(hired)),
                None => Some(or_zero(None, "HireDate", "employee", e.id)),
            },
        )
        .into_histogram(&DAYS_EMPLOYED, &ctx.config.buckets.days_employed, company_label);
    vec![histogram.into()]
}

/// Head count per department.
pub fn departments(ctx: &FamilyContext<'_>) -> Vec<MetricFamily> {
    let gauge = Grouped::new()
        .seed(ctx.index.departments().map(|d| (d.company_id, d.id)))
        .extend(ctx.index.employees(), |e| ctx.employee_department_key(e.id), |_| Some(1.0))
        .into_count_gauge(&DEPARTMENT_EMPLOYEES, |(c, d)| ctx.department_labels(*c, *d));
    vec![gauge.into()]
}

/// Weekly capacity hours per department.
pub fn capacity(ctx: &FamilyContext<'_>) -> Vec<MetricFamily> {
    let mut gauge = GaugeFamily::new(&DEPARTMENT_CAPACITY);
    for ((company_id, department_id), hours) in ctx.index.department_capacity() {
        gauge.add(ctx.department_labels(company_id, department_id), hours);
    }
    vec![gauge.into()]
}

// ── Jobs and customers ───────────────────────────────────────────

fn billable_seed(companies: Vec<CompanyId>) -> Vec<(CompanyId, bool)> {
    companies
        .into_iter()
        .flat_map(|c| [(c, false), (c, true)])
        .collect()
}

/// Job age histogram and active job count, per company and billable flag.
pub fn jobs(ctx: &FamilyContext<'_>) -> Vec<MetricFamily> {
    let seed = billable_seed(ctx.index.company_ids());
    let labels = |(c, b): &(CompanyId, bool)| vec![c.to_string(), flag_label(*b)];

    let grouped = Grouped::new().seed(seed).extend(
        ctx.index.jobs(),
        |j| Some((j.company_id, j.billable)),
        |j| match j.create_date {
            Some(created) => Some(ctx.days_since(created)),
            None => Some(or_zero(None, "CreateDate", "job", j.id)),
        },
    );

    let count = grouped.clone().into_count_gauge(&ACTIVE_JOBS, labels);
    let age = grouped.into_histogram(&JOBS_AGE, &ctx.config.buckets.job_age_days, labels);
    vec![age.into(), count.into()]
}

/// Active customer counts and customer age, per company.
///
/// A customer's age is measured from the oldest creation date among its
/// active jobs in that company. Jobs without a customer are skipped.
pub fn customers(ctx: &FamilyContext<'_>) -> Vec<MetricFamily> {
    let companies = ctx.index.company_ids();

    let active = Distinct::new()
        .seed(companies.clone())
        .extend(ctx.index.jobs(), |j| Some(j.company_id), |j| j.customer_id)
        .into_gauge(&ACTIVE_CUSTOMERS, company_label);

    let billable = Distinct::new()
        .seed(companies.clone())
        .extend(
            ctx.index.jobs(),
            |j| Some(j.company_id),
            |j| j.customer_id.filter(|_| j.billable),
        )
        .into_gauge(&ACTIVE_CUSTOMERS_BILLABLE, company_label);

    let mut oldest: BTreeMap<(CompanyId, CustomerId), Option<Timestamp>> = BTreeMap::new();
    for job in ctx.index.jobs() {
        let Some(customer_id) = job.customer_id else {
            continue;
        };
        let entry = oldest.entry((job.company_id, customer_id)).or_insert(job.create_date);
        *entry = match (*entry, job.create_date) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }
    let age = Grouped::new()
        .seed(companies)
        .extend(
            oldest,
            |((company_id, _), _)| Some(*company_id),
            |((_, customer_id), created)| match created {
                Some(created) => Some(ctx.days_since(*created)),
                None => Some(or_zero(None, "CreateDate", "customer", *customer_id)),
            },
        )
        .into_histogram(&CUSTOMERS_AGE, &ctx.config.buckets.customer_age_days, company_label);

    vec![active.into(), billable.into(), age.into()]
}

// ── Balances ─────────────────────────────────────────────────────

/// Balance histograms and amount sums per (company, currency).
///
/// Records of unindexed companies are stale and skipped, as are records
/// whose currency cannot be resolved.
pub fn balances<'b>(
    ctx: &FamilyContext<'_>,
    descs: &BalanceDescs,
    records: impl IntoIterator<Item = &'b Balance> + Clone,
) -> Vec<MetricFamily> {
    let index = ctx.index;
    let boundaries = &ctx.config.buckets.balance;
    let key = |b: &&Balance| {
        if !index.has_company(b.company_id) {
            return None;
        }
        match index.balance_currency_code(b) {
            Some(code) => Some((b.company_id, code.to_string())),
            None => {
                debug!(company_id = b.company_id, "balance currency unresolved, skipping");
                None
            }
        }
    };
    let total = |b: &&Balance| {
        Some(or_zero(b.remaining_amount_total, "RemainingAmountTotal", "company", b.company_id))
    };
    let due = |b: &&Balance| {
        Some(or_zero(b.remaining_amount_due, "RemainingAmountDue", "company", b.company_id))
    };

    let seed = index.companies_with_currency();
    let totals = Grouped::new().seed(seed.clone()).extend(records.clone(), key, total);
    let dues = Grouped::new().seed(seed).extend(records, key, due);

    vec![
        totals.clone().into_histogram(&descs.total, boundaries, company_currency_labels).into(),
        dues.clone().into_histogram(&descs.due, boundaries, company_currency_labels).into(),
        totals.into_sum_gauge(&descs.total_amount, company_currency_labels).into(),
        dues.into_sum_gauge(&descs.due_amount, company_currency_labels).into(),
    ]
}

/// Creditor balances from the index.
pub fn credit(ctx: &FamilyContext<'_>) -> Vec<MetricFamily> {
    let records: Vec<&Balance> = ctx.index.creditors().collect();
    balances(ctx, &CREDIT, records)
}

/// Debtor balances fetched per company.
pub fn debit(ctx: &FamilyContext<'_>, debtors: &[Balance]) -> Vec<MetricFamily> {
    balances(ctx, &DEBIT, debtors)
}

// ── Finance ──────────────────────────────────────────────────────

/// Whether an account passes the company index and the type allow-list.
pub fn reportable_account(ctx: &FamilyContext<'_>, account: &FinanceAccount) -> bool {
    let allowed = &ctx.config.filters.finance_account_type_ids;
    ctx.index.has_company(account.company_id)
        && (allowed.is_empty() || account.type_id.is_some_and(|t| allowed.contains(&t)))
}

/// Latest balance of each reportable account, in its company's currency.
pub fn finance(
    ctx: &FamilyContext<'_>,
    accounts: &[(FinanceAccount, Vec<FinanceBalance>)],
) -> Vec<MetricFamily> {
    let mut gauge = GaugeFamily::new(&FINANCE_ACCOUNT_BALANCE);
    for (account, entries) in accounts {
        if !reportable_account(ctx, account) {
            continue;
        }
        let Some(currency) = ctx.index.company_currency_code(account.company_id) else {
            debug!(account_id = account.id, "account company has no currency, skipping");
            continue;
        };
        let Some(latest) = latest_balance(entries) else {
            debug!(account_id = account.id, "account has no balance entries");
            continue;
        };
        gauge.add(
            vec![
                account.company_id.to_string(),
                account.id.to_string(),
                account.account_number.clone().unwrap_or_default(),
                account.name.clone().unwrap_or_default(),
                account.type_id.map(|t| t.to_string()).unwrap_or_default(),
                currency.to_string(),
            ],
            or_zero(latest.balance, "Balance", "account", account.id),
        );
    }
    vec![gauge.into()]
}

// ── Time entries ─────────────────────────────────────────────────

/// Hours registered per department and billable flag.
pub fn time_entry_hours(ctx: &FamilyContext<'_>, entries: &[TimeEntry]) -> Vec<MetricFamily> {
    let gauge = Grouped::new()
        .extend(
            entries,
            |t| {
                ctx.employee_department_key(t.resource_id)
                    .map(|(c, d)| (c, d, t.billable))
            },
            |t| Some(or_zero(t.hours, "Hours", "employee", t.resource_id)),
        )
        .into_sum_gauge(&TIME_ENTRIES_HOURS, |(c, d, b)| {
            let mut labels = ctx.department_labels(*c, *d);
            labels.push(flag_label(*b));
            labels
        });
    vec![gauge.into()]
}

/// Distinct employees, jobs and customers with time registered, per company.
///
/// Customers are only known for jobs in the active job index.
pub fn time_entry_counts(ctx: &FamilyContext<'_>, entries: &[TimeEntry]) -> Vec<MetricFamily> {
    let companies = ctx.index.company_ids();
    let company_of = |t: &&TimeEntry| ctx.index.employee_company(t.resource_id);

    let resources = Distinct::new()
        .seed(companies.clone())
        .extend(entries, company_of, |t| Some(t.resource_id))
        .into_gauge(&TIME_ENTRIES_RESOURCES, company_label);
    let jobs = Distinct::new()
        .seed(companies.clone())
        .extend(entries, company_of, |t| t.job_id)
        .into_gauge(&TIME_ENTRIES_JOBS, company_label);
    let customers = Distinct::new()
        .seed(companies)
        .extend(entries, company_of, |t| t.job_id.and_then(|j| ctx.index.job_customer(j)))
        .into_gauge(&TIME_ENTRIES_CUSTOMERS, company_label);

    vec![resources.into(), jobs.into(), customers.into()]
}

/// Billable hours over capacity hours in the trailing window, per department.
///
/// Departments without capacity are left out.
pub fn utilization(ctx: &FamilyContext<'_>, entries: &[TimeEntry]) -> Vec<MetricFamily> {
    let weeks = f64::from(ctx.config.time_entries.window_days) / 7.0;
    let billable = Grouped::new().extend(
        entries.iter().filter(|t| t.billable),
        |t| ctx.employee_department_key(t.resource_id),
        |t| Some(or_zero(t.hours, "Hours", "employee", t.resource_id)),
    );

    let mut gauge = GaugeFamily::new(&DEPARTMENT_UTILIZATION);
    for ((company_id, department_id), weekly) in ctx.index.department_capacity() {
        if weekly <= 0.0 {
            continue;
        }
        let hours: f64 = billable
            .get(&(company_id, department_id))
            .map(|h| h.iter().sum())
            .unwrap_or(0.0);
        gauge.add(
            ctx.department_labels(company_id, department_id),
            hours / (weekly * weeks),
        );
    }
    vec![gauge.into()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn now() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn days_ago(days: i64) -> Option<Timestamp> {
        Some(now() - Duration::days(days))
    }

    fn employee(id: i64, company_id: i64, department_id: Option<i64>, hired: Option<Timestamp>) -> Employee {
        Employee {
            id,
            company_id,
            department_id,
            hire_date: hired,
            time_registration: Some(true),
            sex: None,
            employee_position: None,
            employment_type_id: None,
        }
    }

    fn job(id: i64, company_id: i64, customer_id: Option<i64>, billable: bool, created: Option<Timestamp>) -> Job {
        Job {
            id,
            company_id,
            customer_id,
            status_id: Some(0),
            billable,
            retainer_job: false,
            create_date: created,
            end_date: None,
            company_department_id: None,
        }
    }

    fn entry(resource_id: i64, job_id: Option<i64>, hours: f64, billable: bool) -> TimeEntry {
        TimeEntry {
            resource_id,
            job_id,
            hours: Some(hours),
            billable,
            date: days_ago(1),
        }
    }

    fn index() -> EntityIndex {
        let mut index = EntityIndex::new(
            vec![
                Currency { id: 1, iso_code: "DKK".into() },
                Currency { id: 2, iso_code: "EUR".into() },
            ],
            vec![
                Company { id: 7, name: "Seven".into() },
                Company { id: 8, name: "Eight".into() },
            ],
            vec![
                employee(10, 7, Some(100), days_ago(100)),
                employee(11, 7, Some(100), days_ago(10)),
                employee(12, 8, Some(200), None),
            ],
            &[],
        );
        index.set_company_currency(7, 1);
        index.add_departments(vec![
            Department { id: 100, company_id: 7, name: "Design".into() },
            Department { id: 200, company_id: 8, name: "Dev".into() },
        ]);
        index
    }

    fn gauge<'f>(families: &'f [MetricFamily], name: &str) -> &'f GaugeFamily {
        families
            .iter()
            .find(|f| f.name() == name)
            .and_then(MetricFamily::as_gauge)
            .unwrap()
    }

    fn histogram<'f>(families: &'f [MetricFamily], name: &str) -> &'f crate::family::HistogramFamily {
        families
            .iter()
            .find(|f| f.name() == name)
            .and_then(MetricFamily::as_histogram)
            .unwrap()
    }

    #[test]
    fn customers_grouping_example() {
        let mut index = index();
        index.add_jobs(
            vec![
                job(1, 7, Some(500), true, days_ago(40)),
                job(2, 7, Some(600), false, days_ago(20)),
            ],
            &[0, 1],
        );
        let config = ExporterConfig::default();
        let ctx = FamilyContext { index: &index, config: &config, now: now() };

        let families = customers(&ctx);
        assert_eq!(gauge(&families, "workbook_active_customers").value(&["7"]), Some(2.0));
        assert_eq!(
            gauge(&families, "workbook_active_customers_billable_jobs").value(&["7"]),
            Some(1.0)
        );
        assert_eq!(gauge(&families, "workbook_active_customers").value(&["8"]), Some(0.0));
    }

    #[test]
    fn customer_age_uses_oldest_job() {
        let mut index = index();
        index.add_jobs(
            vec![
                job(1, 7, Some(500), true, days_ago(40)),
                job(2, 7, Some(500), true, days_ago(400)),
                job(3, 7, None, true, days_ago(1)),
            ],
            &[0, 1],
        );
        let config = ExporterConfig::default();
        let ctx = FamilyContext { index: &index, config: &config, now: now() };

        let families = customers(&ctx);
        let age = histogram(&families, "workbook_customers_age_days").sample(&["7"]).unwrap();
        assert_eq!(age.count(), 1);
        assert_eq!(age.sum, 400.0);
    }

    #[test]
    fn jobs_split_by_billable_and_seeded() {
        let mut index = index();
        index.add_jobs(
            vec![
                job(1, 7, Some(1), true, days_ago(45)),
                job(2, 7, Some(2), true, days_ago(10)),
                job(3, 7, Some(3), false, None),
            ],
            &[0, 1],
        );
        let config = ExporterConfig::default();
        let ctx = FamilyContext { index: &index, config: &config, now: now() };

        let families = jobs(&ctx);
        let count = gauge(&families, "workbook_active_jobs");
        assert_eq!(count.value(&["7", "1"]), Some(2.0));
        assert_eq!(count.value(&["7", "0"]), Some(1.0));
        assert_eq!(count.value(&["8", "1"]), Some(0.0));

        let age = histogram(&families, "workbook_jobs_age_days");
        let billable = age.sample(&["7", "1"]).unwrap();
        assert_eq!(billable.sum, 55.0);
        assert_eq!(billable.buckets[0], ("30".to_string(), 1));
        // Missing create date is observed as 0.
        assert_eq!(age.sample(&["7", "0"]).unwrap().buckets[0].1, 1);
    }

    #[test]
    fn days_employed_per_company() {
        let index = index();
        let config = ExporterConfig::default();
        let ctx = FamilyContext { index: &index, config: &config, now: now() };

        let families = employees(&ctx);
        let h = histogram(&families, "workbook_employees_days_employed");
        assert_eq!(h.sample(&["7"]).unwrap().sum, 110.0);
        assert_eq!(h.sample(&["8"]).unwrap().count(), 1);
    }

    #[test]
    fn prices_skip_currency_less_companies_for_sale_and_cost() {
        let index = index();
        let config = ExporterConfig::default();
        let ctx = FamilyContext { index: &index, config: &config, now: now() };

        let price = |employee_id: i64, profit: Option<f64>| EmployeePrice {
            employee_id,
            valid_from: days_ago(5),
            profit,
            hours_sale: Some(900.0),
            hours_cost: Some(400.0),
        };
        let prices: BTreeMap<_, _> = [(10, price(10, Some(0.5))), (12, price(12, None))].into_iter().collect();

        let families = employee_prices(&ctx, &prices);
        let profit = histogram(&families, "workbook_employees_profit_ratio");
        assert_eq!(profit.sample(&["7"]).unwrap().sum, 0.5);
        assert_eq!(profit.sample(&["8"]).unwrap().count(), 1);

        let sale = histogram(&families, "workbook_employees_hours_sale");
        assert_eq!(sale.samples.len(), 1);
        assert_eq!(sale.sample(&["7", "DKK"]).unwrap().sum, 900.0);
    }

    #[test]
    fn department_counts_and_capacity() {
        let mut index = index();
        index.set_weekly_capacity(10, 37.0);
        index.set_weekly_capacity(11, 30.0);
        let config = ExporterConfig::default();
        let ctx = FamilyContext { index: &index, config: &config, now: now() };

        let heads = departments(&ctx);
        let g = gauge(&heads, "workbook_department_employees");
        assert_eq!(g.value(&["7", "100", "Design"]), Some(2.0));
        assert_eq!(g.value(&["8", "200", "Dev"]), Some(1.0));

        let cap = capacity(&ctx);
        assert_eq!(
            gauge(&cap, "workbook_department_capacity_hours").value(&["7", "100", "Design"]),
            Some(67.0)
        );
    }

    #[test]
    fn balances_keyed_by_company_and_currency() {
        let index = index();
        let config = ExporterConfig::default();
        let ctx = FamilyContext { index: &index, config: &config, now: now() };

        let balance = |company_id: i64, currency_id: Option<i64>, total: f64| Balance {
            company_id,
            currency_id,
            remaining_amount_total: Some(total),
            remaining_amount_due: None,
        };
        let debtors = vec![
            balance(7, None, 12_000.0),
            balance(7, Some(2), -500.0),
            balance(8, None, 1.0),
            balance(99, Some(1), 1.0),
        ];

        let families = debit(&ctx, &debtors);
        let amount = gauge(&families, "workbook_debit_total_amount");
        assert_eq!(amount.value(&["7", "DKK"]), Some(12_000.0));
        assert_eq!(amount.value(&["7", "EUR"]), Some(-500.0));
        assert_eq!(amount.samples.len(), 2);

        let due = histogram(&families, "workbook_debit_due");
        assert_eq!(due.sample(&["7", "DKK"]).unwrap().sum, 0.0);
        assert_eq!(due.sample(&["7", "DKK"]).unwrap().count(), 1);
    }

    #[test]
    fn finance_uses_latest_entry_and_type_filter() {
        let index = index();
        let mut config = ExporterConfig::default();
        config.filters.finance_account_type_ids = vec![3];
        let ctx = FamilyContext { index: &index, config: &config, now: now() };

        let account = |id: i64, company_id: i64, type_id: i64| FinanceAccount {
            id,
            company_id,
            type_id: Some(type_id),
            account_number: Some(format!("{id}00")),
            name: Some("Bank".into()),
        };
        let entries = vec![
            FinanceBalance { id: 1, date: None, balance: Some(10.0) },
            FinanceBalance { id: 4, date: None, balance: Some(40.0) },
        ];
        let accounts = vec![
            (account(1, 7, 3), entries.clone()),
            (account(2, 7, 4), entries.clone()),
            (account(3, 8, 3), entries),
        ];

        let families = finance(&ctx, &accounts);
        let g = gauge(&families, "workbook_finance_account_balance");
        assert_eq!(g.samples.len(), 1);
        assert_eq!(g.value(&["7", "1", "100", "Bank", "3", "DKK"]), Some(40.0));
    }

    #[test]
    fn time_entries_hours_counts_and_utilization() {
        let mut index = index();
        index.add_jobs(vec![job(1, 7, Some(500), true, days_ago(3))], &[0, 1]);
        index.set_weekly_capacity(10, 35.0);
        index.set_weekly_capacity(11, 35.0);
        let mut config = ExporterConfig::default();
        config.time_entries.window_days = 7;
        let ctx = FamilyContext { index: &index, config: &config, now: now() };

        let entries = vec![
            entry(10, Some(1), 20.0, true),
            entry(11, Some(1), 15.0, true),
            entry(11, Some(2), 5.0, false),
            entry(999, Some(1), 8.0, true),
        ];

        let hours = time_entry_hours(&ctx, &entries);
        let h = gauge(&hours, "workbook_time_entries_hours");
        assert_eq!(h.value(&["7", "100", "Design", "1"]), Some(35.0));
        assert_eq!(h.value(&["7", "100", "Design", "0"]), Some(5.0));

        let counts = time_entry_counts(&ctx, &entries);
        assert_eq!(gauge(&counts, "workbook_time_entries_resources").value(&["7"]), Some(2.0));
        assert_eq!(gauge(&counts, "workbook_time_entries_jobs").value(&["7"]), Some(2.0));
        assert_eq!(gauge(&counts, "workbook_time_entries_customers").value(&["7"]), Some(1.0));
        assert_eq!(gauge(&counts, "workbook_time_entries_jobs").value(&["8"]), Some(0.0));

        let util = utilization(&ctx, &entries);
        let u = gauge(&util, "workbook_department_utilization_ratio");
        assert_eq!(u.value(&["7", "100", "Design"]), Some(0.5));
        assert_eq!(u.samples.len(), 1);
    }
}
