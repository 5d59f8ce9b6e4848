//! Workbook entity types.
//!
//! Only the fields the exporter consumes are modelled. Everything that may be
//! absent on the wire is an `Option`, so field-presence checks are explicit at
//! the point of use instead of implicit map lookups.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// UTC instant as used throughout the exporter.
pub type Timestamp = DateTime<Utc>;

pub type CurrencyId = i64;
pub type CompanyId = i64;
pub type EmployeeId = i64;
pub type DepartmentId = i64;
pub type JobId = i64;
pub type CustomerId = i64;
pub type AccountId = i64;

/// A record that becomes valid at a given instant and stays valid until a
/// newer record of the same subject takes over.
pub trait Dated {
    fn valid_from(&self) -> Option<Timestamp>;
}

// ── Reference data ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Currency {
    pub id: CurrencyId,
    /// ISO 4217 code. Workbook spells the field `Iso4127`.
    #[serde(rename = "Iso4127")]
    pub iso_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Company {
    pub id: CompanyId,
    #[serde(default)]
    pub name: String,
}

/// Per-company detail record. The bulk company listing does not carry the
/// currency, so it has to be fetched one company at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CompanyDetail {
    pub id: CompanyId,
    #[serde(default)]
    pub currency_id: Option<CurrencyId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Department {
    pub id: DepartmentId,
    pub company_id: CompanyId,
    #[serde(default)]
    pub name: String,
}

// ── Employees ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Employee {
    pub id: EmployeeId,
    pub company_id: CompanyId,
    #[serde(default)]
    pub department_id: Option<DepartmentId>,
    #[serde(default, with = "wb_date")]
    pub hire_date: Option<Timestamp>,
    #[serde(default)]
    pub time_registration: Option<bool>,
    #[serde(default)]
    pub sex: Option<i64>,
    #[serde(default)]
    pub employee_position: Option<i64>,
    #[serde(default)]
    pub employment_type_id: Option<i64>,
}

/// Weekly working-hour profile of an employee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CapacityProfile {
    pub employee_id: EmployeeId,
    #[serde(default, with = "wb_date")]
    pub valid_from: Option<Timestamp>,
    #[serde(default)]
    pub hours_monday: Option<f64>,
    #[serde(default)]
    pub hours_tuesday: Option<f64>,
    #[serde(default)]
    pub hours_wednesday: Option<f64>,
    #[serde(default)]
    pub hours_thursday: Option<f64>,
    #[serde(default)]
    pub hours_friday: Option<f64>,
    #[serde(default)]
    pub hours_saturday: Option<f64>,
    #[serde(default)]
    pub hours_sunday: Option<f64>,
}

impl CapacityProfile {
    /// Expected working hours per week. Missing weekdays count as zero.
    pub fn weekly_hours(&self) -> f64 {
        [
            self.hours_monday,
            self.hours_tuesday,
            self.hours_wednesday,
            self.hours_thursday,
            self.hours_friday,
            self.hours_saturday,
            self.hours_sunday,
        ]
        .iter()
        .flatten()
        .sum()
    }
}

impl Dated for CapacityProfile {
    fn valid_from(&self) -> Option<Timestamp> {
        self.valid_from
    }
}

/// Hourly price entry for an employee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EmployeePrice {
    pub employee_id: EmployeeId,
    #[serde(default, with = "wb_date")]
    pub valid_from: Option<Timestamp>,
    #[serde(default)]
    pub profit: Option<f64>,
    #[serde(default)]
    pub hours_sale: Option<f64>,
    #[serde(default)]
    pub hours_cost: Option<f64>,
}

impl Dated for EmployeePrice {
    fn valid_from(&self) -> Option<Timestamp> {
        self.valid_from
    }
}

// ── Jobs and time ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Job {
    pub id: JobId,
    pub company_id: CompanyId,
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    #[serde(default)]
    pub status_id: Option<i64>,
    #[serde(default)]
    pub billable: bool,
    #[serde(default)]
    pub retainer_job: bool,
    #[serde(default, with = "wb_date")]
    pub create_date: Option<Timestamp>,
    #[serde(default, with = "wb_date")]
    pub end_date: Option<Timestamp>,
    #[serde(default)]
    pub company_department_id: Option<DepartmentId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TimeEntry {
    pub resource_id: EmployeeId,
    #[serde(default)]
    pub job_id: Option<JobId>,
    #[serde(default)]
    pub hours: Option<f64>,
    #[serde(default)]
    pub billable: bool,
    #[serde(default, with = "wb_date")]
    pub date: Option<Timestamp>,
}

// ── Finance ────────────────────────────────────────────────────────

/// Creditor or debtor balance for one counterparty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Balance {
    pub company_id: CompanyId,
    #[serde(default)]
    pub currency_id: Option<CurrencyId>,
    #[serde(default)]
    pub remaining_amount_total: Option<f64>,
    #[serde(default)]
    pub remaining_amount_due: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FinanceAccount {
    pub id: AccountId,
    pub company_id: CompanyId,
    #[serde(default)]
    pub type_id: Option<i64>,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FinanceBalance {
    pub id: i64,
    #[serde(default, with = "wb_date")]
    pub date: Option<Timestamp>,
    #[serde(default)]
    pub balance: Option<f64>,
}

// ── Dates ──────────────────────────────────────────────────────────

/// Parse a Workbook timestamp.
///
/// Accepts RFC 3339 (`2020-08-17T09:02:23.677+02:00`), the usual Workbook form
/// with or without fraction and trailing `Z` (`2020-08-17T09:02:23.677Z`), and
/// plain dates (`2020-08-17`). Naive values are taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<Timestamp> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = s.strip_suffix('Z').unwrap_or(s);
    if let Ok(dt) = NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Serde adapter for optional Workbook timestamps.
///
/// An unparseable value is logged and read as absent, so one bad record
/// never fails the whole response.
pub mod wb_date {
    use serde::{Deserialize, Deserializer, Serializer};
    use tracing::warn;

    use super::{parse_timestamp, Timestamp};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => {
                let parsed = parse_timestamp(&s);
                if parsed.is_none() {
                    warn!(value = %s, "invalid Workbook timestamp, treating as missing");
                }
                Ok(parsed)
            }
        }
    }

    pub fn serialize<S>(value: &Option<Timestamp>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()),
            None => serializer.serialize_none(),
        }
    }
}
