//! Scrape-scoped lookup tables over the fetched Workbook entities.
//!
//! The index is built at the start of a scrape from the critical batch
//! (currencies, companies, employees) and enriched as later stages succeed.
//! It applies the company allow-list once, so everything downstream only ever
//! sees reportable companies.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use workbook_core::*;

#[derive(Debug, Default)]
pub struct EntityIndex {
    currencies: HashMap<CurrencyId, String>,
    companies: BTreeMap<CompanyId, Company>,
    company_currency: HashMap<CompanyId, CurrencyId>,
    employees: BTreeMap<EmployeeId, Employee>,
    departments: HashMap<DepartmentId, Department>,
    jobs: BTreeMap<JobId, Job>,
    creditors: BTreeMap<CompanyId, Vec<Balance>>,
    /// Ordered so department sums add in the same order every scrape.
    weekly_capacity: BTreeMap<EmployeeId, f64>,
}

impl EntityIndex {
    /// Build the index from the critical batch.
    ///
    /// A non-empty `allow_list` drops every company not in it, together with
    /// its employees. Each allow-listed id missing from the fetch is reported.
    pub fn new(
        currencies: Vec<Currency>,
        companies: Vec<Company>,
        employees: Vec<Employee>,
        allow_list: &[CompanyId],
    ) -> Self {
        let companies: BTreeMap<CompanyId, Company> = companies
            .into_iter()
            .filter(|c| allow_list.is_empty() || allow_list.contains(&c.id))
            .map(|c| (c.id, c))
            .collect();

        for id in allow_list {
            if !companies.contains_key(id) {
                warn!(company_id = id, "configured company not found in Workbook");
            }
        }

        let employees = employees
            .into_iter()
            .filter(|e| companies.contains_key(&e.company_id))
            .map(|e| (e.id, e))
            .collect();

        Self {
            currencies: currencies.into_iter().map(|c| (c.id, c.iso_code)).collect(),
            companies,
            employees,
            ..Self::default()
        }
    }

    // ── Companies and currencies ──────────────────────────────────

    pub fn company_ids(&self) -> Vec<CompanyId> {
        self.companies.keys().copied().collect()
    }

    pub fn companies(&self) -> impl Iterator<Item = &Company> {
        self.companies.values()
    }

    pub fn has_company(&self, id: CompanyId) -> bool {
        self.companies.contains_key(&id)
    }

    pub fn currency_code(&self, id: CurrencyId) -> Option<&str> {
        self.currencies.get(&id).map(String::as_str)
    }

    /// Record the company's currency from its detail record.
    pub fn set_company_currency(&mut self, company_id: CompanyId, currency_id: CurrencyId) {
        if self.currency_code(currency_id).is_none() {
            warn!(company_id, currency_id, "company currency not in currency table");
        }
        self.company_currency.insert(company_id, currency_id);
    }

    /// ISO code of the company's reporting currency, when known.
    pub fn company_currency_code(&self, company_id: CompanyId) -> Option<&str> {
        self.company_currency
            .get(&company_id)
            .and_then(|id| self.currency_code(*id))
    }

    /// Companies with a resolved currency, paired with its ISO code.
    pub fn companies_with_currency(&self) -> Vec<(CompanyId, String)> {
        self.companies
            .keys()
            .filter_map(|id| self.company_currency_code(*id).map(|c| (*id, c.to_string())))
            .collect()
    }

    /// Currency of a balance record: its own when it resolves, otherwise the
    /// owning company's.
    pub fn balance_currency_code(&self, balance: &Balance) -> Option<&str> {
        balance
            .currency_id
            .and_then(|id| self.currency_code(id))
            .or_else(|| self.company_currency_code(balance.company_id))
    }

    // ── Employees ────────────────────────────────────────────────

    pub fn employee_ids(&self) -> Vec<EmployeeId> {
        self.employees.keys().copied().collect()
    }

    pub fn employees(&self) -> impl Iterator<Item = &Employee> {
        self.employees.values()
    }

    pub fn employee(&self, id: EmployeeId) -> Option<&Employee> {
        self.employees.get(&id)
    }

    pub fn employee_company(&self, id: EmployeeId) -> Option<CompanyId> {
        self.employee(id).map(|e| e.company_id)
    }

    /// Department of an employee, when both are indexed.
    pub fn employee_department(&self, id: EmployeeId) -> Option<&Department> {
        self.employee(id)
            .and_then(|e| e.department_id)
            .and_then(|d| self.departments.get(&d))
    }

    /// Store the weekly hours of the employee's effective capacity profile.
    pub fn set_weekly_capacity(&mut self, employee_id: EmployeeId, hours: f64) {
        self.weekly_capacity.insert(employee_id, hours);
    }

    pub fn weekly_capacity(&self, employee_id: EmployeeId) -> Option<f64> {
        self.weekly_capacity.get(&employee_id).copied()
    }

    /// Weekly capacity summed per (company, department).
    ///
    /// Employees without a resolved profile or an indexed department are left
    /// out.
    pub fn department_capacity(&self) -> BTreeMap<(CompanyId, DepartmentId), f64> {
        let mut totals = BTreeMap::new();
        for (employee_id, hours) in &self.weekly_capacity {
            if let Some(dept) = self.employee_department(*employee_id) {
                *totals.entry((dept.company_id, dept.id)).or_insert(0.0) += hours;
            }
        }
        totals
    }

    // ── Departments ──────────────────────────────────────────────

    pub fn add_departments(&mut self, departments: Vec<Department>) {
        for d in departments {
            if self.has_company(d.company_id) {
                self.departments.insert(d.id, d);
            }
        }
    }

    pub fn department(&self, id: DepartmentId) -> Option<&Department> {
        self.departments.get(&id)
    }

    pub fn departments(&self) -> impl Iterator<Item = &Department> {
        self.departments.values()
    }

    pub fn department_name(&self, id: DepartmentId) -> &str {
        self.department(id).map(|d| d.name.as_str()).unwrap_or_default()
    }

    // ── Jobs ─────────────────────────────────────────────────────

    /// Index jobs of reportable companies whose status is in `active_status_ids`.
    pub fn add_jobs(&mut self, jobs: Vec<Job>, active_status_ids: &[i64]) {
        for j in jobs {
            let active = j.status_id.is_none_or(|s| active_status_ids.contains(&s));
            if active && self.has_company(j.company_id) {
                self.jobs.insert(j.id, j);
            }
        }
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(&id)
    }

    pub fn job_customer(&self, id: JobId) -> Option<CustomerId> {
        self.job(id).and_then(|j| j.customer_id)
    }

    // ── Creditors ────────────────────────────────────────────────

    pub fn add_creditors(&mut self, creditors: Vec<Balance>) {
        for c in creditors {
            if self.has_company(c.company_id) {
                self.creditors.entry(c.company_id).or_default().push(c);
            }
        }
    }

    pub fn creditors(&self) -> impl Iterator<Item = &Balance> {
        self.creditors.values().flatten()
    }

    pub fn creditors_of(&self, company_id: CompanyId) -> &[Balance] {
        self.creditors
            .get(&company_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn currency(id: i64, iso: &str) -> Currency {
        Currency { id, iso_code: iso.to_string() }
    }

    fn company(id: i64) -> Company {
        Company { id, name: format!("Company {id}") }
    }

    fn employee(id: i64, company_id: i64, department_id: Option<i64>) -> Employee {
        Employee {
            id,
            company_id,
            department_id,
            hire_date: None,
            time_registration: Some(true),
            sex: None,
            employee_position: None,
            employment_type_id: None,
        }
    }

    fn department(id: i64, company_id: i64, name: &str) -> Department {
        Department { id, company_id, name: name.to_string() }
    }

    fn base_index(allow_list: &[i64]) -> EntityIndex {
        EntityIndex::new(
            vec![currency(1, "DKK"), currency(2, "EUR")],
            vec![company(1), company(2), company(3)],
            vec![employee(10, 1, Some(100)), employee(11, 2, Some(200)), employee(12, 3, None)],
            allow_list,
        )
    }

    #[test]
    fn empty_allow_list_keeps_all_companies() {
        let index = base_index(&[]);
        assert_eq!(index.company_ids(), vec![1, 2, 3]);
        assert_eq!(index.employee_ids(), vec![10, 11, 12]);
    }

    #[test]
    fn allow_list_drops_other_companies_and_their_employees() {
        let index = base_index(&[2, 42]);
        assert_eq!(index.company_ids(), vec![2]);
        assert_eq!(index.employee_ids(), vec![11]);
        assert!(index.employee(10).is_none());
    }

    #[test]
    fn company_currency_resolution() {
        let mut index = base_index(&[]);
        index.set_company_currency(1, 1);
        index.set_company_currency(2, 77);
        assert_eq!(index.company_currency_code(1), Some("DKK"));
        assert_eq!(index.company_currency_code(2), None);
        assert_eq!(index.company_currency_code(3), None);
        assert_eq!(index.companies_with_currency(), vec![(1, "DKK".to_string())]);
    }

    #[test]
    fn balance_currency_falls_back_to_company() {
        let mut index = base_index(&[]);
        index.set_company_currency(1, 1);
        let own = Balance {
            company_id: 1,
            currency_id: Some(2),
            remaining_amount_total: None,
            remaining_amount_due: None,
        };
        let unknown = Balance { currency_id: Some(99), ..own.clone() };
        let orphan = Balance { company_id: 3, currency_id: None, ..own.clone() };
        assert_eq!(index.balance_currency_code(&own), Some("EUR"));
        assert_eq!(index.balance_currency_code(&unknown), Some("DKK"));
        assert_eq!(index.balance_currency_code(&orphan), None);
    }

    #[test]
    fn departments_of_filtered_companies_dropped() {
        let mut index = base_index(&[1]);
        index.add_departments(vec![department(100, 1, "Design"), department(200, 2, "Sales")]);
        assert_eq!(index.department_name(100), "Design");
        assert!(index.department(200).is_none());
        assert_eq!(index.employee_department(10).map(|d| d.id), Some(100));
    }

    #[test]
    fn jobs_filtered_by_status_and_company() {
        let mut index = base_index(&[1, 2]);
        let job = |id: i64, company_id: i64, status_id: Option<i64>| Job {
            id,
            company_id,
            customer_id: Some(id * 10),
            status_id,
            billable: true,
            retainer_job: false,
            create_date: None,
            end_date: None,
            company_department_id: None,
        };
        index.add_jobs(
            vec![job(1, 1, Some(0)), job(2, 1, Some(5)), job(3, 3, Some(1)), job(4, 2, None)],
            &[0, 1],
        );
        let ids: Vec<i64> = index.jobs().map(|j| j.id).collect();
        assert_eq!(ids, vec![1, 4]);
        assert_eq!(index.job_customer(1), Some(10));
        assert_eq!(index.job_customer(2), None);
    }

    #[test]
    fn department_capacity_sums_per_department() {
        let mut index = EntityIndex::new(
            vec![],
            vec![company(1)],
            vec![
                employee(10, 1, Some(100)),
                employee(11, 1, Some(100)),
                employee(12, 1, Some(101)),
                employee(13, 1, None),
            ],
            &[],
        );
        index.add_departments(vec![department(100, 1, "Design"), department(101, 1, "Dev")]);
        index.set_weekly_capacity(10, 37.0);
        index.set_weekly_capacity(11, 20.0);
        index.set_weekly_capacity(12, 30.0);
        index.set_weekly_capacity(13, 40.0);

        let capacity = index.department_capacity();
        assert_eq!(capacity.len(), 2);
        assert_eq!(capacity[&(1, 100)], 57.0);
        assert_eq!(capacity[&(1, 101)], 30.0);
    }

    #[test]
    fn department_capacity_independent_of_insertion_order() {
        let build = |order: &[(i64, f64)]| {
            let mut index = EntityIndex::new(
                vec![],
                vec![company(1)],
                vec![
                    employee(10, 1, Some(100)),
                    employee(11, 1, Some(100)),
                    employee(12, 1, Some(100)),
                ],
                &[],
            );
            index.add_departments(vec![department(100, 1, "Design")]);
            for (employee_id, hours) in order {
                index.set_weekly_capacity(*employee_id, *hours);
            }
            index.department_capacity()[&(1, 100)]
        };

        let forward = build(&[(10, 0.1), (11, 0.2), (12, 0.3)]);
        let backward = build(&[(12, 0.3), (11, 0.2), (10, 0.1)]);
        assert_eq!(forward.to_bits(), backward.to_bits());
    }

    #[test]
    fn creditors_grouped_by_company() {
        let mut index = base_index(&[1]);
        let balance = |company_id: i64| Balance {
            company_id,
            currency_id: Some(1),
            remaining_amount_total: Some(10.0),
            remaining_amount_due: Some(5.0),
        };
        index.add_creditors(vec![balance(1), balance(2), balance(1)]);
        assert_eq!(index.creditors_of(1).len(), 2);
        assert!(index.creditors_of(2).is_empty());
        assert_eq!(index.creditors().count(), 2);
    }
}
