//! Core domain model, job progress and list search for FieldOps.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod progress;
pub mod search;

pub use progress::{compute_progress, ProgressResult, TimeSpan, DAY_MILLIS};
pub use search::{
    category_options, contains_ignore_case, filter_entities, highlight, CategoryFilter,
    HighlightSegment, HighlightedText, MatchResult, Searchable, ALL_CATEGORIES,
};

pub const CRATE_NAME: &str = "fieldops-core";

/// Named document collection, one per record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Customers,
    Employees,
    Equipment,
    Jobs,
    Tasks,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Customers,
        Collection::Employees,
        Collection::Equipment,
        Collection::Jobs,
        Collection::Tasks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Customers => "customers",
            Collection::Employees => "employees",
            Collection::Equipment => "equipment",
            Collection::Jobs => "jobs",
            Collection::Tasks => "tasks",
        }
    }

    /// Fields searched by the list pages of this collection, in display order.
    pub fn search_fields(&self) -> &'static [&'static str] {
        match self {
            Collection::Customers => Customer::SEARCH_FIELDS,
            Collection::Employees => Employee::SEARCH_FIELDS,
            Collection::Equipment => Equipment::SEARCH_FIELDS,
            Collection::Jobs => Job::SEARCH_FIELDS,
            Collection::Tasks => Task::SEARCH_FIELDS,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown collection `{0}`")]
pub struct UnknownCollection(pub String);

impl FromStr for Collection {
    type Err = UnknownCollection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownCollection(s.to_string()))
    }
}

/// A record type stored in one [`Collection`].
pub trait Document: Serialize + serde::de::DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn id(&self) -> Uuid;
    fn company_id(&self) -> Uuid;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

impl Customer {
    pub const SEARCH_FIELDS: &'static [&'static str] = &["name", "email", "phone", "city"];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl Employee {
    pub const SEARCH_FIELDS: &'static [&'static str] = &["name", "role", "email"];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub serial_number: String,
    pub location: String,
    #[serde(default = "default_equipment_status")]
    pub status: String,
}

fn default_equipment_status() -> String {
    "Available".to_string()
}

impl Equipment {
    pub const SEARCH_FIELDS: &'static [&'static str] = &["name", "serial_number", "location"];
}

/// A unit of work with a date range, assigned resources and money fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub customer_id: Option<Uuid>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assigned_employees: Vec<Uuid>,
    #[serde(default)]
    pub assigned_equipment: Vec<Uuid>,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default = "default_job_status")]
    pub status: String,
}

fn default_job_status() -> String {
    "Scheduled".to_string()
}

impl Job {
    pub const SEARCH_FIELDS: &'static [&'static str] = &["name", "status"];

    pub fn time_span(&self) -> TimeSpan {
        TimeSpan::from_dates(self.start_date, self.end_date)
    }

    pub fn progress(&self, now: DateTime<Utc>) -> ProgressResult {
        self.time_span().progress_at(now.timestamp_millis())
    }

    /// Budget minus cost, when both are known.
    pub fn margin(&self) -> Option<f64> {
        Some(self.budget? - self.cost?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub company_id: Uuid,
    #[serde(default)]
    pub job_id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub assignee_id: Option<Uuid>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub done: bool,
}

impl Task {
    pub const SEARCH_FIELDS: &'static [&'static str] = &["title"];

    pub fn status(&self) -> &'static str {
        if self.done {
            "Done"
        } else {
            "Open"
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.done && self.due_date.is_some_and(|due| due < now)
    }
}

macro_rules! impl_document {
    ($ty:ty, $collection:expr) => {
        impl Document for $ty {
            const COLLECTION: Collection = $collection;

            fn id(&self) -> Uuid {
                self.id
            }

            fn company_id(&self) -> Uuid {
                self.company_id
            }
        }
    };
}

impl_document!(Customer, Collection::Customers);
impl_document!(Employee, Collection::Employees);
impl_document!(Equipment, Collection::Equipment);
impl_document!(Job, Collection::Jobs);
impl_document!(Task, Collection::Tasks);

fn borrowed(value: &str) -> Option<Cow<'_, str>> {
    Some(Cow::Borrowed(value))
}

fn borrowed_opt(value: &Option<String>) -> Option<Cow<'_, str>> {
    value.as_deref().map(Cow::Borrowed)
}

impl Searchable for Customer {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "name" => borrowed(&self.name),
            "email" => borrowed_opt(&self.email),
            "phone" => borrowed_opt(&self.phone),
            "address" => borrowed_opt(&self.address),
            "city" => borrowed_opt(&self.city),
            _ => None,
        }
    }

    fn category(&self) -> Option<Cow<'_, str>> {
        borrowed_opt(&self.city)
    }
}

impl Searchable for Employee {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "name" => borrowed(&self.name),
            "role" => borrowed(&self.role),
            "email" => borrowed_opt(&self.email),
            "phone" => borrowed_opt(&self.phone),
            _ => None,
        }
    }

    fn category(&self) -> Option<Cow<'_, str>> {
        borrowed(&self.role)
    }
}

impl Searchable for Equipment {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "name" => borrowed(&self.name),
            "serial_number" => borrowed(&self.serial_number),
            "location" => borrowed(&self.location),
            "status" => borrowed(&self.status),
            _ => None,
        }
    }

    fn category(&self) -> Option<Cow<'_, str>> {
        borrowed(&self.location)
    }
}

impl Searchable for Job {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "name" => borrowed(&self.name),
            "status" => borrowed(&self.status),
            _ => None,
        }
    }

    fn category(&self) -> Option<Cow<'_, str>> {
        borrowed(&self.status)
    }
}

impl Searchable for Task {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "title" => borrowed(&self.title),
            "status" => borrowed(self.status()),
            _ => None,
        }
    }

    fn category(&self) -> Option<Cow<'_, str>> {
        borrowed(self.status())
    }
}

/// Free-form string record with a configurable category field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Record {
    pub category_field: String,
    pub fields: BTreeMap<String, String>,
}

impl Record {
    pub fn new(category_field: impl Into<String>) -> Self {
        Self {
            category_field: category_field.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

impl Searchable for Record {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        self.fields.get(name).map(|v| Cow::Borrowed(v.as_str()))
    }

    fn category(&self) -> Option<Cow<'_, str>> {
        self.field(&self.category_field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).expect("ts").with_timezone(&Utc)
    }

    fn job(start: Option<&str>, end: Option<&str>) -> Job {
        Job {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            name: "Driveway regrade".into(),
            customer_id: None,
            start_date: start.map(ts),
            end_date: end.map(ts),
            assigned_employees: vec![],
            assigned_equipment: vec![],
            budget: Some(12_000.0),
            cost: Some(9_500.0),
            status: "In Progress".into(),
        }
    }

    #[test]
    fn job_progress_uses_its_dates() {
        let job = job(Some("2026-05-01T00:00:00Z"), Some("2026-05-11T00:00:00Z"));
        let result = job.progress(ts("2026-05-04T09:30:00Z"));
        assert_eq!(result.elapsed_days, 3);
        assert_eq!(result.days_left, 7);
        assert_eq!(result.progress_percentage, 30.0);
        assert_eq!(job.margin(), Some(2_500.0));
    }

    #[test]
    fn job_without_end_date_is_degenerate() {
        let job = job(Some("2026-05-01T00:00:00Z"), None);
        assert_eq!(job.progress(ts("2026-05-04T00:00:00Z")), ProgressResult::ZERO);
    }

    #[test]
    fn collection_parses_case_insensitively() {
        assert_eq!("Equipment".parse::<Collection>(), Ok(Collection::Equipment));
        assert_eq!(" jobs ".parse::<Collection>(), Ok(Collection::Jobs));
        assert_eq!(
            "trucks".parse::<Collection>(),
            Err(UnknownCollection("trucks".into()))
        );
    }

    #[test]
    fn equipment_is_categorised_by_location() {
        let items = vec![
            Equipment {
                id: Uuid::new_v4(),
                company_id: Uuid::nil(),
                name: "Excavator".into(),
                serial_number: "EXC12345".into(),
                location: "Site A".into(),
                status: default_equipment_status(),
            },
            Equipment {
                id: Uuid::new_v4(),
                company_id: Uuid::nil(),
                name: "Crane".into(),
                serial_number: "CRN-900".into(),
                location: "Site C".into(),
                status: "In Use".into(),
            },
        ];
        let results = filter_entities(&items, "exc", "Site A", Equipment::SEARCH_FIELDS);
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].highlight("serial_number").map(HighlightedText::to_markup),
            Some("<mark>EXC</mark>12345".to_string())
        );
        assert_eq!(category_options(&items), vec!["All", "Site A", "Site C"]);
    }

    #[test]
    fn task_status_is_derived_and_filterable() {
        let base = Task {
            id: Uuid::new_v4(),
            company_id: Uuid::nil(),
            job_id: None,
            title: "Order gravel".into(),
            assignee_id: None,
            due_date: Some(ts("2026-06-01T00:00:00Z")),
            done: false,
        };
        let done = Task {
            done: true,
            title: "Call inspector".into(),
            ..base.clone()
        };
        assert!(base.is_overdue(ts("2026-06-02T00:00:00Z")));
        assert!(!done.is_overdue(ts("2026-06-02T00:00:00Z")));

        let tasks = vec![base, done];
        let open = filter_entities(&tasks, "", "Open", Task::SEARCH_FIELDS);
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].entity.title, "Order gravel");
    }

    #[test]
    fn missing_optional_fields_deserialize_with_defaults() {
        let json = serde_json::json!({
            "id": Uuid::nil(),
            "company_id": Uuid::nil(),
            "name": "Resurface lot"
        });
        let job: Job = serde_json::from_value(json).expect("job");
        assert_eq!(job.status, "Scheduled");
        assert!(job.assigned_employees.is_empty());
        assert_eq!(job.time_span(), TimeSpan::default());
    }
}
