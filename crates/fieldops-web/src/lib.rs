//! Axum + Askama dashboard for FieldOps.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use askama::Template;
use axum::{
    extract::{Path as AxumPath, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use fieldops_core::{
    category_options, filter_entities, Collection, Customer, Document, Employee, Equipment,
    HighlightSegment, Job, MatchResult, ProgressResult, Searchable, Task,
};
use fieldops_storage::{import_seed, list_scoped, JsonDocumentStore, Repository, SeedData, StoreError};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "fieldops-web";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub port: u16,
    pub company_id: Option<Uuid>,
    pub seed_file: Option<PathBuf>,
    pub workspace_root: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            data_dir: std::env::var("FIELDOPS_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            port: std::env::var("FIELDOPS_WEB_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            company_id: std::env::var("FIELDOPS_COMPANY_ID")
                .ok()
                .and_then(|v| Uuid::parse_str(v.trim()).ok()),
            seed_file: std::env::var("FIELDOPS_SEED_FILE").ok().map(PathBuf::from),
            workspace_root: PathBuf::from("."),
        }
    }
}

/// Source of "now" for progress calculations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clock {
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(at) => *at,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub company_id: Option<Uuid>,
    pub clock: Clock,
    pub workspace_root: PathBuf,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repository>, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            repo,
            company_id: None,
            clock: Clock::System,
            workspace_root: workspace_root.into(),
        }
    }

    pub fn with_company(mut self, company_id: Option<Uuid>) -> Self {
        self.company_id = company_id;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    async fn list<D: Document>(&self) -> Result<Vec<D>, StoreError> {
        list_scoped::<D>(self.repo.as_ref(), self.company_id).await
    }
}

/// How a collection is shown as a searchable list page.
pub struct ListView {
    pub title: &'static str,
    pub category_label: &'static str,
    /// (field name, column header) pairs.
    pub columns: &'static [(&'static str, &'static str)],
}

pub trait ListItem: Document + Searchable {
    const VIEW: ListView;
    const SHOWS_PROGRESS: bool = false;

    fn detail_link(&self) -> Option<String> {
        None
    }

    fn progress(&self, _now: DateTime<Utc>) -> Option<ProgressResult> {
        None
    }
}

impl ListItem for Customer {
    const VIEW: ListView = ListView {
        title: "Customers",
        category_label: "City",
        columns: &[("name", "Name"), ("email", "Email"), ("phone", "Phone"), ("city", "City")],
    };
}

impl ListItem for Employee {
    const VIEW: ListView = ListView {
        title: "Employees",
        category_label: "Role",
        columns: &[("name", "Name"), ("role", "Role"), ("email", "Email"), ("phone", "Phone")],
    };
}

impl ListItem for Equipment {
    const VIEW: ListView = ListView {
        title: "Equipment",
        category_label: "Location",
        columns: &[
            ("name", "Name"),
            ("serial_number", "Serial number"),
            ("location", "Location"),
            ("status", "Status"),
        ],
    };
}

impl ListItem for Job {
    const VIEW: ListView = ListView {
        title: "Jobs",
        category_label: "Status",
        columns: &[("name", "Job"), ("status", "Status")],
    };
    const SHOWS_PROGRESS: bool = true;

    fn detail_link(&self) -> Option<String> {
        Some(format!("/jobs/{}", self.id))
    }

    fn progress(&self, now: DateTime<Utc>) -> Option<ProgressResult> {
        Some(Job::progress(self, now))
    }
}

impl ListItem for Task {
    const VIEW: ListView = ListView {
        title: "Tasks",
        category_label: "Status",
        columns: &[("title", "Task"), ("status", "Status")],
    };

    fn detail_link(&self) -> Option<String> {
        self.job_id.map(|id| format!("/jobs/{id}"))
    }
}

#[derive(Debug, Deserialize, Default)]
struct ListQuery {
    #[serde(default)]
    q: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

impl ListQuery {
    fn query(&self) -> &str {
        self.q.as_deref().unwrap_or_default()
    }

    /// First non-blank of `category` and the per-page names; otherwise every category.
    fn category(&self) -> String {
        [&self.category, &self.location, &self.status, &self.city, &self.role]
            .into_iter()
            .filter_map(|value| value.as_deref())
            .find(|value| !value.is_empty())
            .unwrap_or(fieldops_core::ALL_CATEGORIES)
            .to_string()
    }
}

#[derive(Debug, Clone)]
struct SelectOption {
    value: String,
    selected: bool,
}

#[derive(Debug, Clone)]
struct RowView {
    cells: Vec<Vec<HighlightSegment>>,
    link: String,
    percent: u8,
    days_left: i64,
}

#[derive(Debug, Clone)]
struct ActiveJobRow {
    id: Uuid,
    name: String,
    status: String,
    percent: u8,
    elapsed_days: i64,
    days_left: i64,
}

#[derive(Debug, Clone)]
struct TaskRow {
    title: String,
    due_text: String,
    css_class: &'static str,
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    total_customers: usize,
    total_employees: usize,
    total_equipment: usize,
    total_jobs: usize,
    open_tasks: usize,
    overdue_tasks: usize,
    active_jobs: Vec<ActiveJobRow>,
}

#[derive(Template)]
#[template(path = "list.html")]
struct ListPageTemplate {
    title: &'static str,
    collection: Collection,
    category_label: &'static str,
    query: String,
    options: Vec<SelectOption>,
    headers: Vec<&'static str>,
    rows: Vec<RowView>,
    total: usize,
    show_progress: bool,
}

#[derive(Template)]
#[template(path = "list_table_partial.html")]
struct ListTablePartialTemplate {
    headers: Vec<&'static str>,
    rows: Vec<RowView>,
    total: usize,
    show_progress: bool,
}

#[derive(Template)]
#[template(path = "job_detail.html")]
struct JobDetailTemplate {
    job: Job,
    customer_name: String,
    start_text: String,
    end_text: String,
    budget_text: String,
    cost_text: String,
    margin_text: String,
    percent: u8,
    elapsed_days: i64,
    days_left: i64,
    employees: Vec<String>,
    equipment: Vec<String>,
    tasks: Vec<TaskRow>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/customers", get(list_page_handler::<Customer>))
        .route("/customers/table", get(list_table_handler::<Customer>))
        .route("/employees", get(list_page_handler::<Employee>))
        .route("/employees/table", get(list_table_handler::<Employee>))
        .route("/equipment", get(list_page_handler::<Equipment>))
        .route("/equipment/table", get(list_table_handler::<Equipment>))
        .route("/jobs", get(list_page_handler::<Job>))
        .route("/jobs/table", get(list_table_handler::<Job>))
        .route("/jobs/{id}", get(job_detail_handler))
        .route("/tasks", get(list_page_handler::<Task>))
        .route("/tasks/table", get(list_table_handler::<Task>))
        .route("/api/jobs/{id}/progress", get(job_progress_api_handler))
        .route("/api/search/{collection}", get(search_api_handler))
        .route("/health", get(health_handler))
        .route("/assets/static/app.css", get(app_css_handler))
        .with_state(Arc::new(state))
}

/// Open the JSON store, seed it when empty and a seed file is configured, and serve.
pub async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let store = Arc::new(JsonDocumentStore::new(&config.data_dir));
    if let Some(seed_file) = &config.seed_file {
        if store_is_empty(store.as_ref()).await? {
            let seed = SeedData::from_yaml_file(seed_file)
                .await
                .with_context(|| format!("loading seed file {}", seed_file.display()))?;
            import_seed(store.as_ref(), &seed).await?;
            info!(seed = %seed_file.display(), "seeded empty data directory");
        }
    }

    let state = AppState::new(store, &config.workspace_root).with_company(config.company_id);
    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("binding port {}", config.port))?;
    info!(port = config.port, data_dir = %config.data_dir.display(), "serving dashboard");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn store_is_empty(repo: &dyn Repository) -> Result<bool, StoreError> {
    for collection in Collection::ALL {
        if !repo.load(collection).await?.is_empty() {
            return Ok(false);
        }
    }
    Ok(true)
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Response {
    match load_index(&state).await {
        Ok(tpl) => render_html(tpl),
        Err(err) => server_error(err),
    }
}

async fn load_index(state: &AppState) -> anyhow::Result<IndexTemplate> {
    let now = state.clock.now();
    let customers = state.list::<Customer>().await?;
    let employees = state.list::<Employee>().await?;
    let equipment = state.list::<Equipment>().await?;
    let jobs = state.list::<Job>().await?;
    let tasks = state.list::<Task>().await?;

    let active_jobs = jobs
        .iter()
        .filter(|j| !j.status.eq_ignore_ascii_case("completed"))
        .map(|j| {
            let progress = j.progress(now);
            ActiveJobRow {
                id: j.id,
                name: j.name.clone(),
                status: j.status.clone(),
                percent: progress.rounded_percentage(),
                elapsed_days: progress.elapsed_days,
                days_left: progress.days_left,
            }
        })
        .collect();

    Ok(IndexTemplate {
        total_customers: customers.len(),
        total_employees: employees.len(),
        total_equipment: equipment.len(),
        total_jobs: jobs.len(),
        open_tasks: tasks.iter().filter(|t| !t.done).count(),
        overdue_tasks: tasks.iter().filter(|t| t.is_overdue(now)).count(),
        active_jobs,
    })
}

struct ListData {
    options: Vec<SelectOption>,
    rows: Vec<RowView>,
    total: usize,
    show_progress: bool,
}

fn build_list<T: ListItem>(items: &[T], query: &ListQuery, now: DateTime<Utc>) -> ListData {
    let selected = query.category();
    let options = category_options(items)
        .into_iter()
        .map(|value| SelectOption {
            selected: value == selected,
            value,
        })
        .collect();

    let fields = T::COLLECTION.search_fields();
    let matches = filter_entities(items, query.query(), selected.as_str(), fields);
    let rows = matches.iter().map(|m| row_view(m, now)).collect();

    ListData {
        options,
        rows,
        total: items.len(),
        show_progress: T::SHOWS_PROGRESS,
    }
}

fn row_view<T: ListItem>(m: &MatchResult<'_, T>, now: DateTime<Utc>) -> RowView {
    let cells = T::VIEW
        .columns
        .iter()
        .map(|(field, _)| match m.highlight(field) {
            Some(text) => text.segments.clone(),
            None => vec![HighlightSegment {
                text: m.entity.field(field).unwrap_or_default().into_owned(),
                matched: false,
            }],
        })
        .collect();
    let progress = m.entity.progress(now).unwrap_or(ProgressResult::ZERO);
    RowView {
        cells,
        link: m.entity.detail_link().unwrap_or_default(),
        percent: progress.rounded_percentage(),
        days_left: progress.days_left,
    }
}

fn headers<T: ListItem>() -> Vec<&'static str> {
    T::VIEW.columns.iter().map(|(_, header)| *header).collect()
}

async fn list_page_handler<T: ListItem>(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Response {
    match state.list::<T>().await {
        Ok(items) => {
            let data = build_list(&items, &query, state.clock.now());
            render_html(ListPageTemplate {
                title: T::VIEW.title,
                collection: T::COLLECTION,
                category_label: T::VIEW.category_label,
                query: query.query().to_string(),
                options: data.options,
                headers: headers::<T>(),
                rows: data.rows,
                total: data.total,
                show_progress: data.show_progress,
            })
        }
        Err(err) => server_error(err.into()),
    }
}

async fn list_table_handler<T: ListItem>(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Response {
    match state.list::<T>().await {
        Ok(items) => {
            let data = build_list(&items, &query, state.clock.now());
            let mut resp = render_html(ListTablePartialTemplate {
                headers: headers::<T>(),
                rows: data.rows,
                total: data.total,
                show_progress: data.show_progress,
            });
            resp.headers_mut().insert(
                header::HeaderName::from_static("hx-trigger"),
                header::HeaderValue::from_static("listTableLoaded"),
            );
            resp
        }
        Err(err) => server_error(err.into()),
    }
}

async fn job_detail_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<Uuid>,
) -> Response {
    match load_job_detail(&state, id).await {
        Ok(Some(tpl)) => render_html(tpl),
        Ok(None) => (StatusCode::NOT_FOUND, Html("Job not found".to_string())).into_response(),
        Err(err) => server_error(err),
    }
}

fn money(value: Option<f64>) -> String {
    value
        .map(|v| format!("${v:.2}"))
        .unwrap_or_else(|| "n/a".to_string())
}

fn date(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unset".to_string())
}

async fn load_job_detail(state: &AppState, id: Uuid) -> anyhow::Result<Option<JobDetailTemplate>> {
    let jobs = state.list::<Job>().await?;
    let Some(job) = jobs.into_iter().find(|j| j.id == id) else {
        return Ok(None);
    };
    let now = state.clock.now();
    let progress = job.progress(now);

    let customer_name = match job.customer_id {
        Some(customer_id) => state
            .list::<Customer>()
            .await?
            .into_iter()
            .find(|c| c.id == customer_id)
            .map(|c| c.name)
            .unwrap_or_else(|| "unknown customer".to_string()),
        None => "none".to_string(),
    };
    let employees = state
        .list::<Employee>()
        .await?
        .into_iter()
        .filter(|e| job.assigned_employees.contains(&e.id))
        .map(|e| format!("{} ({})", e.name, e.role))
        .collect();
    let equipment = state
        .list::<Equipment>()
        .await?
        .into_iter()
        .filter(|e| job.assigned_equipment.contains(&e.id))
        .map(|e| format!("{} #{}", e.name, e.serial_number))
        .collect();
    let tasks = state
        .list::<Task>()
        .await?
        .into_iter()
        .filter(|t| t.job_id == Some(job.id))
        .map(|t| TaskRow {
            css_class: if t.done {
                "done"
            } else if t.is_overdue(now) {
                "overdue"
            } else {
                "open"
            },
            due_text: t
                .due_date
                .map(|d| format!("due {}", d.format("%Y-%m-%d")))
                .unwrap_or_default(),
            title: t.title,
        })
        .collect();

    Ok(Some(JobDetailTemplate {
        customer_name,
        start_text: date(job.start_date),
        end_text: date(job.end_date),
        budget_text: money(job.budget),
        cost_text: money(job.cost),
        margin_text: money(job.margin()),
        percent: progress.rounded_percentage(),
        elapsed_days: progress.elapsed_days,
        days_left: progress.days_left,
        employees,
        equipment,
        tasks,
        job,
    }))
}

#[derive(Debug, Serialize)]
struct JobProgressBody {
    job_id: Uuid,
    start_millis: Option<i64>,
    end_millis: Option<i64>,
    now_millis: i64,
    #[serde(flatten)]
    progress: ProgressResult,
}

async fn job_progress_api_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<Uuid>,
) -> Response {
    match state.list::<Job>().await {
        Ok(jobs) => match jobs.into_iter().find(|j| j.id == id) {
            Some(job) => {
                let now = state.clock.now();
                let span = job.time_span();
                Json(JobProgressBody {
                    job_id: job.id,
                    start_millis: span.start_millis,
                    end_millis: span.end_millis,
                    now_millis: now.timestamp_millis(),
                    progress: span.progress_at(now.timestamp_millis()),
                })
                .into_response()
            }
            None => json_error(StatusCode::NOT_FOUND, format!("job {id} not found")),
        },
        Err(err) => json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

#[derive(Debug, Deserialize, Default)]
struct SearchApiQuery {
    #[serde(default)]
    q: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

#[derive(Debug, Serialize)]
struct SearchApiBody {
    collection: Collection,
    query: String,
    category: String,
    total: usize,
    results: Vec<SearchApiMatch>,
}

#[derive(Debug, Serialize)]
struct SearchApiMatch {
    document: serde_json::Value,
    highlights: BTreeMap<String, String>,
}

async fn search_api_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(collection): AxumPath<String>,
    Query(query): Query<SearchApiQuery>,
) -> Response {
    let collection = match collection.parse::<Collection>() {
        Ok(c) => c,
        Err(err) => return json_error(StatusCode::NOT_FOUND, err.to_string()),
    };
    let result = match collection {
        Collection::Customers => search_collection::<Customer>(&state, &query).await,
        Collection::Employees => search_collection::<Employee>(&state, &query).await,
        Collection::Equipment => search_collection::<Equipment>(&state, &query).await,
        Collection::Jobs => search_collection::<Job>(&state, &query).await,
        Collection::Tasks => search_collection::<Task>(&state, &query).await,
    };
    match result {
        Ok(body) => Json(body).into_response(),
        Err(err) => json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

async fn search_collection<T: Document + Searchable>(
    state: &AppState,
    query: &SearchApiQuery,
) -> anyhow::Result<SearchApiBody> {
    let items = state.list::<T>().await?;
    let text = query.q.clone().unwrap_or_default();
    let category = query
        .category
        .clone()
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| fieldops_core::ALL_CATEGORIES.to_string());

    let matches = filter_entities(&items, &text, category.as_str(), T::COLLECTION.search_fields());
    let results = matches
        .iter()
        .map(|m| -> anyhow::Result<SearchApiMatch> {
            Ok(SearchApiMatch {
                document: serde_json::to_value(m.entity)?,
                highlights: m
                    .highlighted_fields
                    .iter()
                    .map(|(field, text)| (field.clone(), text.to_markup()))
                    .collect(),
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(SearchApiBody {
        collection: T::COLLECTION,
        query: text,
        category,
        total: items.len(),
        results,
    })
}

async fn health_handler() -> Response {
    Json(serde_json::json!({ "status": "ok", "service": CRATE_NAME })).into_response()
}

async fn app_css_handler(State(state): State<Arc<AppState>>) -> Response {
    let css_path = state.workspace_root.join("assets/static/app.css");
    match tokio::fs::read_to_string(&css_path).await {
        Ok(css) => ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], css).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, Html("/* missing app.css */".to_string())).into_response(),
    }
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err.to_string())),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    warn!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Server error: {}", err)),
    )
        .into_response()
}

fn json_error(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
