//! HTTP surface: the single HTML page plus a small JSON API.

pub mod page;

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use nl2sql_driver::ModelLoader;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::warn;
use uuid::Uuid;

use crate::catalog;
use crate::controller::{Controller, Rendered};
use crate::format::SqlCheck;
use crate::session::SessionStore;

pub use page::{Pages, TITLE};

const SESSION_COOKIE: &str = "nl2sql_session";

/// Shared by every request handler.
pub struct AppState {
    pub controller: Arc<Controller>,
    pub sessions: SessionStore,
    pub pages: Pages,
    pub model: String,
    pub device: String,
    pub loader: Option<Arc<ModelLoader>>,
}

impl AppState {
    pub fn new(controller: Controller, sessions: SessionStore) -> eyre::Result<Self> {
        Ok(Self {
            controller: Arc::new(controller),
            sessions,
            pages: Pages::new()?,
            model: String::new(),
            device: String::new(),
            loader: None,
        })
    }

    /// Report this model in `/health`, and whether `loader` has loaded it.
    pub fn with_model(
        mut self,
        model: impl Into<String>,
        device: impl Into<String>,
        loader: Arc<ModelLoader>,
    ) -> Self {
        self.model = model.into();
        self.device = device.into();
        self.loader = Some(loader);
        self
    }
}

/// Error crossing the HTTP boundary; rendered as a 500 with a JSON body.
pub struct AppError(eyre::Report);

impl<E: Into<eyre::Report>> From<E> for AppError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        warn!(error = %format!("{:#}", self.0), "request failed");

        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("{:#}", self.0),
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Body of both generate actions, as a form post or as JSON.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub question: String,
    pub generated_text: String,
    pub sql: String,
    pub check: SqlCheck,
    pub elapsed_ms: u64,
}

impl From<Rendered> for GenerateResponse {
    fn from(r: Rendered) -> Self {
        Self {
            elapsed_ms: r.elapsed.as_millis() as u64,
            check: r.check,
            question: r.question,
            generated_text: r.generated_text,
            sql: r.sql,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model: String,
    pub device: String,
    pub loaded: bool,
}

#[derive(Debug, Serialize)]
pub struct QuestionsResponse {
    pub questions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct QuestionResponse {
    pub question: String,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/random", post(insert_random))
        .route("/generate", post(generate_page))
        .route("/health", get(health_check))
        .route("/api/questions", get(list_questions))
        .route("/api/questions/random", get(random_question))
        .route("/api/generate", post(generate_api))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Find or start the browser's session, setting the cookie when new.
fn session(state: &AppState, jar: CookieJar) -> (CookieJar, Uuid) {
    let known = jar
        .get(SESSION_COOKIE)
        .and_then(|c| Uuid::parse_str(c.value()).ok());

    let (id, created) = state.sessions.resolve(known);

    if created {
        let cookie = Cookie::build((SESSION_COOKIE, id.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax);

        (jar.add(cookie), id)
    } else {
        (jar, id)
    }
}

/// Run the blocking generate action off the async executor.
async fn run_generate(state: &AppState, question: String) -> eyre::Result<Rendered> {
    let controller = state.controller.clone();

    tokio::task::spawn_blocking(move || controller.generate_sql(&question)).await?
}

async fn index(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Html<String>), AppError> {
    let (jar, id) = session(&state, jar);
    let html = state.pages.index(&state.sessions.snapshot(id), None, None)?;

    Ok((jar, Html(html)))
}

async fn insert_random(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Redirect) {
    let (jar, id) = session(&state, jar);

    state.sessions.with(id, |s| {
        state
            .controller
            .insert_random_question(s, &mut rand::rng())
    });

    (jar, Redirect::to("/"))
}

async fn generate_page(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<GenerateRequest>,
) -> Result<(CookieJar, Html<String>), AppError> {
    let (jar, id) = session(&state, jar);

    let question = state.sessions.with(id, |s| {
        if s.question() != form.question {
            s.edit(form.question);
        }
        s.question().to_string()
    });

    let result = run_generate(&state, question).await;
    let snapshot = state.sessions.snapshot(id);

    let html = match &result {
        Ok(rendered) => state.pages.index(&snapshot, Some(rendered), None)?,
        Err(e) => {
            warn!(error = %format!("{e:#}"), "generate failed");
            state
                .pages
                .index(&snapshot, None, Some(&format!("{e:#}")))?
        }
    };

    Ok((jar, Html(html)))
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.model.clone(),
        device: state.device.clone(),
        loaded: state.loader.as_ref().map_or(true, |l| l.is_loaded()),
    })
}

async fn list_questions() -> Json<QuestionsResponse> {
    Json(QuestionsResponse {
        questions: catalog::all().iter().map(|q| q.to_string()).collect(),
    })
}

async fn random_question() -> Json<QuestionResponse> {
    Json(QuestionResponse {
        question: catalog::pick(&mut rand::rng()).to_string(),
    })
}

async fn generate_api(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, AppError> {
    let rendered = run_generate(&state, request.question).await?;

    Ok(Json(rendered.into()))
}
