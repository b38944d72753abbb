use crate::api::{self, Listing, SentencePayload, WordPayload};
use crate::error::DictionaryError;
use crate::search::{Dictionary, SearchMode, SearchRequest};
use crate::semantic::EmbeddingModel;
use crate::store::DirectorySource;
use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info};

type SharedState = Arc<AppState>;

pub struct AppState {
    pub dictionary: Dictionary,
}

#[derive(Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    /// Site root holding `data/words.json` and friends.
    pub data_dir: PathBuf,
    pub model: Option<Arc<dyn EmbeddingModel>>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8788)),
            data_dir: PathBuf::from("public"),
            model: None,
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    Io(std::io::Error),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for WebError {}

impl From<std::io::Error> for WebError {
    fn from(value: std::io::Error) -> Self {
        WebError::Io(value)
    }
}

pub async fn serve(config: WebConfig) -> Result<(), WebError> {
    let mut dictionary = Dictionary::new(Arc::new(DirectorySource::new(&config.data_dir)));
    if let Some(model) = config.model.clone() {
        dictionary = dictionary.with_model(model);
    }
    let router = build_router(Arc::new(AppState { dictionary }));
    info!(
        addr = %config.addr,
        data_dir = %config.data_dir.display(),
        semantic = config.model.is_some(),
        "Binding HTTP listener"
    );
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<DictionaryError> for ApiError {
    fn from(err: DictionaryError) -> Self {
        match err {
            DictionaryError::InvalidQuery(message) => ApiError::bad_request(message),
            other => {
                error!(error = %other, "request failed");
                ApiError::internal("Failed to load dictionary data")
            }
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request(format!("Invalid query parameters: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.message });
        (self.status, Json(payload)).into_response()
    }
}

fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/search", get(api_search_english))
        .route("/api/search-paiute", get(api_search_paiute))
        .route("/api/search-sentences", get(api_search_sentences))
        .route("/api/search-smart", get(api_search_smart))
        .route("/api/search-semantic", get(api_search_semantic))
        .route("/api/search-hybrid", get(api_search_hybrid))
        .route("/api/browse", get(api_browse))
        .route("/api/word/:id", get(api_word))
        .route("/api/random-word", get(api_random_word))
        .route("/api/random-sentence", get(api_random_sentence))
        .route("/api/word-of-the-day", get(api_word_of_the_day))
        .route("/healthz", get(health))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "kubishi-web",
        "loaded": state.dictionary.store().is_loaded(),
    }))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
    limit: Option<usize>,
    skip: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct BrowseParams {
    letter: Option<String>,
    counts: Option<String>,
    limit: Option<usize>,
    skip: Option<usize>,
}

fn parse_search_params(params: &SearchParams, mode: SearchMode) -> Result<SearchRequest, ApiError> {
    let query = params
        .q
        .as_ref()
        .map(|q| q.trim())
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::bad_request("Query parameter `q` is required"))?;
    Ok(SearchRequest {
        limit: params.limit,
        skip: params.skip,
        ..SearchRequest::new(query, mode)
    })
}

/// Query string of the search routes; malformed numbers become an `ApiError`.
type SearchQuery = Result<Query<SearchParams>, QueryRejection>;

async fn run_search(
    state: &AppState,
    params: SearchQuery,
    mode: SearchMode,
) -> Result<Json<Listing<api::Scored<api::RecordPayload>>>, ApiError> {
    let Query(params) = params?;
    let request = parse_search_params(&params, mode)?;
    let outcome = state.dictionary.search(&request).await?;
    let corpus = state.dictionary.corpus().await?;
    let mut listing = Listing::new(api::hydrate(&corpus, &outcome.hits), outcome.page);
    listing.degraded = outcome.degraded;
    Ok(Json(listing))
}

async fn api_search_english(
    State(state): State<SharedState>,
    params: SearchQuery,
) -> impl IntoResponse {
    run_search(&state, params, SearchMode::English).await
}

async fn api_search_paiute(
    State(state): State<SharedState>,
    params: SearchQuery,
) -> impl IntoResponse {
    run_search(&state, params, SearchMode::Paiute).await
}

async fn api_search_sentences(
    State(state): State<SharedState>,
    params: SearchQuery,
) -> impl IntoResponse {
    run_search(&state, params, SearchMode::Sentences).await
}

async fn api_search_smart(
    State(state): State<SharedState>,
    params: SearchQuery,
) -> impl IntoResponse {
    run_search(&state, params, SearchMode::Smart).await
}

async fn api_search_semantic(
    State(state): State<SharedState>,
    params: SearchQuery,
) -> impl IntoResponse {
    run_search(&state, params, SearchMode::Semantic).await
}

async fn api_search_hybrid(
    State(state): State<SharedState>,
    params: SearchQuery,
) -> impl IntoResponse {
    run_search(&state, params, SearchMode::Hybrid).await
}

async fn api_browse(
    State(state): State<SharedState>,
    params: Result<Query<BrowseParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params?;
    let corpus = state.dictionary.corpus().await?;
    if params.counts.as_deref() == Some("true") {
        return Ok(Json(json!({ "letterCounts": corpus.letter_counts() })).into_response());
    }
    let page = state
        .dictionary
        .config()
        .browse_page(params.limit, params.skip);
    let letter = params.letter.as_deref().filter(|letter| !letter.is_empty());
    let results: Vec<WordPayload> = corpus
        .browse(letter, page)
        .into_iter()
        .map(WordPayload::from)
        .collect();
    Ok(Json(json!({
        "results": results,
        "pagination": { "letter": letter, "limit": page.limit, "skip": page.skip },
    }))
    .into_response())
}

async fn api_word(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if id.trim().is_empty() {
        return Err(ApiError::bad_request("Word ID is required"));
    }
    let corpus = state.dictionary.corpus().await?;
    let word = corpus
        .word_by_param(&id)
        .ok_or_else(|| ApiError::not_found("Word not found"))?;
    let sentences: Vec<SentencePayload> = corpus
        .sentences_for_word(&word.id)
        .into_iter()
        .map(SentencePayload::from)
        .collect();
    Ok(Json(json!({
        "word": WordPayload::from(word),
        "sentences": sentences,
        "audio": null,
    })))
}

async fn api_random_word(
    State(state): State<SharedState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let corpus = state.dictionary.corpus().await?;
    let word = corpus
        .random_word(&mut rand::thread_rng())
        .ok_or_else(|| ApiError::not_found("No words found"))?;
    Ok(Json(json!({ "word": WordPayload::from(word), "audio": null })))
}

async fn api_random_sentence(
    State(state): State<SharedState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let corpus = state.dictionary.corpus().await?;
    let sentence = corpus
        .random_sentence(&mut rand::thread_rng())
        .ok_or_else(|| ApiError::not_found("No sentences found"))?;
    Ok(Json(json!({ "sentence": SentencePayload::from(sentence) })))
}

async fn api_word_of_the_day(
    State(state): State<SharedState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let corpus = state.dictionary.corpus().await?;
    let today = chrono::Local::now().date_naive();
    let word = corpus
        .word_of_the_day(today)
        .ok_or_else(|| ApiError::not_found("No words found"))?;
    Ok(Json(json!({
        "word": WordPayload::from(word),
        "date": today.to_string(),
        "audio": null,
    })))
}
