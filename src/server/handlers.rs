//! Request handlers

use axum::extract::{Query, State};
use axum::{Form, Json};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::documents;
use crate::inference::{InferenceError, Prompt};
use crate::prompts::parameters::{estimate_memory, suggest_parameters, GenerationParameters, MemoryEstimate, TaskType};
use crate::prompts::suggestions::suggest_prompts;
use crate::prompts::{enhance_prompt_with_research, format_for_model, prepend_document_context, research_context};
use crate::research::DEFAULT_MAX_RESULTS;
use crate::server::{ApiError, AppState};
use crate::storage::discovery::discover_model_names;
use crate::types::config::SamplingParams;
use crate::types::message::Message;
use crate::types::model::{ModelFamily, ModelProfile};

/// Parsed chat arguments
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub message: String,
    pub model: Option<String>,
    pub sampling: SamplingParams,
    pub deep_research: bool,
    pub files: Vec<String>,
    pub images: Vec<String>,
}

impl ChatRequest {
    /// Build a request from raw string arguments. Missing values take the
    /// defaults; malformed ones are rejected.
    pub fn from_args(args: &HashMap<String, String>, defaults: SamplingParams) -> Result<Self, ApiError> {
        let message = args.get("message").cloned().unwrap_or_default();
        if message.trim().is_empty() {
            return Err(ApiError::BadRequest("Message is required".to_string()));
        }

        let sampling = SamplingParams {
            temperature: parse_arg(args, "temperature", defaults.temperature)?,
            top_p: parse_arg(args, "top_p", defaults.top_p)?,
            max_tokens: parse_arg(args, "max_tokens", defaults.max_tokens)?,
        }
        .validated();

        Ok(Self {
            message,
            model: args
                .get("model")
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty()),
            sampling,
            deep_research: parse_flag(args, "deep_research")?,
            files: args.get("files").map(|f| documents::split_paths(f)).unwrap_or_default(),
            images: args.get("images").map(|i| documents::split_paths(i)).unwrap_or_default(),
        })
    }
}

fn parse_arg<T: FromStr>(args: &HashMap<String, String>, key: &str, default: T) -> Result<T, ApiError> {
    match args.get(key).map(|v| v.trim()) {
        None | Some("") => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("Invalid value for {}: {}", key, raw))),
    }
}

fn parse_flag(args: &HashMap<String, String>, key: &str) -> Result<bool, ApiError> {
    match args.get(key).map(|v| v.trim().to_lowercase()).as_deref() {
        None | Some("") | Some("false") | Some("0") => Ok(false),
        Some("true") | Some("1") => Ok(true),
        Some(raw) => Err(ApiError::BadRequest(format!("Invalid value for {}: {}", key, raw))),
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub model: String,
    pub research_used: bool,
}

/// `POST {base}/aichat/chat`
///
/// Arguments come from the query string and a form body; the body wins.
/// A model that cannot be loaded is a 500. Once it is resident, generation
/// failures are returned as an apology in a 200 reply.
pub async fn chat(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    form: Option<Form<HashMap<String, String>>>,
) -> Result<Json<ChatResponse>, ApiError> {
    let mut args = query;
    if let Some(Form(body)) = form {
        args.extend(body);
    }

    let request = ChatRequest::from_args(&args, state.config.default_sampling)?;

    let model = match request.model.clone() {
        Some(model) => model,
        None => discover_model_names(&state.config.models_dir, &state.config.fallback_models)
            .await
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Internal("No models available".to_string()))?,
    };
    let profile = ModelProfile::resolve(&model);
    tracing::debug!("Chat request for {} ({:?})", model, profile.family);

    let mut prompt = request.message.clone();
    let mut research = None;

    if request.deep_research {
        let results = state.search.search(&request.message, DEFAULT_MAX_RESULTS).await;
        if !results.is_empty() {
            prompt = enhance_prompt_with_research(&prompt, &results);
            research = Some(research_context(&results));
        }
    }
    let research_used = research.is_some();

    if !request.files.is_empty() {
        let files = request.files.clone();
        let root = state.config.documents_root.clone();
        let context = tokio::task::spawn_blocking(move || documents::build_context(&files, &root)).await?;
        prompt = prepend_document_context(&prompt, &context);
    }

    let prompt = Prompt {
        text: format_for_model(&profile, &[Message::user(prompt)], &request.images),
        message: request.message.clone(),
        research,
    };

    state.inference.load(&model).await?;

    let response = match state.inference.generate(&model, &prompt, request.sampling).await {
        Ok(text) => text,
        Err(InferenceError::Generation(msg)) => {
            tracing::error!("Generation failed for {}: {}", model, msg);
            format!("Sorry, I encountered an error: {}", msg)
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Json(ChatResponse {
        response,
        model,
        research_used,
    }))
}

/// `GET {base}/aichat/models`
pub async fn list_models(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(discover_model_names(&state.config.models_dir, &state.config.fallback_models).await)
}

#[derive(Debug, Deserialize)]
pub struct ProfileQuery {
    pub model: Option<String>,
    pub task: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelProfileResponse {
    pub model: String,
    pub family: ModelFamily,
    pub parameters: GenerationParameters,
    pub memory: MemoryEstimate,
}

/// `GET {base}/aichat/models/profile?model=&task=`
pub async fn model_profile(Query(query): Query<ProfileQuery>) -> Result<Json<ModelProfileResponse>, ApiError> {
    let model = query
        .model
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Model is required".to_string()))?;

    let task = query.task.as_deref().map(TaskType::parse).unwrap_or(TaskType::Chat);
    let profile = ModelProfile::resolve(model);

    Ok(Json(ModelProfileResponse {
        parameters: suggest_parameters(&profile, task),
        memory: estimate_memory(profile.size),
        family: profile.family,
        model: profile.name,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SuggestionsQuery {
    pub last_message: Option<String>,
}

/// `GET {base}/aichat/suggestions?last_message=`
pub async fn suggestions(Query(query): Query<SuggestionsQuery>) -> Json<Vec<String>> {
    let last = query.last_message.as_deref().filter(|m| !m.trim().is_empty());
    Json(suggest_prompts(last))
}
