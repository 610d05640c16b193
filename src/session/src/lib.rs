// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (C) 2025 Jonathan D.A. Jewell

//! Session Core - Application state and the chat turn pipeline
//!
//! This crate owns everything a single user session mutates:
//! - **Conversation log**: append-only messages, cleared only on request
//! - **Roster**: built-in sample players plus user-added players
//! - **Feedback**: rated comments left by the user
//! - **Preferences**: model, temperature and system prompt
//!
//! All mutation goes through the entry points on [`AppState`]. A chat turn
//! runs classifier, prompt assembly, provider call and recommendation filter
//! in that order and never fails because of the provider.

use chrono::{DateTime, Utc};
use model_gateway::{build_prompt, describe_error, GenerationRequest, ModelProvider};
use player_analytics::{PlayerDraft, PlayerRecord, Roster, RosterError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use topic_guard::{FilterOutcome, GuardError, RecommendationFilter, TopicPolicy};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub mod export;
pub mod settings;

pub use model_gateway::Role;
pub use settings::Settings;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Session file schema identifier
pub const SESSION_SCHEMA: &str = "basketball-iq-session-v1";

pub const FEEDBACK_THANKS: &str =
    "Thank you for your feedback! We'll use it to improve BasketballIQ.";

pub const PROGRESS_MESSAGE: &str = "BasketballIQ is analyzing your question...";

/// Starter questions offered while the log is empty
pub const SUGGESTED_QUESTIONS: &[&str] = &[
    "What advanced metrics best measure defensive impact?",
    "How can AI help optimize shot selection?",
    "Compare player tracking technologies in basketball",
    "Explain the four factors of basketball success",
    "What's the relationship between pace and efficiency?",
    "How do teams use data for in-game adjustments?",
];

pub const ANALYTICS_TOPICS: &[&str] = &[
    "Advanced offensive efficiency metrics",
    "Defensive impact analysis",
    "Shot selection optimization",
    "Player load management strategies",
    "In-game tactical adjustments",
    "Opponent scouting analysis",
    "Player development tracking",
    "Team chemistry quantification",
];

/// Chat query for the analytics topic at `index`
pub fn topic_query(index: usize) -> Option<String> {
    ANALYTICS_TOPICS
        .get(index)
        .map(|topic| format!("Explain {} in basketball and its importance", topic))
}

// ============================================================================
// MESSAGES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Append-only conversation log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationLog {
    messages: Vec<Message>,
}

impl ConversationLog {
    pub(crate) fn push(&mut self, message: Message) -> Uuid {
        let id = message.id;
        self.messages.push(message);
        id
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn clear(&mut self) -> usize {
        let removed = self.messages.len();
        self.messages.clear();
        removed
    }
}

// ============================================================================
// FEEDBACK
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feedback {
    pub id: Uuid,
    pub text: String,
    /// 1 to 5
    pub rating: u8,
    pub submitted_at: DateTime<Utc>,
}

// ============================================================================
// PREFERENCES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Preferences {
    pub model: String,
    pub temperature: f32,
    pub system_prompt: String,
}

impl From<&Settings> for Preferences {
    fn from(settings: &Settings) -> Self {
        Self {
            model: settings.model.clone(),
            temperature: settings.temperature,
            system_prompt: settings.system_prompt.clone(),
        }
    }
}

// ============================================================================
// TURN RECORD - One entry per chat turn, for logging and callers
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn_id: Uuid,
    pub user_message_id: Uuid,
    pub assistant_message_id: Uuid,
    pub model: String,
    /// The user's input matched no topic keyword
    pub off_topic: bool,
    pub matched_keyword: Option<String>,
    /// `None` when the provider failed
    pub filter_outcome: Option<FilterOutcome>,
    pub provider_error: Option<String>,
    pub duration_ms: u64,
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Message is empty")]
    EmptyMessage,

    #[error("Rating must be between 1 and 5 (got {0})")]
    InvalidRating(u8),

    #[error("Temperature must be between 0.0 and 1.0 (got {0})")]
    InvalidTemperature(f32),

    #[error("System prompt must not be empty")]
    EmptySystemPrompt,

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Incompatible session schema: {0}")]
    IncompatibleSchema(String),

    #[error(transparent)]
    Roster(#[from] RosterError),

    #[error("Topic policy error: {0}")]
    Guard(#[from] GuardError),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

// ============================================================================
// CHAT PIPELINE
// ============================================================================

/// Model provider plus the filter applied to its output.
pub struct ChatPipeline {
    provider: Box<dyn ModelProvider>,
    filter: RecommendationFilter,
}

impl ChatPipeline {
    pub fn new(
        provider: Box<dyn ModelProvider>,
        policy: &TopicPolicy,
    ) -> Result<Self, SessionError> {
        Ok(Self {
            provider,
            filter: RecommendationFilter::from_policy(policy)?,
        })
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }
}

// ============================================================================
// APPLICATION STATE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppState {
    schema: String,
    pub preferences: Preferences,
    log: ConversationLog,
    roster: Roster,
    feedback: Vec<Feedback>,
}

impl AppState {
    pub fn new(settings: &Settings) -> Self {
        Self {
            schema: SESSION_SCHEMA.to_string(),
            preferences: Preferences::from(settings),
            log: ConversationLog::default(),
            roster: Roster::new(),
            feedback: Vec::new(),
        }
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn feedback(&self) -> &[Feedback] {
        &self.feedback
    }

    /// Run one chat turn and append both messages to the log.
    ///
    /// Provider failures become the assistant message; only an empty input
    /// is an error.
    pub async fn send_message(
        &mut self,
        pipeline: &ChatPipeline,
        input: &str,
    ) -> Result<TurnRecord, SessionError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let start = Instant::now();
        let matched_keyword = pipeline
            .filter
            .classifier()
            .matched_keyword(input)
            .map(str::to_string);
        let off_topic = matched_keyword.is_none();

        let prompt = build_prompt(
            &self.preferences.system_prompt,
            self.log.iter().map(|m| (m.role, m.content.as_str())),
            input,
            off_topic,
        );
        let user_message_id = self.log.push(Message::new(Role::User, input));

        let request = GenerationRequest {
            model: self.preferences.model.clone(),
            prompt,
            temperature: self.preferences.temperature,
        };
        debug!(provider = pipeline.provider_name(), off_topic, "generating reply");

        let (reply, filter_outcome, provider_error) =
            match pipeline.provider.generate(&request).await {
                Ok(raw) => {
                    let (text, outcome) = pipeline.filter.screen(raw);
                    (text, Some(outcome), None)
                }
                Err(e) => {
                    warn!(error = %e, "model call failed");
                    (describe_error(&e), None, Some(e.to_string()))
                }
            };
        let assistant_message_id = self.log.push(Message::new(Role::Assistant, reply));

        let record = TurnRecord {
            turn_id: Uuid::new_v4(),
            user_message_id,
            assistant_message_id,
            model: request.model,
            off_topic,
            matched_keyword,
            filter_outcome,
            provider_error,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            turn = %record.turn_id,
            off_topic = record.off_topic,
            redirected = record
                .filter_outcome
                .as_ref()
                .is_some_and(FilterOutcome::is_redirected),
            failed = record.provider_error.is_some(),
            duration_ms = record.duration_ms,
            "chat turn complete"
        );
        Ok(record)
    }

    /// Drop every message; returns how many were removed
    pub fn clear_history(&mut self) -> usize {
        let removed = self.log.clear();
        info!(removed, "conversation cleared");
        removed
    }

    pub fn add_player(&mut self, draft: PlayerDraft) -> Result<&PlayerRecord, SessionError> {
        Ok(self.roster.add(draft)?)
    }

    /// Remove a user-added player; false when there was nothing to remove
    pub fn remove_player(&mut self, name: &str) -> bool {
        self.roster.remove(name).is_some()
    }

    pub fn submit_feedback(&mut self, text: &str, rating: u8) -> Result<&Feedback, SessionError> {
        if !(1..=5).contains(&rating) {
            return Err(SessionError::InvalidRating(rating));
        }
        self.feedback.push(Feedback {
            id: Uuid::new_v4(),
            text: text.trim().to_string(),
            rating,
            submitted_at: Utc::now(),
        });
        info!(rating, "feedback received");
        let index = self.feedback.len() - 1;
        Ok(&self.feedback[index])
    }

    pub fn set_temperature(&mut self, temperature: f32) -> Result<(), SessionError> {
        if !(0.0..=1.0).contains(&temperature) {
            return Err(SessionError::InvalidTemperature(temperature));
        }
        self.preferences.temperature = temperature;
        Ok(())
    }

    pub fn set_system_prompt(&mut self, prompt: &str) -> Result<(), SessionError> {
        if prompt.trim().is_empty() {
            return Err(SessionError::EmptySystemPrompt);
        }
        self.preferences.system_prompt = prompt.to_string();
        Ok(())
    }

    // ---- persistence ----

    pub fn save(&self, path: &Path) -> Result<(), SessionError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        debug!(path = %path.display(), messages = self.log.len(), "session saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let state: AppState = serde_json::from_str(&fs::read_to_string(path)?)?;
        if state.schema != SESSION_SCHEMA {
            return Err(SessionError::IncompatibleSchema(state.schema));
        }
        Ok(state)
    }

    /// Load `path` if it exists, otherwise start fresh from `settings`
    pub fn load_or_new(path: &Path, settings: &Settings) -> Result<Self, SessionError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::new(settings))
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
