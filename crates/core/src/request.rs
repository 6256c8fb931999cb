//! Generation request domain type and prompt validation.
//!
//! A [`GenerationRequest`] is created by the queue controller once admission
//! checks pass, owned by the bounded queue until dequeued, then by the
//! worker until its outcome is recorded. It never outlives the process.

use crate::error::CoreError;
use crate::types::{RequestId, Timestamp};

/// Maximum prompt length in characters.
pub const MAX_PROMPT_LEN: usize = 500;

/// A single admitted generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Unique id assigned at admission.
    pub id: RequestId,
    /// Identity of the requesting participant.
    pub submitter_id: String,
    /// The content to generate. Non-empty, at most [`MAX_PROMPT_LEN`] chars.
    pub prompt_text: String,
    /// When the request was admitted (UTC).
    pub submitted_at: Timestamp,
}

impl GenerationRequest {
    /// Create a request with a fresh random id.
    pub fn new(
        submitter_id: impl Into<String>,
        prompt_text: impl Into<String>,
        submitted_at: Timestamp,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            submitter_id: submitter_id.into(),
            prompt_text: prompt_text.into(),
            submitted_at,
        }
    }
}

/// Validate a prompt before admission.
///
/// Rules:
/// - Must not be empty (after trimming surrounding whitespace).
/// - Must not exceed [`MAX_PROMPT_LEN`] characters.
pub fn validate_prompt(prompt: &str) -> Result<(), CoreError> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation(
            "Prompt must not be empty".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_PROMPT_LEN {
        return Err(CoreError::Validation(format!(
            "Prompt must not exceed {MAX_PROMPT_LEN} characters"
        )));
    }
    Ok(())
}
