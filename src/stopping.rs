//! Stop criteria for token generation
//!
//! The host generation loop calls a [`StoppingCriteria`] once per decoding
//! step with the current token sequences for every sample in the batch, and
//! halts as soon as one of them returns `true`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token identifier as produced by the tokenizer.
pub type TokenId = i32;

/// Errors raised when configuring a stop criterion
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CriteriaError {
    #[error("Stop sequence must contain at least one token")]
    EmptyStopSequence,
}

/// Per-step halt decision for the host generation loop.
///
/// `sequences` holds the full token sequence so far for every sample in the
/// batch; `scores` holds the current step scores, which most criteria ignore.
pub trait StoppingCriteria {
    fn should_stop(&mut self, sequences: &[Vec<TokenId>], scores: &[f32]) -> bool;
}

/// Stops generation once a watched token subsequence appears in the newly
/// generated portion of any sample.
///
/// Tokens before `start_offset` belong to the prompt and are never matched
/// against. The watched sequence is fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawStopOnTokens")]
pub struct StopOnTokens {
    watched: Vec<TokenId>,
    start_offset: usize,
}

/// Unvalidated mirror of [`StopOnTokens`]; deserialization funnels through
/// [`StopOnTokens::new`] so a persisted empty pattern is rejected instead of
/// producing a detector that panics at match time.
#[derive(Deserialize)]
struct RawStopOnTokens {
    watched: Vec<TokenId>,
    start_offset: usize,
}

impl TryFrom<RawStopOnTokens> for StopOnTokens {
    type Error = CriteriaError;

    fn try_from(raw: RawStopOnTokens) -> Result<Self, Self::Error> {
        StopOnTokens::new(raw.watched, raw.start_offset)
    }
}

impl StopOnTokens {
    /// Creates a detector for `watched` starting the scan at `start_offset`.
    ///
    /// # Errors
    /// Returns `CriteriaError::EmptyStopSequence` if `watched` is empty.
    pub fn new(watched: Vec<TokenId>, start_offset: usize) -> Result<Self, CriteriaError> {
        if watched.is_empty() {
            return Err(CriteriaError::EmptyStopSequence);
        }
        Ok(Self {
            watched,
            start_offset,
        })
    }

    /// The watched token sequence.
    pub fn watched(&self) -> &[TokenId] {
        &self.watched
    }

    /// Index where the generated (non-prompt) tokens begin.
    pub fn start_offset(&self) -> usize {
        self.start_offset
    }
}

impl StoppingCriteria for StopOnTokens {
    fn should_stop(&mut self, sequences: &[Vec<TokenId>], _scores: &[f32]) -> bool {
        for sample in sequences {
            // A sequence still shorter than the offset has produced nothing
            // to scan yet.
            let generated = sample.get(self.start_offset..).unwrap_or(&[]);
            if generated.len() < self.watched.len() {
                continue;
            }

            if generated
                .windows(self.watched.len())
                .any(|window| window == self.watched.as_slice())
            {
                tracing::debug!(
                    "Stop sequence matched after {} generated tokens",
                    generated.len()
                );
                return true;
            }
        }
        false
    }
}

/// Forwards the current batch to an injected callback on every decoding step.
///
/// Purely an observation hook: it never requests a halt. A panic inside the
/// callback unwinds to the host loop untouched.
pub struct StepCallbackRelay {
    callback: Option<Box<dyn FnMut(&[Vec<TokenId>]) + Send>>,
}

impl StepCallbackRelay {
    /// Creates a relay; `None` makes every step a no-op.
    pub fn new(callback: Option<Box<dyn FnMut(&[Vec<TokenId>]) + Send>>) -> Self {
        Self { callback }
    }
}

impl StoppingCriteria for StepCallbackRelay {
    fn should_stop(&mut self, sequences: &[Vec<TokenId>], _scores: &[f32]) -> bool {
        if let Some(callback) = self.callback.as_mut() {
            callback(sequences);
        }
        false
    }
}

/// Combines several criteria; stops when any member stops.
///
/// Typical setup installs a [`StopOnTokens`] next to a [`StepCallbackRelay`]
/// so the host loop publishes intermediate state and halts on the stop
/// sequence with a single check per step.
#[derive(Default)]
pub struct StoppingCriteriaList {
    criteria: Vec<Box<dyn StoppingCriteria + Send>>,
}

impl StoppingCriteriaList {
    pub fn new(criteria: Vec<Box<dyn StoppingCriteria + Send>>) -> Self {
        Self { criteria }
    }

    pub fn push(&mut self, criterion: Box<dyn StoppingCriteria + Send>) {
        self.criteria.push(criterion);
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }
}

impl StoppingCriteria for StoppingCriteriaList {
    fn should_stop(&mut self, sequences: &[Vec<TokenId>], scores: &[f32]) -> bool {
        self.criteria
            .iter_mut()
            .any(|criterion| criterion.should_stop(sequences, scores))
    }
}
