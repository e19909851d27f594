//! Workflow stages and shared status.
//!
//! [`ProfileStage`] and [`CloneStage`] track the two workflows' state
//! machines.  A front end reads them through [`SharedState`] to show
//! progress; the orchestrator is the only writer.
//!
//! [`SharedState`] is a type alias for `Arc<Mutex<AppState>>`, cheap to
//! clone and safe to share across threads.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::AppConfig;

// ---------------------------------------------------------------------------
// ProfileStage
// ---------------------------------------------------------------------------

/// States of the profile-creation workflow.
///
/// ```text
/// Idle ──create──▶ Capturing ──▶ Conditioning ──▶ Training ──▶ Published
///      ──upload───────────────▶ Conditioning
/// any state ──error──▶ Failed
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProfileStage {
    #[default]
    Idle,
    Capturing,
    Conditioning,
    Training,
    Published,
    Failed,
}

impl ProfileStage {
    /// Returns `true` while the workflow is running.
    ///
    /// ```
    /// use voice_clone::pipeline::ProfileStage;
    ///
    /// assert!(!ProfileStage::Idle.is_busy());
    /// assert!(ProfileStage::Capturing.is_busy());
    /// assert!(ProfileStage::Training.is_busy());
    /// assert!(!ProfileStage::Published.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            ProfileStage::Capturing | ProfileStage::Conditioning | ProfileStage::Training
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProfileStage::Idle => "Idle",
            ProfileStage::Capturing => "Recording",
            ProfileStage::Conditioning => "Conditioning",
            ProfileStage::Training => "Training",
            ProfileStage::Published => "Published",
            ProfileStage::Failed => "Failed",
        }
    }
}

// ---------------------------------------------------------------------------
// CloneStage
// ---------------------------------------------------------------------------

/// States of the cloning workflow.
///
/// ```text
/// Idle ──▶ Segmenting ──▶ Synthesizing { done, total } ──▶ Merging ──▶ Done
/// any state ──error──▶ Failed
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CloneStage {
    #[default]
    Idle,
    Segmenting,
    Synthesizing { done: usize, total: usize },
    Merging,
    Done,
    Failed,
}

impl CloneStage {
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            CloneStage::Segmenting | CloneStage::Synthesizing { .. } | CloneStage::Merging
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            CloneStage::Idle => "Idle",
            CloneStage::Segmenting => "Segmenting",
            CloneStage::Synthesizing { .. } => "Synthesizing",
            CloneStage::Merging => "Merging",
            CloneStage::Done => "Done",
            CloneStage::Failed => "Failed",
        }
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Status snapshot shared with whatever front end drives the pipeline.
#[derive(Debug, Clone)]
pub struct AppState {
    pub profile: ProfileStage,
    pub clone: CloneStage,

    /// Message of the most recent failure in either workflow.
    pub error_message: Option<String>,

    pub config: AppConfig,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            profile: ProfileStage::Idle,
            clone: CloneStage::Idle,
            error_message: None,
            config,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// SharedState
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`AppState`].  Do not hold the lock across
/// `.await` points.
pub type SharedState = Arc<Mutex<AppState>>;

pub fn new_shared_state(config: AppConfig) -> SharedState {
    Arc::new(Mutex::new(AppState::new(config)))
}

/// Lock `state`, recovering the data if a previous holder panicked.
pub fn lock_state(state: &SharedState) -> MutexGuard<'_, AppState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_stage_busy_flags() {
        assert!(!ProfileStage::Idle.is_busy());
        assert!(ProfileStage::Conditioning.is_busy());
        assert!(!ProfileStage::Failed.is_busy());
    }

    #[test]
    fn clone_stage_busy_flags() {
        assert!(CloneStage::Synthesizing { done: 1, total: 3 }.is_busy());
        assert!(CloneStage::Merging.is_busy());
        assert!(!CloneStage::Done.is_busy());
        assert!(!CloneStage::Failed.is_busy());
    }

    #[test]
    fn labels() {
        assert_eq!(ProfileStage::Capturing.label(), "Recording");
        assert_eq!(ProfileStage::Published.label(), "Published");
        assert_eq!(CloneStage::Synthesizing { done: 0, total: 1 }.label(), "Synthesizing");
    }

    #[test]
    fn defaults_are_idle() {
        let state = AppState::default();
        assert_eq!(state.profile, ProfileStage::Idle);
        assert_eq!(state.clone, CloneStage::Idle);
        assert!(state.error_message.is_none());
    }

    #[test]
    fn shared_state_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SharedState>();
    }

    #[test]
    fn shared_state_can_be_cloned_and_mutated() {
        let state = new_shared_state(AppConfig::default());
        let state2 = Arc::clone(&state);

        lock_state(&state).clone = CloneStage::Merging;
        assert_eq!(lock_state(&state2).clone, CloneStage::Merging);
    }
}
