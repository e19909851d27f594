//! Pipeline orchestrator: sample capture → conditioning → training →
//! publish, and text → chunks → parallel synthesis → merge.
//!
//! [`PipelineOrchestrator`] owns the [`SharedState`], the profile registry
//! and the artifact store, and is the only component that writes to them.
//!
//! # Profile creation
//!
//! ```text
//! create_profile                        upload_profile(_segments)
//!   └─▶ open device, capture            │
//!       (timer cancels at the bound)     │
//!         [Capturing]                    │
//!   └────────────────────────────────────┴─▶ spawn_blocking(condition)
//!                                              [Conditioning]
//!                                          └─▶ spawn_blocking(train)
//!                                              [Training]
//!                                          └─▶ put model → put characteristics
//!                                              → write registry snapshot
//!                                              → register          [Published]
//! ```
//!
//! Any failure during publish deletes what was already written, so a
//! profile is either fully stored and listed or not present at all.
//!
//! # Cloning
//!
//! ```text
//! clone_voice
//!   └─▶ length check (TextTooLong), resolve profile + load model once
//!   └─▶ segment                                   [Segmenting]
//!   └─▶ JoinSet of spawn_blocking(synthesize)     [Synthesizing { done, total }]
//!       at most `synthesis.workers` at a time
//!   └─▶ order by chunk index, concatenate         [Merging]  → [Done]
//! ```
//!
//! All CPU-bound work runs on `tokio::task::spawn_blocking`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex as AsyncMutex, Semaphore};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::audio::{
    concatenate, AudioBuffer, AudioCapture, AudioDevice, CancelHandle, CaptureLevel,
    CaptureSession, SignalConditioner,
};
use crate::config::AppConfig;
use crate::error::{Result, VoiceError};
use crate::model::{TrainedModel, VoiceCharacteristics, VoiceModelTrainer};
use crate::storage::{self, ArtifactStore, REGISTRY_KEY};
use crate::synth::{ChunkSynthesizer, Emotion, LoadedVoice, Prosody, SpeechSynthesizer};
use crate::text::{language, segment};

use super::registry::{ProfileRegistry, VoiceProfile};
use super::state::{lock_state, new_shared_state, CloneStage, ProfileStage, SharedState};

// ---------------------------------------------------------------------------
// CloneRequest
// ---------------------------------------------------------------------------

/// Parameters of one cloning request.
#[derive(Debug, Clone, PartialEq)]
pub struct CloneRequest {
    pub text: String,
    pub profile_id: String,
    /// Language code, or `"auto"` to detect it from the text (falling back
    /// to the profile's language).
    pub language: String,
    /// Speaking-rate multiplier, between 0.25 and 4.0.
    pub speed: f32,
    /// Pitch multiplier, between 0.25 and 4.0.
    pub pitch: f32,
    /// Emotion tag; unknown tags are treated as neutral.
    pub emotion: String,
}

impl CloneRequest {
    /// Request with neutral prosody and automatic language detection.
    pub fn new(text: impl Into<String>, profile_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            profile_id: profile_id.into(),
            language: language::AUTO.to_string(),
            speed: 1.0,
            pitch: 1.0,
            emotion: Emotion::Neutral.to_string(),
        }
    }
}

enum RegistryChange {
    Insert(VoiceProfile),
    Remove(String),
}

// ---------------------------------------------------------------------------
// PipelineOrchestrator
// ---------------------------------------------------------------------------

/// Drives profile creation, cloning and profile management.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use voice_clone::audio::CpalDevice;
/// use voice_clone::config::AppConfig;
/// use voice_clone::pipeline::{CloneRequest, PipelineOrchestrator};
/// use voice_clone::storage::FileStore;
///
/// # async fn example() -> voice_clone::error::Result<()> {
/// let config = AppConfig::default();
/// let store = Arc::new(FileStore::new(config.storage.resolve_dir()));
/// let orchestrator = PipelineOrchestrator::new(config, store, Arc::new(CpalDevice::new()));
/// orchestrator.restore().await?;
///
/// let profile = orchestrator
///     .create_profile("Me", Duration::from_secs(10), "en")
///     .await?;
/// let speech = orchestrator
///     .clone_voice(CloneRequest::new("Hello there.", profile.id))
///     .await?;
/// # let _ = speech;
/// # Ok(())
/// # }
/// ```
pub struct PipelineOrchestrator {
    config: AppConfig,
    state: SharedState,
    store: Arc<dyn ArtifactStore>,
    registry: ProfileRegistry,
    /// Serialises snapshot writes so concurrent publishes never drop
    /// each other's entries.
    snapshot_lock: AsyncMutex<()>,
    capture: AudioCapture,
    active_capture: Mutex<Option<CancelHandle>>,
    levels: Arc<watch::Sender<CaptureLevel>>,
    conditioner: SignalConditioner,
    trainer: Arc<VoiceModelTrainer>,
    synthesizer: Arc<dyn ChunkSynthesizer>,
    workers: Arc<Semaphore>,
}

impl PipelineOrchestrator {
    /// Create an orchestrator with an empty registry.  Call
    /// [`restore`](Self::restore) to load previously published profiles.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn ArtifactStore>,
        device: Arc<dyn AudioDevice>,
    ) -> Self {
        let (levels, _) = watch::channel(CaptureLevel::default());
        let level_interval = Duration::from_millis(config.audio.level_interval_ms.max(1));
        Self {
            state: new_shared_state(config.clone()),
            store,
            registry: ProfileRegistry::new(),
            snapshot_lock: AsyncMutex::new(()),
            capture: AudioCapture::new(device, level_interval),
            active_capture: Mutex::new(None),
            levels: Arc::new(levels),
            conditioner: SignalConditioner::new(&config.audio),
            trainer: Arc::new(VoiceModelTrainer::new(config.training.clone())),
            synthesizer: Arc::new(SpeechSynthesizer::new(config.synthesis.clone())),
            workers: Arc::new(Semaphore::new(config.synthesis.workers.max(1))),
            config,
        }
    }

    /// Replace the chunk synthesizer.
    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn ChunkSynthesizer>) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    /// Status handle for front ends.
    pub fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    /// Live level updates while a capture is running.
    pub fn level_updates(&self) -> watch::Receiver<CaptureLevel> {
        self.levels.subscribe()
    }

    /// Load the registry snapshot from the store.
    ///
    /// Entries whose model or characteristics artifact is missing are
    /// skipped with a warning.  Returns the number of profiles restored.
    pub async fn restore(&self) -> Result<usize> {
        let Some(bytes) = self.store.get(REGISTRY_KEY).await? else {
            log::info!("no registry snapshot found, starting empty");
            return Ok(0);
        };
        let mut restored = 0;
        for profile in ProfileRegistry::parse_snapshot(&bytes)? {
            let model = self.store.get(&profile.model_key).await?;
            let characteristics = self
                .store
                .get(&storage::characteristics_key(&profile.id))
                .await?;
            if model.is_none() || characteristics.is_none() {
                log::warn!(
                    "skipping profile {} ({}): artifacts missing",
                    profile.id,
                    profile.name
                );
                continue;
            }
            self.registry.insert(profile);
            restored += 1;
        }
        log::info!("restored {restored} voice profile(s)");
        Ok(restored)
    }

    // -----------------------------------------------------------------------
    // Profile creation
    // -----------------------------------------------------------------------

    /// Record a voice sample from the device for up to `duration_bound`
    /// (never longer than `audio.max_recording_secs`), then train and
    /// publish a profile from it.
    ///
    /// The capture ends early, keeping what was recorded, when
    /// [`cancel_capture`](Self::cancel_capture) is called.
    ///
    /// # Errors
    ///
    /// * [`VoiceError::DeviceUnavailable`] if another capture is running or
    ///   the device rejects the configured format.
    /// * [`VoiceError::RecordingInterrupted`] if the device fails.
    /// * [`VoiceError::TrainingFailed`] if training or publishing fails.
    pub async fn create_profile(
        &self,
        name: &str,
        duration_bound: Duration,
        language: &str,
    ) -> Result<VoiceProfile> {
        // A busy or rejecting device leaves the shared stage alone: another
        // capture may own it.
        let session = self.capture.open(self.config.audio.format())?;
        self.begin_profile(ProfileStage::Capturing);
        let sample = match self.record(session, duration_bound).await {
            Ok(sample) => sample,
            Err(e) => return Err(self.profile_failed(e)),
        };
        log::info!("captured {:.1}s voice sample", sample.duration_secs());
        self.train_and_publish(vec![sample], name, language).await
    }

    /// Stop the running capture, if any.  Returns `false` when nothing was
    /// recording.
    pub fn cancel_capture(&self) -> bool {
        let active = self
            .active_capture
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match active {
            Some(handle) => {
                handle.cancel();
                log::info!("capture cancelled by caller");
                true
            }
            None => false,
        }
    }

    /// Train and publish a profile from a pre-recorded sample.
    pub async fn upload_profile(
        &self,
        sample: AudioBuffer,
        name: &str,
        language: &str,
    ) -> Result<VoiceProfile> {
        self.upload_profile_segments(vec![sample], name, language)
            .await
    }

    /// Train and publish a profile from several takes, concatenated in
    /// order.  All takes must share one format.
    pub async fn upload_profile_segments(
        &self,
        takes: Vec<AudioBuffer>,
        name: &str,
        language: &str,
    ) -> Result<VoiceProfile> {
        self.begin_profile(ProfileStage::Conditioning);
        self.train_and_publish(takes, name, language).await
    }

    async fn record(
        &self,
        session: CaptureSession,
        duration_bound: Duration,
    ) -> Result<AudioBuffer> {
        let max = Duration::try_from_secs_f32(self.config.audio.max_recording_secs.max(0.0))
            .unwrap_or(Duration::MAX);
        let bound = duration_bound.min(max);

        let cancel = session.cancel_handle();
        *self
            .active_capture
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(cancel.clone());
        self.levels.send_replace(CaptureLevel::default());

        // The session bounds itself by wall clock too; the timer makes sure
        // a stalled read is cut off even if no samples arrive.
        let timer = tokio::spawn(async move {
            tokio::time::sleep(bound).await;
            cancel.cancel();
        });
        let levels = Arc::clone(&self.levels);
        let result =
            tokio::task::spawn_blocking(move || session.capture(bound, Some(&*levels))).await;
        timer.abort();
        *self
            .active_capture
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = None;

        result.map_err(|e| VoiceError::RecordingInterrupted(format!("capture worker: {e}")))?
    }

    async fn train_and_publish(
        &self,
        takes: Vec<AudioBuffer>,
        name: &str,
        language: &str,
    ) -> Result<VoiceProfile> {
        match self.try_train_and_publish(takes, name, language).await {
            Ok(profile) => {
                self.set_profile_stage(ProfileStage::Published);
                Ok(profile)
            }
            Err(e) => Err(self.profile_failed(e)),
        }
    }

    async fn try_train_and_publish(
        &self,
        takes: Vec<AudioBuffer>,
        name: &str,
        language: &str,
    ) -> Result<VoiceProfile> {
        self.set_profile_stage(ProfileStage::Conditioning);
        let conditioner = self.conditioner.clone();
        let conditioned = tokio::task::spawn_blocking(move || conditioner.condition_all(&takes))
            .await
            .map_err(|e| VoiceError::TrainingFailed(format!("conditioning worker: {e}")))??;

        self.set_profile_stage(ProfileStage::Training);
        let id = Uuid::new_v4().to_string();
        let _guard = self.registry.lock_id(&id).await;
        let language = match language::primary(language) {
            code if code.is_empty() => "en".to_string(),
            code => code,
        };
        let source_duration_secs = conditioned.duration_secs();
        let sample_rate = conditioned.sample_rate;

        let trainer = Arc::clone(&self.trainer);
        let (train_id, train_language) = (id.clone(), language.clone());
        let (model, characteristics) = tokio::task::spawn_blocking(move || {
            trainer.train(&conditioned, &train_id, &train_language)
        })
        .await
        .map_err(|e| VoiceError::TrainingFailed(format!("training worker: {e}")))??;

        let profile = VoiceProfile {
            model_key: storage::model_key(&id),
            id,
            name: name.trim().to_string(),
            language,
            created_at: Utc::now(),
            source_duration_secs,
            sample_rate,
        };
        self.publish(&profile, &model, &characteristics).await?;
        log::info!(
            "published profile {} ({:?}, {}, final loss {:.4})",
            profile.id,
            profile.name,
            profile.language,
            model.final_loss
        );
        Ok(profile)
    }

    /// Write both artifacts and the snapshot, or nothing.
    async fn publish(
        &self,
        profile: &VoiceProfile,
        model: &TrainedModel,
        characteristics: &VoiceCharacteristics,
    ) -> Result<()> {
        let failed = |step: &str, e: &dyn std::fmt::Display| {
            VoiceError::TrainingFailed(format!("publishing profile: {step}: {e}"))
        };
        let model_bytes = model.to_bytes().map_err(|e| failed("encoding model", &e))?;
        let characteristics_bytes = characteristics
            .to_bytes()
            .map_err(|e| failed("encoding characteristics", &e))?;
        let characteristics_key = storage::characteristics_key(&profile.id);

        self.store
            .put(&profile.model_key, model_bytes)
            .await
            .map_err(|e| failed("storing model", &e))?;
        if let Err(e) = self
            .store
            .put(&characteristics_key, characteristics_bytes)
            .await
        {
            self.discard(&[&profile.model_key]).await;
            return Err(failed("storing characteristics", &e));
        }
        if let Err(e) = self
            .commit_registry(RegistryChange::Insert(profile.clone()))
            .await
        {
            self.discard(&[&profile.model_key, &characteristics_key])
                .await;
            return Err(failed("saving registry", &e));
        }
        Ok(())
    }

    /// Best-effort rollback of partially written artifacts.
    async fn discard(&self, keys: &[&str]) {
        for key in keys {
            if let Err(e) = self.store.delete(key).await {
                log::warn!("rollback: could not delete {key}: {e}");
            }
        }
    }

    /// Persist the snapshot with `change` applied, then apply it in memory.
    async fn commit_registry(&self, change: RegistryChange) -> Result<()> {
        let _guard = self.snapshot_lock.lock().await;
        let mut profiles = self.registry.list();
        match &change {
            RegistryChange::Insert(profile) => profiles.push(profile.clone()),
            RegistryChange::Remove(id) => profiles.retain(|p| &p.id != id),
        }
        let bytes = ProfileRegistry::snapshot_bytes(profiles)?;
        self.store.put(REGISTRY_KEY, bytes).await?;
        match change {
            RegistryChange::Insert(profile) => self.registry.insert(profile),
            RegistryChange::Remove(id) => {
                self.registry.remove(&id);
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Cloning
    // -----------------------------------------------------------------------

    /// Synthesize `request.text` in the requested profile's voice.
    ///
    /// # Errors
    ///
    /// * [`VoiceError::TextTooLong`] before any work if the text exceeds
    ///   `synthesis.max_text_chars` characters.
    /// * [`VoiceError::ProfileNotFound`] for an unknown profile id.
    /// * [`VoiceError::SynthesisFailed`] if any chunk fails; no partial
    ///   audio is returned.
    pub async fn clone_voice(&self, request: CloneRequest) -> Result<AudioBuffer> {
        lock_state(&self.state).error_message = None;
        let len = request.text.chars().count();
        let max = self.config.synthesis.max_text_chars;
        if len > max {
            return Err(self.clone_failed(VoiceError::TextTooLong { len, max }));
        }
        match self.try_clone_voice(request).await {
            Ok(audio) => {
                self.set_clone_stage(CloneStage::Done);
                Ok(audio)
            }
            Err(e) => Err(self.clone_failed(e)),
        }
    }

    async fn try_clone_voice(&self, request: CloneRequest) -> Result<AudioBuffer> {
        let profile = self
            .registry
            .get(&request.profile_id)
            .ok_or_else(|| VoiceError::ProfileNotFound(request.profile_id.clone()))?;
        let prosody = Prosody {
            speed: request.speed,
            pitch: request.pitch,
            emotion: Emotion::from_tag(&request.emotion),
        };
        prosody.validate()?;
        let voice = self.load_voice(&profile).await?;
        let language = language::resolve(&request.language, &request.text, &profile.language);

        self.set_clone_stage(CloneStage::Segmenting);
        let chunks = segment(&request.text, self.config.synthesis.max_chunk_chars);
        if chunks.is_empty() {
            return Err(VoiceError::SynthesisFailed(
                "text contains nothing to synthesize".into(),
            ));
        }
        let total = chunks.len();
        log::info!(
            "cloning {} chars as {total} chunk(s) with profile {} ({language})",
            request.text.chars().count(),
            profile.id
        );
        self.set_clone_stage(CloneStage::Synthesizing { done: 0, total });

        let mut tasks = JoinSet::new();
        for chunk in chunks {
            let permit = Arc::clone(&self.workers)
                .acquire_owned()
                .await
                .map_err(|e| VoiceError::SynthesisFailed(format!("worker pool closed: {e}")))?;
            let synthesizer = Arc::clone(&self.synthesizer);
            let voice = voice.clone();
            let language = language.clone();
            tasks.spawn_blocking(move || {
                let _permit = permit;
                let audio = synthesizer.synthesize(&chunk, &voice, &language, &prosody);
                (chunk.index, audio)
            });
        }

        let mut rendered: Vec<(usize, AudioBuffer)> = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            let (index, audio) = joined
                .map_err(|e| VoiceError::SynthesisFailed(format!("synthesis worker: {e}")))?;
            match audio {
                Ok(audio) => {
                    rendered.push((index, audio));
                    self.set_clone_stage(CloneStage::Synthesizing {
                        done: rendered.len(),
                        total,
                    });
                }
                Err(e) => {
                    tasks.abort_all();
                    return Err(match e {
                        VoiceError::SynthesisFailed(_) => e,
                        other => VoiceError::SynthesisFailed(format!("chunk {index}: {other}")),
                    });
                }
            }
        }

        self.set_clone_stage(CloneStage::Merging);
        rendered.sort_by_key(|(index, _)| *index);
        let segments: Vec<AudioBuffer> = rendered.into_iter().map(|(_, audio)| audio).collect();
        let merged = concatenate(&segments)
            .map_err(|e| VoiceError::SynthesisFailed(format!("merging chunks: {e}")))?;
        if merged.is_empty() {
            return Err(VoiceError::SynthesisFailed("text produced no audio".into()));
        }
        Ok(merged)
    }

    async fn load_voice(&self, profile: &VoiceProfile) -> Result<LoadedVoice> {
        let model_bytes = self
            .fetch_artifact(profile, &profile.model_key, "model")
            .await?;
        let characteristics_bytes = self
            .fetch_artifact(
                profile,
                &storage::characteristics_key(&profile.id),
                "characteristics",
            )
            .await?;

        let model = TrainedModel::from_bytes(&model_bytes)
            .map_err(|e| VoiceError::SynthesisFailed(e.to_string()))?;
        let characteristics = VoiceCharacteristics::from_bytes(&characteristics_bytes)
            .map_err(|e| VoiceError::SynthesisFailed(e.to_string()))?;
        Ok(LoadedVoice {
            model: Arc::new(model),
            characteristics: Arc::new(characteristics),
        })
    }

    async fn fetch_artifact(
        &self,
        profile: &VoiceProfile,
        key: &str,
        what: &str,
    ) -> Result<Vec<u8>> {
        self.store
            .get(key)
            .await
            .map_err(|e| VoiceError::SynthesisFailed(format!("loading {what}: {e}")))?
            .ok_or_else(|| {
                VoiceError::SynthesisFailed(format!("{what} for profile {} is missing", profile.id))
            })
    }

    // -----------------------------------------------------------------------
    // Profile management
    // -----------------------------------------------------------------------

    /// Published profiles, oldest first.
    pub fn list_profiles(&self) -> Vec<VoiceProfile> {
        self.registry.list()
    }

    /// Remove a profile and its artifacts.
    ///
    /// # Errors
    ///
    /// * [`VoiceError::ProfileNotFound`] for an unknown id; nothing changes.
    /// * [`VoiceError::Storage`] if the snapshot or an artifact cannot be
    ///   written or removed.
    pub async fn delete_profile(&self, id: &str) -> Result<()> {
        if !self.registry.contains(id) {
            return Err(VoiceError::ProfileNotFound(id.to_string()));
        }
        let _guard = self.registry.lock_id(id).await;
        // A concurrent delete may have won the lock.
        let profile = self
            .registry
            .get(id)
            .ok_or_else(|| VoiceError::ProfileNotFound(id.to_string()))?;

        self.commit_registry(RegistryChange::Remove(id.to_string()))
            .await?;
        self.store.delete(&profile.model_key).await?;
        self.store
            .delete(&storage::characteristics_key(id))
            .await?;
        log::info!("deleted profile {id} ({:?})", profile.name);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // State helpers
    // -----------------------------------------------------------------------

    fn begin_profile(&self, stage: ProfileStage) {
        let mut st = lock_state(&self.state);
        st.profile = stage;
        st.error_message = None;
    }

    fn set_profile_stage(&self, stage: ProfileStage) {
        log::debug!("profile workflow: {}", stage.label());
        lock_state(&self.state).profile = stage;
    }

    fn set_clone_stage(&self, stage: CloneStage) {
        log::debug!("clone workflow: {stage:?}");
        lock_state(&self.state).clone = stage;
    }

    fn profile_failed(&self, err: VoiceError) -> VoiceError {
        log::error!("profile creation failed: {err}");
        let mut st = lock_state(&self.state);
        st.profile = ProfileStage::Failed;
        st.error_message = Some(err.to_string());
        err
    }

    fn clone_failed(&self, err: VoiceError) -> VoiceError {
        log::error!("cloning failed: {err}");
        let mut st = lock_state(&self.state);
        st.clone = CloneStage::Failed;
        st.error_message = Some(err.to_string());
        err
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
