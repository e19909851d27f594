//! Voice-profile and cloning workflows.
//!
//! This module wires capture, conditioning, training, storage and
//! synthesis together and exposes the shared state a front end reads.
//!
//! # Architecture
//!
//! ```text
//! PipelineOrchestrator
//!        │
//!        ├─ create_profile / upload_profile
//!        │     ├─ AudioCapture (exclusive)        → Capturing
//!        │     ├─ SignalConditioner               → Conditioning
//!        │     ├─ VoiceModelTrainer               → Training
//!        │     └─ ArtifactStore + ProfileRegistry → Published
//!        │
//!        ├─ clone_voice
//!        │     ├─ text::segment                   → Segmenting
//!        │     ├─ ChunkSynthesizer × workers      → Synthesizing
//!        │     └─ concatenate                     → Merging → Done
//!        │
//!        └─ list_profiles / delete_profile / restore
//!
//! SharedState (Arc<Mutex<AppState>>) ←─── read by front ends
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voice_clone::audio::{read_wav, CpalDevice};
//! use voice_clone::config::AppConfig;
//! use voice_clone::pipeline::{CloneRequest, PipelineOrchestrator};
//! use voice_clone::storage::MemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> voice_clone::error::Result<()> {
//!     let orchestrator = PipelineOrchestrator::new(
//!         AppConfig::default(),
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(CpalDevice::new()),
//!     );
//!     let sample = read_wav(std::path::Path::new("me.wav"))?;
//!     let profile = orchestrator.upload_profile(sample, "Me", "en").await?;
//!     let speech = orchestrator
//!         .clone_voice(CloneRequest::new("Nice to meet you.", profile.id))
//!         .await?;
//!     println!("{:.1}s of audio", speech.duration_secs());
//!     Ok(())
//! }
//! ```

pub mod registry;
pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use registry::{ProfileRegistry, VoiceProfile};
pub use runner::{CloneRequest, PipelineOrchestrator};
pub use state::{lock_state, new_shared_state, AppState, CloneStage, ProfileStage, SharedState};
