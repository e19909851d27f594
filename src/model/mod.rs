//! Per-profile acoustic model: training, the weight artifact and the
//! derived voice characteristics.

pub mod characteristics;
pub mod network;
pub mod trainer;
pub mod units;

pub use characteristics::{PitchRange, VoiceCharacteristics};
pub use network::{Mlp, NetworkError};
pub use trainer::{TrainedModel, VoiceModelTrainer, MODEL_FORMAT_VERSION};
