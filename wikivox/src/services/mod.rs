//! Service modules for the audio pipeline
//!
//! Leaves first: bank indexing and waveform cataloguing feed the event
//! resolver, which feeds the voice catalog; acoustic analysis and the
//! transcoder back the upload orchestrator.

pub mod acoustic;
pub mod bank_indexer;
pub mod event_resolver;
pub mod transcoder;
pub mod uploader;
pub mod voice_catalog;
pub mod waveform_library;

pub use acoustic::{acoustic_equal, mean_mfcc, mean_rms, AcousticError};
pub use bank_indexer::{BankIndex, IndexError};
pub use event_resolver::EventResolver;
pub use transcoder::{TranscodeError, Transcoder};
pub use uploader::{UploadError, UploadOrchestrator, UploadReport};
pub use voice_catalog::VoiceCatalog;
pub use waveform_library::WaveformCatalog;
