//! # Wikivox Common Library
//!
//! Shared code for the wikivox audio pipeline:
//! - Error taxonomy and `Result` alias
//! - Root folder and wiki configuration loading
//! - Spoken / UI language code sets
//! - On-disk layout of the game export tree

pub mod config;
pub mod error;
pub mod lang;
pub mod layout;

pub use config::{load_settings, resolve_root_folder, Settings, WikiConfig};
pub use error::{Error, Result};
pub use lang::{SpokenLang, UiLang};
pub use layout::RootLayout;
