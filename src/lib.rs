//! Adaptive web-form engine: field discovery and classification, realistic
//! data synthesis, multi-step flow navigation, and action recording with
//! script generation.

pub mod codegen;
pub mod config;
pub mod detector;
pub mod dom;
pub mod driver;
pub mod error;
pub mod filler;
pub mod generator;
pub mod hands;
pub mod login;
pub mod navigator;
pub mod recorder;
pub mod selector;
pub mod types;
pub mod vision;

#[cfg(test)]
mod testing;

use std::fs::OpenOptions;
use std::io::BufReader;
use std::path::Path;

pub use codegen::{CodegenOptions, ScriptFormat, generate_script};
pub use config::{FillerConfig, LaunchConfig, NavigatorConfig, RecorderConfig};
pub use driver::Driver;
pub use error::{Diagnostics, DriverError, FlowError};
pub use filler::{FillReport, FormAnalysis, FormFiller};
pub use login::{Credentials, smart_login};
pub use navigator::{NavigationOutcome, NavigationReport, Navigator};
pub use recorder::{RecordedAction, Recorder, RecordingSummary};
pub use types::{FieldDescriptor, FieldType, FieldValue, Overrides, SelectOption};

/// Read an action log. A missing file is an empty log.
pub fn load_actions(path: &Path) -> error::Result<Vec<RecordedAction>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .map_err(|e| FlowError::ActionLog(format!("{}: {e}", path.display())))
}

/// Write an action log as a pretty-printed JSON array.
pub fn save_actions(path: &Path, actions: &[RecordedAction]) -> error::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;

    serde_json::to_writer_pretty(file, actions)?;
    Ok(())
}
