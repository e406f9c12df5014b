mod api;
mod config;
mod error;
mod format;
mod logging;
mod progress;
mod status;

pub const APP_NAME: &str = "TaskLens";

pub use api::{
    ClusterApiClient, ClusterApiConfig, InMemoryTaskApi, LOG_BATCH_LINES, LOG_MAX_LINES, TaskApi,
    fetch_task_log,
};
pub use config::{
    ClusterEndpoint, Poll, SETTINGS_SCHEMA_VERSION, Settings, config_path, load_settings,
    parse_settings, save_settings, to_toml, validate_settings,
};
pub use error::{Error, Result};
pub use format::{format_duration, format_rate, format_size, scale_bytes};
pub use logging::init_logging;
pub use progress::{ProgressReport, reconstruct_progress};
pub use status::{LogLine, MIGRATION_TASK_TYPES, TaskStatusSnapshot, Upid, is_migration_task};
