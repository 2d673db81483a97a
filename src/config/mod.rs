pub mod loader;
pub mod schema;
pub mod version;

pub use loader::{discover, load_from_path, load_from_str, ConfigError, CONFIG_FILE_NAME};
pub use schema::{
    BridgeConfig, BridgeSettings, DiagnosticsSettings, LoggingConfig, PatchSettings,
    RefreshSettings, ValidationError, ValidationIssue,
};
pub use version::{matches_requirement, VersionError, PROTOCOL_VERSION};
