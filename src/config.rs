use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Medparam";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Characters per chunk sent to the analyzer.
pub const DEFAULT_CHUNK_CHARS: usize = 3500;

/// Environment override for the data directory.
pub const DATA_DIR_ENV: &str = "MEDPARAM_DATA_DIR";

/// Get the application data directory.
/// `$MEDPARAM_DATA_DIR` when set, otherwise ~/Medparam/ (current directory
/// when no home directory can be determined).
pub fn app_data_dir() -> PathBuf {
    resolve_data_dir(std::env::var(DATA_DIR_ENV).ok(), dirs::home_dir())
}

fn resolve_data_dir(env_override: Option<String>, home: Option<PathBuf>) -> PathBuf {
    match env_override.filter(|s| !s.trim().is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => home.unwrap_or_else(|| PathBuf::from(".")).join(APP_NAME),
    }
}

/// Default SQLite file for merged subject records
pub fn database_path() -> PathBuf {
    app_data_dir().join("records.db")
}

/// Default synonym tree location
pub fn synonyms_path() -> PathBuf {
    app_data_dir().join("synonyms.json")
}

/// Debug builds are development builds.
pub fn is_dev() -> bool {
    cfg!(debug_assertions)
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    if is_dev() {
        "medparam_lib=debug,medparam=debug,warn"
    } else {
        "medparam_lib=info,medparam=info,warn"
    }
}
