use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "LabTrace";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Tesseract language string: Cyrillic and Latin reports share one pass.
pub const DEFAULT_OCR_LANGS: &str = "rus+eng";

/// Maximum number of documents accepted in one bulk submission.
pub const MAX_BATCH_DOCUMENTS: usize = 100;

/// Environment variable names
pub const ENV_DB_PATH: &str = "LABTRACE_DB";
pub const ENV_TESSDATA: &str = "LABTRACE_TESSDATA";
pub const ENV_OCR_LANGS: &str = "LABTRACE_OCR_LANGS";
pub const ENV_WORKERS: &str = "LABTRACE_WORKERS";

/// Get the application data directory
/// ~/LabTrace/ on all platforms, falling back to the working directory
/// when no home directory can be resolved (containers, CI).
pub fn app_data_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(APP_NAME),
        None => PathBuf::from(APP_NAME),
    }
}

/// Default SQLite database location
pub fn default_database_path() -> PathBuf {
    app_data_dir().join("labtrace.db")
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> String {
    "labtrace=info".to_string()
}

/// Number of CPU cores, the default size of the batch worker pool.
pub fn available_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Runtime settings resolved from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub database_path: PathBuf,
    pub tessdata_dir: Option<PathBuf>,
    pub ocr_languages: String,
    pub workers: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            tessdata_dir: None,
            ocr_languages: DEFAULT_OCR_LANGS.to_string(),
            workers: available_workers(),
        }
    }
}

impl RuntimeConfig {
    /// Read overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty or unparseable values keep the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = non_empty(ENV_DB_PATH) {
            config.database_path = PathBuf::from(path);
        }
        if let Some(dir) = non_empty(ENV_TESSDATA) {
            config.tessdata_dir = Some(PathBuf::from(dir));
        }
        if let Some(langs) = non_empty(ENV_OCR_LANGS) {
            config.ocr_languages = langs.trim().to_string();
        }
        if let Some(workers) = non_empty(ENV_WORKERS) {
            match workers.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.workers = n,
                _ => tracing::warn!(value = %workers, "Ignoring invalid {ENV_WORKERS}"),
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn app_data_dir_ends_with_app_name() {
        assert!(app_data_dir().ends_with("LabTrace"));
    }

    #[test]
    fn database_under_app_data() {
        assert!(default_database_path().starts_with(app_data_dir()));
    }

    #[test]
    fn defaults_without_environment() {
        let config = RuntimeConfig::from_lookup(|_| None);
        assert_eq!(config.ocr_languages, "rus+eng");
        assert!(config.workers >= 1);
        assert!(config.tessdata_dir.is_none());
    }

    #[test]
    fn environment_overrides_apply() {
        let config = RuntimeConfig::from_lookup(lookup_from(&[
            (ENV_DB_PATH, "/tmp/labs.db"),
            (ENV_TESSDATA, "/usr/share/tessdata"),
            (ENV_OCR_LANGS, "eng"),
            (ENV_WORKERS, "3"),
        ]));
        assert_eq!(config.database_path, PathBuf::from("/tmp/labs.db"));
        assert_eq!(config.tessdata_dir, Some(PathBuf::from("/usr/share/tessdata")));
        assert_eq!(config.ocr_languages, "eng");
        assert_eq!(config.workers, 3);
    }

    #[test]
    fn invalid_worker_count_keeps_default() {
        let config = RuntimeConfig::from_lookup(lookup_from(&[(ENV_WORKERS, "zero")]));
        assert_eq!(config.workers, available_workers());

        let config = RuntimeConfig::from_lookup(lookup_from(&[(ENV_WORKERS, "0")]));
        assert_eq!(config.workers, available_workers());
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
