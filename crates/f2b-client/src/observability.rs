use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILE_NAME: &str = "f2b.logs.jsonl";

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn observability_enabled(value: Option<&str>) -> bool {
    value.and_then(parse_bool_env).unwrap_or(true)
}

fn resolve_env_filter(level: Option<&str>) -> tracing_subscriber::EnvFilter {
    if let Some(level) = level
        && let Ok(filter) = tracing_subscriber::EnvFilter::try_new(level)
    {
        return filter;
    }
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
}

fn split_log_path(path: &std::path::Path) -> (std::path::PathBuf, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."))
        .to_path_buf();
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE_NAME)
        .to_string();
    (dir, file_name)
}

/// Initialize logging once per process.
///
/// Environment variables:
/// - `F2B_OBSERVABILITY_ENABLED`: optional enable/disable flag (default enabled).
/// - `F2B_LOG_LEVEL`: optional level/filter override (`info`, `f2b_client=debug`, etc.).
/// - `F2B_JSON_LOG_PATH`: optional log file path. If set, logs are JSONL in that file.
///   If unset, logs go to stderr in a compact console format so stdout stays clean.
/// - `RUST_LOG`: fallback filter when `F2B_LOG_LEVEL` is unset (default `warn`).
pub fn init_observability() {
    INIT.get_or_init(|| {
        let enabled = std::env::var("F2B_OBSERVABILITY_ENABLED").ok();
        if !observability_enabled(enabled.as_deref()) {
            return;
        }

        let level = std::env::var("F2B_LOG_LEVEL").ok();
        let env_filter = resolve_env_filter(level.as_deref());
        if let Ok(path_raw) = std::env::var("F2B_JSON_LOG_PATH") {
            let (dir, file_name) = split_log_path(std::path::Path::new(&path_raw));
            let _ = std::fs::create_dir_all(&dir);
            let writer = tracing_appender::rolling::never(dir, file_name);
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(false)
                .with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init();
        } else {
            let console_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init();
        }
    });
}
