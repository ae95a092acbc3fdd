use crate::config::{LoggingConfig, Section};
use std::{
    collections::HashMap,
    io::{IsTerminal, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    filter::{EnvFilter, Targets},
    fmt,
};

use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};

const DEFAULT_SECTION: &str = "default";

// -------- level helpers --------
fn parse_level(s: &str) -> LevelFilter {
    match s.to_ascii_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        "off" | "none" => LevelFilter::OFF,
        _ => LevelFilter::INFO,
    }
}

/// Returns true if target == prefix or target starts with "prefix::"
fn matches_crate_prefix(target: &str, prefix: &str) -> bool {
    target == prefix
        || (target.starts_with(prefix) && target[prefix.len()..].starts_with("::"))
}

// -------- rotating writer for files --------
#[derive(Clone)]
struct RotWriter(Arc<Mutex<FileRotate<AppendTimestamp>>>);

impl Write for RotWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| std::io::Error::other("log file lock poisoned"))?
            .write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0
            .lock()
            .map_err(|_| std::io::Error::other("log file lock poisoned"))?
            .flush()
    }
}

/// A writer that drops everything when no file is configured for a target.
struct RoutedWriter(Option<RotWriter>);

impl Write for RoutedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.0 {
            Some(w) => w.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.0 {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

/// Routes records to the file of the longest matching section prefix,
/// falling back to the file of the "default" section.
#[derive(Default)]
struct FileRouter {
    default: Option<RotWriter>,
    by_prefix: HashMap<String, RotWriter>,
}

impl FileRouter {
    fn resolve_for(&self, target: &str) -> Option<RotWriter> {
        self.by_prefix
            .iter()
            .filter(|(prefix, _)| matches_crate_prefix(target, prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, w)| w.clone())
            .or_else(|| self.default.clone())
    }

    fn is_empty(&self) -> bool {
        self.default.is_none() && self.by_prefix.is_empty()
    }
}

impl<'a> fmt::MakeWriter<'a> for FileRouter {
    type Writer = RoutedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        RoutedWriter(self.default.clone())
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        RoutedWriter(self.resolve_for(meta.target()))
    }
}

// -------- path resolution helpers --------

/// Absolute paths are kept as-is; relative paths are joined with `base_dir`.
fn resolve_log_path(file: &str, base_dir: &Path) -> PathBuf {
    let p = Path::new(file);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

fn file_limit(section: &Section) -> FileLimit {
    match (section.max_age_days, section.max_backups) {
        (Some(days), _) => FileLimit::Age(chrono::Duration::days(i64::from(days))),
        (None, Some(n)) => FileLimit::MaxFiles(n),
        (None, None) => FileLimit::MaxFiles(3),
    }
}

/// Create a rotating writer, ensuring the parent directory exists.
fn create_rotating_writer_at_path(log_path: &Path, section: &Section) -> std::io::Result<RotWriter> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let max_bytes = section.max_size_mb.unwrap_or(100) * 1024 * 1024;
    let rot = FileRotate::new(
        log_path,
        AppendTimestamp::default(file_limit(section)),
        ContentLimit::BytesSurpassed(max_bytes as usize),
        Compression::None,
        #[cfg(unix)]
        None,
    );

    Ok(RotWriter(Arc::new(Mutex::new(rot))))
}

fn file_writer(name: &str, section: &Section, base_dir: &Path) -> Option<RotWriter> {
    if section.file.trim().is_empty() {
        return None;
    }
    let log_path = resolve_log_path(&section.file, base_dir);
    match create_rotating_writer_at_path(&log_path, section) {
        Ok(writer) => Some(writer),
        Err(e) => {
            eprintln!(
                "Failed to init log file for '{}': {} ({})",
                name,
                log_path.to_string_lossy(),
                e
            );
            None
        }
    }
}

// -------- filters --------

/// Console directives per section, e.g. `info,sqlx=warn`; the "default"
/// section covers all other targets.
fn console_directives(cfg: &LoggingConfig) -> String {
    let default = cfg
        .get(DEFAULT_SECTION)
        .map_or(LevelFilter::OFF, |s| parse_level(&s.console_level));
    let mut sections: Vec<_> = cfg
        .iter()
        .filter(|(name, _)| name.as_str() != DEFAULT_SECTION)
        .map(|(name, s)| format!("{name}={}", parse_level(&s.console_level)))
        .collect();
    sections.sort();
    std::iter::once(default.to_string())
        .chain(sections)
        .collect::<Vec<_>>()
        .join(",")
}

/// File levels per section. A section without a file keeps its records
/// out of the default file.
fn file_targets(cfg: &LoggingConfig) -> Targets {
    let has_file = |s: &Section| !s.file.trim().is_empty();
    let default = cfg
        .get(DEFAULT_SECTION)
        .filter(|s| has_file(s))
        .map_or(LevelFilter::OFF, |s| parse_level(&s.file_level));
    cfg.iter()
        .filter(|(name, _)| name.as_str() != DEFAULT_SECTION)
        .fold(Targets::new().with_default(default), |t, (name, s)| {
            let level = if has_file(s) {
                parse_level(&s.file_level)
            } else {
                LevelFilter::OFF
            };
            t.with_target(name.clone(), level)
        })
}

fn build_file_router(cfg: &LoggingConfig, base_dir: &Path) -> FileRouter {
    let mut router = FileRouter::default();
    for (name, section) in cfg {
        let Some(writer) = file_writer(name, section, base_dir) else {
            continue;
        };
        if name == DEFAULT_SECTION {
            router.default = Some(writer);
        } else {
            router.by_prefix.insert(name.clone(), writer);
        }
    }
    router
}

// -------- public init --------

/// Install the global subscriber.
///
/// Relative log files are resolved against `base_dir` (usually the
/// configured home directory). When `RUST_LOG` is set it replaces the
/// console levels of the configuration. Calling this twice is a no-op.
pub fn init_logging(cfg: &LoggingConfig, base_dir: &Path) {
    use tracing_subscriber::{layer::SubscriberExt, prelude::*, Registry};

    // sqlx reports through `log`
    let _ = tracing_log::LogTracer::init();

    if cfg.is_empty() {
        let _ = fmt()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .try_init();
        return;
    }

    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(console_directives(cfg)))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = fmt::layer()
        .with_ansi(std::io::stdout().is_terminal())
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(console_filter);

    let router = build_file_router(cfg, base_dir);
    if router.is_empty() {
        let _ = Registry::default().with(console_layer).try_init();
        return;
    }

    let file_layer = fmt::layer()
        .json()
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(router)
        .with_filter(file_targets(cfg));

    let _ = Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_logging_config;
    use tempfile::tempdir;
    use tracing::Level;

    fn section(console: &str, file: &str, file_level: &str) -> Section {
        Section {
            console_level: console.into(),
            file: file.into(),
            file_level: file_level.into(),
            max_age_days: None,
            max_backups: Some(2),
            max_size_mb: Some(1),
        }
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!(parse_level("trace"), LevelFilter::TRACE);
        assert_eq!(parse_level("DEBUG"), LevelFilter::DEBUG);
        assert_eq!(parse_level("Info"), LevelFilter::INFO);
        assert_eq!(parse_level("off"), LevelFilter::OFF);
        assert_eq!(parse_level("none"), LevelFilter::OFF);
        assert_eq!(parse_level("invalid"), LevelFilter::INFO);
    }

    #[test]
    fn test_crate_prefix_matching() {
        assert!(matches_crate_prefix("odata_query", "odata_query"));
        assert!(matches_crate_prefix("odata_query::processor", "odata_query"));
        assert!(!matches_crate_prefix("odata_query_ext", "odata_query"));
    }

    #[test]
    fn test_console_directives_fall_back_to_default_section() {
        let mut cfg = default_logging_config();
        cfg.insert("sqlx".into(), section("warn", "", ""));
        cfg.insert("odata_db::exec".into(), section("trace", "", ""));

        let directives = console_directives(&cfg);
        assert_eq!(directives, "info,odata_db::exec=trace,sqlx=warn");
        assert!(EnvFilter::try_new(directives).is_ok());
        assert_eq!(console_directives(&LoggingConfig::new()), "off");
    }

    #[test]
    fn test_sections_without_file_stay_out_of_the_default_file() {
        let mut cfg = default_logging_config();
        cfg.insert("sqlx".into(), section("warn", "", "trace"));
        cfg.insert("odata_db".into(), section("info", "logs/db.log", "trace"));

        let targets = file_targets(&cfg);
        assert!(targets.would_enable("odata_query", &Level::DEBUG));
        assert!(!targets.would_enable("sqlx::query", &Level::ERROR));
        assert!(targets.would_enable("odata_db::exec", &Level::TRACE));
    }

    #[test]
    fn test_router_prefers_the_longest_prefix() {
        let tmp = tempdir().unwrap();
        let mut cfg = LoggingConfig::new();
        cfg.insert("default".into(), section("info", "logs/all.log", "debug"));
        cfg.insert("odata".into(), section("info", "logs/odata.log", "debug"));
        cfg.insert("odata::db".into(), section("info", "logs/db.log", "debug"));

        let router = build_file_router(&cfg, tmp.path());
        let db = router.resolve_for("odata::db::exec").unwrap();
        assert!(Arc::ptr_eq(&db.0, &router.by_prefix["odata::db"].0));
        let other = router.resolve_for("hyper").unwrap();
        assert!(Arc::ptr_eq(&other.0, &router.default.as_ref().unwrap().0));
    }

    #[test]
    fn test_file_paths_resolved_against_home_dir() {
        let tmp = tempdir().unwrap();
        let resolved = resolve_log_path("logs/test.log", tmp.path());
        assert!(resolved.starts_with(tmp.path()));
        assert!(resolved.ends_with("logs/test.log"));
    }

    #[test]
    fn test_rotating_writer_creates_parent() {
        let tmp = tempdir().unwrap();
        let p = tmp.path().join("nested/dir/app.log");

        let mut writer = create_rotating_writer_at_path(&p, &section("info", "x", "info")).unwrap();
        writer.write_all(b"line\n").unwrap();
        writer.flush().unwrap();
        assert!(p.parent().unwrap().exists(), "parent dir must be created");
    }

    #[test]
    fn test_age_limit_takes_precedence() {
        let mut s = section("info", "x", "info");
        s.max_age_days = Some(7);
        assert!(matches!(file_limit(&s), FileLimit::Age(_)));
        s.max_age_days = None;
        assert!(matches!(file_limit(&s), FileLimit::MaxFiles(2)));
    }
}
