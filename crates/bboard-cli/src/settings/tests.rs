use super::*;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn test_load_full_file() {
    let file = write_config(
        r#"
reinitialize_after_shutdown = false

[database]
host = "db.internal"
port = 3307
user = "bboard"
password = "s3cret"
database = "board"

[pool]
max_connections = 4
min_connections = 2
acquire_timeout_ms = 1500

[retry]
max_attempts = 5
initial_ms = 250

[logging]
filter = "debug"
json_file = true
"#,
    );

    let settings = Settings::from_file(file.path()).unwrap();
    assert_eq!(settings.database.host, "db.internal");
    assert_eq!(settings.database.port, 3307);
    assert_eq!(settings.database.password.as_deref(), Some("s3cret"));
    assert_eq!(settings.manager.pool.max_connections(), 4);
    assert_eq!(settings.manager.pool.min_connections(), 2);
    assert_eq!(
        settings.manager.pool.acquire_timeout(),
        Duration::from_millis(1500)
    );
    assert_eq!(settings.manager.retry.max_attempts(), 5);
    assert_eq!(
        settings.manager.retry.backoff().initial_delay(),
        Duration::from_millis(250)
    );
    assert!(!settings.manager.reinitialize_after_shutdown);
    assert_eq!(settings.logging.filter, "debug");
    assert!(settings.logging.json_file);
    assert!(settings.validate().is_ok());
}

#[test]
fn test_missing_sections_use_defaults() {
    let file = write_config("[database]\ndatabase = \"board\"\n");
    let settings = Settings::from_file(file.path()).unwrap();

    assert_eq!(settings.database.host, "localhost");
    assert_eq!(settings.database.charset, "utf8mb4");
    assert!(!settings.database.autocommit);
    assert_eq!(settings.manager, ManagerConfig::default());
    assert_eq!(settings.logging, LogSettings::default());
}

#[test]
fn test_unreadable_and_malformed_files() {
    let err = Settings::from_file(Path::new("/nonexistent/bboard.toml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read configuration"));

    let file = write_config("[database\nhost = ");
    let err = Settings::from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse configuration file"));
}

#[test]
fn test_env_overrides_replace_file_values() {
    let mut settings = Settings::default();
    settings.database.host = "from-file".into();

    settings
        .apply_env_overrides(env(&[
            ("BBOARD_DB_HOST", "from-env"),
            ("BBOARD_DB_PORT", "3310"),
            ("BBOARD_DB_USER", "board_rw"),
            ("BBOARD_DB_PASSWORD", "pw"),
            ("BBOARD_DB_NAME", "board_prod"),
        ]))
        .unwrap();

    assert_eq!(settings.database.host, "from-env");
    assert_eq!(settings.database.port, 3310);
    assert_eq!(settings.database.user, "board_rw");
    assert_eq!(settings.database.password.as_deref(), Some("pw"));
    assert_eq!(settings.database.database, "board_prod");
}

#[test]
fn test_absent_env_keeps_file_values() {
    let mut settings = Settings::default();
    settings.database.port = 3307;
    settings.apply_env_overrides(env(&[])).unwrap();
    assert_eq!(settings.database.port, 3307);
}

#[test]
fn test_bad_port_override_is_an_error() {
    let mut settings = Settings::default();
    let err = settings
        .apply_env_overrides(env(&[("BBOARD_DB_PORT", "not-a-port")]))
        .unwrap_err();
    assert!(err.to_string().contains("BBOARD_DB_PORT"));
}

#[test]
fn test_validation_names_the_section() {
    let file = write_config("[pool]\nmax_connections = 2\nmin_connections = 5\n");
    let settings = Settings::from_file(file.path()).unwrap();
    let err = settings.validate().unwrap_err();
    assert!(err.to_string().contains("[pool]"));

    let mut settings = Settings::default();
    settings.database.port = 0;
    let err = settings.validate().unwrap_err();
    assert!(err.to_string().contains("[database]"));

    let file = write_config("[retry]\ninitial_ms = 0\nmultiplier = 0.5\n");
    let settings = Settings::from_file(file.path()).unwrap();
    let err = settings.validate().unwrap_err();
    assert!(err.to_string().contains("[retry]"));
}

#[test]
fn test_rendered_config_hides_password() {
    let mut settings = Settings::default();
    settings.database.password = Some("hunter2".into());

    let rendered = settings.to_toml().unwrap();
    assert!(!rendered.contains("hunter2"));
    assert!(rendered.contains("<redacted>"));

    // The rendered file loads back
    let reparsed: Settings = toml::from_str(&rendered).unwrap();
    assert_eq!(reparsed.manager, settings.manager);
    assert_eq!(reparsed.database.host, settings.database.host);
}

#[test]
fn test_no_password_is_not_invented() {
    let settings = Settings::default();
    assert_eq!(settings.redacted().database.password, None);
}
