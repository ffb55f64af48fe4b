//! Configuration resolution against real files and the environment.

use std::env;
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use pretty_assertions::assert_eq;

use archappl::config::{self, ENV_CONFIG_PATH};

// Tests in this file mutate the process environment; serialize them.
static ENV_LOCK: Mutex<()> = Mutex::new(());

#[test]
fn env_override_beats_every_other_source() {
    let _guard = ENV_LOCK.lock().unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
        [main]
        use = "site"

        [site]
        url = "http://archiver.example.org"
        data_port = 17668
        "#
    )
    .unwrap();

    env::set_var(ENV_CONFIG_PATH, file.path());
    let config = config::resolve().unwrap();
    env::remove_var(ENV_CONFIG_PATH);

    assert_eq!(config.url, "http://archiver.example.org");
    assert_eq!(config.data_url(), "http://archiver.example.org:17668");
    assert_eq!(config.source.as_deref(), Some(file.path()));
}

#[test]
fn unreadable_env_override_is_fatal_not_a_fallback() {
    let _guard = ENV_LOCK.lock().unwrap();

    env::set_var(ENV_CONFIG_PATH, "/nonexistent/archappl/config.toml");
    let result = config::resolve();
    env::remove_var(ENV_CONFIG_PATH);

    assert!(matches!(result, Err(config::ConfigError::Io { .. })));
}

#[test]
fn malformed_env_override_is_fatal_not_a_fallback() {
    let _guard = ENV_LOCK.lock().unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "[main\nbroken").unwrap();

    env::set_var(ENV_CONFIG_PATH, file.path());
    let result = config::resolve();
    env::remove_var(ENV_CONFIG_PATH);

    assert!(matches!(result, Err(config::ConfigError::Parse { .. })));
}

#[test]
fn bundled_default_backstops_resolution() {
    let _guard = ENV_LOCK.lock().unwrap();
    env::remove_var(ENV_CONFIG_PATH);

    // No per-user or system file exists in the test environment, so
    // resolution lands on the bundled default.
    let config = config::resolve().unwrap();
    assert_eq!(config.source, None);
    assert_eq!(config.url, "http://127.0.0.1");
    assert_eq!(config.admin_url(), "http://127.0.0.1:17665");
    assert_eq!(config.default_window, Duration::from_secs(3600));
}

#[test]
fn explicit_load_honors_cli_section() {
    let _guard = ENV_LOCK.lock().unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
        [main]
        use = "lab"

        [lab]
        url = "http://10.0.0.5"
        admin_port = 17665
        timeout = "5s"

        [cli.get]
        default_window = "15m"
        "#
    )
    .unwrap();

    let config = config::load(file.path()).unwrap();
    assert_eq!(config.timeout, Duration::from_secs(5));
    assert_eq!(config.default_window, Duration::from_secs(900));
    assert_eq!(config.admin_url(), "http://10.0.0.5:17665");
    assert_eq!(config.data_url(), "http://10.0.0.5");
}
