use integrations::config::{ConfigError, ConfigLoader};
use std::{
    env, fs,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    unsafe {
        env::remove_var("INTEGRATIONS_PROFILE");
        env::remove_var("INTEGRATIONS_API_BIND_ADDR");
        env::remove_var("INTEGRATIONS_LOG_LEVEL");
        env::remove_var("INTEGRATIONS_DATABASE_URL");
        env::remove_var("INTEGRATIONS_OPERATOR_TOKEN");
        env::remove_var("INTEGRATIONS_OPERATOR_TOKENS");
        env::remove_var("INTEGRATIONS_OAUTH_CODE_TTL_SECONDS");
        env::remove_var("INTEGRATIONS_DISPATCHER_SWEEP_INTERVAL_SECONDS");
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

#[test]
fn loads_defaults_with_minimal_env() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "INTEGRATIONS_OPERATOR_TOKEN=tok\n");

    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let cfg = loader.load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8080");
    assert_eq!(cfg.oauth.code_ttl_seconds, 600);
    assert_eq!(cfg.oauth.access_token_ttl_seconds, 3600);
    assert_eq!(cfg.dispatcher.sweep_interval_seconds, 15);
    assert_eq!(cfg.dispatcher.concurrency, 8);
    assert_eq!(cfg.operator_tokens, vec!["tok".to_string()]);
    cfg.bind_addr().expect("default bind addr parses");
    clear_env();
}

#[test]
fn profile_file_overrides_base_file() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "INTEGRATIONS_PROFILE=staging\nINTEGRATIONS_API_BIND_ADDR=127.0.0.1:3000\nINTEGRATIONS_OPERATOR_TOKEN=tok\n",
    );
    write_env_file(
        &temp_dir,
        ".env.staging",
        "INTEGRATIONS_API_BIND_ADDR=127.0.0.1:4000\n",
    );

    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let cfg = loader.load().expect("layered config loads");

    assert_eq!(cfg.profile, "staging");
    assert_eq!(cfg.api_bind_addr, "127.0.0.1:4000");
    clear_env();
}

#[test]
fn process_env_wins_over_files() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "INTEGRATIONS_LOG_LEVEL=debug\nINTEGRATIONS_OPERATOR_TOKEN=tok\n",
    );

    unsafe {
        env::set_var("INTEGRATIONS_LOG_LEVEL", "warn");
    }

    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let cfg = loader.load().expect("config loads");

    assert_eq!(cfg.log_level, "warn");
    clear_env();
}

#[test]
fn operator_tokens_split_on_commas() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "INTEGRATIONS_OPERATOR_TOKENS=alpha, beta ,gamma\n",
    );

    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let cfg = loader.load().expect("config loads");

    assert_eq!(
        cfg.operator_tokens,
        vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()]
    );
    clear_env();
}

#[test]
fn missing_operator_tokens_is_an_error() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "INTEGRATIONS_LOG_LEVEL=debug\n");

    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let result = loader.load();

    assert!(matches!(result, Err(ConfigError::MissingOperatorTokens)));
    clear_env();
}

#[test]
fn out_of_bounds_lifetimes_are_rejected() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "INTEGRATIONS_OPERATOR_TOKEN=tok\nINTEGRATIONS_OAUTH_CODE_TTL_SECONDS=7200\n",
    );

    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let result = loader.load();

    assert!(matches!(
        result,
        Err(ConfigError::InvalidOAuthCodeTtl { value: 7200 })
    ));
    clear_env();
}

#[test]
fn sweeper_settings_load_from_env() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "INTEGRATIONS_OPERATOR_TOKEN=tok\nINTEGRATIONS_DISPATCHER_SWEEP_INTERVAL_SECONDS=5\nINTEGRATIONS_DISPATCHER_CLAIM_LEASE_SECONDS=30\nINTEGRATIONS_DISPATCHER_BATCH_SIZE=16\n",
    );

    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let cfg = loader.load().expect("config loads");

    assert_eq!(cfg.dispatcher.sweep_interval_seconds, 5);
    assert_eq!(cfg.dispatcher.claim_lease_seconds, 30);
    assert_eq!(cfg.dispatcher.batch_size, 16);
    clear_env();
}
