use certreq::{
    args::parse_req_args,
    config::{select_config_path, ConfigSource, CONFIG_ENV_VAR},
    crypto::{CollaboratorError, OpenSslBackend},
    workflow::Workflow,
    Error,
};
use std::{
    env,
    path::Path,
    sync::{Arc, Mutex, OnceLock},
};
use tempfile::tempdir;

// This mutex is necessary to avoid race condition between tests when setting/unsetting environment
// variables
static TEST_MUTEX: OnceLock<Arc<Mutex<()>>> = OnceLock::new();

#[test]
fn test_env_var_over_command_line() {
    let _mutex = TEST_MUTEX.get_or_init(|| Arc::new(Mutex::new(()))).lock();
    env::set_var(CONFIG_ENV_VAR, "/from/env.cnf");

    let selected = select_config_path(Some(Path::new("cli.cnf"))).unwrap(); //#[allow_ci]
    assert_eq!(selected.path, Path::new("/from/env.cnf"));
    assert_eq!(selected.source, ConfigSource::PrimaryEnv);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
fn test_empty_env_var_is_unset() {
    let _mutex = TEST_MUTEX.get_or_init(|| Arc::new(Mutex::new(()))).lock();
    env::set_var(CONFIG_ENV_VAR, "");

    let selected = select_config_path(Some(Path::new("cli.cnf"))).unwrap(); //#[allow_ci]
    assert_eq!(selected.source, ConfigSource::CommandLine);

    env::remove_var(CONFIG_ENV_VAR);
}

#[cfg(feature = "openssl-env-compat")]
#[test]
fn test_legacy_env_var() {
    use certreq::config::LEGACY_CONFIG_ENV_VAR;

    let _mutex = TEST_MUTEX.get_or_init(|| Arc::new(Mutex::new(()))).lock();
    env::remove_var(CONFIG_ENV_VAR);
    env::set_var(LEGACY_CONFIG_ENV_VAR, "/legacy.cnf");

    let selected = select_config_path(Some(Path::new("cli.cnf"))).unwrap(); //#[allow_ci]
    assert_eq!(selected.source, ConfigSource::LegacyEnv);

    env::set_var(CONFIG_ENV_VAR, "/primary.cnf");
    let selected = select_config_path(None).unwrap(); //#[allow_ci]
    assert_eq!(selected.source, ConfigSource::PrimaryEnv);

    env::remove_var(CONFIG_ENV_VAR);
    env::remove_var(LEGACY_CONFIG_ENV_VAR);
}

#[test]
fn test_env_var_config_not_found() {
    let _mutex = TEST_MUTEX.get_or_init(|| Arc::new(Mutex::new(()))).lock();
    let dir = tempdir().unwrap(); //#[allow_ci]
    let missing = dir.path().join("missing.cnf");
    env::set_var(CONFIG_ENV_VAR, missing.to_str().unwrap()); //#[allow_ci]

    let args = parse_req_args([
        "-key", "k.pem", "-subj", "CN=a", "-out", "o.pem",
    ])
    .unwrap(); //#[allow_ci]
    let mut backend = OpenSslBackend::new();
    let result = Workflow::new(&mut backend, Vec::new()).run(&args);

    // Check that the correct error is returned
    assert!(matches!(result, Err(Error::ConfigNotFound { .. })));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
fn test_env_var_config_used() {
    let _mutex = TEST_MUTEX.get_or_init(|| Arc::new(Mutex::new(()))).lock();
    let dir = tempdir().unwrap(); //#[allow_ci]
    let config = dir.path().join("env.cnf");
    let keyfile = dir.path().join("absent.key");
    std::fs::write(
        &config,
        format!("[req]\ndefault_keyfile = {}\n", keyfile.display()),
    )
    .unwrap(); //#[allow_ci]
    env::set_var(CONFIG_ENV_VAR, config.to_str().unwrap()); //#[allow_ci]

    let out = dir.path().join("o.pem");
    let args = parse_req_args([
        "-subj",
        "CN=a",
        "-out",
        out.to_str().unwrap(), //#[allow_ci]
    ])
    .unwrap(); //#[allow_ci]
    let mut backend = OpenSslBackend::new();
    let result = Workflow::new(&mut backend, Vec::new()).run(&args);

    // The key file named in the configuration is the one that was opened
    match result {
        Err(Error::Collaborator(CollaboratorError { message, .. })) => {
            assert!(message.contains("absent.key"))
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(!out.exists());

    env::remove_var(CONFIG_ENV_VAR);
}
