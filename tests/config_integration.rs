use docuchat::config::AppConfig;
use serial_test::serial;
use std::env;
use std::fs;

// Helper to clear environment variables that might interfere with tests
fn clear_env_vars() {
    unsafe {
        env::remove_var("DOCUCHAT_SERVER__PORT");
        env::remove_var("DOCUCHAT_RAG__MAX_DOCUMENTS");
        env::remove_var("DOCUCHAT_RAG__HISTORY_WINDOW");
        env::remove_var("CONFIG_FILE");
        env::remove_var("PORT");
        env::remove_var("HOST");
        env::remove_var("UPLOAD_ROOT");
        env::remove_var("UNSTRUCTURED_API_URL");
    }
}

#[test]
#[serial]
fn test_default_config() {
    clear_env_vars();

    let config = AppConfig::load_from_args(["docuchat"]).expect("defaults should load");
    assert_eq!(config.server.port, 3000);
    assert_eq!(config.rag.max_documents, 10);
    assert_eq!(config.rag.history_window, 6);
    assert_eq!(config.rag.chunk_max_characters, 500);
    assert_eq!(config.session.timeout_secs, 1800);
    assert!(config.partition.unstructured_api_url.is_none());
}

#[test]
#[serial]
fn test_env_override() {
    clear_env_vars();
    unsafe {
        env::set_var("DOCUCHAT_SERVER__PORT", "9090");
        env::set_var("DOCUCHAT_RAG__MAX_DOCUMENTS", "3");
    }

    let config = AppConfig::load_from_args(["docuchat"]).expect("Failed to load config");
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.rag.max_documents, 3);

    clear_env_vars();
}

#[test]
#[serial]
fn test_file_load() {
    clear_env_vars();

    let dir = tempfile::tempdir().expect("tempdir");
    let file_path = dir.path().join("docuchat.yaml");
    fs::write(
        &file_path,
        r"
server:
  port: 7070
rag:
  embedder: hashing
",
    )
    .expect("Failed to write temp config");

    let path = file_path.to_string_lossy().to_string();
    let config = AppConfig::load_from_args(["docuchat", "--config", path.as_str()])
        .expect("Failed to load config from file");
    assert_eq!(config.server.port, 7070);
    assert_eq!(config.rag.embedder, "hashing");
    assert_eq!(config.rag.retriever_k, 5);
}

#[test]
#[serial]
fn test_cli_overrides_env() {
    clear_env_vars();
    unsafe {
        env::set_var("DOCUCHAT_SERVER__PORT", "9090");
    }

    let config = AppConfig::load_from_args([
        "docuchat",
        "--port",
        "8181",
        "--unstructured-api-url",
        "http://localhost:8000/general/v0/general",
    ])
    .expect("Failed to load config");
    assert_eq!(config.server.port, 8181);
    assert_eq!(
        config.partition.unstructured_api_url.as_deref(),
        Some("http://localhost:8000/general/v0/general")
    );

    clear_env_vars();
}

#[test]
#[serial]
fn test_zero_history_window_is_rejected() {
    clear_env_vars();
    unsafe {
        env::set_var("DOCUCHAT_RAG__HISTORY_WINDOW", "0");
    }

    let err = AppConfig::load_from_args(["docuchat"]).unwrap_err();
    assert!(err.to_string().contains("rag.history_window"));

    clear_env_vars();
}
