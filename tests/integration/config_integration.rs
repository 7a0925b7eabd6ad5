//! Workspace configuration feeding engine construction.

use mentor::config::{from_toml_str, ConfigLoader, ProviderType, ValidationError};
use mentor::error::ApiError;
use mentor::session::EngineModels;
use std::fs;
use tempfile::TempDir;

const WORKSPACE_CONFIG: &str = r#"
[providers.local-llama]
type = "ollama"
model = "llama3"
endpoint = "http://localhost:11434"

[providers.grader]
type = "ollama"
model = "qwen2"

[models]
tutor = "local-llama"
generator = "local-llama"
grader_primary = "grader"
grader_fallback = "local-llama"

[session]
final_test_size = 8
grading_timeout_secs = 30

[storage]
data_dir = "/tmp/mentor-data"
"#;

fn workspace_with(contents: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("config")).unwrap();
    fs::write(dir.path().join("config").join("config.toml"), contents).unwrap();
    dir
}

#[test]
fn test_workspace_config_builds_engine_models() {
    let workspace = workspace_with(WORKSPACE_CONFIG);
    let config = ConfigLoader::load(workspace.path()).unwrap();

    assert_eq!(config.providers["local-llama"].provider_type, ProviderType::Ollama);
    assert_eq!(config.models.grader_primary, "grader");
    assert_eq!(config.session.final_test_size, 8);
    assert_eq!(config.session.grading_timeout_secs, 30);
    assert!(config.validate().is_ok());

    let models = EngineModels::from_config(&config).unwrap();
    assert_eq!(models.grading.tiers.len(), 2);
}

#[test]
fn test_role_naming_missing_provider_is_rejected() {
    let config = from_toml_str(
        r#"
[providers.local-llama]
type = "ollama"
model = "llama3"

[models]
tutor = "local-llama"
generator = "local-llama"
grader_primary = "cloud-grader"
grader_fallback = "local-llama"
"#,
    )
    .unwrap();

    let errors = config.validate().unwrap_err();
    assert_eq!(
        errors,
        vec![ValidationError::Model(
            "grader_primary".to_string(),
            "unknown provider 'cloud-grader'".to_string()
        )]
    );
    assert!(matches!(config.ensure_valid(), Err(ApiError::ConfigError(_))));
    assert!(matches!(
        EngineModels::from_config(&config),
        Err(ApiError::ProviderNotConfigured(_))
    ));
}

#[test]
fn test_defaults_reference_unconfigured_default_provider() {
    let config = ConfigLoader::defaults().unwrap();
    assert!(config.providers.is_empty());
    assert_eq!(config.models.tutor, "default");
    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 4);
}
