//! Unit tests for configuration parsing, defaults, and validation.

use std::path::Path;
use std::time::Duration;

use agent_console::config::GlobalConfig;

fn sample_toml(root: &Path) -> String {
    format!(
        r#"
workspace_root = '{root}'
runtime = "python3"
adapter_script = "adapter.py"

[timeouts]
run_seconds = 60
grace_seconds = 2

[[scripts]]
label = "Default"
file = "run.py"
description = "Standard agent"

[[scripts]]
label = "Mini"
file = "run_mini.py"

[[examples]]
script = "Default"
question = "What is the capital of France?"

[[env_groups]]
name = "Model API"

[[env_groups.vars]]
name = "OPENAI_API_KEY"
label = "OpenAI key"
secret = true
required = true
"#,
        root = root.display()
    )
}

#[test]
fn parses_full_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = GlobalConfig::from_toml_str(&sample_toml(temp.path())).expect("valid config");

    assert_eq!(config.scripts.len(), 2);
    assert_eq!(config.scripts[0].description, "Standard agent");
    assert_eq!(config.scripts[1].description, "");
    assert_eq!(config.examples[0].script, "Default");
    assert_eq!(config.env_groups[0].vars[0].name, "OPENAI_API_KEY");
    assert!(config.env_groups[0].vars[0].secret);
    assert_eq!(config.run_timeout(), Duration::from_secs(60));
    assert_eq!(config.grace_period(), Duration::from_secs(2));
}

#[test]
fn defaults_apply_when_omitted() {
    let temp = tempfile::tempdir().expect("tempdir");
    let raw = format!(
        "workspace_root = '{}'\n[[scripts]]\nlabel = \"A\"\nfile = \"a.py\"\n",
        temp.path().display()
    );
    let config = GlobalConfig::from_toml_str(&raw).expect("valid config");

    assert_eq!(config.http_port, 7860);
    assert_eq!(config.bind_addr().to_string(), "127.0.0.1:7860");
    assert_eq!(config.runtime, "python3");
    assert_eq!(config.question_env_var, "OWL_QUESTION");
    assert_eq!(config.run_timeout(), Duration::from_secs(1800));
    assert_eq!(config.grace_period(), Duration::from_secs(5));
    assert_eq!(config.poll_interval(), Duration::from_millis(100));
    assert!(config.adapter_path().is_none());
}

#[test]
fn relative_paths_resolve_against_workspace_root() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = GlobalConfig::from_toml_str(&sample_toml(temp.path())).expect("valid config");
    let root = temp.path().canonicalize().expect("canonical");

    assert_eq!(config.workspace_root, root);
    assert_eq!(config.logs_path(), root.join("logs"));
    assert_eq!(config.env_file_path(), root.join(".env"));
    assert_eq!(
        config.script_path(&config.scripts[1]),
        root.join("owl").join("run_mini.py")
    );
    assert_eq!(config.adapter_path(), Some(root.join("adapter.py")));
}

#[test]
fn script_lookup_by_label() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = GlobalConfig::from_toml_str(&sample_toml(temp.path())).expect("valid config");

    assert_eq!(config.script("Mini").map(|s| s.file.as_str()), Some("run_mini.py"));
    assert!(config.script("mini").is_none());
}

#[test]
fn missing_scripts_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let raw = format!("workspace_root = '{}'\nscripts = []\n", temp.path().display());
    let err = GlobalConfig::from_toml_str(&raw).unwrap_err();
    assert!(err.to_string().contains("at least one script"));
}

#[test]
fn duplicate_labels_are_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let raw = format!(
        "workspace_root = '{}'\n[[scripts]]\nlabel = \"A\"\nfile = \"a.py\"\n[[scripts]]\nlabel = \"A\"\nfile = \"b.py\"\n",
        temp.path().display()
    );
    let err = GlobalConfig::from_toml_str(&raw).unwrap_err();
    assert!(err.to_string().contains("duplicate script label"));
}

#[test]
fn example_for_unknown_script_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let raw = format!(
        "workspace_root = '{}'\n[[scripts]]\nlabel = \"A\"\nfile = \"a.py\"\n[[examples]]\nscript = \"B\"\nquestion = \"q\"\n",
        temp.path().display()
    );
    let err = GlobalConfig::from_toml_str(&raw).unwrap_err();
    assert!(err.to_string().contains("unknown script"));
}

#[test]
fn zero_run_budget_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let raw = format!(
        "workspace_root = '{}'\n[timeouts]\nrun_seconds = 0\n[[scripts]]\nlabel = \"A\"\nfile = \"a.py\"\n",
        temp.path().display()
    );
    assert!(GlobalConfig::from_toml_str(&raw).is_err());
}

#[test]
fn missing_workspace_root_is_rejected() {
    let raw = "workspace_root = '/definitely/not/a/real/dir'\n[[scripts]]\nlabel = \"A\"\nfile = \"a.py\"\n";
    let err = GlobalConfig::from_toml_str(raw).unwrap_err();
    assert!(err.to_string().starts_with("config: workspace_root invalid"));
}

#[test]
fn load_from_path_reads_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("config.toml");
    std::fs::write(&path, sample_toml(temp.path())).expect("write config");

    let config = GlobalConfig::load_from_path(&path).expect("load");
    assert_eq!(config.scripts[0].label, "Default");
}

#[test]
fn load_from_missing_path_fails() {
    let err = GlobalConfig::load_from_path("/no/such/config.toml").unwrap_err();
    assert!(err.to_string().contains("failed to read config"));
}
