//! Tests for loop configuration loading.

use std::io::Write;

use pretty_assertions::assert_eq;

use orbit::agent_loop::ToolExecutionMode;
use orbit::config::{ConversationStrategy, LoopConfig, DEFAULT_MAX_CYCLES};
use orbit::error::OrbitError;

#[test]
fn loads_a_toml_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
max_cycles = 12
tool_execution = "sequential"
system_prompt = "You are terse."

[conversation]
strategy = "summarizing"
summary_ratio = 0.5
preserve_recent_messages = 4
max_context_tokens = 8000
"#
    )
    .unwrap();

    let config = LoopConfig::load(file.path()).unwrap();

    assert_eq!(config.max_cycles, 12);
    assert_eq!(config.tool_execution, ToolExecutionMode::Sequential);
    assert_eq!(config.system_prompt.as_deref(), Some("You are terse."));
    assert_eq!(config.conversation.strategy, ConversationStrategy::Summarizing);
    assert_eq!(config.conversation.summary_ratio, 0.5);
    assert_eq!(config.conversation.preserve_recent_messages, 4);
    assert_eq!(config.conversation.max_context_tokens, Some(8000));
    // Unspecified keys keep their defaults.
    assert_eq!(config.conversation.window_size, 40);
    assert!(config.conversation.truncate_tool_results);
}

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = LoopConfig::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, LoopConfig::default());
    assert_eq!(config.max_cycles, DEFAULT_MAX_CYCLES);
}

#[test]
fn malformed_file_is_a_configuration_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "max_cycles = \"many\"").unwrap();

    let err = LoopConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, OrbitError::Configuration(_)));
}

#[test]
fn toml_round_trip_preserves_settings() {
    let config = LoopConfig::builder()
        .max_cycles(5)
        .tool_execution(ToolExecutionMode::Sequential)
        .system_prompt("be brief")
        .build();

    let raw = config.to_toml_string().unwrap();
    assert_eq!(LoopConfig::from_toml_str(&raw).unwrap(), config);
}
