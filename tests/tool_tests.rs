//! Tests for tool definitions, argument access and the registry.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use orbit::error::OrbitError;
use orbit::tools::tool::output_to_content;
use orbit::tools::*;
use orbit::types::ToolResultContent;

fn noop(name: &str) -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        name,
        "does nothing",
        AgentToolParameters::empty(),
        |_args, _ctx| async { Ok(serde_json::Value::Null) },
    ))
}

#[test]
fn optional_parameters_are_left_out_of_required() {
    let params = AgentToolParameters::object()
        .string("path", "File to read", true)
        .number("offset", "Byte offset", false)
        .boolean("follow", "Follow symlinks", false)
        .build();

    assert_eq!(params.schema["required"], json!(["path"]));
    assert_eq!(params.schema["properties"]["offset"]["type"], "number");
    assert_eq!(
        params.schema["properties"]["follow"]["description"],
        "Follow symlinks"
    );
}

#[test]
fn raw_schema_is_advertised_verbatim() {
    let schema = json!({
        "type": "object",
        "properties": {"unit": {"type": "string", "enum": ["c", "f"]}},
        "required": ["unit"],
    });
    let tool = AgentTool::new(
        "weather",
        "Current temperature",
        AgentToolParameters::from_schema(schema.clone()),
        |_args, _ctx| async { Ok(json!(21)) },
    );

    assert_eq!(tool.spec().parameters, schema);
}

#[test]
fn string_encoded_input_deserializes_like_an_object() {
    #[derive(serde::Deserialize, PartialEq, Debug)]
    struct Move {
        from: String,
        to: String,
    }

    let encoded = ToolArguments::new(json!(r#"{"from": "a.txt", "to": "b.txt"}"#));
    let direct = ToolArguments::new(json!({"from": "a.txt", "to": "b.txt"}));

    let expected = Move {
        from: "a.txt".into(),
        to: "b.txt".into(),
    };
    assert_eq!(encoded.deserialize::<Move>().unwrap(), expected);
    assert_eq!(direct.deserialize::<Move>().unwrap(), expected);
}

#[test]
fn missing_typed_argument_is_an_invalid_argument() {
    let args = ToolArguments::new(json!({"count": "three"}));
    assert!(matches!(args.get_i64("count"), Err(OrbitError::InvalidArgument(_))));
    assert!(matches!(args.get_bool("dry_run"), Err(OrbitError::InvalidArgument(_))));
    assert_eq!(args.get_str_opt("count"), Some("three"));
}

#[test]
fn tool_output_maps_onto_result_content() {
    assert_eq!(
        output_to_content(json!("done")),
        vec![ToolResultContent::Text("done".into())]
    );
    assert!(output_to_content(serde_json::Value::Null).is_empty());
    assert_eq!(
        output_to_content(json!([1, 2])),
        vec![ToolResultContent::Json(json!([1, 2]))]
    );
}

#[tokio::test]
async fn tool_sees_its_call_identity_and_cancellation() {
    let tool = AgentTool::new(
        "wait",
        "Waits until cancelled",
        AgentToolParameters::empty(),
        |_args, ctx| async move {
            tokio::select! {
                _ = ctx.cancel.cancelled() => Ok(json!(format!("{} cancelled", ctx.tool_use_id))),
                _ = tokio::time::sleep(Duration::from_secs(30)) => Ok(json!("timed out")),
            }
        },
    );
    let cancel = CancellationToken::new();
    let ctx = ToolExecutionContext {
        tool_use_id: "call-9".into(),
        tool_name: "wait".into(),
        cancel: cancel.clone(),
        metadata: serde_json::Value::Null,
    };

    cancel.cancel();
    let out = tool.execute(&ToolArguments::new(json!({})), &ctx).await.unwrap();

    assert_eq!(out, json!("call-9 cancelled"));
}

#[test]
fn return_direct_is_opt_in_per_tool() {
    let plain = AgentTool::new(
        "lookup",
        "Look something up",
        AgentToolParameters::empty(),
        |_args, _ctx| async { Ok(serde_json::Value::Null) },
    );
    assert!(!plain.return_direct());
    assert!(plain.with_return_direct(true).return_direct());
}

#[test]
fn registry_replaces_duplicates_in_place() {
    let mut registry = StaticToolRegistry::new(vec![noop("b"), noop("a")]);
    registry.register(noop("c"));
    registry.register(noop("b"));

    assert_eq!(registry.len(), 3);
    assert!(registry.resolve("zzz").is_none());
    let names: Vec<String> = registry.specs().into_iter().map(|spec| spec.name).collect();
    assert_eq!(names, vec!["b", "a", "c"]);
}
