mod common;

use common::steps;
use pretty_assertions::assert_eq;
use scenario_engine::eval::template::resolve_template;
use scenario_engine::{
    execute_steps, invoke_keyword, EvalError, ExecutionContext, KeywordDefinition, StepFlow,
};
use serde_json::{json, Value};

fn register(ctx: &ExecutionContext, name: &str, params: &[&str], body: Value) {
    let definition = KeywordDefinition::new(
        name,
        params.iter().map(|p| p.to_string()).collect(),
        steps(body),
    );
    ctx.keywords().register(name, definition).unwrap();
}

fn dive(ctx: &ExecutionContext) {
    register(
        ctx,
        "dive",
        &["n"],
        json!([
            {"if": "n < limit", "then": [{"run": "dive", "args": ["{{n + 1}}"]}], "else": [{"set": {"deepest": "{{n}}"}}]}
        ]),
    );
}

#[tokio::test]
async fn test_recursion_reaches_max_depth() {
    let ctx = ExecutionContext::default();
    dive(&ctx);
    ctx.set_variable("limit", json!(10));
    execute_steps(&steps(json!([{"run": "dive", "args": [1]}])), &ctx)
        .await
        .unwrap();
    assert_eq!(ctx.get_variable("deepest"), Some(json!(10)));
    assert_eq!(ctx.depth(), 0);
}

#[tokio::test]
async fn test_recursion_past_max_depth_fails() {
    let ctx = ExecutionContext::default();
    dive(&ctx);
    ctx.set_variable("limit", json!(11));
    let err = execute_steps(&steps(json!([{"run": "dive", "args": [1]}])), &ctx)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "RecursionLimitError");
    assert!(matches!(
        err.root_cause(),
        EvalError::RecursionLimit { max_depth: 10, .. }
    ));
    assert!(err.to_string().contains("keyword 'dive'"));
}

#[tokio::test]
async fn test_direct_invoke_returns_value() {
    let ctx = ExecutionContext::default();
    register(&ctx, "greet", &["who"], json!([{"return": "hello {{who}}"}]));
    let value = invoke_keyword("greet", vec![json!("bob")], &ctx).await.unwrap();
    assert_eq!(value, json!("hello bob"));

    let err = invoke_keyword("missing", vec![], &ctx).await.unwrap_err();
    assert_eq!(err.kind(), "UnknownKeywordError");
}

#[tokio::test]
async fn test_scope_restored_on_every_exit() {
    let ctx = ExecutionContext::default();
    ctx.set_variable("user", json!("outer"));
    register(&ctx, "normal", &["user"], json!([{"let": {"scratch": 1}}, {"log": "{{user}}"}]));
    register(&ctx, "early", &["user"], json!([{"return": "{{user}}"}, {"log": "unreachable"}]));
    register(&ctx, "failing", &["user"], json!([{"assert": "user == 'nobody'"}]));

    let flow = execute_steps(
        &steps(json!([
            {"run": "normal", "args": ["inner"]},
            {"assert": "user == 'outer'"},
            {"run": "early", "args": ["inner"], "returns": "echoed"},
            {"assert": "user == 'outer'"},
            {"try": [{"run": "failing", "args": ["inner"]}], "catch": [{"log": "{{error.kind}}"}]},
            {"assert": "user == 'outer'"},
            {"echo": "{{echoed}}"}
        ])),
        &ctx,
    )
    .await
    .unwrap();
    assert_eq!(flow, StepFlow::Continue(json!("inner")));
    assert_eq!(ctx.get_variable("scratch"), None);
    assert_eq!(ctx.depth(), 0);
}

#[tokio::test]
async fn test_keyword_returns_stay_in_frame() {
    let ctx = ExecutionContext::default();
    ctx.set_variable("total", json!(1));
    register(
        &ctx,
        "tally",
        &["amount"],
        json!([
            {"echo": "{{amount * 2}}", "returns": "total"},
            {"echo": "{{total + 1}}", "returns": "next"},
            {"return": "{{next}}"}
        ]),
    );

    let flow = execute_steps(&steps(json!([{"run": "tally", "args": [5], "returns": "result"}])), &ctx)
        .await
        .unwrap();
    assert_eq!(flow, StepFlow::Continue(json!(11)));
    assert_eq!(ctx.get_variable("result"), Some(json!(11)));
    assert_eq!(ctx.get_variable("total"), Some(json!(1)));
    assert_eq!(ctx.get_variable("next"), None);
}

#[tokio::test]
async fn test_template_idempotence() {
    let ctx = ExecutionContext::default();
    ctx.set_variable("to", json!("bob"));
    ctx.set_variable("amount", json!(5));

    let plain = "no placeholders here";
    assert_eq!(resolve_template(plain, &ctx), plain);

    let once = resolve_template("pay {{to}} {{amount}} {{missing}}", &ctx);
    assert_eq!(once, "pay bob 5 {{missing}}");
    assert_eq!(resolve_template(&once, &ctx), once);
}

#[tokio::test]
async fn test_loop_determinism() {
    let body = steps(json!([
        {"set": {"order": ""}},
        {"foreach": {"item": "c", "index": "i", "in": ["x", "y", "z"], "do": [
            {"set": {"order": "{{order + c + i}}"}}
        ]}},
        {"echo": "{{order}}"}
    ]));
    let mut outcomes = Vec::new();
    for _ in 0..3 {
        let ctx = ExecutionContext::default();
        outcomes.push(execute_steps(&body, &ctx).await.unwrap().into_value());
    }
    assert_eq!(outcomes, vec![json!("x0y1z2"); 3]);
}

#[tokio::test]
async fn test_while_end_to_end() {
    let ctx = ExecutionContext::default();
    let flow = execute_steps(
        &steps(json!([
            {"set": {"x": 1}},
            {"while": {"condition": {"and": ["x < 4", {"not": false}]}, "do": [
                {"set": {"x": "{{x + 1}}"}}
            ]}, "returns": "iterations"},
            {"assert": "x == 4"}
        ])),
        &ctx,
    )
    .await
    .unwrap();
    assert_eq!(flow, StepFlow::Continue(json!(true)));
    assert_eq!(ctx.get_variable("iterations"), Some(json!(3)));
}

#[tokio::test]
async fn test_unknown_action_and_operator() {
    let ctx = ExecutionContext::default();
    let err = execute_steps(&steps(json!([{"teleport": {"to": "mars"}}])), &ctx)
        .await
        .unwrap_err();
    match err.root_cause() {
        EvalError::UnknownAction { keys } => assert_eq!(keys, &vec!["teleport".to_string()]),
        other => panic!("unexpected error {other}"),
    }

    let err = execute_steps(&steps(json!([{"assert": "1 <> 2"}])), &ctx)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("step 1"));
}

#[tokio::test]
async fn test_catch_binding_shape() {
    let ctx = ExecutionContext::default();
    let flow = execute_steps(
        &steps(json!([
            {"try": [{"assert": {"condition": false, "message": "balance too low"}}],
             "catch": [{"return": "{{error.kind}}: {{error.message}}"}],
             "finally": [{"set": {"cleaned": true}}]}
        ])),
        &ctx,
    )
    .await
    .unwrap();
    assert_eq!(
        flow,
        StepFlow::Return(json!("AssertionError: assertion failed: balance too low"))
    );
    assert_eq!(ctx.get_variable("cleaned"), Some(json!(true)));
}
