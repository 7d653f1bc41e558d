
use e2e_harness::{ServeHarness, TestResult};
use serde_json::{Value, json};
use std::time::Duration;

const DRY_RUN_CONFIG: &str = r#"
[broadcast]
default_delay_secs = 1

[provider]
kind = "dry-run"

[provider.dry_run]
pair_after_ms = 50
send_latency_ms = 0
fail_numbers = ["628999999"]
"#;

#[tokio::test]
async fn serve_pairs_and_runs_a_broadcast_over_http() -> TestResult<()> {
    let harness = ServeHarness::spawn(DRY_RUN_CONFIG).await?;

    let idle = harness.status().await?;
    assert_eq!(idle["status"], "idle");
    assert_eq!(idle["message"], "WhatsApp is idle.");

    let rejected = harness
        .request_json(
            reqwest::Method::POST,
            "/api/broadcast/start",
            Some(json!({ "numbers": "628111111", "message": "Hi" })),
        )
        .await?;
    assert_eq!(rejected["code"], "not_connected");

    let connect = harness
        .request_json(reqwest::Method::POST, "/api/connect", None)
        .await?;
    assert_eq!(connect["success"], true);
    harness
        .wait_for_status("connected", Duration::from_secs(10))
        .await?;

    let started = harness
        .request_json(
            reqwest::Method::POST,
            "/api/broadcast/start",
            Some(json!({
                "numbers": "+62 811-1111\n628999999\n62811",
                "message": "Flash sale",
                "buttons": [{ "type": "reply", "displayText": "Interested" }],
                "delay": 1
            })),
        )
        .await?;
    assert_eq!(started["success"], true, "{}", started);
    assert_eq!(started["total"], 2);

    let finished = harness
        .wait_for_status("finished", Duration::from_secs(20))
        .await?;
    assert_eq!(finished["message"], "Broadcast completed with 1 failure(s).");
    assert_eq!(finished["progress"]["current"], 2);
    assert_eq!(finished["broadcasting"], false);

    let closed = harness
        .request_json(reqwest::Method::POST, "/api/close", None)
        .await?;
    assert_eq!(closed["closed"], true);
    harness
        .wait_for_status("connected", Duration::from_secs(5))
        .await?;
    Ok(())
}

#[tokio::test]
async fn serve_normalizes_and_stores_templates() -> TestResult<()> {
    let harness = ServeHarness::spawn(DRY_RUN_CONFIG).await?;

    let normalized = harness
        .request_json(
            reqwest::Method::POST,
            "/api/recipients/normalize",
            Some(json!({ "text": "0812-3456-789\n0812 3456 789\nabc\n1234" })),
        )
        .await?;
    assert_eq!(normalized["count"], 1);
    assert_eq!(normalized["numbers"], json!(["08123456789"]));

    let saved = harness
        .request_json(
            reqwest::Method::POST,
            "/api/templates",
            Some(json!({ "name": "Promo", "message": "Sale!", "footer": "Reply STOP" })),
        )
        .await?;
    let id = saved["template"]["id"].as_str().unwrap_or_default().to_string();
    assert!(id.starts_with("template-"), "{}", saved);

    let listed = harness
        .request_json(reqwest::Method::GET, "/api/templates", None)
        .await?;
    let names: Vec<&str> = listed["templates"]
        .as_array()
        .map(|all| all.iter().filter_map(|t| t["name"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(names, vec!["Promo"]);
    assert!(harness.data_dir().join("templates.db").exists());

    let deleted = harness
        .request_json(
            reqwest::Method::DELETE,
            &format!("/api/templates/{}", id),
            None,
        )
        .await?;
    assert_eq!(deleted["success"], Value::Bool(true));
    Ok(())
}
