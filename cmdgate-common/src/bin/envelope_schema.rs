// ABOUTME: emits the json schema for both request envelope variants to stdout.
// ABOUTME: intended for client generators and external request validators.

fn main() {
    let schema = serde_json::json!({
        "flat": schemars::schema_for!(cmdgate_common::FlatRequest),
        "transcript": schemars::schema_for!(cmdgate_common::TranscriptRequest),
    });
    let json = serde_json::to_string_pretty(&schema).expect("serialize schema");
    println!("{json}");
}
