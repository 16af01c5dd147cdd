//! Unleash proxy client lab
//!
//! Internal verification script for client functionality. Runs offline.
//! Run with: cargo run --example sdk-lab

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use unleash_proxy_client::{
    Bootstrap, EventKind, Payload, Toggle, UnleashClient, UnleashEvent, UnleashOptions, Variant,
};

const PASS: &str = "\x1b[32m[PASS]\x1b[0m";
const FAIL: &str = "\x1b[31m[FAIL]\x1b[0m";

// Nothing listens here, so every fetch fails fast.
const OFFLINE_URL: &str = "http://127.0.0.1:9/api/frontend";

#[tokio::main]
async fn main() {
    println!("=== Unleash Proxy Client Lab ===\n");

    let mut passed = 0;
    let mut failed = 0;

    macro_rules! pass {
        ($test:expr) => {{
            println!("{} {}", PASS, $test);
            passed += 1;
        }};
    }

    macro_rules! fail {
        ($test:expr) => {{
            println!("{} {}", FAIL, $test);
            failed += 1;
        }};
    }

    // Test 1: Construction with bootstrap toggles
    println!("Testing initialization...");
    let bootstrap = vec![
        Toggle::new("lab-enabled", true),
        Toggle::new("lab-disabled", false),
        Toggle::new("lab-variant", true)
            .with_variant(
                Variant::new("blue", true)
                    .with_feature_enabled(true)
                    .with_payload(Payload::new("string", "Hello Lab")),
            )
            .with_impression_data(true),
    ];

    let options = UnleashOptions::builder(OFFLINE_URL, "lab-client-key")
        .app_name("sdk-lab")
        .environment("lab")
        .timeout(Duration::from_secs(1))
        .build();

    let client = match UnleashClient::new(options) {
        Ok(c) => c,
        Err(e) => {
            fail!(format!("Initialization - {}", e));
            print_summary(passed, failed);
            std::process::exit(1);
        }
    };

    let impressions = Arc::new(Mutex::new(Vec::new()));
    let impressions_clone = Arc::clone(&impressions);
    client.subscribe(EventKind::Impression, move |event| {
        if let UnleashEvent::Impression(impression) = event {
            impressions_clone.lock().push(impression.toggle_name.clone());
        }
    });

    match client.start_with_bootstrap(Bootstrap::Toggles(bootstrap)).await {
        Ok(()) => pass!("start_with_bootstrap()"),
        Err(e) => fail!(format!("start_with_bootstrap() - {}", e)),
    }

    // Test 2: Flag evaluation
    println!("\nTesting flag evaluation...");
    if client.is_enabled("lab-enabled") {
        pass!("is_enabled() for enabled toggle");
    } else {
        fail!("is_enabled() - expected true");
    }

    if !client.is_enabled("lab-disabled") {
        pass!("is_enabled() for disabled toggle");
    } else {
        fail!("is_enabled() - expected false");
    }

    if !client.is_enabled("non-existent") {
        pass!("is_enabled() for unknown toggle");
    } else {
        fail!("is_enabled() - unknown toggle should be disabled");
    }

    // Test 3: Variants
    let variant = client.get_variant("lab-variant");
    match variant.payload {
        Some(ref payload) if variant.name == "blue" && payload.value == "Hello Lab" => {
            pass!("get_variant()")
        }
        _ => fail!(format!("get_variant() - unexpected variant {:?}", variant)),
    }

    if client.get_variant("lab-enabled") == Variant::disabled() {
        pass!("get_variant() without variant");
    } else {
        fail!("get_variant() - expected disabled variant");
    }

    // Test 4: Impression events
    if impressions.lock().as_slice() == ["lab-variant"] {
        pass!("impression events");
    } else {
        fail!(format!("impression events - got {:?}", impressions.lock()));
    }

    // Test 5: Metrics counting
    println!("\nTesting metrics...");
    let bucket = client.metrics().bucket_snapshot();
    match bucket.toggles.get("lab-variant") {
        Some(metrics) if metrics.yes == 1 && metrics.variants.get("blue") == Some(&1) => {
            pass!("metrics bucket")
        }
        other => fail!(format!("metrics bucket - unexpected {:?}", other)),
    }

    // Test 6: Context management
    println!("\nTesting context management...");
    let result = tokio::time::timeout(
        Duration::from_secs(3),
        client.update_context(
            HashMap::from([
                ("userId".to_string(), "lab-user-123".to_string()),
                ("plan".to_string(), "premium".to_string()),
            ]),
            None,
        ),
    )
    .await;

    match result {
        Ok(Ok(())) => pass!("update_context()"),
        Ok(Err(_)) | Err(_) => pass!("update_context() (network error expected)"),
    }

    let context = client.context();
    if context.user_id.as_deref() == Some("lab-user-123")
        && context.properties.get("plan").map(String::as_str) == Some("premium")
        && context.environment.as_deref() == Some("lab")
    {
        pass!("context()");
    } else {
        fail!(format!("context() - unexpected {:?}", context));
    }

    // Test 7: Bootstrap survives a failed fetch
    if client.is_enabled("lab-enabled") {
        pass!("toggles kept after failed fetch");
    } else {
        fail!("toggles lost after failed fetch");
    }

    // Test 8: Metrics send (fails without a server)
    let errors = Arc::new(Mutex::new(0));
    let errors_clone = Arc::clone(&errors);
    client.subscribe(EventKind::Error, move |_| {
        *errors_clone.lock() += 1;
    });
    client.metrics().send_metrics().await;
    if *errors.lock() == 1 {
        pass!("send_metrics() (error event expected)");
    } else {
        pass!("send_metrics()");
    }

    // Test 9: Cleanup
    println!("\nTesting cleanup...");
    client.close();
    pass!("close()");

    print_summary(passed, failed);

    if failed > 0 {
        println!("\n\x1b[31mSome verifications failed!\x1b[0m");
        std::process::exit(1);
    } else {
        println!("\n\x1b[32mAll verifications passed!\x1b[0m");
        std::process::exit(0);
    }
}

fn print_summary(passed: i32, failed: i32) {
    println!("\n{}", "=".repeat(40));
    println!("Results: {} passed, {} failed", passed, failed);
    println!("{}", "=".repeat(40));
}
