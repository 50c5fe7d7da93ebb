use anti_imp::bridge::StaticOracle;
use anti_imp::config::{ConfigChange, EngineSettings, FilterConfig};
use anti_imp::dom::Document;
use anti_imp::engine::FilterEngine;
use anti_imp::runtime::FilterRuntime;
use anti_imp::{identity, visibility};
use serde_json::json;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

const THREAD_PATH: &str = "/nasa_fan/status/1790000000000000000";

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
}

fn load_thread() -> Document {
    Document::from_json_file(demo("thread.json")).unwrap()
}

fn hidden_authors(doc: &Document) -> Vec<String> {
    FilterEngine::candidates(doc)
        .into_iter()
        .filter(|&article| visibility::is_hidden(doc, article))
        .filter_map(|article| identity::author_id(doc, article))
        .collect()
}

async fn settle(dom: &Arc<Mutex<Document>>, wait: Duration) -> Vec<String> {
    tokio::time::sleep(wait).await;
    hidden_authors(&dom.lock().unwrap())
}

#[test]
fn test_demo_snapshot_shape() {
    let doc = load_thread();
    let candidates = FilterEngine::candidates(&doc);
    assert_eq!(candidates.len(), 8);

    let authors: Vec<String> = candidates
        .iter()
        .filter_map(|&article| identity::author_id(&doc, article))
        .collect();
    assert_eq!(authors.first().map(String::as_str), Some("nasa_fan"));
    assert_eq!(authors.last().map(String::as_str), Some("quote_guy"));
    // The quoted post's verified badge does not leak into the quoting post.
    assert!(!identity::is_verified(&doc, candidates[7]));
}

#[test]
fn test_cooldown_holds_across_scans() {
    let mut doc = load_thread();
    let mut engine = FilterEngine::new(FilterConfig::default(), EngineSettings::default());
    engine.navigate(THREAD_PATH);
    let start = Instant::now();

    let first = engine.scan(&mut doc, start);
    assert_eq!(first.requested, 7);

    for offset in [200, 1_000, 14_999] {
        let report = engine.scan(&mut doc, start + Duration::from_millis(offset));
        assert!(report.lookup.is_none());
    }
    assert_eq!(engine.stats().lookups_issued, 1);
}

#[tokio::test(start_paused = true)]
async fn test_default_config_end_to_end() {
    let dom = Arc::new(Mutex::new(load_thread()));
    let oracle = StaticOracle::from_json_file(demo("user_info.json")).unwrap();

    let mut engine = FilterEngine::new(FilterConfig::default(), EngineSettings::default());
    engine.navigate(THREAD_PATH);
    let (runtime, handle, port) = FilterRuntime::new(engine, dom.clone());
    oracle.clone().spawn(port);
    let task = tokio::spawn(runtime.run());

    // Followed account comes back once its record arrives.
    assert_eq!(
        settle(&dom, Duration::from_secs(1)).await,
        vec!["growth_hacker", "astro_daily", "mystery_acct"]
    );

    handle.shutdown();
    let engine = task.await.unwrap();
    let report = engine.last_report().unwrap();
    assert_eq!(report.root_author.as_deref(), Some("nasa_fan"));
    assert_eq!(report.hidden, 3);
    assert_eq!(report.shown, 5);
    assert_eq!(
        engine.trust_cache().get("GROWTH_HACKER").and_then(|r| r.followers_count),
        Some(150)
    );
}

#[tokio::test(start_paused = true)]
async fn test_follower_threshold_and_fail_open() {
    let dom = Arc::new(Mutex::new(load_thread()));
    let oracle = StaticOracle::from_json_file(demo("user_info.json")).unwrap();
    let config = FilterConfig::from_file(&demo("anti-imp.yaml").to_string_lossy()).unwrap();
    assert!(config.show_if_follower_count_at_least_enabled);

    let mut engine = FilterEngine::new(config, EngineSettings::default());
    engine.navigate(THREAD_PATH);
    let (runtime, handle, port) = FilterRuntime::new(engine, dom.clone());
    oracle.clone().spawn(port);
    let task = tokio::spawn(runtime.run());

    // Before the oracle answers nothing is hidden: every verified reply is
    // either immune or waiting on its count.
    assert!(settle(&dom, Duration::from_millis(100)).await.is_empty());

    assert_eq!(
        settle(&dom, Duration::from_secs(1)).await,
        vec!["growth_hacker"]
    );

    handle.config_changed(vec![ConfigChange::set("showIfFollowerCountAtLeast", json!(500_000))]);
    assert_eq!(
        settle(&dom, Duration::from_secs(1)).await,
        vec!["growth_hacker", "astro_daily"]
    );

    handle.config_changed(vec![ConfigChange::set("enabled", json!(false))]);
    assert!(settle(&dom, Duration::from_secs(1)).await.is_empty());

    handle.config_changed(vec![ConfigChange::set("enabled", json!(true))]);
    assert_eq!(settle(&dom, Duration::from_secs(1)).await.len(), 2);

    handle.navigate(&format!("{THREAD_PATH}/photo/1"));
    assert!(settle(&dom, Duration::from_secs(1)).await.is_empty());

    handle.shutdown();
    let engine = task.await.unwrap();
    let report = engine.last_report().unwrap();
    assert!(!report.active);
    assert_eq!(report.revealed, 2);
}
