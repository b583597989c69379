// tests/storage_files.rs
//
// FileStore layout, round-trip of the JSON run file, the combined digest,
// per-post text files, run listing order and retention.

use chrono::{TimeZone, Utc};

use article_pipeline::analyze::PriorityTier;
use article_pipeline::storage::{render_combined, FileStore, PostStore, RunMetadata, StoredPost};

fn count_entries(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir).map(|rd| rd.count()).unwrap_or(0)
}

fn post(rank: u32, title: &str) -> StoredPost {
    StoredPost {
        rank,
        title: title.to_string(),
        source: "Wired".into(),
        link: format!("https://x.example/{rank}"),
        priority_score: 84.5,
        relevance_score: 8.0,
        text: format!("Post about {title}"),
        tier: PriorityTier::High,
        analysis_error: None,
    }
}

fn meta(run_id: &str, hour: u32) -> RunMetadata {
    RunMetadata {
        run_id: run_id.into(),
        started_at: Utc.with_ymd_and_hms(2025, 2, 3, hour, 15, 0).unwrap(),
        duration_secs: 12.5,
        articles_acquired: 9,
        articles_analyzed: 2,
        total_cost: 49.0,
        remaining_balance: 951.0,
        summary: Some("Agents are buying things.".into()),
    }
}

#[tokio::test]
async fn save_writes_json_and_digest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileStore::new(dir.path());
    let posts = vec![post(1, "Agents at checkout"), post(2, "Marketplace for agents")];

    let art = store.save(&posts, &meta("abc123", 9)).await.expect("save");
    assert_eq!(art.run_id, "abc123");
    assert_eq!(
        art.json_file,
        dir.path().join("json").join("posts_2025-02-03_09-15-00_abc123.json")
    );
    assert!(art.combined_text_file.ends_with("combined/posts_2025-02-03_09-15-00_abc123.txt"));

    let run = FileStore::load_run(&art.json_file).await.expect("load");
    assert_eq!(run.total_posts, 2);
    assert_eq!(run.posts, posts);
    assert_eq!(run.metadata.total_cost, 49.0);

    let text = std::fs::read_to_string(&art.combined_text_file).expect("digest");
    assert!(text.contains("RUN abc123"));
    assert!(text.contains("#1 Agents at checkout"));
    assert!(text.contains("SUMMARY\nAgents are buying things."));

    // no temp files left behind
    let leftovers = std::fs::read_dir(dir.path().join("json"))
        .expect("json dir")
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|x| x == "tmp"))
        .count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn list_runs_is_newest_first() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileStore::new(dir.path());
    assert!(store.list_runs().await.expect("empty listing").is_empty());

    store.save(&[post(1, "Early run")], &meta("early", 8)).await.expect("save");
    store.save(&[post(1, "Late run")], &meta("late", 17)).await.expect("save");

    let runs = store.list_runs().await.expect("list");
    assert_eq!(runs.len(), 2);
    assert!(runs[0].to_string_lossy().contains("late"));
    assert!(runs[1].to_string_lossy().contains("early"));
}

#[test]
fn digest_omits_empty_sections() {
    let mut m = meta("r1", 10);
    m.summary = None;
    let mut p = post(1, "No text here");
    p.text.clear();
    let out = render_combined(&[p], &m);
    assert!(!out.contains("SUMMARY"));
    assert!(out.contains("Priority: 84.50 (High)"));
}

#[tokio::test]
async fn each_post_gets_its_own_text_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileStore::new(dir.path());
    let posts = vec![post(1, "Agents at Checkout!"), post(2, "???")];

    let art = store.save(&posts, &meta("abc123", 9)).await.expect("save");
    let batch = dir.path().join("text").join("batch_2025-02-03_09-15-00_abc123");
    assert_eq!(
        art.text_files,
        vec![batch.join("01_agents_at_checkout.txt"), batch.join("02_post_2.txt")]
    );

    let first = std::fs::read_to_string(&art.text_files[0]).expect("post file");
    assert!(first.starts_with("POST #1\n"));
    assert!(first.contains("Title: Agents at Checkout!"));
    assert!(first.contains("Priority Score: 84.50/100"));
    assert!(first.contains("Post about Agents at Checkout!"));
}

#[tokio::test]
async fn latest_run_loads_the_newest_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileStore::new(dir.path());
    assert!(store.latest_run().await.expect("empty store").is_none());

    store.save(&[post(1, "Early run")], &meta("early", 8)).await.expect("save");
    store.save(&[post(1, "Late run")], &meta("late", 17)).await.expect("save");

    let latest = store.latest_run().await.expect("latest").expect("some run");
    assert_eq!(latest.metadata.run_id, "late");
    assert_eq!(latest.posts[0].title, "Late run");
}

#[tokio::test]
async fn retention_keeps_only_the_newest_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileStore::new(dir.path()).with_retention(Some(2));

    for (hour, id) in [(8, "r1"), (9, "r2"), (10, "r3"), (11, "r4")] {
        store.save(&[post(1, "Run output")], &meta(id, hour)).await.expect("save");
    }

    let runs = store.list_runs().await.expect("list");
    assert_eq!(runs.len(), 2);
    assert!(runs[0].to_string_lossy().contains("r4"));
    assert!(runs[1].to_string_lossy().contains("r3"));
    assert_eq!(count_entries(&dir.path().join("combined")), 2);
    assert_eq!(count_entries(&dir.path().join("text")), 2);
    assert!(!dir.path().join("text").join("batch_2025-02-03_08-15-00_r1").exists());
}

#[tokio::test]
async fn prune_without_retention_is_explicit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileStore::new(dir.path());
    for (hour, id) in [(8, "r1"), (9, "r2"), (10, "r3")] {
        store.save(&[post(1, "Run output")], &meta(id, hour)).await.expect("save");
    }
    assert_eq!(store.list_runs().await.expect("list").len(), 3);

    // json + combined + text batch for the oldest run
    assert_eq!(store.prune(2).await.expect("prune"), 3);
    assert_eq!(store.list_runs().await.expect("list").len(), 2);
}
