// tests/priority_rank.rs
//
// Ranking over a realistic batch: permutation of ranks, stable ties,
// source quality and recency flowing into the composite.

use chrono::{Duration, Utc};

use article_pipeline::analyze::scoring::default_engagement_keywords;
use article_pipeline::analyze::{categorize, top, PriorityRanker, PriorityTier, PriorityWeights};
use article_pipeline::ingest::types::{Analysis, Article};
use article_pipeline::source_quality::SourceQualityConfig;
use article_pipeline::telemetry::{noop, MemorySink};

fn ranker() -> PriorityRanker {
    PriorityRanker::new(
        PriorityWeights::default(),
        SourceQualityConfig::default(),
        default_engagement_keywords(),
        noop(),
    )
}

fn article(title: &str, source: &str, score: f32, age_hours: i64) -> Article {
    let mut a = Article::new(title, &format!("https://x.example/{}", title.len()), "", source);
    a.captured_at = Some(Utc::now() - Duration::hours(age_hours));
    a.analysis = Analysis::scored(score, "post");
    a
}

#[test]
fn ranks_are_a_permutation_in_score_order() {
    let batch = vec![
        article("Minor update to docs", "Unknown Blog", 2.0, 80),
        article("Agents handle checkout", "MIT Technology Review", 9.0, 1),
        article("Chatbot pricing changes", "Wired", 6.0, 30),
        article("Model benchmark roundup", "The Verge", 4.0, 10),
    ];
    let ranked = ranker().rank(batch, Utc::now());

    let mut ranks: Vec<u32> = ranked.iter().map(|a| a.priority_rank).collect();
    assert_eq!(ranks, vec![1, 2, 3, 4]);
    ranks.sort();
    assert_eq!(ranks, vec![1, 2, 3, 4]);

    assert_eq!(ranked[0].title, "Agents handle checkout");
    assert_eq!(ranked[3].title, "Minor update to docs");
    assert!(ranked.windows(2).all(|w| w[0].priority_score >= w[1].priority_score));
    assert!(ranked.iter().all(|a| (0.0..=100.0).contains(&a.priority_score)));
}

#[test]
fn equal_scores_keep_input_order() {
    let now = Utc::now();
    let mut batch = Vec::new();
    for i in 0..5 {
        let mut a = Article::new(&format!("Identical story {i}"), &format!("https://x/{i}"), "", "Wired");
        a.captured_at = Some(now);
        batch.push(a);
    }
    let ranked = ranker().rank(batch, now);
    let titles: Vec<_> = ranked.iter().map(|a| a.title.clone()).collect();
    assert_eq!(
        titles,
        (0..5).map(|i| format!("Identical story {i}")).collect::<Vec<_>>()
    );
}

#[test]
fn source_quality_breaks_otherwise_equal_articles() {
    let now = Utc::now();
    let mk = |source: &str| {
        let mut a = Article::new("Same headline everywhere", &format!("https://{source}/x"), "", source);
        a.captured_at = Some(now);
        a
    };
    let ranked = ranker().rank(vec![mk("Unknown Blog"), mk("MIT Technology Review")], now);
    assert_eq!(ranked[0].source, "MIT Technology Review");
    assert!(ranked[0].priority_score > ranked[1].priority_score);
}

#[test]
fn tiers_and_top_slice() {
    let ranked = ranker().rank(
        vec![
            article("Agents handle checkout", "MIT Technology Review", 10.0, 1),
            article("Chatbot pricing changes", "Wired", 5.0, 30),
            article("Minor update to docs", "Unknown Blog", 0.0, 100),
        ],
        Utc::now(),
    );
    // (10*.5 + 10*.25 + 10*.15 + 5*.1) * 10 = 95
    assert!((ranked[0].priority_score - 95.0).abs() < 1e-3);
    assert_eq!(PriorityTier::for_score(ranked[0].priority_score), PriorityTier::High);

    let tiers = categorize(&ranked);
    assert_eq!(tiers.high + tiers.medium + tiers.low, 3);
    assert_eq!(tiers.high, 1);

    assert_eq!(top(&ranked, 2).len(), 2);
    assert_eq!(top(&ranked, 10).len(), 3);
}

#[test]
fn ranking_emits_completion_event() {
    let sink = std::sync::Arc::new(MemorySink::new());
    let r = PriorityRanker::new(
        PriorityWeights::default(),
        SourceQualityConfig::default(),
        default_engagement_keywords(),
        sink.clone(),
    );
    let _ = r.rank(vec![article("Agents handle checkout", "Wired", 7.0, 2)], Utc::now());
    let ev = sink.last("rank_completed").expect("event");
    assert_eq!(ev.get("articles"), Some(&serde_json::json!(1)));
}
