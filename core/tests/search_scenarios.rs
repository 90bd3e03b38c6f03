use blogsearch_core::persist::{load_snapshot, save_snapshot, IndexPaths};
use blogsearch_core::{DocumentStore, EngineConfig, RawDocument, SearchEngine, Snapshot, DEFAULT_LIMIT};
use tempfile::tempdir;

const STORE: &str = include_str!("fixtures/lunr-store.js");

fn record(title: &str, excerpt: &str, categories: &[&str], tags: &[&str], url: &str) -> RawDocument {
    RawDocument {
        title: Some(title.into()),
        excerpt: Some(excerpt.into()),
        categories: Some(categories.iter().map(|s| s.to_string()).collect()),
        tags: Some(tags.iter().map(|s| s.to_string()).collect()),
        url: Some(url.into()),
        teaser: None,
    }
}

fn three_posts() -> Vec<RawDocument> {
    vec![
        record(
            "neo4apis",
            "I’ve been reading a few interesting analyses of Twitter data recently such as this #gamergate analysis \
             by Andy Baio. I thought it would be nice to have a mechanism for people to quickly and easily import \
             data from Twitter to Neo4j for research purposes.",
            &["ruby", "neo4j", "announcements", "neo4api"],
            &[],
            "/ruby/neo4j/announcements/neo4api/2014/11/03/neo4apis",
        ),
        record(
            "Loading SQL to Neo4j Like Magic",
            "When using neo4j for the first time, most people want to import data from another database to start \
             playing around.",
            &["sql", "neo4j"],
            &["neo4j", "sql"],
            "/sql/neo4j/2015/01/08/loading_sql_to_neo4j_like_magic",
        ),
        record(
            "Why I Love Lodash",
            "I love Lodash, but I’m not here to tell you to use Lodash. It’s up to you to decide if a tool is \
             useful for you or your project.",
            &["javascript"],
            &["javascript"],
            "/javascript/2021/05/13/why-I-love-lodash",
        ),
    ]
}

fn titles(snapshot: &Snapshot, query: &str) -> Vec<String> {
    snapshot.search(query, DEFAULT_LIMIT).unwrap().into_iter().map(|r| r.title).collect()
}

#[test]
fn three_post_scenario() {
    let snapshot = Snapshot::build(DocumentStore::from_raw(three_posts()), EngineConfig::default());

    assert_eq!(titles(&snapshot, "neo4j"), vec!["Loading SQL to Neo4j Like Magic", "neo4apis"]);
    assert_eq!(titles(&snapshot, "lodash"), vec!["Why I Love Lodash"]);
    assert!(titles(&snapshot, "nonexistentterm123").is_empty());
    assert!(titles(&snapshot, "").is_empty());
}

#[test]
fn styled_unicode_titles_are_found_by_plain_queries() {
    let records = vec![record("𝐍𝐞𝐨𝟒𝐣 tips", "Notes", &[], &[], "/styled"), record("Lodash", "Utilities", &[], &[], "/lodash")];
    let snapshot = Snapshot::build(DocumentStore::from_raw(records), EngineConfig::default());
    assert_eq!(titles(&snapshot, "neo4j"), vec!["𝐍𝐞𝐨𝟒𝐣 tips"]);
    assert!(snapshot.index().vocabulary().all(|(term, _)| term.to_lowercase() == term));
}

#[test]
fn results_carry_url_score_and_snippet() {
    let snapshot = Snapshot::build(DocumentStore::from_raw(three_posts()), EngineConfig::default());
    let results = snapshot.search("lodash", DEFAULT_LIMIT).unwrap();
    assert_eq!(results[0].url, "/javascript/2021/05/13/why-I-love-lodash");
    assert!(results[0].score > 0.0);
    assert!(results[0].snippet.contains("Lodash"));
}

#[test]
fn full_store_loads_from_generated_script() {
    let store = DocumentStore::from_store_text(STORE).unwrap();
    assert_eq!(store.len(), 21);
    assert!(store.rejected().is_empty());

    let snapshot = Snapshot::build(store, EngineConfig::default());
    let elixir = titles(&snapshot, "elixir");
    assert!(elixir.contains(&"Expecting the Unexpected in Elixir".to_string()));
    assert!(elixir.iter().all(|t| !t.contains("Lodash")));

    let results = snapshot.search("neo4j", 3).unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn phrase_matches_are_a_subset_of_term_matches() {
    let snapshot = Snapshot::build(DocumentStore::from_store_text(STORE).unwrap(), EngineConfig::default());
    let phrase = snapshot.search(r#""master data""#, 50).unwrap();
    let terms = snapshot.search("master data", 50).unwrap();
    assert!(!phrase.is_empty());
    for hit in &phrase {
        let bag = terms.iter().find(|t| t.doc_id == hit.doc_id).expect("phrase hit missing from term query");
        assert!(hit.score >= bag.score);
    }
}

#[test]
fn field_scoped_and_wildcard_queries_on_the_full_store() {
    let snapshot = Snapshot::build(DocumentStore::from_store_text(STORE).unwrap(), EngineConfig::default());
    assert_eq!(titles(&snapshot, "title:lodash"), vec!["Why I Love Lodash"]);
    assert!(titles(&snapshot, "tags:lodash").is_empty());
    assert!(!titles(&snapshot, "genserv*").is_empty());
    assert_eq!(titles(&snapshot, "lodsh~1"), vec!["Why I Love Lodash"]);
}

#[test]
fn rebuild_adds_and_removes_documents() {
    let mut records = three_posts();
    let engine = SearchEngine::from_store(DocumentStore::from_raw(records.clone()), EngineConfig::default());
    assert!(engine.search("zanzibar", DEFAULT_LIMIT).unwrap().is_empty());

    records.push(record("Postcards", "Notes from Zanzibar", &[], &[], "/postcards"));
    engine.rebuild(DocumentStore::from_raw(records.clone()));
    let hits = engine.search("zanzibar", DEFAULT_LIMIT).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].url, "/postcards");

    records.pop();
    engine.rebuild(DocumentStore::from_raw(records));
    assert!(engine.search("zanzibar", DEFAULT_LIMIT).unwrap().is_empty());
}

#[test]
fn higher_term_frequency_never_lowers_the_score() {
    let base = vec![
        record("a", "graph alpha beta gamma", &[], &[], "/a"),
        record("b", "graph graph beta gamma", &[], &[], "/b"),
        record("c", "delta epsilon zeta eta", &[], &[], "/c"),
    ];
    let snapshot = Snapshot::build(DocumentStore::from_raw(base), EngineConfig::default());
    let results = snapshot.search("graph", DEFAULT_LIMIT).unwrap();
    assert_eq!(results[0].url, "/b");
    assert!(results[0].score >= results[1].score);
}

#[test]
fn title_match_ranks_at_least_as_high_as_excerpt_match() {
    let records = vec![
        record("Notes", "cypher workshop recap", &[], &[], "/excerpt"),
        record("Cypher", "notes workshop recap", &[], &[], "/title"),
    ];
    let snapshot = Snapshot::build(DocumentStore::from_raw(records), EngineConfig::default());
    let results = snapshot.search("cypher", DEFAULT_LIMIT).unwrap();
    assert_eq!(results[0].url, "/title");
    assert!(results[0].score >= results[1].score);
}

#[test]
fn incomplete_records_are_skipped_not_fatal() {
    let mut records = three_posts();
    records[1].url = None;
    let snapshot = Snapshot::build(DocumentStore::from_raw(records), EngineConfig::default());
    assert_eq!(snapshot.index().warnings().len(), 1);
    assert_eq!(titles(&snapshot, "neo4j"), vec!["neo4apis"]);
}

#[test]
fn saved_snapshot_round_trips() {
    let dir = tempdir().unwrap();
    let paths = IndexPaths::new(dir.path());
    let built = Snapshot::build(DocumentStore::from_store_text(STORE).unwrap(), EngineConfig::default());
    save_snapshot(&paths, &built).unwrap();

    let loaded = load_snapshot(&paths, EngineConfig::default()).unwrap();
    assert_eq!(loaded.index(), built.index());
    assert_eq!(loaded.store(), built.store());
    assert_eq!(loaded.search("neo4j rails", 5).unwrap(), built.search("neo4j rails", 5).unwrap());
}

#[test]
fn rebuilding_an_unchanged_store_is_structurally_identical() {
    let a = Snapshot::build(DocumentStore::from_store_text(STORE).unwrap(), EngineConfig::default());
    let b = Snapshot::build(DocumentStore::from_store_text(STORE).unwrap(), EngineConfig::default());
    assert_eq!(a.index(), b.index());
}
