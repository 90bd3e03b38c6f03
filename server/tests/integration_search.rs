use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use blogsearch_core::{DocumentStore, EngineConfig, SearchEngine, Snapshot};
use blogsearch_server::{build_app, router, AppState};
use http_body_util::BodyExt;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;
use tower::ServiceExt;

const STORE: &str = r#"var store = [{
        "title": "Loading SQL to Neo4j Like Magic",
        "excerpt":"When using neo4j for the first time, most people want to import data from another database.",
        "categories": ["sql","neo4j"],
        "tags": ["neo4j","sql"],
        "url": "/sql/neo4j/2015/01/08/loading_sql_to_neo4j_like_magic",
        "teaser": null
      },{
        "title": "neo4apis",
        "excerpt":"Import data from Twitter to Neo4j for research purposes.",
        "categories": ["ruby","neo4j","announcements","neo4api"],
        "tags": [],
        "url": "/ruby/neo4j/announcements/neo4api/2014/11/03/neo4apis",
        "teaser": null
      },{
        "title": "Why I Love Lodash",
        "excerpt":"I love Lodash, but I’m not here to tell you to use Lodash.",
        "categories": ["javascript"],
        "tags": ["javascript"],
        "url": "/javascript/2021/05/13/why-I-love-lodash",
        "teaser": null
      }];
"#;

fn write_store(dir: &Path, text: &str) -> std::path::PathBuf {
    let path = dir.join("lunr-store.js");
    fs::write(&path, text).unwrap();
    path
}

async fn call(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let dir = tempdir().unwrap();
    let store = write_store(dir.path(), STORE);
    let index_dir = dir.path().join("index");
    let app = build_app(index_dir.to_string_lossy().to_string(), Some(store), EngineConfig::default()).unwrap();

    let (status, json) = call(app, get("/search?q=neo4j&k=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_hits"].as_u64(), Some(2));
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr.len(), 2);
    assert_eq!(arr[0]["doc_id"].as_u64(), Some(0));
    assert_eq!(arr[1]["doc_id"].as_u64(), Some(1));
    assert!(arr[0]["snippet"].as_str().unwrap().contains("neo4j"));

    // the build was persisted, so a second app opens it without the store
    assert!(index_dir.join("meta.json").exists());
    let reopened = build_app(index_dir.to_string_lossy().to_string(), None, EngineConfig::default()).unwrap();
    let (_, json) = call(reopened, get("/search?q=lodash")).await;
    assert_eq!(json["results"][0]["url"], "/javascript/2021/05/13/why-I-love-lodash");
}

#[tokio::test]
async fn empty_and_unknown_queries_return_no_hits() {
    let dir = tempdir().unwrap();
    let store = write_store(dir.path(), STORE);
    let app = build_app(dir.path().join("index").to_string_lossy().to_string(), Some(store), EngineConfig::default())
        .unwrap();

    let (status, json) = call(app.clone(), get("/search?q=")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_hits"].as_u64(), Some(0));
    let (_, json) = call(app, get("/search?q=nonexistentterm123")).await;
    assert!(json["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn doc_lookup() {
    let dir = tempdir().unwrap();
    let store = write_store(dir.path(), STORE);
    let app = build_app(dir.path().join("index").to_string_lossy().to_string(), Some(store), EngineConfig::default())
        .unwrap();

    let (status, json) = call(app.clone(), get("/doc/2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["title"], "Why I Love Lodash");
    let (status, _) = call(app, get("/doc/42")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[test]
fn missing_index_without_store_fails() {
    let dir = tempdir().unwrap();
    assert!(build_app(dir.path().join("none").to_string_lossy().to_string(), None, EngineConfig::default()).is_err());
}

#[tokio::test]
async fn reload_requires_token_and_swaps_snapshot() {
    let dir = tempdir().unwrap();
    let store_path = write_store(dir.path(), STORE);
    let store = DocumentStore::from_store_text(STORE).unwrap();
    let engine = Arc::new(SearchEngine::new(Snapshot::build(store, EngineConfig::default())));
    let state = AppState {
        engine: engine.clone(),
        index_dir: dir.path().join("index"),
        store_path: Some(store_path.clone()),
        admin_token: Some("secret".into()),
    };
    let app = router(state);

    let (status, _) = call(app.clone(), Request::post("/admin/reload").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let before = engine.snapshot();
    fs::write(&store_path, STORE.replace("Why I Love Lodash", "Why I Love Ramda")).unwrap();
    let req = Request::post("/admin/reload").header("X-ADMIN-TOKEN", "secret").body(Body::empty()).unwrap();
    let (status, json) = call(app.clone(), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["num_docs"].as_u64(), Some(3));

    let (_, json) = call(app, get("/search?q=title:ramda")).await;
    assert_eq!(json["results"][0]["title"], "Why I Love Ramda");
    // a snapshot taken before the reload still answers from the old content
    assert_eq!(before.search("title:ramda", 10).unwrap().len(), 0);
    assert_eq!(before.search("title:lodash", 10).unwrap().len(), 1);
}
