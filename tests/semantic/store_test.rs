use semsql::semantic::{SemanticLayer, SemanticLayerStore};
use std::fs;
use std::sync::Arc;
use std::thread;

const REVENUE: &str =
    r#"{"tables":{"revenue":{"columns":{"amount":[]},"metrics":{"total":"SUM(amount)"}}}}"#;

fn layer(json: &str) -> SemanticLayer {
    serde_json::from_str(json).unwrap()
}

#[test]
fn test_scenario_revenue_compiles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("semantic_layer.json");
    fs::write(&path, REVENUE).unwrap();

    let store = SemanticLayerStore::open(&path);
    assert_eq!(store.compiled(), "Table: revenue\nColumns: amount\n\nMetrics: total");
}

#[test]
fn test_load_tolerates_bad_documents() {
    let dir = tempfile::tempdir().unwrap();

    let missing = SemanticLayerStore::new(dir.path().join("missing.json"));
    assert_eq!(missing.load(), SemanticLayer::default());

    for (name, content) in [
        ("malformed.json", "{\"tables\": {"),
        ("null.json", "null"),
        ("array.json", "[1, 2, 3]"),
        ("empty.json", ""),
        ("bad_table.json", r#"{"tables":{"":{"columns":{}}}}"#),
        ("wrong_types.json", r#"{"tables":{"t":{"columns":{"a":"not a list"}}}}"#),
    ] {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        let store = SemanticLayerStore::new(&path);
        assert_eq!(store.load(), SemanticLayer::default(), "{}", name);
    }
}

#[test]
fn test_set_none_equals_set_empty() {
    let a = SemanticLayerStore::new("a.json");
    let b = SemanticLayerStore::new("b.json");
    a.set(Some(layer(REVENUE)));
    b.set(Some(layer(REVENUE)));

    a.set(None);
    b.set(Some(SemanticLayer::default()));

    assert_eq!(a.get(), b.get());
    assert_eq!(a.compiled(), b.compiled());
    assert_eq!(a.compiled(), "");
}

#[test]
fn test_synonyms_never_reach_compiled_text() {
    let with_synonyms = layer(
        r#"{"tables":{"orders":{"columns":{"amount":["revenue","sales"],"placed_at":["date"]},"metrics":{"gmv":"SUM(amount)"}}}}"#,
    );
    let mut without = with_synonyms.clone();
    for spec in without.tables.values_mut() {
        for (_, synonyms) in spec.columns.iter_mut().flatten() {
            synonyms.clear();
        }
        for (_, expr) in spec.metrics.iter_mut().flatten() {
            *expr = String::new();
        }
    }

    assert_eq!(with_synonyms.compile(), without.compile());
    assert!(!with_synonyms.compile().contains("sales"));
    assert!(!with_synonyms.compile().contains("SUM"));
}

#[test]
fn test_save_then_reload_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("dir").join("layer.json");
    let source = r#"{"tables":{"zeta":{"columns":{"b":["bee"],"a":[]},"metrics":{}},"alpha":{"columns":{"id":[]},"metrics":{"n":"COUNT(*)"}}}}"#;

    let store = SemanticLayerStore::new(&path);
    store.set(Some(layer(source)));
    let written = store.save(None).unwrap();
    assert_eq!(written, path);

    let saved = fs::read_to_string(&path).unwrap();
    let compact: serde_json::Value = serde_json::from_str(&saved).unwrap();
    assert_eq!(serde_json::to_string(&compact).unwrap().len(), source.len());
    assert_eq!(layer(&saved), layer(source));

    // Saving twice produces identical bytes.
    store.save(None).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), saved);

    let reopened = SemanticLayerStore::open(&path);
    assert_eq!(reopened.get(), layer(source));
    assert_eq!(
        reopened.compiled(),
        "Table: zeta\nColumns: b, a\n\nTable: alpha\nColumns: id\n\nMetrics: n"
    );
}

#[test]
fn test_save_keeps_omitted_sections_omitted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("layer.json");
    let source = r#"{"tables":{"revenue":{"columns":{"amount":[]}},"events":{"metrics":{"n":"COUNT(*)"}}}}"#;
    fs::write(&path, source).unwrap();

    let store = SemanticLayerStore::open(&path);
    store.save(None).unwrap();

    let saved: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let expected: serde_json::Value = serde_json::from_str(source).unwrap();
    assert_eq!(saved, expected);
    assert!(saved["tables"]["revenue"].get("metrics").is_none());
    assert!(saved["tables"]["events"].get("columns").is_none());
    assert_eq!(
        store.compiled(),
        "Table: revenue\nColumns: amount\n\nTable: events\nColumns: \n\nMetrics: n"
    );
}

#[test]
fn test_reload_discards_unsaved_edits() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("layer.json");
    fs::write(&path, REVENUE).unwrap();

    let store = SemanticLayerStore::open(&path);
    store.set(None);
    assert!(store.get().is_empty());

    let reloaded = store.reload();
    assert_eq!(reloaded, layer(REVENUE));
    assert_eq!(store.get(), layer(REVENUE));
}

#[test]
fn test_save_to_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let store = SemanticLayerStore::new(dir.path().join("default.json"));
    store.set(Some(layer(REVENUE)));

    let other = dir.path().join("export.json");
    assert_eq!(store.save(Some(&other)).unwrap(), other);
    assert!(other.exists());
    assert!(!dir.path().join("default.json").exists());
}

#[test]
fn test_readers_never_see_torn_state() {
    let store = Arc::new(SemanticLayerStore::new("unused.json"));
    let layers = [
        layer(REVENUE),
        layer(r#"{"tables":{"orders":{"columns":{"id":[],"total":[]}}}}"#),
        SemanticLayer::default(),
    ];

    let writer = {
        let store = Arc::clone(&store);
        let layers = layers.clone();
        thread::spawn(move || {
            for i in 0..500 {
                store.set(Some(layers[i % layers.len()].clone()));
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..500 {
                    let snapshot = store.snapshot();
                    assert_eq!(&*snapshot.compiled, snapshot.layer.compile());
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
}
