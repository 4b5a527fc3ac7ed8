use quarry::index::SearchResult;
use quarry::{IndexSettings, Indexer};

fn indexer() -> quarry::Result<Indexer> {
    Indexer::new(IndexSettings::new("test"))
}

fn ids(results: &[SearchResult]) -> Vec<&str> {
    results.iter().map(|r| r.id.as_str()).collect()
}

fn search(indexer: &Indexer, query: &str) -> Vec<SearchResult> {
    indexer.search(query, i32::MAX, 100)
}

#[test]
fn test_every_prefix_finds_the_word() -> quarry::Result<()> {
    let indexer = indexer()?;
    indexer.start(true);
    let words = ["lantern", "ox", "meadowlark"];
    for word in words {
        let doc = indexer.add_document(word, None, true);
        indexer.add_word(word, 2, word.len(), doc, 100);
    }
    indexer.finish(None, None).wait()?;

    for word in words {
        for n in 2..=word.len() {
            let found = search(&indexer, &word[..n]);
            assert!(ids(&found).contains(&word), "'{}' should find '{word}'", &word[..n]);
        }
        let longer = format!("{word}s");
        assert!(!ids(&search(&indexer, &longer)).contains(&word));
    }
    Ok(())
}

#[test]
fn test_apple_and_application() -> quarry::Result<()> {
    // 1. Index two documents sharing a prefix
    let indexer = indexer()?;
    indexer.start(true);
    let apple = indexer.add_document("doc1", None, true);
    indexer.add_word("apple", 2, 12, apple, 100);
    let application = indexer.add_document("doc2", None, true);
    indexer.add_word("application", 2, 12, application, 100);
    indexer.finish(None, None).wait()?;

    // 2. Shared prefix finds both, ties broken by document order
    let results = search(&indexer, "app");
    assert_eq!(ids(&results), vec!["doc1", "doc2"]);
    assert_eq!(results[0].score, 100);

    // 3. A longer prefix is specific
    assert_eq!(ids(&search(&indexer, "appl")), vec!["doc1", "doc2"]);
    assert_eq!(ids(&search(&indexer, "appli")), vec!["doc2"]);
    assert!(search(&indexer, "apples").is_empty());
    Ok(())
}

#[test]
fn test_numeric_boundaries() -> quarry::Result<()> {
    let indexer = indexer()?;
    indexer.start(true);
    for (id, size) in [("small", 10.0), ("medium", 20.0), ("large", 30.0)] {
        let doc = indexer.add_document(id, None, true);
        indexer.add_number("size", size, doc, 100);
    }
    indexer.finish(None, None).wait()?;

    assert_eq!(ids(&search(&indexer, "size<20")), vec!["small"]);
    assert_eq!(ids(&search(&indexer, "size<=20")), vec!["small", "medium"]);
    assert_eq!(ids(&search(&indexer, "size>20")), vec!["large"]);
    assert_eq!(ids(&search(&indexer, "size>=20")), vec!["medium", "large"]);
    assert_eq!(ids(&search(&indexer, "size:[15,30]")), vec!["medium", "large"]);
    assert_eq!(ids(&search(&indexer, "size:[10,10]")), vec!["small"]);
    assert_eq!(ids(&search(&indexer, "size=30")), vec!["large"]);
    Ok(())
}

#[test]
fn test_exact_words_do_not_match_prefixes() -> quarry::Result<()> {
    let indexer = indexer()?;
    indexer.start(true);
    let exact = indexer.add_document("exact", None, true);
    indexer.add_exact_word("hello", exact, 100);
    indexer.finish(None, None).wait()?;

    assert!(search(&indexer, "hel").is_empty());
    assert_eq!(ids(&search(&indexer, "hello")), vec!["exact"]);

    indexer.start(true);
    let prefixed = indexer.add_document("prefixed", None, true);
    indexer.add_word("hello", 2, 5, prefixed, 100);
    indexer.finish(None, None).wait()?;
    assert_eq!(ids(&search(&indexer, "hel")), vec!["prefixed"]);
    Ok(())
}

#[test]
fn test_reindexing_is_idempotent() -> quarry::Result<()> {
    let indexer = indexer()?;
    indexer.start(true);
    for _ in 0..2 {
        let doc = indexer.add_document("same", Some("meta".to_string()), true);
        indexer.add_word("duplicate", 2, 12, doc, 100);
    }
    indexer.finish(None, None).wait()?;

    assert_eq!(indexer.document_count(), 1);
    // One entry per prefix length 2..=9
    assert_eq!(indexer.entry_count(), 8);
    assert_eq!(search(&indexer, "dup").len(), 1);
    Ok(())
}

#[test]
fn test_incremental_update_replaces_stale_entries() -> quarry::Result<()> {
    // 1. Initial build
    let indexer = indexer()?;
    indexer.start(true);
    let doc = indexer.add_document("d", None, true);
    indexer.add_property_default("color", "red", doc, 100, true, true);
    let other = indexer.add_document("other", None, true);
    indexer.add_property_default("color", "blue", other, 100, true, true);
    indexer.finish(None, None).wait()?;
    assert_eq!(ids(&search(&indexer, "color=red")), vec!["d"]);

    // 2. Evict and re-add with new attributes
    indexer.start(false);
    let doc = indexer.add_document("d", None, true);
    indexer.add_property_default("color", "green", doc, 100, true, true);
    indexer.finish(Some(&["d".to_string()]), None).wait()?;

    assert!(search(&indexer, "color=red").is_empty());
    assert_eq!(ids(&search(&indexer, "color:gr")), vec!["d"]);
    assert_eq!(ids(&search(&indexer, "color=blue")), vec!["other"]);
    Ok(())
}

#[test]
fn test_round_trip_preserves_results() -> quarry::Result<()> {
    // 1. Build and serialize
    let indexer = indexer()?;
    indexer.start(true);
    let entries = [
        ("rock", "mossy rock", 10.0),
        ("tree", "oak tree", 40.0),
        ("bush", "rock rose", 5.0),
    ];
    for (id, text, size) in entries {
        let doc = indexer.add_document(id, None, true);
        indexer.add_words(text, doc);
        indexer.add_number("size", size, doc, 100);
        indexer.add_property_default("t", "prefab", doc, 99, true, true);
    }
    indexer.finish(None, None).wait()?;
    let bytes = indexer.to_bytes()?;

    // 2. Load into a fresh indexer
    let restored = self::indexer()?;
    assert!(restored.read(&bytes, true)?);
    assert!(restored.read(&bytes, false)?);

    // 3. Same answers, same order
    for query in ["rock", "ro", "t=prefab", "size>=10", "oak size<50", "mossy"] {
        let before = search(&indexer, query);
        let after = search(&restored, query);
        assert_eq!(before, after, "query '{query}'");
    }
    assert_eq!(restored.keywords(), indexer.keywords());
    Ok(())
}

#[test]
fn test_truncated_stream_is_rejected() -> quarry::Result<()> {
    let indexer = indexer()?;
    indexer.start(true);
    let doc = indexer.add_document("a", None, true);
    indexer.add_word("alpha", 2, 12, doc, 100);
    indexer.finish(None, None).wait()?;
    let bytes = indexer.to_bytes()?;

    let restored = self::indexer()?;
    let err = restored.read(&bytes[..bytes.len() - 3], false).unwrap_err();
    assert!(err.is_format_error());
    assert!(!restored.is_searchable());
    assert!(search(&restored, "alpha").is_empty());
    Ok(())
}
