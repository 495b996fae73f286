use chrono::{TimeZone, Utc};
use news_ingest::transform::{dedupe, flatten, normalize};
use news_ingest::types::{Article, Envelope, FlatRecord, MISSING_IMAGE};
use serde_json::json;

fn article(id: &str, categories: &[&str]) -> Article {
    Article {
        id: id.to_string(),
        title: format!("title-{id}"),
        description: format!("description-{id}"),
        url: format!("https://example.com/{id}"),
        author: Some("author".to_string()),
        image: Some("https://example.com/image.png".to_string()),
        language: "en".to_string(),
        category: categories.iter().map(|c| c.to_string()).collect(),
        published: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
    }
}

fn record(id: &str, category: &str) -> FlatRecord {
    FlatRecord {
        id: id.to_string(),
        title: format!("title-{id}"),
        description: String::new(),
        url: String::new(),
        author: None,
        image: Some(MISSING_IMAGE.to_string()),
        language: "en".to_string(),
        category: category.to_string(),
        published: None,
    }
}

#[test]
fn flatten_emits_one_record_per_category() {
    let envelope = Envelope {
        status: "ok".to_string(),
        news: vec![
            article("a1", &["tech", "ai"]),
            article("a2", &["sports", "health", "tech"]),
            article("a3", &[]),
        ],
        page: "1".to_string(),
    };

    let records: Vec<FlatRecord> = flatten(envelope).collect();

    // 2 + 3 + 0 expansions, in article order, article fields copied intact
    assert_eq!(records.len(), 5);
    assert_eq!(records[0].id, "a1");
    assert_eq!(records[0].category, "tech");
    assert_eq!(records[1].id, "a1");
    assert_eq!(records[1].category, "ai");
    assert_eq!(records[2].category, "sports");
    assert!(records.iter().all(|r| r.id != "a3"));

    for r in &records {
        assert_eq!(r.title, format!("title-{}", r.id));
        assert_eq!(r.description, format!("description-{}", r.id));
        assert_eq!(r.url, format!("https://example.com/{}", r.id));
        assert_eq!(r.author.as_deref(), Some("author"));
        assert_eq!(r.language, "en");
        assert!(r.published.is_some());
    }
}

#[test]
fn article_without_categories_is_dropped() {
    let envelope = Envelope {
        news: vec![article("a1", &[])],
        ..Default::default()
    };
    assert_eq!(flatten(envelope).count(), 0);
}

#[test]
fn normalize_defaults_missing_image_only() {
    let mut missing = record("a1", "tech");
    missing.image = None;
    missing.author = None;

    let normalized = normalize(missing);
    assert_eq!(normalized.image.as_deref(), Some(MISSING_IMAGE));
    // Only the image gets a default, a missing author stays null
    assert_eq!(normalized.author, None);

    let mut present = record("a2", "tech");
    present.image = Some("https://example.com/pic.png".to_string());
    let normalized = normalize(present);
    assert_eq!(
        normalized.image.as_deref(),
        Some("https://example.com/pic.png")
    );
}

#[test]
fn dedupe_keeps_first_occurrence_per_key() {
    let mut first = record("a1", "tech");
    first.title = "first".to_string();
    let mut second = record("a1", "tech");
    second.title = "second".to_string();

    let mut records = vec![
        first.clone(),
        record("a1", "ai"),
        second,
        record("a2", "tech"),
        record("a1", "ai"),
    ];

    let removed = dedupe(&mut records);

    assert_eq!(removed, 2);
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].merge_key(), ("a1", "tech"));
    // First arrival wins the key
    assert_eq!(records[0].title, "first");
    assert_eq!(records[1].merge_key(), ("a1", "ai"));
    assert_eq!(records[2].merge_key(), ("a2", "tech"));
}

#[test]
fn decodes_partial_envelopes() {
    // Absent fields fall back to empty values
    let envelope: Envelope = serde_json::from_value(json!({
        "news": [{"id": "a1", "category": ["tech"]}]
    }))
    .unwrap();
    assert_eq!(envelope.status, "");
    assert_eq!(envelope.page, "");
    assert_eq!(envelope.news.len(), 1);
    assert_eq!(envelope.news[0].title, "");
    assert_eq!(envelope.news[0].author, None);
    assert_eq!(envelope.news[0].published, None);

    // A type mismatch still fails the decode
    assert!(serde_json::from_value::<Envelope>(json!({
        "news": [{"id": 1}]
    }))
    .is_err());
}

#[test]
fn end_to_end_envelope_expansion() {
    let payload = r#"{
        "status": "ok",
        "news": [{
            "id": "a1",
            "title": "T",
            "description": "D",
            "url": "u",
            "author": null,
            "image": null,
            "language": "en",
            "category": ["tech", "ai"],
            "published": "2024-01-01T00:00:00Z"
        }],
        "page": "1"
    }"#;

    let envelope: Envelope = serde_json::from_str(payload).unwrap();
    let records: Vec<FlatRecord> = flatten(envelope).map(normalize).collect();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].category, "tech");
    assert_eq!(records[1].category, "ai");
    for r in &records {
        assert_eq!(r.key(), "a1");
        assert_eq!(r.image.as_deref(), Some(MISSING_IMAGE));
        assert_eq!(r.author, None);
        assert_eq!(
            r.published,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
    }

    // The published message holds exactly the flat record fields
    let value = serde_json::to_value(&records[0]).unwrap();
    let object = value.as_object().unwrap();
    assert_eq!(object.len(), 9);
    for field in [
        "id",
        "title",
        "description",
        "url",
        "author",
        "image",
        "language",
        "category",
        "published",
    ] {
        assert!(object.contains_key(field), "missing field {field}");
    }
    assert_eq!(object["author"], serde_json::Value::Null);
    assert_eq!(object["image"], json!(MISSING_IMAGE));
}
