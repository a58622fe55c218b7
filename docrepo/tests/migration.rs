use docrepo::{memory::InMemoryStore, prelude::*};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Task {
    title: String,
    #[serde(default)]
    labels: Vec<String>,
}

fn repository(batch_size: u64) -> Repository<InMemoryStore> {
    Repository::with_config(
        InMemoryStore::new(),
        RepositoryConfig::builder("2")
            .with_migration_batch_size(batch_size)
            .build(),
    )
}

/// Seeds one legacy task per marker shape, in this order:
/// missing, number 1, string "1.5", array, object, current "2", newer "3".
async fn seed_legacy_tasks(repository: &Repository<InMemoryStore>) {
    let markers = [
        None,
        Some(Bson::Int32(1)),
        Some(Bson::String("1.5".into())),
        Some(Bson::Array(vec![Bson::Int32(2)])),
        Some(Bson::Document(doc! { "major": 2 })),
        Some(Bson::String("2".into())),
        Some(Bson::String("3".into())),
    ];

    for (position, marker) in markers.into_iter().enumerate() {
        let mut task = doc! { "title": format!("task {position}"), "legacy": true };
        if let Some(marker) = marker {
            task.insert("schema_version", marker);
        }
        repository.backend().insert_one("tasks", task).await.unwrap();
    }
}

async fn snapshot(repository: &Repository<InMemoryStore>) -> Vec<Document> {
    repository
        .backend()
        .find("tasks", doc! {}, FindOptions::builder().sort(Some(doc! { "_id": 1 })).build())
        .await
        .unwrap()
}

#[tokio::test]
async fn migrates_every_stale_marker_shape() {
    let repository = repository(3);
    seed_legacy_tasks(&repository).await;

    let migrated = repository.migrate_collection_as::<Task>("tasks", 100).await.unwrap();
    assert_eq!(migrated, 5);

    let tasks = snapshot(&repository).await;
    for task in &tasks[..6] {
        assert_eq!(task.get_str("schema_version").unwrap(), "2");
    }
    for task in &tasks[..5] {
        assert!(!task.contains_key("legacy"));
        assert_eq!(task.get_array("labels").unwrap().len(), 0);
    }

    // Current and newer documents are left alone.
    assert!(tasks[5].get_bool("legacy").unwrap());
    assert!(tasks[6].get_bool("legacy").unwrap());
    assert_eq!(tasks[6].get_str("schema_version").unwrap(), "3");
}

#[tokio::test]
async fn migration_keeps_identifiers() {
    let repository = repository(100);
    seed_legacy_tasks(&repository).await;
    let before = snapshot(&repository).await;

    repository.migrate_collection_as::<Task>("tasks", 100).await.unwrap();
    let after = snapshot(&repository).await;

    let ids = |tasks: &[Document]| tasks.iter().map(|task| task.get("_id").cloned()).collect::<Vec<_>>();
    assert_eq!(ids(&before), ids(&after));
}

#[tokio::test]
async fn second_migration_is_a_no_op() {
    let repository = repository(2);
    seed_legacy_tasks(&repository).await;

    repository.migrate_collection_as::<Task>("tasks", 100).await.unwrap();
    let first = snapshot(&repository).await;

    let migrated = repository.migrate_collection_as::<Task>("tasks", 100).await.unwrap();
    assert_eq!(migrated, 0);
    assert_eq!(snapshot(&repository).await, first);
}

#[tokio::test]
async fn migration_stops_at_budget() {
    let repository = repository(1);
    seed_legacy_tasks(&repository).await;

    assert_eq!(repository.migrate_collection_as::<Task>("tasks", 2).await.unwrap(), 2);
    assert_eq!(
        repository
            .backend()
            .count_documents("tasks", doc! { "legacy": true })
            .await
            .unwrap(),
        5
    );

    assert_eq!(repository.migrate_collection_as::<Task>("tasks", 100).await.unwrap(), 3);
}

#[tokio::test]
async fn empty_collection_migrates_nothing() {
    let repository = repository(10);

    assert_eq!(repository.migrate_collection_as::<Task>("tasks", 100).await.unwrap(), 0);
}

#[tokio::test]
async fn decode_failure_keeps_earlier_progress() {
    let repository = repository(10);
    for task in [
        doc! { "title": "first" },
        doc! { "title": 5 },
        doc! { "title": "third" },
    ] {
        repository.backend().insert_one("tasks", task).await.unwrap();
    }

    let err = repository
        .migrate_collection_as::<Task>("tasks", 100)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Migration(_)));

    let tasks = snapshot(&repository).await;
    assert_eq!(tasks[0].get_str("schema_version").unwrap(), "2");
    assert!(!tasks[1].contains_key("schema_version"));
    assert!(!tasks[2].contains_key("schema_version"));
}

#[tokio::test]
async fn closure_codecs_migrate_documents() {
    let repository = repository(10);
    repository
        .backend()
        .insert_one("tasks", doc! { "name": "Review", "schema_version": 1 })
        .await
        .unwrap();

    let rename = |mut stored: Document| -> RepositoryResult<Document> {
        if let Some(name) = stored.remove("name") {
            stored.insert("title", name);
        }
        Ok(stored)
    };
    assert_eq!(repository.migrate_collection("tasks", &rename, 10).await.unwrap(), 1);

    let task = repository
        .find_one_document("tasks", doc! {}, Some(doc! { "_id": 0 }), None)
        .await
        .unwrap();
    assert_eq!(task, doc! { "title": "Review", "schema_version": "2" });
}

#[tokio::test]
async fn migrates_one_document() {
    let repository = repository(10);
    seed_legacy_tasks(&repository).await;
    let codec = SerdeCodec::<Task>::new();

    assert!(
        repository
            .migrate_one_document("tasks", doc! { "title": "task 1" }, &codec)
            .await
            .unwrap()
    );
    assert!(
        !repository
            .migrate_one_document("tasks", doc! { "title": "task 1" }, &codec)
            .await
            .unwrap()
    );
    assert!(
        !repository
            .migrate_one_document("tasks", doc! { "title": "task 6" }, &codec)
            .await
            .unwrap()
    );
    assert!(
        repository
            .migrate_one_document("tasks", doc! { "title": "missing" }, &codec)
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn stamps_markers_without_touching_payload() {
    let repository = repository(2);
    seed_legacy_tasks(&repository).await;

    assert_eq!(repository.update_schema_version_on_collection("tasks").await.unwrap(), 5);

    let tasks = snapshot(&repository).await;
    assert!(tasks.iter().all(|task| task.get_bool("legacy").unwrap()));
    assert_eq!(
        tasks
            .iter()
            .filter(|task| matches!(task.get_str("schema_version"), Ok("2")))
            .count(),
        6
    );

    assert_eq!(repository.update_schema_version_on_collection("tasks").await.unwrap(), 0);
}

#[tokio::test]
async fn migrates_registered_collections() {
    let repository = repository(10);
    seed_legacy_tasks(&repository).await;
    repository
        .backend()
        .insert_one("notes", doc! { "text": "hello" })
        .await
        .unwrap();

    let registry = SchemaRegistry::new()
        .register_model::<Task>("tasks")
        .register("notes", |stored: Document| -> RepositoryResult<Document> { Ok(stored) });

    let report = repository.migrate_registered(&registry).await.unwrap();

    assert_eq!(report.migrated_in("tasks"), Some(5));
    assert_eq!(report.migrated_in("notes"), Some(1));
    assert_eq!(report.total(), 6);
}

#[tokio::test]
async fn stored_documents_are_current() {
    let repository = repository(10);
    repository
        .store_one_document("tasks", doc! { "title": "fresh", "labels": ["a"] }, None)
        .await
        .unwrap();

    assert_eq!(repository.migrate_collection_as::<Task>("tasks", 10).await.unwrap(), 0);
}

#[tokio::test]
async fn array_markers_holding_the_current_version_are_stale() {
    let repository = repository(1);
    let marker = Bson::Array(vec!["2".into(), "legacy".into()]);
    for title in ["array", "stamped"] {
        repository
            .backend()
            .insert_one("tasks", doc! { "title": title, "schema_version": marker.clone() })
            .await
            .unwrap();
    }

    assert!(
        repository
            .migrate_one_document("tasks", doc! { "title": "array" }, &SerdeCodec::<Task>::new())
            .await
            .unwrap()
    );
    assert_eq!(repository.migrate_collection_as::<Task>("tasks", 10).await.unwrap(), 1);
    assert_eq!(repository.update_schema_version_on_collection("tasks").await.unwrap(), 0);

    let tasks = snapshot(&repository).await;
    assert!(tasks.iter().all(|task| matches!(task.get_str("schema_version"), Ok("2"))));

    repository
        .backend()
        .insert_one("notes", doc! { "schema_version": ["2"] })
        .await
        .unwrap();
    assert_eq!(repository.update_schema_version_on_collection("notes").await.unwrap(), 1);
}

async fn seed_mixed_identifiers(repository: &Repository<InMemoryStore>) {
    for task in [
        doc! { "_id": 1, "title": "one" },
        doc! { "_id": 2, "title": "two", "schema_version": "2" },
        doc! { "_id": "three", "title": "three" },
        doc! { "title": "four" },
        doc! { "title": "five", "schema_version": "3" },
        doc! { "title": "six" },
    ] {
        repository.backend().insert_one("tasks", task).await.unwrap();
    }
}

#[tokio::test]
async fn migration_crosses_identifier_types() {
    let repository = repository(1);
    seed_mixed_identifiers(&repository).await;

    assert_eq!(repository.migrate_collection_as::<Task>("tasks", 100).await.unwrap(), 4);
    assert_eq!(
        repository
            .backend()
            .count_documents("tasks", doc! { "schema_version": "2" })
            .await
            .unwrap(),
        5
    );
    assert_eq!(repository.migrate_collection_as::<Task>("tasks", 100).await.unwrap(), 0);
}

#[tokio::test]
async fn stamping_crosses_identifier_types() {
    let repository = repository(1);
    seed_mixed_identifiers(&repository).await;

    assert_eq!(repository.update_schema_version_on_collection("tasks").await.unwrap(), 4);
    assert_eq!(
        repository
            .backend()
            .count_documents("tasks", doc! { "schema_version": { "$exists": false } })
            .await
            .unwrap(),
        0
    );
}
