use civet_publication::{IntegrityChecker, NewEntity, NewRelationship, PublicationService};
use civet_store::{EntityStore, FileStore, FileStoreOptions};
use civet_types::{AuthorId, EntityId, EntityType, Name, NameParts};
use std::sync::Arc;
use tempfile::TempDir;

fn author() -> AuthorId {
    AuthorId::new("tester").unwrap()
}

async fn harness(dir: &TempDir) -> (PublicationService, IntegrityChecker) {
    let store: Arc<dyn EntityStore> = Arc::new(
        FileStore::open(dir.path(), FileStoreOptions::default())
            .await
            .unwrap(),
    );
    (
        PublicationService::new(Arc::clone(&store)),
        IntegrityChecker::new(store),
    )
}

async fn seed_person(svc: &PublicationService, slug: &str) -> EntityId {
    svc.create_entity(
        NewEntity::new(
            EntityType::Person,
            slug,
            vec![Name::primary(NameParts::full(slug))],
        ),
        &author(),
        "seed",
    )
    .await
    .unwrap()
    .id()
    .unwrap()
}

async fn link(svc: &PublicationService, source: &EntityId, target: &EntityId, kind: &str) {
    svc.create_relationship(
        NewRelationship::new(source.clone(), target.clone(), kind),
        &author(),
        "seed",
    )
    .await
    .unwrap();
}

// ── Cycle prevention checks ───────────────────────────────────────

#[tokio::test]
async fn cycle_check_applies_to_hierarchical_kinds_only() {
    let dir = TempDir::new().unwrap();
    let (svc, checker) = harness(&dir).await;
    let alpha = seed_person(&svc, "alpha").await;
    let beta = seed_person(&svc, "beta").await;
    link(&svc, &alpha, &beta, "MEMBER_OF").await;

    // A reverse MEMBER_OF edge would loop, but membership is not a
    // hierarchy.
    assert!(!checker
        .would_create_cycle(&beta, &alpha, "MEMBER_OF")
        .await
        .unwrap());
    // A hierarchical self-reference always is a cycle.
    assert!(checker
        .would_create_cycle(&alpha, &alpha, "SUPERVISES")
        .await
        .unwrap());
}

#[tokio::test]
async fn cycle_check_follows_chains_of_one_kind() {
    let dir = TempDir::new().unwrap();
    let (svc, checker) = harness(&dir).await;
    let alpha = seed_person(&svc, "alpha").await;
    let beta = seed_person(&svc, "beta").await;
    let gamma = seed_person(&svc, "gamma").await;
    link(&svc, &alpha, &beta, "SUPERVISES").await;
    link(&svc, &beta, &gamma, "SUPERVISES").await;

    // gamma -> alpha closes the alpha -> beta -> gamma chain.
    assert!(checker
        .would_create_cycle(&gamma, &alpha, "SUPERVISES")
        .await
        .unwrap());
    // alpha -> gamma is a shortcut, not a loop.
    assert!(!checker
        .would_create_cycle(&alpha, &gamma, "SUPERVISES")
        .await
        .unwrap());
    // Chains of another hierarchical kind do not count.
    assert!(!checker
        .would_create_cycle(&gamma, &alpha, "PARENT_OF")
        .await
        .unwrap());
}

#[tokio::test]
async fn relationship_exists_reflects_the_store() {
    let dir = TempDir::new().unwrap();
    let (svc, checker) = harness(&dir).await;
    let alpha = seed_person(&svc, "alpha").await;
    let beta = seed_person(&svc, "beta").await;

    assert!(!checker
        .relationship_exists(&alpha, &beta, "MEMBER_OF")
        .await
        .unwrap());
    link(&svc, &alpha, &beta, "MEMBER_OF").await;
    assert!(checker
        .relationship_exists(&alpha, &beta, "MEMBER_OF")
        .await
        .unwrap());
    // Direction matters.
    assert!(!checker
        .relationship_exists(&beta, &alpha, "MEMBER_OF")
        .await
        .unwrap());
}

// ── Repository sweeps ─────────────────────────────────────────────

#[tokio::test]
async fn finds_relationships_orphaned_by_entity_deletion() {
    let dir = TempDir::new().unwrap();
    let (svc, checker) = harness(&dir).await;
    let alpha = seed_person(&svc, "alpha").await;
    let beta = seed_person(&svc, "beta").await;
    link(&svc, &alpha, &beta, "MEMBER_OF").await;

    assert!(checker.find_orphaned_relationships().await.unwrap().is_empty());

    // Entity deletion does not cascade, so the edge is left dangling.
    svc.delete_entity(&beta).await.unwrap();
    let orphaned = checker.find_orphaned_relationships().await.unwrap();
    assert_eq!(orphaned.len(), 1);
    assert_eq!(orphaned[0].target, beta);
}

#[tokio::test]
async fn finds_stored_cycles_per_kind() {
    let dir = TempDir::new().unwrap();
    let (svc, checker) = harness(&dir).await;
    let alpha = seed_person(&svc, "alpha").await;
    let beta = seed_person(&svc, "beta").await;
    link(&svc, &alpha, &beta, "SUPERVISES").await;
    link(&svc, &beta, &alpha, "SUPERVISES").await;
    link(&svc, &alpha, &beta, "MEMBER_OF").await;

    let cycles = checker.find_cycles(None).await.unwrap();
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].len(), 2);
    assert!(cycles[0].iter().all(|rel| rel.kind == "SUPERVISES"));

    assert!(checker.find_cycles(Some("MEMBER_OF")).await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_detection_catches_hand_edited_files() {
    let dir = TempDir::new().unwrap();
    let (svc, checker) = harness(&dir).await;
    let alpha = seed_person(&svc, "alpha").await;
    let beta = seed_person(&svc, "beta").await;
    let rel = svc
        .create_relationship(
            NewRelationship::new(alpha, beta, "MEMBER_OF"),
            &author(),
            "seed",
        )
        .await
        .unwrap();

    assert!(checker.find_duplicate_relationships().await.unwrap().is_empty());

    // A hand-copied file whose content repeats an existing edge under a
    // path the id scheme would never produce.
    let stray = dir.path().join("relationship").join("stray.json");
    std::fs::write(&stray, serde_json::to_vec_pretty(&rel).unwrap()).unwrap();

    let duplicates = checker.find_duplicate_relationships().await.unwrap();
    assert_eq!(duplicates.len(), 1);
    assert_eq!(duplicates[0].len(), 2);
}
