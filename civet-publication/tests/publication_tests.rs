use chrono::NaiveDate;
use civet_publication::{NewEntity, NewRelationship, PublicationService, PublishError};
use civet_store::{EntityStore, FileStore, FileStoreOptions};
use civet_types::{
    AuthorId, EntityId, EntityType, Name, NameKind, NameParts, OwnerId, Version,
};
use std::sync::Arc;
use tempfile::TempDir;

fn author() -> AuthorId {
    AuthorId::new("tester").unwrap()
}

fn person_draft(slug: &str, display: &str) -> NewEntity {
    NewEntity::new(
        EntityType::Person,
        slug,
        vec![Name::primary(NameParts::full(display))],
    )
}

fn party_draft(slug: &str, display: &str) -> NewEntity {
    NewEntity::new(
        EntityType::Organization,
        slug,
        vec![Name::primary(NameParts::full(display))],
    )
    .with_sub_type("political_party")
}

async fn service(dir: &TempDir) -> PublicationService {
    let store = FileStore::open(dir.path(), FileStoreOptions::default())
        .await
        .unwrap();
    PublicationService::new(Arc::new(store))
}

// ── Entity lifecycle ──────────────────────────────────────────────

#[tokio::test]
async fn create_assigns_version_one() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir).await;
    let entity = svc
        .create_entity(person_draft("ram-chandra-poudel", "Ram Chandra Poudel"), &author(), "initial import")
        .await
        .unwrap();

    assert_eq!(entity.version.version_number, 1);
    assert_eq!(entity.version.author.slug, "tester");
    assert_eq!(entity.version.change_description, "initial import");

    let id = entity.id().unwrap();
    let versions = svc.store().list_versions(&OwnerId::Entity(id)).await.unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].snapshot["slug"], "ram-chandra-poudel");
}

#[tokio::test]
async fn create_auto_creates_author() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir).await;
    let author_id = AuthorId::new("first-timer").unwrap();
    assert!(svc.store().get_author(&author_id).await.unwrap().is_none());
    svc.create_entity(person_draft("someone", "Someone"), &author_id, "x")
        .await
        .unwrap();
    let stored = svc.store().get_author(&author_id).await.unwrap().unwrap();
    assert_eq!(stored.slug, "first-timer");
}

#[tokio::test]
async fn duplicate_create_rejected() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir).await;
    svc.create_entity(person_draft("dup", "Dup"), &author(), "x")
        .await
        .unwrap();
    let err = svc
        .create_entity(person_draft("dup", "Dup Again"), &author(), "x")
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::AlreadyExists(_)));
}

#[tokio::test]
async fn invalid_draft_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir).await;
    let mut draft = person_draft("invalid", "One");
    draft.names.push(Name::primary(NameParts::full("Two")));

    let err = svc.create_entity(draft, &author(), "x").await.unwrap_err();
    assert!(matches!(err, PublishError::Validation(_)));

    let id = EntityId::new(EntityType::Person, None, "invalid").unwrap();
    assert!(svc.get_entity(&id).await.unwrap().is_none());
    let versions = svc
        .store()
        .list_versions(&OwnerId::Entity(id))
        .await
        .unwrap();
    assert!(versions.is_empty());
}

#[tokio::test]
async fn update_bumps_version_and_keeps_created_at() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir).await;
    let created = svc
        .create_entity(person_draft("subject", "Before"), &author(), "create")
        .await
        .unwrap();

    let mut changed = created.clone();
    changed.names = vec![Name::primary(NameParts::full("After"))];
    let updated = svc
        .update_entity(changed, &author(), "rename")
        .await
        .unwrap();

    assert_eq!(updated.version.version_number, 2);
    assert_eq!(updated.created_at, created.created_at);

    let versions = svc
        .store()
        .list_versions(&OwnerId::Entity(created.id().unwrap()))
        .await
        .unwrap();
    let numbers: Vec<u32> = versions.iter().map(Version::version_number).collect();
    assert_eq!(numbers, vec![1, 2]);
}

#[tokio::test]
async fn update_of_missing_entity_is_not_found() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir).await;
    let created = svc
        .create_entity(person_draft("ghost", "Ghost"), &author(), "x")
        .await
        .unwrap();
    svc.delete_entity(&created.id().unwrap()).await.unwrap();

    let err = svc.update_entity(created, &author(), "x").await.unwrap_err();
    assert!(matches!(err, PublishError::NotFound(_)));
}

#[tokio::test]
async fn failed_update_leaves_prior_state() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir).await;
    let created = svc
        .create_entity(person_draft("stable", "Stable"), &author(), "x")
        .await
        .unwrap();

    let mut broken = created.clone();
    broken.names.clear();
    let err = svc.update_entity(broken, &author(), "x").await.unwrap_err();
    assert!(matches!(err, PublishError::Validation(_)));

    let current = svc.get_entity(&created.id().unwrap()).await.unwrap().unwrap();
    assert_eq!(current, created);
}

#[tokio::test]
async fn delete_preserves_history() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir).await;
    let created = svc
        .create_entity(person_draft("mortal", "Mortal"), &author(), "x")
        .await
        .unwrap();
    let id = created.id().unwrap();

    assert!(svc.delete_entity(&id).await.unwrap());
    assert!(!svc.delete_entity(&id).await.unwrap());
    assert!(svc.get_entity(&id).await.unwrap().is_none());

    let versions = svc
        .store()
        .list_versions(&OwnerId::Entity(id))
        .await
        .unwrap();
    assert_eq!(versions.len(), 1);
}

#[tokio::test]
async fn recreate_after_delete_continues_numbering() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir).await;
    let created = svc
        .create_entity(person_draft("phoenix", "Phoenix"), &author(), "x")
        .await
        .unwrap();
    svc.delete_entity(&created.id().unwrap()).await.unwrap();

    let reborn = svc
        .create_entity(person_draft("phoenix", "Phoenix II"), &author(), "x")
        .await
        .unwrap();
    assert_eq!(reborn.version.version_number, 2);
}

#[tokio::test]
async fn batch_create_stops_on_first_error() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir).await;
    svc.create_entity(person_draft("taken", "Taken"), &author(), "x")
        .await
        .unwrap();

    let drafts = vec![
        person_draft("fresh", "Fresh"),
        person_draft("taken", "Collision"),
        person_draft("never", "Never"),
    ];
    let err = svc
        .batch_create_entities(drafts, &author(), "x")
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::AlreadyExists(_)));

    let fresh = EntityId::new(EntityType::Person, None, "fresh").unwrap();
    let never = EntityId::new(EntityType::Person, None, "never").unwrap();
    assert!(svc.get_entity(&fresh).await.unwrap().is_some());
    assert!(svc.get_entity(&never).await.unwrap().is_none());
}

// ── Concurrency ───────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_updates_stay_gapless() {
    let dir = TempDir::new().unwrap();
    let svc = Arc::new(service(&dir).await);
    let created = svc
        .create_entity(person_draft("contended", "v0"), &author(), "create")
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..5 {
        let svc = Arc::clone(&svc);
        let mut entity = created.clone();
        handles.push(tokio::spawn(async move {
            entity.names = vec![Name::primary(NameParts::full(format!("v{i}")))];
            svc.update_entity(entity, &author(), "concurrent").await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let versions = svc
        .store()
        .list_versions(&OwnerId::Entity(created.id().unwrap()))
        .await
        .unwrap();
    let numbers: Vec<u32> = versions.iter().map(Version::version_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6]);
}

// ── Relationships ─────────────────────────────────────────────────

async fn seeded(dir: &TempDir) -> (PublicationService, EntityId, EntityId) {
    let svc = service(dir).await;
    let p = svc
        .create_entity(person_draft("ram-chandra-poudel", "Ram Chandra Poudel"), &author(), "x")
        .await
        .unwrap();
    let org = svc
        .create_entity(party_draft("nepali-congress", "Nepali Congress"), &author(), "x")
        .await
        .unwrap();
    (svc, p.id().unwrap(), org.id().unwrap())
}

#[tokio::test]
async fn relationship_lifecycle() {
    let dir = TempDir::new().unwrap();
    let (svc, person, org) = seeded(&dir).await;

    let mut draft = NewRelationship::new(person.clone(), org.clone(), "MEMBER_OF");
    draft.start_date = NaiveDate::from_ymd_opt(1960, 1, 1);
    let rel = svc
        .create_relationship(draft, &author(), "joined")
        .await
        .unwrap();
    assert_eq!(rel.version.version_number, 1);

    let mut ended = rel.clone();
    ended.end_date = NaiveDate::from_ymd_opt(2020, 1, 1);
    let updated = svc
        .update_relationship(ended, &author(), "left")
        .await
        .unwrap();
    assert_eq!(updated.version.version_number, 2);

    let id = updated.id().unwrap();
    assert!(svc.delete_relationship(&id).await.unwrap());
    assert!(svc.get_relationship(&id).await.unwrap().is_none());
    let versions = svc
        .store()
        .list_versions(&OwnerId::Relationship(id))
        .await
        .unwrap();
    assert_eq!(versions.len(), 2);
}

#[tokio::test]
async fn dangling_endpoints_rejected_individually() {
    let dir = TempDir::new().unwrap();
    let (svc, person, _) = seeded(&dir).await;
    let nowhere = EntityId::new(EntityType::Location, None, "nowhere").unwrap();

    let err = svc
        .create_relationship(
            NewRelationship::new(nowhere.clone(), person.clone(), "BORN_IN"),
            &author(),
            "x",
        )
        .await
        .unwrap_err();
    match err {
        PublishError::DanglingReference(msg) => assert!(msg.contains("nowhere")),
        other => panic!("expected DanglingReference, got {other}"),
    }

    let err = svc
        .create_relationship(
            NewRelationship::new(person, nowhere, "BORN_IN"),
            &author(),
            "x",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::DanglingReference(_)));
}

#[tokio::test]
async fn relationship_temporal_validation() {
    let dir = TempDir::new().unwrap();
    let (svc, person, org) = seeded(&dir).await;
    let mut draft = NewRelationship::new(person, org, "MEMBER_OF");
    draft.start_date = NaiveDate::from_ymd_opt(2020, 1, 1);
    draft.end_date = NaiveDate::from_ymd_opt(2019, 1, 1);
    let err = svc.create_relationship(draft, &author(), "x").await.unwrap_err();
    assert!(matches!(err, PublishError::Validation(_)));
}

#[tokio::test]
async fn duplicate_relationship_rejected() {
    let dir = TempDir::new().unwrap();
    let (svc, person, org) = seeded(&dir).await;
    svc.create_relationship(
        NewRelationship::new(person.clone(), org.clone(), "MEMBER_OF"),
        &author(),
        "x",
    )
    .await
    .unwrap();
    let err = svc
        .create_relationship(NewRelationship::new(person, org, "MEMBER_OF"), &author(), "x")
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::AlreadyExists(_)));
}

// ── Composite update with compensation ────────────────────────────

#[tokio::test]
async fn composite_update_success() {
    let dir = TempDir::new().unwrap();
    let (svc, person, org) = seeded(&dir).await;
    let mut entity = svc.get_entity(&person).await.unwrap().unwrap();
    entity.names = vec![Name::primary(NameParts::full("Renamed"))];

    let (updated, relationships) = svc
        .update_entity_with_relationships(
            entity,
            vec![NewRelationship::new(person.clone(), org, "MEMBER_OF")],
            &author(),
            "composite",
        )
        .await
        .unwrap();
    assert_eq!(updated.version.version_number, 2);
    assert_eq!(relationships.len(), 1);
}

#[tokio::test]
async fn composite_failure_compensates() {
    let dir = TempDir::new().unwrap();
    let (svc, person, org) = seeded(&dir).await;
    let before = svc.get_entity(&person).await.unwrap().unwrap();

    let mut entity = before.clone();
    entity.names = vec![Name::primary(NameParts::full("Should Not Stick"))];
    let nowhere = EntityId::new(EntityType::Location, None, "nowhere").unwrap();

    let err = svc
        .update_entity_with_relationships(
            entity,
            vec![
                NewRelationship::new(person.clone(), org.clone(), "MEMBER_OF"),
                NewRelationship::new(person.clone(), nowhere, "BORN_IN"),
            ],
            &author(),
            "composite",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::DanglingReference(_)));

    // Entity object restored; the good relationship rolled back.
    let after = svc.get_entity(&person).await.unwrap().unwrap();
    assert_eq!(after, before);
    let rel_id = NewRelationship::new(person, org, "MEMBER_OF").id().unwrap();
    assert!(svc.get_relationship(&rel_id).await.unwrap().is_none());
}

// ── Names invariant through the service ───────────────────────────

#[tokio::test]
async fn alias_names_allowed_alongside_primary() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir).await;
    let mut draft = person_draft("nicknamed", "Full Name");
    draft.names.push(Name {
        kind: NameKind::Alias,
        en: Some(NameParts::full("Nick")),
        ne: None,
    });
    let entity = svc.create_entity(draft, &author(), "x").await.unwrap();
    assert_eq!(entity.names.len(), 2);
    assert_eq!(
        entity.primary_name().unwrap().en.as_ref().unwrap().full,
        "Full Name"
    );
}
