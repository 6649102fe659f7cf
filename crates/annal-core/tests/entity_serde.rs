//! Serde shape tests for the records exchanged with storage and callers.

use annal_core::entities::{AuditRow, AuditedEntity, Revision};
use annal_core::enums::{ChangeKind, FieldType};
use annal_core::ids::{EntityId, RevisionId};
use annal_core::metadata::{AssociationMetadata, EntityMetadata, FieldMetadata};
use annal_core::snapshot::Snapshot;
use chrono::Utc;
use pretty_assertions::assert_eq;
use serde_json::json;

fn sample_row() -> AuditRow {
    let mut snapshot = Snapshot::new();
    snapshot.insert("id".into(), json!(1));
    snapshot.insert("name".into(), json!("a"));
    AuditRow {
        entity: "Entity".into(),
        id: EntityId::from(1),
        revision: RevisionId(3),
        kind: ChangeKind::Update,
        snapshot,
    }
}

#[test]
fn audit_row_json_shape() {
    let value = serde_json::to_value(sample_row()).unwrap();
    assert_eq!(
        value,
        json!({
            "entity": "Entity",
            "id": [1],
            "revision": 3,
            "kind": "UPDATE",
            "snapshot": {"id": 1, "name": "a"}
        })
    );
}

#[test]
fn revision_with_anonymous_actor_roundtrips() {
    let revision = Revision {
        id: RevisionId(9),
        timestamp: Utc::now(),
        actor: None,
        metadata: Some(json!({"reason": "import"})),
    };
    let text = serde_json::to_string(&revision).unwrap();
    let back: Revision = serde_json::from_str(&text).unwrap();
    assert_eq!(back, revision);
}

#[test]
fn audited_entity_keeps_requested_revision() {
    let entity = AuditedEntity::from_row(sample_row(), RevisionId(5));
    assert_eq!(entity.revision, RevisionId(3));
    assert_eq!(entity.as_of, RevisionId(5));
    assert_eq!(entity.get_str("name"), Some("a"));
    assert!(entity.get("missing").is_none());
}

#[test]
fn entity_metadata_deserializes_from_json() {
    let meta: EntityMetadata = serde_json::from_value(json!({
        "name": "Comment",
        "table": "comments",
        "identifier": ["id"],
        "fields": [
            {"name": "id", "column": "id", "field_type": "integer", "nullable": false},
            {"name": "article_id", "column": "article_id", "field_type": "integer", "nullable": true},
            {"name": "body", "column": "body", "field_type": {"custom": "markdown"}, "nullable": false}
        ],
        "associations": [
            {"name": "article", "target": "Article", "kind": {"to_one": {"field": "article_id"}}}
        ]
    }))
    .unwrap();

    meta.validate().unwrap();
    assert_eq!(
        meta.field_named("body").unwrap().field_type,
        FieldType::Custom("markdown".into())
    );
    assert_eq!(
        meta.associations[0],
        AssociationMetadata::to_one("article", "Article", "article_id")
    );
    assert_eq!(
        meta.field_named("article_id"),
        Some(&FieldMetadata::new("article_id", FieldType::Integer).nullable())
    );
}
