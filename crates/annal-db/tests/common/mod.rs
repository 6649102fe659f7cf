//! Shared fixtures for annal-db integration tests.
//!
//! The entity model mirrors a small blog: authors write articles, articles
//! have comments (not audited), translations (composite id) and tags
//! (many-to-many). `ProfileAudit` and `Issue196Entity` cover ignored
//! properties and custom types; `Invoice` has a custom type whose values are
//! not integers in the primary table; `Reading` is keyed by a float.

#![allow(dead_code)]

use std::sync::Arc;

use annal_config::LoggingConfig;
use annal_core::enums::FieldType;
use annal_core::ids::RevisionId;
use annal_core::metadata::{AssociationMetadata, EntityMetadata, FieldMetadata};
use annal_core::snapshot::Snapshot;
use annal_db::AnnalDb;
use annal_db::config::AuditConfiguration;
use annal_db::manager::AuditManager;
use annal_db::metadata::{MetadataProvider, MetadataRegistry};
use annal_db::unit_of_work::create_primary_tables;
use serde_json::Value;

pub const AUDITED: [&str; 7] = [
    "Author",
    "Article",
    "ProfileAudit",
    "Issue196Entity",
    "Translation",
    "Invoice",
    "Reading",
];

pub fn fields(pairs: &[(&str, Value)]) -> Snapshot {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

pub fn metadata() -> Arc<dyn MetadataProvider> {
    let mut registry = MetadataRegistry::new();
    let entities = [
        EntityMetadata::new("Author", "authors")
            .id(FieldMetadata::new("id", FieldType::Integer))
            .field(FieldMetadata::new("name", FieldType::Text))
            .association(AssociationMetadata::to_many("articles", "Article", "author")),
        EntityMetadata::new("Article", "articles")
            .id(FieldMetadata::new("id", FieldType::Integer))
            .field(FieldMetadata::new("title", FieldType::Text))
            .field(FieldMetadata::new("text", FieldType::Text).nullable())
            .field(FieldMetadata::new("author_id", FieldType::Integer).nullable())
            .association(AssociationMetadata::to_one("author", "Author", "author_id"))
            .association(AssociationMetadata::to_many("comments", "Comment", "article"))
            .association(AssociationMetadata::to_many(
                "translations",
                "Translation",
                "article_id",
            ))
            .association(AssociationMetadata::many_to_many(
                "tags",
                "Tag",
                "article_tags",
            )),
        EntityMetadata::new("Comment", "comments")
            .id(FieldMetadata::new("id", FieldType::Integer))
            .field(FieldMetadata::new("text", FieldType::Text))
            .field(FieldMetadata::new("article_id", FieldType::Integer).nullable())
            .association(AssociationMetadata::to_one("article", "Article", "article_id")),
        EntityMetadata::new("Translation", "translations")
            .id(FieldMetadata::new("article_id", FieldType::Integer))
            .id(FieldMetadata::new("locale", FieldType::Text))
            .field(FieldMetadata::new("text", FieldType::Text)),
        EntityMetadata::new("ProfileAudit", "profiles")
            .id(FieldMetadata::new("id", FieldType::Integer))
            .field(FieldMetadata::new("biography", FieldType::Text))
            .field(FieldMetadata::new("ignoreProperty", FieldType::Text).nullable())
            .field(FieldMetadata::new("ignoreMe", FieldType::Text).nullable()),
        EntityMetadata::new("Issue196Entity", "issue196")
            .id(FieldMetadata::new("id", FieldType::Integer))
            .field(FieldMetadata::new(
                "sqlConversionField",
                FieldType::from_name("issue196type"),
            )),
        EntityMetadata::new("Invoice", "invoices")
            .id(FieldMetadata::new("id", FieldType::Integer))
            .field(FieldMetadata::new("amount", FieldType::from_name("money"))),
        EntityMetadata::new("Reading", "readings")
            .id(FieldMetadata::new("code", FieldType::Float))
            .field(FieldMetadata::new("label", FieldType::Text)),
    ];
    for entity in entities {
        registry.register(entity).unwrap();
    }
    Arc::new(registry)
}

pub fn config() -> Arc<AuditConfiguration> {
    let config = AuditConfiguration::for_entities(AUDITED);
    config.set_global_ignore_columns(["ignoreMe"]).unwrap();
    config
        .set_entity_ignored_properties("ProfileAudit", ["ignoreProperty"])
        .unwrap();
    config
        .register_custom_type("issue196type", FieldType::Text)
        .unwrap();
    config
        .register_custom_type("money", FieldType::Integer)
        .unwrap();
    config
        .set_actor_resolver(|| Some("beberlei".to_string()))
        .unwrap();
    Arc::new(config)
}

/// Open `path`, create primary and audit tables, return the database and manager.
pub async fn setup_at(path: &str) -> (AnnalDb, AuditManager) {
    LoggingConfig::default().init_test_tracing();
    let db = AnnalDb::open_local(path).await.unwrap();
    let manager = AuditManager::new(config(), metadata());
    create_primary_tables(&db, manager.metadata().as_ref())
        .await
        .unwrap();
    manager.create_schema(&db).await.unwrap();
    (db, manager)
}

pub async fn setup() -> (AnnalDb, AuditManager) {
    setup_at(":memory:").await
}

pub fn rev(id: i64) -> RevisionId {
    RevisionId(id)
}
