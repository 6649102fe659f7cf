//! Fixtures shared by unit tests.

use std::sync::Arc;

use annal_core::enums::FieldType;
use annal_core::metadata::{AssociationMetadata, EntityMetadata, FieldMetadata};
use annal_core::snapshot::Snapshot;
use serde_json::Value;

use crate::config::AuditConfiguration;
use crate::metadata::{MetadataProvider, MetadataRegistry};

pub fn snapshot(pairs: &[(&str, Value)]) -> Snapshot {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

pub fn fixture_metadata() -> Arc<dyn MetadataProvider> {
    let registry = MetadataRegistry::new()
        .with(
            EntityMetadata::new("Author", "authors")
                .id(FieldMetadata::new("id", FieldType::Integer))
                .field(FieldMetadata::new("name", FieldType::Text))
                .association(AssociationMetadata::to_many("articles", "Article", "author")),
        )
        .and_then(|r| {
            r.with(
                EntityMetadata::new("Article", "articles")
                    .id(FieldMetadata::new("id", FieldType::Integer))
                    .field(FieldMetadata::new("title", FieldType::Text))
                    .field(FieldMetadata::new("text", FieldType::Text).nullable())
                    .field(FieldMetadata::new("author_id", FieldType::Integer).nullable())
                    .association(AssociationMetadata::to_one("author", "Author", "author_id"))
                    .association(AssociationMetadata::many_to_many(
                        "tags",
                        "Tag",
                        "article_tags",
                    )),
            )
        })
        .and_then(|r| {
            r.with(
                EntityMetadata::new("ProfileAudit", "profiles")
                    .id(FieldMetadata::new("id", FieldType::Integer))
                    .field(FieldMetadata::new("biography", FieldType::Text))
                    .field(FieldMetadata::new("ignoreProperty", FieldType::Text).nullable())
                    .field(FieldMetadata::new("ignoreMe", FieldType::Text).nullable()),
            )
        })
        .and_then(|r| {
            r.with(
                EntityMetadata::new("Issue196Entity", "issue196")
                    .id(FieldMetadata::new("id", FieldType::Integer))
                    .field(FieldMetadata::new(
                        "sqlConversionField",
                        FieldType::from_name("issue196type"),
                    )),
            )
        })
        .and_then(|r| {
            r.with(
                EntityMetadata::new("Translation", "translations")
                    .id(FieldMetadata::new("article_id", FieldType::Integer))
                    .id(FieldMetadata::new("locale", FieldType::Text))
                    .field(FieldMetadata::new("text", FieldType::Text)),
            )
        })
        .expect("fixture metadata is valid");
    Arc::new(registry)
}

pub fn fixture_config() -> Arc<AuditConfiguration> {
    let config = AuditConfiguration::for_entities([
        "Author",
        "Article",
        "ProfileAudit",
        "Issue196Entity",
        "Translation",
    ]);
    config.set_global_ignore_columns(["ignoreMe"]).unwrap();
    config
        .set_entity_ignored_properties("ProfileAudit", ["ignoreProperty"])
        .unwrap();
    config
        .register_custom_type("issue196type", FieldType::Text)
        .unwrap();
    config
        .set_actor_resolver(|| Some("beberlei".to_string()))
        .unwrap();
    Arc::new(config)
}
