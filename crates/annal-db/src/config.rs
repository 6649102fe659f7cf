//! Runtime audit policy.
//!
//! `AuditConfiguration` is built explicitly and shared as an
//! `Arc<AuditConfiguration>` by change capture, the schema mapper and the
//! history reader. It is mutable until the first revision is allocated; from
//! then on every setter fails with [`AuditError::ConfigurationLocked`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use annal_config::AuditSettings;
use annal_core::enums::FieldType;

use crate::error::AuditError;

/// Produces the actor recorded on a new revision.
pub type ActorResolver = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Shadow table and column naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Naming {
    pub table_prefix: String,
    pub table_suffix: String,
    pub revision_table: String,
    pub revision_field: String,
    pub change_kind_field: String,
}

impl Default for Naming {
    fn default() -> Self {
        let defaults = AuditSettings::default();
        Self {
            table_prefix: defaults.table_prefix,
            table_suffix: defaults.table_suffix,
            revision_table: defaults.revision_table,
            revision_field: defaults.revision_field,
            change_kind_field: defaults.change_kind_field,
        }
    }
}

struct Policy {
    audited: BTreeSet<String>,
    global_ignore: BTreeSet<String>,
    entity_ignore: BTreeMap<String, BTreeSet<String>>,
    custom_types: BTreeMap<String, FieldType>,
    naming: Naming,
    batch_size: usize,
    actor: Option<ActorResolver>,
}

pub struct AuditConfiguration {
    policy: RwLock<Policy>,
    locked: AtomicBool,
    generation: AtomicU64,
}

impl std::fmt::Debug for AuditConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let policy = self.read();
        f.debug_struct("AuditConfiguration")
            .field("audited", &policy.audited)
            .field("global_ignore", &policy.global_ignore)
            .field("entity_ignore", &policy.entity_ignore)
            .field("custom_types", &policy.custom_types)
            .field("naming", &policy.naming)
            .field("batch_size", &policy.batch_size)
            .field("has_actor_resolver", &policy.actor.is_some())
            .field("locked", &self.is_locked())
            .finish()
    }
}

impl Default for AuditConfiguration {
    fn default() -> Self {
        Self::for_entities(std::iter::empty::<String>())
    }
}

impl AuditConfiguration {
    /// A configuration auditing the given entity types with default naming.
    pub fn for_entities<I, S>(entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            policy: RwLock::new(Policy {
                audited: entities.into_iter().map(Into::into).collect(),
                global_ignore: BTreeSet::new(),
                entity_ignore: BTreeMap::new(),
                custom_types: BTreeMap::new(),
                naming: Naming::default(),
                batch_size: AuditSettings::default().batch_size,
                actor: None,
            }),
            locked: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    /// Build the policy from file/env settings.
    ///
    /// A non-empty `default_actor` becomes a constant actor resolver.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::UnsupportedFieldType` if a custom type maps onto
    /// another custom type.
    pub fn from_settings(settings: &AuditSettings) -> Result<Self, AuditError> {
        let config = Self::for_entities(settings.audited_entities.iter().cloned());
        config.set_global_ignore_columns(settings.global_ignore_columns.iter().cloned())?;
        for (entity, properties) in &settings.entity_ignored_properties {
            config.set_entity_ignored_properties(entity, properties.iter().cloned())?;
        }
        for (name, base) in &settings.custom_types {
            config.register_custom_type(name, FieldType::from_name(base))?;
        }
        config.set_naming(Naming {
            table_prefix: settings.table_prefix.clone(),
            table_suffix: settings.table_suffix.clone(),
            revision_table: settings.revision_table.clone(),
            revision_field: settings.revision_field.clone(),
            change_kind_field: settings.change_kind_field.clone(),
        })?;
        config.set_batch_size(settings.batch_size)?;
        if let Some(actor) = settings.default_actor() {
            let actor = actor.to_string();
            config.set_actor_resolver(move || Some(actor.clone()))?;
        }
        Ok(config)
    }

    fn read(&self) -> RwLockReadGuard<'_, Policy> {
        self.policy.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn mutate(&self, f: impl FnOnce(&mut Policy)) -> Result<(), AuditError> {
        let mut policy = self.policy.write().unwrap_or_else(PoisonError::into_inner);
        // Checked under the write lock so a setter cannot race `lock()`.
        if self.is_locked() {
            return Err(AuditError::ConfigurationLocked);
        }
        f(&mut policy);
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    // -- setters ------------------------------------------------------------

    /// # Errors
    ///
    /// Returns `AuditError::ConfigurationLocked` once locked.
    pub fn set_audited_entities<I, S>(&self, entities: I) -> Result<(), AuditError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entities = entities.into_iter().map(Into::into).collect();
        self.mutate(|p| p.audited = entities)
    }

    /// # Errors
    ///
    /// Returns `AuditError::ConfigurationLocked` once locked.
    pub fn add_audited_entity(&self, entity: impl Into<String>) -> Result<(), AuditError> {
        let entity = entity.into();
        self.mutate(|p| {
            p.audited.insert(entity);
        })
    }

    /// Column names never copied to any shadow table.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::ConfigurationLocked` once locked.
    pub fn set_global_ignore_columns<I, S>(&self, columns: I) -> Result<(), AuditError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = columns.into_iter().map(Into::into).collect();
        self.mutate(|p| p.global_ignore = columns)
    }

    /// Property names of `entity` not copied to its shadow table.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::ConfigurationLocked` once locked.
    pub fn set_entity_ignored_properties<I, S>(
        &self,
        entity: &str,
        properties: I,
    ) -> Result<(), AuditError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let properties = properties.into_iter().map(Into::into).collect();
        let entity = entity.to_string();
        self.mutate(|p| {
            p.entity_ignore.insert(entity, properties);
        })
    }

    /// Register a host type name against a base type with known serialization.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::UnsupportedFieldType` if `base` is itself custom,
    /// or `AuditError::ConfigurationLocked` once locked.
    pub fn register_custom_type(&self, name: &str, base: FieldType) -> Result<(), AuditError> {
        if base.is_custom() {
            return Err(AuditError::UnsupportedFieldType {
                entity: "*".into(),
                field: name.to_string(),
                type_name: base.name().to_string(),
            });
        }
        let name = name.to_string();
        self.mutate(|p| {
            p.custom_types.insert(name, base);
        })
    }

    /// # Errors
    ///
    /// Returns `AuditError::ConfigurationLocked` once locked.
    pub fn set_actor_resolver(
        &self,
        resolver: impl Fn() -> Option<String> + Send + Sync + 'static,
    ) -> Result<(), AuditError> {
        let resolver: ActorResolver = Arc::new(resolver);
        self.mutate(|p| p.actor = Some(resolver))
    }

    /// # Errors
    ///
    /// Returns `AuditError::ConfigurationLocked` once locked.
    pub fn set_naming(&self, naming: Naming) -> Result<(), AuditError> {
        self.mutate(|p| p.naming = naming)
    }

    /// # Errors
    ///
    /// Returns `AuditError::ConfigurationLocked` once locked, or
    /// `AuditError::InvalidState` for a zero batch size.
    pub fn set_batch_size(&self, batch_size: usize) -> Result<(), AuditError> {
        if batch_size == 0 {
            return Err(AuditError::InvalidState(
                "batch size must be greater than zero".into(),
            ));
        }
        self.mutate(|p| p.batch_size = batch_size)
    }

    // -- getters ------------------------------------------------------------

    #[must_use]
    pub fn is_audited(&self, entity: &str) -> bool {
        self.read().audited.contains(entity)
    }

    #[must_use]
    pub fn audited_entities(&self) -> Vec<String> {
        self.read().audited.iter().cloned().collect()
    }

    #[must_use]
    pub fn is_globally_ignored(&self, column: &str) -> bool {
        self.read().global_ignore.contains(column)
    }

    /// Whether `field` (stored in `column`) of `entity` is left out of audit rows.
    #[must_use]
    pub fn is_property_ignored(&self, entity: &str, field: &str, column: &str) -> bool {
        let policy = self.read();
        policy.global_ignore.contains(column)
            || policy.global_ignore.contains(field)
            || policy
                .entity_ignore
                .get(entity)
                .is_some_and(|props| props.contains(field))
    }

    /// Resolve a field type to the type it is stored as.
    ///
    /// Built-in types resolve to themselves; custom types resolve through the
    /// registry and are `None` when unregistered.
    #[must_use]
    pub fn resolve_field_type(&self, field_type: &FieldType) -> Option<FieldType> {
        match field_type {
            FieldType::Custom(name) => self.read().custom_types.get(name).cloned(),
            other => Some(other.clone()),
        }
    }

    #[must_use]
    pub fn naming(&self) -> Naming {
        self.read().naming.clone()
    }

    /// `{prefix}{table}{suffix}`.
    #[must_use]
    pub fn shadow_table_name(&self, table: &str) -> String {
        let policy = self.read();
        format!(
            "{}{table}{}",
            policy.naming.table_prefix, policy.naming.table_suffix
        )
    }

    #[must_use]
    pub fn revision_table(&self) -> String {
        self.read().naming.revision_table.clone()
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.read().batch_size
    }

    /// Run the actor resolver, if any.
    #[must_use]
    pub fn resolve_actor(&self) -> Option<String> {
        let resolver = self.read().actor.clone();
        resolver.and_then(|resolve| resolve())
    }

    /// Freeze the configuration. Idempotent.
    pub fn lock(&self) {
        let _guard = self.policy.write().unwrap_or_else(PoisonError::into_inner);
        if !self.locked.swap(true, Ordering::AcqRel) {
            tracing::debug!("audit configuration locked");
        }
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Bumped on every successful mutation; used to invalidate cached layouts.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}
