//! Entity records and on-demand reference resolution
//!
//! An [`Entity`] is one record returned by the service. Attributes that
//! point at other records are kept as [`EntityRef`] / [`CollectionRef`]
//! shells; calling `resolve` on them fetches the target in full once and
//! caches it, so later accesses are free.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::OnceCell;

use crate::{
    client::Rally,
    error::{Error, Result},
};

/// Metadata keys that describe a record rather than hold its data.
const REF_KEY: &str = "_ref";
const TYPE_KEY: &str = "_type";
const NAME_KEY: &str = "_refObjectName";
const OID_KEY: &str = "ObjectID";
const COUNT_KEY: &str = "Count";

/// A single record returned by the service.
#[derive(Debug, Clone)]
pub struct Entity {
    oid: u64,
    type_name: String,
    ref_url: Option<String>,
    ref_object_name: Option<String>,
    attributes: BTreeMap<String, Attribute>,
    hydrated: bool,
}

/// The value of one entity attribute.
#[derive(Debug, Clone)]
pub enum Attribute {
    /// Scalar or plain structured value
    Value(Value),
    /// Reference to a single other entity
    Ref(EntityRef),
    /// Reference to a collection endpoint (WSAPI 2.0 style)
    Collection(CollectionRef),
    /// Inline list (WSAPI 1.x style collections)
    List(Vec<Attribute>),
}

impl Attribute {
    fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) if map.contains_key(REF_KEY) => {
                if map.contains_key(COUNT_KEY) {
                    Attribute::Collection(CollectionRef::from_map(&map))
                } else {
                    Attribute::Ref(EntityRef::from_map(&map))
                }
            }
            Value::Array(items) => {
                Attribute::List(items.into_iter().map(Attribute::from_json).collect())
            }
            other => Attribute::Value(other),
        }
    }

    /// The plain value, if this attribute is not a reference.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Attribute::Value(v) => Some(v),
            _ => None,
        }
    }

    /// String content of a plain string value.
    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    /// Integer content of a plain numeric value.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_value().and_then(Value::as_i64)
    }

    /// Boolean content of a plain boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        self.as_value().and_then(Value::as_bool)
    }

    /// Whether the attribute is an explicit JSON `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Attribute::Value(Value::Null))
    }

    /// The entity reference, if this attribute is one.
    pub fn as_entity_ref(&self) -> Option<&EntityRef> {
        match self {
            Attribute::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// The collection reference, if this attribute is one.
    pub fn as_collection(&self) -> Option<&CollectionRef> {
        match self {
            Attribute::Collection(c) => Some(c),
            _ => None,
        }
    }

    /// The inline list, if this attribute is one.
    pub fn as_list(&self) -> Option<&[Attribute]> {
        match self {
            Attribute::List(items) => Some(items),
            _ => None,
        }
    }
}

/// Reference to another entity, resolved on first access.
///
/// Clones share the resolution cache.
#[derive(Debug, Clone)]
pub struct EntityRef {
    ref_url: String,
    type_name: Option<String>,
    ref_object_name: Option<String>,
    resolved: Arc<OnceCell<Entity>>,
}

impl EntityRef {
    fn from_map(map: &Map<String, Value>) -> Self {
        Self::new(
            map.get(REF_KEY).and_then(Value::as_str).unwrap_or_default(),
            map.get(TYPE_KEY).and_then(Value::as_str).map(String::from),
            map.get(NAME_KEY).and_then(Value::as_str).map(String::from),
        )
    }

    /// Create an unresolved reference.
    pub fn new(
        ref_url: impl Into<String>,
        type_name: Option<String>,
        ref_object_name: Option<String>,
    ) -> Self {
        Self {
            ref_url: ref_url.into(),
            type_name,
            ref_object_name,
            resolved: Arc::new(OnceCell::new()),
        }
    }

    /// The `_ref` URL.
    pub fn ref_url(&self) -> &str {
        &self.ref_url
    }

    /// The referenced type, when the service reported it.
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    /// The `_refObjectName` display name.
    pub fn ref_object_name(&self) -> Option<&str> {
        self.ref_object_name.as_deref()
    }

    /// Object id parsed from the reference URL.
    pub fn oid(&self) -> Option<u64> {
        oid_from_ref(&self.ref_url)
    }

    /// Whether the target has been fetched in full.
    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some_and(Entity::is_hydrated)
    }

    /// The target, if already resolved.
    pub fn get(&self) -> Option<&Entity> {
        self.resolved.get()
    }

    /// Fetch the target in full on first call; return the cached record after.
    pub async fn resolve(&self, rally: &Rally) -> Result<&Entity> {
        self.resolved
            .get_or_try_init(|| rally.get_by_ref(&self.ref_url))
            .await
    }
}

/// Reference to a collection endpoint, resolved on first access.
#[derive(Debug, Clone)]
pub struct CollectionRef {
    ref_url: String,
    item_type: Option<String>,
    count: usize,
    resolved: Arc<OnceCell<Vec<Entity>>>,
}

impl CollectionRef {
    fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            ref_url: map
                .get(REF_KEY)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            item_type: map.get(TYPE_KEY).and_then(Value::as_str).map(String::from),
            count: map
                .get(COUNT_KEY)
                .and_then(Value::as_u64)
                .and_then(|c| usize::try_from(c).ok())
                .unwrap_or(0),
            resolved: Arc::new(OnceCell::new()),
        }
    }

    /// The collection `_ref` URL.
    pub fn ref_url(&self) -> &str {
        &self.ref_url
    }

    /// Type of the member records.
    pub fn item_type(&self) -> Option<&str> {
        self.item_type.as_deref()
    }

    /// Member count reported alongside the reference.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Whether members have been fetched.
    pub fn is_resolved(&self) -> bool {
        self.resolved.initialized()
    }

    /// Fetch all members in full on first call; return the cached list after.
    pub async fn resolve(&self, rally: &Rally) -> Result<&[Entity]> {
        let label = self.item_type.clone().unwrap_or_else(|| "Collection".to_string());
        let members = self
            .resolved
            .get_or_try_init(|| rally.get_collection(&self.ref_url, label))
            .await?;
        Ok(members.as_slice())
    }
}

impl Entity {
    /// Build an entity from one JSON record.
    ///
    /// `fallback_type` is used when the record carries no `_type`. When
    /// `retain` is given, only those attribute names are kept; anything else
    /// the service sent back is dropped.
    pub(crate) fn from_json(
        value: Value,
        fallback_type: &str,
        hydrated: bool,
        retain: Option<&HashSet<String>>,
    ) -> Result<Self> {
        let Value::Object(mut map) = value else {
            return Err(Error::ResponseValidation(format!(
                "expected a {} record object",
                fallback_type
            )));
        };

        let ref_url = take_string(&mut map, REF_KEY);
        let type_name = take_string(&mut map, TYPE_KEY).unwrap_or_else(|| fallback_type.to_string());
        let ref_object_name = take_string(&mut map, NAME_KEY);

        let oid = map
            .remove(OID_KEY)
            .and_then(|v| v.as_u64())
            .or_else(|| ref_url.as_deref().and_then(oid_from_ref))
            .ok_or_else(|| {
                Error::ResponseValidation(format!("{} record has no ObjectID or _ref", type_name))
            })?;

        let attributes = map
            .into_iter()
            .filter(|(key, _)| !key.starts_with('_'))
            .filter(|(key, _)| retain.is_none_or(|keep| keep.contains(key)))
            .map(|(key, value)| (key, Attribute::from_json(value)))
            .collect();

        Ok(Self {
            oid,
            type_name,
            ref_url,
            ref_object_name,
            attributes,
            hydrated,
        })
    }

    /// Object id (`ObjectID`).
    pub fn oid(&self) -> u64 {
        self.oid
    }

    /// Entity type name as reported by the service.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The `_ref` URL, when present.
    pub fn ref_url(&self) -> Option<&str> {
        self.ref_url.as_deref()
    }

    /// The `_refObjectName` display name, when present.
    pub fn ref_object_name(&self) -> Option<&str> {
        self.ref_object_name.as_deref()
    }

    /// Whether every attribute has been fetched.
    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    /// Look up an attribute present on this record.
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Whether the attribute is present on this record.
    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Names of the attributes present on this record.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// String attribute shortcut.
    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Attribute::as_str)
    }

    /// Integer attribute shortcut.
    pub fn i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Attribute::as_i64)
    }

    /// Display name: `Name` if fetched, else `_refObjectName`.
    pub fn name(&self) -> Option<&str> {
        self.str("Name").or(self.ref_object_name.as_deref())
    }

    /// Entity reference attribute shortcut.
    pub fn reference(&self, name: &str) -> Option<&EntityRef> {
        self.get(name).and_then(Attribute::as_entity_ref)
    }

    /// Collection reference attribute shortcut.
    pub fn collection(&self, name: &str) -> Option<&CollectionRef> {
        self.get(name).and_then(Attribute::as_collection)
    }

    /// `CreationDate` parsed as a UTC timestamp.
    pub fn creation_date(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.str("CreationDate")
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc))
    }

    /// Fully hydrated members of a collection attribute.
    ///
    /// Works for collection references and for inline lists of references;
    /// each member is fetched once and cached on the reference.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the attribute is missing and
    /// [`Error::ResponseValidation`] when it is not a collection.
    pub async fn members(&self, rally: &Rally, name: &str) -> Result<Vec<Entity>> {
        match self.get(name) {
            Some(Attribute::Collection(collection)) => {
                Ok(collection.resolve(rally).await?.to_vec())
            }
            Some(Attribute::List(items)) => {
                let mut members = Vec::with_capacity(items.len());
                for item in items {
                    let reference = item.as_entity_ref().ok_or_else(|| {
                        Error::ResponseValidation(format!(
                            "{}.{} holds a non-reference item",
                            self.type_name, name
                        ))
                    })?;
                    members.push(reference.resolve(rally).await?.clone());
                }
                Ok(members)
            }
            Some(_) => Err(Error::ResponseValidation(format!(
                "{}.{} is not a collection",
                self.type_name, name
            ))),
            None => Err(Error::NotFound(format!(
                "{} has no attribute {}",
                self.type_name, name
            ))),
        }
    }

    /// Replace this record with its fully hydrated form.
    pub async fn hydrate(&mut self, rally: &Rally) -> Result<()> {
        if self.hydrated {
            return Ok(());
        }
        let ref_url = self.ref_url.clone().ok_or_else(|| {
            Error::ResponseValidation(format!("{} {} has no _ref", self.type_name, self.oid))
        })?;
        *self = rally.get_by_ref(&ref_url).await?;
        Ok(())
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

/// Last numeric path segment of a `_ref`, ignoring a legacy `.js` suffix.
pub(crate) fn oid_from_ref(ref_url: &str) -> Option<u64> {
    let path = ref_url.split(['?', '#']).next()?;
    let last = path.trim_end_matches('/').rsplit('/').next()?;
    last.trim_end_matches(".js").parse().ok()
}
