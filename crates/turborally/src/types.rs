//! Entity type catalog
//!
//! Every query names exactly one Rally entity type. The catalog maps the
//! names callers use (case-insensitive, including a few well known aliases)
//! onto the canonical type and the WSAPI path segment used in URLs.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::{Error, Result};

/// Entity types every Rally subscription exposes.
const BUILTIN_TYPES: &[&str] = &[
    "AllowedAttributeValue",
    "Artifact",
    "Attachment",
    "AttributeDefinition",
    "Build",
    "BuildDefinition",
    "Change",
    "Changeset",
    "ConversationPost",
    "Defect",
    "DefectSuite",
    "HierarchicalRequirement",
    "Iteration",
    "Milestone",
    "PortfolioItem",
    "PortfolioItem/Feature",
    "PortfolioItem/Initiative",
    "PortfolioItem/Theme",
    "PreliminaryEstimate",
    "Project",
    "Release",
    "Revision",
    "RevisionHistory",
    "SCMRepository",
    "Subscription",
    "Tag",
    "Task",
    "TestCase",
    "TestCaseResult",
    "TestCaseStep",
    "TestFolder",
    "TestSet",
    "TypeDefinition",
    "User",
    "UserProfile",
    "Workspace",
];

/// Friendly names accepted in place of the canonical type.
const ALIASES: &[(&str, &str)] = &[
    ("Story", "HierarchicalRequirement"),
    ("UserStory", "HierarchicalRequirement"),
    ("Feature", "PortfolioItem/Feature"),
    ("Initiative", "PortfolioItem/Initiative"),
    ("Theme", "PortfolioItem/Theme"),
];

/// A validated entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityType {
    name: String,
}

impl EntityType {
    /// Canonical type name, e.g. `HierarchicalRequirement`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// WSAPI path segment, e.g. `hierarchicalrequirement`.
    pub fn path(&self) -> String {
        self.name.to_ascii_lowercase()
    }
}

/// Case-insensitive registry of known entity type names.
#[derive(Debug)]
pub struct EntityTypes {
    // lower-cased lookup key -> canonical name
    names: RwLock<BTreeMap<String, String>>,
}

impl Default for EntityTypes {
    fn default() -> Self {
        let mut names = BTreeMap::new();
        for name in BUILTIN_TYPES {
            names.insert(name.to_ascii_lowercase(), name.to_string());
        }
        for (alias, target) in ALIASES {
            names.insert(alias.to_ascii_lowercase(), target.to_string());
        }
        Self {
            names: RwLock::new(names),
        }
    }
}

impl EntityTypes {
    /// Resolve a caller-supplied name to a single known entity type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTypeName`] carrying `name` unchanged when it
    /// is empty, lists more than one type, or is not a known type.
    pub fn resolve(&self, name: &str) -> Result<EntityType> {
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed.contains(',') {
            return Err(Error::InvalidTypeName(name.to_string()));
        }

        let names = self
            .names
            .read()
            .map_err(|_| Error::Other(anyhow::anyhow!("entity type catalog lock poisoned")))?;
        names
            .get(&trimmed.to_ascii_lowercase())
            .map(|canonical| EntityType {
                name: canonical.clone(),
            })
            .ok_or_else(|| Error::InvalidTypeName(name.to_string()))
    }

    /// Whether `name` resolves to a known type.
    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }

    /// Register additional type names (e.g. custom portfolio item types).
    pub fn extend<I, S>(&self, names: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = self
            .names
            .write()
            .map_err(|_| Error::Other(anyhow::anyhow!("entity type catalog lock poisoned")))?;
        let before = map.len();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() || name.contains(',') {
                continue;
            }
            map.entry(name.to_ascii_lowercase())
                .or_insert_with(|| name.to_string());
        }
        Ok(map.len() - before)
    }

    /// Canonical names currently known, sorted and de-duplicated.
    pub fn names(&self) -> Vec<String> {
        let Ok(map) = self.names.read() else {
            return Vec::new();
        };
        let mut names: Vec<String> = map.values().cloned().collect();
        names.sort();
        names.dedup();
        names
    }
}
