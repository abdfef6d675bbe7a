use crate::config::NEW_ENTITY_PREFIX;
use crate::value::Value;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static ENTITY_ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:Q[1-9]\d*|P[1-9]\d*|L[1-9]\d*(?:-[FS][1-9]\d*)?)$").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Item,
    Property,
    Lexeme,
    Form,
    Sense,
}

/// A concrete Wikidata entity id such as `Q42`, `P31` or `L7-F1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(String);

impl EntityId {
    pub fn parse(raw: &str) -> Option<Self> {
        if ENTITY_ID_REGEX.is_match(raw) {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    /// For ids taken from trusted constants.
    pub(crate) fn new_unchecked(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> EntityKind {
        let s = self.0.as_str();
        if s.starts_with('Q') {
            EntityKind::Item
        } else if s.starts_with('P') {
            EntityKind::Property
        } else if s.contains("-F") {
            EntityKind::Form
        } else if s.contains("-S") {
            EntityKind::Sense
        } else {
            EntityKind::Lexeme
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A property id (`P\d+`), used as the predicate of a snak.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyId(String);

impl PropertyId {
    pub fn parse(raw: &str) -> Option<Self> {
        match EntityId::parse(raw) {
            Some(id) if id.kind() == EntityKind::Property => Some(Self(id.0)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved entity: an existing id, or an item created by `CREATE`.
///
/// Created items are numbered per parse session (`seq`); `scope` tells sessions
/// of different inputs apart so their items never share a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Entity {
    Existing(EntityId),
    New { scope: u32, seq: u32 },
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Existing(id) => id.kind(),
            Entity::New { .. } => EntityKind::Item,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Existing(id) => write!(f, "{}", id),
            Entity::New { scope: 0, seq } => write!(f, "{}{}", NEW_ENTITY_PREFIX, seq),
            Entity::New { scope, seq } => write!(f, "{}{}-{}", NEW_ENTITY_PREFIX, scope, seq),
        }
    }
}

/// Entity position as written in the input, before `LAST` is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    Entity(Entity),
    Last,
}

impl EntityRef {
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.eq_ignore_ascii_case("LAST") {
            return Some(EntityRef::Last);
        }
        EntityId::parse(raw).map(|id| EntityRef::Entity(Entity::Existing(id)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Snak {
    pub property: PropertyId,
    pub value: Value,
}

impl Snak {
    pub fn new(property: PropertyId, value: Value) -> Self {
        Self { property, value }
    }
}

/// Snaks of one reference, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Reference {
    pub snaks: Vec<Snak>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rank {
    Deprecated,
    #[default]
    Normal,
    Preferred,
}

impl Rank {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "preferred" => Some(Rank::Preferred),
            "normal" => Some(Rank::Normal),
            "deprecated" => Some(Rank::Deprecated),
            _ => None,
        }
    }

    /// Local name in the wikibase ontology.
    pub fn ontology_name(&self) -> &'static str {
        match self {
            Rank::Preferred => "PreferredRank",
            Rank::Normal => "NormalRank",
            Rank::Deprecated => "DeprecatedRank",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub subject: Entity,
    pub main_snak: Snak,
    pub qualifiers: Vec<Snak>,
    pub references: Vec<Reference>,
    pub rank: Rank,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermKind {
    Label,
    Description,
    Alias,
}

/// Label, description or alias of an entity in one language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermDirective {
    pub subject: Entity,
    pub kind: TermKind,
    pub language: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitelinkDirective {
    pub subject: Entity,
    pub site: String,
    pub title: String,
}

/// One parsed logical row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create(Entity),
    Statement(Statement),
    Term(TermDirective),
    Sitelink(SitelinkDirective),
}
