//! Deterministic node identifiers for statements, references and value nodes.
//!
//! Ids are derived from a canonical byte serialization of the node's content,
//! so the same content always mints the same id, across runs and inputs.
//! Every id is registered in a [`NodeCache`] together with its content; an id
//! that comes back with different content is a [`ConvertError::MintCollision`].

use crate::error::{ConvertError, ConvertResult};
use crate::model::{Reference, Snak, Statement};
use crate::value::{self, Value};
use dashmap::mapref::entry::Entry as SharedEntry;
use dashmap::DashMap;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::hash_map::Entry;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Statement,
    Reference,
    Value,
}

impl NodeKind {
    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Statement => "statement",
            NodeKind::Reference => "reference",
            NodeKind::Value => "value",
        }
    }
}

/// Registered node ids and the canonical content each was minted from.
pub type NodeTable = FxHashMap<(NodeKind, String), Vec<u8>>;

/// Id registry consulted on every mint.
pub trait NodeCache {
    /// Records `content` under `id`. The first registration wins; a later one
    /// with different content fails with `MintCollision`.
    fn register(&mut self, kind: NodeKind, id: &str, content: &[u8]) -> ConvertResult<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn collision(kind: NodeKind, id: &str) -> ConvertError {
    ConvertError::MintCollision {
        kind: kind.name(),
        id: id.to_string(),
    }
}

/// Registry owned by a single conversion.
#[derive(Debug, Default)]
pub struct LocalCache {
    nodes: NodeTable,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_table(nodes: NodeTable) -> Self {
        Self { nodes }
    }

    pub fn into_table(self) -> NodeTable {
        self.nodes
    }
}

impl NodeCache for LocalCache {
    fn register(&mut self, kind: NodeKind, id: &str, content: &[u8]) -> ConvertResult<()> {
        match self.nodes.entry((kind, id.to_string())) {
            Entry::Occupied(existing) if existing.get().as_slice() != content => {
                Err(collision(kind, id))
            }
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(content.to_vec());
                Ok(())
            }
        }
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// Registry shared by conversions running on several threads.
///
/// Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct SharedCache {
    nodes: Arc<DashMap<(NodeKind, String), Vec<u8>>>,
}

impl SharedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_table(table: NodeTable) -> Self {
        let nodes = DashMap::with_capacity(table.len());
        for (key, content) in table {
            nodes.insert(key, content);
        }
        Self {
            nodes: Arc::new(nodes),
        }
    }

    pub fn to_table(&self) -> NodeTable {
        self.nodes
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

impl NodeCache for SharedCache {
    fn register(&mut self, kind: NodeKind, id: &str, content: &[u8]) -> ConvertResult<()> {
        match self.nodes.entry((kind, id.to_string())) {
            SharedEntry::Occupied(existing) => {
                if existing.get().as_slice() != content {
                    return Err(collision(kind, id));
                }
                Ok(())
            }
            SharedEntry::Vacant(slot) => {
                slot.insert(content.to_vec());
                Ok(())
            }
        }
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// A minted id, and whether this minter has handed it out before.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Minted {
    pub id: String,
    /// False when the node's own triples were already emitted in this run.
    pub fresh: bool,
}

/// Length-prefixed field encoding: `len:bytes` per field, domain tag first.
struct Canonical {
    buf: Vec<u8>,
}

impl Canonical {
    fn new(kind: NodeKind) -> Self {
        let mut canonical = Self {
            buf: Vec::with_capacity(128),
        };
        canonical.field(kind.name());
        canonical
    }

    fn field(&mut self, text: &str) {
        let mut len = itoa::Buffer::new();
        self.buf.extend_from_slice(len.format(text.len()).as_bytes());
        self.buf.push(b':');
        self.buf.extend_from_slice(text.as_bytes());
    }

    fn value(&mut self, value: &Value) {
        self.field(value.datatype().tag());
        self.field(&value::encode(value));
    }

    fn snak(&mut self, snak: &Snak) {
        self.field(snak.property.as_str());
        self.value(&snak.value);
    }

    /// Snaks sorted by their encoding, so source order does not change the id.
    fn snaks(&mut self, snaks: &[Snak]) {
        let mut encoded: Vec<Vec<u8>> = snaks
            .iter()
            .map(|snak| {
                let mut one = Canonical {
                    buf: Vec::with_capacity(64),
                };
                one.snak(snak);
                one.buf
            })
            .collect();
        encoded.sort_unstable();

        let mut count = itoa::Buffer::new();
        self.field(count.format(encoded.len()));
        for snak in encoded {
            self.buf.extend_from_slice(&snak);
        }
    }

    fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

pub struct NodeMinter<C: NodeCache> {
    cache: C,
    emitted: FxHashSet<(NodeKind, String)>,
}

impl<C: NodeCache> NodeMinter<C> {
    pub fn new(cache: C) -> Self {
        Self {
            cache,
            emitted: FxHashSet::default(),
        }
    }

    /// `{subject}-{UUID}`: a name-based (SHA-1) UUID over subject, main snak and qualifiers.
    pub fn mint_statement_node(&mut self, statement: &Statement) -> ConvertResult<Minted> {
        let mut canonical = Canonical::new(NodeKind::Statement);
        canonical.field(&statement.subject.to_string());
        canonical.snak(&statement.main_snak);
        canonical.snaks(&statement.qualifiers);
        let content = canonical.into_bytes();

        let uuid = Uuid::new_v5(&Uuid::NAMESPACE_URL, &content);
        let id = format!("{}-{:X}", statement.subject, uuid.hyphenated());
        self.register(NodeKind::Statement, id, &content)
    }

    /// SHA-1 hex over the reference's snaks.
    pub fn mint_reference_node(&mut self, reference: &Reference) -> ConvertResult<Minted> {
        let mut canonical = Canonical::new(NodeKind::Reference);
        canonical.snaks(&reference.snaks);
        let content = canonical.into_bytes();
        let id = hex::encode(Sha1::digest(&content));
        self.register(NodeKind::Reference, id, &content)
    }

    /// SHA-1 hex over a quantity, time or coordinate value.
    pub fn mint_value_node(&mut self, value: &Value) -> ConvertResult<Minted> {
        let mut canonical = Canonical::new(NodeKind::Value);
        canonical.value(value);
        let content = canonical.into_bytes();
        let id = hex::encode(Sha1::digest(&content));
        self.register(NodeKind::Value, id, &content)
    }

    fn register(&mut self, kind: NodeKind, id: String, content: &[u8]) -> ConvertResult<Minted> {
        self.cache.register(kind, &id, content)?;
        let fresh = self.emitted.insert((kind, id.clone()));
        Ok(Minted { id, fresh })
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn into_cache(self) -> C {
        self.cache
    }
}
