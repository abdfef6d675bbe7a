//! qs2rdf: QuickStatements to Wikidata RDF conversion
//!
//! This crate turns QuickStatements v1 batches into N-Triples shaped like the
//! Wikidata RDF dumps, without talking to a Wikibase instance:
//!
//! 1. **Grouping** -- Physical lines are grouped into logical rows; a line starting
//!    with the delimiter continues the row above it
//! 2. **Parsing** -- Each row becomes a typed command (create, statement, term or
//!    sitelink); `CREATE`/`LAST` are resolved through an explicit parse session
//! 3. **Minting** -- Statement, reference and value nodes get ids derived from their
//!    content, so reruns produce identical node names
//! 4. **Emission** -- Commands become `wd:`/`p:`/`ps:`/`pq:`/`wdref:`/`wdv:` triples;
//!    ranks and the truthy `wdt:` layer are computed per (subject, property) once
//!    every input is done
//!
//! # Architecture
//!
//! - **Streaming** -- Inputs are read line by line (plain or bz2), never fully loaded
//! - **Exact numbers** -- Quantities and coordinates stay decimal text end to end
//! - **Row isolation** -- A failing row emits nothing; the policy decides whether to go on
//! - **Parallel inputs** -- Independent inputs run on a rayon pool, node ids are checked
//!   against one concurrent map (DashMap, first writer wins)
//! - **Persistent node cache** -- Optional bincode table so collision checks span runs
//!
//! # Key Modules
//!
//! - [`value`] -- Value codec: token grammar, canonical encoding, RDF terms
//! - [`parser`] -- Line grouping, field splitting and command parsing
//! - [`minter`] -- Deterministic node ids and the collision registry
//! - [`emit`] -- Triple emission and best-rank selection
//! - [`pipeline`] -- Conversion driver, error policy, parallel inputs
//! - [`model`] -- Entities, snaks, statements and commands
//! - [`vocab`] -- Wikidata namespaces and sites
//! - [`datatypes`] -- Declared property datatypes (CSV)
//! - [`decimal`] -- Exact decimal text arithmetic for quantity bounds
//! - [`node_cache`] -- Node table persistence
//! - [`report`] -- CSV report of rejected rows
//! - [`stats`] -- Thread-safe atomic counters
//! - [`error`] -- Core error kinds
//! - [`config`] -- Constants and defaults
//!
//! # Example Usage
//!
//! ```bash
//! # Convert a batch, declaring property datatypes
//! qs2rdf convert -i batch.qs -o batch.nt --property-types props.csv
//!
//! # Several batches in parallel, keeping node ids across runs
//! qs2rdf convert -i a.qs.bz2 -i b.qs.bz2 -o out.nt --jobs 4 --node-cache nodes.cache
//!
//! # Only validate
//! qs2rdf check -i batch.qs
//! ```

pub mod config;
pub mod datatypes;
pub mod decimal;
pub mod emit;
pub mod error;
pub mod minter;
pub mod model;
pub mod node_cache;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod stats;
pub mod value;
pub mod vocab;
