use crate::model::Command;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every conversion of a run
#[derive(Default)]
pub struct ConversionStats {
    pub rows_read: AtomicU64,
    pub rows_failed: AtomicU64,
    pub items_created: AtomicU64,
    pub statements: AtomicU64,
    pub terms: AtomicU64,
    pub sitelinks: AtomicU64,
    pub triples_written: AtomicU64,
}

/// Snapshot written as the JSON run summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSummary {
    pub rows_read: u64,
    pub rows_failed: u64,
    pub items_created: u64,
    pub statements: u64,
    pub terms: u64,
    pub sitelinks: u64,
    pub triples_written: u64,
}

impl ConversionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_rows(&self) {
        self.rows_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.rows_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command(&self, command: &Command) {
        let counter = match command {
            Command::Create(_) => &self.items_created,
            Command::Statement(_) => &self.statements,
            Command::Term(_) => &self.terms,
            Command::Sitelink(_) => &self.sitelinks,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_triples(&self, count: u64) {
        self.triples_written.fetch_add(count, Ordering::Relaxed);
    }

    pub fn rows(&self) -> u64 {
        self.rows_read.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.rows_failed.load(Ordering::Relaxed)
    }

    pub fn triples(&self) -> u64 {
        self.triples_written.load(Ordering::Relaxed)
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            rows_read: self.rows(),
            rows_failed: self.failed(),
            items_created: self.items_created.load(Ordering::Relaxed),
            statements: self.statements.load(Ordering::Relaxed),
            terms: self.terms.load(Ordering::Relaxed),
            sitelinks: self.sitelinks.load(Ordering::Relaxed),
            triples_written: self.triples(),
        }
    }
}
