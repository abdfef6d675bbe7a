//! RDF emitter: commands in, Wikidata-shaped triples out.
//!
//! Statements are reified under `wds:` nodes with `p:`/`ps:`/`pq:` edges,
//! references under `wdref:` and structured values under `wdv:`; nodes shared
//! between statements are written once per input. Ranks and the truthy
//! (`wdt:`) layer depend on every statement of a (subject, property) pair
//! across the whole run, so they are collected in a [`StatementLedger`] and
//! written once all inputs are exhausted.

use crate::error::{ConvertError, ConvertResult};
use crate::minter::{NodeCache, NodeMinter};
use crate::model::{
    Command, Entity, PropertyId, Rank, SitelinkDirective, Snak, Statement, TermDirective,
    TermKind,
};
use crate::value::Value;
use crate::vocab::{self, PropertyNs, Site};
use oxrdf::{Literal, NamedNode, Term, Triple};
use rustc_hash::FxHashMap;
use tracing::warn;

/// A reified statement as the rank layer sees it.
struct LedgerEntry {
    id: String,
    node: NamedNode,
    rank: Rank,
    object: Term,
    group: usize,
}

/// First-seen rank of every statement node, grouped by (subject, property).
///
/// A statement minted again, by the same input or a later one, keeps the
/// rank it was first recorded with.
#[derive(Default)]
pub struct StatementLedger {
    entries: Vec<LedgerEntry>,
    entry_index: FxHashMap<String, usize>,
    groups: Vec<(Entity, PropertyId, Vec<usize>)>,
    group_index: FxHashMap<(Entity, PropertyId), usize>,
}

impl StatementLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn record(
        &mut self,
        id: &str,
        subject: &Entity,
        property: &PropertyId,
        rank: Rank,
        object: Term,
    ) {
        if let Some(&index) = self.entry_index.get(id) {
            let kept = self.entries[index].rank;
            if kept != rank {
                warn!(
                    statement = %id,
                    rank = rank.ontology_name(),
                    kept = kept.ontology_name(),
                    "Repeated statement with a different rank; keeping the first"
                );
            }
            return;
        }

        let key = (subject.clone(), property.clone());
        let group = match self.group_index.get(&key) {
            Some(&group) => group,
            None => {
                let group = self.groups.len();
                self.groups.push((key.0.clone(), key.1.clone(), Vec::new()));
                self.group_index.insert(key, group);
                group
            }
        };
        let index = self.entries.len();
        self.groups[group].2.push(index);
        self.entry_index.insert(id.to_string(), index);
        self.entries.push(LedgerEntry {
            id: id.to_string(),
            node: vocab::statement_node(id),
            rank,
            object,
            group,
        });
    }

    /// Appends the statements of a later input, in their first-seen order.
    pub fn merge(&mut self, other: StatementLedger) {
        let StatementLedger {
            entries, groups, ..
        } = other;
        for entry in entries {
            let (subject, property, _) = &groups[entry.group];
            self.record(&entry.id, subject, property, entry.rank, entry.object);
        }
    }

    /// One `wikibase:rank` per statement node, then truthy triples and
    /// `wikibase:BestRank` markers for every (subject, property) group.
    ///
    /// The best rank of a group is Preferred if any statement has it, else
    /// Normal; deprecated statements are never truthy.
    pub fn into_triples(self) -> Vec<Triple> {
        let mut triples = Vec::with_capacity(self.entries.len() * 3);
        for entry in &self.entries {
            triples.push(Triple::new(
                entry.node.clone(),
                vocab::wikibase("rank"),
                vocab::wikibase(entry.rank.ontology_name()),
            ));
        }

        for (subject, property, members) in &self.groups {
            let Some(best) = members
                .iter()
                .map(|&index| self.entries[index].rank)
                .filter(|rank| *rank != Rank::Deprecated)
                .max()
            else {
                continue;
            };
            let subject = vocab::entity(subject);
            let direct = vocab::property(PropertyNs::Direct, property);
            for &index in members {
                let entry = &self.entries[index];
                if entry.rank != best {
                    continue;
                }
                triples.push(Triple::new(subject.clone(), direct.clone(), entry.object.clone()));
                triples.push(Triple::new(
                    entry.node.clone(),
                    vocab::rdf_type(),
                    vocab::wikibase("BestRank"),
                ));
            }
        }
        triples
    }
}

pub struct RdfEmitter<C: NodeCache> {
    minter: NodeMinter<C>,
    ledger: StatementLedger,
}

impl<C: NodeCache> RdfEmitter<C> {
    pub fn new(minter: NodeMinter<C>) -> Self {
        Self {
            minter,
            ledger: StatementLedger::new(),
        }
    }

    pub fn emit(&mut self, command: &Command) -> ConvertResult<Vec<Triple>> {
        match command {
            Command::Create(entity) => Ok(vec![Triple::new(
                vocab::entity(entity),
                vocab::rdf_type(),
                vocab::wikibase("Item"),
            )]),
            Command::Statement(statement) => self.emit_statement(statement),
            Command::Term(term) => Ok(emit_term(term)),
            Command::Sitelink(sitelink) => emit_sitelink(sitelink),
        }
    }

    fn emit_statement(&mut self, statement: &Statement) -> ConvertResult<Vec<Triple>> {
        let mut triples = Vec::with_capacity(8);
        let minted = self.minter.mint_statement_node(statement)?;
        let node = vocab::statement_node(&minted.id);
        let property = &statement.main_snak.property;

        if minted.fresh {
            triples.push(Triple::new(
                vocab::entity(&statement.subject),
                vocab::property(PropertyNs::Claim, property),
                node.clone(),
            ));
            triples.push(Triple::new(
                node.clone(),
                vocab::rdf_type(),
                vocab::wikibase("Statement"),
            ));
            self.emit_snak(
                &mut triples,
                &node,
                &statement.main_snak,
                PropertyNs::Statement,
                PropertyNs::StatementValue,
            )?;
            for qualifier in &statement.qualifiers {
                self.emit_snak(
                    &mut triples,
                    &node,
                    qualifier,
                    PropertyNs::Qualifier,
                    PropertyNs::QualifierValue,
                )?;
            }
        }

        for reference in &statement.references {
            let reference_minted = self.minter.mint_reference_node(reference)?;
            let reference_node = vocab::reference_node(&reference_minted.id);
            triples.push(Triple::new(
                node.clone(),
                vocab::was_derived_from(),
                reference_node.clone(),
            ));
            if reference_minted.fresh {
                triples.push(Triple::new(
                    reference_node.clone(),
                    vocab::rdf_type(),
                    vocab::wikibase("Reference"),
                ));
                for snak in &reference.snaks {
                    self.emit_snak(
                        &mut triples,
                        &reference_node,
                        snak,
                        PropertyNs::Reference,
                        PropertyNs::ReferenceValue,
                    )?;
                }
            }
        }

        self.ledger.record(
            &minted.id,
            &statement.subject,
            property,
            statement.rank,
            statement.main_snak.value.simple_term(),
        );
        Ok(triples)
    }

    /// `node ns:P simple` plus, for structured values, `node value_ns:P wdv:h`.
    fn emit_snak(
        &mut self,
        triples: &mut Vec<Triple>,
        node: &NamedNode,
        snak: &Snak,
        simple_ns: PropertyNs,
        value_ns: PropertyNs,
    ) -> ConvertResult<()> {
        triples.push(Triple::new(
            node.clone(),
            vocab::property(simple_ns, &snak.property),
            snak.value.simple_term(),
        ));
        if let Some(value_node) = self.emit_full_value(triples, &snak.value)? {
            triples.push(Triple::new(
                node.clone(),
                vocab::property(value_ns, &snak.property),
                value_node,
            ));
        }
        Ok(())
    }

    fn emit_full_value(
        &mut self,
        triples: &mut Vec<Triple>,
        value: &Value,
    ) -> ConvertResult<Option<NamedNode>> {
        let Some(full) = value.full_value() else {
            return Ok(None);
        };
        let minted = self.minter.mint_value_node(value)?;
        let node = vocab::value_node(&minted.id);
        if minted.fresh {
            triples.push(Triple::new(
                node.clone(),
                vocab::rdf_type(),
                vocab::wikibase(full.node_type),
            ));
            for (field, object) in full.fields {
                triples.push(Triple::new(node.clone(), vocab::wikibase(field), object));
            }
        }
        Ok(Some(node))
    }

    /// Hands over the statements recorded so far; the caller merges them
    /// into the run and writes [`StatementLedger::into_triples`] at the end.
    pub fn finish(&mut self) -> StatementLedger {
        std::mem::take(&mut self.ledger)
    }

    pub fn into_minter(self) -> NodeMinter<C> {
        self.minter
    }
}

fn emit_term(term: &TermDirective) -> Vec<Triple> {
    let subject = vocab::entity(&term.subject);
    let text = Literal::new_language_tagged_literal_unchecked(term.text.as_str(), term.language.as_str());
    let predicates = match term.kind {
        TermKind::Label => vec![vocab::rdfs_label(), vocab::skos("prefLabel"), vocab::schema("name")],
        TermKind::Description => vec![vocab::schema("description")],
        TermKind::Alias => vec![vocab::skos("altLabel")],
    };
    predicates
        .into_iter()
        .map(|predicate| Triple::new(subject.clone(), predicate, text.clone()))
        .collect()
}

fn emit_sitelink(sitelink: &SitelinkDirective) -> ConvertResult<Vec<Triple>> {
    let site = Site::lookup(&sitelink.site).ok_or_else(|| {
        ConvertError::malformed_command(format!("unknown site `{}`", sitelink.site))
    })?;
    let article = site.article(&sitelink.title);
    Ok(vec![
        Triple::new(article.clone(), vocab::rdf_type(), vocab::schema("Article")),
        Triple::new(article.clone(), vocab::schema("about"), vocab::entity(&sitelink.subject)),
        Triple::new(
            article.clone(),
            vocab::schema("inLanguage"),
            Literal::new_simple_literal(site.language.as_str()),
        ),
        Triple::new(article.clone(), vocab::schema("isPartOf"), site.home()),
        Triple::new(
            article,
            vocab::schema("name"),
            Literal::new_language_tagged_literal_unchecked(
                sitelink.title.as_str(),
                site.language.as_str(),
            ),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minter::LocalCache;
    use crate::model::{EntityId, Reference};
    use crate::value::{decode, Datatype};

    fn emitter() -> RdfEmitter<LocalCache> {
        RdfEmitter::new(NodeMinter::new(LocalCache::new()))
    }

    fn entity(id: &str) -> Entity {
        Entity::Existing(EntityId::parse(id).unwrap())
    }

    fn snak(property: &str, datatype: Datatype, raw: &str) -> Snak {
        Snak::new(
            PropertyId::parse(property).unwrap(),
            decode(datatype, raw).unwrap(),
        )
    }

    fn statement(subject: &str, main_snak: Snak, rank: Rank) -> Statement {
        Statement {
            subject: entity(subject),
            main_snak,
            qualifiers: Vec::new(),
            references: Vec::new(),
            rank,
        }
    }

    fn render(triples: &[Triple]) -> Vec<String> {
        triples.iter().map(|t| t.to_string()).collect()
    }

    fn count_matching(triples: &[Triple], needle: &str) -> usize {
        render(triples).iter().filter(|t| t.contains(needle)).count()
    }

    #[test]
    fn instance_of_human() {
        let mut emitter = emitter();
        let command = Command::Statement(statement(
            "Q1",
            snak("P31", Datatype::WikibaseItem, "Q5"),
            Rank::Normal,
        ));
        let triples = emitter.emit(&command).unwrap();
        let lines = render(&triples);
        assert_eq!(lines.len(), 3);

        let node = triples[0].object.to_string();
        assert!(node.starts_with("<http://www.wikidata.org/entity/statement/Q1-"));
        assert_eq!(
            lines[0],
            format!("<http://www.wikidata.org/entity/Q1> <http://www.wikidata.org/prop/P31> {}", node)
        );
        assert_eq!(
            lines[1],
            format!("{} <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://wikiba.se/ontology#Statement>", node)
        );
        assert_eq!(
            lines[2],
            format!("{} <http://www.wikidata.org/prop/statement/P31> <http://www.wikidata.org/entity/Q5>", node)
        );

        let ranked = render(&emitter.finish().into_triples());
        assert_eq!(
            ranked,
            vec![
                format!("{} <http://wikiba.se/ontology#rank> <http://wikiba.se/ontology#NormalRank>", node),
                "<http://www.wikidata.org/entity/Q1> <http://www.wikidata.org/prop/direct/P31> <http://www.wikidata.org/entity/Q5>".to_string(),
                format!("{} <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://wikiba.se/ontology#BestRank>", node),
            ]
        );
    }

    #[test]
    fn preferred_beats_normal() {
        let mut emitter = emitter();
        for (raw, rank) in [("Q5", Rank::Preferred), ("Q6", Rank::Normal), ("Q7", Rank::Normal)] {
            let s = statement("Q1", snak("P31", Datatype::WikibaseItem, raw), rank);
            emitter.emit(&Command::Statement(s)).unwrap();
        }
        let ranked = emitter.finish().into_triples();
        assert_eq!(count_matching(&ranked, "ontology#rank>"), 3);
        let truthy: Vec<_> = render(&ranked)
            .into_iter()
            .filter(|t| t.contains("/prop/direct/P31"))
            .collect();
        assert_eq!(truthy.len(), 1);
        assert!(truthy[0].ends_with("<http://www.wikidata.org/entity/Q5>"));
        assert_eq!(count_matching(&ranked, "BestRank"), 1);
    }

    #[test]
    fn normals_win_over_deprecated() {
        let mut emitter = emitter();
        for (raw, rank) in [("Q5", Rank::Normal), ("Q6", Rank::Normal), ("Q7", Rank::Deprecated)] {
            let s = statement("Q1", snak("P31", Datatype::WikibaseItem, raw), rank);
            emitter.emit(&Command::Statement(s)).unwrap();
        }
        let truthy = emitter.finish().into_triples();
        assert_eq!(count_matching(&truthy, "/prop/direct/P31"), 2);
        assert_eq!(count_matching(&truthy, "BestRank"), 2);
        assert_eq!(count_matching(&truthy, "entity/Q7>"), 0);
    }

    #[test]
    fn only_deprecated_has_no_truthy() {
        let mut emitter = emitter();
        let s = statement("Q1", snak("P31", Datatype::WikibaseItem, "Q5"), Rank::Deprecated);
        emitter.emit(&Command::Statement(s)).unwrap();
        let ranked = render(&emitter.finish().into_triples());
        assert_eq!(ranked.len(), 1);
        assert!(ranked[0].ends_with("<http://wikiba.se/ontology#DeprecatedRank>"));
    }

    #[test]
    fn shared_reference_emitted_once() {
        let reference = Reference {
            snaks: vec![snak("P248", Datatype::WikibaseItem, "Q36578")],
        };
        let mut emitter = emitter();
        let mut all = Vec::new();
        for raw in ["Q5", "Q6"] {
            let mut s = statement("Q1", snak("P31", Datatype::WikibaseItem, raw), Rank::Normal);
            s.references.push(reference.clone());
            all.extend(emitter.emit(&Command::Statement(s)).unwrap());
        }
        assert_eq!(count_matching(&all, "prov#wasDerivedFrom"), 2);
        assert_eq!(count_matching(&all, "ontology#Reference>"), 1);
        assert_eq!(count_matching(&all, "/prop/reference/P248"), 1);
    }

    #[test]
    fn qualifiers_and_full_values() {
        let mut s = statement(
            "Q64",
            snak("P1082", Datatype::Quantity, "3644826"),
            Rank::Normal,
        );
        s.qualifiers
            .push(snak("P585", Datatype::Time, "+2018-12-31T00:00:00Z/11"));
        let mut emitter = emitter();
        let triples = emitter.emit(&Command::Statement(s.clone())).unwrap();

        assert_eq!(count_matching(&triples, "/prop/statement/value/P1082"), 1);
        assert_eq!(count_matching(&triples, "/prop/qualifier/P585"), 1);
        assert_eq!(count_matching(&triples, "/prop/qualifier/value/P585"), 1);
        assert_eq!(count_matching(&triples, "ontology#QuantityValue"), 1);
        assert_eq!(count_matching(&triples, "ontology#TimeValue"), 1);
        assert_eq!(count_matching(&triples, "ontology#quantityUnit"), 1);
        assert!(render(&triples).iter().any(|t| t.contains("\"+3644826\"^^")));

        s.subject = entity("Q65");
        let second = emitter.emit(&Command::Statement(s)).unwrap();
        assert_eq!(count_matching(&second, "ontology#QuantityValue"), 0);
        assert_eq!(count_matching(&second, "/prop/statement/value/P1082"), 1);
    }

    #[test]
    fn repeated_statement_only_adds_references() {
        let mut emitter = emitter();
        let plain = statement("Q1", snak("P31", Datatype::WikibaseItem, "Q5"), Rank::Normal);
        emitter.emit(&Command::Statement(plain.clone())).unwrap();

        let mut sourced = plain;
        sourced.references.push(Reference {
            snaks: vec![snak("P143", Datatype::WikibaseItem, "Q328")],
        });
        let triples = emitter.emit(&Command::Statement(sourced)).unwrap();
        assert_eq!(count_matching(&triples, "/prop/P31>"), 0);
        assert_eq!(count_matching(&triples, "wasDerivedFrom"), 1);
        assert_eq!(emitter.finish().into_triples().len(), 3);
    }

    #[test]
    fn repeated_statement_keeps_first_rank() {
        let mut emitter = emitter();
        let main = snak("P31", Datatype::WikibaseItem, "Q5");
        for rank in [Rank::Preferred, Rank::Deprecated] {
            let s = statement("Q1", main.clone(), rank);
            emitter.emit(&Command::Statement(s)).unwrap();
        }
        let ranked = emitter.finish().into_triples();
        assert_eq!(count_matching(&ranked, "ontology#rank>"), 1);
        assert_eq!(count_matching(&ranked, "ontology#PreferredRank"), 1);
        assert_eq!(count_matching(&ranked, "ontology#DeprecatedRank"), 0);
    }

    #[test]
    fn merged_ledgers_share_best_rank() {
        let mut first = emitter();
        let preferred = statement("Q1", snak("P31", Datatype::WikibaseItem, "Q5"), Rank::Preferred);
        first.emit(&Command::Statement(preferred.clone())).unwrap();

        let mut second = emitter();
        let normal = statement("Q1", snak("P31", Datatype::WikibaseItem, "Q6"), Rank::Normal);
        second.emit(&Command::Statement(normal)).unwrap();
        let mut demoted = preferred;
        demoted.rank = Rank::Deprecated;
        second.emit(&Command::Statement(demoted)).unwrap();

        let mut ledger = first.finish();
        ledger.merge(second.finish());
        assert_eq!(ledger.len(), 2);

        let ranked = ledger.into_triples();
        assert_eq!(count_matching(&ranked, "ontology#rank>"), 2);
        assert_eq!(count_matching(&ranked, "ontology#DeprecatedRank"), 0);
        let truthy: Vec<_> = render(&ranked)
            .into_iter()
            .filter(|t| t.contains("/prop/direct/P31"))
            .collect();
        assert_eq!(truthy.len(), 1);
        assert!(truthy[0].ends_with("<http://www.wikidata.org/entity/Q5>"));
    }

    #[test]
    fn created_item_and_terms() {
        let mut emitter = emitter();
        let new = Entity::New { scope: 0, seq: 1 };
        let triples = emitter.emit(&Command::Create(new.clone())).unwrap();
        assert_eq!(
            render(&triples),
            vec!["<http://www.wikidata.org/entity/NEW1> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://wikiba.se/ontology#Item>"]
        );

        let label = Command::Term(TermDirective {
            subject: new.clone(),
            kind: TermKind::Label,
            language: "en".to_string(),
            text: "Thing".to_string(),
        });
        let triples = emitter.emit(&label).unwrap();
        assert_eq!(triples.len(), 3);
        assert!(render(&triples).iter().all(|t| t.ends_with("\"Thing\"@en")));

        let alias = Command::Term(TermDirective {
            subject: new,
            kind: TermKind::Alias,
            language: "fr".to_string(),
            text: "Chose".to_string(),
        });
        let triples = emitter.emit(&alias).unwrap();
        assert_eq!(
            render(&triples),
            vec!["<http://www.wikidata.org/entity/NEW1> <http://www.w3.org/2004/02/skos/core#altLabel> \"Chose\"@fr"]
        );
    }

    #[test]
    fn sitelink_article_shape() {
        let mut emitter = emitter();
        let command = Command::Sitelink(SitelinkDirective {
            subject: entity("Q42"),
            site: "enwiki".to_string(),
            title: "Douglas Adams".to_string(),
        });
        let lines = render(&emitter.emit(&command).unwrap());
        let article = "<https://en.wikipedia.org/wiki/Douglas_Adams>";
        assert_eq!(lines.len(), 5);
        assert!(lines.iter().all(|l| l.starts_with(article)));
        assert!(lines.contains(&format!(
            "{} <http://schema.org/about> <http://www.wikidata.org/entity/Q42>",
            article
        )));
        assert!(lines.contains(&format!(
            "{} <http://schema.org/isPartOf> <https://en.wikipedia.org/>",
            article
        )));
        assert!(lines.contains(&format!("{} <http://schema.org/inLanguage> \"en\"", article)));
    }
}
