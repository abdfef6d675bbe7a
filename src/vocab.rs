//! Wikidata RDF vocabulary: namespaces and node constructors.
//!
//! Namespaces match the Wikidata RDF dump format so the output can be loaded
//! next to official dumps.

use crate::model::{Entity, EntityId, PropertyId};
use oxrdf::NamedNode;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

pub const WD: &str = "http://www.wikidata.org/entity/";
pub const WDT: &str = "http://www.wikidata.org/prop/direct/";
pub const P: &str = "http://www.wikidata.org/prop/";
pub const PS: &str = "http://www.wikidata.org/prop/statement/";
pub const PSV: &str = "http://www.wikidata.org/prop/statement/value/";
pub const PQ: &str = "http://www.wikidata.org/prop/qualifier/";
pub const PQV: &str = "http://www.wikidata.org/prop/qualifier/value/";
pub const PR: &str = "http://www.wikidata.org/prop/reference/";
pub const PRV: &str = "http://www.wikidata.org/prop/reference/value/";
pub const WDS: &str = "http://www.wikidata.org/entity/statement/";
pub const WDREF: &str = "http://www.wikidata.org/reference/";
pub const WDV: &str = "http://www.wikidata.org/value/";
pub const WIKIBASE: &str = "http://wikiba.se/ontology#";
pub const PROV: &str = "http://www.w3.org/ns/prov#";
pub const GEO: &str = "http://www.opengis.net/ont/geosparql#";
pub const SCHEMA: &str = "http://schema.org/";
pub const SKOS: &str = "http://www.w3.org/2004/02/skos/core#";
pub const RDFS: &str = "http://www.w3.org/2000/01/rdf-schema#";
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

pub const COMMONS_FILE_PATH: &str = "http://commons.wikimedia.org/wiki/Special:FilePath/";

/// Characters left as-is in article paths (MediaWiki `wfUrlencode`).
const TITLE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b':')
    .remove(b'/')
    .remove(b'(')
    .remove(b')')
    .remove(b',')
    .remove(b';')
    .remove(b'@')
    .remove(b'$')
    .remove(b'!')
    .remove(b'*');

/// Language-edition projects, keyed by the suffix of their site id.
const PROJECTS: &[(&str, &str)] = &[
    ("wiktionary", "wiktionary.org"),
    ("wikibooks", "wikibooks.org"),
    ("wikinews", "wikinews.org"),
    ("wikiquote", "wikiquote.org"),
    ("wikisource", "wikisource.org"),
    ("wikiversity", "wikiversity.org"),
    ("wikivoyage", "wikivoyage.org"),
    ("wiki", "wikipedia.org"),
];

/// Single-edition sites and their hosts.
const SPECIAL_SITES: &[(&str, &str)] = &[
    ("commonswiki", "commons.wikimedia.org"),
    ("wikidatawiki", "www.wikidata.org"),
    ("specieswiki", "species.wikimedia.org"),
    ("metawiki", "meta.wikimedia.org"),
    ("mediawikiwiki", "www.mediawiki.org"),
];

/// Predicate families derived from a property id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyNs {
    Direct,
    Claim,
    Statement,
    StatementValue,
    Qualifier,
    QualifierValue,
    Reference,
    ReferenceValue,
}

impl PropertyNs {
    fn base(self) -> &'static str {
        match self {
            PropertyNs::Direct => WDT,
            PropertyNs::Claim => P,
            PropertyNs::Statement => PS,
            PropertyNs::StatementValue => PSV,
            PropertyNs::Qualifier => PQ,
            PropertyNs::QualifierValue => PQV,
            PropertyNs::Reference => PR,
            PropertyNs::ReferenceValue => PRV,
        }
    }
}

fn named(ns: &str, local: &str) -> NamedNode {
    let mut iri = String::with_capacity(ns.len() + local.len());
    iri.push_str(ns);
    iri.push_str(local);
    NamedNode::new_unchecked(iri)
}

/// A wiki a sitelink can point to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    host: String,
    pub language: String,
}

impl Site {
    /// Resolves a site id such as `enwiki` or `dewikivoyage`.
    pub fn lookup(site: &str) -> Option<Self> {
        if let Some((_, host)) = SPECIAL_SITES.iter().find(|(id, _)| *id == site) {
            return Some(Self {
                host: host.to_string(),
                language: "en".to_string(),
            });
        }
        let (language, domain) = PROJECTS.iter().find_map(|(suffix, domain)| {
            site.strip_suffix(suffix).map(|language| (language, *domain))
        })?;
        let valid = language.starts_with(|c: char| c.is_ascii_lowercase())
            && language
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid {
            return None;
        }
        let language = language.replace('_', "-");
        Some(Self {
            host: format!("{}.{}", language, domain),
            language,
        })
    }

    pub fn home(&self) -> NamedNode {
        NamedNode::new_unchecked(format!("https://{}/", self.host))
    }

    pub fn article(&self, title: &str) -> NamedNode {
        let underscored = title.replace(' ', "_");
        NamedNode::new_unchecked(format!(
            "https://{}/wiki/{}",
            self.host,
            utf8_percent_encode(&underscored, TITLE_SET)
        ))
    }
}

pub fn entity(entity: &Entity) -> NamedNode {
    named(WD, &entity.to_string())
}

pub fn entity_id(id: &EntityId) -> NamedNode {
    named(WD, id.as_str())
}

pub fn property(ns: PropertyNs, property: &PropertyId) -> NamedNode {
    named(ns.base(), property.as_str())
}

pub fn statement_node(id: &str) -> NamedNode {
    named(WDS, id)
}

pub fn reference_node(id: &str) -> NamedNode {
    named(WDREF, id)
}

pub fn value_node(id: &str) -> NamedNode {
    named(WDV, id)
}

pub fn wikibase(local: &str) -> NamedNode {
    named(WIKIBASE, local)
}

pub fn schema(local: &str) -> NamedNode {
    named(SCHEMA, local)
}

pub fn skos(local: &str) -> NamedNode {
    named(SKOS, local)
}

pub fn rdfs_label() -> NamedNode {
    named(RDFS, "label")
}

pub fn rdf_type() -> NamedNode {
    NamedNode::new_unchecked(RDF_TYPE)
}

pub fn was_derived_from() -> NamedNode {
    named(PROV, "wasDerivedFrom")
}

pub fn wkt_literal() -> NamedNode {
    named(GEO, "wktLiteral")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_namespaces() {
        let p31 = PropertyId::parse("P31").unwrap();
        assert_eq!(
            property(PropertyNs::Direct, &p31).as_str(),
            "http://www.wikidata.org/prop/direct/P31"
        );
        assert_eq!(
            property(PropertyNs::QualifierValue, &p31).as_str(),
            "http://www.wikidata.org/prop/qualifier/value/P31"
        );
        assert_eq!(
            property(PropertyNs::Claim, &p31).as_str(),
            "http://www.wikidata.org/prop/P31"
        );
    }

    #[test]
    fn sites_resolve_to_hosts() {
        let en = Site::lookup("enwiki").unwrap();
        assert_eq!(en.language, "en");
        assert_eq!(en.home().as_str(), "https://en.wikipedia.org/");
        assert_eq!(
            en.article("Douglas Adams").as_str(),
            "https://en.wikipedia.org/wiki/Douglas_Adams"
        );

        let voyage = Site::lookup("dewikivoyage").unwrap();
        assert_eq!(voyage.home().as_str(), "https://de.wikivoyage.org/");

        let yue = Site::lookup("zh_yuewiki").unwrap();
        assert_eq!(yue.language, "zh-yue");
        assert_eq!(yue.home().as_str(), "https://zh-yue.wikipedia.org/");

        let commons = Site::lookup("commonswiki").unwrap();
        assert_eq!(
            commons.article("Category:Cats").as_str(),
            "https://commons.wikimedia.org/wiki/Category:Cats"
        );
    }

    #[test]
    fn unknown_sites_are_rejected() {
        assert!(Site::lookup("wiki").is_none());
        assert!(Site::lookup("enwikipedia").is_none());
        assert!(Site::lookup("ENwiki").is_none());
        assert!(Site::lookup("foo").is_none());
    }

    #[test]
    fn article_titles_are_percent_encoded() {
        let fr = Site::lookup("frwiki").unwrap();
        assert_eq!(
            fr.article("Café de Flore").as_str(),
            "https://fr.wikipedia.org/wiki/Caf%C3%A9_de_Flore"
        );
    }

    #[test]
    fn new_entities_live_in_entity_namespace() {
        assert_eq!(
            entity(&Entity::New { scope: 0, seq: 2 }).as_str(),
            "http://www.wikidata.org/entity/NEW2"
        );
    }
}
