//! Value codec: QuickStatements value tokens <-> typed values <-> RDF terms.
//!
//! Every datatype has a token grammar (`decode`), a canonical token form
//! (`encode`) and an RDF rendering (`Value::simple_term`, `Value::full_value`).
//! Numbers stay decimal text end to end.

use crate::config::{
    DEFAULT_GEO_PRECISION, DEFAULT_GLOBE, DEFAULT_TIME_PRECISION, GREGORIAN_CALENDAR,
    JULIAN_CALENDAR, MAX_TIME_PRECISION, UNITLESS_UNIT,
};
use crate::decimal;
use crate::error::{ConvertError, ConvertResult};
use crate::model::{Entity, EntityId, EntityKind};
use crate::vocab;
use bigdecimal::BigDecimal;
use once_cell::sync::Lazy;
use oxrdf::vocab::xsd;
use oxrdf::{Literal, NamedNode, Term};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Characters kept verbatim in commons file paths (PHP `rawurlencode`).
const FILE_PATH_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

static LANGUAGE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]{2,3}(?:-[a-z0-9]+)*$").unwrap());

static MONOLINGUAL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^([^":]*):(".*)$"#).unwrap());

static QUANTITY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([+-]?\d+(?:\.\d+)?)?(?:~(\d+(?:\.\d+)?)|\[([+-]?\d+(?:\.\d+)?),([+-]?\d+(?:\.\d+)?)\])?(?:U([1-9]\d*))?$",
    )
    .unwrap()
});

static TIME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([+-]?)(\d+)-(\d{2})-(\d{2})T(\d{2}):(\d{2}):(\d{2})Z(?:/(\d{1,2}))?(/J)?$")
        .unwrap()
});

static COORDINATE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@([+-]?\d+(?:\.\d+)?)/([+-]?\d+(?:\.\d+)?)(?:/(\d+(?:\.\d+)?)(?:/(Q[1-9]\d*))?)?$")
        .unwrap()
});

static URL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*:\S+$").unwrap());

static FILE_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^/\\#<>\[\]|{}]+\.[A-Za-z0-9]+$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Datatype {
    WikibaseItem,
    WikibaseProperty,
    WikibaseLexeme,
    WikibaseForm,
    WikibaseSense,
    String,
    ExternalId,
    Url,
    CommonsMedia,
    MonolingualText,
    Quantity,
    Time,
    GlobeCoordinate,
}

impl Datatype {
    pub fn from_tag(tag: &str) -> ConvertResult<Self> {
        match tag {
            "wikibase-item" => Ok(Datatype::WikibaseItem),
            "wikibase-property" => Ok(Datatype::WikibaseProperty),
            "wikibase-lexeme" => Ok(Datatype::WikibaseLexeme),
            "wikibase-form" => Ok(Datatype::WikibaseForm),
            "wikibase-sense" => Ok(Datatype::WikibaseSense),
            "string" => Ok(Datatype::String),
            "external-id" => Ok(Datatype::ExternalId),
            "url" => Ok(Datatype::Url),
            "commonsMedia" => Ok(Datatype::CommonsMedia),
            "monolingualtext" => Ok(Datatype::MonolingualText),
            "quantity" => Ok(Datatype::Quantity),
            "time" => Ok(Datatype::Time),
            "globe-coordinate" => Ok(Datatype::GlobeCoordinate),
            other => Err(ConvertError::UnknownDatatype(other.to_string())),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Datatype::WikibaseItem => "wikibase-item",
            Datatype::WikibaseProperty => "wikibase-property",
            Datatype::WikibaseLexeme => "wikibase-lexeme",
            Datatype::WikibaseForm => "wikibase-form",
            Datatype::WikibaseSense => "wikibase-sense",
            Datatype::String => "string",
            Datatype::ExternalId => "external-id",
            Datatype::Url => "url",
            Datatype::CommonsMedia => "commonsMedia",
            Datatype::MonolingualText => "monolingualtext",
            Datatype::Quantity => "quantity",
            Datatype::Time => "time",
            Datatype::GlobeCoordinate => "globe-coordinate",
        }
    }

    fn entity_kind(&self) -> Option<EntityKind> {
        match self {
            Datatype::WikibaseItem => Some(EntityKind::Item),
            Datatype::WikibaseProperty => Some(EntityKind::Property),
            Datatype::WikibaseLexeme => Some(EntityKind::Lexeme),
            Datatype::WikibaseForm => Some(EntityKind::Form),
            Datatype::WikibaseSense => Some(EntityKind::Sense),
            _ => None,
        }
    }

    pub fn for_entity_kind(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Item => Datatype::WikibaseItem,
            EntityKind::Property => Datatype::WikibaseProperty,
            EntityKind::Lexeme => Datatype::WikibaseLexeme,
            EntityKind::Form => Datatype::WikibaseForm,
            EntityKind::Sense => Datatype::WikibaseSense,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalendarModel {
    Gregorian,
    Julian,
}

impl CalendarModel {
    pub fn item(&self) -> &'static str {
        match self {
            CalendarModel::Gregorian => GREGORIAN_CALENDAR,
            CalendarModel::Julian => JULIAN_CALENDAR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Quantity {
    pub amount: String,
    pub unit: Option<EntityId>,
    pub lower_bound: Option<String>,
    pub upper_bound: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Time {
    /// `+YYYY-MM-DDThh:mm:ssZ`, sign always present, year at least four digits.
    pub value: String,
    pub precision: u8,
    pub calendar: CalendarModel,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GlobeCoordinate {
    pub latitude: String,
    pub longitude: String,
    pub precision: String,
    pub globe: EntityId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Entity(Entity),
    String(String),
    ExternalId(String),
    Url(String),
    CommonsMedia(String),
    MonolingualText { text: String, language: String },
    Quantity(Quantity),
    Time(Time),
    GlobeCoordinate(GlobeCoordinate),
}

/// Structured fields of a `wdv:` value node.
#[derive(Debug, Clone, PartialEq)]
pub struct FullValue {
    pub node_type: &'static str,
    pub fields: Vec<(&'static str, Term)>,
}

impl Value {
    pub fn datatype(&self) -> Datatype {
        match self {
            Value::Entity(entity) => Datatype::for_entity_kind(entity.kind()),
            Value::String(_) => Datatype::String,
            Value::ExternalId(_) => Datatype::ExternalId,
            Value::Url(_) => Datatype::Url,
            Value::CommonsMedia(_) => Datatype::CommonsMedia,
            Value::MonolingualText { .. } => Datatype::MonolingualText,
            Value::Quantity(_) => Datatype::Quantity,
            Value::Time(_) => Datatype::Time,
            Value::GlobeCoordinate(_) => Datatype::GlobeCoordinate,
        }
    }

    /// The object used by `wdt:`, `ps:`, `pq:` and `pr:` triples.
    pub fn simple_term(&self) -> Term {
        match self {
            Value::Entity(entity) => vocab::entity(entity).into(),
            Value::String(s) | Value::ExternalId(s) => Literal::new_simple_literal(s.as_str()).into(),
            Value::Url(url) => NamedNode::new_unchecked(url.as_str()).into(),
            Value::CommonsMedia(name) => commons_file_node(name).into(),
            Value::MonolingualText { text, language } => {
                Literal::new_language_tagged_literal_unchecked(text.as_str(), language.as_str())
                    .into()
            }
            Value::Quantity(q) => Literal::new_typed_literal(q.amount.as_str(), xsd::DECIMAL).into(),
            Value::Time(t) => Literal::new_typed_literal(xsd_date_time(&t.value), xsd::DATE_TIME).into(),
            Value::GlobeCoordinate(c) => {
                let point = format!("Point({} {})", unsigned(&c.longitude), unsigned(&c.latitude));
                let wkt = if c.globe.as_str() == DEFAULT_GLOBE {
                    point
                } else {
                    format!("<{}> {}", vocab::entity_id(&c.globe).as_str(), point)
                };
                Literal::new_typed_literal(wkt, vocab::wkt_literal()).into()
            }
        }
    }

    /// Fields of the full value node, for the datatypes that have one.
    pub fn full_value(&self) -> Option<FullValue> {
        match self {
            Value::Quantity(q) => {
                let mut fields = vec![(
                    "quantityAmount",
                    Literal::new_typed_literal(q.amount.as_str(), xsd::DECIMAL).into(),
                )];
                if let Some(upper) = &q.upper_bound {
                    fields.push((
                        "quantityUpperBound",
                        Literal::new_typed_literal(upper.as_str(), xsd::DECIMAL).into(),
                    ));
                }
                if let Some(lower) = &q.lower_bound {
                    fields.push((
                        "quantityLowerBound",
                        Literal::new_typed_literal(lower.as_str(), xsd::DECIMAL).into(),
                    ));
                }
                let unit = q
                    .unit
                    .clone()
                    .unwrap_or_else(|| EntityId::new_unchecked(UNITLESS_UNIT));
                fields.push(("quantityUnit", vocab::entity_id(&unit).into()));
                Some(FullValue {
                    node_type: "QuantityValue",
                    fields,
                })
            }
            Value::Time(t) => {
                let mut precision = itoa::Buffer::new();
                Some(FullValue {
                    node_type: "TimeValue",
                    fields: vec![
                        (
                            "timeValue",
                            Literal::new_typed_literal(xsd_date_time(&t.value), xsd::DATE_TIME)
                                .into(),
                        ),
                        (
                            "timePrecision",
                            Literal::new_typed_literal(precision.format(t.precision), xsd::INTEGER)
                                .into(),
                        ),
                        (
                            "timeTimezone",
                            Literal::new_typed_literal("0", xsd::INTEGER).into(),
                        ),
                        (
                            "timeCalendarModel",
                            vocab::entity_id(&EntityId::new_unchecked(t.calendar.item())).into(),
                        ),
                    ],
                })
            }
            Value::GlobeCoordinate(c) => Some(FullValue {
                node_type: "GlobecoordinateValue",
                fields: vec![
                    (
                        "geoLatitude",
                        Literal::new_typed_literal(unsigned(&c.latitude), xsd::DOUBLE).into(),
                    ),
                    (
                        "geoLongitude",
                        Literal::new_typed_literal(unsigned(&c.longitude), xsd::DOUBLE).into(),
                    ),
                    (
                        "geoPrecision",
                        Literal::new_typed_literal(unsigned(&c.precision), xsd::DOUBLE).into(),
                    ),
                    ("geoGlobe", vocab::entity_id(&c.globe).into()),
                ],
            }),
            _ => None,
        }
    }
}

fn unsigned(s: &str) -> &str {
    s.strip_prefix('+').unwrap_or(s)
}

fn commons_file_node(name: &str) -> NamedNode {
    let underscored = name.replace(' ', "_");
    NamedNode::new_unchecked(format!(
        "{}{}",
        vocab::COMMONS_FILE_PATH,
        utf8_percent_encode(&underscored, FILE_PATH_SET)
    ))
}

/// `+1967-00-00T00:00:00Z` -> `1967-01-01T00:00:00Z`; xsd:dateTime has no zero months or days.
fn xsd_date_time(value: &str) -> String {
    let (negative, rest) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, unsigned(value)),
    };
    let Some((date, time)) = rest.split_once('T') else {
        return rest.to_string();
    };
    let mut parts = date.rsplitn(3, '-');
    let day = parts.next().unwrap_or("01");
    let month = parts.next().unwrap_or("01");
    let year = parts.next().unwrap_or("0000");
    let fix = |p: &str| if p == "00" { "01".to_string() } else { p.to_string() };

    format!(
        "{}{}-{}-{}T{}",
        if negative { "-" } else { "" },
        year,
        fix(month),
        fix(day),
        time
    )
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn unquote(datatype: Datatype, raw: &str) -> ConvertResult<String> {
    let inner = raw
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .filter(|_| raw.len() >= 2)
        .ok_or_else(|| ConvertError::malformed_value(datatype.tag(), raw, "expected a quoted string"))?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped @ ('"' | '\\')) => out.push(escaped),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => {
                    return Err(ConvertError::malformed_value(
                        datatype.tag(),
                        raw,
                        "dangling escape",
                    ))
                }
            },
            '"' => {
                return Err(ConvertError::malformed_value(
                    datatype.tag(),
                    raw,
                    "unescaped quote inside string",
                ))
            }
            _ => out.push(c),
        }
    }

    if out.trim().is_empty() {
        return Err(ConvertError::malformed_value(datatype.tag(), raw, "empty string"));
    }
    Ok(out)
}

fn decode_entity(datatype: Datatype, raw: &str) -> ConvertResult<Value> {
    let id = EntityId::parse(raw)
        .ok_or_else(|| ConvertError::malformed_value(datatype.tag(), raw, "not an entity id"))?;
    if datatype.entity_kind() != Some(id.kind()) {
        return Err(ConvertError::malformed_value(
            datatype.tag(),
            raw,
            "entity id of the wrong kind",
        ));
    }
    Ok(Value::Entity(Entity::Existing(id)))
}

fn decode_monolingual(raw: &str) -> ConvertResult<Value> {
    let tag = Datatype::MonolingualText.tag();
    let caps = MONOLINGUAL_REGEX
        .captures(raw)
        .ok_or_else(|| ConvertError::malformed_value(tag, raw, "missing language code"))?;
    let language = &caps[1];
    if language.is_empty() {
        return Err(ConvertError::malformed_value(tag, raw, "missing language code"));
    }
    if !LANGUAGE_REGEX.is_match(language) {
        return Err(ConvertError::malformed_value(tag, raw, "invalid language code"));
    }
    let text = unquote(Datatype::MonolingualText, &caps[2])?;
    Ok(Value::MonolingualText {
        text,
        language: language.to_string(),
    })
}

fn decode_quantity(raw: &str) -> ConvertResult<Value> {
    let tag = Datatype::Quantity.tag();
    let malformed = |reason: &str| ConvertError::malformed_value(tag, raw, reason);

    let caps = QUANTITY_REGEX
        .captures(raw)
        .ok_or_else(|| malformed("expected amount[~tolerance|[lower,upper]][Uunit]"))?;
    let amount = caps.get(1).ok_or_else(|| malformed("missing amount"))?.as_str();
    let amount = decimal::parse(amount).ok_or_else(|| malformed("invalid amount"))?;
    let bound = |raw: &str| decimal::parse(raw).ok_or_else(|| malformed("invalid bound"));

    let bounds = if let Some(tolerance) = caps.get(2) {
        let tolerance = bound(tolerance.as_str())?;
        Some((&amount - &tolerance, &amount + &tolerance))
    } else if let (Some(lower), Some(upper)) = (caps.get(3), caps.get(4)) {
        Some((bound(lower.as_str())?, bound(upper.as_str())?))
    } else {
        None
    };

    if let Some((lower, upper)) = &bounds {
        if *lower > amount || amount > *upper {
            return Err(malformed("amount outside its bounds"));
        }
    }
    let (lower_bound, upper_bound) = match bounds {
        Some((lower, upper)) => (Some(decimal::format(&lower)), Some(decimal::format(&upper))),
        None => (None, None),
    };

    let unit = caps
        .get(5)
        .map(|m| EntityId::new_unchecked(format!("Q{}", m.as_str())));

    Ok(Value::Quantity(Quantity {
        amount: decimal::format(&amount),
        unit,
        lower_bound,
        upper_bound,
    }))
}

fn decode_time(raw: &str) -> ConvertResult<Value> {
    let tag = Datatype::Time.tag();
    let malformed = |reason: &str| ConvertError::malformed_value(tag, raw, reason);

    let caps = TIME_REGEX
        .captures(raw)
        .ok_or_else(|| malformed("expected +YYYY-MM-DDThh:mm:ssZ[/precision][/J]"))?;
    let number = |i: usize| caps[i].parse::<u32>().unwrap_or(u32::MAX);

    let year = caps[2].trim_start_matches('0');
    if year.len() > 16 {
        return Err(malformed("year out of range"));
    }
    let (month, day) = (number(3), number(4));
    if month > 12 || day > 31 || number(5) > 23 || number(6) > 59 || number(7) > 59 {
        return Err(malformed("date or time field out of range"));
    }

    let precision = match caps.get(8) {
        Some(p) => p.as_str().parse::<u8>().unwrap_or(u8::MAX),
        None => DEFAULT_TIME_PRECISION,
    };
    if precision > MAX_TIME_PRECISION {
        return Err(malformed("precision out of range"));
    }
    if (precision >= 10 && month == 0) || (precision >= 11 && day == 0) {
        return Err(malformed("precision finer than the given date"));
    }

    let sign = if &caps[1] == "-" { '-' } else { '+' };
    let value = format!(
        "{}{:0>4}-{}-{}T{}:{}:{}Z",
        sign, year, &caps[3], &caps[4], &caps[5], &caps[6], &caps[7]
    );
    let calendar = if caps.get(9).is_some() {
        CalendarModel::Julian
    } else {
        CalendarModel::Gregorian
    };

    Ok(Value::Time(Time {
        value,
        precision,
        calendar,
    }))
}

fn decode_coordinate(raw: &str) -> ConvertResult<Value> {
    let tag = Datatype::GlobeCoordinate.tag();
    let malformed = |reason: &str| ConvertError::malformed_value(tag, raw, reason);

    let caps = COORDINATE_REGEX
        .captures(raw)
        .ok_or_else(|| malformed("expected @latitude/longitude[/precision[/globe]]"))?;
    let latitude = decimal::parse(&caps[1]).ok_or_else(|| malformed("invalid latitude"))?;
    let longitude = decimal::parse(&caps[2]).ok_or_else(|| malformed("invalid longitude"))?;

    if latitude.abs() > BigDecimal::from(90) {
        return Err(malformed("latitude out of range"));
    }
    if longitude.abs() > BigDecimal::from(360) {
        return Err(malformed("longitude out of range"));
    }

    let precision = caps.get(3).map_or(DEFAULT_GEO_PRECISION, |m| m.as_str());
    let precision = decimal::normalize(precision).ok_or_else(|| malformed("invalid precision"))?;
    let globe = EntityId::new_unchecked(caps.get(4).map(|m| m.as_str()).unwrap_or(DEFAULT_GLOBE));

    Ok(Value::GlobeCoordinate(GlobeCoordinate {
        latitude: decimal::format(&latitude),
        longitude: decimal::format(&longitude),
        precision,
        globe,
    }))
}

/// Decodes a raw token as the given datatype.
pub fn decode(datatype: Datatype, raw: &str) -> ConvertResult<Value> {
    match datatype {
        Datatype::WikibaseItem
        | Datatype::WikibaseProperty
        | Datatype::WikibaseLexeme
        | Datatype::WikibaseForm
        | Datatype::WikibaseSense => decode_entity(datatype, raw),
        Datatype::String => unquote(datatype, raw).map(Value::String),
        Datatype::ExternalId => unquote(datatype, raw).map(Value::ExternalId),
        Datatype::Url => {
            let url = unquote(datatype, raw)?;
            if !URL_REGEX.is_match(&url) || NamedNode::new(url.as_str()).is_err() {
                return Err(ConvertError::malformed_value(datatype.tag(), raw, "invalid URL"));
            }
            Ok(Value::Url(url))
        }
        Datatype::CommonsMedia => {
            let name = unquote(datatype, raw)?;
            if !FILE_NAME_REGEX.is_match(&name) {
                return Err(ConvertError::malformed_value(
                    datatype.tag(),
                    raw,
                    "invalid file name",
                ));
            }
            Ok(Value::CommonsMedia(name))
        }
        Datatype::MonolingualText => decode_monolingual(raw),
        Datatype::Quantity => decode_quantity(raw),
        Datatype::Time => decode_time(raw),
        Datatype::GlobeCoordinate => decode_coordinate(raw),
    }
}

/// Canonical QuickStatements token for a value; `decode` reads it back unchanged.
pub fn encode(value: &Value) -> String {
    match value {
        Value::Entity(entity) => entity.to_string(),
        Value::String(s) | Value::ExternalId(s) | Value::Url(s) | Value::CommonsMedia(s) => quote(s),
        Value::MonolingualText { text, language } => format!("{}:{}", language, quote(text)),
        Value::Quantity(q) => {
            let mut out = q.amount.clone();
            if let (Some(lower), Some(upper)) = (&q.lower_bound, &q.upper_bound) {
                out.push('[');
                out.push_str(lower);
                out.push(',');
                out.push_str(upper);
                out.push(']');
            }
            if let Some(unit) = &q.unit {
                out.push('U');
                out.push_str(unit.as_str().trim_start_matches('Q'));
            }
            out
        }
        Value::Time(t) => {
            let mut precision = itoa::Buffer::new();
            let mut out = format!("{}/{}", t.value, precision.format(t.precision));
            if t.calendar == CalendarModel::Julian {
                out.push_str("/J");
            }
            out
        }
        Value::GlobeCoordinate(c) => {
            let mut out = format!("@{}/{}/{}", c.latitude, c.longitude, unsigned(&c.precision));
            if c.globe.as_str() != DEFAULT_GLOBE {
                out.push('/');
                out.push_str(c.globe.as_str());
            }
            out
        }
    }
}

/// Guesses the datatype of an untyped token from its shape.
pub fn infer_datatype(raw: &str) -> ConvertResult<Datatype> {
    if raw.starts_with('@') {
        return Ok(Datatype::GlobeCoordinate);
    }
    if raw.starts_with('"') {
        return Ok(Datatype::String);
    }
    if MONOLINGUAL_REGEX.is_match(raw) {
        return Ok(Datatype::MonolingualText);
    }
    if raw.eq_ignore_ascii_case("LAST") {
        return Ok(Datatype::WikibaseItem);
    }
    if let Some(id) = EntityId::parse(raw) {
        return Ok(Datatype::for_entity_kind(id.kind()));
    }

    let first = raw.chars().next();
    let numeric_start = first.is_some_and(|c| c.is_ascii_digit() || "+-~U[".contains(c));
    if numeric_start && raw.contains('T') && raw.contains('Z') {
        return Ok(Datatype::Time);
    }
    if numeric_start {
        return Ok(Datatype::Quantity);
    }

    Err(ConvertError::malformed_value(
        "untyped",
        raw,
        "unrecognized value syntax",
    ))
}
