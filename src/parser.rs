//! QuickStatements command parser.
//!
//! Physical lines are first grouped into logical rows ([`LineGroups`]): a line
//! whose first field is empty continues the row above it. Each group is then
//! parsed into a [`Command`] by [`CommandParser`], which resolves `CREATE` and
//! `LAST` through its [`ParseSession`].

use crate::datatypes::PropertyTypes;
use crate::error::{ConvertError, ConvertResult, LineError};
use crate::model::{
    Command, Entity, EntityRef, PropertyId, Rank, Reference, SitelinkDirective, Snak, Statement,
    TermDirective, TermKind,
};
use crate::value::{self, Datatype, Value};
use crate::vocab::Site;
use clap::ValueEnum;
use memchr::{memchr2, memmem};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::VecDeque;
use std::io;

static TERM_KEY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([LDA])([a-z]{2,3}(?:-[a-z0-9]+)*)$").unwrap());

static SITELINK_KEY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^S([a-z][a-z0-9_]*)$").unwrap());

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Delimiter {
    #[default]
    Tab,
    /// `|` between fields, `||` between rows
    Pipe,
}

impl Delimiter {
    fn byte(self) -> u8 {
        match self {
            Delimiter::Tab => b'\t',
            Delimiter::Pipe => b'|',
        }
    }
}

/// One logical row: the physical lines it spans, with their line numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineGroup {
    pub lines: Vec<(u64, String)>,
}

impl LineGroup {
    pub fn single(line: u64, text: impl Into<String>) -> Self {
        Self {
            lines: vec![(line, text.into())],
        }
    }

    pub fn first_line(&self) -> u64 {
        self.lines.first().map(|(line, _)| *line).unwrap_or(0)
    }
}

/// Groups physical lines into logical rows.
///
/// Blank lines and `#` comments are dropped. In pipe mode a physical line may
/// hold several rows separated by `||`; they keep the physical line number.
pub struct LineGroups<I> {
    lines: I,
    delimiter: Delimiter,
    line_no: u64,
    segments: VecDeque<(u64, String)>,
    pending: Option<LineGroup>,
}

impl<I> LineGroups<I>
where
    I: Iterator<Item = io::Result<String>>,
{
    pub fn new(lines: I, delimiter: Delimiter) -> Self {
        Self {
            lines,
            delimiter,
            line_no: 0,
            segments: VecDeque::new(),
            pending: None,
        }
    }

    fn next_segment(&mut self) -> Option<io::Result<(u64, String)>> {
        loop {
            if let Some(segment) = self.segments.pop_front() {
                return Some(Ok(segment));
            }
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e)),
            };
            self.line_no += 1;
            let line = line.strip_suffix('\r').unwrap_or(&line);

            match self.delimiter {
                Delimiter::Tab => self.segments.push_back((self.line_no, line.to_string())),
                Delimiter::Pipe => {
                    for row in split_rows(line) {
                        self.segments.push_back((self.line_no, row.to_string()));
                    }
                }
            }
        }
    }
}

impl<I> Iterator for LineGroups<I>
where
    I: Iterator<Item = io::Result<String>>,
{
    type Item = io::Result<LineGroup>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (line_no, text) = match self.next_segment() {
                Some(Ok(segment)) => segment,
                Some(Err(e)) => return Some(Err(e)),
                None => return self.pending.take().map(Ok),
            };

            let trimmed = text.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let continues = text
                .trim_start_matches(' ')
                .starts_with(self.delimiter.byte() as char);
            if continues {
                if let Some(group) = self.pending.as_mut() {
                    group.lines.push((line_no, text));
                    continue;
                }
            }
            let finished = self.pending.replace(LineGroup::single(line_no, text));
            if finished.is_some() {
                return finished.map(Ok);
            }
        }
    }
}

/// Splits a pipe-mode line on `||` outside quoted strings.
fn split_rows(line: &str) -> Vec<&str> {
    let bytes = line.as_bytes();
    let finder = memmem::Finder::new(b"||");
    let mut rows = Vec::new();
    let mut start = 0;
    let mut search = 0;

    while let Some(offset) = finder.find(&bytes[search..]) {
        let at = search + offset;
        if quote_open(&bytes[start..at]) {
            search = at + 1;
            continue;
        }
        rows.push(&line[start..at]);
        start = at + 2;
        search = start;
    }
    rows.push(&line[start..]);
    rows
}

fn quote_open(bytes: &[u8]) -> bool {
    let mut open = false;
    let mut escaped = false;
    for &b in bytes {
        match b {
            _ if escaped => escaped = false,
            b'\\' if open => escaped = true,
            b'"' => open = !open,
            _ => {}
        }
    }
    open
}

/// Splits one physical line into trimmed fields, ignoring delimiters inside
/// `"..."`. Trailing empty fields are dropped.
pub fn split_fields(line: &str, delimiter: Delimiter) -> ConvertResult<Vec<&str>> {
    let bytes = line.as_bytes();
    let delimiter = delimiter.byte();
    let mut fields = Vec::new();
    let mut start = 0;
    let mut pos = 0;
    let mut in_quotes = false;

    while pos < bytes.len() {
        if in_quotes {
            let Some(offset) = memchr2(b'"', b'\\', &bytes[pos..]) else {
                break;
            };
            let at = pos + offset;
            if bytes[at] == b'\\' {
                pos = at + 2;
            } else {
                in_quotes = false;
                pos = at + 1;
            }
        } else {
            let Some(offset) = memchr2(delimiter, b'"', &bytes[pos..]) else {
                break;
            };
            let at = pos + offset;
            if bytes[at] == b'"' {
                in_quotes = true;
            } else {
                fields.push(line[start..at].trim());
                start = at + 1;
            }
            pos = at + 1;
        }
    }

    if in_quotes {
        return Err(ConvertError::malformed_command("unterminated quoted string"));
    }
    fields.push(line[start..].trim());
    while fields.len() > 1 && fields.last().is_some_and(|f| f.is_empty()) {
        fields.pop();
    }
    Ok(fields)
}

/// Placeholder table for `CREATE` / `LAST`.
#[derive(Debug, Clone, Default)]
pub struct ParseSession {
    scope: u32,
    created: u32,
    last: Option<Entity>,
}

impl ParseSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session whose created items are named apart from other scopes.
    pub fn scoped(scope: u32) -> Self {
        Self {
            scope,
            ..Self::default()
        }
    }

    pub fn create(&mut self) -> Entity {
        self.created += 1;
        let entity = Entity::New {
            scope: self.scope,
            seq: self.created,
        };
        self.last = Some(entity.clone());
        entity
    }

    pub fn last(&self) -> ConvertResult<Entity> {
        self.last.clone().ok_or(ConvertError::UnresolvedPlaceholder)
    }

    pub fn resolve(&self, entity: EntityRef) -> ConvertResult<Entity> {
        match entity {
            EntityRef::Entity(entity) => Ok(entity),
            EntityRef::Last => self.last(),
        }
    }

    pub fn created(&self) -> u32 {
        self.created
    }

    pub fn reset(&mut self) {
        self.created = 0;
        self.last = None;
    }
}

/// Key of a trailing `key value` pair on a statement row.
enum PairKey {
    Qualifier(PropertyId),
    Reference { property: PropertyId, new_block: bool },
    Rank,
}

fn parse_pair_key(key: &str) -> ConvertResult<PairKey> {
    if key.eq_ignore_ascii_case("rank") {
        return Ok(PairKey::Rank);
    }
    if let Some(property) = PropertyId::parse(key) {
        return Ok(PairKey::Qualifier(property));
    }
    let (rest, new_block) = match key.strip_prefix("!S") {
        Some(rest) => (rest, true),
        None => (key.strip_prefix('S').unwrap_or(""), false),
    };
    let mut id = String::with_capacity(rest.len() + 1);
    id.push('P');
    id.push_str(rest);
    PropertyId::parse(&id)
        .map(|property| PairKey::Reference { property, new_block })
        .ok_or_else(|| ConvertError::malformed_command(format!("unexpected key `{}`", key)))
}

pub struct CommandParser<'a> {
    types: &'a PropertyTypes,
    delimiter: Delimiter,
    session: ParseSession,
}

impl<'a> CommandParser<'a> {
    pub fn new(types: &'a PropertyTypes, delimiter: Delimiter, session: ParseSession) -> Self {
        Self {
            types,
            delimiter,
            session,
        }
    }

    pub fn session(&self) -> &ParseSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ParseSession {
        &mut self.session
    }

    pub fn parse(&mut self, group: &LineGroup) -> Result<Command, LineError> {
        let mut rows = Vec::with_capacity(group.lines.len());
        for (line, text) in &group.lines {
            let fields =
                split_fields(text, self.delimiter).map_err(|e| LineError::new(*line, e))?;
            rows.push((*line, fields));
        }
        let Some(((head_line, head), continuation)) = rows.split_first() else {
            return Err(LineError::new(
                0,
                ConvertError::malformed_command("empty line group"),
            ));
        };
        let at = |line: u64| move |e: ConvertError| LineError::new(line, e);

        let keyword = head[0];
        if keyword.eq_ignore_ascii_case("CREATE") && head.len() == 1 {
            if let Some((line, _)) = continuation.first() {
                return Err(LineError::new(
                    *line,
                    ConvertError::malformed_command("CREATE takes no continuation"),
                ));
            }
            return Ok(Command::Create(self.session.create()));
        }
        check_head(head).map_err(at(*head_line))?;

        let subject = EntityRef::parse(keyword)
            .ok_or_else(|| ConvertError::malformed_command(format!("invalid subject `{}`", keyword)))
            .and_then(|subject| self.session.resolve(subject))
            .map_err(at(*head_line))?;
        let key = head[1];

        if let Some(caps) = TERM_KEY_REGEX.captures(key) {
            let line = continuation.first().map(|(line, _)| *line).unwrap_or(*head_line);
            if head.len() != 3 || !continuation.is_empty() {
                return Err(LineError::new(
                    line,
                    ConvertError::malformed_command("term rows take exactly one value"),
                ));
            }
            let kind = match &caps[1] {
                "L" => TermKind::Label,
                "D" => TermKind::Description,
                _ => TermKind::Alias,
            };
            let text = decode_text(head[2]).map_err(at(*head_line))?;
            return Ok(Command::Term(TermDirective {
                subject,
                kind,
                language: caps[2].to_string(),
                text,
            }));
        }

        if let Some(caps) = SITELINK_KEY_REGEX.captures(key) {
            let line = continuation.first().map(|(line, _)| *line).unwrap_or(*head_line);
            if head.len() != 3 || !continuation.is_empty() {
                return Err(LineError::new(
                    line,
                    ConvertError::malformed_command("sitelink rows take exactly one value"),
                ));
            }
            let site = &caps[1];
            if Site::lookup(site).is_none() {
                return Err(LineError::new(
                    *head_line,
                    ConvertError::malformed_command(format!("unknown site `{}`", site)),
                ));
            }
            let title = decode_text(head[2]).map_err(at(*head_line))?;
            return Ok(Command::Sitelink(SitelinkDirective {
                subject,
                site: site.to_string(),
                title,
            }));
        }

        let property = PropertyId::parse(key)
            .ok_or_else(|| ConvertError::malformed_command(format!("invalid property `{}`", key)))
            .map_err(at(*head_line))?;
        let value = self.decode_value(&property, head[2]).map_err(at(*head_line))?;

        let mut statement = Statement {
            subject,
            main_snak: Snak::new(property, value),
            qualifiers: Vec::new(),
            references: Vec::new(),
            rank: Rank::default(),
        };
        let mut open_reference: Option<Reference> = None;

        let mut pair_lines = vec![(*head_line, &head[3..])];
        for (line, fields) in continuation {
            if !fields[0].is_empty() {
                return Err(LineError::new(
                    *line,
                    ConvertError::malformed_command("continuation line must start with a delimiter"),
                ));
            }
            pair_lines.push((*line, &fields[1..]));
        }

        for (line, fields) in pair_lines {
            if fields.len() % 2 != 0 {
                return Err(LineError::new(
                    line,
                    ConvertError::malformed_command("key without a value"),
                ));
            }
            for pair in fields.chunks_exact(2) {
                let (key, raw) = (pair[0], pair[1]);
                match parse_pair_key(key).map_err(at(line))? {
                    PairKey::Rank => {
                        statement.rank = Rank::parse(raw).ok_or_else(|| {
                            LineError::new(
                                line,
                                ConvertError::malformed_command(format!("invalid rank `{}`", raw)),
                            )
                        })?;
                    }
                    PairKey::Qualifier(property) => {
                        let value = self.decode_value(&property, raw).map_err(at(line))?;
                        statement.qualifiers.push(Snak::new(property, value));
                    }
                    PairKey::Reference {
                        property,
                        new_block,
                    } => {
                        let value = self.decode_value(&property, raw).map_err(at(line))?;
                        if new_block {
                            if let Some(reference) = open_reference.take() {
                                statement.references.push(reference);
                            }
                        }
                        open_reference
                            .get_or_insert_with(Reference::default)
                            .snaks
                            .push(Snak::new(property, value));
                    }
                }
            }
        }
        if let Some(reference) = open_reference {
            statement.references.push(reference);
        }

        Ok(Command::Statement(statement))
    }

    fn decode_value(&self, property: &PropertyId, raw: &str) -> ConvertResult<Value> {
        let datatype = match self.types.get(property) {
            Some(datatype) => datatype,
            None => value::infer_datatype(raw)?,
        };
        if raw.eq_ignore_ascii_case("LAST") {
            if datatype != Datatype::WikibaseItem {
                return Err(ConvertError::malformed_value(
                    datatype.tag(),
                    raw,
                    "LAST only stands for an item",
                ));
            }
            return self.session.last().map(Value::Entity);
        }
        value::decode(datatype, raw)
    }
}

fn check_head(head: &[&str]) -> ConvertResult<()> {
    let keyword = head[0];
    if keyword.is_empty() {
        return Err(ConvertError::malformed_command(
            "continuation line without a preceding row",
        ));
    }
    if keyword.starts_with('-') {
        return Err(ConvertError::malformed_command(
            "statement removal is not supported",
        ));
    }
    if keyword.eq_ignore_ascii_case("MERGE") {
        return Err(ConvertError::malformed_command("MERGE is not supported"));
    }
    if head.len() < 3 {
        return Err(ConvertError::malformed_command(
            "expected subject, key and value",
        ));
    }
    Ok(())
}

fn decode_text(raw: &str) -> ConvertResult<String> {
    match value::decode(Datatype::String, raw)? {
        Value::String(text) => Ok(text),
        _ => Err(ConvertError::malformed_value("string", raw, "expected a quoted string")),
    }
}
