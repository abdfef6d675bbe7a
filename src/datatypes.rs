use crate::error::{ConvertError, LineError};
use crate::model::PropertyId;
use crate::value::Datatype;
use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::info;

/// Declared datatypes of properties, read from a `property,datatype` CSV.
///
/// Properties missing from the table get their datatype inferred from the
/// value token's shape, which cannot tell string, external-id, url and
/// commonsMedia apart.
#[derive(Debug, Default, Clone)]
pub struct PropertyTypes {
    types: FxHashMap<PropertyId, Datatype>,
}

impl PropertyTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open property types file: {:?}", path))?;
        let types = Self::from_reader(BufReader::new(file))
            .with_context(|| format!("Invalid property types file: {:?}", path))?;
        info!(properties = types.len(), path = ?path, "Property types loaded");
        Ok(types)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mut types = Self::new();
        for result in csv_reader.records() {
            let record = result?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            if record.len() != 2 {
                return Err(LineError::new(
                    line,
                    ConvertError::malformed_command("expected `property,datatype`"),
                )
                .into());
            }
            if line == 1 && &record[0] == "property" {
                continue;
            }

            let property = PropertyId::parse(&record[0]).ok_or_else(|| {
                LineError::new(
                    line,
                    ConvertError::malformed_command(format!("invalid property `{}`", &record[0])),
                )
            })?;
            let datatype =
                Datatype::from_tag(&record[1]).map_err(|e| LineError::new(line, e))?;
            types.insert(property, datatype);
        }
        Ok(types)
    }

    pub fn insert(&mut self, property: PropertyId, datatype: Datatype) {
        self.types.insert(property, datatype);
    }

    pub fn get(&self, property: &PropertyId) -> Option<Datatype> {
        self.types.get(property).copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: &str) -> PropertyId {
        PropertyId::parse(id).unwrap()
    }

    #[test]
    fn reads_declared_types() {
        let csv = "property,datatype\nP18,commonsMedia\nP856 , url\n# comment\nP214,external-id\n";
        let types = PropertyTypes::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(types.len(), 3);
        assert_eq!(types.get(&p("P18")), Some(Datatype::CommonsMedia));
        assert_eq!(types.get(&p("P856")), Some(Datatype::Url));
        assert_eq!(types.get(&p("P214")), Some(Datatype::ExternalId));
        assert_eq!(types.get(&p("P31")), None);
    }

    #[test]
    fn unknown_tag_reports_line() {
        let csv = "P18,commonsMedia\nP3,geo-shape\n";
        let err = PropertyTypes::from_reader(csv.as_bytes()).unwrap_err();
        let line_error = err.downcast_ref::<LineError>().unwrap();
        assert_eq!(line_error.line, 2);
        assert_eq!(
            line_error.error,
            ConvertError::UnknownDatatype("geo-shape".to_string())
        );
    }

    #[test]
    fn rejects_bad_property() {
        let err = PropertyTypes::from_reader("Q5,string\n".as_bytes()).unwrap_err();
        assert!(err.downcast_ref::<LineError>().is_some());
    }

    #[test]
    fn rejects_wrong_arity() {
        let err = PropertyTypes::from_reader("P5\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("property,datatype"));
    }
}
