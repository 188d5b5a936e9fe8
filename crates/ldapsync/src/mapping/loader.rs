//! Mapping file loader
//!
//! Reads the `ldapsyncmapping` markup in one top-to-bottom pass:
//!
//! ```xml
//! <ldapsyncmapping>
//!   <row type="Email">
//!     <field column="DATA" ldapattr="mail"/>
//!     <field column="TYPE" typeattr="TYPE_WORK"/>
//!   </row>
//! </ldapsyncmapping>
//! ```
//!
//! Any error aborts the load.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;
use tracing::{debug, instrument};

use super::{MappingConfiguration, RecordTemplate};
use crate::error::ConfigurationError;
use crate::kinds::RecordKind;

const ROOT: &[u8] = b"ldapsyncmapping";
const ROW: &[u8] = b"row";
const FIELD: &[u8] = b"field";

/// Load a mapping configuration from markup text.
#[instrument(skip(source), fields(len = source.len()))]
pub fn load(source: &str) -> Result<MappingConfiguration, ConfigurationError> {
    let mut reader = Reader::from_str(source);
    reader.config_mut().trim_text(true);

    let mut templates: Vec<RecordTemplate> = Vec::new();
    // Element names from the root down to the current element.
    let mut path: Vec<Vec<u8>> = Vec::new();

    loop {
        let position = reader.buffer_position() as u64;
        let event = reader
            .read_event()
            .map_err(|e| ConfigurationError::xml(position, e))?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let name = e.name().as_ref().to_vec();
                match (path.len(), name.as_slice()) {
                    (0, ROOT) => {}
                    (0, _) => {
                        return Err(ConfigurationError::UnexpectedRoot {
                            found: String::from_utf8_lossy(&name).into_owned(),
                        })
                    }
                    (1, ROW) => templates.push(start_row(e, position)?),
                    (1, FIELD) => return Err(ConfigurationError::FieldOutsideRow),
                    (2, FIELD) if path[1] == ROW => {
                        let template = templates
                            .pop()
                            .ok_or(ConfigurationError::FieldOutsideRow)?;
                        templates.push(add_field(template, e, position)?);
                    }
                    _ => debug!(
                        element = %String::from_utf8_lossy(&name),
                        "Ignoring unrecognised mapping element"
                    ),
                }
                if matches!(event, Event::Start(_)) {
                    path.push(name);
                }
            }
            Event::End(_) => {
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    debug!(rows = templates.len(), "Loaded mapping configuration");
    Ok(MappingConfiguration::new(templates))
}

/// Load a mapping configuration from a file.
pub fn load_file(path: impl AsRef<Path>) -> Result<MappingConfiguration, ConfigurationError> {
    let source = std::fs::read_to_string(path)?;
    load(&source)
}

fn start_row(e: &BytesStart<'_>, position: u64) -> Result<RecordTemplate, ConfigurationError> {
    let kind = attribute(e, b"type", position)?.ok_or(ConfigurationError::MissingRowType)?;
    debug!(kind = %kind, "<row>");

    let kind: RecordKind = kind
        .parse()
        .map_err(|_| ConfigurationError::UnknownRecordKind { kind })?;
    Ok(RecordTemplate::new(kind))
}

fn add_field(
    template: RecordTemplate,
    e: &BytesStart<'_>,
    position: u64,
) -> Result<RecordTemplate, ConfigurationError> {
    let kind = template.kind().to_string();
    let column = attribute(e, b"column", position)?;
    let ldapattr = attribute(e, b"ldapattr", position)?;
    let typeattr = attribute(e, b"typeattr", position)?;
    let binary = attribute(e, b"blob", position)?.is_some();
    debug!(column = ?column, ldapattr = ?ldapattr, typeattr = ?typeattr, binary, "<field>");

    let column = column.ok_or_else(|| ConfigurationError::MissingColumn { kind: kind.clone() })?;

    match (ldapattr, typeattr) {
        (None, None) => Err(ConfigurationError::MissingSource { kind, column }),
        (Some(_), Some(_)) => Err(ConfigurationError::ConflictingSource { kind, column }),
        (None, Some(_)) if binary => Err(ConfigurationError::BinaryLiteral { kind, column }),
        (Some(attr), None) => template.with_attribute(&column, attr, binary),
        (None, Some(constant)) => template.with_literal(&column, &constant),
    }
}

fn attribute(
    e: &BytesStart<'_>,
    key: &[u8],
    position: u64,
) -> Result<Option<String>, ConfigurationError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ConfigurationError::xml(position, err))?;
        if attr.key.as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|err| ConfigurationError::xml(position, err))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}
