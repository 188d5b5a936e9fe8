//! Declarative attribute mapping
//!
//! A [`MappingConfiguration`] is an ordered list of [`RecordTemplate`]s.
//! Each template turns one directory entry into zero or more rows of a
//! single [`RecordKind`]; attribute values no template consumes are kept
//! verbatim as fallback rows, so every value of every entry ends up in the
//! store.

mod loader;

pub use loader::{load, load_file};

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::entry::{AttributeValue, DirectoryEntry};
use crate::error::ConfigurationError;
use crate::kinds::RecordKind;
use crate::operation::{ColumnValue, DataRow};

/// The built-in mapping for inetOrgPerson entries.
const BASIC_MAPPING: &str = include_str!("basic.xml");

/// Where a field rule takes its value from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSource {
    /// Copy the values of a directory attribute.
    Attribute {
        /// Directory attribute name.
        name: String,
        /// Copy the raw bytes instead of text.
        binary: bool,
    },
    /// Write a constant fixed at load time.
    Literal {
        /// Symbolic constant name from the mapping file.
        constant: String,
        /// Resolved constant value.
        value: String,
    },
}

/// One output column and where its value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    /// Resolved storage column.
    pub column: String,
    /// Value source.
    pub source: FieldSource,
}

impl FieldRule {
    /// Check if this rule copies a directory attribute.
    pub fn is_dynamic(&self) -> bool {
        matches!(self.source, FieldSource::Attribute { .. })
    }
}

/// An ordered set of field rules producing rows of one record kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordTemplate {
    kind: RecordKind,
    rules: Vec<FieldRule>,
}

impl RecordTemplate {
    /// Create a template with no rules.
    pub fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            rules: Vec::new(),
        }
    }

    /// Add a rule copying a directory attribute into `column`.
    pub fn with_attribute(
        mut self,
        column: &str,
        attribute: impl Into<String>,
        binary: bool,
    ) -> Result<Self, ConfigurationError> {
        let resolved = self.resolve_column(column)?;
        self.rules.push(FieldRule {
            column: resolved,
            source: FieldSource::Attribute {
                name: attribute.into(),
                binary,
            },
        });
        Ok(self)
    }

    /// Add a rule writing the named constant into `column`.
    pub fn with_literal(mut self, column: &str, constant: &str) -> Result<Self, ConfigurationError> {
        let resolved = self.resolve_column(column)?;
        let value =
            self.kind
                .constant(constant)
                .ok_or_else(|| ConfigurationError::UnknownConstant {
                    kind: self.kind.to_string(),
                    column: column.to_string(),
                    constant: constant.to_string(),
                })?;
        self.rules.push(FieldRule {
            column: resolved,
            source: FieldSource::Literal {
                constant: constant.to_string(),
                value: value.to_string(),
            },
        });
        Ok(self)
    }

    /// Resolve a symbolic column to a storage column no earlier rule writes.
    ///
    /// Aliases such as `DATA` and `ADDRESS` share a storage column, so the
    /// check is on the resolved name.
    fn resolve_column(&self, column: &str) -> Result<String, ConfigurationError> {
        let resolved = self
            .kind
            .column(column)
            .ok_or_else(|| ConfigurationError::UnknownColumn {
                kind: self.kind.to_string(),
                column: column.to_string(),
            })?;
        if self.rules.iter().any(|rule| rule.column == resolved) {
            return Err(ConfigurationError::DuplicateColumn {
                kind: self.kind.to_string(),
                column: column.to_string(),
            });
        }
        Ok(resolved.to_string())
    }

    /// Record kind of the rows this template produces.
    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Rules in declaration order.
    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    fn dynamic_rules(&self) -> impl Iterator<Item = (&FieldRule, &str, bool)> {
        self.rules.iter().filter_map(|rule| match &rule.source {
            FieldSource::Attribute { name, binary } => Some((rule, name.as_str(), *binary)),
            FieldSource::Literal { .. } => None,
        })
    }

    fn literal_rules(&self) -> impl Iterator<Item = (&FieldRule, &str)> {
        self.rules.iter().filter_map(|rule| match &rule.source {
            FieldSource::Literal { value, .. } => Some((rule, value.as_str())),
            FieldSource::Attribute { .. } => None,
        })
    }

    /// Expand this template against one entry.
    ///
    /// Row `i` carries the `i`-th value of every referenced attribute that
    /// has at least `i + 1` values, so the number of rows is the largest
    /// value count among the referenced attributes. A template without
    /// attribute rules always yields exactly one row; a template whose
    /// referenced attributes are all absent yields none.
    ///
    /// The directory spelling of every attribute consumed is added to
    /// `mapped`. A value that is not valid UTF-8 is never written to a text
    /// column; the caller keeps it as a fallback row instead.
    pub fn expand(&self, entry: &DirectoryEntry, mapped: &mut BTreeSet<String>) -> Vec<DataRow> {
        let mut has_dynamic = false;
        let mut columns: Vec<Vec<(String, ColumnValue)>> = Vec::new();

        for (rule, name, binary) in self.dynamic_rules() {
            has_dynamic = true;
            let Some(attribute) = entry.attribute(name) else {
                continue;
            };
            mapped.insert(attribute.name().to_string());

            for (i, value) in attribute.values().iter().enumerate() {
                if columns.len() <= i {
                    columns.resize_with(i + 1, Vec::new);
                }
                let value = if binary {
                    ColumnValue::Blob(value.as_bytes().to_vec())
                } else {
                    match value.as_str() {
                        Some(text) => ColumnValue::Text(text.to_string()),
                        None => continue,
                    }
                };
                columns[i].push((rule.column.clone(), value));
            }
        }

        if !has_dynamic {
            columns.push(Vec::new());
        }

        let rows: Vec<DataRow> = columns
            .into_iter()
            .filter(|dynamic| !has_dynamic || !dynamic.is_empty())
            .map(|dynamic| {
                let literals = self
                    .literal_rules()
                    .map(|(rule, value)| (rule.column.clone(), ColumnValue::from(value)));
                DataRow::new(self.kind.content_item_type(), dynamic.into_iter().chain(literals))
            })
            .collect();

        if !rows.is_empty() {
            debug!(kind = %self.kind, rows = rows.len(), dn = %entry.dn(), "Expanded record template");
        }

        rows
    }

    /// Check whether a stored row could have been produced by this template.
    fn matches(&self, row: &DataRow) -> bool {
        row.content_type() == self.kind.content_item_type()
            && self
                .literal_rules()
                .all(|(rule, value)| row.get(&rule.column).and_then(ColumnValue::as_text) == Some(value))
    }
}

/// Rows built for one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandedEntry {
    /// Mapped rows followed by fallback rows.
    pub rows: Vec<DataRow>,
    /// Attributes consumed by at least one template.
    pub mapped: BTreeSet<String>,
}

/// An ordered list of record templates.
///
/// Loaded once per sync run and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingConfiguration {
    templates: Vec<RecordTemplate>,
}

impl MappingConfiguration {
    /// Create a configuration from templates.
    pub fn new(templates: Vec<RecordTemplate>) -> Self {
        Self { templates }
    }

    /// The built-in mapping for inetOrgPerson entries.
    pub fn basic() -> Result<Self, ConfigurationError> {
        load(BASIC_MAPPING)
    }

    /// Templates in declaration order.
    pub fn templates(&self) -> &[RecordTemplate] {
        &self.templates
    }

    /// Check if there are no templates.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Expand an entry through every template, then preserve every value of
    /// every attribute no template consumed as a fallback row.
    pub fn expand(&self, entry: &DirectoryEntry) -> ExpandedEntry {
        let mut mapped = BTreeSet::new();
        let mut rows: Vec<DataRow> = self
            .templates
            .iter()
            .flat_map(|template| template.expand(entry, &mut mapped))
            .collect();

        for attribute in entry.attributes() {
            let unmapped = !mapped.contains(attribute.name());
            // Values a text rule had to skip still need a home.
            let raw_only = !unmapped && !self.has_binary_rule(attribute.name());
            rows.extend(
                attribute
                    .values()
                    .iter()
                    .enumerate()
                    .filter(|(_, value)| unmapped || (raw_only && value.as_str().is_none()))
                    .map(|(i, value)| DataRow::fallback(attribute.name(), i, value.as_bytes())),
            );
        }

        ExpandedEntry { rows, mapped }
    }

    /// Rebuild a directory entry from the rows stored for it.
    ///
    /// Each mapped row is attributed to the first template that could have
    /// produced it and its attribute columns are appended, in row order, to
    /// the attributes they came from. Fallback rows are then slotted back
    /// in at their recorded value index. Rows matching no template are
    /// ignored.
    pub fn rebuild_entry(&self, dn: impl Into<String>, rows: &[DataRow]) -> DirectoryEntry {
        let mut entry = DirectoryEntry::new(dn);
        let mut unmapped: BTreeMap<&str, Vec<(usize, &[u8])>> = BTreeMap::new();

        for row in rows {
            if let Some((name, index, data)) = row.as_fallback() {
                unmapped.entry(name).or_default().push((index, data));
                continue;
            }
            let Some(template) = self.templates.iter().find(|t| t.matches(row)) else {
                debug!(content_type = %row.content_type(), "No template matches stored row");
                continue;
            };
            for (rule, name, binary) in template.dynamic_rules() {
                let Some(value) = row.get(&rule.column) else {
                    continue;
                };
                let value = match value {
                    ColumnValue::Text(text) if !binary => AttributeValue::Text(text.clone()),
                    other => AttributeValue::from_bytes(other.as_bytes().to_vec()),
                };
                entry.push_value(name, value);
            }
        }

        for (name, mut values) in unmapped {
            values.sort_by_key(|(index, _)| *index);
            for (index, data) in values {
                entry.insert_value(name, index, AttributeValue::from_bytes(data.to_vec()));
            }
        }

        entry
    }

    fn has_binary_rule(&self, attribute: &str) -> bool {
        self.templates
            .iter()
            .flat_map(RecordTemplate::dynamic_rules)
            .any(|(_, name, binary)| binary && name.eq_ignore_ascii_case(attribute))
    }
}
