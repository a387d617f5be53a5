use std::collections::HashMap;

use serde_json::Value;

use super::error::BindError;

/// Key under which the JSON declaration table nests rule lists.
pub const DECLARATION_KEY: &str = "__authz";

/// Rule names bound to schema types and fields, produced by the binder.
///
/// Read-only after binding; the compiler consults it once per selected
/// field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleBindings {
    pub(crate) types: HashMap<String, Vec<String>>,
    /// Parent type name, then field name.
    pub(crate) fields: HashMap<String, HashMap<String, Vec<String>>>,
}

impl RuleBindings {
    /// Rules that apply wherever a value of `type_name` occurs.
    #[must_use]
    pub fn type_rules(&self, type_name: &str) -> &[String] {
        self.types.get(type_name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Rules that apply at `parent.field` regardless of its return type.
    #[must_use]
    pub fn field_rules(&self, parent: &str, field: &str) -> &[String] {
        self.fields
            .get(parent)
            .and_then(|fields| fields.get(field))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The rule list for one selected field: field binding first, then the
    /// binding of its return type, first occurrence wins.
    #[must_use]
    pub fn rules_at<'a>(&'a self, field: Option<(&str, &str)>, return_type: &str) -> Vec<&'a str> {
        let from_field = field
            .map(|(parent, name)| self.field_rules(parent, name))
            .unwrap_or(&[]);
        let mut out: Vec<&str> = Vec::new();
        for rule in from_field.iter().chain(self.type_rules(return_type)) {
            if !out.contains(&rule.as_str()) {
                out.push(rule);
            }
        }
        out
    }

    /// Number of types with at least one rule.
    #[must_use]
    pub fn bound_type_count(&self) -> usize {
        self.types.len()
    }

    /// Number of fields with at least one rule.
    #[must_use]
    pub fn bound_field_count(&self) -> usize {
        self.fields.values().map(HashMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.fields.is_empty()
    }

    /// Every bound location with its rule list, types first, each group
    /// sorted by name.
    pub fn entries(&self) -> Vec<(BindingTarget<'_>, &[String])> {
        let mut types: Vec<_> = self
            .types
            .iter()
            .map(|(ty, rules)| (BindingTarget::Type(ty), rules.as_slice()))
            .collect();
        types.sort_by(|a, b| a.0.cmp(&b.0));
        let mut fields: Vec<_> = self
            .fields
            .iter()
            .flat_map(|(parent, fields)| {
                fields.iter().map(move |(field, rules)| {
                    (BindingTarget::Field(parent, field), rules.as_slice())
                })
            })
            .collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        types.extend(fields);
        types
    }
}

#[cfg(feature = "binary-cache")]
impl RuleBindings {
    /// Serialize the bound tables to a byte vector.
    ///
    /// The optional `schema_text` is hashed (BLAKE3) and embedded in the
    /// payload metadata, so a later load can tell whether the schema source
    /// changed.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError`](crate::serial::SerializeError) if encoding fails.
    pub fn to_bytes(
        &self,
        schema_text: Option<&str>,
    ) -> Result<Vec<u8>, crate::serial::SerializeError> {
        crate::serial::encode(self, schema_text)
    }

    /// Deserialize tables previously produced by [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    ///
    /// Returns [`DeserializeError`](crate::serial::DeserializeError) if the
    /// blob is corrupt, from another format version, or malformed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, crate::serial::DeserializeError> {
        crate::serial::decode(bytes, None)
    }

    /// Like [`from_bytes`](Self::from_bytes), but also require that the blob
    /// was written for exactly `schema_text`.
    ///
    /// # Errors
    ///
    /// Returns [`DeserializeError::StaleSchema`](crate::serial::DeserializeError::StaleSchema)
    /// when the schema source differs, plus every error of `from_bytes`.
    pub fn from_bytes_for_schema(
        bytes: &[u8],
        schema_text: &str,
    ) -> Result<Self, crate::serial::DeserializeError> {
        crate::serial::decode(bytes, Some(schema_text))
    }

    /// Serialize the bound tables and write them to a file.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError`](crate::serial::SerializeError) on encoding
    /// or I/O failure.
    pub fn to_binary_file(
        &self,
        path: impl AsRef<std::path::Path>,
        schema_text: Option<&str>,
    ) -> Result<(), crate::serial::SerializeError> {
        let bytes = self.to_bytes(schema_text)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Read a file and deserialize the tables it contains.
    ///
    /// # Errors
    ///
    /// Returns [`DeserializeError`](crate::serial::DeserializeError) on I/O
    /// or decoding failure.
    pub fn from_binary_file(
        path: impl AsRef<std::path::Path>,
    ) -> Result<Self, crate::serial::DeserializeError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

/// A schema location rules can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BindingTarget<'a> {
    Type(&'a str),
    Field(&'a str, &'a str),
}

impl std::fmt::Display for BindingTarget<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindingTarget::Type(ty) => write!(f, "{ty}"),
            BindingTarget::Field(parent, field) => write!(f, "{parent}.{field}"),
        }
    }
}

/// Out-of-band rule declarations for schemas that cannot carry annotations.
///
/// Entries keep their declaration order; declaring the same location twice
/// appends to its list.
///
/// # Example
///
/// ```
/// use fieldgate::DeclarationTable;
///
/// let table = DeclarationTable::new()
///     .bind_type("Comment", ["IsVisible"])
///     .bind_field("User", "email", ["IsOwner"]);
/// assert_eq!(table.type_rules("Comment"), ["IsVisible"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclarationTable {
    types: Vec<(String, Vec<String>)>,
    fields: Vec<((String, String), Vec<String>)>,
}

impl DeclarationTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn bind_type<I, S>(mut self, type_name: &str, rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rules = rules.into_iter().map(Into::into);
        match self.types.iter_mut().find(|(ty, _)| ty == type_name) {
            Some((_, existing)) => existing.extend(rules),
            None => self.types.push((type_name.to_owned(), rules.collect())),
        }
        self
    }

    #[must_use]
    pub fn bind_field<I, S>(mut self, parent: &str, field: &str, rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rules = rules.into_iter().map(Into::into);
        match self
            .fields
            .iter_mut()
            .find(|((p, f), _)| p == parent && f == field)
        {
            Some((_, existing)) => existing.extend(rules),
            None => self
                .fields
                .push(((parent.to_owned(), field.to_owned()), rules.collect())),
        }
        self
    }

    #[must_use]
    pub fn type_rules(&self, type_name: &str) -> &[String] {
        self.types
            .iter()
            .find(|(ty, _)| ty == type_name)
            .map(|(_, rules)| rules.as_slice())
            .unwrap_or(&[])
    }

    #[must_use]
    pub fn field_rules(&self, parent: &str, field: &str) -> &[String] {
        self.fields
            .iter()
            .find(|((p, f), _)| p == parent && f == field)
            .map(|(_, rules)| rules.as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn types(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.types
            .iter()
            .map(|(ty, rules)| (ty.as_str(), rules.as_slice()))
    }

    pub(crate) fn fields(&self) -> impl Iterator<Item = (&str, &str, &[String])> {
        self.fields
            .iter()
            .map(|((p, f), rules)| (p.as_str(), f.as_str(), rules.as_slice()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.fields.is_empty()
    }

    /// Parse a JSON declaration table:
    ///
    /// ```json
    /// { "User": { "__authz": { "rules": ["IsAuthenticated"] },
    ///             "email": { "__authz": { "rules": ["IsOwner"] } } } }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`BindError::MalformedDeclarations`] when the text is not JSON
    /// or does not have this shape.
    pub fn from_json(text: &str) -> Result<Self, BindError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| BindError::MalformedDeclarations(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Like [`from_json`](Self::from_json) for an already parsed value.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::MalformedDeclarations`] on an unexpected shape.
    pub fn from_value(value: &Value) -> Result<Self, BindError> {
        let types = value
            .as_object()
            .ok_or_else(|| malformed("top level must be an object keyed by type name"))?;

        let mut table = Self::new();
        for (type_name, entry) in types {
            let entry = entry
                .as_object()
                .ok_or_else(|| malformed(format!("entry for '{type_name}' must be an object")))?;
            for (key, nested) in entry {
                if key == DECLARATION_KEY {
                    let rules = rule_list(nested, type_name)?;
                    table = table.bind_type(type_name, rules);
                } else {
                    let location = format!("{type_name}.{key}");
                    let declaration = nested
                        .get(DECLARATION_KEY)
                        .ok_or_else(|| malformed(format!("'{location}' has no {DECLARATION_KEY}")))?;
                    let rules = rule_list(declaration, &location)?;
                    table = table.bind_field(type_name, key, rules);
                }
            }
        }
        Ok(table)
    }
}

fn rule_list(declaration: &Value, location: &str) -> Result<Vec<String>, BindError> {
    declaration
        .get("rules")
        .and_then(Value::as_array)
        .and_then(|rules| {
            rules
                .iter()
                .map(|rule| rule.as_str().map(str::to_owned))
                .collect::<Option<Vec<_>>>()
        })
        .ok_or_else(|| malformed(format!("'{location}' must declare a list of rule names in `rules`")))
}

fn malformed(message: impl Into<String>) -> BindError {
    BindError::MalformedDeclarations(message.into())
}
