//! Query string parsing: the `include` path parser, bracketed parameter
//! families and sparse fieldsets.

use indexmap::{IndexMap, IndexSet};

use crate::error::ParamError;
use crate::types::{is_member_name, PATH_SEPARATOR};

/// Raw query parameters in the order they appeared.
///
/// Repeated keys are kept, so `include=a&include=b` yields two values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// Parse an `application/x-www-form-urlencoded` query string.
    ///
    /// A leading `?` is ignored.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let pairs = url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self { pairs }
    }

    /// Build from already decoded pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// All values of `key`, in order.
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// First value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Members of a bracketed family such as `fields[movies]=title`.
    ///
    /// Returns `(member, value)` pairs for every key of the form
    /// `family[member]`. Keys named after the family without a bracketed
    /// member are returned with an empty member so callers can reject them.
    pub fn family(&self, family: &str) -> Vec<(&str, &str)> {
        self.pairs
            .iter()
            .filter_map(|(k, v)| {
                let rest = k.strip_prefix(family)?;
                if rest.is_empty() {
                    return Some(("", v.as_str()));
                }
                let member = rest.strip_prefix('[')?.strip_suffix(']')?;
                Some((member, v.as_str()))
            })
            .collect()
    }
}

/// A dot separated chain of relationship names, e.g. `actor.movies`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationshipPath {
    raw: String,
    segments: Vec<String>,
}

impl RelationshipPath {
    /// Split a raw path. Segments are not checked here; an empty or
    /// malformed segment never resolves against a schema and fails there.
    pub fn parse(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            segments: raw.split(PATH_SEPARATOR).map(String::from).collect(),
        }
    }

    /// The path exactly as the client sent it.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of relationship hops.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }
}

/// Collect the unique `include` paths of a request.
///
/// Accepts every raw value of the `include` parameter. Each value may hold
/// several comma separated paths; repeated parameters are unioned. Empty
/// entries are dropped and first-seen order is kept.
pub fn parse_include<S: AsRef<str>>(raw_values: &[S]) -> IndexSet<String> {
    raw_values
        .iter()
        .flat_map(|value| value.as_ref().split(','))
        .filter(|path| !path.is_empty())
        .map(String::from)
        .collect()
}

/// Requested sparse fieldsets, keyed by resource type.
///
/// Types without an entry expose all of their fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fieldsets {
    by_type: IndexMap<String, IndexSet<String>>,
}

impl Fieldsets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict `rtype` to the given fields.
    pub fn insert<I, S>(&mut self, rtype: impl Into<String>, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.by_type
            .entry(rtype.into())
            .or_default()
            .extend(fields.into_iter().map(Into::into));
    }

    /// Whether `field` of `rtype` should be rendered.
    pub fn allows(&self, rtype: &str, field: &str) -> bool {
        match self.by_type.get(rtype) {
            Some(fields) => fields.contains(field),
            None => true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    /// Parse every `fields[type]=a,b` parameter.
    ///
    /// An empty value is legal and hides every field of that type.
    pub fn from_params(params: &QueryParams) -> Result<Self, Vec<ParamError>> {
        let mut fieldsets = Self::new();
        let mut errors = Vec::new();

        for (rtype, value) in params.family("fields") {
            if rtype.is_empty() {
                errors.push(ParamError::field(
                    "the \"fields\" query parameter must name a resource type, e.g. fields[movies]=title",
                ));
                continue;
            }
            if !is_member_name(rtype) {
                errors.push(ParamError::field(format!(
                    "the \"fields[{}]\" query parameter does not name a valid resource type",
                    rtype
                )));
                continue;
            }

            let mut fields = Vec::new();
            for field in value.split(',').filter(|f| !f.is_empty()) {
                if is_member_name(field) {
                    fields.push(field);
                } else {
                    errors.push(ParamError::field(format!(
                        "the \"fields[{}]\" query parameter has an invalid field name \"{}\"",
                        rtype, field
                    )));
                }
            }
            fieldsets.insert(rtype, fields);
        }

        if errors.is_empty() {
            Ok(fieldsets)
        } else {
            Err(errors)
        }
    }
}
