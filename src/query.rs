//! Query model handed to the store: filters, ordering and windowing, plus
//! parsing of the `filter[...]` and `sort` parameters.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ParamError;
use crate::params::QueryParams;
use crate::schema::InclusionSchema;
use crate::types::PATH_SEPARATOR;

/// Separator between a field and its lookup in `filter[field__lookup]`.
pub const LOOKUP_SEPARATOR: &str = "__";

/// Comparison operator of a field filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lookup {
    Exact,
    IExact,
    Contains,
    IContains,
    StartsWith,
    EndsWith,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
}

impl Lookup {
    pub const ALL: &'static [Lookup] = &[
        Lookup::Exact,
        Lookup::IExact,
        Lookup::Contains,
        Lookup::IContains,
        Lookup::StartsWith,
        Lookup::EndsWith,
        Lookup::Gt,
        Lookup::Gte,
        Lookup::Lt,
        Lookup::Lte,
        Lookup::In,
    ];

    /// Parse a lookup name. Returns `None` for unknown names.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|l| l.as_str() == s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Lookup::Exact => "exact",
            Lookup::IExact => "iexact",
            Lookup::Contains => "contains",
            Lookup::IContains => "icontains",
            Lookup::StartsWith => "startswith",
            Lookup::EndsWith => "endswith",
            Lookup::Gt => "gt",
            Lookup::Gte => "gte",
            Lookup::Lt => "lt",
            Lookup::Lte => "lte",
            Lookup::In => "in",
        }
    }

    /// Evaluate the lookup against a stored attribute value.
    ///
    /// Query string operands arrive as strings and are coerced to the
    /// attribute's JSON type. A missing attribute never matches.
    pub fn matches(&self, field: Option<&Value>, operand: &Value) -> bool {
        let Some(field) = field else {
            return false;
        };

        match self {
            Lookup::Exact => compare(field, operand) == Some(Ordering::Equal),
            Lookup::IExact => text_pair(field, operand)
                .map(|(f, o)| f.to_lowercase() == o.to_lowercase())
                .unwrap_or(false),
            Lookup::Contains => text_pair(field, operand)
                .map(|(f, o)| f.contains(&o))
                .unwrap_or(false),
            Lookup::IContains => text_pair(field, operand)
                .map(|(f, o)| f.to_lowercase().contains(&o.to_lowercase()))
                .unwrap_or(false),
            Lookup::StartsWith => text_pair(field, operand)
                .map(|(f, o)| f.starts_with(&o))
                .unwrap_or(false),
            Lookup::EndsWith => text_pair(field, operand)
                .map(|(f, o)| f.ends_with(&o))
                .unwrap_or(false),
            Lookup::Gt => compare(field, operand) == Some(Ordering::Greater),
            Lookup::Gte => matches!(
                compare(field, operand),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Lookup::Lt => compare(field, operand) == Some(Ordering::Less),
            Lookup::Lte => matches!(
                compare(field, operand),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Lookup::In => in_operands(operand)
                .iter()
                .any(|o| compare(field, o) == Some(Ordering::Equal)),
        }
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn text_pair(field: &Value, operand: &Value) -> Option<(String, String)> {
    Some((text(field)?, text(operand)?))
}

fn in_operands(operand: &Value) -> Vec<Value> {
    match operand {
        Value::Array(items) => items.clone(),
        Value::String(s) => s.split(',').map(|p| Value::String(p.to_string())).collect(),
        other => vec![other.clone()],
    }
}

/// Order two JSON scalars, coercing a string operand to the field's type.
fn compare(field: &Value, operand: &Value) -> Option<Ordering> {
    match (field, operand) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::Number(a), Value::String(b)) => a.as_f64()?.partial_cmp(&b.parse::<f64>().ok()?),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::String(b)) => Some(a.cmp(&b.parse::<bool>().ok()?)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, Value::String(b)) if b == "null" => Some(Ordering::Equal),
        _ => None,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Order two attribute values for sorting.
///
/// Missing and null sort first, then booleans, numbers, strings, arrays and
/// objects. Values of one type compare by value; arrays and objects tie.
pub fn sort_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(a), Some(b)) => type_rank(a)
            .cmp(&type_rank(b))
            .then_with(|| compare(a, b).unwrap_or(Ordering::Equal)),
    }
}

/// A single `field lookup value` condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    #[serde(default = "default_lookup")]
    pub lookup: Lookup,
    pub value: Value,
}

fn default_lookup() -> Lookup {
    Lookup::Exact
}

impl FieldFilter {
    pub fn new(field: impl Into<String>, lookup: Lookup, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            lookup,
            value: value.into(),
        }
    }
}

/// One ordering key; `-field` sorts descending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    pub fn parse(s: &str) -> Self {
        match s.strip_prefix('-') {
            Some(field) => Self {
                field: field.to_string(),
                descending: true,
            },
            None => Self {
                field: s.to_string(),
                descending: false,
            },
        }
    }
}

impl Serialize for SortKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.descending {
            serializer.serialize_str(&format!("-{}", self.field))
        } else {
            serializer.serialize_str(&self.field)
        }
    }
}

impl<'de> Deserialize<'de> for SortKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(SortKey::parse(&s))
    }
}

/// Filters and ordering narrowing a collection, e.g. "only active
/// memberships, newest first".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopedQuery {
    #[serde(default, rename = "filter", skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FieldFilter>,
    #[serde(default, rename = "order", skip_serializing_if = "Vec::is_empty")]
    pub ordering: Vec<SortKey>,
}

impl ScopedQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: FieldFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, key: &str) -> Self {
        self.ordering.push(SortKey::parse(key));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty() && self.ordering.is_empty()
    }
}

/// The primary query of a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    pub resource_type: String,
    /// Restrict to these identifiers, in any order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    #[serde(flatten)]
    pub scope: ScopedQuery,
    pub offset: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            ids: None,
            scope: ScopedQuery::default(),
            offset: 0,
            limit: None,
        }
    }

    pub fn ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn scope(mut self, scope: ScopedQuery) -> Self {
        self.scope = scope;
        self
    }

    pub fn window(mut self, offset: usize, limit: Option<usize>) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    /// The same query without its window, for counting.
    pub fn unwindowed(&self) -> Self {
        Self {
            offset: 0,
            limit: None,
            ..self.clone()
        }
    }
}

/// Parse the `sort` parameter against the sortable fields of `schema`.
pub fn parse_sort(
    params: &QueryParams,
    schema: &dyn InclusionSchema,
    max_sorts: usize,
) -> Result<Vec<SortKey>, Vec<ParamError>> {
    let fields: Vec<&str> = params
        .get_all("sort")
        .into_iter()
        .flat_map(|v| v.split(','))
        .filter(|f| !f.is_empty())
        .collect();

    if fields.is_empty() {
        return Ok(Vec::new());
    }

    if fields.len() > max_sorts {
        return Err(vec![ParamError::sort(format!(
            "sorting on \"{}\" fields exceeds the maximum number of \"{}\" sortable fields",
            fields.len(),
            max_sorts
        ))]);
    }

    let mut keys = Vec::new();
    let mut errors = Vec::new();
    for raw in fields {
        let key = SortKey::parse(raw);
        if key.field.contains(PATH_SEPARATOR) {
            errors.push(ParamError::sort(format!(
                "the \"{}\" sort query parameter is not allowed due to unpredictable results when sorting on relationships",
                raw
            )));
        } else if !schema.is_sortable(&key.field) {
            errors.push(ParamError::sort(format!(
                "the \"{}\" sort query parameter either does not exist or you are not allowed to sort on it",
                raw
            )));
        } else {
            keys.push(key);
        }
    }

    if errors.is_empty() {
        Ok(keys)
    } else {
        Err(errors)
    }
}

/// Parse every `filter[field]` / `filter[field__lookup]` parameter against
/// the filterable fields of `schema`.
pub fn parse_filters(
    params: &QueryParams,
    schema: &dyn InclusionSchema,
) -> Result<Vec<FieldFilter>, Vec<ParamError>> {
    let mut filters = Vec::new();
    let mut errors = Vec::new();

    for (member, value) in params.family("filter") {
        if member.is_empty() {
            errors.push(ParamError::filter(
                "the \"filter\" query parameter must name a field, e.g. filter[title]=Heat",
            ));
            continue;
        }

        let (field, lookup_name) = match member.rsplit_once(LOOKUP_SEPARATOR) {
            Some((field, lookup)) => (field, lookup),
            None => (member, Lookup::Exact.as_str()),
        };

        let Some(lookup) = Lookup::parse(lookup_name) else {
            errors.push(ParamError::filter(format!(
                "unsupported lookup operator of \"{}\" in \"filter[{}]\"",
                lookup_name, member
            )));
            continue;
        };

        let allowed = schema.filter_lookups(field);
        if allowed.is_empty() {
            errors.push(ParamError::filter(format!(
                "the \"{}\" field either does not exist or you are not allowed to filter on it",
                field
            )));
        } else if !allowed.contains(&lookup) {
            errors.push(ParamError::filter(format!(
                "the \"{}\" lookup is not supported on the \"{}\" field",
                lookup.as_str(),
                field
            )));
        } else {
            filters.push(FieldFilter::new(field, lookup, value));
        }
    }

    if errors.is_empty() {
        Ok(filters)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_parse_round_trip() {
        for lookup in Lookup::ALL {
            assert_eq!(Lookup::parse(lookup.as_str()), Some(*lookup));
        }
        assert_eq!(Lookup::parse("regex"), None);
    }

    #[test]
    fn exact_coerces_string_operands() {
        assert!(Lookup::Exact.matches(Some(&json!(1999)), &json!("1999")));
        assert!(Lookup::Exact.matches(Some(&json!(true)), &json!("true")));
        assert!(Lookup::Exact.matches(Some(&json!("Heat")), &json!("Heat")));
        assert!(!Lookup::Exact.matches(Some(&json!("Heat")), &json!("heat")));
        assert!(!Lookup::Exact.matches(None, &json!("x")));
    }

    #[test]
    fn text_lookups() {
        let title = json!("The Insider");
        assert!(Lookup::IExact.matches(Some(&title), &json!("the insider")));
        assert!(Lookup::Contains.matches(Some(&title), &json!("Ins")));
        assert!(Lookup::IContains.matches(Some(&title), &json!("ins")));
        assert!(Lookup::StartsWith.matches(Some(&title), &json!("The")));
        assert!(Lookup::EndsWith.matches(Some(&title), &json!("sider")));
    }

    #[test]
    fn range_and_in_lookups() {
        let year = json!(1995);
        assert!(Lookup::Gt.matches(Some(&year), &json!("1990")));
        assert!(Lookup::Gte.matches(Some(&year), &json!(1995)));
        assert!(!Lookup::Lt.matches(Some(&year), &json!(1995)));
        assert!(Lookup::Lte.matches(Some(&year), &json!(1995)));
        assert!(Lookup::In.matches(Some(&year), &json!("1990,1995")));
        assert!(!Lookup::In.matches(Some(&year), &json!([1990, 2000])));
    }

    #[test]
    fn sort_key_parse() {
        let key = SortKey::parse("-year");
        assert_eq!(key.field, "year");
        assert!(key.descending);
        assert_eq!(serde_json::to_value(&key).unwrap(), json!("-year"));
    }

    #[test]
    fn scoped_query_deserializes_declaration_form() {
        let scope: ScopedQuery = serde_json::from_value(json!({
            "filter": [{"field": "active", "value": true}],
            "order": ["-joined"]
        }))
        .unwrap();
        assert_eq!(scope.filters[0].lookup, Lookup::Exact);
        assert_eq!(scope.ordering[0], SortKey::parse("-joined"));
    }

    #[test]
    fn sort_order_puts_missing_first() {
        assert_eq!(sort_order(None, Some(&json!(1))), Ordering::Less);
        assert_eq!(sort_order(Some(&json!(2)), Some(&json!(1))), Ordering::Greater);
        assert_eq!(sort_order(Some(&json!("a")), Some(&json!("b"))), Ordering::Less);
    }

    #[test]
    fn sort_order_ranks_mixed_types() {
        // a string that parses as a number still sorts with the strings
        assert_eq!(sort_order(Some(&json!(10)), Some(&json!("2"))), Ordering::Less);
        assert_eq!(sort_order(Some(&json!("2")), Some(&json!(10))), Ordering::Greater);
        assert_eq!(sort_order(Some(&json!(true)), Some(&json!(0))), Ordering::Less);
        assert_eq!(sort_order(Some(&json!([1])), Some(&json!({"a": 1}))), Ordering::Less);
        assert_eq!(sort_order(Some(&json!([1])), Some(&json!([2]))), Ordering::Equal);

        let mut values = vec![
            json!("b"),
            json!(3),
            json!({"k": 1}),
            Value::Null,
            json!(false),
            json!("a"),
            json!(1.5),
            json!([0]),
            json!(true),
        ];
        values.sort_by(|a, b| sort_order(Some(a), Some(b)));
        assert_eq!(
            values,
            vec![
                Value::Null,
                json!(false),
                json!(true),
                json!(1.5),
                json!(3),
                json!("a"),
                json!("b"),
                json!([0]),
                json!({"k": 1}),
            ]
        );
    }

    #[test]
    fn query_unwindowed_drops_window() {
        let query = Query::new("movies").window(10, Some(5));
        let counted = query.unwindowed();
        assert_eq!(counted.offset, 0);
        assert_eq!(counted.limit, None);
        assert_eq!(counted.resource_type, "movies");
    }
}
