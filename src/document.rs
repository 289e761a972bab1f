//! Top-level JSON:API documents: compound data documents and error
//! documents.

use serde::Serialize;
use serde_json::Value;

use crate::error::{
    aggregate_status, status_line, AggregateValidationError, ApiError, JsonApiError, StoreError,
};
use crate::pagination::{PageLinks, PageMeta};
use crate::serializer::Resource;
use crate::types::JSONAPI_VERSION;

/// The `data` member.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PrimaryData {
    Single(Option<Resource>),
    Collection(Vec<Resource>),
}

impl PrimaryData {
    pub fn resources(&self) -> &[Resource] {
        match self {
            PrimaryData::Single(Some(resource)) => std::slice::from_ref(resource),
            PrimaryData::Single(None) => &[],
            PrimaryData::Collection(resources) => resources,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JsonApiObject {
    pub version: &'static str,
}

impl Default for JsonApiObject {
    fn default() -> Self {
        Self {
            version: JSONAPI_VERSION,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentLinks {
    #[serde(rename = "self", skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
    #[serde(flatten)]
    pub page: PageLinks,
}

impl DocumentLinks {
    pub fn is_empty(&self) -> bool {
        self.self_link.is_none() && self.page.is_empty()
    }
}

/// A compound document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub data: PrimaryData,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<Resource>,
    pub jsonapi: JsonApiObject,
    #[serde(skip_serializing_if = "DocumentLinks::is_empty")]
    pub links: DocumentLinks,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
}

impl Document {
    pub fn builder(data: PrimaryData) -> DocumentBuilder {
        DocumentBuilder::new(data)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Wraps primary data, included resources and paging into a [`Document`].
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    document: Document,
}

impl DocumentBuilder {
    pub fn new(data: PrimaryData) -> Self {
        Self {
            document: Document {
                data,
                included: Vec::new(),
                jsonapi: JsonApiObject::default(),
                links: DocumentLinks::default(),
                meta: None,
            },
        }
    }

    pub fn included(mut self, included: Vec<Resource>) -> Self {
        self.document.included = included;
        self
    }

    pub fn self_link(mut self, url: impl Into<String>) -> Self {
        self.document.links.self_link = Some(url.into());
        self
    }

    pub fn page_links(mut self, links: PageLinks) -> Self {
        self.document.links.page = links;
        self
    }

    pub fn meta(mut self, meta: Option<PageMeta>) -> Self {
        self.document.meta = meta;
        self
    }

    pub fn build(self) -> Document {
        self.document
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorLinks {
    pub about: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorSource {
    pub parameter: String,
}

/// One entry of the `errors` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorObject {
    /// Random identifier of this occurrence, for correlating logs.
    pub id: String,
    pub links: ErrorLinks,
    /// HTTP status line, e.g. `"400 Bad Request"`.
    pub status: String,
    pub code: String,
    pub title: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
}

impl ErrorObject {
    pub fn from_error<E: JsonApiError + ?Sized>(err: &E) -> Self {
        Self::new(
            err.status(),
            err.code(),
            err.title(),
            err.about(),
            err.to_string(),
            err.parameter(),
        )
    }

    fn new(
        status: u16,
        code: &str,
        title: &str,
        about: &str,
        detail: String,
        parameter: Option<&str>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            links: ErrorLinks {
                about: about.to_string(),
            },
            status: status_line(status).to_string(),
            code: code.to_string(),
            title: title.to_string(),
            detail,
            source: parameter.map(|p| ErrorSource {
                parameter: p.to_string(),
            }),
        }
    }

    /// Status code parsed back out of the status line.
    pub fn status_code(&self) -> u16 {
        self.status
            .split_whitespace()
            .next()
            .and_then(|code| code.parse().ok())
            .unwrap_or(500)
    }
}

/// A document carrying only `errors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDocument {
    pub errors: Vec<ErrorObject>,
    pub jsonapi: JsonApiObject,
}

impl ErrorDocument {
    pub fn new(errors: Vec<ErrorObject>) -> Self {
        Self {
            errors,
            jsonapi: JsonApiObject::default(),
        }
    }

    /// HTTP status of the whole response.
    pub fn status(&self) -> u16 {
        aggregate_status(self.errors.iter().map(ErrorObject::status_code))
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl From<&AggregateValidationError> for ErrorDocument {
    fn from(err: &AggregateValidationError) -> Self {
        Self::new(err.errors.iter().map(ErrorObject::from_error).collect())
    }
}

impl From<&StoreError> for ErrorDocument {
    fn from(err: &StoreError) -> Self {
        Self::new(vec![ErrorObject::from_error(err)])
    }
}

impl From<&ApiError> for ErrorDocument {
    fn from(err: &ApiError) -> Self {
        match err {
            ApiError::Invalid(e) => e.into(),
            ApiError::Store(e) => e.into(),
            ApiError::ResourceNotFound { .. } => Self::new(vec![ErrorObject::new(
                404,
                "ResourceNotFound",
                "Resource not found",
                "https://tools.ietf.org/html/rfc7231#section-6.5.4",
                err.to_string(),
                None,
            )]),
        }
    }
}
