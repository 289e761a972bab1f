//! Error types for include resolution, query parameters, storage and loading.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::ResourceKey;

/// Errors that render as JSON:API error objects.
pub trait JsonApiError: std::fmt::Display {
    /// HTTP status code.
    fn status(&self) -> u16;
    /// Machine readable error code.
    fn code(&self) -> &'static str;
    /// Short human readable summary.
    fn title(&self) -> &'static str;
    /// Link to documentation about this kind of error.
    fn about(&self) -> &'static str;
    /// Query parameter family that caused the error, if any.
    fn parameter(&self) -> Option<&'static str> {
        None
    }
}

/// A single invalid `include` path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IncludeError {
    #[error(
        "the request has {count} include query parameters which exceeds the max of {max} that can be requested"
    )]
    TooManyPaths { count: usize, max: usize },

    #[error(
        "the \"{path}\" include query parameter has {depth} relationships which exceeds the max depth of {max}"
    )]
    PathTooDeep {
        path: String,
        depth: usize,
        max: usize,
    },

    #[error(
        "the \"{path}\" include query parameter is not supported: \"{segment}\" is not an includable relationship of \"{resource_type}\""
    )]
    UnknownRelationship {
        path: String,
        segment: String,
        resource_type: String,
    },
}

/// A single invalid query parameter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    #[error(transparent)]
    Include(#[from] IncludeError),

    #[error("{message}")]
    InvalidField { message: String },

    #[error("{message}")]
    InvalidFilter { message: String },

    #[error("{message}")]
    InvalidPage { message: String },

    #[error("{message}")]
    InvalidSort { message: String },
}

impl ParamError {
    pub fn field(message: impl Into<String>) -> Self {
        Self::InvalidField {
            message: message.into(),
        }
    }

    pub fn filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            message: message.into(),
        }
    }

    pub fn page(message: impl Into<String>) -> Self {
        Self::InvalidPage {
            message: message.into(),
        }
    }

    pub fn sort(message: impl Into<String>) -> Self {
        Self::InvalidSort {
            message: message.into(),
        }
    }
}

impl JsonApiError for ParamError {
    fn status(&self) -> u16 {
        400
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Include(_) => "InvalidIncludeParam",
            Self::InvalidField { .. } => "InvalidFieldParam",
            Self::InvalidFilter { .. } => "InvalidFilterParam",
            Self::InvalidPage { .. } => "InvalidPageParam",
            Self::InvalidSort { .. } => "InvalidSortParam",
        }
    }

    fn title(&self) -> &'static str {
        "Invalid or corrupt query parameter"
    }

    fn about(&self) -> &'static str {
        match self {
            Self::Include(_) => "http://jsonapi.org/format/#fetching-includes",
            Self::InvalidField { .. } => "http://jsonapi.org/format/#fetching-sparse-fieldsets",
            Self::InvalidFilter { .. } => "http://jsonapi.org/format/#fetching-filtering",
            Self::InvalidPage { .. } => "http://jsonapi.org/format/#fetching-pagination",
            Self::InvalidSort { .. } => "http://jsonapi.org/format/#fetching-sorting",
        }
    }

    fn parameter(&self) -> Option<&'static str> {
        Some(match self {
            Self::Include(_) => "include",
            Self::InvalidField { .. } => "fields",
            Self::InvalidFilter { .. } => "filter",
            Self::InvalidPage { .. } => "page",
            Self::InvalidSort { .. } => "sort",
        })
    }
}

/// Every query parameter failure of one request.
///
/// A request with any invalid parameter fails as a whole; this carries all
/// of the individual failures so the client sees them in one round trip.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("the request has {} invalid query parameter(s)", errors.len())]
pub struct AggregateValidationError {
    pub errors: Vec<ParamError>,
}

impl AggregateValidationError {
    pub fn new(errors: Vec<ParamError>) -> Self {
        Self { errors }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// HTTP status for the whole response.
    pub fn status(&self) -> u16 {
        aggregate_status(self.errors.iter().map(JsonApiError::status))
    }
}

impl From<ParamError> for AggregateValidationError {
    fn from(err: ParamError) -> Self {
        Self::new(vec![err])
    }
}

impl From<IncludeError> for AggregateValidationError {
    fn from(err: IncludeError) -> Self {
        Self::new(vec![ParamError::Include(err)])
    }
}

/// Failures reported by the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("resource {key} is referenced but does not exist")]
    MissingResource { key: ResourceKey },

    #[error("storage backend failure: {message}")]
    Backend { message: String },
}

impl JsonApiError for StoreError {
    fn status(&self) -> u16 {
        500
    }

    fn code(&self) -> &'static str {
        "StoreError"
    }

    fn title(&self) -> &'static str {
        "Internal storage failure"
    }

    fn about(&self) -> &'static str {
        "https://tools.ietf.org/html/rfc7231#section-6.6.1"
    }
}

/// Errors surfaced while answering one request.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Invalid(#[from] AggregateValidationError),

    #[error("the resource \"{id}\" of type \"{rtype}\" does not exist")]
    ResourceNotFound { rtype: String, id: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    /// HTTP status for the response.
    pub fn status(&self) -> u16 {
        match self {
            Self::Invalid(e) => e.status(),
            Self::ResourceNotFound { .. } => 404,
            Self::Store(e) => e.status(),
        }
    }
}

/// Errors while loading declarations, datasets or settings.
#[derive(Debug, Error)]
pub enum LoadError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid TOML: {source}")]
    InvalidToml {
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid settings: {message}")]
    InvalidSettings { message: String },

    // Declaration errors (exit code 2)
    #[error("declaration failed validation with {} error(s)", errors.len())]
    InvalidDocument { errors: Vec<SchemaError> },

    #[error("invalid declaration: {message}")]
    InvalidDeclaration { message: String },

    #[error("invalid registry: {}", problems.join("; "))]
    InvalidRegistry { problems: Vec<String> },

    #[error("invalid dataset: {message}")]
    InvalidDataset { message: String },

    #[error("unknown resource type \"{rtype}\"")]
    UnknownResourceType { rtype: String },

    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },
}

impl LoadError {
    /// Returns the exit code for this error type: 3 for IO and network
    /// failures, 2 for everything else. Code 1 is left to rejected requests
    /// and failed lints, which are not load errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. } | LoadError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            LoadError::NetworkError { .. } => 3,
            _ => 2,
        }
    }
}

/// Single document validation error with path context.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SchemaError {
    /// JSON Pointer (RFC 6901) to the invalid member.
    pub path: String,
    /// Human-readable error message.
    pub message: String,
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Pick one HTTP status for a response carrying several errors.
///
/// Identical statuses are kept. Mixed statuses fall back to the generic
/// 400 or 500 of the first error's class.
pub fn aggregate_status<I>(codes: I) -> u16
where
    I: IntoIterator<Item = u16>,
{
    let codes: Vec<u16> = codes.into_iter().collect();
    let Some(&first) = codes.first() else {
        return 400;
    };

    if codes.iter().all(|&code| code == first) {
        first
    } else if first >= 500 {
        500
    } else {
        400
    }
}

/// Status line for an HTTP status code, e.g. `"400 Bad Request"`.
pub fn status_line(code: u16) -> &'static str {
    match code {
        400 => "400 Bad Request",
        401 => "401 Unauthorized",
        402 => "402 Payment Required",
        403 => "403 Forbidden",
        404 => "404 Not Found",
        405 => "405 Method Not Allowed",
        406 => "406 Not Acceptable",
        407 => "407 Proxy Authentication Required",
        408 => "408 Request Time-out",
        409 => "409 Conflict",
        410 => "410 Gone",
        411 => "411 Length Required",
        412 => "412 Precondition Failed",
        413 => "413 Payload Too Large",
        414 => "414 URI Too Long",
        415 => "415 Unsupported Media Type",
        416 => "416 Range Not Satisfiable",
        417 => "417 Expectation Failed",
        418 => "418 I'm a teapot",
        422 => "422 Unprocessable Entity",
        426 => "426 Upgrade Required",
        428 => "428 Precondition Required",
        429 => "429 Too Many Requests",
        431 => "431 Request Header Fields Too Large",
        451 => "451 Unavailable For Legal Reasons",
        501 => "501 Not Implemented",
        502 => "502 Bad Gateway",
        503 => "503 Service Unavailable",
        504 => "504 Gateway Time-out",
        505 => "505 HTTP Version not supported",
        511 => "511 Network Authentication Required",
        _ => "500 Internal Server Error",
    }
}
