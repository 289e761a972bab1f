//! Request-scoped state threaded through resolve, plan, assemble and build.

use std::sync::Arc;

use url::Url;

use crate::assembler::{assemble_included, serialize_primary};
use crate::config::Settings;
use crate::document::{Document, PrimaryData};
use crate::error::{AggregateValidationError, ApiError, ParamError};
use crate::include::{resolve_includes, ValidatedIncludeSet};
use crate::pagination::LimitOffset;
use crate::params::{Fieldsets, QueryParams};
use crate::planner::{plan_prefetches, EagerLoadDirective};
use crate::query::{parse_filters, parse_sort, FieldFilter, Query, ScopedQuery, SortKey};
use crate::schema::InclusionSchema;
use crate::serializer::JsonApiSerializer;
use crate::store::Store;

/// Everything a request asked for, validated against the root schema.
#[derive(Debug, Clone)]
pub struct RequestContext {
    root: Arc<dyn InclusionSchema>,
    includes: ValidatedIncludeSet,
    fieldsets: Fieldsets,
    sort: Vec<SortKey>,
    filters: Vec<FieldFilter>,
    page: LimitOffset,
    url: Option<Url>,
    base_url: Option<String>,
}

fn collect<T>(result: Result<T, Vec<ParamError>>, errors: &mut Vec<ParamError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(mut errs) => {
            errors.append(&mut errs);
            None
        }
    }
}

impl RequestContext {
    /// Parse and validate a raw query string.
    pub fn from_query(
        root: Arc<dyn InclusionSchema>,
        query: &str,
        settings: &Settings,
    ) -> Result<Self, AggregateValidationError> {
        Self::from_params(root, &QueryParams::parse(query), settings)
    }

    /// Parse and validate the query of a request URL, which also becomes
    /// the base of the document's links.
    pub fn from_url(
        root: Arc<dyn InclusionSchema>,
        url: Url,
        settings: &Settings,
    ) -> Result<Self, AggregateValidationError> {
        let params = QueryParams::parse(url.query().unwrap_or_default());
        let mut context = Self::from_params(root, &params, settings)?;
        context.url = Some(url);
        Ok(context)
    }

    /// Validate every parameter family; failures of all families are
    /// reported together.
    pub fn from_params(
        root: Arc<dyn InclusionSchema>,
        params: &QueryParams,
        settings: &Settings,
    ) -> Result<Self, AggregateValidationError> {
        let mut errors = Vec::new();

        let includes = match resolve_includes(
            &params.get_all("include"),
            root.as_ref(),
            &settings.include_options(),
        ) {
            Ok(set) => Some(set),
            Err(err) => {
                errors.extend(err.errors);
                None
            }
        };
        let fieldsets = collect(Fieldsets::from_params(params), &mut errors);
        let sort = collect(
            parse_sort(params, root.as_ref(), settings.max_sorts),
            &mut errors,
        );
        let filters = collect(parse_filters(params, root.as_ref()), &mut errors);
        let page = collect(
            LimitOffset::from_params(
                params,
                settings.default_page_limit,
                settings.max_page_limit,
            ),
            &mut errors,
        );

        match (includes, fieldsets, sort, filters, page) {
            (Some(includes), Some(fieldsets), Some(sort), Some(filters), Some(page))
                if errors.is_empty() =>
            {
                Ok(Self {
                    root,
                    includes,
                    fieldsets,
                    sort,
                    filters,
                    page,
                    url: None,
                    base_url: settings.base_url.clone(),
                })
            }
            _ => {
                tracing::debug!(errors = errors.len(), "rejected request parameters");
                Err(AggregateValidationError::new(errors))
            }
        }
    }

    pub fn root(&self) -> &Arc<dyn InclusionSchema> {
        &self.root
    }

    pub fn includes(&self) -> &ValidatedIncludeSet {
        &self.includes
    }

    pub fn fieldsets(&self) -> &Fieldsets {
        &self.fieldsets
    }

    pub fn sort(&self) -> &[SortKey] {
        &self.sort
    }

    pub fn filters(&self) -> &[FieldFilter] {
        &self.filters
    }

    pub fn page(&self) -> LimitOffset {
        self.page
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// The windowed collection query.
    pub fn query(&self) -> Query {
        let scope = ScopedQuery {
            filters: self.filters.clone(),
            ordering: self.sort.clone(),
        };
        self.page
            .apply(Query::new(self.root.resource_type()).scope(scope))
    }

    pub fn directives(&self) -> Vec<EagerLoadDirective> {
        plan_prefetches(&self.includes)
    }

    pub fn serializer(&self) -> JsonApiSerializer {
        let serializer = JsonApiSerializer::new().fieldsets(self.fieldsets.clone());
        match &self.base_url {
            Some(base) => serializer.base_url(base.clone()),
            None => serializer,
        }
    }

    /// Fetch and render the collection document.
    pub fn render_collection<S: Store>(&self, store: &S) -> Result<Document, ApiError> {
        let query = self.query();
        let instances = store.execute_with_eager_loads(&query, &self.directives())?;

        let serializer = self.serializer();
        let (data, primary_table) =
            serialize_primary(&self.includes, self.root.as_ref(), &instances, &serializer)?;
        let included = assemble_included(&self.includes, &instances, &primary_table, &serializer)?;

        let mut builder = Document::builder(PrimaryData::Collection(data)).included(included);
        if let Some(url) = &self.url {
            builder = builder.self_link(url.as_str());
        }
        if self.page.is_paginated() {
            let total = store.count(&query)?;
            builder = builder.meta(self.page.meta(total));
            if let Some(url) = &self.url {
                builder = builder.page_links(self.page.links(url, total));
            }
        }
        Ok(builder.build())
    }

    /// Fetch and render a single resource document.
    pub fn render_resource<S: Store>(&self, store: &S, id: &str) -> Result<Document, ApiError> {
        let query = Query::new(self.root.resource_type()).ids([id]);
        let instances = store.execute_with_eager_loads(&query, &self.directives())?;
        if instances.is_empty() {
            return Err(ApiError::ResourceNotFound {
                rtype: self.root.resource_type().to_string(),
                id: id.to_string(),
            });
        }

        let serializer = self.serializer();
        let (data, primary_table) =
            serialize_primary(&self.includes, self.root.as_ref(), &instances, &serializer)?;
        let included = assemble_included(&self.includes, &instances, &primary_table, &serializer)?;

        let mut builder =
            Document::builder(PrimaryData::Single(data.into_iter().next())).included(included);
        if let Some(url) = &self.url {
            builder = builder.self_link(url.as_str());
        }
        Ok(builder.build())
    }

    /// Render a single resource when `id` is given, the collection otherwise.
    pub fn render<S: Store>(&self, store: &S, id: Option<&str>) -> Result<Document, ApiError> {
        match id {
            Some(id) => self.render_resource(store, id),
            None => self.render_collection(store),
        }
    }
}
