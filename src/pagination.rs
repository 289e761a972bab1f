//! Limit/offset pagination over `page[limit]` and `page[offset]`.

use serde::Serialize;
use url::Url;

use crate::error::ParamError;
use crate::params::QueryParams;
use crate::query::Query;

pub const LIMIT_PARAM: &str = "page[limit]";
pub const OFFSET_PARAM: &str = "page[offset]";

/// Pagination links of a collection document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageLinks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
}

impl PageLinks {
    pub fn is_empty(&self) -> bool {
        self.first.is_none() && self.last.is_none() && self.next.is_none() && self.prev.is_none()
    }
}

/// Pagination counters for the `meta` member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub limit: usize,
    pub offset: usize,
    pub total: usize,
}

/// The requested page window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimitOffset {
    /// `None` leaves the collection unpaginated.
    pub limit: Option<usize>,
    pub offset: usize,
}

impl LimitOffset {
    /// Read the `page[...]` parameters.
    ///
    /// `default_limit` applies when the request names no limit. A limit of
    /// zero, a limit above `max_limit`, a negative or non-numeric value and
    /// any other `page` member are rejected.
    pub fn from_params(
        params: &QueryParams,
        default_limit: Option<usize>,
        max_limit: Option<usize>,
    ) -> Result<Self, Vec<ParamError>> {
        let mut page = LimitOffset {
            limit: default_limit,
            offset: 0,
        };
        let mut errors = Vec::new();

        for (member, value) in params.family("page") {
            match member {
                "limit" => match value.parse::<usize>() {
                    Ok(limit) if limit > 0 && max_limit.map_or(true, |max| limit <= max) => {
                        page.limit = Some(limit);
                    }
                    _ => errors.push(ParamError::page(limit_message(max_limit))),
                },
                "offset" => match value.parse::<usize>() {
                    Ok(offset) => page.offset = offset,
                    Err(_) => errors.push(ParamError::page(format!(
                        "The \"{}\" query param must be a number greater than or equal to 0",
                        OFFSET_PARAM
                    ))),
                },
                "" => errors.push(ParamError::page(format!(
                    "the \"page\" query parameter must name a member, e.g. {}=10",
                    LIMIT_PARAM
                ))),
                other => errors.push(ParamError::page(format!(
                    "the \"page[{}]\" query parameter is not supported, only {} & {} are",
                    other, LIMIT_PARAM, OFFSET_PARAM
                ))),
            }
        }

        if let (Some(limit), Some(max)) = (page.limit, max_limit) {
            if limit > max {
                page.limit = Some(max);
            }
        }

        if errors.is_empty() {
            Ok(page)
        } else {
            Err(errors)
        }
    }

    pub fn is_paginated(&self) -> bool {
        self.limit.is_some()
    }

    /// Window `query` to this page.
    pub fn apply(&self, query: Query) -> Query {
        query.window(self.offset, self.limit)
    }

    /// Counters for the `meta` member; `None` when unpaginated.
    pub fn meta(&self, total: usize) -> Option<PageMeta> {
        self.limit.map(|limit| PageMeta {
            limit,
            offset: self.offset,
            total,
        })
    }

    /// Links to neighbouring pages of `request_url`.
    ///
    /// `prev` and `first` only exist past the first page; `next` and
    /// `last` only exist before the last one.
    pub fn links(&self, request_url: &Url, total: usize) -> PageLinks {
        let Some(limit) = self.limit else {
            return PageLinks::default();
        };

        // page[offset] may be any usize
        let next_offset = self.offset.checked_add(limit).filter(|&end| end < total);
        let next = next_offset.map(|offset| {
            let url = replace_query_param(request_url, LIMIT_PARAM, &limit.to_string());
            replace_query_param(&url, OFFSET_PARAM, &offset.to_string())
        });

        let prev = (self.offset > 0).then(|| {
            let url = replace_query_param(request_url, LIMIT_PARAM, &limit.to_string());
            if self.offset <= limit {
                remove_query_param(&url, OFFSET_PARAM)
            } else {
                replace_query_param(&url, OFFSET_PARAM, &(self.offset - limit).to_string())
            }
        });

        let first = prev
            .as_ref()
            .map(|_| remove_query_param(request_url, OFFSET_PARAM));
        let last = next.as_ref().map(|_| {
            replace_query_param(
                request_url,
                OFFSET_PARAM,
                &total.saturating_sub(limit).to_string(),
            )
        });

        PageLinks {
            first: first.map(String::from),
            last: last.map(String::from),
            next: next.map(String::from),
            prev: prev.map(String::from),
        }
    }
}

fn limit_message(max_limit: Option<usize>) -> String {
    match max_limit {
        Some(max) => format!(
            "The \"{}\" query param must be a positive number greater than 0 but less than the max of {}",
            LIMIT_PARAM, max
        ),
        None => format!(
            "The \"{}\" query param must be a positive number greater than 0",
            LIMIT_PARAM
        ),
    }
}

fn set_query_pairs(url: &Url, pairs: Vec<(String, String)>) -> Url {
    let mut url = url.clone();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
    url
}

/// Set `key` to `value`, keeping the position of an existing `key`.
fn replace_query_param(url: &Url, key: &str, value: &str) -> Url {
    let mut replaced = false;
    let mut pairs: Vec<(String, String)> = Vec::new();
    for (k, v) in url.query_pairs() {
        if k == key {
            if !replaced {
                pairs.push((k.into_owned(), value.to_string()));
                replaced = true;
            }
        } else {
            pairs.push((k.into_owned(), v.into_owned()));
        }
    }
    if !replaced {
        pairs.push((key.to_string(), value.to_string()));
    }
    set_query_pairs(url, pairs)
}

fn remove_query_param(url: &Url, key: &str) -> Url {
    let pairs = url
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    set_query_pairs(url, pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offset_of(link: &str) -> Option<String> {
        Url::parse(link)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == OFFSET_PARAM)
            .map(|(_, v)| v.into_owned())
    }

    fn page(query: &str) -> Result<LimitOffset, Vec<ParamError>> {
        LimitOffset::from_params(&QueryParams::parse(query), None, Some(50))
    }

    #[test]
    fn parses_limit_and_offset() {
        let page = page("page[limit]=10&page[offset]=20").unwrap();
        assert_eq!(page.limit, Some(10));
        assert_eq!(page.offset, 20);

        let query = page.apply(Query::new("actors"));
        assert_eq!((query.offset, query.limit), (20, Some(10)));
    }

    #[test]
    fn huge_offset_has_no_next_page() {
        let page = page(&format!("page[limit]=10&page[offset]={}", usize::MAX)).unwrap();
        assert_eq!(page.offset, usize::MAX);

        let url = Url::parse("http://api.test/actors").unwrap();
        let links = page.links(&url, 5);
        assert!(links.next.is_none());
        assert!(links.last.is_none());
        assert_eq!(
            offset_of(links.prev.as_deref().unwrap()),
            Some((usize::MAX - 10).to_string())
        );
        assert!(links.first.is_some());
    }

    #[test]
    fn offset_at_or_past_total() {
        let url = Url::parse("http://api.test/actors").unwrap();

        for query in ["page[limit]=10&page[offset]=25", "page[limit]=10&page[offset]=40"] {
            let links = page(query).unwrap().links(&url, 25);
            assert!(links.next.is_none(), "{query}");
            assert!(links.last.is_none(), "{query}");
            assert!(links.prev.is_some(), "{query}");
        }

        let page = page("page[limit]=10&page[offset]=40").unwrap();
        let query = page.apply(Query::new("actors"));
        assert_eq!((query.offset, query.limit), (40, Some(10)));
    }

    #[test]
    fn exactly_full_last_page() {
        let url = Url::parse("http://api.test/actors").unwrap();
        let links = page("page[limit]=10&page[offset]=10").unwrap().links(&url, 20);

        assert!(links.next.is_none());
        assert!(links.last.is_none());
        assert_eq!(offset_of(links.prev.as_deref().unwrap()), None);

        let links = page("page[limit]=10").unwrap().links(&url, 10);
        assert!(links.is_empty());
    }

    #[test]
    fn default_limit_applies() {
        let page = LimitOffset::from_params(&QueryParams::default(), Some(25), None).unwrap();
        assert_eq!(page.limit, Some(25));
        assert!(page.is_paginated());

        let page = LimitOffset::from_params(&QueryParams::default(), None, None).unwrap();
        assert!(!page.is_paginated());
        assert_eq!(page.meta(3), None);
    }

    #[test]
    fn rejects_bad_values() {
        for query in [
            "page[limit]=0",
            "page[limit]=-1",
            "page[limit]=ten",
            "page[limit]=51",
            "page[offset]=-5",
            "page[size]=10",
            "page=1",
        ] {
            let errors = page(query).unwrap_err();
            assert_eq!(errors.len(), 1, "{query}");
            assert!(matches!(errors[0], ParamError::InvalidPage { .. }));
        }

        let errors = page("page[limit]=0&page[offset]=x").unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn middle_page_links() {
        let page = page("page[limit]=10&page[offset]=10").unwrap();
        let url = Url::parse("http://api.test/actors?include=movies&page%5Blimit%5D=10&page%5Boffset%5D=10")
            .unwrap();
        let links = page.links(&url, 25);

        assert_eq!(offset_of(links.next.as_deref().unwrap()).as_deref(), Some("20"));
        assert_eq!(offset_of(links.prev.as_deref().unwrap()), None);
        assert_eq!(offset_of(links.first.as_deref().unwrap()), None);
        assert_eq!(offset_of(links.last.as_deref().unwrap()).as_deref(), Some("15"));
        assert!(links.next.as_deref().unwrap().contains("include=movies"));
    }

    #[test]
    fn first_and_last_page_links() {
        let url = Url::parse("http://api.test/actors").unwrap();

        let first = page("page[limit]=10").unwrap().links(&url, 25);
        assert!(first.prev.is_none());
        assert!(first.first.is_none());
        assert_eq!(offset_of(first.next.as_deref().unwrap()).as_deref(), Some("10"));

        let last = page("page[limit]=10&page[offset]=20").unwrap().links(&url, 25);
        assert!(last.next.is_none());
        assert!(last.last.is_none());
        assert_eq!(offset_of(last.prev.as_deref().unwrap()).as_deref(), Some("10"));
        assert!(!first.is_empty());

        let only = page("page[limit]=10").unwrap().links(&url, 5);
        assert!(only.is_empty());
    }

    #[test]
    fn meta_counters() {
        let page = page("page[limit]=5&page[offset]=5").unwrap();
        assert_eq!(
            page.meta(12),
            Some(PageMeta {
                limit: 5,
                offset: 5,
                total: 12
            })
        );
    }
}
