//! `Link` header pagination (RFC 8288 subset).
//!
//! ```text
//! Link: <https://api.example.com/items?page=3>; rel="next",
//!       <https://api.example.com/items?page=9>; rel="last"
//! ```

use std::fmt;
use std::str::FromStr;

use http::HeaderMap;
use http::header::LINK;

use crate::response::{ApiResponse, ResponseMeta};

/// Pagination relations that are tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Next,
    Prev,
    First,
    Last,
}

impl Relation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Next => "next",
            Self::Prev => "prev",
            Self::First => "first",
            Self::Last => "last",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Relation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "next" => Ok(Self::Next),
            "prev" => Ok(Self::Prev),
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            _ => Err(()),
        }
    }
}

/// Page URLs found in a `Link` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLinks {
    pub next: Option<String>,
    pub prev: Option<String>,
    pub first: Option<String>,
    pub last: Option<String>,
}

impl PageLinks {
    #[must_use]
    pub fn get(&self, relation: Relation) -> Option<&str> {
        match relation {
            Relation::Next => self.next.as_deref(),
            Relation::Prev => self.prev.as_deref(),
            Relation::First => self.first.as_deref(),
            Relation::Last => self.last.as_deref(),
        }
    }

    fn set(&mut self, relation: Relation, uri: &str) {
        let slot = match relation {
            Relation::Next => &mut self.next,
            Relation::Prev => &mut self.prev,
            Relation::First => &mut self.first,
            Relation::Last => &mut self.last,
        };
        *slot = Some(uri.to_owned());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Anything a `Link` header value can be read from.
pub trait LinkSource {
    fn link_header(&self) -> Option<&str>;
}

impl LinkSource for str {
    fn link_header(&self) -> Option<&str> {
        Some(self)
    }
}

impl LinkSource for String {
    fn link_header(&self) -> Option<&str> {
        Some(self)
    }
}

impl LinkSource for Option<&str> {
    fn link_header(&self) -> Option<&str> {
        *self
    }
}

impl LinkSource for Option<String> {
    fn link_header(&self) -> Option<&str> {
        self.as_deref()
    }
}

impl LinkSource for HeaderMap {
    fn link_header(&self) -> Option<&str> {
        self.get(LINK).and_then(|v| v.to_str().ok())
    }
}

impl LinkSource for ResponseMeta {
    fn link_header(&self) -> Option<&str> {
        self.link.as_deref()
    }
}

impl LinkSource for ApiResponse {
    fn link_header(&self) -> Option<&str> {
        self.meta.link.as_deref()
    }
}

impl<T: LinkSource + ?Sized> LinkSource for &T {
    fn link_header(&self) -> Option<&str> {
        (**self).link_header()
    }
}

/// Collect the page relations of a `Link` header in one pass.
///
/// Unknown relations are ignored; a later entry for the same relation
/// replaces an earlier one.
#[must_use]
pub fn parse_links<S: LinkSource + ?Sized>(source: &S) -> PageLinks {
    let mut links = PageLinks::default();
    let Some(header) = source.link_header() else {
        return links;
    };

    let mut rest = header;
    while let Some(open) = rest.find('<') {
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('>') else {
            break;
        };
        let uri = &after_open[..close];
        let tail = &after_open[close + 1..];
        let params_end = tail.find('<').unwrap_or(tail.len());

        if let Some(rels) = rel_param(&tail[..params_end]) {
            for relation in rels.split_ascii_whitespace().filter_map(|r| r.parse().ok()) {
                links.set(relation, uri);
            }
        }
        rest = &tail[params_end..];
    }
    links
}

/// Value of the `rel` parameter in `; rel="next", `.
fn rel_param(params: &str) -> Option<&str> {
    params
        .trim_end()
        .trim_end_matches(',')
        .split(';')
        .find_map(|param| {
            let (key, value) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("rel")
                .then(|| value.trim().trim_matches('"'))
        })
}

#[must_use]
pub fn has_next_page<S: LinkSource + ?Sized>(source: &S) -> bool {
    parse_links(source).next.is_some()
}

#[must_use]
pub fn has_previous_page<S: LinkSource + ?Sized>(source: &S) -> bool {
    parse_links(source).prev.is_some()
}

#[must_use]
pub fn has_first_page<S: LinkSource + ?Sized>(source: &S) -> bool {
    parse_links(source).first.is_some()
}

#[must_use]
pub fn has_last_page<S: LinkSource + ?Sized>(source: &S) -> bool {
    parse_links(source).last.is_some()
}
