//! Path template matching
//!
//! A template is a `/`-separated list of segments. A segment starting with
//! `:` captures one or more non-slash characters under that name; every
//! other segment must match literally (case-sensitive). Matching is anchored
//! on both ends and there are no wildcard or optional segments.

use percent_encoding::percent_decode_str;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A compiled path template
#[derive(Debug, Clone)]
pub struct PathPattern {
    template: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn compile(template: &str) -> Self {
        let template = strip_trailing_slash(template).to_string();
        let segments = split_segments(&template)
            .map(|seg| match seg.strip_prefix(':') {
                Some(name) if !name.is_empty() => Segment::Param(name.to_string()),
                _ => Segment::Literal(seg.to_string()),
            })
            .collect();

        Self { template, segments }
    }

    /// The normalised template this pattern was compiled from
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|seg| match seg {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Test a request path, returning the decoded captures on success
    ///
    /// Any query string and a single trailing slash are ignored.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let path = strip_trailing_slash(strip_query(path));
        let mut params = HashMap::new();
        let mut parts = split_segments(path);

        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(expected) => {
                    if part != expected {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    if part.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), decode(part));
                }
            }
        }

        // Anchored at the end: leftovers mean the path is longer
        if parts.next().is_some() {
            return None;
        }
        Some(params)
    }
}

/// Drop the query string, if any
pub fn strip_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(path, _)| path)
}

/// `/users/` -> `/users`, while `/` stays `/`
pub fn strip_trailing_slash(path: &str) -> &str {
    match path.strip_suffix('/') {
        Some(rest) if !rest.is_empty() => rest,
        _ => path,
    }
}

fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    // "" and "/" both mean the root, which has no segments
    trimmed.split('/').filter(move |_| !trimmed.is_empty())
}

fn decode(raw: &str) -> String {
    percent_decode_str(raw)
        .decode_utf8()
        .map_or_else(|_| raw.to_string(), |s| s.into_owned())
}
