//! Host and path-segment matching.
//!
//! # Responsibilities
//! - Normalize the request host (lowercase, port stripped)
//! - Split paths into non-empty `/`-delimited segments
//! - Compute how many leading segments of a location pattern a path satisfies
//!
//! # Design Decisions
//! - Host matching is exact and case-insensitive, no wildcards
//! - Literal segments are case-sensitive
//! - `{...}` segments are regexes with search semantics (unanchored)

use crate::routing::regex_cache::RegexCache;

/// Lowercase a `Host` value and strip any port suffix.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let without_port = if let Some(rest) = host.strip_prefix('[') {
        // [v6]:port
        rest.split(']').next().unwrap_or(rest)
    } else if host.matches(':').count() == 1 {
        host.split(':').next().unwrap_or(host)
    } else {
        host
    };
    without_port.to_lowercase()
}

/// Split a path into its non-empty segments.
pub fn split_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// The part of `path` left after skipping its first `depth` segments.
///
/// Keeps the leading and trailing slashes of the remainder, so
/// `residual_path("/loc/x/", 1)` is `"/x/"`.
pub fn residual_path(path: &str, depth: usize) -> &str {
    let mut rest = path;
    for _ in 0..depth {
        rest = rest.trim_start_matches('/');
        match rest.find('/') {
            Some(i) => rest = &rest[i..],
            None => return "",
        }
    }
    rest
}

/// One segment of a location pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    /// Regex source without the surrounding braces.
    Regex(String),
}

impl Segment {
    fn parse(raw: &str) -> Self {
        if raw.len() >= 2 && raw.starts_with('{') && raw.ends_with('}') {
            Segment::Regex(raw[1..raw.len() - 1].to_string())
        } else {
            Segment::Literal(raw.to_string())
        }
    }

    fn matches(&self, path_segment: &str, cache: &RegexCache) -> bool {
        match self {
            Segment::Literal(literal) => literal == path_segment,
            Segment::Regex(pattern) => cache
                .get(pattern)
                .map(|regex| regex.is_match(path_segment))
                .unwrap_or(false),
        }
    }
}

/// A location pattern split into segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            segments: split_segments(raw).into_iter().map(Segment::parse).collect(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Regex sources used by this pattern.
    pub fn regex_sources(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Regex(pattern) => Some(pattern.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// True for the root pattern `/`, which has no segments.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Count of leading segments satisfied by `path`, stopping at the first mismatch.
    pub fn match_depth(&self, path: &[&str], cache: &RegexCache) -> usize {
        self.segments
            .iter()
            .zip(path.iter())
            .take_while(|(segment, path_segment)| segment.matches(path_segment, cache))
            .count()
    }

    /// True when every segment of the pattern is satisfied by `path`.
    pub fn matches(&self, path: &[&str], cache: &RegexCache) -> bool {
        self.match_depth(path, cache) >= self.segments.len()
    }
}
