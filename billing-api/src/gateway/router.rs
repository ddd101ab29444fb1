//! Data-driven routing over a read-only table of route descriptors.

use axum::http::{header::InvalidHeaderValue, Method};
use std::collections::HashMap;
use thiserror::Error;

use super::operations::Operation;
use super::response::{CorsPolicy, CorsSettings};

pub const INVOICE_COLLECTION: &str = "/billing/invoices";
pub const INVOICE_MEMBER: &str = "/billing/invoices/{invoice_id}";

/// The invoice resource: (method, pattern, operation, body rule).
const INVOICE_ROUTES: [(Method, &str, Operation, BodyRule); 5] = [
    (Method::POST, INVOICE_COLLECTION, Operation::Create, BodyRule::Required),
    (Method::GET, INVOICE_COLLECTION, Operation::ListAll, BodyRule::Absent),
    (Method::GET, INVOICE_MEMBER, Operation::GetOne, BodyRule::Absent),
    (Method::PUT, INVOICE_MEMBER, Operation::Update, BodyRule::Required),
    (Method::DELETE, INVOICE_MEMBER, Operation::Delete, BodyRule::Absent),
];

/// A path template that cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("path pattern must start with '/': {0}")]
    NotAbsolute(String),
    #[error("empty segment in path pattern: {0}")]
    EmptySegment(String),
    #[error("unnamed parameter in path pattern: {0}")]
    UnnamedParam(String),
}

/// The route table could not be built.
#[derive(Debug, Error)]
pub enum RouteTableError {
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("invalid CORS header value: {0}")]
    Cors(#[from] InvalidHeaderValue),
}

/// No descriptor matches both the method and the path.
#[derive(Debug, Error)]
#[error("no route for {method} {path}")]
pub struct RouteNotFound {
    pub method: Method,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A path template such as `/billing/invoices/{invoice_id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Parse a template; `{name}` segments capture one path segment each.
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        let rest = raw
            .strip_prefix('/')
            .ok_or_else(|| PatternError::NotAbsolute(raw.to_string()))?;

        let segments = rest
            .split('/')
            .map(|segment| {
                if segment.is_empty() {
                    return Err(PatternError::EmptySegment(raw.to_string()));
                }
                match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    Some("") => Err(PatternError::UnnamedParam(raw.to_string())),
                    Some(name) => Ok(Segment::Param(name.to_string())),
                    None => Ok(Segment::Literal(segment.to_string())),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Longer patterns first, then those with more literal segments.
    fn specificity(&self) -> (usize, usize) {
        let literals = self
            .segments
            .iter()
            .filter(|segment| matches!(segment, Segment::Literal(_)))
            .count();
        (self.segments.len(), literals)
    }

    /// Captures parameters when `path` fits the pattern segment for segment.
    ///
    /// Parameters must be non-empty; they are percent-decoded.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let rest = path.strip_prefix('/')?;
        let parts: Vec<&str> = rest.split('/').collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = PathParams::default();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) => {
                    if literal != part {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = urlencoding::decode(part).ok()?;
                    if value.trim().is_empty() {
                        return None;
                    }
                    params.0.insert(name.clone(), value.into_owned());
                }
            }
        }
        Some(params)
    }
}

/// Named values captured from a matched path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(HashMap<String, String>);

impl PathParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Whether the operation is handed the request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyRule {
    Required,
    /// Any body sent is ignored.
    Absent,
}

/// One row of the route table: method and pattern to operation.
#[derive(Debug, Clone)]
pub struct RouteDescriptor {
    pub method: Method,
    pub pattern: PathPattern,
    pub operation: Operation,
    pub body: BodyRule,
    pub cors: CorsPolicy,
}

/// The matched descriptor plus the parameters captured from the path.
#[derive(Debug)]
pub struct ResolvedRoute<'a> {
    pub route: &'a RouteDescriptor,
    pub params: PathParams,
}

/// Immutable after construction; shared across requests.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<RouteDescriptor>,
    /// One policy per distinct pattern, allowing every method declared on it.
    pattern_cors: Vec<(PathPattern, CorsPolicy)>,
    fallback_cors: CorsPolicy,
}

impl RouteTable {
    /// Order routes most specific first and derive the per-pattern CORS policies.
    pub fn new(mut routes: Vec<RouteDescriptor>, settings: &CorsSettings) -> Result<Self, RouteTableError> {
        // Stable: routes of equal specificity keep declaration order.
        routes.sort_by(|a, b| b.pattern.specificity().cmp(&a.pattern.specificity()));

        let mut grouped: Vec<(PathPattern, Vec<Method>)> = Vec::new();
        for route in &routes {
            match grouped.iter_mut().find(|(pattern, _)| *pattern == route.pattern) {
                Some((_, methods)) => methods.push(route.method.clone()),
                None => grouped.push((route.pattern.clone(), vec![route.method.clone()])),
            }
        }

        let all_methods: Vec<Method> = routes.iter().map(|route| route.method.clone()).collect();
        let fallback_cors = CorsPolicy::new(settings, &all_methods)?;

        let pattern_cors = grouped
            .into_iter()
            .map(|(pattern, methods)| -> Result<_, RouteTableError> {
                Ok((pattern, CorsPolicy::new(settings, &methods)?))
            })
            .collect::<Result<Vec<_>, RouteTableError>>()?;

        Ok(Self {
            routes,
            pattern_cors,
            fallback_cors,
        })
    }

    /// The five invoice routes.
    pub fn invoices(settings: &CorsSettings) -> Result<Self, RouteTableError> {
        let routes = INVOICE_ROUTES
            .iter()
            .map(|(method, pattern, operation, body)| -> Result<_, RouteTableError> {
                Ok(RouteDescriptor {
                    method: method.clone(),
                    pattern: PathPattern::parse(pattern)?,
                    operation: *operation,
                    body: *body,
                    cors: CorsPolicy::new(settings, std::slice::from_ref(method))?,
                })
            })
            .collect::<Result<Vec<_>, RouteTableError>>()?;

        Self::new(routes, settings)
    }

    /// Descriptors in resolution order.
    pub fn routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }

    /// First descriptor whose method and pattern both match.
    pub fn resolve(&self, method: &Method, path: &str) -> Result<ResolvedRoute<'_>, RouteNotFound> {
        self.routes
            .iter()
            .filter(|route| route.method == *method)
            .find_map(|route| {
                route
                    .pattern
                    .matches(path)
                    .map(|params| ResolvedRoute { route, params })
            })
            .ok_or_else(|| RouteNotFound {
                method: method.clone(),
                path: path.to_string(),
            })
    }

    /// Policy for the pattern `path` falls under, if any.
    pub fn preflight(&self, path: &str) -> Option<(&PathPattern, &CorsPolicy)> {
        self.pattern_cors
            .iter()
            .find(|(pattern, _)| pattern.matches(path).is_some())
            .map(|(pattern, cors)| (pattern, cors))
    }

    /// CORS headers for any outcome on `method path`: the route's own policy,
    /// else its pattern's, else one covering every declared method.
    pub fn cors_for(&self, method: &Method, path: &str) -> &CorsPolicy {
        if let Ok(resolved) = self.resolve(method, path) {
            return &resolved.route.cors;
        }
        self.preflight(path)
            .map(|(_, cors)| cors)
            .unwrap_or(&self.fallback_cors)
    }

    /// Policy for paths outside every pattern.
    pub fn fallback_cors(&self) -> &CorsPolicy {
        &self.fallback_cors
    }
}
