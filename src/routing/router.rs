//! Route table: picks the upstream host for an inbound request.

use axum::http::{HeaderMap, Uri};
use url::Url;

use crate::config::RouteConfig;
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher};

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    pub name: String,
    pub upstream: Url,
    matcher: AndMatcher,
}

/// Immutable, priority-ordered route table.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Compile routes. Higher priority is checked first; ties keep file order.
    pub fn from_config(configs: Vec<RouteConfig>) -> Self {
        let mut ordered: Vec<(u32, Route)> = Vec::with_capacity(configs.len());
        for config in configs {
            let upstream = match Url::parse(&config.upstream) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(route = %config.name, upstream = %config.upstream, error = %e, "Skipping route with invalid upstream");
                    continue;
                }
            };
            let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
            if let Some(host) = config.host {
                matchers.push(Box::new(HostMatcher::new(host)));
            }
            if let Some(prefix) = config.path_prefix {
                matchers.push(Box::new(PathPrefixMatcher::new(prefix)));
            }
            ordered.push((
                config.priority,
                Route {
                    name: config.name,
                    upstream,
                    matcher: AndMatcher::new(matchers),
                },
            ));
        }
        ordered.sort_by(|a, b| b.0.cmp(&a.0));

        Self {
            routes: ordered.into_iter().map(|(_, route)| route).collect(),
        }
    }

    /// First route whose conditions all hold.
    pub fn match_request(&self, uri: &Uri, headers: &HeaderMap) -> Option<&Route> {
        self.routes.iter().find(|r| r.matcher.matches(uri, headers))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
