//! # Routing
//!
//! Rule-based dispatch of records to writer subsets. Routes are evaluated
//! in order; a matching route adds its writers to the selection and, when
//! flagged, stops further evaluation. Records matching no route fall
//! through to the default writer set (every writer no route names).

use crate::filter::{LogFilter, NullFilter};
use crate::record::LogRecord;

/// One routing rule.
pub struct RouteConfig {
    pub name: String,
    pub writers: Vec<String>,
    pub filter: Box<dyn LogFilter>,
    pub stop_propagation: bool,
}

impl RouteConfig {
    pub fn new(name: &str, writers: Vec<String>, filter: Box<dyn LogFilter>) -> Self {
        RouteConfig {
            name: name.to_string(),
            writers,
            filter,
            stop_propagation: false,
        }
    }

    pub fn with_stop_propagation(mut self, stop: bool) -> Self {
        self.stop_propagation = stop;
        self
    }
}

/// Outcome of routing one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// No route matched: dispatch to the default writer set.
    Default,
    /// Dispatch to exactly these writers.
    Writers(Vec<String>),
}

/// Ordered route table.
#[derive(Default)]
pub struct LogRouter {
    routes: Vec<RouteConfig>,
}

impl LogRouter {
    pub fn new() -> Self {
        LogRouter { routes: Vec::new() }
    }

    pub fn add_route(&mut self, route: RouteConfig) {
        self.routes.push(route);
    }

    pub fn routes(&self) -> &[RouteConfig] {
        &self.routes
    }

    pub fn has_routes(&self) -> bool {
        !self.routes.is_empty()
    }

    /// Writer names claimed by at least one route. The collector subtracts
    /// these from the full set to form the default writer set.
    pub fn claimed_writers(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for route in &self.routes {
            for writer in &route.writers {
                if !names.contains(writer) {
                    names.push(writer.clone());
                }
            }
        }
        names
    }

    /// Evaluate routes in order against a record.
    pub fn route(&self, record: &LogRecord) -> RouteDecision {
        let mut selected: Vec<String> = Vec::new();
        let mut matched = false;
        for route in &self.routes {
            if !route.filter.passes(record) {
                continue;
            }
            matched = true;
            for writer in &route.writers {
                if !selected.contains(writer) {
                    selected.push(writer.clone());
                }
            }
            if route.stop_propagation {
                return RouteDecision::Writers(selected);
            }
        }
        if matched {
            RouteDecision::Writers(selected)
        } else {
            RouteDecision::Default
        }
    }
}

/// Fluent construction of a router.
///
/// ```
/// use logpipe::filter::{LevelFilter, NullFilter};
/// use logpipe::level::LogLevel;
/// use logpipe::route::RouterBuilder;
///
/// let router = RouterBuilder::new()
///     .route("errors", vec!["error_file"], Box::new(LevelFilter::new(LogLevel::Error)))
///     .stop_propagation()
///     .route("everything", vec!["main"], Box::new(NullFilter))
///     .build();
/// ```
#[derive(Default)]
pub struct RouterBuilder {
    router: LogRouter,
}

impl RouterBuilder {
    pub fn new() -> Self {
        RouterBuilder {
            router: LogRouter::new(),
        }
    }

    pub fn route(mut self, name: &str, writers: Vec<&str>, filter: Box<dyn LogFilter>) -> Self {
        self.router.add_route(RouteConfig::new(
            name,
            writers.into_iter().map(String::from).collect(),
            filter,
        ));
        self
    }

    /// Route everything that reaches this rule.
    pub fn catch_all(self, name: &str, writers: Vec<&str>) -> Self {
        self.route(name, writers, Box::new(NullFilter))
    }

    /// Set `stop_propagation` on the most recently added route.
    pub fn stop_propagation(mut self) -> Self {
        if let Some(route) = self.router.routes.last_mut() {
            route.stop_propagation = true;
        }
        self
    }

    pub fn build(self) -> LogRouter {
        self.router
    }
}
