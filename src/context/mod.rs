//! Per-request context handed to route handlers.

use std::collections::HashMap;

use crate::Request;

/// Path parameters captured by the matched route (`:name` segments and the
/// `wildcard` tail).
#[derive(Default, Debug, Clone)]
pub struct PathParams {
    map: HashMap<String, String>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, value: String) {
        self.map.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }
}

/// A request together with whatever the router extracted from its path.
pub struct Context {
    request: Request,
    params: PathParams,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            params: PathParams::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// Replaces the captured parameters. Used by the router once it has
    /// matched a context that was built before routing.
    pub fn set_params(&mut self, params: PathParams) {
        self.params = params;
    }
}
