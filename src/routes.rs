//! Open (unauthenticated) route classification.

/// Path fragments exempt from authorization unless overridden at startup.
pub const DEFAULT_OPEN_PATHS: &[&str] = &[
    "/api/v1/auth/login",
    "/api/v1/auth/register",
    "/api/v1/auth/token",
    "/api/v1/auth/refreshToken",
    "/api/v1/auth/confirm",
    "/eureka/main",
];

/// How an open-path fragment is matched against the request path.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RouteMatch {
    /// Exempt when the fragment occurs anywhere in the path.
    ///
    /// Broad: `/api/v1/users/api/v1/auth/login-history` is exempt too.
    #[default]
    Contains,
    /// Exempt when the path is the fragment or continues it with `/`.
    Prefix,
}

/// Immutable set of open-path fragments.
#[derive(Debug, Clone)]
pub struct OpenRoutes {
    fragments: Vec<String>,
    mode: RouteMatch,
}

impl Default for OpenRoutes {
    fn default() -> Self {
        Self::new(DEFAULT_OPEN_PATHS.iter().copied(), RouteMatch::default())
    }
}

impl OpenRoutes {
    pub fn new<I, S>(fragments: I, mode: RouteMatch) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fragments = fragments
            .into_iter()
            .map(Into::into)
            .filter(|f: &String| !f.is_empty())
            .collect();
        Self { fragments, mode }
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    pub fn mode(&self) -> RouteMatch {
        self.mode
    }

    /// Whether `path` requires authorization.
    pub fn is_protected(&self, path: &str) -> bool {
        !self.fragments.iter().any(|fragment| self.matches(fragment, path))
    }

    fn matches(&self, fragment: &str, path: &str) -> bool {
        match self.mode {
            RouteMatch::Contains => path.contains(fragment),
            RouteMatch::Prefix => match path.strip_prefix(fragment) {
                Some(rest) => rest.is_empty() || rest.starts_with('/') || fragment.ends_with('/'),
                None => false,
            },
        }
    }
}
