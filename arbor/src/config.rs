//! Environment-driven endpoint configuration for hosting integrations.

use std::env;

/// Endpoint configuration read from the environment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GraphQLConfig {
    /// The GraphQL endpoint path (`GRAPHQL_PATH`, default `/graphql`).
    pub path: String,
    /// Whether to serve the GraphiQL IDE (`GRAPHIQL_ENABLED`).
    pub graphiql_enabled: bool,
    /// The GraphiQL page path (`GRAPHIQL_PATH`, default `/graphiql`).
    pub graphiql_path: String,
    /// The endpoint GraphiQL should query (`GRAPHIQL_ENDPOINT`, defaults to
    /// the GraphQL path).
    pub graphiql_endpoint: String,
}

impl Default for GraphQLConfig {
    fn default() -> Self {
        Self {
            path: "/graphql".into(),
            graphiql_enabled: false,
            graphiql_path: "/graphiql".into(),
            graphiql_endpoint: "/graphql".into(),
        }
    }
}

impl GraphQLConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let path = env::var("GRAPHQL_PATH").unwrap_or(defaults.path);
        let graphiql_endpoint = env::var("GRAPHIQL_ENDPOINT").unwrap_or_else(|_| path.clone());
        Self {
            graphiql_enabled: env::var("GRAPHIQL_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"))
                .unwrap_or(defaults.graphiql_enabled),
            graphiql_path: env::var("GRAPHIQL_PATH").unwrap_or(defaults.graphiql_path),
            graphiql_endpoint,
            path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = GraphQLConfig::default();
        assert_eq!(config.path, "/graphql");
        assert!(!config.graphiql_enabled);
        assert_eq!(config.graphiql_path, "/graphiql");
        assert_eq!(config.graphiql_endpoint, "/graphql");
    }
}
