//! Secrets and configuration collaborator.
//!
//! Components that need a credential or a tunable ask a [`ConfigSource`]
//! rather than reading files or the environment themselves.

/// Read-only key lookup for secrets and config values.
pub trait ConfigSource: Send + Sync {
    fn get_secret(&self, key: &str) -> Option<String>;

    /// Dotted-path lookup, e.g. `agent.max_iterations`.
    fn get_config_value(&self, key: &str) -> Option<String>;

    fn get_config_value_or(&self, key: &str, default: &str) -> String {
        self.get_config_value(key)
            .unwrap_or_else(|| default.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapSource(HashMap<String, String>);

    impl ConfigSource for MapSource {
        fn get_secret(&self, _key: &str) -> Option<String> {
            None
        }
        fn get_config_value(&self, key: &str) -> Option<String> {
            self.0.get(key).cloned()
        }
    }

    #[test]
    fn falls_back_to_default() {
        let source = MapSource(HashMap::from([("a.b".to_string(), "1".to_string())]));
        assert_eq!(source.get_config_value_or("a.b", "9"), "1");
        assert_eq!(source.get_config_value_or("a.c", "9"), "9");
    }
}
