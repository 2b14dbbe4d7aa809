//! Environment variable parsing utilities
//!
//! Parse environment variables with defaults instead of unwrapping.

use std::str::FromStr;

/// Parse an environment variable with a default fallback
///
/// Missing and unparseable values both fall back to `default`.
pub fn parse_env_with_default<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read a string variable, falling back to `default` when unset
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn test_parse_env_with_default() {
        std::env::remove_var("DB_POOL_TEST_NUMBER");
        assert_eq!(parse_env_with_default("DB_POOL_TEST_NUMBER", 7u32), 7);

        std::env::set_var("DB_POOL_TEST_NUMBER", "42");
        assert_eq!(parse_env_with_default("DB_POOL_TEST_NUMBER", 7u32), 42);

        std::env::set_var("DB_POOL_TEST_NUMBER", "not-a-number");
        assert_eq!(parse_env_with_default("DB_POOL_TEST_NUMBER", 7u32), 7);

        std::env::remove_var("DB_POOL_TEST_NUMBER");
    }

    #[test]
    #[serial_test::serial]
    fn test_env_or() {
        std::env::remove_var("DB_POOL_TEST_STRING");
        assert_eq!(env_or("DB_POOL_TEST_STRING", "fallback"), "fallback");

        std::env::set_var("DB_POOL_TEST_STRING", "value");
        assert_eq!(env_or("DB_POOL_TEST_STRING", "fallback"), "value");

        std::env::remove_var("DB_POOL_TEST_STRING");
    }
}
