use crate::types::{TestConfig, TestEnvironment, TestSuite};
use regex::Regex;
use std::sync::LazyLock;

const TEST_TRIGGERS: &[&str] = &["test", "run test", "run tests", "execute test"];

// Order matters: the first key found in the text wins.
const TEST_SUITES: &[(&str, TestSuite)] = &[
    ("unit", TestSuite::Unit),
    ("integration", TestSuite::Integration),
    ("e2e", TestSuite::E2e),
    ("end-to-end", TestSuite::E2e),
    ("security", TestSuite::Security),
    ("performance", TestSuite::Performance),
    ("perf", TestSuite::Performance),
    ("all", TestSuite::All),
    ("full", TestSuite::All),
];

const TEST_ENVIRONMENTS: &[(&str, TestEnvironment)] = &[
    ("staging", TestEnvironment::Staging),
    ("prod", TestEnvironment::Production),
    ("production", TestEnvironment::Production),
    ("dev", TestEnvironment::Development),
    ("development", TestEnvironment::Development),
];

const DEFAULT_BRANCH: &str = "main";

// Branch names are ASCII word characters only, so "feature-123" stops at "feature".
static BRANCH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bbranch\s+([A-Za-z0-9_]+)").expect("Invalid branch regex")
});

static ON_BRANCH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bon\s+([A-Za-z0-9_]+)").expect("Invalid branch regex"));

/// Parses a chat message into a [`TestConfig`].
///
/// Returns `None` when the message contains none of the trigger phrases.
/// Dimensions the message does not mention fall back to `all`, `staging`
/// and `main`.
pub fn parse_test_command(message: &str) -> Option<TestConfig> {
    let text = message.to_lowercase();
    let text = text.trim();

    if !TEST_TRIGGERS.iter().any(|trigger| text.contains(trigger)) {
        return None;
    }

    let test_suite = first_keyword(text, TEST_SUITES).unwrap_or(TestSuite::All);
    let environment = first_keyword(text, TEST_ENVIRONMENTS).unwrap_or(TestEnvironment::Staging);
    let branch = extract_branch(text).unwrap_or_else(|| DEFAULT_BRANCH.to_string());

    Some(TestConfig {
        test_suite,
        environment,
        branch,
    })
}

fn first_keyword<T: Copy>(text: &str, table: &[(&str, T)]) -> Option<T> {
    table
        .iter()
        .find(|(keyword, _)| text.contains(keyword))
        .map(|(_, value)| *value)
}

fn extract_branch(text: &str) -> Option<String> {
    [&*BRANCH_REGEX, &*ON_BRANCH_REGEX]
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_messages_without_trigger() {
        assert_eq!(parse_test_command("hello there"), None);
        assert_eq!(parse_test_command(""), None);
        assert_eq!(parse_test_command("   "), None);
    }

    #[test]
    fn applies_defaults() {
        let config = parse_test_command("run tests").unwrap();
        assert_eq!(
            config,
            TestConfig {
                test_suite: TestSuite::All,
                environment: TestEnvironment::Staging,
                branch: "main".to_string(),
            }
        );
    }

    #[test]
    fn is_case_insensitive() {
        let config = parse_test_command("  RUN TESTS Security on PROD  ").unwrap();
        assert_eq!(config.test_suite, TestSuite::Security);
        assert_eq!(config.environment, TestEnvironment::Production);
        assert_eq!(config.branch, "prod");
    }

    #[test]
    fn suite_follows_table_order_not_message_order() {
        let config = parse_test_command("run test e2e then unit").unwrap();
        assert_eq!(config.test_suite, TestSuite::Unit);
    }

    #[test]
    fn suite_aliases_map_to_canonical_names() {
        let cases = [
            ("run tests end-to-end", TestSuite::E2e),
            ("run tests perf", TestSuite::Performance),
            ("run the full test", TestSuite::All),
        ];
        for (text, expected) in cases {
            assert_eq!(parse_test_command(text).unwrap().test_suite, expected, "{text}");
        }
    }

    #[test]
    fn environment_aliases_map_to_canonical_names() {
        let cases = [
            ("run tests in dev", TestEnvironment::Development),
            ("run tests in development", TestEnvironment::Development),
            ("run tests in production", TestEnvironment::Production),
        ];
        for (text, expected) in cases {
            assert_eq!(parse_test_command(text).unwrap().environment, expected, "{text}");
        }
    }

    #[test]
    fn branch_stops_at_non_word_characters() {
        let config = parse_test_command("run tests on feature-123").unwrap();
        assert_eq!(config.branch, "feature");
    }

    #[test]
    fn branch_keyword_outranks_on() {
        let config =
            parse_test_command("please run test suite integration on staging branch release")
                .unwrap();
        assert_eq!(config.test_suite, TestSuite::Integration);
        assert_eq!(config.environment, TestEnvironment::Staging);
        assert_eq!(config.branch, "release");
    }

    #[test]
    fn on_inside_a_word_is_not_a_branch_marker() {
        let config = parse_test_command("run integration tests").unwrap();
        assert_eq!(config.branch, "main");
    }

    #[test]
    fn parsing_is_idempotent() {
        let text = "execute test security branch hotfix_2";
        assert_eq!(parse_test_command(text), parse_test_command(text));
        assert_eq!(parse_test_command(text).unwrap().branch, "hotfix_2");
    }

    #[test]
    fn survives_unusual_input() {
        for text in ["test", "branch", "on", "test branch", "test on   ", "tést ünit 🚀 test"] {
            if let Some(config) = parse_test_command(text) {
                assert!(!config.branch.is_empty());
            }
        }
        assert_eq!(parse_test_command("test branch").unwrap().branch, "main");
    }
}
