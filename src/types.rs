use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Only the envelope `type` is typed up front. The challenge is echoed as
/// received and the event is decoded after the request is authenticated.
#[derive(Debug, Deserialize)]
pub struct SlackEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub challenge: Option<Value>,
    pub event: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct SlackEvent {
    #[serde(rename = "type", default)]
    pub event_type: String,
    pub user: Option<String>,
    pub text: Option<String>,
    pub channel: Option<String>,
    pub bot_id: Option<String>,
}

impl SlackEvent {
    /// Plain user messages in public channels. Bot-authored messages are
    /// dropped so the bot's own confirmations never re-trigger a pipeline.
    pub fn is_actionable_message(&self) -> bool {
        self.event_type == "message"
            && self.bot_id.as_deref().map_or(true, str::is_empty)
            && self.text.as_deref().is_some_and(|t| !t.is_empty())
            && self.channel.as_deref().is_some_and(|c| c.starts_with('C'))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestSuite {
    Unit,
    Integration,
    E2e,
    Security,
    Performance,
    All,
}

impl TestSuite {
    pub fn as_str(self) -> &'static str {
        match self {
            TestSuite::Unit => "unit",
            TestSuite::Integration => "integration",
            TestSuite::E2e => "e2e",
            TestSuite::Security => "security",
            TestSuite::Performance => "performance",
            TestSuite::All => "all",
        }
    }
}

impl fmt::Display for TestSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestEnvironment {
    Staging,
    Production,
    Development,
}

impl TestEnvironment {
    pub fn as_str(self) -> &'static str {
        match self {
            TestEnvironment::Staging => "staging",
            TestEnvironment::Production => "production",
            TestEnvironment::Development => "development",
        }
    }
}

impl fmt::Display for TestEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a chat command asked for. Lives for one request only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestConfig {
    pub test_suite: TestSuite,
    pub environment: TestEnvironment,
    pub branch: String,
}
