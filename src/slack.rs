use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_SLACK_API_URL: &str = "https://slack.com/api";

pub struct SlackWebClient {
    bot_token: String,
    api_base: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum SlackApiError {
    #[error("Request failed: {0}")]
    Network(String),
    #[error("Parse failed: {0}")]
    Parse(String),
    #[error("Slack API error: {0}")]
    Api(String),
}

#[derive(Debug, Deserialize)]
struct SlackApiResponse {
    ok: bool,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatPostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
    as_user: bool,
}

impl SlackWebClient {
    pub fn new(bot_token: String, api_base: String) -> Self {
        Self {
            bot_token,
            api_base: api_base.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Checks an `X-Slack-Signature` header of the form `v0=<hex>` against
    /// the HMAC-SHA256 of `"{version}:{timestamp}:{body}"` keyed with the
    /// signing secret.
    pub fn verify_signature(
        signing_secret: &str,
        timestamp: &str,
        signature: &str,
        raw_body: &[u8],
    ) -> bool {
        let Some((version, hash)) = signature.split_once('=') else {
            return false;
        };

        let Ok(mut mac) = HmacSha256::new_from_slice(signing_secret.as_bytes()) else {
            return false;
        };
        mac.update(version.as_bytes());
        mac.update(b":");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(raw_body);
        let computed = hex::encode(mac.finalize().into_bytes());

        constant_time_eq(hash.as_bytes(), computed.as_bytes())
    }

    /// Posts `text` to `channel` as the bot user.
    pub async fn chat_post_message(&self, channel: &str, text: &str) -> Result<(), SlackApiError> {
        let url = format!("{}/chat.postMessage", self.api_base);
        let payload = ChatPostMessageRequest {
            channel,
            text,
            as_user: true,
        };

        let response: SlackApiResponse = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.bot_token))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| SlackApiError::Network(e.to_string()))?
            .json()
            .await
            .map_err(|e| SlackApiError::Parse(e.to_string()))?;

        if !response.ok {
            return Err(SlackApiError::Api(
                response.error.unwrap_or_else(|| "unknown".to_string()),
            ));
        }

        Ok(())
    }
}

/// Rejects timestamps that don't parse or sit more than `max_age_secs`
/// away from `now_secs` in either direction.
pub fn is_timestamp_fresh(timestamp: &str, max_age_secs: u64, now_secs: u64) -> bool {
    match timestamp.trim().parse::<u64>() {
        Ok(ts) => now_secs.abs_diff(ts) <= max_age_secs,
        Err(_) => false,
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
pub(crate) fn sign(signing_secret: &str, timestamp: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes()).unwrap();
    mac.update(format!("v0:{}:", timestamp).as_bytes());
    mac.update(body);
    format!("v0={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";
    const BODY: &[u8] = br#"{"type":"event_callback","event":{"type":"message"}}"#;

    #[test]
    fn accepts_matching_signature() {
        let sig = sign(SECRET, "1531420618", BODY);
        assert!(SlackWebClient::verify_signature(SECRET, "1531420618", &sig, BODY));
    }

    #[test]
    fn rejects_mutated_body_timestamp_or_secret() {
        let sig = sign(SECRET, "1531420618", BODY);

        let mut body = BODY.to_vec();
        body[3] ^= 0x01;
        assert!(!SlackWebClient::verify_signature(SECRET, "1531420618", &sig, &body));
        assert!(!SlackWebClient::verify_signature(SECRET, "1531420619", &sig, BODY));
        assert!(!SlackWebClient::verify_signature("8f742231b10e8888abcd99yyyzzz85a6", "1531420618", &sig, BODY));
    }

    #[test]
    fn signs_raw_bytes_of_non_utf8_bodies() {
        let body: &[u8] = b"{\"text\":\"\xff\xfe\"}";
        let replaced: &[u8] = "{\"text\":\"\u{fffd}\u{fffd}\"}".as_bytes();
        let sig = sign(SECRET, "1531420618", body);

        assert!(SlackWebClient::verify_signature(SECRET, "1531420618", &sig, body));
        assert!(!SlackWebClient::verify_signature(SECRET, "1531420618", &sig, replaced));
    }

    #[test]
    fn rejects_malformed_signature_headers() {
        assert!(!SlackWebClient::verify_signature(SECRET, "1", "", BODY));
        assert!(!SlackWebClient::verify_signature(SECRET, "1", "v0", BODY));
        assert!(!SlackWebClient::verify_signature(SECRET, "1", "v0=", BODY));
        assert!(!SlackWebClient::verify_signature(SECRET, "1", "v0=zz", BODY));
    }

    #[test]
    fn version_prefix_is_part_of_signed_string() {
        let sig = sign(SECRET, "1531420618", BODY);
        let hash = sig.trim_start_matches("v0=");
        let other_version = format!("v1={}", hash);
        assert!(!SlackWebClient::verify_signature(SECRET, "1531420618", &other_version, BODY));
    }

    #[test]
    fn timestamp_freshness_window() {
        assert!(is_timestamp_fresh("1000", 300, 1000));
        assert!(is_timestamp_fresh("1000", 300, 1300));
        assert!(is_timestamp_fresh("1300", 300, 1000));
        assert!(!is_timestamp_fresh("1000", 300, 1301));
        assert!(!is_timestamp_fresh("not-a-number", 300, 1000));
        assert!(!is_timestamp_fresh("", 300, 1000));
    }

    #[tokio::test]
    async fn chat_post_message_sends_bearer_token_and_as_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(header("Authorization", "Bearer xoxb-test"))
            .and(body_json(serde_json::json!({
                "channel": "C0123",
                "text": "hello",
                "as_user": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let client = SlackWebClient::new("xoxb-test".to_string(), format!("{}/", server.uri()));
        client.chat_post_message("C0123", "hello").await.unwrap();
    }

    #[tokio::test]
    async fn chat_post_message_surfaces_api_error_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": false,
                "error": "channel_not_found"
            })))
            .mount(&server)
            .await;

        let client = SlackWebClient::new("xoxb-test".to_string(), server.uri());
        let err = client.chat_post_message("C0123", "hello").await.unwrap_err();
        assert!(matches!(err, SlackApiError::Api(ref code) if code == "channel_not_found"));
    }

    #[tokio::test]
    async fn chat_post_message_reports_unparseable_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = SlackWebClient::new("xoxb-test".to_string(), server.uri());
        let err = client.chat_post_message("C0123", "hello").await.unwrap_err();
        assert!(matches!(err, SlackApiError::Parse(_)));
    }
}
