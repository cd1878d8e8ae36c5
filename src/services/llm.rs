//! Language-model client used for relationship refinement and chat phrasing.
//!
//! Requests go to the Anthropic Messages API. When payment metering is
//! enabled the same request is sent through the Lava forward proxy instead,
//! authenticated with a forward token built by [`LavaClient`].
use serde::Deserialize;
use serde_json::json;

use crate::domain::RelationshipKind;
use crate::models::config::Settings;
use crate::services::lava::LavaClient;

const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const MAX_TOKENS: u32 = 1024;

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

/// A model-classified relationship between two recognized entities.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ClassifiedRelationship {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub relationship_type: String,
}

#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    api_key: String,
    enabled: bool,
    lava: LavaClient,
}

impl LlmClient {
    pub fn new(settings: &Settings, lava: LavaClient) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: settings.anthropic_api_key.clone(),
            enabled: settings.enable_llm_extraction,
            lava,
        }
    }

    /// Client that never issues requests. Used when extraction is disabled
    /// and in tests.
    pub fn disabled() -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: String::new(),
            enabled: false,
            lava: LavaClient::disabled(),
        }
    }

    /// Whether calls will actually reach a model.
    pub fn active(&self) -> bool {
        self.enabled && !self.api_key.is_empty()
    }

    /// Ask the model to refine relationships between the given entities in a
    /// sentence. Upstream failures degrade to an empty list.
    pub async fn extract_relationships(
        &self,
        sentence: &str,
        entities: &[String],
    ) -> Vec<ClassifiedRelationship> {
        if !self.active() || entities.len() < 2 {
            return Vec::new();
        }
        let prompt = format!(
            "Sentence: {sentence}\nEntities: {}\n\
             List the direct relationships between these entities as a JSON \
             array of objects with keys source, target, relationship_type \
             (one of CAUSES, INHIBITS, TREATS, REGULATES, INTERACTS_WITH). \
             Reply with only the JSON array.",
            entities.join(", ")
        );
        match self.complete(&prompt).await {
            Some(text) => serde_json::from_str(extract_json_array(&text)).unwrap_or_else(|err| {
                log::warn!("unparseable relationship reply: {err}");
                Vec::new()
            }),
            None => Vec::new(),
        }
    }

    /// Ask the model which relationship kind the evidence supports.
    pub async fn classify(
        &self,
        source: &str,
        target: &str,
        evidence: &[String],
    ) -> Option<RelationshipKind> {
        if !self.active() {
            return None;
        }
        let prompt = format!(
            "Evidence:\n{}\n\
             What is the relationship between \"{source}\" and \"{target}\"? \
             Reply with exactly one of: CAUSES, CAUSED_BY, INHIBITS, \
             INHIBITED_BY, TREATS, REGULATES, INTERACTS_WITH, CO_OCCURRENCE.",
            evidence.join("\n")
        );
        let reply = self.complete(&prompt).await?;
        Some(RelationshipKind::from_str_lossy(reply.trim()))
    }

    /// Free-form answer used by the chat agent to phrase graph findings.
    pub async fn answer(&self, context: &str) -> Option<String> {
        if !self.active() {
            return None;
        }
        let prompt = format!(
            "{context}\n\nAnswer the question in two or three sentences, \
             grounded only in the graph findings above."
        );
        self.complete(&prompt).await
    }

    async fn complete(&self, prompt: &str) -> Option<String> {
        let body = json!({
            "model": DEFAULT_MODEL,
            "max_tokens": MAX_TOKENS,
            "messages": [{"role": "user", "content": prompt}],
        });

        let request = if self.lava.enabled() {
            self.http
                .post(self.lava.forward_url(ANTHROPIC_MESSAGES_URL))
                .bearer_auth(self.lava.forward_token())
        } else {
            self.http
                .post(ANTHROPIC_MESSAGES_URL)
                .header("x-api-key", &self.api_key)
        };

        let response = request
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                match resp.json::<MessagesResponse>().await {
                    Ok(parsed) => parsed.content.first().map(|block| block.text.clone()),
                    Err(err) => {
                        log::warn!("model reply decode failed: {err}");
                        None
                    }
                }
            }
            Ok(resp) => {
                log::warn!("model request rejected: {}", resp.status());
                None
            }
            Err(err) => {
                log::warn!("model request failed: {err}");
                None
            }
        }
    }
}

/// Slice out the first JSON array in a reply, tolerating prose around it.
fn extract_json_array(text: &str) -> &str {
    match (text.find('['), text.rfind(']')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_without_key_or_flag() {
        assert!(!LlmClient::disabled().active());
    }

    #[test]
    fn json_array_extracted_from_prose() {
        let reply = "Here are the relationships:\n[{\"source\": \"a\", \
                     \"target\": \"b\", \"relationship_type\": \"INHIBITS\"}]\nDone.";
        let parsed: Vec<ClassifiedRelationship> =
            serde_json::from_str(extract_json_array(reply)).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].relationship_type, "INHIBITS");
    }

    #[test]
    fn extract_json_array_passes_through_bare_text() {
        assert_eq!(extract_json_array("no json here"), "no json here");
    }

    #[tokio::test]
    async fn disabled_client_returns_nothing() {
        let llm = LlmClient::disabled();
        assert!(
            llm.extract_relationships("a inhibits b", &["a".into(), "b".into()])
                .await
                .is_empty()
        );
        assert!(llm.classify("a", "b", &[]).await.is_none());
        assert!(llm.answer("question").await.is_none());
    }
}
