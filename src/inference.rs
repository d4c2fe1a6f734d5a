//! Client side of the remote multimodal inference service. The pipeline only
//! depends on the `VisionModel` trait, so the OpenAI-compatible HTTP client
//! below can be swapped for a test double.

use crate::config::InferenceSettings;
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    Decode(String),
}

/// One chat turn sent to the model: a system instruction, and a user turn
/// made of a text prompt and an inline image
#[derive(Clone)]
pub struct VisionPrompt<'a> {
    pub system: &'a str,
    pub text: &'a str,
    pub image_url: &'a str,
    pub max_tokens: u32,
}

impl Debug for VisionPrompt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "VisionPrompt {{ text: {:?}, image_url: <{} bytes>, max_tokens: {} }}",
            self.text,
            self.image_url.len(),
            self.max_tokens
        )
    }
}

/// A multimodal completion backend. Returns the text of the first choice, or
/// `None` when the service answered without content
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn complete(&self, prompt: &VisionPrompt<'_>) -> Result<Option<String>, InferenceError>;
}

mod protocol {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize)]
    pub struct ChatRequest<'a> {
        pub model: &'a str,
        pub messages: Vec<Message<'a>>,
        pub max_tokens: u32,
    }

    #[derive(Serialize)]
    #[serde(tag = "role", rename_all = "lowercase")]
    pub enum Message<'a> {
        System { content: &'a str },
        User { content: Vec<ContentPart<'a>> },
    }

    #[derive(Serialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub enum ContentPart<'a> {
        Text { text: &'a str },
        ImageUrl { image_url: ImageUrl<'a> },
    }

    #[derive(Serialize)]
    pub struct ImageUrl<'a> {
        pub url: &'a str,
    }

    #[derive(Deserialize)]
    pub struct ChatResponse {
        #[serde(default)]
        pub choices: Vec<Choice>,
    }

    #[derive(Deserialize)]
    pub struct Choice {
        pub message: ChoiceMessage,
    }

    #[derive(Deserialize)]
    pub struct ChoiceMessage {
        pub content: Option<String>,
    }

    #[derive(Deserialize)]
    pub struct ErrorResponse {
        pub error: ErrorDetail,
    }

    #[derive(Deserialize)]
    pub struct ErrorDetail {
        pub message: String,
    }
}

use protocol::*;

impl<'a> From<(&'a str, &'a VisionPrompt<'a>)> for ChatRequest<'a> {
    fn from((model, prompt): (&'a str, &'a VisionPrompt<'a>)) -> Self {
        ChatRequest {
            model,
            messages: vec![
                Message::System {
                    content: prompt.system,
                },
                Message::User {
                    content: vec![
                        ContentPart::Text { text: prompt.text },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: prompt.image_url,
                            },
                        },
                    ],
                },
            ],
            max_tokens: prompt.max_tokens,
        }
    }
}

/// Reduce an error body to the service's own message when it has one
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(res) => res.error.message,
        Err(_) => body.trim().to_string(),
    }
}

/// Chat completion client for OpenAI-compatible APIs
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "OpenAiClient {{ endpoint: {:?}, model: {:?}, api_key: <redacted> }}",
            self.endpoint, self.model
        )
    }
}

impl OpenAiClient {
    pub fn new(settings: &InferenceSettings) -> Result<Self, InferenceError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = settings.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(OpenAiClient {
            http: builder.build()?,
            endpoint: format!(
                "{}/chat/completions",
                settings.base_url.trim_end_matches('/')
            ),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl VisionModel for OpenAiClient {
    async fn complete(&self, prompt: &VisionPrompt<'_>) -> Result<Option<String>, InferenceError> {
        let body = ChatRequest::from((self.model.as_str(), prompt));

        debug!("sending completion request: {prompt:?}");
        let res = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            return Err(InferenceError::Api {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| InferenceError::Decode(e.to_string()))?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content))
    }
}

/// A scripted `VisionModel` for tests. Replies are handed out in order and
/// every prompt is recorded
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// What the double saw for a single call
    #[derive(Debug, Clone)]
    pub struct RecordedCall {
        pub system: String,
        pub text: String,
        pub image_url: String,
        pub max_tokens: u32,
    }

    #[derive(Default)]
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<Result<Option<String>, InferenceError>>>,
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl ScriptedModel {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, text: &str) -> Self {
            self.push(Ok(Some(text.to_string())))
        }

        pub fn no_content(self) -> Self {
            self.push(Ok(None))
        }

        pub fn fail(self, err: InferenceError) -> Self {
            self.push(Err(err))
        }

        fn push(self, reply: Result<Option<String>, InferenceError>) -> Self {
            self.replies.lock().unwrap().push_back(reply);
            self
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl VisionModel for ScriptedModel {
        async fn complete(
            &self,
            prompt: &VisionPrompt<'_>,
        ) -> Result<Option<String>, InferenceError> {
            self.calls.lock().unwrap().push(RecordedCall {
                system: prompt.system.to_string(),
                text: prompt.text.to_string(),
                image_url: prompt.image_url.to_string(),
                max_tokens: prompt.max_tokens,
            });

            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("scripted model ran out of replies")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings() -> InferenceSettings {
        InferenceSettings {
            api_key: "sk-test".into(),
            base_url: "https://example.invalid/v1/".into(),
            model: "gpt-4o-mini".into(),
            timeout_secs: None,
        }
    }

    #[test]
    fn request_body_matches_chat_api() {
        let prompt = VisionPrompt {
            system: "be brief",
            text: "what is this?",
            image_url: "data:image/png;base64,AAAA",
            max_tokens: 50,
        };

        let body = serde_json::to_value(ChatRequest::from(("gpt-4o-mini", &prompt))).unwrap();

        assert_eq!(
            body,
            json!({
                "model": "gpt-4o-mini",
                "max_tokens": 50,
                "messages": [
                    { "role": "system", "content": "be brief" },
                    {
                        "role": "user",
                        "content": [
                            { "type": "text", "text": "what is this?" },
                            {
                                "type": "image_url",
                                "image_url": { "url": "data:image/png;base64,AAAA" }
                            }
                        ]
                    }
                ]
            })
        );
    }

    #[test]
    fn error_body_is_reduced_to_message() {
        let body = r#"{"error":{"message":"Rate limit reached","type":"requests","code":"rate_limit_exceeded"}}"#;
        assert_eq!(error_message(body), "Rate limit reached");
        assert_eq!(error_message("  bad gateway\n"), "bad gateway");
    }

    #[test]
    fn response_without_choices_has_no_content() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"id":"x","choices":[]}"#).unwrap();
        assert!(parsed.choices.is_empty());

        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#)
                .unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }

    #[test]
    fn client_builds_endpoint_and_hides_key() {
        let client = OpenAiClient::new(&settings()).unwrap();
        assert_eq!(client.endpoint, "https://example.invalid/v1/chat/completions");
        assert_eq!(client.model(), "gpt-4o-mini");
        assert!(!format!("{client:?}").contains("sk-test"));
    }

    #[test]
    fn api_error_display_carries_upstream_message() {
        let err = InferenceError::Api {
            status: 429,
            message: "Rate limit reached".into(),
        };
        assert_eq!(err.to_string(), "status 429: Rate limit reached");
    }
}
