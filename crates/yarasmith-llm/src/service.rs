//! The text service capability and its genai implementation.

use async_trait::async_trait;
use genai::chat::{ChatMessage, ChatRequest};
use genai::resolver::{AuthData, Endpoint, ServiceTargetResolver};
use genai::{Client, ModelIden, ServiceTarget, adapter::AdapterKind};
use tracing::debug;

use yarasmith_core::ServiceError;

/// A synchronous request/response text capability.
///
/// Generation, correction and pattern services are all instances of this
/// trait, so retry and budgeting are layered on once.
#[async_trait]
pub trait TextService: Send + Sync {
    async fn request(&self, context: &str) -> Result<String, ServiceError>;
}

#[async_trait]
impl<T: TextService + ?Sized> TextService for std::sync::Arc<T> {
    async fn request(&self, context: &str) -> Result<String, ServiceError> {
        (**self).request(context).await
    }
}

/// Chat-completion backed service using the genai client.
pub struct GenaiService {
    client: Client,
    model: String,
    system_prompt: String,
}

impl GenaiService {
    pub fn new(model: impl Into<String>, api_base_url: Option<&str>) -> Self {
        let mut client_builder = Client::builder();

        if let Some(base_url) = api_base_url {
            client_builder = client_builder.with_service_target_resolver(create_target_resolver(base_url));
        }

        Self {
            client: client_builder.build(),
            model: model.into(),
            system_prompt: "You are a malware analyst who writes precise YARA rules and regular expressions. Answer with the requested artifact only.".to_string(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn create_target_resolver(base_url: &str) -> ServiceTargetResolver {
    let base_url_owned = base_url.to_string();

    ServiceTargetResolver::from_resolver_fn(
        move |service_target: ServiceTarget| -> Result<ServiceTarget, genai::resolver::Error> {
            let ServiceTarget { model, .. } = service_target;

            // Custom endpoints are assumed to speak the OpenAI protocol
            let endpoint = Endpoint::from_owned(base_url_owned.clone());
            let model = ModelIden::new(AdapterKind::OpenAI, model.model_name);
            let auth = AuthData::from_env("OPENAI_API_KEY");
            Ok(ServiceTarget {
                endpoint,
                auth,
                model,
            })
        },
    )
}

/// Sort a client error into retryable and fatal.
pub(crate) fn classify_error(message: &str) -> ServiceError {
    let lower = message.to_lowercase();
    let permanent_markers = [
        "401",
        "403",
        "400 bad request",
        "unauthorized",
        "invalid api key",
        "incorrect api key",
        "api key not",
        "missing api key",
        "model not found",
        "does not exist",
    ];

    if permanent_markers.iter().any(|marker| lower.contains(marker)) {
        ServiceError::Permanent(message.to_string())
    } else {
        ServiceError::Transient(message.to_string())
    }
}

#[async_trait]
impl TextService for GenaiService {
    async fn request(&self, context: &str) -> Result<String, ServiceError> {
        let chat_req = ChatRequest::new(vec![
            ChatMessage::system(&self.system_prompt),
            ChatMessage::user(context),
        ]);

        debug!(model = %self.model, prompt_len = context.len(), "sending chat request");

        let chat_res = self
            .client
            .exec_chat(&self.model, chat_req, None)
            .await
            .map_err(|e| classify_error(&e.to_string()))?;

        chat_res
            .first_text()
            .map(|text| text.trim().to_string())
            .ok_or_else(|| ServiceError::Transient("response contained no text".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failures_are_permanent() {
        assert!(matches!(
            classify_error("Web call failed: 401 Unauthorized"),
            ServiceError::Permanent(_)
        ));
        assert!(matches!(
            classify_error("Incorrect API key provided"),
            ServiceError::Permanent(_)
        ));
    }

    #[test]
    fn test_rate_limits_are_transient() {
        assert!(classify_error("429 Too Many Requests").is_transient());
        assert!(classify_error("connection reset by peer").is_transient());
    }
}
