//! AI-assisted suggestions: pricing, descriptions, market insight, and
//! enquiry summaries.
//!
//! Every invocation is audited: a row is opened before the provider call and
//! completed with output or error after. Provider calls run under the batch
//! timeout, so a stuck upstream never wedges a job.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use clawdbot_core::config::AiConfig;
use clawdbot_core::domain::{AiRequest, AiRequestKind, Enquiry, Property};
use clawdbot_core::error::{BotError, Result};
use clawdbot_core::store::{EnquiryStore, PropertyStore};

use crate::audit::AuditDb;

/// One completion from a provider.
#[derive(Debug, Clone)]
pub struct AiCompletion {
    pub text: String,
    pub tokens_used: u32,
}

/// Seam to the model provider.
#[async_trait]
pub trait AiProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<AiCompletion>;
}

/// Canned-reply provider for tests and offline runs.
pub struct StaticProvider {
    pub reply: String,
    pub tokens: u32,
}

impl StaticProvider {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            tokens: 10,
        }
    }
}

#[async_trait]
impl AiProvider for StaticProvider {
    async fn complete(&self, _prompt: &str) -> Result<AiCompletion> {
        Ok(AiCompletion {
            text: self.reply.clone(),
            tokens_used: self.tokens,
        })
    }
}

/// OpenAI-compatible chat-completions provider.
pub struct OpenAiProvider {
    client: reqwest::Client,
    config: AiConfig,
}

impl OpenAiProvider {
    pub fn new(config: AiConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BotError::Upstream(format!("http client: {e}")))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        if self.config.endpoint.is_empty() {
            "https://api.openai.com/v1/chat/completions".to_string()
        } else {
            self.config.endpoint.clone()
        }
    }
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    async fn complete(&self, prompt: &str) -> Result<AiCompletion> {
        let body = json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        });
        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BotError::Upstream(format!("ai provider: {e}")))?;
        if !resp.status().is_success() {
            return Err(BotError::Upstream(format!(
                "ai provider returned {}",
                resp.status()
            )));
        }
        let parsed: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| BotError::Upstream(format!("ai provider body: {e}")))?;
        let text = parsed["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| BotError::Upstream("ai provider: empty completion".into()))?
            .to_string();
        let tokens_used = parsed["usage"]["total_tokens"].as_u64().unwrap_or(0) as u32;
        Ok(AiCompletion { text, tokens_used })
    }
}

pub struct SuggestionService {
    config: AiConfig,
    provider: Arc<dyn AiProvider>,
    call_timeout: Duration,
}

impl SuggestionService {
    pub fn new(config: AiConfig, provider: Arc<dyn AiProvider>, call_timeout: Duration) -> Self {
        Self {
            config,
            provider,
            call_timeout,
        }
    }

    /// Pick a provider from config. Anything but a keyed "openai" setup gets
    /// the offline canned provider.
    pub fn from_config(config: &AiConfig, call_timeout: Duration) -> Result<Self> {
        let provider: Arc<dyn AiProvider> =
            if config.provider == "openai" && !config.api_key.is_empty() {
                Arc::new(OpenAiProvider::new(config.clone(), call_timeout)?)
            } else {
                Arc::new(StaticProvider::new("(ai provider not configured)"))
            };
        Ok(Self::new(config.clone(), provider, call_timeout))
    }

    fn check_enabled(&self) -> Result<()> {
        if !self.config.enabled {
            return Err(BotError::Validation("ai assistance is disabled".into()));
        }
        Ok(())
    }

    /// Run one audited provider call under the batch timeout.
    async fn call(
        &self,
        kind: AiRequestKind,
        requested_by: Uuid,
        input: serde_json::Value,
        prompt: &str,
        audit: &AuditDb,
    ) -> Result<AiCompletion> {
        self.check_enabled()?;
        let req = AiRequest::begin(kind, requested_by, input);
        audit.ai_begin(&req)?;

        let outcome = tokio::time::timeout(self.call_timeout, self.provider.complete(prompt))
            .await
            .unwrap_or_else(|_| Err(BotError::Upstream("ai provider timed out".into())));

        match outcome {
            Ok(completion) => {
                audit.ai_complete(
                    req.id,
                    Some(&json!({"text": completion.text})),
                    completion.tokens_used,
                    None,
                )?;
                Ok(completion)
            }
            Err(e) => {
                audit.ai_complete(req.id, None, 0, Some(&e.to_string()))?;
                tracing::warn!("{kind} suggestion failed: {e}");
                Err(e)
            }
        }
    }

    /// Suggest a price for a listing and store it on the record.
    pub async fn suggest_price(
        &self,
        property: &Property,
        peers: &[Property],
        requested_by: Uuid,
        store: &dyn PropertyStore,
        audit: &AuditDb,
    ) -> Result<i64> {
        let comparable: Vec<i64> = peers
            .iter()
            .filter(|p| p.id != property.id && p.category == property.category && p.price > 0)
            .map(|p| p.price)
            .collect();
        let prompt = format!(
            "Suggest a monthly price for this listing as a single integer.\n\
             Title: {}\nCategory: {}\nCurrent price: {}\nComparable prices: {:?}",
            property.title, property.category, property.price, comparable
        );
        let completion = self
            .call(
                AiRequestKind::Price,
                requested_by,
                json!({"property_id": property.id, "comparables": comparable.len()}),
                &prompt,
                audit,
            )
            .await?;

        let price = first_integer(&completion.text).ok_or_else(|| {
            BotError::Upstream("ai provider returned no usable price".into())
        })?;
        store.record_suggestion(property.id, Some(price), None)?;
        Ok(price)
    }

    /// Generate a listing description and store it on the record.
    pub async fn generate_description(
        &self,
        property: &Property,
        requested_by: Uuid,
        store: &dyn PropertyStore,
        audit: &AuditDb,
    ) -> Result<String> {
        let prompt = format!(
            "Write a short, factual listing description.\n\
             Title: {}\nCategory: {}\nPrice: {}",
            property.title, property.category, property.price
        );
        let completion = self
            .call(
                AiRequestKind::Description,
                requested_by,
                json!({"property_id": property.id}),
                &prompt,
                audit,
            )
            .await?;
        store.record_suggestion(property.id, None, Some(completion.text.clone()))?;
        Ok(completion.text)
    }

    /// Free-form market insight for a category. Nothing is stored beyond the
    /// audit row; the caller renders the text.
    pub async fn market_insights(
        &self,
        category: &str,
        requested_by: Uuid,
        audit: &AuditDb,
    ) -> Result<String> {
        let prompt = format!("Summarize current market trends for the '{category}' category.");
        let completion = self
            .call(
                AiRequestKind::Market,
                requested_by,
                json!({"category": category}),
                &prompt,
                audit,
            )
            .await?;
        Ok(completion.text)
    }

    /// Summarize an enquiry thread and store the summary on the enquiry.
    pub async fn summarize_enquiry(
        &self,
        enquiry: &Enquiry,
        requested_by: Uuid,
        store: &dyn EnquiryStore,
        audit: &AuditDb,
    ) -> Result<String> {
        let prompt = format!(
            "Summarize this enquiry in one sentence for the agent:\n{}",
            enquiry.message
        );
        let completion = self
            .call(
                AiRequestKind::Enquiry,
                requested_by,
                json!({"enquiry_id": enquiry.id}),
                &prompt,
                audit,
            )
            .await?;
        store.set_summary(enquiry.id, &completion.text)?;
        Ok(completion.text)
    }
}

/// First integer in a completion, ignoring thousands separators.
fn first_integer(text: &str) -> Option<i64> {
    let mut digits = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if !digits.is_empty() && c != ',' {
            break;
        }
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawdbot_core::store::MemoryStore;

    fn svc(reply: &str) -> SuggestionService {
        SuggestionService::new(
            AiConfig::default(),
            Arc::new(StaticProvider::new(reply)),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_price_suggestion_stored_and_audited() {
        let store = MemoryStore::new();
        let audit = AuditDb::open_in_memory().unwrap();
        let p = Property::new(Uuid::new_v4(), "flat", 900, "apartment");
        PropertyStore::insert(&store, p.clone()).unwrap();

        let price = svc("I suggest 1,250 per month")
            .suggest_price(&p, &[], p.agent_id, &store, &audit)
            .await
            .unwrap();
        assert_eq!(price, 1250);
        assert_eq!(store.get(p.id).unwrap().unwrap().suggested_price, Some(1250));

        let recent = audit.recent_ai(5).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0]["kind"], "price");
        assert!(recent[0]["completed_at"].is_string());
    }

    #[tokio::test]
    async fn test_description_stored() {
        let store = MemoryStore::new();
        let audit = AuditDb::open_in_memory().unwrap();
        let p = Property::new(Uuid::new_v4(), "flat", 900, "apartment");
        PropertyStore::insert(&store, p.clone()).unwrap();

        let text = svc("Bright two-bedroom apartment.")
            .generate_description(&p, p.agent_id, &store, &audit)
            .await
            .unwrap();
        assert_eq!(
            store.get(p.id).unwrap().unwrap().ai_description,
            Some(text)
        );
    }

    #[tokio::test]
    async fn test_enquiry_summary_stored() {
        let store = MemoryStore::new();
        let audit = AuditDb::open_in_memory().unwrap();
        let e = Enquiry::new(Uuid::new_v4(), Uuid::new_v4(), "Is parking included? Can I view Saturday?");
        EnquiryStore::insert(&store, e.clone()).unwrap();

        svc("Wants a Saturday viewing, asks about parking.")
            .summarize_enquiry(&e, e.user_id, &store, &audit)
            .await
            .unwrap();
        let stored = EnquiryStore::all(&store).unwrap();
        assert!(stored[0].ai_summary.as_deref().unwrap().contains("Saturday"));
    }

    #[tokio::test]
    async fn test_disabled_ai_declines_without_audit_row() {
        let audit = AuditDb::open_in_memory().unwrap();
        let config = AiConfig {
            enabled: false,
            ..Default::default()
        };
        let svc = SuggestionService::new(
            config,
            Arc::new(StaticProvider::new("x")),
            Duration::from_secs(5),
        );
        let err = svc
            .market_insights("apartment", Uuid::new_v4(), &audit)
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::Validation(_)));
        assert!(audit.recent_ai(5).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unusable_price_reply_is_upstream_error() {
        let store = MemoryStore::new();
        let audit = AuditDb::open_in_memory().unwrap();
        let p = Property::new(Uuid::new_v4(), "flat", 900, "apartment");
        PropertyStore::insert(&store, p.clone()).unwrap();

        let err = svc("no idea, sorry")
            .suggest_price(&p, &[], p.agent_id, &store, &audit)
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::Upstream(_)));
        assert_eq!(store.get(p.id).unwrap().unwrap().suggested_price, None);
    }

    #[test]
    fn test_first_integer() {
        assert_eq!(first_integer("about 1,200 eur"), Some(1200));
        assert_eq!(first_integer("1500"), Some(1500));
        assert_eq!(first_integer("none"), None);
    }
}
