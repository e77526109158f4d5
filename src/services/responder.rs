use crate::error::{Result, SessionError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Trait for response generation: user transcript in, spoken reply out.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
impl<T: Responder + ?Sized> Responder for Arc<T> {
    async fn generate(&self, prompt: &str) -> Result<String> {
        (**self).generate(prompt).await
    }
}

/// Mock responder for testing
#[derive(Debug, Clone)]
pub struct MockResponder {
    response: Option<String>,
    should_fail: bool,
    delay: Duration,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockResponder {
    /// Create a mock that echoes the prompt back
    pub fn echo() -> Self {
        Self {
            response: None,
            should_fail: false,
            delay: Duration::ZERO,
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Configure the mock to return a fixed response
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = Some(response.to_string());
        self
    }

    /// Configure the mock to fail on generate
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Configure the mock to take `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Prompts received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Responder for MockResponder {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.should_fail {
            return Err(SessionError::Generation {
                message: "mock generation failure".to_string(),
            });
        }
        Ok(self.response.clone().unwrap_or_else(|| prompt.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_responder() {
        let responder = MockResponder::echo();
        assert_eq!(responder.generate("hello there").await.unwrap(), "hello there");
        assert_eq!(responder.prompts(), vec!["hello there".to_string()]);
    }

    #[tokio::test]
    async fn test_fixed_response_and_failure() {
        let responder = MockResponder::echo().with_response("It is sunny.");
        assert_eq!(responder.generate("weather?").await.unwrap(), "It is sunny.");

        let failing = MockResponder::echo().with_failure();
        assert!(matches!(
            failing.generate("weather?").await,
            Err(SessionError::Generation { .. })
        ));
    }
}
