//! SQS Queue integration for citation jobs
//!
//! Provides:
//! - SQS client wrapper with retry on send
//! - Message serialization/deserialization
//! - Approximate depth reading for batch throttling

use crate::errors::{AppError, Result};
use aws_sdk_sqs::types::{Message, QueueAttributeName};
use aws_sdk_sqs::Client as SqsClient;
use aws_types::region::Region;
use backoff::{future::retry, ExponentialBackoff};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// SQS queue configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Queue URL
    pub url: String,
    /// AWS region override
    pub region: Option<String>,
    /// Visibility timeout in seconds
    pub visibility_timeout: i32,
    /// Wait time for long polling (seconds)
    pub wait_time_seconds: i32,
    /// Maximum number of messages per poll
    pub max_messages: i32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            region: None,
            visibility_timeout: 900,
            wait_time_seconds: 20,
            max_messages: 10,
        }
    }
}

impl QueueConfig {
    /// Build a queue config for `url` using the application queue settings
    pub fn from_app(url: impl Into<String>, settings: &crate::config::QueueConfig) -> Self {
        Self {
            url: url.into(),
            region: settings.region.clone(),
            visibility_timeout: settings.visibility_timeout_secs,
            wait_time_seconds: settings.poll_timeout_secs,
            max_messages: settings.batch_size.clamp(1, 10),
        }
    }
}

/// SQS Queue client wrapper
pub struct Queue {
    client: SqsClient,
    config: QueueConfig,
}

impl Queue {
    /// Create a new queue client
    pub async fn new(config: QueueConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = config.region.clone() {
            loader = loader.region(Region::new(region));
        }
        let aws_config = loader.load().await;
        let client = SqsClient::new(&aws_config);

        Ok(Self { client, config })
    }

    /// Create with existing SQS client
    pub fn with_client(client: SqsClient, config: QueueConfig) -> Self {
        Self { client, config }
    }

    /// Queue URL this client targets
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Send a message to the queue, retrying transient failures
    pub async fn send<T: Serialize>(&self, message: &T) -> Result<String> {
        let body = serde_json::to_string(message).map_err(|e| AppError::QueueError {
            message: format!("Failed to serialize message: {}", e),
        })?;

        let policy = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(60)),
            ..Default::default()
        };

        let body = body.as_str();
        let result = retry(policy, || async move {
            self.client
                .send_message()
                .queue_url(&self.config.url)
                .message_body(body)
                .send()
                .await
                .map_err(|e| {
                    warn!(error = %e, "Send to queue failed, retrying");
                    backoff::Error::transient(AppError::QueueError {
                        message: format!("Failed to send message: {}", e),
                    })
                })
        })
        .await?;

        let message_id = result.message_id.unwrap_or_default();
        debug!(message_id = %message_id, "Message sent to queue");

        Ok(message_id)
    }

    /// Receive and decode messages. Undecodable messages are deleted and skipped.
    pub async fn receive<T: DeserializeOwned>(&self) -> Result<Vec<(T, String)>> {
        let result = self
            .client
            .receive_message()
            .queue_url(&self.config.url)
            .max_number_of_messages(self.config.max_messages)
            .visibility_timeout(self.config.visibility_timeout)
            .wait_time_seconds(self.config.wait_time_seconds)
            .send()
            .await
            .map_err(|e| AppError::QueueError {
                message: format!("Failed to receive messages: {}", e),
            })?;

        let messages = result.messages.unwrap_or_default();
        debug!(count = messages.len(), "Received messages from queue");

        let mut decoded = Vec::with_capacity(messages.len());
        for message in messages {
            let Some(receipt_handle) = message.receipt_handle.clone() else {
                continue;
            };
            match Self::parse_message::<T>(&message) {
                Ok(job) => decoded.push((job, receipt_handle)),
                Err(e) => {
                    warn!(error = %e, "Dropping malformed queue message");
                    self.delete(&receipt_handle).await?;
                }
            }
        }

        Ok(decoded)
    }

    /// Delete a message after processing
    pub async fn delete(&self, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.config.url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| AppError::QueueError {
                message: format!("Failed to delete message: {}", e),
            })?;

        debug!("Message deleted from queue");
        Ok(())
    }

    /// Approximate number of visible plus in-flight messages
    pub async fn approximate_depth(&self) -> Result<u64> {
        let result = self
            .client
            .get_queue_attributes()
            .queue_url(&self.config.url)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessagesNotVisible)
            .send()
            .await
            .map_err(|e| AppError::QueueError {
                message: format!("Failed to read queue attributes: {}", e),
            })?;

        let attributes = result.attributes.unwrap_or_default();
        let depth = [
            QueueAttributeName::ApproximateNumberOfMessages,
            QueueAttributeName::ApproximateNumberOfMessagesNotVisible,
        ]
        .iter()
        .filter_map(|name| attributes.get(name))
        .filter_map(|value| value.parse::<u64>().ok())
        .sum();

        Ok(depth)
    }

    /// Parse message body as JSON
    pub fn parse_message<T: DeserializeOwned>(message: &Message) -> Result<T> {
        let body = message.body.as_ref().ok_or_else(|| AppError::QueueError {
            message: "Message has no body".to_string(),
        })?;

        serde_json::from_str(body).map_err(|e| AppError::InvalidFormat {
            message: format!("Failed to parse message: {}", e),
        })
    }
}

/// Find-citations job: run the pipeline over a disjoint batch of opinions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindCitationsJob {
    pub job_id: Uuid,
    pub opinion_ids: Vec<i64>,
    #[serde(default)]
    pub attempt: u32,
}

impl FindCitationsJob {
    /// Create a job for a chunk of opinion ids
    pub fn new(opinion_ids: Vec<i64>) -> Self {
        Self {
            job_id: Uuid::now_v7(),
            opinion_ids,
            attempt: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_message_serialization() {
        let job = FindCitationsJob::new(vec![10, 11, 12]);

        let json = serde_json::to_string(&job).unwrap();
        let parsed: FindCitationsJob = serde_json::from_str(&json).unwrap();

        assert_eq!(job.job_id, parsed.job_id);
        assert_eq!(parsed.opinion_ids, vec![10, 11, 12]);
    }

    #[test]
    fn test_attempt_defaults_when_absent() {
        let json = r#"{"job_id":"0190a7c4-5b1e-7000-8000-000000000000","opinion_ids":[1]}"#;
        let parsed: FindCitationsJob = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.attempt, 0);
    }

    #[test]
    fn test_queue_config_clamps_batch_size() {
        let mut settings = crate::config::QueueConfig::default();
        settings.batch_size = 50;
        let config = QueueConfig::from_app("https://sqs.local/q", &settings);
        assert_eq!(config.max_messages, 10);
        assert_eq!(config.url, "https://sqs.local/q");
    }
}
