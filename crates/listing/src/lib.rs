pub mod config;
pub mod error;
pub mod flow;
pub mod flows;
pub mod llm;
pub mod media;
pub mod normalizer;
pub mod pricing;
pub mod prompt;
pub mod retry;
pub mod schema;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::{FeatureFlags, FlowConfig};
pub use error::{ErrorPayload, FlowError};
pub use flow::{Flow, FlowDefinition, FlowExecutor, FlowSummary};
pub use llm::{GeminiClient, GenerateRequest, GenerativeModel, OllamaClient};
pub use pricing::PriceRounding;
pub use retry::RetryConfig;
pub use types::{
    CreateListingInput, DescribeImageInput, DescribeImageOutput, ExtractTextInput, ExtractTextOutput,
    ListingOutput, ParseChatInput, ParseChatOutput,
};

use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;

use flows::{CreateListing, DescribeImage, ExtractFromText, ParseChat};

/// The named product-listing operations, sharing one executor and model client.
/// Holds no per-request state, so one instance serves concurrent callers.
pub struct ListingFlows {
    executor: FlowExecutor,
    describe_image: DescribeImage,
    create_listing: CreateListing,
    extract_from_text: ExtractFromText,
    parse_chat: ParseChat,
}

impl ListingFlows {
    pub fn new(model: Arc<dyn GenerativeModel>, config: FlowConfig) -> Self {
        Self {
            executor: FlowExecutor::new(model, &config),
            describe_image: DescribeImage::new(&config),
            create_listing: CreateListing::new(&config),
            extract_from_text: ExtractFromText::new(&config),
            parse_chat: ParseChat::new(&config),
        }
    }

    pub fn model_name(&self) -> &str {
        self.executor.model_name()
    }

    pub fn catalog(&self) -> Vec<FlowSummary> {
        vec![
            self.describe_image.definition().describe(),
            self.create_listing.definition().describe(),
            self.extract_from_text.definition().describe(),
            self.parse_chat.definition().describe(),
        ]
    }

    /// Model failures come back as an "AI Generation Failed" result, not an error
    pub async fn describe_image(&self, input: Value) -> Result<DescribeImageOutput, FlowError> {
        self.executor.run(&self.describe_image, input).await
    }

    /// Describe several photos concurrently. Results keep input order and
    /// each item succeeds, degrades or fails on its own.
    pub async fn describe_images(&self, inputs: Vec<Value>) -> Vec<Result<DescribeImageOutput, FlowError>> {
        join_all(inputs.into_iter().map(|input| self.describe_image(input))).await
    }

    pub async fn create_listing(&self, input: Value) -> Result<ListingOutput, FlowError> {
        self.executor.run(&self.create_listing, input).await
    }

    pub async fn extract_from_text(&self, input: Value) -> Result<ExtractTextOutput, FlowError> {
        self.executor.run(&self.extract_from_text, input).await
    }

    pub async fn parse_chat(&self, input: Value) -> Result<ParseChatOutput, FlowError> {
        self.executor.run(&self.parse_chat, input).await
    }
}
