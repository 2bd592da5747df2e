use serde::{Deserialize, Serialize};

pub const FAILED_TITLE: &str = "AI Generation Failed";
pub const FAILED_CATEGORY: &str = "error";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeImageInput {
    pub image_data_uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescribeImageOutput {
    pub title: String,
    pub description: String,
    pub category: String,
}

impl DescribeImageOutput {
    /// Placeholder returned instead of an error so batch uploads keep going
    pub fn failed(reason: &str) -> Self {
        Self {
            title: FAILED_TITLE.to_string(),
            description: format!("Could not generate a description for this image. Error: {}", reason),
            category: FAILED_CATEGORY.to_string(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.title == FAILED_TITLE && self.category == FAILED_CATEGORY
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateListingInput {
    pub image_data_uris: Vec<String>,
    pub description: String,
    pub cost: f64,
    pub margin: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingOutput {
    pub title: String,
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub price: u64,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractTextInput {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractTextOutput {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseChatInput {
    pub chat_text: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseChatOutput {
    pub products: Vec<ListingOutput>,
}
