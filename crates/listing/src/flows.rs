use serde_json::{Value, json};

use crate::config::FlowConfig;
use crate::error::FlowError;
use crate::flow::{Flow, FlowDefinition, decode_output, input_error, output_error};
use crate::media::MediaRef;
use crate::normalizer::ListingNormalizer;
use crate::pricing::{MAX_PRICE, PriceRounding, selling_price};
use crate::prompt::{self, RenderedPrompt};
use crate::schema::{self, FieldError};
use crate::types::{
    CreateListingInput, DescribeImageInput, DescribeImageOutput, ExtractTextInput, ExtractTextOutput,
    ListingOutput, ParseChatInput, ParseChatOutput,
};

pub const DESCRIBE_IMAGE: &str = "describe-image";
pub const CREATE_LISTING: &str = "create-listing";
pub const EXTRACT_FROM_TEXT: &str = "extract-from-text";
pub const PARSE_CHAT: &str = "parse-chat";

fn parse_media(path: &str, uri: &str) -> Result<MediaRef, FieldError> {
    MediaRef::from_data_uri(uri).map_err(|e| {
        FieldError::new(path, "data URI 'data:<mimetype>;base64,<encoded_data>'", e.to_string())
    })
}

fn finish_listing(
    flow: &str,
    normalizer: &ListingNormalizer,
    listing: &mut ListingOutput,
) -> Result<(), FlowError> {
    normalizer.normalize(listing);
    normalizer.check_title(&listing.title).map_err(|chars| {
        output_error(
            flow,
            format!("title is {} characters, limit is {}", chars, normalizer.title_limit()),
            Vec::new(),
        )
    })
}

pub struct DescribeImage {
    definition: FlowDefinition,
    normalizer: ListingNormalizer,
}

impl DescribeImage {
    pub fn new(config: &FlowConfig) -> Self {
        Self {
            definition: FlowDefinition {
                name: DESCRIBE_IMAGE,
                summary: "Title, description and category for a single product photo",
                input: schema::describe_image_input(),
                output: schema::describe_image_output(),
                degrade_on_failure: true,
            },
            normalizer: ListingNormalizer::new(config.features.enforce_title_limit),
        }
    }
}

impl Flow for DescribeImage {
    type Input = DescribeImageInput;
    type Output = DescribeImageOutput;

    fn definition(&self) -> &FlowDefinition {
        &self.definition
    }

    fn render(&self, input: &DescribeImageInput) -> Result<RenderedPrompt, Vec<FieldError>> {
        let media = parse_media("imageDataUri", &input.image_data_uri).map_err(|e| vec![e])?;
        Ok(prompt::build_describe_image_prompt(media, &self.definition.output))
    }

    fn finish(&self, _input: &DescribeImageInput, output: Value) -> Result<DescribeImageOutput, FlowError> {
        let mut described: DescribeImageOutput = decode_output(DESCRIBE_IMAGE, output)?;
        described.title = self.normalizer.clean_text(&described.title).replace('\n', " ");
        described.description = self.normalizer.clean_text(&described.description);
        described.category = self.normalizer.clean_text(&described.category);
        Ok(described)
    }

    fn degraded(&self, reason: &str) -> Option<DescribeImageOutput> {
        Some(DescribeImageOutput::failed(reason))
    }
}

pub struct CreateListing {
    definition: FlowDefinition,
    normalizer: ListingNormalizer,
    pricing: PriceRounding,
}

impl CreateListing {
    pub fn new(config: &FlowConfig) -> Self {
        Self {
            definition: FlowDefinition {
                name: CREATE_LISTING,
                summary: "Full listing with price, sizes and colors from photos and vendor text",
                input: schema::create_listing_input(),
                output: schema::listing_output(),
                degrade_on_failure: false,
            },
            normalizer: ListingNormalizer::new(config.features.enforce_title_limit),
            pricing: config.pricing,
        }
    }
}

impl Flow for CreateListing {
    type Input = CreateListingInput;
    type Output = ListingOutput;

    fn definition(&self) -> &FlowDefinition {
        &self.definition
    }

    fn check(&self, input: &CreateListingInput) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if input.image_data_uris.is_empty() && input.description.trim().is_empty() {
            errors.push(FieldError::new(
                "imageDataUris",
                "at least one image or a non-empty description",
                "no images and an empty description",
            ));
        }
        if selling_price(input.cost, input.margin, self.pricing).is_none() {
            errors.push(price_range_error(input));
        }
        errors
    }

    fn render(&self, input: &CreateListingInput) -> Result<RenderedPrompt, Vec<FieldError>> {
        let mut media = Vec::with_capacity(input.image_data_uris.len());
        let mut errors = Vec::new();

        for (i, uri) in input.image_data_uris.iter().enumerate() {
            match parse_media(&format!("imageDataUris[{}]", i), uri) {
                Ok(m) => media.push(m),
                Err(e) => errors.push(e),
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(prompt::build_create_listing_prompt(input, media, &self.definition.output))
    }

    fn finish(&self, input: &CreateListingInput, mut output: Value) -> Result<ListingOutput, FlowError> {
        // the price is always ours, whatever the model computed
        let price = selling_price(input.cost, input.margin, self.pricing)
            .ok_or_else(|| input_error(CREATE_LISTING, vec![price_range_error(input)]))?;
        output["price"] = json!(price);

        let mut listing: ListingOutput = decode_output(CREATE_LISTING, output)?;
        finish_listing(CREATE_LISTING, &self.normalizer, &mut listing)?;
        Ok(listing)
    }
}

fn price_range_error(input: &CreateListingInput) -> FieldError {
    FieldError::new(
        "cost",
        format!("cost and margin giving a price of at most {}", MAX_PRICE),
        format!("cost {} at margin {}%", input.cost, input.margin),
    )
}

pub struct ExtractFromText {
    definition: FlowDefinition,
    normalizer: ListingNormalizer,
}

impl ExtractFromText {
    pub fn new(config: &FlowConfig) -> Self {
        Self {
            definition: FlowDefinition {
                name: EXTRACT_FROM_TEXT,
                summary: "Title and description from free text",
                input: schema::extract_text_input(),
                output: schema::extract_text_output(),
                degrade_on_failure: false,
            },
            normalizer: ListingNormalizer::new(config.features.enforce_title_limit),
        }
    }
}

impl Flow for ExtractFromText {
    type Input = ExtractTextInput;
    type Output = ExtractTextOutput;

    fn definition(&self) -> &FlowDefinition {
        &self.definition
    }

    fn render(&self, input: &ExtractTextInput) -> Result<RenderedPrompt, Vec<FieldError>> {
        Ok(prompt::build_extract_text_prompt(input, &self.definition.output))
    }

    fn finish(&self, _input: &ExtractTextInput, output: Value) -> Result<ExtractTextOutput, FlowError> {
        let mut extracted: ExtractTextOutput = decode_output(EXTRACT_FROM_TEXT, output)?;
        extracted.title = self.normalizer.clean_text(&extracted.title).replace('\n', " ");
        extracted.description = self.normalizer.clean_text(&extracted.description);
        Ok(extracted)
    }
}

pub struct ParseChat {
    definition: FlowDefinition,
    normalizer: ListingNormalizer,
    pricing: PriceRounding,
    enabled: bool,
}

impl ParseChat {
    pub fn new(config: &FlowConfig) -> Self {
        Self {
            definition: FlowDefinition {
                name: PARSE_CHAT,
                summary: "Every distinct product offered in a WhatsApp chat export",
                input: schema::parse_chat_input(),
                output: schema::parse_chat_output(),
                degrade_on_failure: false,
            },
            normalizer: ListingNormalizer::new(config.features.enforce_title_limit),
            pricing: config.pricing,
            enabled: config.features.chat_import,
        }
    }
}

impl Flow for ParseChat {
    type Input = ParseChatInput;
    type Output = ParseChatOutput;

    fn definition(&self) -> &FlowDefinition {
        &self.definition
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn render(&self, input: &ParseChatInput) -> Result<RenderedPrompt, Vec<FieldError>> {
        Ok(prompt::build_parse_chat_prompt(input, &self.definition.output))
    }

    fn finish(&self, _input: &ParseChatInput, mut output: Value) -> Result<ParseChatOutput, FlowError> {
        if let Some(products) = output["products"].as_array_mut() {
            for (i, product) in products.iter_mut().enumerate() {
                let quoted = product.get("price").and_then(Value::as_f64).unwrap_or(0.0);
                let Some(price) = self.pricing.round(quoted) else {
                    return Err(output_error(
                        PARSE_CHAT,
                        "product price out of range",
                        vec![FieldError::new(
                            format!("products[{}].price", i),
                            format!("number <= {}", MAX_PRICE),
                            quoted.to_string(),
                        )],
                    ));
                };
                product["price"] = json!(price);
            }
        }

        let mut parsed: ParseChatOutput = decode_output(PARSE_CHAT, output)?;
        for product in &mut parsed.products {
            finish_listing(PARSE_CHAT, &self.normalizer, product)?;
        }
        Ok(parsed)
    }
}
