use crate::media::MediaRef;
use crate::schema::Schema;
use crate::types::{CreateListingInput, ExtractTextInput, ParseChatInput};

/// Instruction text plus the media the model receives alongside it
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPrompt {
    pub text: String,
    pub media: Vec<MediaRef>,
}

fn output_section(output: &Schema) -> String {
    format!(
        "OUTPUT FIELDS:\n{}\nOutput ONLY a JSON object with these fields, no markdown, no explanations.\n\nJSON OUTPUT:",
        output.describe_fields()
    )
}

pub fn build_describe_image_prompt(media: MediaRef, output: &Schema) -> RenderedPrompt {
    let text = format!(
        r#"You are an expert e-commerce copywriter. Look at the attached product photo and write a listing for it.

INSTRUCTIONS:
1. Identify what the product is from the image alone
2. Write a concise, appealing title
3. Write a detailed, engaging description a shopper would want to read
4. Suggest the category the product belongs to

{}"#,
        output_section(output)
    );

    RenderedPrompt { text, media: vec![media] }
}

pub fn build_create_listing_prompt(
    input: &CreateListingInput,
    media: Vec<MediaRef>,
    output: &Schema,
) -> RenderedPrompt {
    let images_line = match media.len() {
        0 => "No product photos were provided; rely on the vendor description.".to_string(),
        1 => "Use the attached product photo together with the vendor description.".to_string(),
        n => format!("Use all {} attached product photos together with the vendor description.", n),
    };

    let text = format!(
        r#"You are an expert e-commerce merchandiser creating a product listing for an online store.

{}

VENDOR DESCRIPTION:
{}

PRICING:
- Cost: {}
- Margin: {}%
- Selling price = cost * (1 + margin / 100), rounded to the nearest whole number

RULES:
- Title must be SEO-friendly and at most 60 characters
- Description should be well formatted, highlight materials, fit and care
- Category is a path such as 'Clothing > Women > Kurtas'
- List sizes and colors exactly in the order the vendor mentions them; use empty lists if none are mentioned

{}"#,
        images_line,
        input.description.trim(),
        input.cost,
        input.margin,
        output_section(output)
    );

    RenderedPrompt { text, media }
}

pub fn build_extract_text_prompt(input: &ExtractTextInput, output: &Schema) -> RenderedPrompt {
    let text = format!(
        r#"Extract a product title and a product description from the following text.

RULES:
- Keep only product information; drop greetings, prices, phone numbers and chatter
- Do not invent details that are not in the text

TEXT:
{}

{}"#,
        input.text,
        output_section(output)
    );

    RenderedPrompt { text, media: Vec::new() }
}

fn date_range_line(start: Option<&str>, end: Option<&str>) -> String {
    match (start, end) {
        (Some(start), Some(end)) => format!("Only consider messages sent between {} and {} (inclusive).", start, end),
        (Some(start), None) => format!("Only consider messages sent on or after {}.", start),
        (None, Some(end)) => format!("Only consider messages sent on or before {}.", end),
        (None, None) => "Consider the entire chat history.".to_string(),
    }
}

pub fn build_parse_chat_prompt(input: &ParseChatInput, output: &Schema) -> RenderedPrompt {
    let text = format!(
        r#"You are reading an exported WhatsApp chat between a shop owner and a supplier. Find every distinct product offered in it.

DATE RANGE:
{}

INSTRUCTIONS:
1. Create one product entry per distinct product; merge repeated mentions of the same product
2. Keep products in the order they first appear in the chat
3. Use the price stated in the chat, or 0 if none is given
4. List sizes and colors in the order they are mentioned
5. If the chat contains no products, return an empty products list

CHAT:
{}

{}"#,
        date_range_line(input.start_date.as_deref(), input.end_date.as_deref()),
        input.chat_text,
        output_section(output)
    );

    RenderedPrompt { text, media: Vec::new() }
}
