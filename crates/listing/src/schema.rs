use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::fmt;

use crate::media::MediaRef;

/// Shape of a single field. The same definition drives validation,
/// the prompt field list and the JSON schema sent to the model.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Text,
    /// `data:<mime>;base64,<payload>`
    DataUri,
    /// ISO-8601 date or date-time
    Date,
    Number { min: Option<f64> },
    TextList,
    DataUriList,
    ObjectList(Box<Schema>),
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub description: &'static str,
}

#[derive(Debug, Clone)]
pub struct Schema {
    pub name: &'static str,
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub path: String,
    pub expected: String,
    pub actual: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: expected {}, got {}", self.path, self.expected, self.actual)
    }
}

impl FieldSpec {
    pub fn required(name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        Self { name, kind, required: true, description }
    }

    pub fn optional(name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        Self { name, kind, required: false, description }
    }
}

impl FieldKind {
    fn type_name(&self) -> &'static str {
        match self {
            FieldKind::Text => "string",
            FieldKind::DataUri => "data URI string",
            FieldKind::Date => "ISO-8601 date string",
            FieldKind::Number { .. } => "number",
            FieldKind::TextList => "array of strings",
            FieldKind::DataUriList => "array of data URI strings",
            FieldKind::ObjectList(_) => "array of objects",
        }
    }

    fn check(&self, path: &str, value: &Value, errors: &mut Vec<FieldError>) {
        match self {
            FieldKind::Text => {
                if !value.is_string() {
                    errors.push(FieldError::new(path, "string", describe_value(value)));
                }
            }
            FieldKind::DataUri => match value.as_str() {
                Some(uri) => {
                    if let Err(e) = MediaRef::from_data_uri(uri) {
                        errors.push(FieldError::new(
                            path,
                            "data URI 'data:<mimetype>;base64,<encoded_data>'",
                            format!("string with {}", e),
                        ));
                    }
                }
                None => errors.push(FieldError::new(path, "data URI string", describe_value(value))),
            },
            FieldKind::Date => match value.as_str() {
                Some(s) if is_iso_date(s) => {}
                Some(s) => errors.push(FieldError::new(path, "ISO-8601 date", format!("\"{}\"", s))),
                None => errors.push(FieldError::new(path, "ISO-8601 date string", describe_value(value))),
            },
            FieldKind::Number { min } => match value.as_f64() {
                Some(n) if !n.is_finite() => {
                    errors.push(FieldError::new(path, "finite number", n.to_string()));
                }
                Some(n) => {
                    if let Some(min) = min {
                        if n < *min {
                            errors.push(FieldError::new(path, format!("number >= {}", min), n.to_string()));
                        }
                    }
                }
                None => errors.push(FieldError::new(path, "number", describe_value(value))),
            },
            FieldKind::TextList => check_items(path, value, errors, |item_path, item, errors| {
                FieldKind::Text.check(item_path, item, errors)
            }),
            FieldKind::DataUriList => check_items(path, value, errors, |item_path, item, errors| {
                FieldKind::DataUri.check(item_path, item, errors)
            }),
            FieldKind::ObjectList(schema) => check_items(path, value, errors, |item_path, item, errors| {
                schema.validate_at(item_path, item, errors)
            }),
        }
    }

    fn json_schema(&self, description: &str) -> Value {
        match self {
            FieldKind::Text | FieldKind::DataUri => json!({"type": "string", "description": description}),
            FieldKind::Date => json!({"type": "string", "format": "date", "description": description}),
            FieldKind::Number { min } => {
                let mut schema = json!({"type": "number", "description": description});
                if let Some(min) = min {
                    schema["minimum"] = json!(min);
                }
                schema
            }
            FieldKind::TextList | FieldKind::DataUriList => json!({
                "type": "array",
                "items": {"type": "string"},
                "description": description,
            }),
            FieldKind::ObjectList(schema) => json!({
                "type": "array",
                "items": schema.to_json_schema(),
                "description": description,
            }),
        }
    }
}

fn check_items<F>(path: &str, value: &Value, errors: &mut Vec<FieldError>, mut check: F)
where
    F: FnMut(&str, &Value, &mut Vec<FieldError>),
{
    match value.as_array() {
        Some(items) => {
            for (i, item) in items.iter().enumerate() {
                check(&format!("{}[{}]", path, i), item, errors);
            }
        }
        None => errors.push(FieldError::new(path, "array", describe_value(value))),
    }
}

fn is_iso_date(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok()
        || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("boolean {}", b),
        Value::Number(n) => format!("number {}", n),
        Value::String(_) => "string".to_string(),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}

impl Schema {
    pub fn new(name: &'static str, fields: Vec<FieldSpec>) -> Self {
        Self { name, fields }
    }

    /// Check `value` against this schema, collecting every offending field.
    /// Fields not named by the schema are ignored.
    pub fn validate(&self, value: &Value) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        self.validate_at("", value, &mut errors);
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Remove `null` members, which validation already treats as absent, so
    /// typed decoding falls back to the field defaults. Recurses into object lists.
    pub fn strip_nulls(&self, value: &mut Value) {
        let Some(object) = value.as_object_mut() else {
            return;
        };

        for field in &self.fields {
            if matches!(object.get(field.name), Some(Value::Null)) {
                object.remove(field.name);
                continue;
            }
            if let (FieldKind::ObjectList(inner), Some(Value::Array(items))) =
                (&field.kind, object.get_mut(field.name))
            {
                for item in items {
                    inner.strip_nulls(item);
                }
            }
        }
    }

    fn validate_at(&self, prefix: &str, value: &Value, errors: &mut Vec<FieldError>) {
        let Some(object) = value.as_object() else {
            let path = if prefix.is_empty() { "$" } else { prefix };
            errors.push(FieldError::new(path, format!("{} object", self.name), describe_value(value)));
            return;
        };

        for field in &self.fields {
            let path = if prefix.is_empty() {
                field.name.to_string()
            } else {
                format!("{}.{}", prefix, field.name)
            };

            match object.get(field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        errors.push(FieldError::new(path, field.kind.type_name(), "nothing"));
                    }
                }
                Some(value) => field.kind.check(&path, value, errors),
            }
        }
    }

    /// Field list as prompt text, one line per field
    pub fn describe_fields(&self) -> String {
        let mut out = String::new();
        self.describe_into(&mut out, 0);
        out
    }

    fn describe_into(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        for field in &self.fields {
            let optional = if field.required { "" } else { ", optional" };
            out.push_str(&format!(
                "{}- {} ({}{}): {}\n",
                indent,
                field.name,
                field.kind.type_name(),
                optional,
                field.description
            ));
            if let FieldKind::ObjectList(inner) = &field.kind {
                inner.describe_into(out, depth + 1);
            }
        }
    }

    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for field in &self.fields {
            properties.insert(field.name.to_string(), field.kind.json_schema(field.description));
            if field.required {
                required.push(Value::String(field.name.to_string()));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

const IMAGE_URI_DESCRIPTION: &str = "A photo of a product, as a data URI that must include a MIME type and use Base64 encoding. Expected format: 'data:<mimetype>;base64,<encoded_data>'.";

pub fn describe_image_input() -> Schema {
    Schema::new(
        "DescribeImageInput",
        vec![FieldSpec::required("imageDataUri", FieldKind::DataUri, IMAGE_URI_DESCRIPTION)],
    )
}

pub fn describe_image_output() -> Schema {
    Schema::new(
        "DescribeImageOutput",
        vec![
            FieldSpec::required("title", FieldKind::Text, "A concise and appealing product title."),
            FieldSpec::required(
                "description",
                FieldKind::Text,
                "A detailed and engaging product description, suitable for an e-commerce listing.",
            ),
            FieldSpec::required(
                "category",
                FieldKind::Text,
                "A suggested product category (e.g. Apparel, Electronics, Home Goods).",
            ),
        ],
    )
}

pub fn create_listing_input() -> Schema {
    Schema::new(
        "CreateListingInput",
        vec![
            FieldSpec::required(
                "imageDataUris",
                FieldKind::DataUriList,
                "Photos of the product, each a Base64 data URI with a MIME type.",
            ),
            FieldSpec::required(
                "description",
                FieldKind::Text,
                "The vendor's free-text description of the product.",
            ),
            FieldSpec::required(
                "cost",
                FieldKind::Number { min: Some(0.0) },
                "The vendor's cost price for the product.",
            ),
            FieldSpec::required(
                "margin",
                FieldKind::Number { min: Some(-100.0) },
                "Profit margin as a percentage to add on top of the cost.",
            ),
        ],
    )
}

pub fn listing_output() -> Schema {
    Schema::new(
        "ListingResult",
        vec![
            FieldSpec::required(
                "title",
                FieldKind::Text,
                "SEO-friendly product title, ideally under 60 characters.",
            ),
            FieldSpec::required(
                "description",
                FieldKind::Text,
                "Formatted product description highlighting features, materials and care.",
            ),
            FieldSpec::required(
                "category",
                FieldKind::Text,
                "Product category path, e.g. 'Clothing > Women > Dresses'.",
            ),
            FieldSpec::optional(
                "price",
                FieldKind::Number { min: Some(0.0) },
                "Selling price as a number, rounded to the nearest whole number. Use 0 when no price is known.",
            ),
            FieldSpec::optional(
                "sizes",
                FieldKind::TextList,
                "Available sizes in the order they are mentioned. Empty if none.",
            ),
            FieldSpec::optional(
                "colors",
                FieldKind::TextList,
                "Available colors in the order they are mentioned. Empty if none.",
            ),
        ],
    )
}

pub fn extract_text_input() -> Schema {
    Schema::new(
        "ExtractFromTextInput",
        vec![FieldSpec::required(
            "text",
            FieldKind::Text,
            "Raw product text, e.g. a supplier message or catalogue snippet.",
        )],
    )
}

pub fn extract_text_output() -> Schema {
    Schema::new(
        "ExtractFromTextOutput",
        vec![
            FieldSpec::required("title", FieldKind::Text, "A concise product title."),
            FieldSpec::required("description", FieldKind::Text, "A clean product description."),
        ],
    )
}

pub fn parse_chat_input() -> Schema {
    Schema::new(
        "ParseChatInput",
        vec![
            FieldSpec::required("chatText", FieldKind::Text, "The full exported chat transcript."),
            FieldSpec::optional(
                "startDate",
                FieldKind::Date,
                "Only messages on or after this date are considered.",
            ),
            FieldSpec::optional(
                "endDate",
                FieldKind::Date,
                "Only messages on or before this date are considered.",
            ),
        ],
    )
}

pub fn parse_chat_output() -> Schema {
    Schema::new(
        "ParseChatOutput",
        vec![FieldSpec::required(
            "products",
            FieldKind::ObjectList(Box::new(listing_output())),
            "One entry per distinct product found in the chat, in the order they appear.",
        )],
    )
}
