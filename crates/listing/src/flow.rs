use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::FlowConfig;
use crate::error::FlowError;
use crate::llm::{GenerateRequest, GenerativeModel};
use crate::prompt::RenderedPrompt;
use crate::retry::RetryPolicy;
use crate::schema::{FieldError, Schema};

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("static regex"));

/// Static description of one named flow
#[derive(Debug, Clone)]
pub struct FlowDefinition {
    pub name: &'static str,
    pub summary: &'static str,
    pub input: Schema,
    pub output: Schema,
    /// Turn hosted-model failures into a well-formed fallback result
    pub degrade_on_failure: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowSummary {
    pub name: &'static str,
    pub summary: &'static str,
    pub degrade_on_failure: bool,
    pub input_fields: String,
    pub output_fields: String,
}

impl FlowDefinition {
    pub fn describe(&self) -> FlowSummary {
        FlowSummary {
            name: self.name,
            summary: self.summary,
            degrade_on_failure: self.degrade_on_failure,
            input_fields: self.input.describe_fields(),
            output_fields: self.output.describe_fields(),
        }
    }
}

/// The per-operation pieces the executor cannot know about
pub trait Flow: Send + Sync {
    type Input: DeserializeOwned + Send + Sync;
    type Output: Send;

    fn definition(&self) -> &FlowDefinition;

    fn enabled(&self) -> bool {
        true
    }

    /// Cross-field rules a field-by-field schema cannot express
    fn check(&self, _input: &Self::Input) -> Vec<FieldError> {
        Vec::new()
    }

    fn render(&self, input: &Self::Input) -> Result<RenderedPrompt, Vec<FieldError>>;

    /// Turn a schema-valid response into the typed result
    fn finish(&self, input: &Self::Input, output: Value) -> Result<Self::Output, FlowError>;

    /// Fallback used when `degrade_on_failure` is set and the model call fails
    fn degraded(&self, _reason: &str) -> Option<Self::Output> {
        None
    }
}

pub(crate) fn input_error(flow: &str, errors: Vec<FieldError>) -> FlowError {
    FlowError::InputValidation {
        flow: flow.to_string(),
        errors,
    }
}

pub(crate) fn output_error(flow: &str, reason: impl Into<String>, errors: Vec<FieldError>) -> FlowError {
    FlowError::OutputValidation {
        flow: flow.to_string(),
        reason: reason.into(),
        errors,
    }
}

pub(crate) fn decode_output<T: DeserializeOwned>(flow: &str, value: Value) -> Result<T, FlowError> {
    serde_json::from_value(value)
        .map_err(|e| output_error(flow, format!("response could not be decoded: {}", e), Vec::new()))
}

/// Pull the JSON document out of a model response. Accepts bare JSON,
/// a fenced ```json block, or JSON surrounded by stray prose.
pub fn parse_json(response: &str) -> Result<Value, String> {
    let trimmed = response.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    if let Some(block) = FENCED_JSON.captures(trimmed).and_then(|c| c.get(1)) {
        if let Ok(value) = serde_json::from_str(block.as_str()) {
            return Ok(value);
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str(&trimmed[start..=end]) {
                return Ok(value);
            }
        }
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => Ok(value),
        Err(e) => Err(format!("response is not valid JSON: {}", e)),
    }
}

/// validate input -> render -> call model -> validate output -> finish
pub struct FlowExecutor {
    model: Arc<dyn GenerativeModel>,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl FlowExecutor {
    pub fn new(model: Arc<dyn GenerativeModel>, config: &FlowConfig) -> Self {
        Self {
            model,
            retry: RetryPolicy::from_config(&config.retry),
            request_timeout: config.request_timeout(),
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub async fn run<F: Flow>(&self, flow: &F, mut raw: Value) -> Result<F::Output, FlowError> {
        let definition = flow.definition();
        let name = definition.name;

        if !flow.enabled() {
            return Err(FlowError::Disabled { flow: name.to_string() });
        }

        definition
            .input
            .validate(&raw)
            .map_err(|errors| input_error(name, errors))?;
        definition.input.strip_nulls(&mut raw);

        let input: F::Input = serde_json::from_value(raw).map_err(|e| {
            input_error(name, vec![FieldError::new("$", definition.input.name, e.to_string())])
        })?;

        let problems = flow.check(&input);
        if !problems.is_empty() {
            return Err(input_error(name, problems));
        }

        let prompt = flow.render(&input).map_err(|errors| input_error(name, errors))?;
        debug!(
            flow = name,
            prompt_chars = prompt.text.len(),
            media = prompt.media.len(),
            "Rendered prompt"
        );

        let request = GenerateRequest {
            prompt: prompt.text,
            output_schema: definition.output.to_json_schema(),
            media: prompt.media,
        };

        let response = match self.invoke(name, &request).await {
            Ok(response) => response,
            Err(message) => {
                if definition.degrade_on_failure {
                    if let Some(fallback) = flow.degraded(&message) {
                        warn!(flow = name, error = %message, "Model call failed, returning degraded result");
                        return Ok(fallback);
                    }
                }
                error!(flow = name, error = %message, "Model call failed");
                return Err(FlowError::ModelInvocation {
                    flow: name.to_string(),
                    message,
                });
            }
        };

        let mut value = parse_json(&response).map_err(|reason| {
            warn!(flow = name, reason = %reason, "Unparseable model response");
            output_error(name, reason, Vec::new())
        })?;

        definition.output.validate(&value).map_err(|errors| {
            warn!(flow = name, errors = errors.len(), "Model response failed schema validation");
            output_error(name, "response does not match the output schema", errors)
        })?;

        definition.output.strip_nulls(&mut value);

        let output = flow.finish(&input, value)?;
        info!(flow = name, model = self.model.name(), "Flow completed");
        Ok(output)
    }

    /// The only await point of a flow. Dropping the returned future abandons the call.
    async fn invoke(&self, flow: &str, request: &GenerateRequest) -> Result<String, String> {
        let model = &self.model;
        let limit = self.request_timeout;

        self.retry
            .retry(flow, || async move {
                match timeout(limit, model.generate(request)).await {
                    Ok(Ok(text)) => Ok(text),
                    Ok(Err(e)) => Err(format!("{:#}", e)),
                    Err(_) => Err(format!("model did not respond within {:?}", limit)),
                }
            })
            .await
    }
}
