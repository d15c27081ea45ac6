//! Google Gemini provider (`generateContent` REST API).
//!
//! Differences from the OpenAI shape handled here:
//! - system instructions are a top-level field
//! - the assistant role is called `model`
//! - tool results are `functionResponse` parts inside a user turn
//! - schema type names are upper-case
//! - function calls carry no ids, so ids are synthesized per response

use async_trait::async_trait;
use deskpilot_core::error::ProviderError;
use deskpilot_core::message::{Arguments, ConversationTurn, Part, Role};
use deskpilot_core::provider::*;
use deskpilot_core::tool::ToolDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use crate::http::{build_client, map_send_error, map_status, retry_after};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client: build_client(),
        }
    }

    /// Point at a proxy or a local stub.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn to_contents(turns: &[ConversationTurn]) -> Vec<Content> {
        turns
            .iter()
            .filter_map(|turn| {
                let role = match turn.role {
                    Role::Assistant => "model",
                    Role::User | Role::Tool => "user",
                };
                let parts: Vec<GeminiPart> = turn
                    .parts
                    .iter()
                    .map(|part| match part {
                        Part::Text { text } => GeminiPart::text(text),
                        Part::ToolInvocation { name, arguments, .. } => GeminiPart {
                            function_call: Some(FunctionCall {
                                name: name.clone(),
                                args: arguments.clone(),
                            }),
                            ..GeminiPart::default()
                        },
                        Part::ToolResult { name, result, .. } => GeminiPart {
                            function_response: Some(FunctionResponse {
                                name: name.clone(),
                                response: result.clone(),
                            }),
                            ..GeminiPart::default()
                        },
                    })
                    .collect();
                (!parts.is_empty()).then(|| Content {
                    role: role.into(),
                    parts,
                })
            })
            .collect()
    }

    fn to_declarations(tools: &[ToolDescriptor]) -> Vec<FunctionDeclaration> {
        tools
            .iter()
            .map(|t| FunctionDeclaration {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameter_schema.as_ref().map(|s| upper_case_types(s.to_json_schema())),
            })
            .collect()
    }

    fn from_api_response(api: GenerateResponse) -> ProviderResponse {
        let choices = api
            .candidates
            .into_iter()
            .map(|candidate| {
                let mut message = ModelMessage::default();
                for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
                    if let Some(text) = part.text {
                        message.content.push_str(&text);
                    }
                    if let Some(call) = part.function_call {
                        let id = format!("call_{}_{}", message.tool_calls.len(), call.name);
                        message.tool_calls.push(ModelToolCall {
                            id,
                            name: call.name,
                            arguments: Value::Object(call.args).to_string(),
                        });
                    }
                }
                message
            })
            .collect();

        ProviderResponse {
            choices,
            usage: api.usage_metadata.map(|u| Usage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            }),
            model: api.model_version.unwrap_or_default(),
        }
    }
}

/// Gemini expects `STRING`, `OBJECT`, ... instead of JSON Schema's lower-case names.
fn upper_case_types(mut schema: Value) -> Value {
    if let Value::Object(map) = &mut schema {
        if let Some(Value::String(t)) = map.get_mut("type") {
            *t = t.to_uppercase();
        }
        if let Some(Value::Object(props)) = map.get_mut("properties") {
            for value in props.values_mut() {
                *value = upper_case_types(value.take());
            }
        }
        if let Some(items) = map.get_mut("items") {
            *items = upper_case_types(items.take());
        }
    }
    schema
}

#[async_trait]
impl deskpilot_core::Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, request.model);

        let mut body = GenerateRequest {
            system_instruction: None,
            contents: Self::to_contents(&request.messages),
            tools: Vec::new(),
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        };
        if !request.system.is_empty() {
            body.system_instruction = Some(Content {
                role: "user".into(),
                parts: vec![GeminiPart::text(&request.system)],
            });
        }
        if !request.tools.is_empty() {
            body.tools.push(ToolSet {
                function_declarations: Self::to_declarations(&request.tools),
            });
        }

        debug!(provider = "gemini", model = %request.model, turns = request.messages.len(), "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let wait = retry_after(response.headers());
            let error_body = response.text().await.unwrap_or_default();
            warn!(provider = "gemini", status, body = %error_body, "Provider returned error");
            return Err(match (map_status(status, error_body), wait) {
                (ProviderError::RateLimited { .. }, Some(secs)) => ProviderError::RateLimited { retry_after_secs: secs },
                (other, _) => other,
            });
        }

        let text = response.text().await.map_err(map_send_error)?;
        let api: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;
        Ok(Self::from_api_response(api))
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(map_send_error)?;
        Ok(response.status().is_success())
    }
}

// --- Gemini API types (internal) ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSet>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolSet {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

impl GeminiPart {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Arguments,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: Arguments,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskpilot_core::tool::ParamSchema;
    use serde_json::json;

    #[test]
    fn roles_and_parts() {
        let mut args = Arguments::new();
        args.insert("query".into(), "vpn".into());
        let turns = vec![
            ConversationTurn::user("minha vpn caiu"),
            ConversationTurn::assistant(vec![Part::ToolInvocation {
                id: "call_0_search".into(),
                name: "search_knowledge_base".into(),
                arguments: args.clone(),
            }]),
            ConversationTurn::tool(vec![Part::ToolResult {
                call_id: "call_0_search".into(),
                name: "search_knowledge_base".into(),
                result: args,
            }]),
        ];
        let contents = GeminiProvider::to_contents(&turns);
        let roles: Vec<_> = contents.iter().map(|c| c.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "model", "user"]);
        assert_eq!(contents[1].parts[0].function_call.as_ref().unwrap().name, "search_knowledge_base");
        assert_eq!(contents[2].parts[0].function_response.as_ref().unwrap().response["query"], "vpn");
    }

    #[test]
    fn schema_types_upper_cased() {
        let tools = vec![ToolDescriptor {
            name: "create_ticket".into(),
            description: "Abre um chamado".into(),
            parameter_schema: Some(
                ParamSchema::object()
                    .property("title", ParamSchema::string("Título"), true)
                    .property("tags", ParamSchema::array("Tags", ParamSchema::string("Tag")), false),
            ),
            read_only: false,
        }];
        let decl = GeminiProvider::to_declarations(&tools);
        let params = decl[0].parameters.as_ref().unwrap();
        assert_eq!(params["type"], "OBJECT");
        assert_eq!(params["properties"]["title"]["type"], "STRING");
        assert_eq!(params["properties"]["tags"]["items"]["type"], "STRING");
        assert_eq!(params["required"], json!(["title"]));
    }

    #[test]
    fn parameterless_tool_omits_parameters() {
        let tools = vec![ToolDescriptor {
            name: "list_my_tickets".into(),
            description: "Lista".into(),
            parameter_schema: None,
            read_only: true,
        }];
        let decl = serde_json::to_value(GeminiProvider::to_declarations(&tools)).unwrap();
        assert!(decl[0].get("parameters").is_none());
    }

    #[test]
    fn response_synthesizes_call_ids() {
        let api: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "functionCall": { "name": "get_ticket", "args": { "ticket_id": 1201 } } },
                        { "functionCall": { "name": "get_ticket", "args": { "ticket_id": 1202 } } }
                    ]
                }
            }],
            "usageMetadata": { "promptTokenCount": 7, "candidatesTokenCount": 3, "totalTokenCount": 10 },
            "modelVersion": "gemini-2.0-flash"
        }))
        .unwrap();
        let response = GeminiProvider::from_api_response(api);
        let calls = &response.choices[0].tool_calls;
        assert_eq!(calls[0].id, "call_0_get_ticket");
        assert_eq!(calls[1].id, "call_1_get_ticket");
        assert_eq!(calls[1].arguments, r#"{"ticket_id":1202}"#);
        assert_eq!(response.model, "gemini-2.0-flash");
        assert_eq!(response.usage.unwrap().total_tokens, 10);
    }

    #[test]
    fn blocked_candidate_has_empty_content() {
        let api: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{ "finishReason": "SAFETY" }]
        }))
        .unwrap();
        let response = GeminiProvider::from_api_response(api);
        assert_eq!(response.choices.len(), 1);
        assert!(response.choices[0].content.is_empty());
        assert!(response.choices[0].tool_calls.is_empty());
    }
}
