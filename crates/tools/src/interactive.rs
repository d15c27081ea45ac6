//! `respond_interactive`: the pseudo-tool the model uses to deliver a
//! structured reply (quick-reply buttons or a sectioned list).
//!
//! It is never executed. The orchestrator intercepts the call and turns its
//! arguments into an [`AgentReply`]. Malformed arguments degrade to text.

use deskpilot_core::message::Arguments;
use deskpilot_core::reply::{AgentReply, Choice, ListRow, ListSection, MAX_CHOICES};
use deskpilot_core::tool::{ParamSchema, ToolDescriptor};
use serde_json::Value;

pub const RESPOND_INTERACTIVE: &str = "respond_interactive";

const DEFAULT_LIST_BUTTON: &str = "Ver opções";

pub fn descriptor() -> ToolDescriptor {
    let button = ParamSchema::object()
        .property("id", ParamSchema::string("Identificador retornado quando o usuário toca no botão"), true)
        .property("title", ParamSchema::string("Rótulo do botão (até 20 caracteres)"), true);
    let row = ParamSchema::object()
        .property("id", ParamSchema::string("Identificador da opção"), true)
        .property("title", ParamSchema::string("Título da opção (até 24 caracteres)"), true)
        .property("description", ParamSchema::string("Descrição curta (até 72 caracteres)"), false);
    let section = ParamSchema::object()
        .property("title", ParamSchema::string("Título da seção"), true)
        .property("rows", ParamSchema::array("Opções da seção", row), true);

    ToolDescriptor {
        name: RESPOND_INTERACTIVE.into(),
        description: "Envia ao usuário uma resposta com botões (até 3) ou uma lista de opções. \
                      Use quando o usuário precisa escolher entre alternativas."
            .into(),
        parameter_schema: Some(
            ParamSchema::object()
                .property("message_type", ParamSchema::string_enum("Formato da resposta", ["buttons", "list"]), true)
                .property("text", ParamSchema::string("Texto exibido acima das opções"), true)
                .property("buttons", ParamSchema::array("Botões (máximo 3)", button), false)
                .property("list_button_text", ParamSchema::string("Texto do botão que abre a lista"), false)
                .property("sections", ParamSchema::array("Seções da lista", section), false),
        ),
        read_only: true,
    }
}

/// Turn the pseudo-tool's arguments into the outward reply.
pub fn parse_reply(args: &Arguments) -> AgentReply {
    let text = str_field(args, "text").unwrap_or_default();

    match str_field(args, "message_type").as_deref() {
        Some("buttons") => {
            let choices: Vec<Choice> = array_field(args, "buttons")
                .filter_map(|b| {
                    Some(Choice {
                        id: str_value(b, "id")?,
                        title: str_value(b, "title")?,
                    })
                })
                .take(MAX_CHOICES)
                .collect();
            if choices.is_empty() {
                AgentReply::text(text)
            } else {
                AgentReply::Choices { text, choices }
            }
        }
        Some("list") => {
            let sections: Vec<ListSection> = array_field(args, "sections")
                .filter_map(|s| {
                    let rows: Vec<ListRow> = s
                        .get("rows")
                        .and_then(Value::as_array)
                        .into_iter()
                        .flatten()
                        .filter_map(|r| {
                            Some(ListRow {
                                id: str_value(r, "id")?,
                                title: str_value(r, "title")?,
                                description: str_value(r, "description").unwrap_or_default(),
                            })
                        })
                        .collect();
                    if rows.is_empty() {
                        return None;
                    }
                    Some(ListSection {
                        title: str_value(s, "title").unwrap_or_default(),
                        rows,
                    })
                })
                .collect();
            if sections.is_empty() {
                return AgentReply::text(text);
            }
            let button_text = str_field(args, "list_button_text")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LIST_BUTTON.to_string());
            AgentReply::List { text, button_text, sections }
        }
        _ => AgentReply::text(text),
    }
}

fn str_field(args: &Arguments, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}

fn str_value(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn array_field<'a>(args: &'a Arguments, key: &str) -> impl Iterator<Item = &'a Value> {
    args.get(key).and_then(Value::as_array).into_iter().flatten()
}
