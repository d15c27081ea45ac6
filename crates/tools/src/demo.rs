//! In-memory helpdesk tools.
//!
//! The real ticketing tools live with the deployment that owns the helpdesk
//! credentials. These stand-ins keep the same names and shapes so the CLI
//! and gateway can run end-to-end without one.

use async_trait::async_trait;
use chrono::Utc;
use deskpilot_core::error::ToolFailure;
use deskpilot_core::message::Arguments;
use deskpilot_core::tool::{ParamSchema, Tool};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use crate::registry::{ExecutionPolicy, ToolRegistry};

#[derive(Debug, Clone, Serialize)]
pub struct Ticket {
    pub id: u64,
    pub titulo: String,
    pub status: String,
    pub urgencia: String,
    pub descricao: String,
    pub aberto_em: String,
}

/// A shared fake helpdesk.
#[derive(Debug, Default)]
pub struct DemoDesk {
    tickets: Vec<Ticket>,
}

impl DemoDesk {
    /// A desk pre-populated with a few open tickets.
    pub fn seeded() -> Self {
        let now = Utc::now().to_rfc3339();
        let ticket = |id, titulo: &str, status: &str| Ticket {
            id,
            titulo: titulo.into(),
            status: status.into(),
            urgencia: "media".into(),
            descricao: format!("{titulo}: relatado pelo usuário."),
            aberto_em: now.clone(),
        };
        Self {
            tickets: vec![
                ticket(1201, "Impressora do financeiro sem toner", "novo"),
                ticket(1202, "VPN desconectando", "em_atendimento"),
                ticket(1203, "Acesso ao sistema de ponto", "pendente"),
            ],
        }
    }

    pub fn tickets(&self) -> &[Ticket] {
        &self.tickets
    }
}

type Desk = Arc<Mutex<DemoDesk>>;

fn lock_failed() -> ToolFailure {
    ToolFailure::failed("demo", "internal error: helpdesk state unavailable")
}

fn to_arguments(value: Value) -> Arguments {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Arguments::new();
            map.insert("value".into(), other);
            map
        }
    }
}

pub struct ListMyTickets {
    desk: Desk,
}

#[async_trait]
impl Tool for ListMyTickets {
    fn name(&self) -> &str { "list_my_tickets" }
    fn description(&self) -> &str { "Lista os chamados abertos pelo usuário atual." }
    fn parameter_schema(&self) -> Option<ParamSchema> { None }
    fn is_read_only(&self) -> bool { true }

    async fn execute(&self, _arguments: &Arguments) -> Result<Arguments, ToolFailure> {
        let desk = self.desk.lock().map_err(|_| lock_failed())?;
        Ok(to_arguments(json!({
            "total": desk.tickets.len(),
            "tickets": desk.tickets,
        })))
    }
}

pub struct GetTicket {
    desk: Desk,
}

#[async_trait]
impl Tool for GetTicket {
    fn name(&self) -> &str { "get_ticket" }
    fn description(&self) -> &str { "Mostra os detalhes completos de um chamado." }
    fn parameter_schema(&self) -> Option<ParamSchema> {
        Some(ParamSchema::object().property("ticket_id", ParamSchema::integer("Número do chamado"), true))
    }
    fn is_read_only(&self) -> bool { true }

    async fn execute(&self, arguments: &Arguments) -> Result<Arguments, ToolFailure> {
        let id = parse_id(arguments.get("ticket_id"))
            .ok_or_else(|| ToolFailure::failed(self.name(), "ticket_id inválido"))?;
        let desk = self.desk.lock().map_err(|_| lock_failed())?;
        let ticket = desk
            .tickets
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| ToolFailure::failed(self.name(), format!("HTTP 404: ticket {id} not found")))?;
        Ok(to_arguments(json!({ "ticket": ticket })))
    }
}

pub struct CreateTicket {
    desk: Desk,
}

#[async_trait]
impl Tool for CreateTicket {
    fn name(&self) -> &str { "create_ticket" }
    fn description(&self) -> &str {
        "Abre um novo chamado. Só use depois que o usuário confirmar título e descrição."
    }
    fn parameter_schema(&self) -> Option<ParamSchema> {
        Some(
            ParamSchema::object()
                .property("title", ParamSchema::string("Título curto do problema"), true)
                .property("description", ParamSchema::string("Descrição detalhada"), true)
                .property("urgency", ParamSchema::string_enum("Urgência", ["baixa", "media", "alta"]), false),
        )
    }
    fn is_read_only(&self) -> bool { false }

    async fn execute(&self, arguments: &Arguments) -> Result<Arguments, ToolFailure> {
        let text = |key: &str| arguments.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
        let mut desk = self.desk.lock().map_err(|_| lock_failed())?;
        let id = desk.tickets.iter().map(|t| t.id).max().unwrap_or(1200) + 1;
        let urgency = match text("urgency") {
            u if u.is_empty() => "media".to_string(),
            u => u,
        };
        desk.tickets.push(Ticket {
            id,
            titulo: text("title"),
            status: "novo".into(),
            urgencia: urgency,
            descricao: text("description"),
            aberto_em: Utc::now().to_rfc3339(),
        });
        Ok(to_arguments(json!({
            "id": id,
            "status": "novo",
            "mensagem": format!("Chamado #{id} criado com sucesso."),
        })))
    }
}

pub struct SearchKnowledge;

#[async_trait]
impl Tool for SearchKnowledge {
    fn name(&self) -> &str { "search_knowledge_base" }
    fn description(&self) -> &str { "Busca artigos na base de conhecimento." }
    fn parameter_schema(&self) -> Option<ParamSchema> {
        Some(ParamSchema::object().property("query", ParamSchema::string("Termos de busca"), true))
    }
    fn is_read_only(&self) -> bool { true }

    async fn execute(&self, arguments: &Arguments) -> Result<Arguments, ToolFailure> {
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();
        let articles = [
            (11, "Como configurar a VPN", "vpn"),
            (12, "Trocar toner da impressora", "impressora"),
            (13, "Redefinir senha de rede", "senha"),
        ];
        let hits: Vec<Value> = articles
            .iter()
            .filter(|(_, _, keyword)| query.contains(keyword))
            .map(|(id, title, _)| json!({ "id": id, "titulo": title }))
            .collect();
        Ok(to_arguments(json!({ "total": hits.len(), "artigos": hits })))
    }
}

fn parse_id(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A registry holding all demo tools over one shared desk.
pub fn demo_registry(desk: Arc<Mutex<DemoDesk>>, policy: ExecutionPolicy) -> ToolRegistry {
    let mut registry = ToolRegistry::with_policy(policy);
    registry.register(Box::new(ListMyTickets { desk: desk.clone() }));
    registry.register(Box::new(GetTicket { desk: desk.clone() }));
    registry.register(Box::new(CreateTicket { desk }));
    registry.register(Box::new(SearchKnowledge));
    registry
}
