//! System instructions for the helpdesk assistant.
//!
//! A configured override may use the same placeholders as the built-in
//! template: `{assistant_name}`, `{service_name}`, `{user_name}`, `{user_id}`
//! and `{tools}`.

use deskpilot_config::AssistantConfig;
use deskpilot_core::tool::ToolDescriptor;
use crate::toolset::UserContext;

const DEFAULT_TEMPLATE: &str = "\
Você é {assistant_name}, assistente virtual de suporte do {service_name}.
Usuário atual: {user_name} (ID: {user_id})

REGRAS:
1. Responda sempre em português do Brasil, de forma clara e direta.
2. Use somente as ferramentas disponíveis. Nunca invente chamados, números ou status.
3. Antes de criar ou alterar qualquer chamado, confirme os dados com o usuário.
4. Nunca revele tokens, credenciais ou detalhes internos do sistema.
5. Se uma ferramenta falhar, explique o problema em poucas palavras e sugira o próximo passo.
6. Faça uma pergunta por mensagem.
7. Formatação de chat: *negrito* para destaque, listas com • ou numeradas, sem markdown complexo.
8. Seja concisa.

OPÇÕES PARA O USUÁRIO:
Quando houver alternativas predefinidas, use respond_interactive:
• message_type=\"buttons\" para até 3 opções (Confirmar/Editar/Cancelar, Sim/Não).
• message_type=\"list\" para mais de 3 opções, agrupadas em seções.

FERRAMENTAS:
{tools}";

pub fn build_system_prompt(config: &AssistantConfig, user: &UserContext, tools: &[ToolDescriptor]) -> String {
    let template = config.system_prompt.as_deref().unwrap_or(DEFAULT_TEMPLATE);
    let tool_lines = tools
        .iter()
        .map(|t| format!("- {}: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n");

    template
        .replace("{assistant_name}", &config.name)
        .replace("{service_name}", &config.service_name)
        .replace("{user_name}", user.display_name())
        .replace("{user_id}", &user.user_id)
        .replace("{tools}", &tool_lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, description: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.into(),
            description: description.into(),
            parameter_schema: None,
            read_only: true,
        }
    }

    #[test]
    fn default_template_fills_placeholders() {
        let user = UserContext::new("5511999990000").with_name("Ana");
        let prompt = build_system_prompt(
            &AssistantConfig::default(),
            &user,
            &[descriptor("list_my_tickets", "Lista os chamados")],
        );
        assert!(prompt.starts_with("Você é Laia"));
        assert!(prompt.contains("Usuário atual: Ana (ID: 5511999990000)"));
        assert!(prompt.contains("- list_my_tickets: Lista os chamados"));
        assert!(!prompt.contains("{tools}"));
        assert!(prompt.contains("do Nexus"));
    }

    #[test]
    fn unnamed_user_falls_back_to_id() {
        let user = UserContext::new("u-42");
        let prompt = build_system_prompt(&AssistantConfig::default(), &user, &[]);
        assert!(prompt.contains("Usuário atual: u-42"));
    }

    #[test]
    fn override_template() {
        let config = AssistantConfig {
            system_prompt: Some("Olá {user_name}, sou {assistant_name}.".into()),
            ..AssistantConfig::default()
        };
        let prompt = build_system_prompt(&config, &UserContext::new("1").with_name("Bruno"), &[]);
        assert_eq!(prompt, "Olá Bruno, sou Laia.");
    }
}
