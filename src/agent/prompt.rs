//! System prompts for the agent and the RAG chain.

use chrono::{DateTime, Locale, TimeZone};

/// Follow-up turn asking the model to rewrite the conversation into a query.
pub const QUERY_REWRITE_INSTRUCTION: &str =
    "Genera una consulta de búsqueda específica basada en lo anterior.";

/// Render a date the way the prompts present it, e.g. `05 de marzo de 2025`.
#[must_use]
pub fn spanish_long_date<Tz>(date: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    date.format_localized("%d de %B de %Y", Locale::es_ES)
        .to_string()
}

/// System prompt for the general tool-using agent.
#[must_use]
pub fn agent_system_prompt(current_date: &str) -> String {
    format!(
        "Eres DocuChat, un asistente inteligente que ayuda a los usuarios.

INFORMACIÓN TEMPORAL IMPORTANTE:
- Fecha actual: {current_date}

Tienes acceso a las siguientes herramientas:
1. search: Para buscar información actualizada en internet
2. calculate: Para realizar cálculos matemáticos

INSTRUCCIONES IMPORTANTES:
- Cuando uses la herramienta de búsqueda, los resultados son ACTUALES y corresponden a {current_date}
- Responde de manera clara y útil usando Markdown cuando sea apropiado
- Si no estás seguro de algo, usa la herramienta de búsqueda para verificar"
    )
}

/// System prompt for answering from retrieved document context.
#[must_use]
pub fn rag_system_prompt(context: &str) -> String {
    format!(
        "Eres DocuChat, un asistente que analiza documentos cargados por el usuario.

Responde usando principalmente el contexto. Si la información no está en el contexto, dilo claramente.
Menciona siempre de qué documento viene la información.
Responde usando Markdown.

Contexto:
{context}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_spanish_date() {
        let date = Utc.with_ymd_and_hms(2025, 3, 5, 12, 0, 0).unwrap();
        let rendered = spanish_long_date(&date);
        assert!(rendered.starts_with("05 de "));
        assert!(rendered.ends_with(" de 2025"));
        assert!(rendered.contains("marzo"));
    }

    #[test]
    fn test_prompts_embed_inputs() {
        let prompt = agent_system_prompt("05 de marzo de 2025");
        assert_eq!(prompt.matches("05 de marzo de 2025").count(), 2);

        let prompt = rag_system_prompt("uno\n\ndos");
        assert!(prompt.ends_with("Contexto:\nuno\n\ndos"));
    }
}
