//! Output shaping: keep tool results small enough for the model.

use deskpilot_core::message::Arguments;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ShapingPolicy {
    pub max_list_items: usize,
    pub max_output_bytes: usize,
    /// Fields removed from the kept items of a truncated list
    pub verbose_fields: Vec<String>,
}

impl Default for ShapingPolicy {
    fn default() -> Self {
        Self {
            max_list_items: 10,
            max_output_bytes: 8192,
            verbose_fields: ["descricao", "conteudo", "preview", "content", "description"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Truncate oversized record lists, then enforce the byte ceiling.
pub fn shape_output(mut result: Arguments, policy: &ShapingPolicy) -> Arguments {
    let mut original_counts = Arguments::new();
    let mut largest = 0;

    for (field, value) in result.iter_mut() {
        let Value::Array(items) = value else { continue };
        if items.len() <= policy.max_list_items || !items.iter().all(Value::is_object) {
            continue;
        }
        let original = items.len();
        items.truncate(policy.max_list_items);
        for item in items.iter_mut() {
            if let Value::Object(map) = item {
                for verbose in &policy.verbose_fields {
                    map.remove(verbose);
                }
            }
        }
        original_counts.insert(field.clone(), Value::from(original));
        largest = largest.max(original);
    }

    if !original_counts.is_empty() {
        result.insert("_truncated".into(), Value::Bool(true));
        result.insert("_original_counts".into(), Value::Object(original_counts));
        result.insert(
            "_nota".into(),
            Value::String(format!(
                "Mostrando {} de {} resultados. Sugira ao usuário refinar a busca.",
                policy.max_list_items, largest
            )),
        );
    }

    let serialized = match serde_json::to_string(&result) {
        Ok(s) => s,
        Err(_) => return result,
    };
    if serialized.len() <= policy.max_output_bytes {
        return result;
    }

    // Half the ceiling leaves room for JSON escaping of the clipped text.
    let mut summary = Arguments::new();
    summary.insert("_truncated".into(), Value::Bool(true));
    summary.insert(
        "_summary".into(),
        Value::String(clip_bytes(&serialized, policy.max_output_bytes / 2).to_string()),
    );
    summary
}

/// Longest prefix of `s` no longer than `max` bytes that ends on a char boundary.
pub fn clip_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tickets(n: usize) -> Arguments {
        let items: Vec<Value> = (0..n)
            .map(|i| json!({ "id": i, "titulo": format!("Chamado {i}"), "descricao": "detalhes longos" }))
            .collect();
        json!({ "total": n, "tickets": items }).as_object().cloned().unwrap()
    }

    #[test]
    fn small_results_untouched() {
        let input = tickets(3);
        assert_eq!(shape_output(input.clone(), &ShapingPolicy::default()), input);
    }

    #[test]
    fn long_lists_truncated_with_metadata() {
        let shaped = shape_output(tickets(25), &ShapingPolicy::default());
        let items = shaped["tickets"].as_array().unwrap();
        assert_eq!(items.len(), 10);
        assert!(items.iter().all(|i| i.get("descricao").is_none()));
        assert_eq!(items[0]["titulo"], "Chamado 0");
        assert_eq!(shaped["_truncated"], true);
        assert_eq!(shaped["_original_counts"]["tickets"], 25);
        assert_eq!(shaped["total"], 25);
        assert!(shaped["_nota"].as_str().unwrap().contains("10 de 25"));
    }

    #[test]
    fn scalar_lists_left_alone() {
        let input = json!({ "tags": (0..50).collect::<Vec<_>>() }).as_object().cloned().unwrap();
        let shaped = shape_output(input, &ShapingPolicy::default());
        assert_eq!(shaped["tags"].as_array().unwrap().len(), 50);
        assert!(shaped.get("_truncated").is_none());
    }

    #[test]
    fn byte_ceiling_replaces_result() {
        let input = json!({ "body": "á".repeat(10_000) }).as_object().cloned().unwrap();
        let policy = ShapingPolicy { max_output_bytes: 1000, ..ShapingPolicy::default() };
        let shaped = shape_output(input, &policy);
        assert_eq!(shaped["_truncated"], true);
        let summary = shaped["_summary"].as_str().unwrap();
        assert!(summary.len() <= 500);
        assert!(summary.starts_with("{\"body\""));
    }

    #[test]
    fn clip_bytes_respects_char_boundaries() {
        let s = "aé";
        assert_eq!(clip_bytes(s, 2), "a");
        assert_eq!(clip_bytes(s, 3), "aé");
        assert_eq!(clip_bytes("", 5), "");
    }
}
