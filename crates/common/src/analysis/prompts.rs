//! Prompt templates for document analysis and routing

use super::DocumentContext;

pub const ANALYSIS_SYSTEM: &str = "You are an assistant to a government records office. \
You read official documents and produce concise, factual structured summaries. \
Reply with a single JSON object and nothing else.";

pub const ROUTING_SYSTEM: &str = "You are an assistant to a government records office. \
You decide which government department should handle a document. \
Reply with a single JSON object and nothing else.";

pub fn analysis_prompt(excerpt: &str, context: &DocumentContext) -> String {
    format!(
        "Analyze the following document.\n\n\
         Title: {}\n\
         Category: {}\n\n\
         Document text:\n\"\"\"\n{}\n\"\"\"\n\n\
         Respond with JSON of the form:\n\
         {{\"summary\": \"2-4 sentence summary\", \
         \"key_points\": [\"...\"], \
         \"priority\": \"low|medium|high\", \
         \"deadlines\": [\"date - what is due\"], \
         \"action_items\": [\"...\"]}}",
        context.title, context.category, excerpt
    )
}

pub fn routing_prompt(excerpt: &str, context: &DocumentContext) -> String {
    let departments = if context.candidate_departments.is_empty() {
        String::new()
    } else {
        format!(
            "Choose exactly one of these departments:\n{}\n\n",
            context
                .candidate_departments
                .iter()
                .map(|d| format!("- {}", d))
                .collect::<Vec<_>>()
                .join("\n")
        )
    };

    format!(
        "Decide which department should handle this document.\n\n\
         Title: {}\n\
         Category: {}\n\n\
         {}Document text:\n\"\"\"\n{}\n\"\"\"\n\n\
         Respond with JSON of the form:\n\
         {{\"primary_department\": \"department name\", \
         \"reasoning\": \"one or two sentences\", \
         \"confidence\": 0.0-1.0}}",
        context.title, context.category, departments, excerpt
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Category;

    #[test]
    fn test_routing_prompt_lists_candidates() {
        let context = DocumentContext {
            title: "Road repair request".into(),
            category: Category::Correspondence,
            candidate_departments: vec!["Public Works".into(), "Finance".into()],
        };
        let prompt = routing_prompt("Potholes on Main Street", &context);
        assert!(prompt.contains("- Public Works\n- Finance"));
        assert!(prompt.contains("Category: correspondence"));
    }

    #[test]
    fn test_routing_prompt_without_candidates() {
        let context = DocumentContext {
            title: "t".into(),
            category: Category::Other,
            candidate_departments: vec![],
        };
        assert!(!routing_prompt("x", &context).contains("Choose exactly one"));
    }
}
