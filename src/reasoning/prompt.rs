//! System prompt construction.
//!
//! The prompt lists the archive's known entity names so the service
//! answers with names that resolve, and pins the JSON answer schema.
//! It is built once from the entity cache and reused verbatim across
//! requests — a byte-identical prompt is what makes provider-side
//! prompt caching effective. Invalidate after any cache refresh.

/// Entity name lists injected into the system prompt.
#[derive(Debug, Clone, Default)]
pub struct PromptData {
    pub correspondents: Vec<String>,
    pub document_types: Vec<String>,
    pub tags: Vec<String>,
    pub storage_paths: Vec<String>,
    pub person_options: Vec<String>,
    pub house_register_options: Vec<String>,
}

pub fn build_system_prompt(data: &PromptData) -> String {
    let mut prompt = String::with_capacity(4096);
    prompt.push_str(
        "You classify documents for a private archive. Answer with a single \
         JSON object and nothing else.\n\n\
         Prefer names from the known lists below. Use null when you have no \
         opinion for a field; never guess. Names that are genuinely missing \
         from the lists go into create_new.\n\n",
    );

    push_list(&mut prompt, "Known correspondents", &data.correspondents);
    push_list(&mut prompt, "Known document types", &data.document_types);
    push_list(&mut prompt, "Known tags", &data.tags);
    push_list(&mut prompt, "Known storage paths", &data.storage_paths);
    push_list(&mut prompt, "Person options", &data.person_options);
    push_list(
        &mut prompt,
        "House register options",
        &data.house_register_options,
    );

    prompt.push_str(
        "\nAnswer schema:\n\
         {\n\
           \"title\": string,\n\
           \"correspondent\": string | null,\n\
           \"document_type\": string | null,\n\
           \"storage_path\": string | null,\n\
           \"tags\": [string],\n\
           \"date\": \"YYYY-MM-DD\" | null,\n\
           \"is_scanned_document\": bool,\n\
           \"pagination_stamp\": integer | null,\n\
           \"pagination_stamp_confidence\": \"high\" | \"medium\" | \"low\" | null,\n\
           \"is_house_folder_candidate\": bool,\n\
           \"house_register\": string | null,\n\
           \"house_sequence\": integer | null,\n\
           \"person\": string | null,\n\
           \"person_confidence\": \"high\" | \"medium\" | \"low\" | null,\n\
           \"person_reasoning\": string | null,\n\
           \"tax_relevant\": bool,\n\
           \"tax_year\": integer | null,\n\
           \"confidence\": \"high\" | \"medium\" | \"low\",\n\
           \"reasoning\": string,\n\
           \"create_new\": {\"correspondents\": [string], \"tags\": [string], \
            \"document_types\": [string], \
            \"storage_paths\": [{\"name\": string, \"path_template\": string}]}\n\
         }\n",
    );
    prompt
}

fn push_list(prompt: &mut String, heading: &str, names: &[String]) {
    prompt.push_str(heading);
    prompt.push_str(":\n");
    if names.is_empty() {
        prompt.push_str("(none)\n");
    } else {
        for name in names {
            prompt.push_str("- ");
            prompt.push_str(name);
            prompt.push('\n');
        }
    }
    prompt.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_contains_entity_names_and_schema() {
        let data = PromptData {
            correspondents: vec!["City Utilities".into(), "Dr. Hansen".into()],
            document_types: vec!["Utility Bill".into()],
            tags: vec!["Insurance".into()],
            storage_paths: vec![],
            person_options: vec!["Max".into()],
            house_register_options: vec!["3".into()],
        };
        let prompt = build_system_prompt(&data);
        assert!(prompt.contains("City Utilities"));
        assert!(prompt.contains("Utility Bill"));
        assert!(prompt.contains("\"confidence\""));
        assert!(prompt.contains("create_new"));
        assert!(prompt.contains("(none)"));
    }

    #[test]
    fn identical_data_builds_identical_prompt() {
        let data = PromptData {
            correspondents: vec!["A".into(), "B".into()],
            ..Default::default()
        };
        assert_eq!(build_system_prompt(&data), build_system_prompt(&data));
    }
}
