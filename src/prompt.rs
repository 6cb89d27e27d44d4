//! Prompt assembly for grounded analysis and structured evaluation.

use crate::chunker::Chunk;

/// Default character budget for rendered grounding context.
pub const DEFAULT_CONTEXT_CHAR_BUDGET: usize = 50_000;

/// Renders retrieved chunks (best match first) into a grounding block.
///
/// Chunks are included whole until `char_budget` would be exceeded. The
/// best-ranked chunk is always represented: if it alone exceeds the budget it
/// is truncated at a character boundary instead of dropped.
pub fn render_context(hits: &[(&Chunk, f32)], char_budget: usize) -> String {
    let mut out = String::new();
    for (rank, (chunk, distance)) in hits.iter().enumerate() {
        let entry = format!(
            "[Excerpt {}] (pages {}-{}, ~{} tokens, distance {:.4})\n{}\n\n",
            rank + 1,
            chunk.page_start + 1,
            chunk.page_end,
            chunk.token_estimate,
            distance,
            chunk.text.trim()
        );
        if out.is_empty() && entry.len() > char_budget {
            let mut cut = char_budget.min(entry.len());
            while cut > 0 && !entry.is_char_boundary(cut) {
                cut -= 1;
            }
            out.push_str(&entry[..cut]);
            break;
        }
        if out.len() + entry.len() > char_budget {
            break;
        }
        out.push_str(&entry);
    }
    out.trim_end().to_string()
}

/// Builds the case-analysis prompt grounding the model in standard excerpts.
pub fn analysis_prompt(context: &str, case: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str("## Instructions\n");
    prompt.push_str(
        "You are an expert on the ISO 37001 anti-bribery management systems standard. \
         Analyze the case study below against the excerpts of the standard provided. \
         Identify the key aspects of the case, relate them to specific clauses of the \
         standard, and give detailed recommendations.\n\n",
    );
    prompt.push_str("## ISO 37001 excerpts\n");
    prompt.push_str(context);
    prompt.push_str("\n\n## Case study\n");
    prompt.push_str(case);
    prompt.push_str("\n\n## Response format\n");
    prompt.push_str(
        "Structure your answer as:\n\
         1. Case summary\n\
         2. Key terms identified in the case and their relation to the standard\n\
         3. Relevant clauses of the standard applicable to the case\n\
         4. Specific recommendations for implementing an anti-bribery management system\n\
         5. Conclusion\n",
    );
    prompt
}

/// Builds the comparison prompt whose reply feeds the result extractor.
///
/// The JSON keys in the template are a fixed wire contract; the extractor and
/// its downstream consumers depend on them verbatim.
pub fn evaluation_prompt(reference_analysis: &str, user_analysis: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str("## Instructions\n");
    prompt.push_str(
        "You are an expert evaluator of anti-bribery management systems under the \
         ISO 37001 standard. Compare the two analyses of one case study below: the \
         reference analysis produced by an AI model, and the analysis submitted by a \
         user. Evaluate both against these criteria:\n\
         - Precision and accuracy with respect to ISO 37001\n\
         - Understanding of the case study\n\
         - Quality of the recommendations\n\
         - Structure and clarity\n\
         - Practical applicability\n\n",
    );
    prompt.push_str("## Reference (AI) analysis\n");
    prompt.push_str(reference_analysis);
    prompt.push_str("\n\n## User analysis\n");
    prompt.push_str(user_analysis);
    prompt.push_str("\n\n## Response format\n");
    prompt.push_str(
        "Answer only with JSON in exactly this shape:\n\
         {\n\
         \x20   \"calificacionIA\": X,\n\
         \x20   \"calificacionUsuario\": Y,\n\
         \x20   \"confianzaIA\": Z,\n\
         \x20   \"confianzaUsuario\": W,\n\
         \x20   \"comentarioGeneral\": \"comment\",\n\
         \x20   \"fortalezasIA\": [\"...\"],\n\
         \x20   \"debilidadesIA\": [\"...\"],\n\
         \x20   \"fortalezasUsuario\": [\"...\"],\n\
         \x20   \"debilidadesUsuario\": [\"...\"],\n\
         \x20   \"recomendacionMejora\": \"...\"\n\
         }\n",
    );
    prompt
}
