//! Context assembly from similarity-search rows.
//!
//! Maps raw ranked rows into labeled excerpts, filters by relevance,
//! deduplicates cited sources and renders the grounding block injected as
//! authoritative input to the completion call.

use crate::store::MatchRow;

/// Minimum similarity a row must reach to enter the context.
pub const SIMILARITY_MIN: f32 = 0.2;
/// Cap on distinct source names cited back to the user.
pub const MAX_CITED_SOURCES: usize = 2;
/// Sentinel used when no row survives filtering, so the grounding
/// instruction is never silently empty.
pub const NO_CONTEXT_SENTINEL: &str = "Sem contexto disponível.";

const DEFAULT_FILE_NAME: &str = "documento";

/// A retrieved excerpt after defaulting. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub file_name: String,
    pub content: String,
    pub similarity: f32,
}

/// Assembled grounding context plus the capped list of cited sources.
#[derive(Debug, Clone)]
pub struct RetrievalContext {
    pub block: String,
    pub sources: Vec<String>,
}

fn map_row(row: &MatchRow) -> RetrievedChunk {
    RetrievedChunk {
        file_name: row
            .file_name
            .clone()
            .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string()),
        content: row.content.clone().unwrap_or_default(),
        similarity: row.similarity.unwrap_or(0.0),
    }
}

/// Filter ranked rows by relevance and render the context block. Rows keep
/// the order the store returned them in (ranked descending); sources are
/// distinct file names in first-seen order, truncated to `max_sources`.
pub fn build_context(rows: &[MatchRow], threshold: f32, max_sources: usize) -> RetrievalContext {
    let surviving: Vec<RetrievedChunk> = rows
        .iter()
        .map(map_row)
        .filter(|c| !c.content.trim().is_empty())
        .filter(|c| c.similarity >= threshold)
        .collect();

    let mut sources: Vec<String> = Vec::new();
    for chunk in &surviving {
        if !sources.contains(&chunk.file_name) {
            sources.push(chunk.file_name.clone());
        }
    }
    sources.truncate(max_sources);

    let block = if surviving.is_empty() {
        NO_CONTEXT_SENTINEL.to_string()
    } else {
        surviving
            .iter()
            .enumerate()
            .map(|(idx, c)| {
                format!(
                    "### Trecho {} — Documento: {} (similaridade: {:.3})\n{}",
                    idx + 1,
                    c.file_name,
                    c.similarity,
                    c.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    };

    RetrievalContext { block, sources }
}

/// Single-document mode: the document's full stored content becomes the
/// sole context, with no similarity filtering. A deliberate opt-out of
/// retrieval for "ask about this one document".
pub fn single_document_context(file_name: &str, content: &str) -> RetrievalContext {
    RetrievalContext {
        block: if content.trim().is_empty() {
            NO_CONTEXT_SENTINEL.to_string()
        } else {
            content.to_string()
        },
        sources: vec![file_name.to_string()],
    }
}

/// The forced system instruction: context is authoritative, insufficient
/// context gets the fixed refusal sentence, fabrication is forbidden.
pub fn forced_context(block: &str) -> String {
    format!(
        "Você TEM acesso ao banco interno de documentos (trechos relevantes já fornecidos abaixo).\n\
         Responda usando APENAS o conteúdo dos trechos fornecidos.\n\
         Se os trechos não tiverem a resposta, diga: \"Não encontrei essa informação nos documentos carregados.\"\n\
         \n\
         TRECHOS:\n\
         {block}"
    )
}

/// User-facing sources footer appended to the reply; empty when there is
/// nothing to cite.
pub fn sources_footer(sources: &[String]) -> String {
    if sources.is_empty() {
        String::new()
    } else {
        format!("\n\nFontes: {}", sources.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(file_name: Option<&str>, content: &str, similarity: Option<f32>) -> MatchRow {
        MatchRow {
            file_name: file_name.map(str::to_string),
            content: Some(content.to_string()),
            similarity,
        }
    }

    #[test]
    fn threshold_drops_low_similarity_rows_in_order() {
        let rows = vec![
            row(Some("a.txt"), "um", Some(0.1)),
            row(Some("b.txt"), "dois", Some(0.05)),
            row(Some("c.txt"), "três", Some(0.25)),
            row(Some("d.txt"), "quatro", Some(0.3)),
        ];

        let ctx = build_context(&rows, SIMILARITY_MIN, MAX_CITED_SOURCES);
        assert!(ctx.block.contains("três"));
        assert!(ctx.block.contains("quatro"));
        assert!(!ctx.block.contains("Trecho 3"));
        // Store order preserved: c.txt renders before d.txt.
        let pos_c = ctx.block.find("c.txt").unwrap();
        let pos_d = ctx.block.find("d.txt").unwrap();
        assert!(pos_c < pos_d);
    }

    #[test]
    fn missing_fields_get_defaults() {
        let rows = vec![MatchRow {
            file_name: None,
            content: Some("conteúdo".to_string()),
            similarity: Some(0.9),
        }];

        let ctx = build_context(&rows, SIMILARITY_MIN, MAX_CITED_SOURCES);
        assert!(ctx.block.contains("Documento: documento"));
        assert_eq!(ctx.sources, vec!["documento".to_string()]);
    }

    #[test]
    fn non_numeric_similarity_defaults_to_zero_and_is_dropped() {
        let rows = vec![row(Some("a.txt"), "conteúdo", None)];
        let ctx = build_context(&rows, SIMILARITY_MIN, MAX_CITED_SOURCES);
        assert_eq!(ctx.block, NO_CONTEXT_SENTINEL);
        assert!(ctx.sources.is_empty());
    }

    #[test]
    fn empty_content_rows_are_dropped() {
        let rows = vec![row(Some("a.txt"), "   ", Some(0.9))];
        let ctx = build_context(&rows, SIMILARITY_MIN, MAX_CITED_SOURCES);
        assert_eq!(ctx.block, NO_CONTEXT_SENTINEL);
    }

    #[test]
    fn sources_are_distinct_first_seen_and_capped() {
        let rows = vec![
            row(Some("a.txt"), "1", Some(0.9)),
            row(Some("b.txt"), "2", Some(0.8)),
            row(Some("a.txt"), "3", Some(0.7)),
            row(Some("c.txt"), "4", Some(0.6)),
            row(Some("d.txt"), "5", Some(0.5)),
            row(Some("e.txt"), "6", Some(0.4)),
        ];

        let ctx = build_context(&rows, SIMILARITY_MIN, MAX_CITED_SOURCES);
        assert_eq!(ctx.sources, vec!["a.txt".to_string(), "b.txt".to_string()]);
    }

    #[test]
    fn excerpts_are_labeled_and_joined() {
        let rows = vec![
            row(Some("a.txt"), "primeiro", Some(0.912)),
            row(Some("b.txt"), "segundo", Some(0.5)),
        ];

        let ctx = build_context(&rows, SIMILARITY_MIN, MAX_CITED_SOURCES);
        assert!(ctx
            .block
            .starts_with("### Trecho 1 — Documento: a.txt (similaridade: 0.912)\nprimeiro"));
        assert!(ctx.block.contains("\n\n---\n\n### Trecho 2 — Documento: b.txt"));
    }

    #[test]
    fn single_document_mode_bypasses_filtering() {
        let ctx = single_document_context("manual.pdf", "conteúdo inteiro");
        assert_eq!(ctx.block, "conteúdo inteiro");
        assert_eq!(ctx.sources, vec!["manual.pdf".to_string()]);
    }

    #[test]
    fn forced_context_embeds_block_and_refusal_line() {
        let out = forced_context(NO_CONTEXT_SENTINEL);
        assert!(out.contains("Não encontrei essa informação nos documentos carregados."));
        assert!(out.ends_with("TRECHOS:\nSem contexto disponível."));
    }

    #[test]
    fn footer_renders_only_when_sources_exist() {
        assert_eq!(sources_footer(&[]), "");
        assert_eq!(
            sources_footer(&["a.txt".to_string(), "b.txt".to_string()]),
            "\n\nFontes: a.txt, b.txt"
        );
    }
}
