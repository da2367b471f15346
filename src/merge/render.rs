//! Rendering of consolidated documents: markdown, JSON, YAML.

use super::MergedSection;
use crate::models::ProvenanceMap;
use crate::{Error, Result};
use serde_json::json;

/// Renders the consolidated document as markdown.
///
/// Provenance is emitted as a trailing "Provenance" subsection per
/// section listing the contributing source document ids.
#[must_use]
pub fn render_markdown(
    title: &str,
    sections: &[MergedSection],
    include_provenance: bool,
) -> String {
    let mut out = format!("# {title}\n");
    for section in sections {
        out.push_str(&format!("\n## {}\n\n", section.header));
        if !section.body.is_empty() {
            out.push_str(&section.body);
            out.push('\n');
        }
        for annotation in &section.annotations {
            out.push_str(&format!("\n> {annotation}\n"));
        }
        if include_provenance {
            out.push_str("\n### Provenance\n\n");
            for source in &section.sources {
                out.push_str(&format!("- {source}\n"));
            }
        }
    }
    out
}

/// Renders the consolidated document as a JSON value.
#[must_use]
pub fn render_json(
    title: &str,
    sections: &[MergedSection],
    provenance: &ProvenanceMap,
    include_provenance: bool,
) -> serde_json::Value {
    let section_values: Vec<serde_json::Value> = sections
        .iter()
        .map(|s| {
            let mut value = json!({
                "header": s.header,
                "content": s.body,
                "annotations": s.annotations,
            });
            if include_provenance {
                value["sources"] = json!(
                    s.sources
                        .iter()
                        .map(|id| id.as_str().to_string())
                        .collect::<Vec<_>>()
                );
            }
            value
        })
        .collect();

    let mut document = json!({
        "title": title,
        "sections": section_values,
    });
    if include_provenance {
        let map: serde_json::Map<String, serde_json::Value> = provenance
            .iter()
            .map(|(header, ids)| {
                (
                    header.clone(),
                    json!(ids.iter().map(|id| id.as_str().to_string()).collect::<Vec<_>>()),
                )
            })
            .collect();
        document["provenance"] = serde_json::Value::Object(map);
    }
    document
}

/// Renders the consolidated document as YAML.
pub fn render_yaml(
    title: &str,
    sections: &[MergedSection],
    provenance: &ProvenanceMap,
    include_provenance: bool,
) -> Result<String> {
    let value = render_json(title, sections, provenance, include_provenance);
    serde_yaml_ng::to_string(&value)
        .map_err(|e| Error::Validation(format!("yaml rendering failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentId;

    fn sections() -> (Vec<MergedSection>, ProvenanceMap) {
        let source = DocumentId::generate();
        let section = MergedSection {
            header: "Tokens".to_string(),
            body: "Access tokens expire after 1 hour.".to_string(),
            sources: vec![source.clone()],
            annotations: vec!["Conflict noted".to_string()],
        };
        let mut provenance = ProvenanceMap::new();
        provenance.insert("Tokens".to_string(), vec![source]);
        (vec![section], provenance)
    }

    #[test]
    fn test_markdown_has_provenance_subsection() {
        let (sections, _) = sections();
        let md = render_markdown("Consolidated", &sections, true);
        assert!(md.starts_with("# Consolidated"));
        assert!(md.contains("## Tokens"));
        assert!(md.contains("### Provenance"));
        assert!(md.contains("> Conflict noted"));
    }

    #[test]
    fn test_markdown_provenance_disabled() {
        let (sections, _) = sections();
        let md = render_markdown("Consolidated", &sections, false);
        assert!(!md.contains("Provenance"));
    }

    #[test]
    fn test_json_nests_provenance() {
        let (sections, provenance) = sections();
        let value = render_json("Consolidated", &sections, &provenance, true);
        assert_eq!(value["title"], "Consolidated");
        assert_eq!(value["sections"][0]["header"], "Tokens");
        assert!(value["provenance"]["Tokens"].is_array());
    }

    #[test]
    fn test_yaml_roundtrips() {
        let (sections, provenance) = sections();
        let yaml = render_yaml("Consolidated", &sections, &provenance, true).unwrap();
        let value: serde_json::Value = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(value["title"], "Consolidated");
    }
}
