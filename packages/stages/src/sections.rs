//! Best-effort sectioning of paper text.

use std::sync::LazyLock;

use regex::Regex;

static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^\s*(?:\d+\.?\s*)?(abstract|introduction|background|materials and methods|methods?|methodology|results?|findings|discussion|conclusions?|references|bibliography)\s*:?\s*$",
    )
    .expect("heading pattern is valid")
});

/// Named sections of a paper. Missing sections are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sections {
    pub abstract_text: String,
    pub introduction: String,
    pub methods: String,
    pub results: String,
    pub discussion: String,
    pub conclusion: String,
    pub references: String,
}

impl Sections {
    /// Text where findings are reported: results, discussion and conclusion.
    pub fn findings_text(&self) -> String {
        [&self.results, &self.discussion, &self.conclusion]
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn slot(&mut self, heading: &str) -> &mut String {
        match heading {
            "abstract" => &mut self.abstract_text,
            "introduction" | "background" => &mut self.introduction,
            "results" | "result" | "findings" => &mut self.results,
            "discussion" => &mut self.discussion,
            "conclusion" | "conclusions" => &mut self.conclusion,
            "references" | "bibliography" => &mut self.references,
            _ => &mut self.methods,
        }
    }
}

/// Split text on standalone section headings.
pub fn split_sections(text: &str) -> Sections {
    let mut sections = Sections::default();
    let headings: Vec<_> = HEADING.captures_iter(text).collect();

    for (i, caps) in headings.iter().enumerate() {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = headings
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(text.len(), |m| m.start());
        let body = text[whole.end()..end].trim();

        let slot = sections.slot(&name.as_str().to_lowercase());
        if !slot.is_empty() {
            slot.push('\n');
        }
        slot.push_str(body);
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_split_the_text() {
        let text = "Abstract\nShort summary.\n1. Introduction\nWhy.\nMethods\nHow.\nResults\nIt worked.\nDiscussion:\nIt matters.\nReferences\n[1] A.";
        let sections = split_sections(text);
        assert_eq!(sections.abstract_text, "Short summary.");
        assert_eq!(sections.methods, "How.");
        assert_eq!(sections.results, "It worked.");
        assert_eq!(sections.findings_text(), "It worked.\nIt matters.");
        assert_eq!(sections.references, "[1] A.");
    }

    #[test]
    fn unstructured_text_has_no_sections() {
        let sections = split_sections("Just one paragraph mentioning results in passing.");
        assert_eq!(sections, Sections::default());
    }
}
