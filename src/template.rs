//! Turns a Cubox article into a note: file name, front matter and body.
//!
//! All three outputs draw from one [`ArticleView`], so every template sees
//! the same variables formatted the same way.
use log::{debug, warn};
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use tera::{Context, Tera};

use crate::{format_timestamp, Article, Highlight, Result};

/// Longest file name (in characters) produced from a template
pub const MAX_FILENAME_LENGTH: usize = 100;

/// Variables that may appear in the front matter
pub const FRONT_MATTER_VARIABLES: [&str; 12] = [
    "id",
    "title",
    "article_title",
    "tags",
    "create_time",
    "update_time",
    "domain",
    "url",
    "cubox_url",
    "description",
    "words_count",
    "type",
];

const HIGHLIGHT_MARK: &str = "==";

/// A highlight as exposed to content templates
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HighlightView {
    pub id: String,
    /// Quoted text with blockquote markers on continuation lines,
    /// or an inline image reference for image-only highlights
    pub text: String,
    pub image_url: String,
    /// Trimmed note followed by a newline, empty when absent
    pub note: String,
    pub color: String,
    pub cubox_url: String,
    pub create_time: String,
}

/// Every variable available to the filename and content templates
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ArticleView {
    pub id: String,
    pub title: String,
    pub article_title: String,
    pub description: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_highlighted: Option<String>,
    pub highlights: Vec<HighlightView>,
    pub highlights_count: usize,
    pub tags: Vec<String>,
    pub create_time: String,
    pub update_time: String,
    pub domain: String,
    pub url: String,
    pub cubox_url: String,
    pub words_count: u64,
    #[serde(rename = "type")]
    pub card_type: String,
}

/// Renders notes with user templates and a date pattern
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    date_format: String,
}

impl TemplateRenderer {
    pub fn new(date_format: &str) -> Self {
        Self {
            date_format: date_format.to_string(),
        }
    }

    fn format_time(&self, raw: &str) -> String {
        format_timestamp(raw, &self.date_format)
    }

    /// Builds the view model; `content_highlighted` is only computed on request
    pub fn view(&self, article: &Article, with_highlighted_content: bool) -> ArticleView {
        let content = article.content.clone().unwrap_or_default();
        let highlights = article.highlights();

        let content_highlighted = with_highlighted_content.then(|| {
            if content.is_empty() || highlights.is_empty() {
                content.clone()
            } else {
                highlight_content(&content, highlights)
            }
        });

        ArticleView {
            id: article.id.clone(),
            title: article.title.clone(),
            article_title: article.article_title.clone(),
            description: article.description.clone(),
            content,
            content_highlighted,
            highlights: highlights.iter().map(|h| self.highlight_view(h)).collect(),
            highlights_count: highlights.len(),
            tags: article.tags().to_vec(),
            create_time: self.format_time(&article.create_time),
            update_time: self.format_time(&article.update_time),
            domain: article.domain.clone(),
            url: article.url.clone(),
            cubox_url: article.cubox_url.clone(),
            words_count: article.word_count,
            card_type: article.card_type.clone(),
        }
    }

    fn highlight_view(&self, highlight: &Highlight) -> HighlightView {
        let image_url = highlight.image_url.clone().unwrap_or_default();
        let text = if highlight.text.is_empty() && !image_url.is_empty() {
            format!("![]({})", image_url)
        } else {
            highlight.text.replace('\n', "\n> ")
        };

        let note = match highlight.note.as_deref().map(str::trim) {
            Some(note) if !note.is_empty() => format!("{}\n", note),
            _ => String::new(),
        };

        HighlightView {
            id: highlight.id.clone(),
            text,
            image_url,
            note,
            color: highlight.color.clone(),
            cubox_url: highlight.cubox_url.clone(),
            create_time: self.format_time(&highlight.create_time),
        }
    }

    /// Renders a safe file name (without extension).
    ///
    /// Template failures fall back to the article title. The result is cut
    /// to [`MAX_FILENAME_LENGTH`] characters, stripped of characters file
    /// systems reject and trimmed.
    pub fn render_filename(&self, template: &str, article: &Article) -> String {
        let rendered = if template.trim().is_empty() {
            article.display_title().to_string()
        } else {
            let view = self.view(article, false);
            match Context::from_serialize(&view)
                .and_then(|context| Tera::one_off(template, &context, false))
            {
                Ok(name) => name,
                Err(e) => {
                    warn!(
                        "File name template failed for {}, using title: {}",
                        article.id, e
                    );
                    article.display_title().to_string()
                }
            }
        };

        let safe = sanitize_filename(&rendered);
        if safe.is_empty() {
            sanitize_filename(article.display_title())
        } else {
            safe
        }
    }

    /// Renders the YAML front matter (without the `---` fences).
    ///
    /// `id` is always present since it drives deduplication. Each entry of
    /// `variables` may be written as `name::alias` to rename its key.
    pub fn render_front_matter(&self, variables: &[String], article: &Article) -> Result<String> {
        let mut front_matter = Mapping::new();
        front_matter.insert(Value::from("id"), Value::from(article.id.clone()));

        for item in variables {
            let mut parts = item.splitn(2, "::");
            let variable = parts.next().unwrap_or_default().trim();
            let key = parts
                .next()
                .map(str::trim)
                .filter(|alias| !alias.is_empty())
                .unwrap_or(variable);

            if variable == "id" {
                continue;
            }
            if key == "id" {
                debug!("Ignoring {}: the id key is reserved for the article id", item);
                continue;
            }
            if !FRONT_MATTER_VARIABLES.contains(&variable) {
                debug!("Ignoring unknown front matter variable: {}", variable);
                continue;
            }

            let value = match variable {
                "tags" => {
                    let tags = article.tags();
                    if tags.is_empty() {
                        None
                    } else {
                        Some(Value::Sequence(
                            tags.iter().map(|t| Value::from(t.clone())).collect(),
                        ))
                    }
                }
                "title" => non_empty(&article.title),
                "article_title" => non_empty(&article.article_title),
                "create_time" => non_empty(&self.format_time(&article.create_time)),
                "update_time" => non_empty(&self.format_time(&article.update_time)),
                "domain" => non_empty(&article.domain),
                "url" => non_empty(&article.url),
                "cubox_url" => non_empty(&article.cubox_url),
                "description" => non_empty(&article.description),
                "words_count" => (article.word_count > 0).then(|| Value::from(article.word_count)),
                "type" => non_empty(&article.card_type),
                _ => None,
            };

            if let Some(value) = value {
                front_matter.insert(Value::from(key.to_string()), value);
            }
        }

        Ok(serde_yaml::to_string(&front_matter)?)
    }

    /// Renders the note body.
    ///
    /// Without a template the raw content is followed by a list of
    /// highlights.
    pub fn render_content(&self, template: &str, article: &Article) -> Result<String> {
        if template.trim().is_empty() {
            return Ok(default_content(article));
        }

        let view = self.view(article, template.contains("content_highlighted"));
        let context = Context::from_serialize(&view)?;
        Ok(Tera::one_off(template, &context, false)?)
    }
}

fn non_empty(value: &str) -> Option<Value> {
    (!value.is_empty()).then(|| Value::from(value.to_string()))
}

fn default_content(article: &Article) -> String {
    let mut content = String::new();

    if let Some(body) = article.content.as_deref().filter(|c| !c.is_empty()) {
        content.push_str(body);
        content.push_str("\n\n");
    }

    let highlights = article.highlights();
    if !highlights.is_empty() {
        content.push_str("## Highlights\n\n");
        for highlight in highlights {
            content.push_str(&format!("- {}\n", highlight.text));
        }
    }

    content
}

/// Truncates, replaces characters illegal in file names with `-` and trims
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .take(MAX_FILENAME_LENGTH)
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '-',
            c if (c as u32) < 0x20 => '-',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Wraps every occurrence of every highlight's text in `==` marks.
///
/// Occurrences may overlap; covered characters are merged into runs so that
/// each run gets exactly one pair of marks.
pub fn highlight_content(content: &str, highlights: &[Highlight]) -> String {
    let chars: Vec<char> = content.chars().collect();
    let mut marked = vec![false; chars.len()];

    for highlight in highlights {
        let needle: Vec<char> = highlight.text.chars().collect();
        if needle.is_empty() || needle.len() > chars.len() {
            continue;
        }

        let mut start = 0;
        while let Some(found) = find_chars(&chars, &needle, start) {
            marked[found..found + needle.len()]
                .iter_mut()
                .for_each(|m| *m = true);
            start = found + 1;
        }
    }

    let mut out = String::with_capacity(content.len() + 8);
    let mut open = false;
    for (c, is_marked) in chars.iter().zip(marked.iter()) {
        if *is_marked != open {
            out.push_str(HIGHLIGHT_MARK);
            open = *is_marked;
        }
        out.push(*c);
    }
    if open {
        out.push_str(HIGHLIGHT_MARK);
    }

    out
}

fn find_chars(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if from + needle.len() > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split_front_matter;

    fn highlight(text: &str) -> Highlight {
        Highlight {
            id: format!("h-{}", text.len()),
            text: text.to_string(),
            cubox_url: "https://cubox.pro/my/highlight/1".to_string(),
            ..Default::default()
        }
    }

    fn article() -> Article {
        Article {
            id: "7201".to_string(),
            title: "Ownership in Rust".to_string(),
            article_title: "Understanding Ownership".to_string(),
            description: "A short tour".to_string(),
            url: "https://doc.rust-lang.org/book/ch04-00.html".to_string(),
            cubox_url: "https://cubox.pro/my/card?id=7201".to_string(),
            domain: "doc.rust-lang.org".to_string(),
            create_time: "2024-02-10T08:30:00+00:00".to_string(),
            update_time: "2024-02-11T09:45:00+00:00".to_string(),
            word_count: 2048,
            card_type: "article".to_string(),
            content: Some("Each value has an owner.".to_string()),
            highlights: Some(vec![highlight("an owner")]),
            tags: Some(vec!["rust".to_string(), "memory".to_string()]),
        }
    }

    #[test]
    fn filename_uses_formatted_dates() {
        let renderer = TemplateRenderer::new("yyyy-MM-dd");
        let name = renderer.render_filename("{{ title }}-{{ create_time }}", &article());
        assert_eq!(name, "Ownership in Rust-2024-02-10");
    }

    #[test]
    fn filename_strips_illegal_characters() {
        let renderer = TemplateRenderer::new("yyyy-MM-dd");
        let mut a = article();
        a.title = "  a<b>c:d\"e/f\\g|h?i*j\u{7}k  ".to_string();

        let name = renderer.render_filename("{{ title }}", &a);
        assert_eq!(name, "a-b-c-d-e-f-g-h-i-j-k");
        assert!(!name.chars().any(|c| "<>:\"/\\|?*".contains(c) || (c as u32) < 0x20));
    }

    #[test]
    fn filename_is_capped_at_100_characters() {
        let renderer = TemplateRenderer::new("yyyy-MM-dd");
        let mut a = article();
        a.title = "é".repeat(250);

        let name = renderer.render_filename("{{ title }}", &a);
        assert_eq!(name.chars().count(), MAX_FILENAME_LENGTH);
    }

    #[test]
    fn broken_filename_template_falls_back_to_title() {
        let renderer = TemplateRenderer::new("yyyy-MM-dd");
        assert_eq!(
            renderer.render_filename("{{ title ", &article()),
            "Ownership in Rust"
        );
        assert_eq!(
            renderer.render_filename("{{ no_such_variable }}", &article()),
            "Ownership in Rust"
        );

        let mut untitled = article();
        untitled.title.clear();
        assert_eq!(renderer.render_filename("{% if %}", &untitled), "Untitled");
        assert_eq!(renderer.render_filename("", &untitled), "Untitled");
    }

    #[test]
    fn front_matter_always_has_id() {
        let renderer = TemplateRenderer::new("yyyy-MM-dd");
        let a = article();

        for variables in [vec![], vec!["title".to_string()], vec!["title".to_string(), "id".to_string()]] {
            let yaml = renderer.render_front_matter(&variables, &a).unwrap();
            let parsed: Value = serde_yaml::from_str(&yaml).unwrap();
            assert_eq!(parsed["id"], Value::from("7201"));
        }
    }

    #[test]
    fn alias_cannot_replace_id() {
        let renderer = TemplateRenderer::new("yyyy-MM-dd");
        let variables: Vec<String> = ["title::id", "url::id", "domain"]
            .iter()
            .map(|v| v.to_string())
            .collect();

        let yaml = renderer.render_front_matter(&variables, &article()).unwrap();
        let parsed: Value = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(parsed["id"], Value::from("7201"));
        assert_eq!(parsed.as_mapping().unwrap().len(), 2);
        assert_eq!(parsed["domain"], Value::from("doc.rust-lang.org"));
    }

    #[test]
    fn front_matter_aliases_and_order() {
        let renderer = TemplateRenderer::new("yyyy/MM/dd");
        let variables: Vec<String> = ["url::source", "create_time", "tags", "words_count", "bogus"]
            .iter()
            .map(|v| v.to_string())
            .collect();

        let yaml = renderer.render_front_matter(&variables, &article()).unwrap();
        let parsed: Value = serde_yaml::from_str(&yaml).unwrap();
        let keys: Vec<&str> = parsed
            .as_mapping()
            .unwrap()
            .keys()
            .filter_map(|k| k.as_str())
            .collect();

        assert_eq!(keys, vec!["id", "source", "create_time", "tags", "words_count"]);
        assert_eq!(parsed["create_time"], Value::from("2024/02/10"));
        assert_eq!(parsed["words_count"], Value::from(2048u64));
    }

    #[test]
    fn front_matter_skips_empty_tags() {
        let renderer = TemplateRenderer::new("yyyy-MM-dd");
        let mut a = article();
        a.tags = Some(vec![]);

        let yaml = renderer
            .render_front_matter(&["tags".to_string()], &a)
            .unwrap();
        let parsed: Mapping = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn front_matter_survives_note_round_trip() {
        let renderer = TemplateRenderer::new("yyyy-MM-dd");
        let mut a = article();
        a.id = "000123".to_string();

        let yaml = renderer
            .render_front_matter(&["title".to_string()], &a)
            .unwrap();
        let note = format!("---\n{}---\n\nbody", yaml);
        let (front, _) = split_front_matter(&note).unwrap();
        let parsed: Value = serde_yaml::from_str(front).unwrap();
        assert_eq!(parsed["id"].as_str(), Some("000123"));
    }

    #[test]
    fn default_content_lists_highlights() {
        let renderer = TemplateRenderer::new("yyyy-MM-dd");
        let body = renderer.render_content("", &article()).unwrap();
        assert_eq!(
            body,
            "Each value has an owner.\n\n## Highlights\n\n- an owner\n"
        );
    }

    #[test]
    fn content_template_sees_view() {
        let renderer = TemplateRenderer::new("yyyy-MM-dd");
        let template = "{{ title }} ({{ highlights_count }}) {{ tags | join(sep=\",\") }} {{ update_time }}\n{% for h in highlights %}> {{ h.text }}|{{ h.note }}{% endfor %}";

        let body = renderer.render_content(template, &article()).unwrap();
        assert_eq!(
            body,
            "Ownership in Rust (1) rust,memory 2024-02-11\n> an owner|"
        );
    }

    #[test]
    fn default_template_renders() {
        let renderer = TemplateRenderer::new("yyyy-MM-dd");
        let mut a = article();
        a.highlights.as_mut().unwrap()[0].note = Some("  remember this \n".to_string());

        let body = renderer
            .render_content(crate::DEFAULT_CONTENT_TEMPLATE, &a)
            .unwrap();
        assert!(body.starts_with("# Ownership in Rust\n"));
        assert!(body.contains("## Annotations"));
        assert!(body.contains("> an owner"));
        assert!(body.contains("remember this\n"));
        assert!(body.contains("[Link](https://cubox.pro/my/highlight/1)"));
    }

    #[test]
    fn broken_content_template_is_an_error() {
        let renderer = TemplateRenderer::new("yyyy-MM-dd");
        assert!(renderer.render_content("{% for %}", &article()).is_err());
    }

    #[test]
    fn highlight_views() {
        let renderer = TemplateRenderer::new("yyyy-MM-dd");
        let image = Highlight {
            image_url: Some("https://img.cubox.pro/1.png".to_string()),
            ..Default::default()
        };
        let multi_line = Highlight {
            text: "first\nsecond".to_string(),
            note: None,
            ..Default::default()
        };

        assert_eq!(
            renderer.highlight_view(&image).text,
            "![](https://img.cubox.pro/1.png)"
        );
        let view = renderer.highlight_view(&multi_line);
        assert_eq!(view.text, "first\n> second");
        assert_eq!(view.note, "");
    }

    #[test]
    fn highlighted_content_marks_every_occurrence() {
        assert_eq!(
            highlight_content("ab cd ab", &[highlight("ab")]),
            "==ab== cd ==ab=="
        );
    }

    #[test]
    fn highlighted_content_merges_overlaps() {
        assert_eq!(highlight_content("aaaa", &[highlight("aa")]), "==aaaa==");
        assert_eq!(
            highlight_content("one two three", &[highlight("one two"), highlight("two three")]),
            "==one two three=="
        );
        assert_eq!(highlight_content("xyz", &[highlight(""), highlight("q")]), "xyz");
    }

    #[test]
    fn content_highlighted_only_when_referenced() {
        let renderer = TemplateRenderer::new("yyyy-MM-dd");
        let a = article();

        assert!(renderer.view(&a, false).content_highlighted.is_none());
        let body = renderer
            .render_content("{{ content_highlighted }}", &a)
            .unwrap();
        assert_eq!(body, "Each value has ==an owner==.");

        let mut plain = article();
        plain.highlights = None;
        let body = renderer
            .render_content("{{ content_highlighted }}", &plain)
            .unwrap();
        assert_eq!(body, "Each value has an owner.");
    }
}
