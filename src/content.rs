use crate::formats::{ChapterText, ResolvedChapter};
use crate::spine::SpineIndex;

/// Markup-to-text extraction supplied by the archive layer.
pub trait TextSource {
    fn extract_text(&mut self, content_reference: &str) -> anyhow::Result<String>;
}

/// Concatenates the text of every spine unit in `[start, end)`, in spine
/// order, separated by a blank line. Units with no text are skipped and a
/// unit that fails to extract counts as empty.
pub fn load<S: TextSource + ?Sized>(
    start: usize,
    end: usize,
    spine: &SpineIndex,
    source: &mut S,
) -> String {
    let end = end.min(spine.len());
    let mut parts = Vec::new();

    for position in start..end {
        let Some(entry) = spine.get(position) else {
            break;
        };
        let text = match source.extract_text(&entry.content_reference) {
            Ok(text) => text,
            Err(err) => {
                let error = format!("{err:#}");
                tracing::warn!(
                    position,
                    content_reference = %entry.content_reference,
                    error = %error,
                    "text extraction failed; treating unit as empty"
                );
                continue;
            }
        };
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        parts.push(text.to_owned());
    }

    parts.join("\n\n")
}

pub fn load_chapters<S: TextSource + ?Sized>(
    chapters: &[ResolvedChapter],
    spine: &SpineIndex,
    source: &mut S,
) -> Vec<ChapterText> {
    chapters
        .iter()
        .enumerate()
        .map(|(index, chapter)| {
            let text = load(chapter.start, chapter.end, spine, &mut *source);
            tracing::debug!(
                chapter_index = index,
                title = %chapter.title,
                start = chapter.start,
                end = chapter.end,
                chars = text.chars().count(),
                "loaded chapter"
            );
            ChapterText {
                index,
                title: chapter.title.clone(),
                text,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::formats::NavigationNode;
    use crate::resolve::resolve;

    struct MapSource {
        texts: HashMap<String, String>,
        calls: Vec<String>,
    }

    impl MapSource {
        fn new(pairs: &[(&str, &str)]) -> Self {
            Self {
                texts: pairs
                    .iter()
                    .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                    .collect(),
                calls: Vec::new(),
            }
        }
    }

    impl TextSource for MapSource {
        fn extract_text(&mut self, content_reference: &str) -> anyhow::Result<String> {
            self.calls.push(content_reference.to_owned());
            self.texts
                .get(content_reference)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no such entry: {content_reference}"))
        }
    }

    fn spine(files: &[&str]) -> SpineIndex {
        SpineIndex::new(files.iter().map(|f| (f.to_string(), f.to_string())))
    }

    #[test]
    fn load_joins_non_empty_units_in_order() {
        let spine = spine(&["a", "b", "c", "d"]);
        let mut source = MapSource::new(&[("a", "A"), ("b", "  \n "), ("c", "C\n"), ("d", "D")]);

        assert_eq!(load(0, 3, &spine, &mut source), "A\n\nC");
        assert_eq!(source.calls, vec!["a", "b", "c"]);
    }

    #[test]
    fn load_clamps_to_spine_and_skips_failures() {
        let spine = spine(&["a", "missing", "c"]);
        let mut source = MapSource::new(&[("a", "A"), ("c", "C")]);

        assert_eq!(load(0, 99, &spine, &mut source), "A\n\nC");
        assert_eq!(load(2, 2, &spine, &mut source), "");
    }

    #[test]
    fn image_title_page_is_bridged_to_following_text() {
        let spine = spine(&["c1-title.xhtml", "c1-body.xhtml", "c2.xhtml"]);
        let nav = vec![
            NavigationNode::leaf("One", "c1-title.xhtml"),
            NavigationNode::leaf("Two", "c2.xhtml"),
        ];
        let mut source = MapSource::new(&[
            ("c1-title.xhtml", ""),
            ("c1-body.xhtml", "It was a dark and stormy night."),
            ("c2.xhtml", "Chapter two."),
        ]);

        let resolution = resolve(&nav, &spine);
        let chapters = load_chapters(&resolution.chapters, &spine, &mut source);

        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].text, "It was a dark and stormy night.");
        assert_eq!(chapters[1].text, "Chapter two.");
        assert_eq!(chapters[1].index, 1);
    }
}
