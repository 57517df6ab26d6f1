//! Per-message incremental parser.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};
use weft_core::{ActionKind, DirectiveHandler};

use crate::attrs::{match_literal, match_open_tag, partial_suffix_len, Attributes, TagMatch};
use crate::config::ParserConfig;

const ARTIFACT_OPEN: &str = "<artifact";
const ARTIFACT_CLOSE: &str = "</artifact>";
const ACTION_OPEN: &str = "<action";
const ACTION_CLOSE: &str = "</action>";

/// Renders display text inserted where an artifact's opening tag was,
/// given the artifact id and title.
pub type ArtifactElement = Arc<dyn Fn(&str, &str) -> String + Send + Sync>;

/// Artifact whose opening tag has been parsed.
#[derive(Debug, Clone)]
struct OpenArtifact {
    id: String,
    title: String,
    /// Ordinal handed to the next action in this artifact.
    next_ordinal: u32,
    /// Raw source since the opening tag that has not reached the display
    /// output, surfaced if the stream ends early.
    source: String,
}

/// Action whose opening tag has been parsed.
#[derive(Debug, Clone)]
struct OpenAction {
    ordinal: u32,
    kind: ActionKind,
    content: String,
}

/// Incremental parser state for a single message stream.
pub struct MessageParser {
    stream_id: String,
    config: ParserConfig,
    artifact_element: Option<ArtifactElement>,
    /// Input that could not be classified yet.
    pending: String,
    /// Bytes consumed so far.
    position: usize,
    artifact: Option<OpenArtifact>,
    action: Option<OpenAction>,
}

impl fmt::Debug for MessageParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageParser")
            .field("stream_id", &self.stream_id)
            .field("position", &self.position)
            .field("pending", &self.pending)
            .field("in_artifact", &self.artifact.is_some())
            .field("in_action", &self.action.is_some())
            .finish()
    }
}

impl MessageParser {
    /// Create a parser for one stream.
    pub fn new(stream_id: impl Into<String>, config: ParserConfig) -> Self {
        Self {
            stream_id: stream_id.into(),
            config,
            artifact_element: None,
            pending: String::new(),
            position: 0,
            artifact: None,
            action: None,
        }
    }

    /// Insert rendered text for each artifact into the display output.
    pub fn with_artifact_element(mut self, element: ArtifactElement) -> Self {
        self.artifact_element = Some(element);
        self
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Number of input bytes fully classified so far.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes held back because they might start a tag.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn in_artifact(&self) -> bool {
        self.artifact.is_some()
    }

    pub fn in_action(&self) -> bool {
        self.action.is_some()
    }

    /// Feed the next chunk. Returns the display text it settles and reports
    /// directive events to `handler` in document order.
    pub fn consume<H>(&mut self, chunk: &str, handler: &mut H) -> String
    where
        H: DirectiveHandler + ?Sized,
    {
        let mut input = std::mem::take(&mut self.pending);
        input.push_str(chunk);

        let mut out = String::new();
        let mut cursor = 0;
        while cursor < input.len() {
            let step = if self.action.is_some() {
                self.scan_action(&input, cursor, handler)
            } else if self.artifact.is_some() {
                self.scan_artifact(&input, cursor, &mut out, handler)
            } else {
                self.scan_text(&input, cursor, &mut out, handler)
            };

            match step {
                Some(next) => cursor = next,
                None => break,
            }
        }

        self.position += cursor;
        self.pending = input.split_off(cursor);
        out
    }

    /// End the stream. Returns whatever could not be resolved as literal
    /// text, including the raw source of an artifact that never closed.
    pub fn finalize(mut self) -> String {
        let mut out = String::new();

        if let Some(artifact) = self.artifact.take() {
            warn!(
                stream_id = %self.stream_id,
                artifact_id = %artifact.id,
                in_action = self.action.is_some(),
                "Stream ended inside an unterminated artifact"
            );
            out.push_str(&artifact.source);
        }

        out.push_str(&self.pending);
        out
    }

    /// Outside any artifact: plain text passes through.
    fn scan_text<H>(&mut self, input: &str, at: usize, out: &mut String, handler: &mut H) -> Option<usize>
    where
        H: DirectiveHandler + ?Sized,
    {
        let rest = &input[at..];
        match rest.find('<') {
            None => {
                out.push_str(rest);
                return Some(input.len());
            }
            Some(0) => {}
            Some(offset) => {
                out.push_str(&rest[..offset]);
                return Some(at + offset);
            }
        }

        match match_open_tag(rest, ARTIFACT_OPEN, self.config.max_tag_len) {
            TagMatch::Partial => None,
            TagMatch::Full(len) => {
                let tag = &rest[..len];
                self.open_artifact(tag, out, handler);
                Some(at + len)
            }
            TagMatch::TooLong => {
                warn!(stream_id = %self.stream_id, position = self.position + at, "Artifact tag exceeds max_tag_len, treating as text");
                out.push('<');
                Some(at + 1)
            }
            TagMatch::NoMatch => {
                out.push('<');
                Some(at + 1)
            }
        }
    }

    /// Inside an artifact but between actions: text is dropped.
    fn scan_artifact<H>(&mut self, input: &str, at: usize, out: &mut String, handler: &mut H) -> Option<usize>
    where
        H: DirectiveHandler + ?Sized,
    {
        let rest = &input[at..];
        match rest.find('<') {
            None => {
                self.record(rest);
                return Some(input.len());
            }
            Some(0) => {}
            Some(offset) => {
                self.record(&rest[..offset]);
                return Some(at + offset);
            }
        }

        let max = self.config.max_tag_len;
        let close = match_literal(rest, ARTIFACT_CLOSE);
        let action = match_open_tag(rest, ACTION_OPEN, max);
        let nested = match_open_tag(rest, ARTIFACT_OPEN, max);

        if let TagMatch::Full(len) = close {
            self.close_artifact(handler);
            return Some(at + len);
        }

        if let TagMatch::Full(len) = action {
            let tag = &rest[..len];
            if self.open_action(tag, out, handler) {
                self.record(tag);
            }
            return Some(at + len);
        }

        if let TagMatch::Full(len) = nested {
            let tag = &rest[..len];
            warn!(
                stream_id = %self.stream_id,
                artifact_id = self.artifact.as_ref().map(|a| a.id.as_str()).unwrap_or_default(),
                tag,
                "Nested artifact tag, emitting as text"
            );
            out.push_str(tag);
            return Some(at + len);
        }

        if close.is_partial() || action.is_partial() || nested.is_partial() {
            return None;
        }

        self.record("<");
        Some(at + 1)
    }

    /// Inside an action: everything up to `</action>` is payload.
    fn scan_action<H>(&mut self, input: &str, at: usize, handler: &mut H) -> Option<usize>
    where
        H: DirectiveHandler + ?Sized,
    {
        let rest = &input[at..];
        if let Some(offset) = rest.find(ACTION_CLOSE) {
            let end = offset + ACTION_CLOSE.len();
            self.record(&rest[..end]);
            if let Some(action) = self.action.as_mut() {
                action.content.push_str(&rest[..offset]);
            }
            self.close_action(handler);
            return Some(at + end);
        }

        let take = rest.len() - partial_suffix_len(rest, ACTION_CLOSE);
        if take == 0 {
            return None;
        }

        let payload = &rest[..take];
        self.record(payload);
        if let Some(action) = self.action.as_mut() {
            action.content.push_str(payload);
        }
        Some(at + take)
    }

    fn open_artifact<H>(&mut self, tag: &str, out: &mut String, handler: &mut H)
    where
        H: DirectiveHandler + ?Sized,
    {
        let attrs = Attributes::parse(tag);
        let Some(id) = attrs.non_empty("id") else {
            warn!(stream_id = %self.stream_id, tag, "Artifact tag without id, emitting as text");
            out.push_str(tag);
            return;
        };
        let title = attrs.get("title").unwrap_or_default();

        debug!(stream_id = %self.stream_id, artifact_id = id, title, "Artifact opened");
        handler.artifact_opened(id, title);

        // the rendered element stands in for the opening tag
        let source = match &self.artifact_element {
            Some(element) => {
                out.push_str(&element(id, title));
                String::new()
            }
            None => tag.to_string(),
        };

        self.artifact = Some(OpenArtifact {
            id: id.to_string(),
            title: title.to_string(),
            next_ordinal: 0,
            source,
        });
    }

    fn close_artifact<H>(&mut self, handler: &mut H)
    where
        H: DirectiveHandler + ?Sized,
    {
        if let Some(artifact) = self.artifact.take() {
            debug!(
                stream_id = %self.stream_id,
                artifact_id = %artifact.id,
                title = %artifact.title,
                actions = artifact.next_ordinal,
                "Artifact closed"
            );
            handler.artifact_closed(&artifact.id);
        }
    }

    /// Returns false if the tag was malformed and emitted as text instead.
    fn open_action<H>(&mut self, tag: &str, out: &mut String, handler: &mut H) -> bool
    where
        H: DirectiveHandler + ?Sized,
    {
        let Some(artifact) = self.artifact.as_mut() else {
            return false;
        };

        let Some(kind) = action_kind(&Attributes::parse(tag)) else {
            warn!(
                stream_id = %self.stream_id,
                artifact_id = %artifact.id,
                tag,
                "Malformed action tag, emitting as text"
            );
            out.push_str(tag);
            return false;
        };

        let ordinal = artifact.next_ordinal;
        artifact.next_ordinal += 1;

        debug!(stream_id = %self.stream_id, artifact_id = %artifact.id, ordinal, kind = kind.name(), "Action ready");
        handler.action_ready(&artifact.id, ordinal, &kind);

        self.action = Some(OpenAction {
            ordinal,
            kind,
            content: String::new(),
        });
        true
    }

    fn close_action<H>(&mut self, handler: &mut H)
    where
        H: DirectiveHandler + ?Sized,
    {
        let (Some(action), Some(artifact)) = (self.action.take(), self.artifact.as_ref()) else {
            return;
        };

        let content = normalize_content(&action.kind, &action.content);
        debug!(
            stream_id = %self.stream_id,
            artifact_id = %artifact.id,
            ordinal = action.ordinal,
            bytes = content.len(),
            "Action closed"
        );
        handler.action_closed(&artifact.id, action.ordinal, &action.kind, &content);
    }

    /// Append consumed source to the open artifact's raw text.
    fn record(&mut self, text: &str) {
        if let Some(artifact) = self.artifact.as_mut() {
            artifact.source.push_str(text);
        }
    }
}

/// Resolve the kind of an action from its tag attributes.
///
/// Returns `None` when `type` is missing or a file action has no path.
fn action_kind(attrs: &Attributes) -> Option<ActionKind> {
    match attrs.non_empty("type")? {
        "file" => Some(ActionKind::File {
            file_path: attrs.non_empty("filePath")?.to_string(),
        }),
        "shell" => Some(ActionKind::Shell),
        other => Some(ActionKind::Opaque {
            kind: other.to_string(),
        }),
    }
}

/// Final content handed to the executor: trimmed, and files end in a newline.
fn normalize_content(kind: &ActionKind, raw: &str) -> String {
    let trimmed = raw.trim();
    match kind {
        ActionKind::File { .. } => format!("{trimmed}\n"),
        ActionKind::Shell | ActionKind::Opaque { .. } => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::DirectiveEvent;

    const DEMO: &str = r#"Hello <artifact id="a1" title="Demo"><action type="file" filePath="x.txt">hi</action></artifact> bye"#;

    fn parse_chunks(chunks: &[&str]) -> (String, Vec<DirectiveEvent>) {
        let mut parser = MessageParser::new("m1", ParserConfig::default());
        let mut events = Vec::new();
        let mut text = String::new();
        for chunk in chunks {
            text.push_str(&parser.consume(chunk, &mut events));
        }
        text.push_str(&parser.finalize());
        (text, events)
    }

    fn split_every_char(input: &str) -> Vec<&str> {
        input
            .char_indices()
            .map(|(i, c)| &input[i..i + c.len_utf8()])
            .collect()
    }

    #[test]
    fn test_demo_single_chunk() {
        let (text, events) = parse_chunks(&[DEMO]);
        assert_eq!(text, "Hello  bye");
        assert_eq!(
            events,
            vec![
                DirectiveEvent::ArtifactOpened {
                    artifact_id: "a1".into(),
                    title: "Demo".into(),
                },
                DirectiveEvent::ActionReady {
                    artifact_id: "a1".into(),
                    ordinal: 0,
                    kind: ActionKind::File {
                        file_path: "x.txt".into()
                    },
                },
                DirectiveEvent::ActionClosed {
                    artifact_id: "a1".into(),
                    ordinal: 0,
                    kind: ActionKind::File {
                        file_path: "x.txt".into()
                    },
                    content: "hi\n".into(),
                },
                DirectiveEvent::ArtifactClosed {
                    artifact_id: "a1".into()
                },
            ]
        );
    }

    #[test]
    fn test_demo_split_every_char() {
        let whole = parse_chunks(&[DEMO]);
        let split = parse_chunks(&split_every_char(DEMO));
        assert_eq!(whole, split);
    }

    #[test]
    fn test_text_is_emitted_before_stream_ends() {
        let mut parser = MessageParser::new("m1", ParserConfig::default());
        let mut events = Vec::new();
        assert_eq!(parser.consume("Hello <art", &mut events), "Hello ");
        assert_eq!(parser.pending(), "<art");
        assert_eq!(parser.consume("ifact id=\"a\" title=\"t\">", &mut events), "");
        assert!(parser.in_artifact());
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_lone_angle_bracket_passes_through() {
        let (text, events) = parse_chunks(&["if a < b and c <d> then <", "/p>"]);
        assert_eq!(text, "if a < b and c <d> then </p>");
        assert!(events.is_empty());
    }

    #[test]
    fn test_similar_tag_names_are_text() {
        let (text, events) = parse_chunks(&["<artifactory> <art>"]);
        assert_eq!(text, "<artifactory> <art>");
        assert!(events.is_empty());
    }

    #[test]
    fn test_stray_closing_tags_are_text() {
        let (text, events) = parse_chunks(&["a </artifact> b </action> c"]);
        assert_eq!(text, "a </artifact> b </action> c");
        assert!(events.is_empty());
    }

    #[test]
    fn test_action_outside_artifact_is_text() {
        let input = r#"<action type="shell">ls</action>"#;
        let (text, events) = parse_chunks(&[input]);
        assert_eq!(text, input);
        assert!(events.is_empty());
    }

    #[test]
    fn test_multiple_actions_get_ordinals() {
        let input = concat!(
            r#"<artifact id="app" title="App">"#,
            "\n  ",
            r#"<action type="file" filePath="package.json">{"name":"x"}</action>"#,
            "\n  ",
            r#"<action type="shell">npm install</action>"#,
            "\n",
            r#"<action type="preview">3000</action>"#,
            "</artifact>",
        );
        let (text, events) = parse_chunks(&[input]);
        assert_eq!(text, "");

        let closed: Vec<(u32, String, String)> = events
            .iter()
            .filter_map(|e| match e {
                DirectiveEvent::ActionClosed {
                    ordinal,
                    kind,
                    content,
                    ..
                } => Some((*ordinal, kind.name().to_string(), content.clone())),
                _ => None,
            })
            .collect();

        assert_eq!(
            closed,
            vec![
                (0, "file".to_string(), "{\"name\":\"x\"}\n".to_string()),
                (1, "shell".to_string(), "npm install".to_string()),
                (2, "preview".to_string(), "3000".to_string()),
            ]
        );
    }

    #[test]
    fn test_ordinals_restart_per_artifact() {
        let input = concat!(
            r#"<artifact id="a" title="A"><action type="shell">one</action></artifact>"#,
            r#"<artifact id="b" title="B"><action type="shell">two</action></artifact>"#,
        );
        let (_, events) = parse_chunks(&[input]);
        let ready: Vec<(String, u32)> = events
            .iter()
            .filter_map(|e| match e {
                DirectiveEvent::ActionReady {
                    artifact_id,
                    ordinal,
                    ..
                } => Some((artifact_id.clone(), *ordinal)),
                _ => None,
            })
            .collect();
        assert_eq!(ready, vec![("a".to_string(), 0), ("b".to_string(), 0)]);
    }

    #[test]
    fn test_action_ready_fires_before_payload_arrives() {
        let mut parser = MessageParser::new("m1", ParserConfig::default());
        let mut events = Vec::new();
        parser.consume(
            r#"<artifact id="a" title="A"><action type="shell">npm "#,
            &mut events,
        );
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], DirectiveEvent::ActionReady { .. }));
        assert!(parser.in_action());

        parser.consume("run dev</act", &mut events);
        assert_eq!(events.len(), 2);
        assert_eq!(parser.pending(), "</act");

        parser.consume("ion>", &mut events);
        assert_eq!(
            events[2],
            DirectiveEvent::ActionClosed {
                artifact_id: "a".into(),
                ordinal: 0,
                kind: ActionKind::Shell,
                content: "npm run dev".into(),
            }
        );
    }

    #[test]
    fn test_payload_may_contain_tags() {
        let input = concat!(
            r#"<artifact id="a" title="A"><action type="file" filePath="index.html">"#,
            "<html><action>not a tag</html>",
            "</action></artifact>",
        );
        let (_, events) = parse_chunks(&[input]);
        let content = events.iter().find_map(|e| match e {
            DirectiveEvent::ActionClosed { content, .. } => Some(content.clone()),
            _ => None,
        });
        assert_eq!(
            content.as_deref(),
            Some("<html><action>not a tag</html>\n")
        );
    }

    #[test]
    fn test_single_quotes_and_attribute_order() {
        let input = "<artifact title='T' id='a9'><action filePath='src/x.rs' type='file'>fn main() {}</action></artifact>";
        let (_, events) = parse_chunks(&[input]);
        assert_eq!(
            events[0],
            DirectiveEvent::ArtifactOpened {
                artifact_id: "a9".into(),
                title: "T".into(),
            }
        );
        assert!(matches!(
            &events[1],
            DirectiveEvent::ActionReady { kind: ActionKind::File { file_path }, .. } if file_path == "src/x.rs"
        ));
    }

    #[test]
    fn test_unterminated_artifact_surfaces_on_finalize() {
        let mut parser = MessageParser::new("m1", ParserConfig::default());
        let mut events = Vec::new();
        let tag = r#"<artifact id="a1" title="t">"#;

        assert_eq!(parser.consume(tag, &mut events), "");
        assert_eq!(events.len(), 1);
        assert_eq!(parser.finalize(), tag);
    }

    #[test]
    fn test_unterminated_artifact_does_not_repeat_emitted_text() {
        let input = concat!(
            r#"<artifact id="a" title="t">"#,
            r#"<action type="file">x"#,
            r#"<artifact id="b" title="u">y"#,
        );
        let whole = parse_chunks(&[input]);
        assert_eq!(
            whole.0,
            concat!(
                r#"<action type="file">"#,
                r#"<artifact id="b" title="u">"#,
                r#"<artifact id="a" title="t">xy"#,
            )
        );
        assert_eq!(whole, parse_chunks(&split_every_char(input)));
    }

    #[test]
    fn test_unterminated_artifact_after_placeholder() {
        let element: ArtifactElement = Arc::new(|id: &str, _title: &str| format!("[{id}]"));
        let mut parser = MessageParser::new("m1", ParserConfig::default()).with_artifact_element(element);
        let mut events = Vec::new();

        let text = parser.consume(r#"<artifact id="a" title="t"><action type="shell">ls"#, &mut events);
        assert_eq!(text, "[a]");
        assert_eq!(parser.finalize(), r#"<action type="shell">ls"#);
    }

    #[test]
    fn test_unterminated_action_is_never_closed() {
        let input = r#"<artifact id="a1" title="t"><action type="shell">rm -rf bu"#;
        let (text, events) = parse_chunks(&[input]);
        assert_eq!(text, input);
        assert!(!events
            .iter()
            .any(|e| matches!(e, DirectiveEvent::ActionClosed { .. })));
    }

    #[test]
    fn test_partial_tag_at_end_of_stream_is_flushed() {
        let (text, events) = parse_chunks(&["see <artif"]);
        assert_eq!(text, "see <artif");
        assert!(events.is_empty());
    }

    #[test]
    fn test_nested_artifact_is_literal() {
        let input = concat!(
            r#"<artifact id="a" title="A">"#,
            r#"<artifact id="b" title="B">"#,
            r#"<action type="shell">ls</action>"#,
            "</artifact>",
        );
        let (text, events) = parse_chunks(&[input]);
        assert_eq!(text, r#"<artifact id="b" title="B">"#);
        let opened = events
            .iter()
            .filter(|e| matches!(e, DirectiveEvent::ArtifactOpened { .. }))
            .count();
        assert_eq!(opened, 1);
        assert!(events.iter().all(|e| e.artifact_id() == "a"));
    }

    #[test]
    fn test_malformed_tags_degrade_to_text() {
        let input = concat!(
            r#"<artifact title="no id">x "#,
            r#"<artifact id="ok" title="t">"#,
            r#"<action type="file">missing path</action>"#,
            r#"<action>missing type</action>"#,
            "</artifact>",
        );
        let (text, events) = parse_chunks(&[input]);
        assert_eq!(
            text,
            r#"<artifact title="no id">x <action type="file"><action>"#
        );
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_overlong_tag_is_text() {
        let config = ParserConfig { max_tag_len: 32 };
        let mut parser = MessageParser::new("m1", config);
        let mut events = Vec::new();
        let input = r#"<artifact id="a1" title="a very long title indeed">"#;
        let text = parser.consume(input, &mut events);
        assert_eq!(text, input);
        assert!(events.is_empty());
    }

    #[test]
    fn test_artifact_element_placeholder() {
        let element: ArtifactElement = Arc::new(|id: &str, title: &str| format!("[{title}:{id}]"));
        let mut parser = MessageParser::new("m1", ParserConfig::default()).with_artifact_element(element);
        let mut events = Vec::new();
        let text = parser.consume(DEMO, &mut events);
        assert_eq!(text, "Hello [Demo:a1] bye");
    }

    #[test]
    fn test_multibyte_text_split_everywhere() {
        let input = "héllo → <artifact id=\"ü\" title=\"日本\"><action type=\"shell\">echo ✓</action></artifact> 終わり";
        let whole = parse_chunks(&[input]);
        let split = parse_chunks(&split_every_char(input));
        assert_eq!(whole, split);
        assert_eq!(whole.0, "héllo →  終わり");
    }

    #[test]
    fn test_position_tracks_consumed_bytes() {
        let mut parser = MessageParser::new("m1", ParserConfig::default());
        let mut events = Vec::new();
        parser.consume("abc<art", &mut events);
        assert_eq!(parser.position(), 3);
        parser.consume("x", &mut events);
        assert_eq!(parser.position(), 8);
    }
}
