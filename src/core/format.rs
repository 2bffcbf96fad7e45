//! Record rendering
//!
//! A template identifier is compiled once, when a sink is configured, into
//! a [`FormatRenderer`]. Identifiers:
//! - `plain`: fixed field order, no color codes
//! - `colorized` / `color`: same fields wrapped in ANSI colors
//! - `json` / `serialized`: one JSON object per line
//! - anything containing `{`: a custom pattern, e.g.
//!   `<green>{time:%H:%M:%S}</green> | <level>{level: <8}</level> | {message}`
//!
//! Every rendered record ends with a single `\n`.

use super::error::{LoggerError, Result};
use super::record::{escape_control, Record};
use chrono::format::{Item, StrftimeItems};
use chrono::Local;
use colored::Color;
use std::fmt::Write as _;
use std::str::FromStr;

/// Fixed-order plain template
pub const PLAIN_TEMPLATE: &str =
    "{time:%Y-%m-%d %H:%M:%S} | {level} | {file} | {process}:{thread} | {function}:{line} | {message}";

/// Same fields as [`PLAIN_TEMPLATE`], with color markup
pub const COLORIZED_TEMPLATE: &str = "<green>{time:%Y-%m-%d %H:%M:%S}</green> | <level>{level}</level> | \
     <cyan>{file}</cyan> | <cyan>{process}:{thread}</cyan> | <cyan>{function}:{line}</cyan> | \
     <level>{message}</level>";

/// Default for the global `log_format` option
pub const DEFAULT_LOG_FORMAT: &str =
    "{time:%Y-%m-%d %H:%M:%S%.3f} | {level: <8} | {name} | {function} | {line} | {message}";

const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
const ANSI_RESET: &str = "\x1b[0m";

/// A validated template identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template {
    Plain,
    Colorized,
    Json,
    Pattern(String),
}

impl FromStr for Template {
    type Err = LoggerError;

    fn from_str(id: &str) -> Result<Self> {
        match id.trim() {
            "plain" | "text" => Ok(Template::Plain),
            "colorized" | "color" => Ok(Template::Colorized),
            "json" | "serialized" => Ok(Template::Json),
            pattern if pattern.contains('{') => Ok(Template::Pattern(id.to_string())),
            other => Err(LoggerError::config(
                "template",
                format!("unknown template identifier '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
    Center,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AlignSpec {
    fill: char,
    align: Align,
    width: usize,
}

impl AlignSpec {
    /// Parse a `[[fill]align]width` spec such as ` <8`, `>4` or `7`
    fn parse(spec: &str) -> Option<Self> {
        let chars: Vec<char> = spec.chars().collect();
        let to_align = |c: char| match c {
            '<' => Some(Align::Left),
            '>' => Some(Align::Right),
            '^' => Some(Align::Center),
            _ => None,
        };

        let (fill, align, rest) = match chars.as_slice() {
            [fill, a, rest @ ..] if to_align(*a).is_some() => (*fill, to_align(*a)?, rest),
            [a, rest @ ..] if to_align(*a).is_some() => (' ', to_align(*a)?, rest),
            rest => (' ', Align::Left, rest),
        };

        let width: String = rest.iter().collect();
        let width = width.parse().ok()?;
        Some(Self { fill, align, width })
    }

    fn apply(&self, value: &str) -> String {
        let len = value.chars().count();
        if len >= self.width {
            return value.to_string();
        }
        let pad = self.width - len;
        let fill = |n: usize| std::iter::repeat(self.fill).take(n).collect::<String>();
        match self.align {
            Align::Left => format!("{}{}", value, fill(pad)),
            Align::Right => format!("{}{}", fill(pad), value),
            Align::Center => format!("{}{}{}", fill(pad / 2), value, fill(pad - pad / 2)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Placeholder {
    Time(String),
    Level,
    Name,
    File,
    Function,
    Line,
    Process,
    Thread,
    Message,
    Extra,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Color(Color),
    Bold,
    Level,
}

impl Style {
    fn from_tag(tag: &str) -> Option<Self> {
        let style = match tag {
            "level" => Style::Level,
            "bold" | "b" => Style::Bold,
            "green" => Style::Color(Color::Green),
            "cyan" => Style::Color(Color::Cyan),
            "red" => Style::Color(Color::Red),
            "yellow" => Style::Color(Color::Yellow),
            "blue" => Style::Color(Color::Blue),
            "magenta" => Style::Color(Color::Magenta),
            "white" => Style::Color(Color::White),
            "black" => Style::Color(Color::Black),
            _ => return None,
        };
        Some(style)
    }

    fn ansi(&self, record: &Record) -> String {
        match self {
            Style::Color(color) => format!("\x1b[{}m", color.to_fg_str()),
            Style::Bold => "\x1b[1m".to_string(),
            Style::Level => format!("\x1b[{}m", record.severity().color_code().to_fg_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field {
        placeholder: Placeholder,
        align: Option<AlignSpec>,
    },
    StyleStart(Style),
    StyleEnd,
}

fn pattern_error(pattern: &str, message: impl Into<String>) -> LoggerError {
    LoggerError::config(
        "template",
        format!("{} in pattern '{}'", message.into(), pattern),
    )
}

fn parse_placeholder(pattern: &str, body: &str) -> Result<Segment> {
    let (name, spec) = match body.split_once(':') {
        Some((name, spec)) => (name.trim(), Some(spec)),
        None => (body.trim(), None),
    };

    if name == "time" {
        let format = spec.unwrap_or(DEFAULT_TIME_FORMAT).to_string();
        if StrftimeItems::new(&format).any(|item| matches!(item, Item::Error)) {
            return Err(pattern_error(
                pattern,
                format!("invalid time format '{}'", format),
            ));
        }
        return Ok(Segment::Field {
            placeholder: Placeholder::Time(format),
            align: None,
        });
    }

    let placeholder = match name {
        "level" => Placeholder::Level,
        "name" => Placeholder::Name,
        "file" => Placeholder::File,
        "function" => Placeholder::Function,
        "line" => Placeholder::Line,
        "process" => Placeholder::Process,
        "thread" => Placeholder::Thread,
        "message" => Placeholder::Message,
        "extra" => Placeholder::Extra,
        other => {
            return Err(pattern_error(
                pattern,
                format!("unknown placeholder '{{{}}}'", other),
            ))
        }
    };

    let align = match spec {
        Some(spec) => Some(AlignSpec::parse(spec).ok_or_else(|| {
            pattern_error(pattern, format!("invalid alignment spec '{}'", spec))
        })?),
        None => None,
    };

    Ok(Segment::Field { placeholder, align })
}

/// Try to read a markup tag starting at `chars[start] == '<'`
///
/// Returns `(tag, closing, end_index)` for anything shaped like `<name>`,
/// `</name>` or `</>`.
fn read_tag(chars: &[char], start: usize) -> Option<(String, bool, usize)> {
    let mut i = start + 1;
    let closing = chars.get(i) == Some(&'/');
    if closing {
        i += 1;
    }
    let name_start = i;
    while i < chars.len() && chars[i].is_ascii_alphabetic() {
        i += 1;
    }
    if chars.get(i) != Some(&'>') {
        return None;
    }
    if i == name_start && !closing {
        return None;
    }
    Some((chars[name_start..i].iter().collect(), closing, i))
}

fn compile_pattern(pattern: &str) -> Result<Vec<Segment>> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut open_tags: Vec<String> = Vec::new();
    let mut i = 0;

    let flush = |literal: &mut String, segments: &mut Vec<Segment>| {
        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(literal)));
        }
    };

    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => {
                literal.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                literal.push('}');
                i += 2;
            }
            '{' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|c| *c == '}')
                    .map(|offset| i + 1 + offset)
                    .ok_or_else(|| pattern_error(pattern, "unclosed '{'"))?;
                let body: String = chars[i + 1..end].iter().collect();
                if body.contains('{') {
                    return Err(pattern_error(pattern, "nested '{'"));
                }
                flush(&mut literal, &mut segments);
                segments.push(parse_placeholder(pattern, &body)?);
                i = end + 1;
            }
            '}' => return Err(pattern_error(pattern, "unmatched '}'")),
            '\\' if chars.get(i + 1) == Some(&'<') => {
                literal.push('<');
                i += 2;
            }
            '<' => match read_tag(&chars, i) {
                Some((tag, closing, end)) => {
                    flush(&mut literal, &mut segments);
                    if closing {
                        let open = open_tags.pop().ok_or_else(|| {
                            pattern_error(pattern, format!("closing tag '</{}>' without opening", tag))
                        })?;
                        if !tag.is_empty() && tag != open {
                            return Err(pattern_error(
                                pattern,
                                format!("tag '<{}>' closed by '</{}>'", open, tag),
                            ));
                        }
                        segments.push(Segment::StyleEnd);
                    } else {
                        let style = Style::from_tag(&tag).ok_or_else(|| {
                            pattern_error(pattern, format!("unknown markup tag '<{}>'", tag))
                        })?;
                        open_tags.push(tag);
                        segments.push(Segment::StyleStart(style));
                    }
                    i = end + 1;
                }
                None => {
                    literal.push('<');
                    i += 1;
                }
            },
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }

    if let Some(tag) = open_tags.last() {
        return Err(pattern_error(pattern, format!("unclosed markup tag '<{}>'", tag)));
    }
    flush(&mut literal, &mut segments);
    Ok(segments)
}

#[derive(Debug, Clone)]
enum RenderKind {
    Text {
        segments: Vec<Segment>,
        colorize: bool,
        has_extra: bool,
    },
    Json,
}

/// Compiled, validated renderer for one sink
#[derive(Debug, Clone)]
pub struct FormatRenderer {
    template: Template,
    kind: RenderKind,
}

impl FormatRenderer {
    /// Compile a template identifier
    ///
    /// `colorize` applies to custom patterns only; `plain` never colors and
    /// `colorized` always does.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unknown identifiers or malformed
    /// patterns.
    pub fn compile(template_id: &str, colorize: bool) -> Result<Self> {
        let template: Template = template_id.parse()?;
        let kind = match &template {
            Template::Plain => Self::text(PLAIN_TEMPLATE, false)?,
            Template::Colorized => Self::text(COLORIZED_TEMPLATE, true)?,
            Template::Json => RenderKind::Json,
            Template::Pattern(pattern) => Self::text(pattern, colorize)?,
        };
        Ok(Self { template, kind })
    }

    fn text(pattern: &str, colorize: bool) -> Result<RenderKind> {
        let segments = compile_pattern(pattern)?;
        let has_extra = segments.iter().any(|s| {
            matches!(
                s,
                Segment::Field {
                    placeholder: Placeholder::Extra,
                    ..
                }
            )
        });
        Ok(RenderKind::Text {
            segments,
            colorize,
            has_extra,
        })
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Render a record to bytes, newline-terminated
    pub fn render(&self, record: &Record) -> Vec<u8> {
        self.render_string(record).into_bytes()
    }

    pub fn render_string(&self, record: &Record) -> String {
        let mut out = match &self.kind {
            RenderKind::Text {
                segments,
                colorize,
                has_extra,
            } => Self::render_text(record, segments, *colorize, *has_extra),
            RenderKind::Json => Self::render_json(record),
        };
        out.push('\n');
        out
    }

    fn render_text(record: &Record, segments: &[Segment], colorize: bool, has_extra: bool) -> String {
        let mut out = String::with_capacity(128);
        let mut active: Vec<Style> = Vec::new();

        for segment in segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field { placeholder, align } => {
                    let value = Self::field_value(record, placeholder);
                    match align {
                        Some(spec) => out.push_str(&spec.apply(&value)),
                        None => out.push_str(&value),
                    }
                }
                Segment::StyleStart(style) => {
                    active.push(*style);
                    if colorize {
                        out.push_str(&style.ansi(record));
                    }
                }
                Segment::StyleEnd => {
                    active.pop();
                    if colorize {
                        out.push_str(ANSI_RESET);
                        for style in &active {
                            out.push_str(&style.ansi(record));
                        }
                    }
                }
            }
        }

        if !has_extra && !record.fields().is_empty() {
            out.push(' ');
            out.push_str(&record.fields().format_pairs());
        }
        out
    }

    fn field_value(record: &Record, placeholder: &Placeholder) -> String {
        let location = record.location();
        match placeholder {
            Placeholder::Time(format) => {
                let mut rendered = String::new();
                let local = record.timestamp().with_timezone(&Local);
                // format validated at compile time
                let _ = write!(rendered, "{}", local.format(format));
                rendered
            }
            Placeholder::Level => record.severity().to_str().to_string(),
            Placeholder::Name => record
                .logger()
                .map(escape_control)
                .or_else(|| location.and_then(|l| l.function.as_deref().map(escape_control)))
                .unwrap_or_else(|| "root".to_string()),
            Placeholder::File => location
                .map(|l| {
                    escape_control(
                        std::path::Path::new(&l.file)
                            .file_name()
                            .and_then(|n| n.to_str())
                            .unwrap_or(&l.file),
                    )
                })
                .unwrap_or_else(|| "-".to_string()),
            Placeholder::Function => location
                .and_then(|l| l.function.as_deref().map(escape_control))
                .unwrap_or_else(|| "-".to_string()),
            Placeholder::Line => location
                .map(|l| l.line.to_string())
                .unwrap_or_else(|| "0".to_string()),
            Placeholder::Process => record.process_id().to_string(),
            Placeholder::Thread => escape_control(record.thread_label()),
            Placeholder::Message => record.message().to_string(),
            Placeholder::Extra => record.fields().format_pairs(),
        }
    }

    fn render_json(record: &Record) -> String {
        use serde_json::Value;

        let mut json_obj = serde_json::Map::new();
        json_obj.insert(
            "timestamp".to_string(),
            Value::String(
                record
                    .timestamp()
                    .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            ),
        );
        json_obj.insert(
            "level".to_string(),
            Value::String(record.severity().to_str().to_string()),
        );
        json_obj.insert(
            "message".to_string(),
            Value::String(record.message().to_string()),
        );
        if let Some(logger) = record.logger() {
            json_obj.insert("logger".to_string(), Value::String(logger.to_string()));
        }
        if let Some(location) = record.location() {
            json_obj.insert("file".to_string(), Value::String(location.file.clone()));
            json_obj.insert("line".to_string(), Value::Number(location.line.into()));
            if let Some(ref function) = location.function {
                json_obj.insert("function".to_string(), Value::String(function.clone()));
            }
        }
        json_obj.insert(
            "process".to_string(),
            Value::Number(record.process_id().into()),
        );
        json_obj.insert(
            "thread_id".to_string(),
            Value::String(record.thread_id().to_string()),
        );
        if let Some(name) = record.thread_name() {
            json_obj.insert("thread_name".to_string(), Value::String(name.to_string()));
        }
        if !record.fields().is_empty() {
            let fields = record
                .fields()
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json_value()))
                .collect();
            json_obj.insert("fields".to_string(), Value::Object(fields));
        }

        serde_json::to_string(&Value::Object(json_obj)).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::Location;
    use crate::core::severity::Severity;

    fn sample() -> Record {
        Record::new(Severity::Warning, "disk almost full")
            .with_location(Location::new("src/storage/disk.rs", 88).with_function("check_space"))
    }

    #[test]
    fn test_plain_field_order() {
        let renderer = FormatRenderer::compile("plain", true).unwrap();
        let line = renderer.render_string(&sample());

        assert!(line.ends_with('\n'));
        assert!(!line.contains('\x1b'));
        let parts: Vec<&str> = line.trim_end().split(" | ").collect();
        assert_eq!(parts.len(), 6);
        assert_eq!(parts[1], "WARNING");
        assert_eq!(parts[2], "disk.rs");
        assert!(parts[3].starts_with(&format!("{}:", std::process::id())));
        assert_eq!(parts[4], "check_space:88");
        assert_eq!(parts[5], "disk almost full");
    }

    #[test]
    fn test_colorized_wraps_fields() {
        let renderer = FormatRenderer::compile("colorized", false).unwrap();
        let line = renderer.render_string(&sample());

        let yellow = format!("\x1b[{}m", Color::Yellow.to_fg_str());
        assert!(line.contains(&format!("{}WARNING{}", yellow, ANSI_RESET)));
        assert!(line.contains("disk almost full"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let record = sample().with_field("free_mb", 12).with_field("disk", "sda1");
        let renderer = FormatRenderer::compile("plain", false).unwrap();
        assert_eq!(renderer.render(&record), renderer.render(&record));
        assert!(renderer
            .render_string(&record)
            .ends_with("disk almost full disk=sda1 free_mb=12\n"));
    }

    #[test]
    fn test_json_render() {
        let record = sample().with_field("free_mb", 12).with_logger("storage");
        let renderer = FormatRenderer::compile("json", false).unwrap();
        let line = renderer.render_string(&record);

        let parsed: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(parsed["level"], "WARNING");
        assert_eq!(parsed["message"], "disk almost full");
        assert_eq!(parsed["logger"], "storage");
        assert_eq!(parsed["line"], 88);
        assert_eq!(parsed["fields"]["free_mb"], 12);
    }

    #[test]
    fn test_custom_pattern_alignment() {
        let renderer = FormatRenderer::compile("[{level: <8}] {line:>4} {name}", false).unwrap();
        let record = Record::new(Severity::Info, "x")
            .with_location(Location::new("a.rs", 7))
            .with_logger("api");
        assert_eq!(renderer.render_string(&record), "[INFO    ]    7 api\n");
    }

    #[test]
    fn test_custom_pattern_markup_stripped_without_color() {
        let renderer = FormatRenderer::compile("<red>{level}</red> {message}", false).unwrap();
        let record = Record::new(Severity::Error, "boom");
        assert_eq!(renderer.render_string(&record), "ERROR boom\n");
    }

    #[test]
    fn test_extra_placeholder_and_escapes() {
        let renderer = FormatRenderer::compile("{{{message}}} [{extra}] \\<x>", false).unwrap();
        let record = Record::new(Severity::Info, "hi").with_field("k", 1);
        assert_eq!(renderer.render_string(&record), "{hi} [k=1] <x>\n");
    }

    #[test]
    fn test_text_output_cannot_forge_lines() {
        let renderer = FormatRenderer::compile("{name} [{thread}] {message}", false).unwrap();
        let record = std::thread::Builder::new()
            .name("worker\n1".to_string())
            .spawn(|| {
                Record::new(Severity::Info, "ok")
                    .with_logger("api\r\nERROR | forged")
                    .with_field("user", "alice\nERROR | forged")
                    .with_field("bad\tkey", 1)
            })
            .unwrap()
            .join()
            .unwrap();

        let line = renderer.render_string(&record);
        assert_eq!(line.matches('\n').count(), 1);
        assert_eq!(
            line,
            "api\\r\\nERROR | forged [worker\\n1] ok bad\\tkey=1 user=alice\\nERROR | forged\n"
        );

        let plain = FormatRenderer::compile("plain", false).unwrap().render_string(&record);
        assert!(plain.ends_with(" | ok bad\\tkey=1 user=alice\\nERROR | forged\n"));
        assert_eq!(plain.matches('\n').count(), 1);
    }

    #[test]
    fn test_default_log_format_compiles() {
        assert!(FormatRenderer::compile(DEFAULT_LOG_FORMAT, false).is_ok());
    }

    #[test]
    fn test_invalid_templates_are_config_errors() {
        for id in [
            "fancy",
            "{nope}",
            "{message",
            "message}",
            "<purple>{message}</purple>",
            "<red>{message}",
            "<red>{message}</green>",
            "{level:abc}",
            "{time:%Q}",
        ] {
            let err = FormatRenderer::compile(id, false).unwrap_err();
            assert!(err.is_config(), "'{}' gave {:?}", id, err);
        }
    }
}
