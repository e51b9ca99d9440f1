use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span, Text};
use std::sync::OnceLock;
use syntect::easy::HighlightLines;
use syntect::highlighting::ThemeSet;
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

const THEME_NAME: &str = "base16-ocean.dark";

static SYNTAX_SET: OnceLock<SyntaxSet> = OnceLock::new();
static THEME_SET: OnceLock<ThemeSet> = OnceLock::new();

fn syntax_set() -> &'static SyntaxSet {
    SYNTAX_SET.get_or_init(SyntaxSet::load_defaults_newlines)
}

fn theme_set() -> &'static ThemeSet {
    THEME_SET.get_or_init(ThemeSet::load_defaults)
}

/// Colours `text` for `language` (a syntax token such as `sql`). Unknown
/// languages and highlighter errors degrade to unstyled lines.
pub fn highlight(language: &str, text: &str) -> Text<'static> {
    let syntaxes = syntax_set();
    let Some(theme) = theme_set().themes.get(THEME_NAME) else {
        return plain(text);
    };
    let syntax = syntaxes
        .find_syntax_by_token(language)
        .unwrap_or_else(|| syntaxes.find_syntax_plain_text());
    let mut highlighter = HighlightLines::new(syntax, theme);

    let mut lines = Vec::new();
    for line in LinesWithEndings::from(text) {
        let Ok(ranges) = highlighter.highlight_line(line, syntaxes) else {
            lines.push(Line::from(trim_newline(line).to_string()));
            continue;
        };
        let spans = ranges
            .into_iter()
            .filter_map(|(style, piece)| {
                let piece = trim_newline(piece);
                (!piece.is_empty()).then(|| {
                    let fg = Color::Rgb(style.foreground.r, style.foreground.g, style.foreground.b);
                    Span::styled(piece.to_string(), Style::default().fg(fg))
                })
            })
            .collect::<Vec<_>>();
        lines.push(Line::from(spans));
    }
    Text::from(lines)
}

fn plain(text: &str) -> Text<'static> {
    Text::from(
        text.lines()
            .map(|line| Line::from(line.to_string()))
            .collect::<Vec<_>>(),
    )
}

fn trim_newline(text: &str) -> &str {
    text.trim_end_matches(['\n', '\r'])
}
