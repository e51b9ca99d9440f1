use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

use crate::app::App;
use crate::config::{ATLAS_CONFIG_FILE_NAME, DB_URL_KEY};
use crate::model::Stage;
use crate::output::OutputBlock;
use crate::overlay::{
    ConfigEditor, ConfirmModal, HELP_LINES, HELP_WIDTH, HelpDialog, Overlay, PreviewPane,
};

const BG: Color = Color::Rgb(9, 15, 25);
const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const ERROR: Color = Color::Rgb(248, 113, 113);
const LOGO: Color = Color::Rgb(152, 224, 234);
const PL_A: Color = Color::Rgb(17, 94, 89);
const PL_B: Color = Color::Rgb(30, 64, 175);
const PL_C: Color = Color::Rgb(55, 48, 163);
const PL_D: Color = Color::Rgb(82, 24, 124);

const FOOTER_KEYS_NORMAL: &str =
    "tab/shift+tab:stage • ↓/↑:scroll • enter:run • i:edit cmd • e:env • c:config • h:help • q:quit";
const FOOTER_KEYS_EDIT: &str = "edit mode: Esc to exit, Enter to run";
const LINT_LOGIN_WARNING: &str = "(not logged in: may fail; run 'atlas login')";

pub fn render(frame: &mut Frame, app: &mut App) {
    let screen = frame.area();
    match app.overlay_mut() {
        Some(Overlay::Preview(pane)) => {
            render_preview(frame, screen, pane);
            return;
        }
        Some(Overlay::Editor(editor)) => {
            render_config_editor(frame, screen, editor);
            return;
        }
        _ => {}
    }

    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(screen);

    render_header(frame, root[0], app);
    render_stage_strip(frame, root[1], app);
    render_body(frame, root[2], app);
    render_footer(frame, root[3], app);

    match app.overlay() {
        Some(Overlay::Confirm(modal)) => render_confirm_modal(frame, modal),
        Some(Overlay::Help(help)) => render_help(frame, help),
        _ => {}
    }
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let left_line = build_left_header_line(app);
    let right_line = build_right_header_line(app);
    let right_width = spans_width(&right_line.spans) as u16;
    if area.width < 42 || right_width == 0 || right_width >= area.width {
        frame.render_widget(
            Paragraph::new(left_line).style(Style::default().bg(BG).fg(Color::White)),
            area,
        );
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(right_width)])
        .split(area);
    frame.render_widget(
        Paragraph::new(left_line).style(Style::default().bg(BG).fg(Color::White)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(right_line).style(Style::default().bg(BG)),
        chunks[1],
    );
}

fn build_left_header_line(app: &App) -> Line<'static> {
    let (environment, _) = app.environment();
    let mut spans = Vec::new();
    push_powerline_segment(&mut spans, " ATLAS9 ", Color::Black, LOGO, PL_A);
    push_powerline_segment(
        &mut spans,
        format!(" env: {} ", compact_text(&environment, 16)),
        Color::White,
        PL_A,
        PL_B,
    );
    push_powerline_segment(
        &mut spans,
        format!(" {} ", app.stage().title()),
        Color::White,
        PL_B,
        BG,
    );
    Line::from(spans)
}

fn status_glyph(ok: bool) -> (&'static str, Color) {
    if ok { ("✔", ACCENT) } else { ("✘", ERROR) }
}

fn build_right_header_line(app: &App) -> Line<'static> {
    let probes = app.probes();
    let (environment, _) = app.environment();
    let declared = app
        .known_environments()
        .iter()
        .any(|name| *name == environment);
    let has_db_url = app
        .lookup(DB_URL_KEY)
        .is_some_and(|value| !value.trim().is_empty());

    let items = [
        ("docker".to_string(), probes.docker_ok),
        (
            format!("{ATLAS_CONFIG_FILE_NAME}: {}", compact_text(&environment, 12)),
            declared,
        ),
        (DB_URL_KEY.to_string(), has_db_url),
        ("login".to_string(), probes.logged_in),
    ];

    let mut spans = Vec::new();
    for (label, ok) in items {
        let (glyph, color) = status_glyph(ok);
        spans.push(Span::styled(format!(" {label} "), Style::default().fg(MUTED)));
        spans.push(Span::styled(
            glyph,
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::raw(" "));
    }
    Line::from(spans)
}

fn render_stage_strip(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![Span::raw(" ")];
    for (index, stage) in Stage::ALL.iter().enumerate() {
        if index > 0 {
            spans.push(Span::styled(" → ", Style::default().fg(MUTED)));
        }
        let style = if *stage == app.stage() {
            Style::default()
                .fg(Color::Black)
                .bg(ACCENT)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(MUTED)
        };
        spans.push(Span::styled(format!(" {} ", stage.title()), style));
    }
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        area,
    );
}

fn render_body(frame: &mut Frame, area: Rect, app: &mut App) {
    let block = Block::default()
        .title(" Output ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(LOGO))
        .style(Style::default().bg(PANEL));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(1),
        ])
        .split(inner);

    let mut description = vec![Span::styled(
        app.stage().description(),
        Style::default().fg(LOGO).add_modifier(Modifier::BOLD),
    )];
    if app.stage() == Stage::Lint && !app.probes().logged_in {
        description.push(Span::styled(
            format!("  {LINT_LOGIN_WARNING}"),
            Style::default().fg(WARN),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(description)), rows[0]);

    let command_style = if app.edit_mode() {
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(MUTED)
    };
    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled("> ", Style::default().fg(ACCENT)),
            Span::styled(app.command_line().text().to_string(), command_style),
        ])),
        rows[1],
    );
    if app.edit_mode() {
        frame.render_widget(
            Paragraph::new("─".repeat(rows[2].width as usize)).style(Style::default().fg(LOGO)),
            rows[2],
        );
        let cursor_x = rows[1]
            .x
            .saturating_add(2)
            .saturating_add(app.command_line().cursor() as u16)
            .min(rows[1].right().saturating_sub(1));
        frame.set_cursor_position((cursor_x, rows[1].y));
    }

    let paragraph = Paragraph::new(output_text(app.output().blocks()))
        .style(Style::default().fg(Color::White))
        .wrap(Wrap { trim: false });
    app.set_output_viewport(paragraph.line_count(rows[3].width), rows[3].height);
    frame.render_widget(paragraph.scroll((app.output().scroll(), 0)), rows[3]);
}

fn output_text(blocks: &[OutputBlock]) -> Text<'static> {
    let mut lines = Vec::new();
    for block in blocks {
        let style = match block {
            OutputBlock::Text(_) => Style::default().fg(Color::White),
            OutputBlock::Notice(_) => Style::default().fg(MUTED),
            OutputBlock::CommandLine(_) => Style::default().fg(ACCENT),
            OutputBlock::Banner(_) => Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
            OutputBlock::Failure { .. } => Style::default().fg(Color::White),
        };
        for (index, line) in block.plain_lines().into_iter().enumerate() {
            let style = match block {
                OutputBlock::Failure { .. } if index == 0 => {
                    Style::default().fg(ERROR).add_modifier(Modifier::BOLD)
                }
                OutputBlock::Failure { .. } if line == "Stderr:" || line == "Stdout:" => {
                    Style::default().fg(WARN)
                }
                _ => style,
            };
            lines.push(Line::from(Span::styled(line, style)));
        }
    }
    Text::from(lines)
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans = Vec::new();
    let (mode_label, mode_bg) = if app.edit_mode() {
        (" EDIT ", WARN)
    } else {
        (" NRM ", PL_A)
    };
    let mode_fg = if app.edit_mode() {
        Color::Black
    } else {
        Color::White
    };
    let status_text = if app.running() {
        "⟳ running".to_string()
    } else {
        app.last_result_at()
            .map(|at| format!("last result {}", at.format("%H:%M:%S")))
            .unwrap_or_else(|| "idle".to_string())
    };
    let status_bg = if app.running() { PL_D } else { PL_C };
    push_powerline_segment(&mut spans, mode_label, mode_fg, mode_bg, status_bg);
    push_powerline_segment(
        &mut spans,
        format!(" {status_text} "),
        Color::White,
        status_bg,
        BG,
    );

    let hints = if app.edit_mode() {
        FOOTER_KEYS_EDIT
    } else {
        FOOTER_KEYS_NORMAL
    };
    let room = (area.width as usize).saturating_sub(spans_width(&spans) + 2);
    spans.push(Span::styled(
        format!("  {}", compact_text(hints, room)),
        Style::default().fg(LOGO),
    ));
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        area,
    );
}

fn render_confirm_modal(frame: &mut Frame, modal: &ConfirmModal) {
    let message = modal.message();
    let height = (message.len() as u16).saturating_add(4);
    let area = fixed_centered_rect(56, height, frame.area());
    frame.render_widget(Clear, area);

    let border = if modal.is_production() { ERROR } else { ACCENT };
    let mut lines = message
        .into_iter()
        .map(|line| {
            let style = if line.starts_with("WARNING") {
                Style::default().fg(ERROR).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            Line::from(Span::styled(line, style))
        })
        .collect::<Vec<_>>();
    lines.push(Line::from(""));

    let mut buttons = Vec::new();
    for (index, label) in modal.buttons().iter().enumerate() {
        if index > 0 {
            buttons.push(Span::raw("   "));
        }
        let style = if index == modal.selected() {
            Style::default()
                .fg(Color::Black)
                .bg(border)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(MUTED)
        };
        buttons.push(Span::styled(format!(" {label} "), style));
    }
    lines.push(Line::from(buttons).centered());

    let widget = Paragraph::new(lines).centered().block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border))
            .style(Style::default().bg(PANEL)),
    );
    frame.render_widget(widget, area);
}

fn render_preview(frame: &mut Frame, area: Rect, pane: &mut PreviewPane) {
    frame.render_widget(Clear, area);
    let block = Block::default()
        .title(" Dry-Run Preview (q/Esc to close) ")
        .title_bottom(Line::from(format!(
            " {} ",
            compact_text(&pane.command, area.width.saturating_sub(4) as usize)
        )))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(LOGO))
        .style(Style::default().bg(PANEL));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let summary = pane.summary_lines();
    let summary_height = (summary.len() as u16).saturating_add(1);
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(summary_height), Constraint::Min(1)])
        .split(inner);

    let summary_lines = summary
        .into_iter()
        .map(|line| {
            let color = match line.get(..3) {
                Some("+++") => ACCENT,
                Some("~~~") => WARN,
                Some("---") => ERROR,
                _ => MUTED,
            };
            Line::from(Span::styled(line, Style::default().fg(color)))
        })
        .collect::<Vec<_>>();
    frame.render_widget(Paragraph::new(summary_lines), rows[0]);
    let sql = Paragraph::new(pane.text.clone()).wrap(Wrap { trim: false });
    pane.set_viewport(sql.line_count(rows[1].width), rows[1].height);
    frame.render_widget(sql.scroll((pane.scroll(), 0)), rows[1]);
}

fn render_config_editor(frame: &mut Frame, area: Rect, editor: &ConfigEditor) {
    frame.render_widget(Clear, area);
    let block = Block::default()
        .title(format!(
            " {} (Esc save, Ctrl-C discard) ",
            editor.path.display()
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(LOGO))
        .style(Style::default().bg(PANEL));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let (row, col) = editor.buffer.cursor();
    let height = inner.height.max(1) as usize;
    let width = inner.width.max(1) as usize;
    let first_row = row.saturating_sub(height - 1);
    let first_col = col.saturating_sub(width - 1);
    let lines = editor
        .buffer
        .lines()
        .iter()
        .skip(first_row)
        .take(height)
        .map(|line| Line::from(line.clone()))
        .collect::<Vec<_>>();
    frame.render_widget(
        Paragraph::new(lines)
            .style(Style::default().fg(Color::White))
            .scroll((0, u16::try_from(first_col).unwrap_or(u16::MAX))),
        inner,
    );

    let cursor_x = inner
        .x
        .saturating_add((col - first_col) as u16)
        .min(inner.right().saturating_sub(1));
    let cursor_y = inner.y.saturating_add((row - first_row) as u16);
    frame.set_cursor_position((cursor_x, cursor_y));
}

fn render_help(frame: &mut Frame, help: &HelpDialog) {
    let screen = frame.area();
    let width = HELP_WIDTH.min(screen.width);
    let area = Rect::new(
        screen.x + (screen.width - width) / 2,
        screen.y,
        width,
        screen.height,
    );
    frame.render_widget(Clear, area);

    let mut lines = vec![
        Line::from(Span::styled(
            "atlas9 keys",
            Style::default().fg(LOGO).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];
    for (keys, meaning) in HELP_LINES {
        lines.push(Line::from(vec![
            Span::styled(format!("{keys:<18}"), Style::default().fg(ACCENT)),
            Span::styled(*meaning, Style::default().fg(Color::White)),
        ]));
    }

    let modal = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .scroll((help.scroll(), 0))
        .block(
            Block::default()
                .title(" Help (Esc/Enter/q to close) ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(ACCENT))
                .style(Style::default().bg(PANEL)),
        );
    frame.render_widget(modal, area);
}

fn push_powerline_segment(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
    spans.push(Span::styled("", Style::default().fg(bg).bg(next_bg)));
}

fn spans_width(spans: &[Span<'_>]) -> usize {
    spans.iter().map(|span| span.content.chars().count()).sum()
}

fn compact_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }

    if max_chars <= 1 {
        return "…".to_string();
    }

    let mut out = value
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect::<String>();
    out.push('…');
    out
}

fn fixed_centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}
