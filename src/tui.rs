//! Terminal User Interface (TUI) rendering and management.
//!
//! This module handles initializing the terminal in raw mode, restoring it on
//! exit, and drawing the dashboard: the script sidebar on the left, one pane
//! per tailed log source across the top right, and the supervised process's
//! output with the command box and status line below.

use std::io::{self, Stdout};

use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph};
use ratatui::Terminal;

use crate::app::{App, DisplaySlot, Focus};

/// Type alias for the specific terminal backend used.
pub type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

/// Initializes the terminal for TUI mode.
pub fn init_terminal() -> io::Result<TuiTerminal> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

/// Restores the terminal to its original state.
pub fn restore_terminal(mut terminal: TuiTerminal) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Draws the current application state to the terminal.
pub fn draw(app: &mut App, terminal: &mut TuiTerminal) -> io::Result<()> {
    let title = window_title(app);
    execute!(terminal.backend_mut(), SetTitle(title))?;
    terminal.draw(|frame| {
        let area = frame.size();
        let main = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(28), Constraint::Percentage(72)])
            .split(area);

        draw_sidebar(app, frame, main[0]);

        let right = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Percentage(55),
                Constraint::Min(4),
                Constraint::Length(3),
                Constraint::Length(1),
            ])
            .split(main[1]);

        draw_log_row(app, frame, right[0]);
        draw_pane(
            frame,
            right[1],
            &app.slots[app.output_slot],
            app.focus == Focus::Pane(app.output_slot),
        );
        draw_input(app, frame, right[2]);
        draw_status(app, frame, right[3]);
    })?;
    Ok(())
}

fn window_title(app: &App) -> String {
    let label = app
        .slots
        .get(app.output_slot)
        .map(|slot| slot.label.as_str())
        .unwrap_or("no process");
    format!("rundash — {}", label)
}

fn draw_sidebar(app: &App, frame: &mut ratatui::Frame, area: Rect) {
    let focused = app.focus == Focus::Sidebar;
    let items: Vec<ListItem> = app
        .bindings
        .iter()
        .enumerate()
        .map(|(idx, binding)| {
            let text = format!("{} - {}", binding.key.to_uppercase(), binding.label);
            let style = if idx == app.selected_binding {
                Style::default().bg(Color::Blue).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(Line::from(text)).style(style)
        })
        .collect();
    let list = List::new(items).block(titled_block("Scripts", focused));
    frame.render_widget(list, area);
}

fn draw_log_row(app: &App, frame: &mut ratatui::Frame, area: Rect) {
    let log_panes = app.output_slot;
    if log_panes == 0 {
        let empty = Paragraph::new("no log sources configured")
            .block(titled_block("Logs", false))
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(empty, area);
        return;
    }
    let share = (100 / log_panes as u16).max(1);
    let constraints: Vec<Constraint> = (0..log_panes)
        .map(|_| Constraint::Percentage(share))
        .collect();
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(area);
    for (idx, column) in columns.iter().enumerate() {
        draw_pane(
            frame,
            *column,
            &app.slots[idx],
            app.focus == Focus::Pane(idx),
        );
    }
}

fn draw_pane(frame: &mut ratatui::Frame, area: Rect, slot: &DisplaySlot, focused: bool) {
    let height = area.height.saturating_sub(2) as usize;
    let lines = visible_lines(slot, height);
    let text: Vec<Line> = lines
        .iter()
        .map(|line| Line::from(sanitize(line)))
        .collect();
    let pane = Paragraph::new(text).block(titled_block(&slot.label, focused));
    frame.render_widget(pane, area);
}

fn draw_input(app: &App, frame: &mut ratatui::Frame, area: Rect) {
    let focused = app.focus == Focus::Input;
    let input = Paragraph::new(app.input_buffer.as_str())
        .block(titled_block("Custom Command", focused));
    frame.render_widget(input, area);
}

fn draw_status(app: &App, frame: &mut ratatui::Frame, area: Rect) {
    let text = app.status.as_deref().unwrap_or(
        "tab: focus · enter: run · i: command · ^S stop · ^R repeat · q: quit",
    );
    let status = Paragraph::new(text).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(status, area);
}

fn titled_block(title: &str, focused: bool) -> Block {
    let border_style = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .title(format!(" {} ", title))
}

/// Window of lines a pane shows, honoring its scroll-from-bottom offset.
fn visible_lines(slot: &DisplaySlot, height: usize) -> Vec<String> {
    if height == 0 {
        return Vec::new();
    }
    let total = slot.lines.len();
    let end = total.saturating_sub(slot.scroll);
    let start = end.saturating_sub(height);
    slot.lines.iter().skip(start).take(end - start).cloned().collect()
}

/// Strips ANSI escapes so raw process output cannot garble the pane.
fn sanitize(text: &str) -> String {
    let stripped = strip_ansi_escapes::strip(text.as_bytes());
    String::from_utf8_lossy(&stripped).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn slot_with(lines: &[&str], scroll: usize) -> DisplaySlot {
        DisplaySlot {
            label: "test".to_string(),
            lines: lines.iter().map(|s| s.to_string()).collect::<VecDeque<_>>(),
            scroll,
        }
    }

    #[test]
    fn visible_lines_follow_the_tail_by_default() {
        let slot = slot_with(&["a", "b", "c", "d"], 0);
        assert_eq!(visible_lines(&slot, 2), vec!["c", "d"]);
    }

    #[test]
    fn scroll_offset_moves_the_window_up() {
        let slot = slot_with(&["a", "b", "c", "d"], 2);
        assert_eq!(visible_lines(&slot, 2), vec!["a", "b"]);
    }

    #[test]
    fn sanitize_strips_ansi_escapes() {
        assert_eq!(sanitize("\u{1b}[31mred\u{1b}[0m"), "red");
        assert_eq!(sanitize("plain"), "plain");
    }
}
