//! Application state and input handling.
//!
//! `App` holds everything the TUI draws: one display slot per tailed log
//! source plus one for the supervised process's output, the script sidebar,
//! the custom-command box with its recall history, and the status line. It is
//! constructed once and passed to every handler, so tests build isolated
//! instances without a live terminal or process.

use std::collections::VecDeque;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::config::{KeyBinding, LaunchTarget};
use crate::pipeline::FlushSink;
use crate::transcript::Transcript;

/// One bordered pane of log lines.
#[derive(Debug)]
pub struct DisplaySlot {
    pub label: String,
    pub lines: VecDeque<String>,
    /// Distance from the bottom; 0 follows new output.
    pub scroll: usize,
}

impl DisplaySlot {
    fn new(label: String) -> Self {
        Self {
            label,
            lines: VecDeque::new(),
            scroll: 0,
        }
    }
}

/// Which widget receives navigation keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Sidebar,
    Pane(usize),
    Input,
}

/// Actions resulting from user interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    None,
    /// Exit the dashboard (terminating any current process first).
    Quit,
    /// Stop the current process.
    StopProcess,
    /// Re-run the most recent launch.
    ReplayLast,
    /// Launch a key-binding target.
    Launch(LaunchTarget),
    /// Launch a submitted custom command.
    Submit(String),
    /// User-driven view change; redraw immediately, bypassing the throttle.
    Redraw,
}

/// Append-only recall history for the command box.
#[derive(Debug, Default)]
pub struct CommandHistory {
    entries: Vec<String>,
    cursor: usize,
}

impl CommandHistory {
    pub fn push(&mut self, command: String) {
        self.entries.push(command);
        self.cursor = self.entries.len();
    }

    /// Steps back towards the oldest entry.
    pub fn recall_prev(&mut self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        if self.cursor > 0 {
            self.cursor -= 1;
        }
        self.entries.get(self.cursor).cloned()
    }

    /// Steps forward; past the newest entry the box goes back to empty.
    pub fn recall_next(&mut self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        if self.cursor + 1 < self.entries.len() {
            self.cursor += 1;
            self.entries.get(self.cursor).cloned()
        } else {
            self.cursor = self.entries.len();
            Some(String::new())
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The main application state container.
pub struct App {
    pub slots: Vec<DisplaySlot>,
    /// Index of the supervised process's output pane (always the last slot).
    pub output_slot: usize,
    pub bindings: Vec<KeyBinding>,
    pub selected_binding: usize,
    pub focus: Focus,
    pub input_buffer: String,
    pub history: CommandHistory,
    pub status: Option<String>,
    pub should_quit: bool,
    history_enabled: bool,
    transcript: Option<Transcript>,
}

impl App {
    pub fn new(
        log_labels: Vec<String>,
        bindings: Vec<KeyBinding>,
        history_enabled: bool,
        transcript: Option<Transcript>,
    ) -> Self {
        let mut slots: Vec<DisplaySlot> = log_labels.into_iter().map(DisplaySlot::new).collect();
        slots.push(DisplaySlot::new("no process".to_string()));
        let output_slot = slots.len() - 1;
        Self {
            slots,
            output_slot,
            bindings,
            selected_binding: 0,
            focus: Focus::Sidebar,
            input_buffer: String::new(),
            history: CommandHistory::default(),
            status: None,
            should_quit: false,
            history_enabled,
            transcript,
        }
    }

    /// Labels the output pane with the current launch identifier.
    pub fn set_output_label(&mut self, label: &str) {
        if let Some(slot) = self.slots.get_mut(self.output_slot) {
            slot.label = label.to_string();
        }
    }

    pub fn set_slot_label(&mut self, slot: usize, label: String) {
        if let Some(slot) = self.slots.get_mut(slot) {
            slot.label = label;
        }
    }

    pub fn set_status(&mut self, text: impl Into<String>) {
        self.status = Some(text.into());
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> AppAction {
        match self.focus {
            Focus::Input => self.handle_input_key(key),
            _ => self.handle_normal_key(key),
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> AppAction {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c') => AppAction::Quit,
                KeyCode::Char('s') => AppAction::StopProcess,
                KeyCode::Char('r') => AppAction::ReplayLast,
                _ => AppAction::None,
            };
        }
        match key.code {
            KeyCode::Char('q') => AppAction::Quit,
            KeyCode::Tab => {
                self.cycle_focus();
                AppAction::Redraw
            }
            KeyCode::Char('i') => {
                self.focus = Focus::Input;
                AppAction::Redraw
            }
            KeyCode::Up => self.navigate(-1),
            KeyCode::Down => self.navigate(1),
            KeyCode::Enter => match self.focus {
                Focus::Sidebar => self
                    .bindings
                    .get(self.selected_binding)
                    .map(|binding| AppAction::Launch(binding.target.clone()))
                    .unwrap_or(AppAction::None),
                _ => AppAction::None,
            },
            KeyCode::Char(c) => self.binding_for_key(c),
            _ => AppAction::None,
        }
    }

    fn handle_input_key(&mut self, key: KeyEvent) -> AppAction {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            if let KeyCode::Char('c') = key.code {
                return AppAction::Quit;
            }
            return AppAction::None;
        }
        match key.code {
            KeyCode::Esc => {
                self.focus = Focus::Sidebar;
                AppAction::Redraw
            }
            KeyCode::Enter => {
                let submitted = self.input_buffer.trim().to_string();
                self.input_buffer.clear();
                if submitted.is_empty() {
                    return AppAction::None;
                }
                if self.history_enabled {
                    self.history.push(submitted.clone());
                }
                AppAction::Submit(submitted)
            }
            KeyCode::Backspace => {
                self.input_buffer.pop();
                AppAction::Redraw
            }
            KeyCode::Up => {
                if self.history_enabled {
                    if let Some(entry) = self.history.recall_prev() {
                        self.input_buffer = entry;
                    }
                }
                AppAction::Redraw
            }
            KeyCode::Down => {
                if self.history_enabled {
                    if let Some(entry) = self.history.recall_next() {
                        self.input_buffer = entry;
                    }
                }
                AppAction::Redraw
            }
            KeyCode::Char(c) => {
                self.input_buffer.push(c);
                AppAction::Redraw
            }
            _ => AppAction::None,
        }
    }

    fn binding_for_key(&self, pressed: char) -> AppAction {
        let pressed = pressed.to_lowercase().to_string();
        self.bindings
            .iter()
            .find(|binding| binding.key.to_lowercase() == pressed)
            .map(|binding| AppAction::Launch(binding.target.clone()))
            .unwrap_or(AppAction::None)
    }

    fn cycle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Sidebar => Focus::Pane(0),
            Focus::Pane(idx) if idx + 1 < self.slots.len() => Focus::Pane(idx + 1),
            Focus::Pane(_) => Focus::Input,
            Focus::Input => Focus::Sidebar,
        };
    }

    fn navigate(&mut self, delta: i64) -> AppAction {
        match self.focus {
            Focus::Sidebar => {
                let count = self.bindings.len();
                if count > 0 {
                    let current = self.selected_binding as i64;
                    self.selected_binding =
                        (current + delta).clamp(0, count as i64 - 1) as usize;
                }
                AppAction::Redraw
            }
            Focus::Pane(idx) => {
                if let Some(slot) = self.slots.get_mut(idx) {
                    // Up (negative delta) scrolls away from the live tail.
                    let max = slot.lines.len().saturating_sub(1);
                    let next = slot.scroll as i64 - delta;
                    slot.scroll = next.clamp(0, max as i64) as usize;
                }
                AppAction::Redraw
            }
            Focus::Input => AppAction::None,
        }
    }
}

impl FlushSink for App {
    fn append(&mut self, slot: usize, line: &str) {
        if let Some(display) = self.slots.get_mut(slot) {
            display.lines.push_back(line.to_string());
            // A reader scrolled away stays anchored to the line they were on.
            if display.scroll > 0 {
                display.scroll = (display.scroll + 1).min(display.lines.len().saturating_sub(1));
            }
        }
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.record(line);
        }
    }

    fn retained(&self, slot: usize) -> usize {
        self.slots.get(slot).map(|s| s.lines.len()).unwrap_or(0)
    }

    fn clear(&mut self, slot: usize) {
        if let Some(display) = self.slots.get_mut(slot) {
            display.lines.clear();
            display.scroll = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn sample_app() -> App {
        let bindings = vec![
            KeyBinding {
                key: "b".to_string(),
                label: "build.sh".to_string(),
                target: LaunchTarget::Script("build.sh".to_string()),
            },
            KeyBinding {
                key: "d".to_string(),
                label: "dev".to_string(),
                target: LaunchTarget::Command("npm run dev".to_string()),
            },
        ];
        App::new(vec!["api.log".to_string()], bindings, true, None)
    }

    #[test]
    fn output_slot_is_the_last_one() {
        let app = sample_app();
        assert_eq!(app.output_slot, 1);
        assert_eq!(app.slots.len(), 2);
    }

    #[test]
    fn bound_keys_launch_their_target() {
        let mut app = sample_app();
        assert_eq!(
            app.handle_key(key(KeyCode::Char('b'))),
            AppAction::Launch(LaunchTarget::Script("build.sh".to_string()))
        );
        assert_eq!(app.handle_key(key(KeyCode::Char('z'))), AppAction::None);
    }

    #[test]
    fn sidebar_enter_launches_the_selection() {
        let mut app = sample_app();
        app.handle_key(key(KeyCode::Down));
        assert_eq!(
            app.handle_key(key(KeyCode::Enter)),
            AppAction::Launch(LaunchTarget::Command("npm run dev".to_string()))
        );
    }

    #[test]
    fn control_chords_map_to_process_commands() {
        let mut app = sample_app();
        assert_eq!(app.handle_key(ctrl('s')), AppAction::StopProcess);
        assert_eq!(app.handle_key(ctrl('r')), AppAction::ReplayLast);
        assert_eq!(app.handle_key(ctrl('c')), AppAction::Quit);
    }

    #[test]
    fn submit_records_history_and_clears_the_box() {
        let mut app = sample_app();
        app.focus = Focus::Input;
        for c in "make test".chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
        assert_eq!(
            app.handle_key(key(KeyCode::Enter)),
            AppAction::Submit("make test".to_string())
        );
        assert!(app.input_buffer.is_empty());
        assert_eq!(app.history.len(), 1);
    }

    #[test]
    fn blank_submissions_are_ignored() {
        let mut app = sample_app();
        app.focus = Focus::Input;
        app.handle_key(key(KeyCode::Char(' ')));
        assert_eq!(app.handle_key(key(KeyCode::Enter)), AppAction::None);
        assert!(app.history.is_empty());
    }

    #[test]
    fn history_recall_walks_back_and_returns_to_empty() {
        let mut history = CommandHistory::default();
        history.push("first".to_string());
        history.push("second".to_string());

        assert_eq!(history.recall_prev(), Some("second".to_string()));
        assert_eq!(history.recall_prev(), Some("first".to_string()));
        // Pinned at the oldest entry.
        assert_eq!(history.recall_prev(), Some("first".to_string()));
        assert_eq!(history.recall_next(), Some("second".to_string()));
        // Past the newest the box goes back to empty.
        assert_eq!(history.recall_next(), Some(String::new()));
    }

    #[test]
    fn focus_cycles_through_every_widget() {
        let mut app = sample_app();
        assert_eq!(app.focus, Focus::Sidebar);
        app.handle_key(key(KeyCode::Tab));
        assert_eq!(app.focus, Focus::Pane(0));
        app.handle_key(key(KeyCode::Tab));
        assert_eq!(app.focus, Focus::Pane(1));
        app.handle_key(key(KeyCode::Tab));
        assert_eq!(app.focus, Focus::Input);
        app.handle_key(key(KeyCode::Esc));
        assert_eq!(app.focus, Focus::Sidebar);
    }

    #[test]
    fn sink_append_and_clear_track_retained_lines() {
        let mut app = sample_app();
        app.append(0, "one");
        app.append(0, "two");
        assert_eq!(app.retained(0), 2);
        app.clear(0);
        assert_eq!(app.retained(0), 0);
    }
}
