use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Edit,
    Overlay,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    NextStage,
    PrevStage,
    ScrollDown,
    ScrollUp,
    Activate,
    EnterEdit,
    OpenEnvironment,
    OpenConfig,
    OpenHelp,
    ExitEdit,
    SubmitEdit,
    InputChar(char),
    CursorLeft,
    CursorRight,
    CursorHome,
    CursorEnd,
    Backspace,
    Delete,
    Overlay(KeyEvent),
}

/// Edit mode wins over an open overlay; the base screen sees keys last.
pub fn map_key(mode: InputMode, key: KeyEvent) -> Option<Action> {
    match mode {
        InputMode::Edit => map_edit_mode_key(key),
        InputMode::Overlay => Some(Action::Overlay(key)),
        InputMode::Normal => map_normal_mode_key(key),
    }
}

fn is_ctrl(key: &KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL)
}

fn map_normal_mode_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Char('c') if is_ctrl(&key) => Some(Action::Quit),
        _ if is_ctrl(&key) => None,
        KeyCode::Char('q') | KeyCode::Char('Q') => Some(Action::Quit),
        KeyCode::Tab if key.modifiers.contains(KeyModifiers::SHIFT) => Some(Action::PrevStage),
        KeyCode::Tab => Some(Action::NextStage),
        KeyCode::BackTab => Some(Action::PrevStage),
        KeyCode::Down => Some(Action::ScrollDown),
        KeyCode::Up => Some(Action::ScrollUp),
        KeyCode::Enter => Some(Action::Activate),
        KeyCode::Char('i') | KeyCode::Char('I') => Some(Action::EnterEdit),
        KeyCode::Char('e') | KeyCode::Char('E') => Some(Action::OpenEnvironment),
        KeyCode::Char('c') | KeyCode::Char('C') => Some(Action::OpenConfig),
        KeyCode::Char('h') | KeyCode::Char('H') => Some(Action::OpenHelp),
        _ => None,
    }
}

fn map_edit_mode_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Char('c') if is_ctrl(&key) => Some(Action::ExitEdit),
        KeyCode::Esc => Some(Action::ExitEdit),
        KeyCode::Enter => Some(Action::SubmitEdit),
        KeyCode::Left => Some(Action::CursorLeft),
        KeyCode::Right => Some(Action::CursorRight),
        KeyCode::Home => Some(Action::CursorHome),
        KeyCode::End => Some(Action::CursorEnd),
        KeyCode::Backspace => Some(Action::Backspace),
        KeyCode::Delete => Some(Action::Delete),
        KeyCode::Char(c) if !key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) => {
            Some(Action::InputChar(c))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_mode_maps_quit_keys() {
        for key in [
            KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE),
            KeyEvent::new(KeyCode::Char('Q'), KeyModifiers::SHIFT),
            KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL),
        ] {
            assert_eq!(map_key(InputMode::Normal, key), Some(Action::Quit));
        }
    }

    #[test]
    fn normal_mode_plain_c_opens_config() {
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::NONE);
        assert_eq!(map_key(InputMode::Normal, key), Some(Action::OpenConfig));
    }

    #[test]
    fn normal_mode_cycles_stages_with_tab() {
        let tab = KeyEvent::new(KeyCode::Tab, KeyModifiers::NONE);
        let back = KeyEvent::new(KeyCode::BackTab, KeyModifiers::SHIFT);
        assert_eq!(map_key(InputMode::Normal, tab), Some(Action::NextStage));
        assert_eq!(map_key(InputMode::Normal, back), Some(Action::PrevStage));
    }

    #[test]
    fn normal_mode_swallows_left_right_and_escape() {
        for code in [KeyCode::Left, KeyCode::Right, KeyCode::Esc] {
            let key = KeyEvent::new(code, KeyModifiers::NONE);
            assert_eq!(map_key(InputMode::Normal, key), None);
        }
    }

    #[test]
    fn normal_mode_maps_uppercase_letters() {
        let cases = [
            ('I', Action::EnterEdit),
            ('E', Action::OpenEnvironment),
            ('C', Action::OpenConfig),
            ('H', Action::OpenHelp),
        ];
        for (ch, action) in cases {
            let key = KeyEvent::new(KeyCode::Char(ch), KeyModifiers::SHIFT);
            assert_eq!(map_key(InputMode::Normal, key), Some(action));
        }
    }

    #[test]
    fn edit_mode_suppresses_navigation() {
        for code in [KeyCode::Tab, KeyCode::BackTab, KeyCode::Up, KeyCode::Down] {
            let key = KeyEvent::new(code, KeyModifiers::NONE);
            assert_eq!(map_key(InputMode::Edit, key), None);
        }
    }

    #[test]
    fn edit_mode_passes_characters_through() {
        let q = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE);
        assert_eq!(map_key(InputMode::Edit, q), Some(Action::InputChar('q')));
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(map_key(InputMode::Edit, ctrl_c), Some(Action::ExitEdit));
    }

    #[test]
    fn overlay_mode_forwards_everything() {
        let key = KeyEvent::new(KeyCode::Tab, KeyModifiers::NONE);
        assert_eq!(map_key(InputMode::Overlay, key), Some(Action::Overlay(key)));
    }
}
