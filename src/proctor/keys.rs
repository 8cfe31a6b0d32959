//! Keyboard shortcut classification.

use serde::{Deserialize, Serialize};

/// A keydown as reported by the page
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct KeyPress {
    pub key: String,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub meta: bool,
}

impl KeyPress {
    pub fn plain(key: &str) -> Self {
        Self {
            key: key.to_string(),
            ..Default::default()
        }
    }

    pub fn ctrl(key: &str) -> Self {
        Self {
            key: key.to_string(),
            ctrl: true,
            ..Default::default()
        }
    }

    pub fn alt(key: &str) -> Self {
        Self {
            key: key.to_string(),
            alt: true,
            ..Default::default()
        }
    }

    /// Ctrl on most platforms, Cmd on macOS
    fn command(&self) -> bool {
        self.ctrl || self.meta
    }

    fn key_is(&self, name: &str) -> bool {
        self.key.eq_ignore_ascii_case(name)
    }
}

/// Reserved browser/OS shortcuts that leave or replace the game page
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Shortcut {
    SwitchWindow,
    NewTab,
    ReopenTab,
    CloseTab,
    NewWindow,
    ToggleFullscreen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClass {
    /// Escape, which the browser uses to leave fullscreen
    FullscreenExit,
    Forbidden(Shortcut),
    Ordinary,
}

pub fn classify(key: &KeyPress) -> KeyClass {
    if key.key == "Escape" {
        return KeyClass::FullscreenExit;
    }
    if key.key == "F11" {
        return KeyClass::Forbidden(Shortcut::ToggleFullscreen);
    }
    if key.key == "Tab" && (key.alt || key.meta) {
        return KeyClass::Forbidden(Shortcut::SwitchWindow);
    }
    if key.command() {
        if key.key_is("t") {
            return KeyClass::Forbidden(if key.shift {
                Shortcut::ReopenTab
            } else {
                Shortcut::NewTab
            });
        }
        if key.key_is("w") {
            return KeyClass::Forbidden(Shortcut::CloseTab);
        }
        if key.key_is("n") {
            return KeyClass::Forbidden(Shortcut::NewWindow);
        }
    }
    KeyClass::Ordinary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_shortcuts() {
        assert_eq!(
            classify(&KeyPress::alt("Tab")),
            KeyClass::Forbidden(Shortcut::SwitchWindow)
        );
        assert_eq!(
            classify(&KeyPress::ctrl("t")),
            KeyClass::Forbidden(Shortcut::NewTab)
        );
        assert_eq!(
            classify(&KeyPress::ctrl("W")),
            KeyClass::Forbidden(Shortcut::CloseTab)
        );
        assert_eq!(
            classify(&KeyPress::ctrl("n")),
            KeyClass::Forbidden(Shortcut::NewWindow)
        );
        assert_eq!(
            classify(&KeyPress {
                key: "T".to_string(),
                ctrl: true,
                shift: true,
                ..Default::default()
            }),
            KeyClass::Forbidden(Shortcut::ReopenTab)
        );
        assert_eq!(
            classify(&KeyPress::plain("F11")),
            KeyClass::Forbidden(Shortcut::ToggleFullscreen)
        );
        assert_eq!(
            classify(&KeyPress {
                key: "w".to_string(),
                meta: true,
                ..Default::default()
            }),
            KeyClass::Forbidden(Shortcut::CloseTab)
        );
    }

    #[test]
    fn test_ordinary_keys() {
        assert_eq!(classify(&KeyPress::plain("t")), KeyClass::Ordinary);
        assert_eq!(classify(&KeyPress::plain("Tab")), KeyClass::Ordinary);
        assert_eq!(classify(&KeyPress::ctrl("c")), KeyClass::Ordinary);
        assert_eq!(classify(&KeyPress::alt("t")), KeyClass::Ordinary);
    }

    #[test]
    fn test_escape() {
        assert_eq!(
            classify(&KeyPress::plain("Escape")),
            KeyClass::FullscreenExit
        );
    }

    #[test]
    fn test_key_press_wire_defaults() {
        let key: KeyPress = serde_json::from_str(r#"{"key":"w","ctrl":true}"#).unwrap();
        assert_eq!(key, KeyPress::ctrl("w"));
    }
}
