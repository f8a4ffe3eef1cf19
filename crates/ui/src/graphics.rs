//! Terminal graphics detection: decides whether to query the terminal for
//! an image protocol and which one to prefer.

use std::time::Duration;

use ratatui_image::picker::{Capability, Picker, ProtocolType, cap_parser::QueryStdioOptions};

/// Environment hints about the hosting terminal, read once at start-up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminalHints {
    pub kitty_window: bool,
    pub xterm_kitty: bool,
    pub iterm: bool,
    pub tmux: bool,
}

impl TerminalHints {
    pub fn from_env() -> Self {
        let non_empty = |key: &str| {
            std::env::var(key)
                .ok()
                .is_some_and(|value| !value.trim().is_empty())
        };
        let contains = |key: &str, needle: &str| {
            std::env::var(key)
                .ok()
                .is_some_and(|value| value.contains(needle))
        };
        Self {
            kitty_window: non_empty("KITTY_WINDOW_ID"),
            xterm_kitty: std::env::var("TERM")
                .ok()
                .is_some_and(|term| term.trim().starts_with("xterm-kitty")),
            iterm: non_empty("ITERM_SESSION_ID")
                || contains("TERM_PROGRAM", "iTerm")
                || contains("LC_TERMINAL", "iTerm"),
            tmux: std::env::var_os("TMUX").is_some(),
        }
    }

    /// Querying blocks on a terminal reply, so only do it with a reason to
    /// expect one. In tmux the outer terminal is unknown.
    pub fn should_query(&self) -> bool {
        self.kitty_window || self.xterm_kitty || self.iterm || self.tmux
    }

    pub fn query_timeout(&self) -> Duration {
        if self.kitty_window || self.xterm_kitty || self.iterm {
            Duration::from_millis(1500)
        } else if self.tmux {
            Duration::from_millis(300)
        } else {
            Duration::from_millis(0)
        }
    }

    /// iTerm answers kitty queries but renders its own protocol better.
    pub fn kitty_supported(&self, picker: &Picker) -> bool {
        if self.iterm {
            return false;
        }
        self.kitty_window
            || picker
                .capabilities()
                .iter()
                .any(|cap| matches!(cap, Capability::Kitty))
    }
}

pub fn build_picker(hints: &TerminalHints) -> Picker {
    if hints.tmux {
        // kitty graphics need passthrough inside tmux; failures just mean
        // falling back to whatever the query finds.
        let _ = std::process::Command::new("tmux")
            .args(["set-option", "-g", "allow-passthrough", "on"])
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status();
    }

    let mut picker = if hints.should_query() {
        let mut options = QueryStdioOptions::default();
        options.timeout = hints.query_timeout();
        options.text_sizing_protocol = false;
        Picker::from_query_stdio_with_options(options).unwrap_or_else(|err| {
            tracing::debug!("terminal graphics query failed: {err}");
            Picker::halfblocks()
        })
    } else {
        Picker::halfblocks()
    };
    picker.set_background_color(image::Rgba([255u8, 255u8, 255u8, 255u8]));
    if hints.kitty_supported(&picker) {
        picker.set_protocol_type(ProtocolType::Kitty);
    }
    tracing::info!(
        protocol = protocol_label(&picker),
        font = ?picker.font_size(),
        "terminal graphics"
    );
    picker
}

pub fn protocol_label(picker: &Picker) -> &'static str {
    match picker.protocol_type() {
        ProtocolType::Halfblocks => "halfblocks",
        ProtocolType::Sixel => "sixel",
        ProtocolType::Kitty => "kitty",
        ProtocolType::Iterm2 => "iterm2",
    }
}
