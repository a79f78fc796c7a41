//! Light/dark colour theme for terminal output.
//!
//! The choice is persisted in the config file (`[ui] theme`) so it survives
//! between runs.

use colored::{Color, ColoredString, Colorize};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggle(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn palette(self) -> Palette {
        match self {
            Theme::Light => Palette {
                accent: Color::Blue,
                success: Color::Green,
                error: Color::Red,
                muted: Color::BrightBlack,
            },
            Theme::Dark => Palette {
                accent: Color::BrightCyan,
                success: Color::BrightGreen,
                error: Color::BrightRed,
                muted: Color::White,
            },
        }
    }

    /// Glyph shown next to the theme name, mirroring the toggle button.
    pub fn icon(self) -> &'static str {
        match self {
            Theme::Light => "☀",
            Theme::Dark => "☾",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Light => f.write_str("light"),
            Theme::Dark => f.write_str("dark"),
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(format!("unknown theme '{other}' (expected light or dark)")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub accent: Color,
    pub success: Color,
    pub error: Color,
    pub muted: Color,
}

impl Palette {
    pub fn accent(&self, text: &str) -> ColoredString {
        text.color(self.accent).bold()
    }

    pub fn success(&self, text: &str) -> ColoredString {
        text.color(self.success).bold()
    }

    pub fn error(&self, text: &str) -> ColoredString {
        text.color(self.error)
    }

    pub fn muted(&self, text: &str) -> ColoredString {
        text.color(self.muted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_flips_between_light_and_dark() {
        assert_eq!(Theme::Light.toggle(), Theme::Dark);
        assert_eq!(Theme::Dark.toggle(), Theme::Light);
        assert_eq!(Theme::default(), Theme::Light);
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("Dark".parse::<Theme>(), Ok(Theme::Dark));
        assert_eq!(" light ".parse::<Theme>(), Ok(Theme::Light));
        assert!("sepia".parse::<Theme>().is_err());
    }
}
