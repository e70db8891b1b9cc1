//! Terminal colour facts: reported colours and the detected colour profile.

use crate::terminal::Environment;
use std::fmt;

/// A 24-bit colour as reported by the terminal (OSC 10/11/12 replies).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Relative luminance in `0.0..=1.0` (sRGB coefficients, no gamma).
    pub fn luminance(&self) -> f64 {
        (0.2126 * f64::from(self.r) + 0.7152 * f64::from(self.g) + 0.0722 * f64::from(self.b))
            / 255.0
    }

    /// Whether this colour reads as a dark background.
    pub fn is_dark(&self) -> bool {
        self.luminance() < 0.5
    }

    /// Parse an X11 colour specification as sent in OSC replies:
    /// `rgb:R/G/B` with 1-4 hex digits per channel, `rgba:R/G/B/A`, or
    /// `#RGB` / `#RRGGBB`.
    pub fn parse_xcolor(spec: &str) -> Option<Rgb> {
        if let Some(rest) = spec.strip_prefix("rgba:").or_else(|| spec.strip_prefix("rgb:")) {
            let mut channels = rest.split('/').map(scale_channel);
            let r = channels.next()??;
            let g = channels.next()??;
            let b = channels.next()??;
            return Some(Rgb { r, g, b });
        }
        let hex = spec.strip_prefix('#').filter(|h| h.is_ascii())?;
        match hex.len() {
            3 => {
                let digit = |i: usize| u8::from_str_radix(&hex[i..=i], 16).ok().map(|v| v * 17);
                Some(Rgb::new(digit(0)?, digit(1)?, digit(2)?))
            }
            6 => {
                let pair = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
                Some(Rgb::new(pair(0)?, pair(2)?, pair(4)?))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

fn scale_channel(digits: &str) -> Option<u8> {
    if digits.is_empty() || digits.len() > 4 || !digits.is_ascii() {
        return None;
    }
    let value = u32::from_str_radix(digits, 16).ok()?;
    let max = (1u32 << (4 * digits.len())) - 1;
    Some(((value * 255 + max / 2) / max) as u8)
}

/// How many colours the attached terminal can display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ColorProfile {
    /// No colour: not a terminal, `NO_COLOR`, or `TERM=dumb`.
    #[default]
    NoColor,
    /// The 16 ANSI colours.
    Ansi,
    /// The 256-colour palette.
    Ansi256,
    /// 24-bit colour.
    TrueColor,
}

impl ColorProfile {
    /// Infer the profile from environment variables.
    ///
    /// `is_terminal` should say whether the output is a terminal; piped output
    /// gets [`ColorProfile::NoColor`] unless `CLICOLOR_FORCE` is set.
    pub fn detect(env: &Environment, is_terminal: bool) -> ColorProfile {
        let forced = env.get("CLICOLOR_FORCE").is_some_and(|v| !v.is_empty() && v != "0");
        if !is_terminal && !forced {
            return ColorProfile::NoColor;
        }
        if env.get("NO_COLOR").is_some_and(|v| !v.is_empty()) {
            return ColorProfile::NoColor;
        }

        let term = env.get("TERM").unwrap_or_default().to_ascii_lowercase();
        if term == "dumb" {
            return ColorProfile::NoColor;
        }

        let colorterm = env.get("COLORTERM").unwrap_or_default().to_ascii_lowercase();
        if colorterm == "truecolor" || colorterm == "24bit" {
            return ColorProfile::TrueColor;
        }
        if term.ends_with("direct") || term.contains("truecolor") {
            return ColorProfile::TrueColor;
        }
        if let Some(program) = env.get("TERM_PROGRAM") {
            if matches!(program, "iTerm.app" | "WezTerm" | "vscode" | "ghostty") {
                return ColorProfile::TrueColor;
            }
        }
        if term.contains("256color") {
            return ColorProfile::Ansi256;
        }
        if term.is_empty() && !forced {
            return ColorProfile::NoColor;
        }
        ColorProfile::Ansi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Environment {
        Environment::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn parse_four_digit_channels() {
        let c = Rgb::parse_xcolor("rgb:ffff/8080/0000").unwrap();
        assert_eq!(c, Rgb::new(255, 128, 0));
    }

    #[test]
    fn parse_two_digit_channels() {
        assert_eq!(
            Rgb::parse_xcolor("rgb:1e/1e/2e"),
            Some(Rgb::new(0x1e, 0x1e, 0x2e))
        );
    }

    #[test]
    fn parse_hash_forms() {
        assert_eq!(Rgb::parse_xcolor("#fff"), Some(Rgb::new(255, 255, 255)));
        assert_eq!(Rgb::parse_xcolor("#102030"), Some(Rgb::new(16, 32, 48)));
        assert_eq!(Rgb::parse_xcolor("#12"), None);
        assert_eq!(Rgb::parse_xcolor("rgb:zz/00/00"), None);
    }

    #[test]
    fn darkness() {
        assert!(Rgb::new(0, 0, 0).is_dark());
        assert!(Rgb::new(0x1e, 0x1e, 0x2e).is_dark());
        assert!(!Rgb::new(250, 250, 250).is_dark());
    }

    #[test]
    fn profile_truecolor_from_colorterm() {
        let e = env(&[("TERM", "xterm-256color"), ("COLORTERM", "truecolor")]);
        assert_eq!(ColorProfile::detect(&e, true), ColorProfile::TrueColor);
    }

    #[test]
    fn profile_256() {
        let e = env(&[("TERM", "screen-256color")]);
        assert_eq!(ColorProfile::detect(&e, true), ColorProfile::Ansi256);
    }

    #[test]
    fn profile_no_color_wins() {
        let e = env(&[("TERM", "xterm-256color"), ("NO_COLOR", "1")]);
        assert_eq!(ColorProfile::detect(&e, true), ColorProfile::NoColor);
    }

    #[test]
    fn profile_piped_output() {
        let e = env(&[("TERM", "xterm-256color")]);
        assert_eq!(ColorProfile::detect(&e, false), ColorProfile::NoColor);

        let forced = env(&[("TERM", "xterm"), ("CLICOLOR_FORCE", "1")]);
        assert_eq!(ColorProfile::detect(&forced, false), ColorProfile::Ansi);
    }

    #[test]
    fn profile_dumb() {
        let e = env(&[("TERM", "dumb"), ("COLORTERM", "truecolor")]);
        assert_eq!(ColorProfile::detect(&e, true), ColorProfile::NoColor);
    }
}
