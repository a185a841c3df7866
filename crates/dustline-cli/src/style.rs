//! Visual styling utilities for the CLI.
//!
//! Every helper takes `no_color` and returns uncolored text when it is set,
//! so output stays usable in pipes and logs.

use owo_colors::OwoColorize;

use dustline_core::ConnectionState;
use dustline_types::{ElementKind, Percentages, StateValue};

// ============================================================================
// Color Thresholds
// ============================================================================

/// Particulate thresholds (µg/m³), after the US EPA PM2.5 breakpoints.
pub mod particulate {
    pub const GOOD: f64 = 9.0; // Green: < 9
    pub const MODERATE: f64 = 35.4; // Yellow: 9-35.4
    pub const POOR: f64 = 55.4; // Orange: 35.4-55.4
    // Red: > 55.4
}

// ============================================================================
// Colored Value Formatting
// ============================================================================

/// Format a concentration (µg/m³) with a color for its band.
pub fn format_concentration_colored(value: f64, no_color: bool) -> String {
    let formatted = format!("{:.1}", value);
    if no_color {
        return formatted;
    }

    if value < particulate::GOOD {
        format!("{}", formatted.green())
    } else if value < particulate::MODERATE {
        format!("{}", formatted.yellow())
    } else if value < particulate::POOR {
        // Orange color (RGB: 255, 165, 0)
        format!("{}", formatted.truecolor(255, 165, 0))
    } else {
        format!("{}", formatted.red())
    }
}

/// Format an element's state. Running tools and open gates are green.
pub fn format_state_colored(kind: ElementKind, value: &StateValue, no_color: bool) -> String {
    let text = value.to_string();
    if no_color {
        return text;
    }

    match value {
        StateValue::Unavailable => format!("{}", text.dimmed()),
        _ if kind == ElementKind::Tool && value.is_on() => format!("{}", text.green()),
        _ if kind == ElementKind::Gate && value.is_open() => format!("{}", text.green()),
        _ if matches!(kind, ElementKind::Tool | ElementKind::Gate) => format!("{}", text.red()),
        _ => text,
    }
}

/// Format the live-channel state.
pub fn format_connection(state: ConnectionState, no_color: bool) -> String {
    let text = state.to_string();
    if no_color {
        return text;
    }

    match state {
        ConnectionState::Connected => format!("{}", text.green()),
        ConnectionState::Connecting => format!("{}", text.yellow()),
        ConnectionState::Disconnected => format!("{}", text.red()),
    }
}

// ============================================================================
// Bars and Sparklines
// ============================================================================

/// Render ON/OFF/UNAVAILABLE shares as a stacked bar `width` cells wide.
pub fn format_duration_bar(percentages: &Percentages, width: usize, no_color: bool) -> String {
    let cells = |pct: f64| ((pct / 100.0) * width as f64).round() as usize;
    let on = cells(percentages.on).min(width);
    let off = cells(percentages.off).min(width - on);
    let unavailable = width - on - off;

    if no_color {
        return format!(
            "{}{}{}",
            "#".repeat(on),
            "-".repeat(off),
            ".".repeat(unavailable)
        );
    }

    format!(
        "{}{}{}",
        "█".repeat(on).green(),
        "█".repeat(off).red(),
        "░".repeat(unavailable).dimmed()
    )
}

const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const SPARK_LEVELS_ASCII: [char; 8] = ['_', '.', '-', '~', '=', '+', '*', '#'];

/// Render values as a one-line sparkline scaled to `[min, max]`.
///
/// Only the last `width` values are drawn.
pub fn sparkline(values: &[f64], min: f64, max: f64, width: usize, no_color: bool) -> String {
    let levels = if no_color {
        &SPARK_LEVELS_ASCII
    } else {
        &SPARK_LEVELS
    };
    let span = (max - min).max(f64::EPSILON);
    let skip = values.len().saturating_sub(width);

    values
        .iter()
        .skip(skip)
        .map(|v| {
            let ratio = ((v - min) / span).clamp(0.0, 1.0);
            levels[(ratio * (levels.len() - 1) as f64).round() as usize]
        })
        .collect()
}

// ============================================================================
// Messages
// ============================================================================

/// Format a success message.
pub fn format_success(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[OK] {}", message)
    } else {
        format!("{} {}", "[OK]".green(), message)
    }
}

/// Format an info message.
pub fn format_info(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[--] {}", message)
    } else {
        format!("{} {}", "[--]".cyan(), message)
    }
}

/// Format a warning message.
pub fn format_warning(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[!!] {}", message)
    } else {
        format!("{} {}", "[!!]".yellow(), message)
    }
}

/// Format a title header.
pub fn format_title(title: &str, no_color: bool) -> String {
    if no_color {
        format!("{}\n{}", title, "━".repeat(title.chars().count()))
    } else {
        format!(
            "{}\n{}",
            title.bold(),
            "━".repeat(title.chars().count()).dimmed()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concentration_no_color() {
        assert_eq!(format_concentration_colored(12.345, true), "12.3");
    }

    #[test]
    fn test_concentration_colored_keeps_value() {
        for value in [1.0, 20.0, 40.0, 80.0] {
            let out = format_concentration_colored(value, false);
            assert!(out.contains(&format!("{:.1}", value)));
            assert!(out.contains("\u{1b}["));
        }
    }

    #[test]
    fn test_state_no_color() {
        let on = StateValue::from("ON");
        assert_eq!(format_state_colored(ElementKind::Tool, &on, true), "ON");
        assert_eq!(
            format_state_colored(ElementKind::Other, &StateValue::Unavailable, true),
            "UNAVAILABLE"
        );
    }

    #[test]
    fn test_duration_bar_width() {
        let pct = Percentages {
            on: 30.0,
            off: 60.0,
            unavailable: 10.0,
        };
        assert_eq!(format_duration_bar(&pct, 10, true), "###------.");

        let rounding = Percentages {
            on: 55.0,
            off: 45.0,
            unavailable: 0.0,
        };
        assert_eq!(format_duration_bar(&rounding, 5, true).chars().count(), 5);
    }

    #[test]
    fn test_sparkline() {
        assert_eq!(sparkline(&[0.0, 5.0, 10.0], 0.0, 10.0, 10, true), "_=#");
        assert_eq!(sparkline(&[0.0, 5.0, 10.0], 0.0, 10.0, 2, true), "=#");
        assert_eq!(sparkline(&[], 0.0, 10.0, 10, true), "");
        // Flat range does not divide by zero.
        assert_eq!(sparkline(&[3.0, 3.0], 3.0, 3.0, 10, true), "__");
    }

    #[test]
    fn test_messages_no_color() {
        assert_eq!(format_success("done", true), "[OK] done");
        assert_eq!(format_info("note", true), "[--] note");
        assert_eq!(format_warning("careful", true), "[!!] careful");
        assert_eq!(format_title("Dust", true), "Dust\n━━━━");
    }
}
