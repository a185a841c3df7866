//! Line-oriented terminal front end for a dashboard session.

use std::collections::HashMap;
use std::io::{self, Write};

use owo_colors::OwoColorize;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::warn;

use dustline_core::{ConnectionState, DurationView, RenderAdapter, SeriesFrame};
use dustline_types::{ElementKind, Sample, Scope, SeriesKey, StateValue};

use crate::style;

/// Default number of sparkline cells per series.
pub const SPARKLINE_WIDTH: usize = 40;

/// Writes one line per visible change.
///
/// Series are redrawn every tick; a line is only written when the drawing
/// differs from the previous one for that series.
pub struct TerminalRenderer<W> {
    out: W,
    no_color: bool,
    sparkline_width: usize,
    last_series: HashMap<SeriesKey, String>,
}

impl TerminalRenderer<io::Stdout> {
    pub fn stdout(no_color: bool) -> Self {
        Self::new(io::stdout(), no_color)
    }
}

impl<W: Write + Send> TerminalRenderer<W> {
    pub fn new(out: W, no_color: bool) -> Self {
        Self {
            out,
            no_color,
            sparkline_width: SPARKLINE_WIDTH,
            last_series: HashMap::new(),
        }
    }

    pub fn with_sparkline_width(mut self, width: usize) -> Self {
        self.sparkline_width = width.max(1);
        self
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    fn line(&mut self, scope: &Scope, body: &str) {
        let label = match scope {
            Scope::Global => String::new(),
            Scope::Device(uuid) if self.no_color => format!("[{}] ", uuid),
            Scope::Device(uuid) => format!("[{}] ", uuid.cyan()),
        };
        if let Err(e) = writeln!(self.out, "{}{}", label, body) {
            warn!("Failed to write to terminal: {}", e);
        }
    }

    fn name(&self, id: &str) -> String {
        if self.no_color {
            id.to_string()
        } else {
            format!("{}", id.bold())
        }
    }
}

impl<W: Write + Send> RenderAdapter for TerminalRenderer<W> {
    fn device_state(&mut self, scope: &Scope, id: &str, kind: ElementKind, value: &StateValue) {
        // Concentrations are shown scaled by `concentration`.
        if kind == ElementKind::Concentration {
            return;
        }
        let body = format!(
            "{} {}",
            self.name(id),
            style::format_state_colored(kind, value, self.no_color)
        );
        self.line(scope, &body);
    }

    fn durations(&mut self, scope: &Scope, id: &str, view: &DurationView) {
        let bar = style::format_duration_bar(&view.percentages, 20, self.no_color);
        let p = view.percentages;
        let mut body = format!(
            "{} {} on {:.0}% off {:.0}% unavailable {:.0}%",
            self.name(id),
            bar,
            p.on,
            p.off,
            p.unavailable
        );
        if let Some(minutes) = view.powered_minutes {
            body.push_str(&format!(" ({:.0} min powered)", minutes));
        }
        if view.fallback {
            body.push_str(" (no data)");
        }
        self.line(scope, &body);
    }

    fn concentration(&mut self, scope: &Scope, id: &str, value: f64) {
        let body = format!(
            "{} {} µg/m³",
            self.name(id),
            style::format_concentration_colored(value, self.no_color)
        );
        self.line(scope, &body);
    }

    fn series(&mut self, frame: SeriesFrame<'_>) {
        let values: Vec<f64> = frame.samples.iter().map(Sample::value).collect();
        let spark = style::sparkline(
            &values,
            frame.range.min,
            frame.range.max,
            self.sparkline_width,
            self.no_color,
        );
        let latest = frame
            .samples
            .last()
            .map(|s| format!("{:.1}", s.value()))
            .unwrap_or_else(|| "-".to_string());
        let body = format!(
            "{:<6} {} {} [{}..{}] {:.1}-{:.1}",
            frame.label,
            spark,
            latest,
            clock(frame.window.start),
            clock(frame.window.end),
            frame.range.min,
            frame.range.max
        );

        // Window bounds move every tick; compare on the data only.
        let fingerprint = format!("{} {}", spark, latest);
        if self.last_series.get(frame.key) == Some(&fingerprint) {
            return;
        }
        self.last_series.insert(frame.key.clone(), fingerprint);
        self.line(&frame.key.scope, &body);
    }

    fn simulation_mode(&mut self, enabled: bool) {
        let text = if enabled {
            "Simulation mode on"
        } else {
            "Simulation mode off"
        };
        let body = style::format_info(text, self.no_color);
        self.line(&Scope::Global, &body);
    }

    fn connection(&mut self, state: ConnectionState) {
        let body = format!(
            "Connection {}",
            style::format_connection(state, self.no_color)
        );
        let body = style::format_info(&body, self.no_color);
        self.line(&Scope::Global, &body);
    }

    fn alert(&mut self, message: &str) {
        let body = style::format_warning(message, self.no_color);
        self.line(&Scope::Global, &body);
    }
}

fn clock(ts: OffsetDateTime) -> String {
    ts.format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| ts.unix_timestamp().to_string())
}
