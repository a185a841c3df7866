//! The rendering seam.
//!
//! The session never draws anything itself. Every visible change goes through
//! a [`RenderAdapter`], which a front end implements (the `dustline` binary
//! prints to the terminal; tests record calls).

use dustline_types::{ElementKind, Sample, Scope, SeriesKey, StateValue};

use crate::channel::ConnectionState;
use crate::durations::DurationView;
use crate::window::{ValueRange, Window};

/// One chart refresh for a series.
#[derive(Debug, Clone, Copy)]
pub struct SeriesFrame<'a> {
    /// The series being drawn.
    pub key: &'a SeriesKey,
    /// Display label, e.g. `PM2.5`.
    pub label: &'a str,
    /// Samples inside `window`, oldest first.
    pub samples: &'a [Sample],
    /// Visible time range.
    pub window: Window,
    /// Y-axis bounds.
    pub range: ValueRange,
}

/// Receives every visible change made by a [`Dashboard`](crate::Dashboard).
pub trait RenderAdapter: Send {
    /// An element took a new value.
    fn device_state(&mut self, scope: &Scope, id: &str, kind: ElementKind, value: &StateValue);

    /// A duration chart should show `view`.
    fn durations(&mut self, scope: &Scope, id: &str, view: &DurationView);

    /// A concentration readout changed. `value` is already scaled to µg/m³.
    fn concentration(&mut self, scope: &Scope, id: &str, value: f64);

    /// A series chart should be redrawn.
    fn series(&mut self, frame: SeriesFrame<'_>);

    /// The simulation-mode toggle should show `enabled`.
    fn simulation_mode(&mut self, enabled: bool);

    /// The live channel changed state.
    fn connection(&mut self, state: ConnectionState) {
        let _ = state;
    }

    /// Show a user-visible error.
    fn alert(&mut self, message: &str);
}

impl<R: RenderAdapter + ?Sized> RenderAdapter for Box<R> {
    fn device_state(&mut self, scope: &Scope, id: &str, kind: ElementKind, value: &StateValue) {
        (**self).device_state(scope, id, kind, value);
    }

    fn durations(&mut self, scope: &Scope, id: &str, view: &DurationView) {
        (**self).durations(scope, id, view);
    }

    fn concentration(&mut self, scope: &Scope, id: &str, value: f64) {
        (**self).concentration(scope, id, value);
    }

    fn series(&mut self, frame: SeriesFrame<'_>) {
        (**self).series(frame);
    }

    fn simulation_mode(&mut self, enabled: bool) {
        (**self).simulation_mode(enabled);
    }

    fn connection(&mut self, state: ConnectionState) {
        (**self).connection(state);
    }

    fn alert(&mut self, message: &str) {
        (**self).alert(message);
    }
}

/// A renderer that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRenderer;

impl RenderAdapter for NullRenderer {
    fn device_state(&mut self, _: &Scope, _: &str, _: ElementKind, _: &StateValue) {}
    fn durations(&mut self, _: &Scope, _: &str, _: &DurationView) {}
    fn concentration(&mut self, _: &Scope, _: &str, _: f64) {}
    fn series(&mut self, _: SeriesFrame<'_>) {}
    fn simulation_mode(&mut self, _: bool) {}
    fn alert(&mut self, _: &str) {}
}
