//! Event types and sinks for observing packing runs.
//!
//! This module defines [`PackEvent`] and a set of sinks and adapters to emit,
//! collect, or forward events while an [`crate::pack::Environment`] packs.
use glam::Vec3;

use crate::ingredient::placement::RejectReason;
use crate::ingredient::{Completion, IngredientId};
use crate::pack::config::PackConfig;
use crate::pack::result::{PackResult, PackedInstance};

/// Describes events emitted while packing.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum PackEvent {
    /// Emitted when a run starts.
    RunStarted {
        /// Seed of the run RNG.
        seed: u64,
        /// The configuration the environment was built with.
        config: PackConfig,
        /// Number of ingredients in the environment.
        ingredient_count: usize,
        /// Number of grid points.
        grid_points: usize,
    },

    /// Emitted when the main loop stops.
    RunFinished {
        /// Final result of the run.
        result: PackResult,
    },

    /// Emitted after every commit.
    PlacementMade {
        /// The committed instance.
        instance: PackedInstance,
    },

    /// Emitted when an attempt at a grid point failed.
    AttemptRejected {
        ingredient: IngredientId,
        grid_point: u32,
        /// Grid point position.
        position: Vec3,
        reason: RejectReason,
    },

    /// Emitted when an ingredient leaves the active set.
    IngredientCompleted {
        ingredient: IngredientId,
        name: String,
        completion: Completion,
        placed: u32,
        target: u32,
    },

    /// Emitted every `progress_interval` commits.
    Progress {
        placed: u64,
        target: u64,
        free_points: usize,
    },

    /// Non-fatal warning.
    Warning {
        /// Context string (e.g. ingredient name).
        context: String,
        /// Human-readable message.
        message: String,
    },
}

/// Discriminant of [`PackEvent`], used by sinks to opt out of costly events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackEventKind {
    RunStarted,
    RunFinished,
    PlacementMade,
    AttemptRejected,
    IngredientCompleted,
    Progress,
    Warning,
}

impl PackEvent {
    pub fn kind(&self) -> PackEventKind {
        match self {
            PackEvent::RunStarted { .. } => PackEventKind::RunStarted,
            PackEvent::RunFinished { .. } => PackEventKind::RunFinished,
            PackEvent::PlacementMade { .. } => PackEventKind::PlacementMade,
            PackEvent::AttemptRejected { .. } => PackEventKind::AttemptRejected,
            PackEvent::IngredientCompleted { .. } => PackEventKind::IngredientCompleted,
            PackEvent::Progress { .. } => PackEventKind::Progress,
            PackEvent::Warning { .. } => PackEventKind::Warning,
        }
    }
}

/// A generic event sink that accepts [`PackEvent`]s.
pub trait EventSink {
    fn send(&mut self, event: PackEvent);

    /// Whether events of `kind` should be built and sent at all.
    #[inline]
    fn wants(&self, _kind: PackEventKind) -> bool {
        true
    }

    fn send_many<I>(&mut self, events: I)
    where
        Self: Sized,
        I: IntoIterator<Item = PackEvent>,
    {
        for e in events {
            self.send(e);
        }
    }
}

/// A no-op event sink.
impl EventSink for () {
    #[inline]
    fn send(&mut self, _event: PackEvent) {}

    #[inline]
    fn wants(&self, _kind: PackEventKind) -> bool {
        false
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    #[inline]
    fn send(&mut self, event: PackEvent) {
        (**self).send(event);
    }

    #[inline]
    fn wants(&self, kind: PackEventKind) -> bool {
        (**self).wants(kind)
    }
}

/// An event sink that forwards to a user-provided closure.
pub struct FnSink<F>
where
    F: FnMut(PackEvent),
{
    f: F,
}

impl<F> FnSink<F>
where
    F: FnMut(PackEvent),
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> EventSink for FnSink<F>
where
    F: FnMut(PackEvent),
{
    #[inline]
    fn send(&mut self, event: PackEvent) {
        (self.f)(event);
    }
}

/// An event sink that collects events in a `Vec`, optionally filtered by kind.
#[derive(Default)]
pub struct VecSink {
    events: Vec<PackEvent>,
    only: Option<Vec<PackEventKind>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            events: Vec::with_capacity(cap),
            only: None,
        }
    }

    /// Collects only the listed kinds.
    pub fn only(kinds: impl IntoIterator<Item = PackEventKind>) -> Self {
        Self {
            events: Vec::new(),
            only: Some(kinds.into_iter().collect()),
        }
    }

    pub fn into_inner(self) -> Vec<PackEvent> {
        self.events
    }

    pub fn as_slice(&self) -> &[PackEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventSink for VecSink {
    #[inline]
    fn send(&mut self, event: PackEvent) {
        if self.wants(event.kind()) {
            self.events.push(event);
        }
    }

    fn wants(&self, kind: PackEventKind) -> bool {
        self.only.as_ref().is_none_or(|kinds| kinds.contains(&kind))
    }
}

/// Fan-out sink that forwards each event to all contained sinks.
pub struct MultiSink<S: EventSink> {
    pub(crate) sinks: Vec<S>,
}

impl<S: EventSink> MultiSink<S> {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn with_sinks(sinks: Vec<S>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: S) {
        self.sinks.push(sink);
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn into_inner(self) -> Vec<S> {
        self.sinks
    }
}

impl<S: EventSink> Default for MultiSink<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: EventSink> EventSink for MultiSink<S> {
    fn send(&mut self, event: PackEvent) {
        let kind = event.kind();
        let targets: Vec<usize> = (0..self.sinks.len())
            .filter(|&i| self.sinks[i].wants(kind))
            .collect();
        let Some((&last, rest)) = targets.split_last() else {
            return;
        };
        for &i in rest {
            self.sinks[i].send(event.clone());
        }
        self.sinks[last].send(event);
    }

    fn wants(&self, kind: PackEventKind) -> bool {
        self.sinks.iter().any(|s| s.wants(kind))
    }
}

/// Minimal adapter trait for types that can expose an [`EventSink`].
pub trait AsEventSink {
    fn as_event_sink(&mut self) -> &mut dyn EventSink;
}

impl<S: EventSink> AsEventSink for S {
    fn as_event_sink(&mut self) -> &mut dyn EventSink {
        self
    }
}
