//! The packing scheduler: environment setup, the main loop and its outputs.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub mod config;
pub mod environment;
pub mod events;
pub mod priority;
pub mod result;
pub mod runner;

pub use config::{OrientationMethod, PackConfig, PlaceMethod};
pub use environment::{BuildWarning, Environment, EnvironmentBuilder};
pub use events::{EventSink, PackEvent, PackEventKind};
pub use priority::PriorityTable;
pub use result::{IngredientReport, JsonWriter, PackResult, PackedInstance, Writer};
pub use runner::{PackRun, Step, StopReason};

/// Cooperative stop request, checked at the top of every scheduler iteration.
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let flag = CancellationFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }
}
