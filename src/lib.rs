//! Guidepost - guided tours over a live document
//!
//! A [`StepSequencer`] walks an ordered list of [`Step`]s, waits for each
//! step's target elements to appear in a [`Document`], shows the step through
//! an [`OverlayPort`], and skips steps whose targets never mount.

pub mod config;
pub mod document;
pub mod error;
pub mod events;
pub mod fixture;
pub mod hooks;
pub mod logging;
pub mod overlay;
pub mod selector;
pub mod sequencer;
pub mod tour;
pub mod waiter;

pub use config::Config;
pub use document::{Document, Element, ElementHandle, MemoryDocument, NodeId};
pub use error::TourError;
pub use events::{EventBus, TourEvent};
pub use hooks::{LifecycleHooks, TourOptions};
pub use overlay::{ConsoleOverlay, OverlayPort};
pub use selector::Selector;
pub use sequencer::{Snapshot, StepSequencer, TourStatus};
pub use tour::{MissingTargetPolicy, Step, TourDefinition};
pub use waiter::{ElementWaiter, Resolution};
