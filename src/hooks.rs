//! Lifecycle callbacks and per-tour options.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::tour::{MissingTargetPolicy, Step};

type StartHook = Arc<dyn Fn() + Send + Sync>;
type StepChangeHook = Arc<dyn Fn(usize, &Step) + Send + Sync>;
type FinishHook = Arc<dyn Fn() + Send + Sync>;

/// Optional callbacks fired at tour transitions. Absent hooks are no-ops.
#[derive(Clone, Default)]
pub struct LifecycleHooks {
    on_start: Option<StartHook>,
    on_step_change: Option<StepChangeHook>,
    on_finish: Option<FinishHook>,
}

impl LifecycleHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(hook));
        self
    }

    pub fn on_step_change(mut self, hook: impl Fn(usize, &Step) + Send + Sync + 'static) -> Self {
        self.on_step_change = Some(Arc::new(hook));
        self
    }

    pub fn on_finish(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_finish = Some(Arc::new(hook));
        self
    }

    pub(crate) fn fire_start(&self) {
        if let Some(hook) = &self.on_start {
            isolate("on_start", || hook());
        }
    }

    pub(crate) fn fire_step_change(&self, index: usize, step: &Step) {
        if let Some(hook) = &self.on_step_change {
            isolate("on_step_change", || hook(index, step));
        }
    }

    pub(crate) fn fire_finish(&self) {
        if let Some(hook) = &self.on_finish {
            isolate("on_finish", || hook());
        }
    }
}

impl fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("on_start", &self.on_start.is_some())
            .field("on_step_change", &self.on_step_change.is_some())
            .field("on_finish", &self.on_finish.is_some())
            .finish()
    }
}

/// Run a callback, logging a panic instead of unwinding into the sequencer
pub(crate) fn isolate(name: &str, f: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
        let message = panic
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        tracing::warn!(hook = name, panic = %message, "tour callback panicked");
    }
}

/// Options set together with the step list
#[derive(Debug, Clone, Default)]
pub struct TourOptions {
    pub hooks: LifecycleHooks,
    /// `None` keeps the sequencer's configured policy
    pub missing_target: Option<MissingTargetPolicy>,
}

impl TourOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hooks(mut self, hooks: LifecycleHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_missing_target(mut self, policy: MissingTargetPolicy) -> Self {
        self.missing_target = Some(policy);
        self
    }
}
