//! Step sequencer: the tour state machine.
//!
//! One sequencer drives one tour at a time. Each step resolution runs on a
//! spawned task that waits for the step's targets; every `set_steps`,
//! `start` and `finish` bumps a generation counter and aborts that task, and
//! a task only touches state while its generation is still current. A late
//! wait result therefore never shows a step the tour has moved past.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::document::{Document, ElementHandle};
use crate::events::{EventBus, TourEvent};
use crate::hooks::{isolate, LifecycleHooks, TourOptions};
use crate::overlay::OverlayPort;
use crate::tour::{MissingTargetPolicy, Step};
use crate::waiter::ElementWaiter;

/// Where the sequencer currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TourStatus {
    #[default]
    Idle,
    /// Waiting for the targets of step `index`
    Resolving { index: usize },
    /// Step `index` is on screen
    Showing { index: usize },
}

/// Point-in-time copy of sequencer state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub active: bool,
    pub current_index: usize,
    pub total_steps: usize,
    pub status: TourStatus,
}

#[derive(Default)]
struct State {
    steps: Arc<Vec<Step>>,
    options: TourOptions,
    active: bool,
    current_index: usize,
    status: TourStatus,
    generation: u64,
    task: Option<JoinHandle<()>>,
    /// A step has been shown and not hidden since
    overlay_visible: bool,
}

impl State {
    /// Drop any outstanding resolution and start a new cycle
    fn invalidate(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.generation
    }
}

/// Everything a resolution task needs, shared with the sequencer handle
#[derive(Clone)]
struct Driver {
    state: Arc<Mutex<State>>,
    status: Arc<watch::Sender<TourStatus>>,
    waiter: ElementWaiter,
    overlay: Arc<dyn OverlayPort>,
    events: Option<EventBus>,
    policy: MissingTargetPolicy,
}

/// Guided-tour sequencer
#[derive(Clone)]
pub struct StepSequencer {
    driver: Driver,
}

impl StepSequencer {
    pub fn new(document: Arc<dyn Document>, overlay: Arc<dyn OverlayPort>) -> Self {
        let (status, _) = watch::channel(TourStatus::Idle);
        Self {
            driver: Driver {
                state: Arc::new(Mutex::new(State::default())),
                status: Arc::new(status),
                waiter: ElementWaiter::new(document),
                overlay,
                events: None,
                policy: MissingTargetPolicy::default(),
            },
        }
    }

    /// Build a sequencer with the waiter and policy from `config`
    pub fn from_config(
        document: Arc<dyn Document>,
        overlay: Arc<dyn OverlayPort>,
        config: &Config,
    ) -> Self {
        let waiter = ElementWaiter::new(document.clone())
            .with_timeout(config.tour.timeout())
            .with_frame_interval(config.tour.frame_interval());
        Self::new(document, overlay)
            .with_waiter(waiter)
            .with_missing_target(config.tour.missing_target)
    }

    pub fn with_waiter(mut self, waiter: ElementWaiter) -> Self {
        self.driver.waiter = waiter;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.driver.events = Some(events);
        self
    }

    /// Default policy for tours whose options don't choose one
    pub fn with_missing_target(mut self, policy: MissingTargetPolicy) -> Self {
        self.driver.policy = policy;
        self
    }

    /// Replace the step list and options, abandoning any running tour
    pub fn set_steps(&self, steps: Vec<Step>, options: TourOptions) {
        self.driver.set_steps(steps, options);
    }

    /// Start (or restart) the tour from the first step.
    ///
    /// Resolution runs on a spawned task, so this must be called from within
    /// a tokio runtime.
    pub fn start(&self) {
        self.driver.start();
    }

    /// Advance past the step on screen
    pub fn next(&self) {
        self.driver.next();
    }

    /// End the tour
    pub fn finish(&self) {
        self.driver.finish(None);
    }

    /// Wait until no step resolution is outstanding
    pub async fn settled(&self) {
        let mut rx = self.driver.status.subscribe();
        let _ = rx
            .wait_for(|s| !matches!(s, TourStatus::Resolving { .. }))
            .await;
    }

    /// Watch status transitions
    pub fn subscribe(&self) -> watch::Receiver<TourStatus> {
        self.driver.status.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        let st = self.driver.lock();
        Snapshot {
            active: st.active,
            current_index: st.current_index,
            total_steps: st.steps.len(),
            status: st.status,
        }
    }

    pub fn is_active(&self) -> bool {
        self.driver.lock().active
    }

    /// The step at the cursor, if the cursor is inside the list
    pub fn current_step(&self) -> Option<Step> {
        let st = self.driver.lock();
        st.steps.get(st.current_index).cloned()
    }
}

impl Driver {
    fn lock(&self) -> MutexGuard<'_, State> {
        // State is only written in short critical sections without callouts
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, st: &mut State, status: TourStatus) {
        st.status = status;
        self.status.send_replace(status);
    }

    fn publish(&self, event: TourEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    fn set_steps(&self, steps: Vec<Step>, options: TourOptions) {
        let overlay_visible = {
            let mut st = self.lock();
            let overlay_visible = st.overlay_visible;
            st.invalidate();
            st.steps = Arc::new(steps);
            st.options = options;
            st.active = false;
            st.current_index = 0;
            self.set_status(&mut st, TourStatus::Idle);
            tracing::debug!(steps = st.steps.len(), "tour steps replaced");
            overlay_visible
        };

        // The previous step stays on screen while the next one resolves
        if overlay_visible {
            self.hide_overlay();
        }
    }

    fn start(&self) {
        let (generation, hooks, total) = {
            let mut st = self.lock();
            if st.steps.is_empty() {
                tracing::debug!("start ignored: no steps");
                return;
            }
            let generation = st.invalidate();
            st.active = true;
            st.current_index = 0;
            // Leave Idle/Showing before on_start so a reentrant next() is ignored
            self.set_status(&mut st, TourStatus::Resolving { index: 0 });
            (generation, st.options.hooks.clone(), st.steps.len())
        };

        tracing::info!(steps = total, "tour started");
        self.publish(TourEvent::Started { steps: total });
        hooks.fire_start();
        self.go_step(0, generation);
    }

    fn next(&self) {
        let (index, generation) = {
            let st = self.lock();
            if !st.active {
                tracing::debug!("next ignored: tour not active");
                return;
            }
            if let TourStatus::Resolving { index } = st.status {
                tracing::debug!(index, "next ignored: step still resolving");
                return;
            }
            (st.current_index + 1, st.generation)
        };
        self.go_step(index, generation);
    }

    fn go_step(&self, index: usize, generation: u64) {
        let mut st = self.lock();
        if st.generation != generation || !st.active {
            tracing::debug!(index, "stale step request dropped");
            return;
        }

        if index >= st.steps.len() {
            st.current_index = st.steps.len();
            drop(st);
            self.finish(Some(generation));
            return;
        }

        st.current_index = index;
        self.set_status(&mut st, TourStatus::Resolving { index });

        if let Some(previous) = st.task.take() {
            previous.abort();
        }
        let driver = self.clone();
        let steps = st.steps.clone();
        st.task = Some(tokio::spawn(async move {
            driver.resolve_from(index, generation, steps).await;
        }));
    }

    /// Resolve step `index`, cascading through steps whose targets never appear
    async fn resolve_from(&self, mut index: usize, generation: u64, steps: Arc<Vec<Step>>) {
        while let Some(step) = steps.get(index) {
            let resolution = self.waiter.wait_lenient(&step.selector, step.timeout()).await;

            let (hooks, policy) = {
                let st = self.lock();
                if st.generation != generation {
                    tracing::debug!(index, "stale resolution discarded");
                    return;
                }
                (
                    st.options.hooks.clone(),
                    st.options.missing_target.unwrap_or(self.policy),
                )
            };

            let missing = resolution.missing();
            if let Some(targets) = resolution.into_complete() {
                self.show_step(index, step, &targets, generation, &hooks);
                return;
            }

            tracing::info!(index, missing = ?missing, "step skipped: targets not found");
            self.publish(TourEvent::StepSkipped { index, missing });

            if policy == MissingTargetPolicy::Finish {
                self.finish(Some(generation));
                return;
            }

            index += 1;
            let mut st = self.lock();
            if st.generation != generation {
                return;
            }
            if index >= steps.len() {
                st.current_index = steps.len();
                break;
            }
            st.current_index = index;
            self.set_status(&mut st, TourStatus::Resolving { index });
        }

        self.finish(Some(generation));
    }

    fn show_step(
        &self,
        index: usize,
        step: &Step,
        targets: &[ElementHandle],
        generation: u64,
        hooks: &LifecycleHooks,
    ) {
        {
            let mut st = self.lock();
            if st.generation != generation {
                return;
            }
            st.task = None;
            st.overlay_visible = true;
            self.set_status(&mut st, TourStatus::Showing { index });
        }

        tracing::info!(index, selectors = ?step.selector, "step shown");
        let overlay = self.overlay.clone();
        isolate("overlay.show", || {
            if let Err(e) = overlay.show(step, targets) {
                tracing::warn!(index, error = %e, "overlay failed to show step");
            }
        });
        self.publish(TourEvent::StepChanged {
            index,
            step: step.clone(),
        });
        hooks.fire_step_change(index, step);
    }

    /// End the tour. With `expected`, only if that cycle is still current.
    fn finish(&self, expected: Option<u64>) {
        let (was_active, hooks) = {
            let mut st = self.lock();
            if expected.is_some_and(|g| g != st.generation) {
                return;
            }
            let was_active = st.active;
            st.active = false;
            st.invalidate();
            self.set_status(&mut st, TourStatus::Idle);
            (was_active, st.options.hooks.clone())
        };

        self.hide_overlay();

        if was_active {
            tracing::info!("tour finished");
            self.publish(TourEvent::Finished);
            hooks.fire_finish();
        }
    }

    fn hide_overlay(&self) {
        self.lock().overlay_visible = false;
        let overlay = self.overlay.clone();
        isolate("overlay.hide", || {
            if let Err(e) = overlay.hide() {
                tracing::warn!(error = %e, "overlay failed to hide");
            }
        });
    }
}
