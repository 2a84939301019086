//! End-to-end tour scenarios against an in-memory document.
//!
//! All tests run on a paused tokio clock, so timeouts elapse instantly and
//! elapsed-time assertions are exact.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use guidepost::{
    Element, ElementHandle, ElementWaiter, EventBus, LifecycleHooks, MemoryDocument,
    MissingTargetPolicy, OverlayPort, Step, StepSequencer, TourEvent, TourOptions, TourStatus,
};
use tokio::time::Instant;

// ─── Test doubles ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Show(Vec<String>),
    Hide,
    Start,
    StepChange(usize, Vec<String>),
    Finish,
}

/// Shared, ordered record of overlay and hook calls
#[derive(Clone, Default)]
struct Recorder {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Recorder {
    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    fn hooks(&self) -> LifecycleHooks {
        let (a, b, c) = (self.clone(), self.clone(), self.clone());
        LifecycleHooks::new()
            .on_start(move || a.push(Call::Start))
            .on_step_change(move |i, step| b.push(Call::StepChange(i, step.selector.clone())))
            .on_finish(move || c.push(Call::Finish))
    }
}

/// Overlay that records calls and can be told to fail
#[derive(Clone, Default)]
struct MockOverlay {
    recorder: Recorder,
    fail_show: bool,
    panic_on_hide: bool,
}

impl OverlayPort for MockOverlay {
    fn show(&self, step: &Step, targets: &[ElementHandle]) -> anyhow::Result<()> {
        assert_eq!(targets.len(), step.selector.len());
        self.recorder.push(Call::Show(step.selector.clone()));
        if self.fail_show {
            return Err(anyhow!("renderer unavailable"));
        }
        Ok(())
    }

    fn hide(&self) -> anyhow::Result<()> {
        self.recorder.push(Call::Hide);
        if self.panic_on_hide {
            panic!("hide exploded");
        }
        Ok(())
    }
}

struct Harness {
    doc: MemoryDocument,
    recorder: Recorder,
    sequencer: StepSequencer,
}

fn harness_with(overlay: MockOverlay, timeout_ms: u64) -> Harness {
    let doc = MemoryDocument::new();
    let recorder = overlay.recorder.clone();
    let waiter = ElementWaiter::new(Arc::new(doc.clone()))
        .with_timeout(Duration::from_millis(timeout_ms));
    let sequencer = StepSequencer::new(Arc::new(doc.clone()), Arc::new(overlay)).with_waiter(waiter);
    Harness {
        doc,
        recorder,
        sequencer,
    }
}

fn harness(timeout_ms: u64) -> Harness {
    harness_with(MockOverlay::default(), timeout_ms)
}

fn sel(s: &str) -> Vec<String> {
    vec![s.to_string()]
}

fn div(id: &str) -> Element {
    Element::new("div").with_id(id)
}

impl Harness {
    fn set(&self, steps: Vec<Step>) {
        self.sequencer
            .set_steps(steps, TourOptions::new().with_hooks(self.recorder.hooks()));
    }
}

// ─── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn scenario_a_missing_second_target_finishes_after_timeout() {
    let h = harness(100);
    h.doc.insert(div("a"));
    h.set(vec![Step::new("#a"), Step::new("#b")]);

    h.sequencer.start();
    h.sequencer.settled().await;
    assert_eq!(
        h.recorder.calls(),
        vec![Call::Start, Call::Show(sel("#a")), Call::StepChange(0, sel("#a"))]
    );

    let before_next = Instant::now();
    h.sequencer.next();
    h.sequencer.settled().await;
    let elapsed = before_next.elapsed();
    assert!(elapsed >= Duration::from_millis(100), "finished after {elapsed:?}");
    assert!(elapsed < Duration::from_millis(150), "finished after {elapsed:?}");

    assert_eq!(
        h.recorder.calls(),
        vec![
            Call::Start,
            Call::Show(sel("#a")),
            Call::StepChange(0, sel("#a")),
            Call::Hide,
            Call::Finish,
        ]
    );
    assert!(!h.sequencer.is_active());
}

#[tokio::test(start_paused = true)]
async fn scenario_b_late_target_is_shown_and_tour_waits_for_next() {
    let h = harness(5000);
    h.doc.mount_after(Duration::from_millis(50), div("x"));
    h.set(vec![Step::new("#x")]);

    h.sequencer.start();
    h.sequencer.settled().await;
    assert_eq!(h.recorder.count(|c| *c == Call::Show(sel("#x"))), 1);

    // Nothing happens until next() is called
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(h.sequencer.is_active());
    assert_eq!(h.recorder.count(|c| *c == Call::Finish), 0);
    assert_eq!(h.sequencer.snapshot().status, TourStatus::Showing { index: 0 });

    h.sequencer.next();
    assert!(!h.sequencer.is_active());
    assert_eq!(h.recorder.calls().last(), Some(&Call::Finish));
}

#[tokio::test(start_paused = true)]
async fn scenario_c_empty_tour_does_nothing() {
    let h = harness(100);
    h.set(Vec::new());

    h.sequencer.start();
    h.sequencer.settled().await;

    assert!(h.recorder.calls().is_empty());
    assert!(!h.sequencer.is_active());
    assert_eq!(h.sequencer.snapshot().status, TourStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn scenario_d_partially_resolved_step_is_skipped() {
    let h = harness(100);
    h.doc.insert(div("p"));
    h.doc.insert(div("r"));
    h.set(vec![Step::multi(["#p", "#q"]), Step::new("#r")]);

    h.sequencer.start();
    h.sequencer.settled().await;

    assert_eq!(
        h.recorder.calls(),
        vec![Call::Start, Call::Show(sel("#r")), Call::StepChange(1, sel("#r"))]
    );
    assert_eq!(h.sequencer.snapshot().current_index, 1);
}

// ─── Properties ───────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn skip_cascade_takes_one_timeout_per_missing_step() {
    let h = harness(100);
    h.doc.insert(div("last"));
    h.set(vec![
        Step::new("#m1"),
        Step::new("#m2"),
        Step::new("#m3"),
        Step::new("#last"),
    ]);

    let started = Instant::now();
    h.sequencer.start();
    h.sequencer.settled().await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(400), "{elapsed:?}");
    assert_eq!(h.recorder.count(|c| matches!(c, Call::StepChange(..))), 1);
    assert_eq!(h.recorder.calls().last(), Some(&Call::StepChange(3, sel("#last"))));
}

#[tokio::test(start_paused = true)]
async fn all_steps_missing_ends_in_finish() {
    let h = harness(50);
    h.set(vec![Step::new("#m1"), Step::new("#m2")]);

    h.sequencer.start();
    h.sequencer.settled().await;

    assert_eq!(h.recorder.calls(), vec![Call::Start, Call::Hide, Call::Finish]);
    assert_eq!(h.sequencer.snapshot().current_index, 2);
}

#[tokio::test(start_paused = true)]
async fn finish_is_idempotent() {
    let h = harness(100);
    h.doc.insert(div("a"));
    h.set(vec![Step::new("#a")]);
    h.sequencer.start();
    h.sequencer.settled().await;

    h.sequencer.finish();
    h.sequencer.finish();

    assert!(!h.sequencer.is_active());
    assert_eq!(h.recorder.count(|c| *c == Call::Finish), 1);
    assert_eq!(h.recorder.count(|c| *c == Call::Hide), 2);
}

#[tokio::test(start_paused = true)]
async fn next_while_idle_is_a_noop() {
    let h = harness(100);
    h.doc.insert(div("a"));
    h.set(vec![Step::new("#a")]);

    h.sequencer.next();
    h.sequencer.settled().await;

    assert!(h.recorder.calls().is_empty());
    assert_eq!(h.sequencer.snapshot().current_index, 0);
}

#[tokio::test(start_paused = true)]
async fn set_steps_while_running_discards_stale_wait() {
    let h = harness(5000);
    h.set(vec![Step::new("#old")]);
    h.sequencer.start();

    // Old wait is outstanding; replace the tour and start again
    tokio::time::sleep(Duration::from_millis(10)).await;
    h.set(vec![Step::new("#new")]);
    assert_eq!(h.sequencer.snapshot().status, TourStatus::Idle);
    assert!(!h.sequencer.is_active());

    h.doc.insert(div("old"));
    h.doc.insert(div("new"));
    h.sequencer.start();
    h.sequencer.settled().await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(h.recorder.count(|c| *c == Call::Show(sel("#old"))), 0);
    assert_eq!(h.recorder.count(|c| *c == Call::Show(sel("#new"))), 1);
    assert_eq!(h.recorder.count(|c| *c == Call::Start), 2);
}

#[tokio::test(start_paused = true)]
async fn set_steps_hides_a_shown_step() {
    let h = harness(100);
    h.doc.insert(div("a"));
    h.set(vec![Step::new("#a")]);
    h.sequencer.start();
    h.sequencer.settled().await;

    h.set(vec![Step::new("#b")]);
    assert_eq!(h.recorder.calls().last(), Some(&Call::Hide));
    assert_eq!(h.recorder.count(|c| *c == Call::Finish), 0);
}

#[tokio::test(start_paused = true)]
async fn set_steps_during_next_resolution_hides_previous_step() {
    let h = harness(5000);
    h.doc.insert(div("a"));
    h.set(vec![Step::new("#a"), Step::new("#b")]);
    h.sequencer.start();
    h.sequencer.settled().await;

    // Step 0 is still on screen while #b is being waited for
    h.sequencer.next();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.sequencer.snapshot().status, TourStatus::Resolving { index: 1 });

    h.set(vec![Step::new("#c")]);
    assert_eq!(h.recorder.calls().last(), Some(&Call::Hide));
    assert_eq!(h.recorder.count(|c| *c == Call::Hide), 1);

    // A second replacement has nothing left to hide
    h.set(vec![Step::new("#d")]);
    assert_eq!(h.recorder.count(|c| *c == Call::Hide), 1);
}

#[tokio::test(start_paused = true)]
async fn next_from_on_start_hook_is_ignored() {
    let h = harness(100);
    h.doc.insert(div("a"));
    h.doc.insert(div("b"));

    let handle = h.sequencer.clone();
    let recorder = h.recorder.clone();
    h.sequencer.set_steps(
        vec![Step::new("#a"), Step::new("#b")],
        TourOptions::new().with_hooks(LifecycleHooks::new().on_start(move || {
            recorder.push(Call::Start);
            handle.next();
        })),
    );

    h.sequencer.start();
    h.sequencer.settled().await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    let shows: Vec<Call> = h
        .recorder
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::Show(_)))
        .collect();
    assert_eq!(shows, vec![Call::Show(sel("#a"))]);
    assert_eq!(h.sequencer.snapshot().status, TourStatus::Showing { index: 0 });
}

#[tokio::test(start_paused = true)]
async fn start_while_running_restarts_from_first_step() {
    let h = harness(100);
    h.doc.insert(div("a"));
    h.doc.insert(div("b"));
    h.set(vec![Step::new("#a"), Step::new("#b")]);

    h.sequencer.start();
    h.sequencer.settled().await;
    h.sequencer.next();
    h.sequencer.settled().await;
    assert_eq!(h.sequencer.snapshot().current_index, 1);

    h.sequencer.start();
    h.sequencer.settled().await;

    let snap = h.sequencer.snapshot();
    assert_eq!(snap.current_index, 0);
    assert_eq!(snap.status, TourStatus::Showing { index: 0 });
    assert_eq!(h.recorder.count(|c| *c == Call::Show(sel("#a"))), 2);
}

#[tokio::test(start_paused = true)]
async fn strict_policy_finishes_at_first_missing_step() {
    let h = harness(100);
    h.doc.insert(div("b"));
    h.sequencer.set_steps(
        vec![Step::new("#missing"), Step::new("#b")],
        TourOptions::new()
            .with_hooks(h.recorder.hooks())
            .with_missing_target(MissingTargetPolicy::Finish),
    );

    h.sequencer.start();
    h.sequencer.settled().await;

    assert_eq!(h.recorder.calls(), vec![Call::Start, Call::Hide, Call::Finish]);
    assert_eq!(h.sequencer.snapshot().current_index, 0);
}

#[tokio::test(start_paused = true)]
async fn per_step_timeout_overrides_default() {
    let h = harness(5000);
    h.doc.insert(div("b"));
    h.set(vec![
        Step::new("#missing").with_timeout(Duration::from_millis(20)),
        Step::new("#b"),
    ]);

    let started = Instant::now();
    h.sequencer.start();
    h.sequencer.settled().await;

    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(h.recorder.calls().last(), Some(&Call::StepChange(1, sel("#b"))));
}

#[tokio::test(start_paused = true)]
async fn failing_overlay_and_panicking_hooks_do_not_corrupt_state() {
    let overlay = MockOverlay {
        fail_show: true,
        panic_on_hide: true,
        ..MockOverlay::default()
    };
    let h = harness_with(overlay, 100);
    h.doc.insert(div("a"));
    h.sequencer.set_steps(
        vec![Step::new("#a")],
        TourOptions::new().with_hooks(
            LifecycleHooks::new()
                .on_start(|| panic!("start hook"))
                .on_step_change(|_, _| panic!("step hook"))
                .on_finish(|| panic!("finish hook")),
        ),
    );

    h.sequencer.start();
    h.sequencer.settled().await;
    let snap = h.sequencer.snapshot();
    assert!(snap.active);
    assert_eq!(snap.status, TourStatus::Showing { index: 0 });

    h.sequencer.next();
    let snap = h.sequencer.snapshot();
    assert!(!snap.active);
    assert_eq!(snap.status, TourStatus::Idle);
    assert_eq!(h.recorder.calls(), vec![Call::Show(sel("#a")), Call::Hide]);
}

#[tokio::test(start_paused = true)]
async fn hook_may_drive_the_sequencer() {
    let h = harness(100);
    h.doc.insert(div("a"));
    h.doc.insert(div("b"));

    // Auto-advance from inside on_step_change
    let handle = h.sequencer.clone();
    let recorder = h.recorder.clone();
    h.sequencer.set_steps(
        vec![Step::new("#a"), Step::new("#b")],
        TourOptions::new().with_hooks(
            LifecycleHooks::new()
                .on_step_change(move |i, _| {
                    recorder.push(Call::StepChange(i, Vec::new()));
                    handle.next();
                })
                .on_finish({
                    let recorder = h.recorder.clone();
                    move || recorder.push(Call::Finish)
                }),
        ),
    );

    h.sequencer.start();
    // Each step change spawns the next resolution
    for _ in 0..3 {
        h.sequencer.settled().await;
        tokio::task::yield_now().await;
    }

    assert!(!h.sequencer.is_active());
    assert_eq!(h.recorder.count(|c| matches!(c, Call::StepChange(..))), 2);
    assert_eq!(h.recorder.calls().last(), Some(&Call::Finish));
}

#[tokio::test(start_paused = true)]
async fn events_are_published_in_order() {
    let h = harness(50);
    let bus = EventBus::new();
    let mut rx = bus.subscribe();
    let sequencer = h.sequencer.clone().with_events(bus);
    h.doc.insert(div("b"));
    sequencer.set_steps(vec![Step::new("#a"), Step::new("#b")], TourOptions::new());

    sequencer.start();
    sequencer.settled().await;
    sequencer.next();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(
        events,
        vec![
            TourEvent::Started { steps: 2 },
            TourEvent::StepSkipped {
                index: 0,
                missing: sel("#a"),
            },
            TourEvent::StepChanged {
                index: 1,
                step: Step::new("#b"),
            },
            TourEvent::Finished,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn independent_sequencers_do_not_interfere() {
    let first = harness(100);
    let second = harness(100);
    first.doc.insert(div("a"));
    second.doc.insert(div("z"));
    first.set(vec![Step::new("#a")]);
    second.set(vec![Step::new("#z")]);

    first.sequencer.start();
    second.sequencer.start();
    first.sequencer.settled().await;
    second.sequencer.settled().await;
    first.sequencer.finish();

    assert!(!first.sequencer.is_active());
    assert!(second.sequencer.is_active());
    assert_eq!(second.recorder.count(|c| *c == Call::Show(sel("#z"))), 1);
}
