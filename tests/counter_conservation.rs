use proptest::prelude::*;

use pausable_task::SuspensionToken;
use pausable_task::engine::{DrainStep, Interruption, PauseState, TaskCore, TaskState};

/// One thing that can happen next, from some caller or from the driver.
#[derive(Debug, Clone, Copy)]
enum Step {
    Pause,
    Resume,
    Acknowledge,
    /// A pause caller went away before its pause took effect.
    WithdrawPause,
    /// A resume caller went away before acknowledging.
    AbandonResume,
    Driver,
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        2 => Just(Step::Pause),
        2 => Just(Step::Resume),
        2 => Just(Step::Acknowledge),
        1 => Just(Step::WithdrawPause),
        1 => Just(Step::AbandonResume),
        3 => Just(Step::Driver),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    WaitingForResumes,
    Draining,
}

/// Synchronous stand-in for the episode driver and its callers.
struct Sim {
    core: TaskCore,
    phase: Phase,
    /// Pause callers that have not resumed yet.
    holders: u32,
    /// Resume callers that have not acknowledged yet, with their generation.
    pending_acks: Vec<u64>,
    /// Resume callers that acknowledged and wait for the drain to finish.
    returning: Vec<u64>,
    pauses_seen: u32,
}

impl Sim {
    fn new() -> Self {
        let mut core = TaskCore::new(false);
        core.start(None, SuspensionToken::linked_to(None))
            .expect("fresh core starts");
        Self {
            core,
            phase: Phase::Running,
            holders: 0,
            pending_acks: Vec::new(),
            returning: Vec::new(),
            pauses_seen: 0,
        }
    }

    fn apply(&mut self, step: Step) {
        match step {
            Step::Pause => {
                let decision = self.core.request_pause().expect("started core accepts pauses");
                assert!(!decision.request.already_completed);
                self.holders += 1;
            }
            Step::Resume => {
                if self.holders == 0 {
                    return;
                }
                let generation = self
                    .core
                    .request_resume()
                    .expect("matched resume is accepted")
                    .expect("core is not terminal");
                self.holders -= 1;
                self.pending_acks.push(generation);
            }
            Step::Acknowledge => {
                let core = &self.core;
                let ready = self.pending_acks.iter().position(|&g| {
                    core.pause_state() == PauseState::Continue || core.drain_generation() > g
                });
                if let Some(idx) = ready {
                    let generation = self.pending_acks.remove(idx);
                    self.core.acknowledge_resume();
                    self.returning.push(generation);
                }
            }
            Step::WithdrawPause => {
                if self.holders > 0 {
                    assert!(self.core.withdraw_pause());
                    self.holders -= 1;
                }
            }
            Step::AbandonResume => {
                // Acknowledged on drop, whatever the pause state.
                if self.pending_acks.pop().is_some() {
                    self.core.acknowledge_resume();
                }
            }
            Step::Driver => self.drive_once(),
        }
        let generation = self.core.drain_generation();
        self.returning.retain(|&g| generation <= g);
    }

    fn drive_once(&mut self) {
        match self.phase {
            Phase::Running => {
                if self.core.pause_state() == PauseState::Requested {
                    match self.core.episode_interrupted() {
                        Interruption::Pause { .. } => {}
                        other => panic!("unexpected interruption {other:?}"),
                    }
                    self.core.mark_paused();
                    self.pauses_seen += 1;
                    self.phase = Phase::WaitingForResumes;
                }
            }
            Phase::WaitingForResumes => {
                if self.core.can_leave_pause() {
                    assert_eq!(self.core.try_begin_unpause(), DrainStep::Draining);
                    self.phase = Phase::Draining;
                }
            }
            Phase::Draining => {
                if self.core.can_finish_drain() {
                    match self.core.try_finish_unpause(SuspensionToken::linked_to(None)) {
                        DrainStep::Resumed { .. } => self.phase = Phase::Running,
                        DrainStep::Repaused => self.phase = Phase::WaitingForResumes,
                        other => panic!("unexpected drain step {other:?}"),
                    }
                }
            }
        }
    }

    fn check_invariants(&self) {
        let counters = self.core.counters();
        assert_eq!(counters.pause_requests(), self.holders);
        assert_eq!(counters.unpause_requests(), self.pending_acks.len() as u32);

        match self.core.state() {
            TaskState::Running => {
                assert!(matches!(
                    self.core.pause_state(),
                    PauseState::NotRequested | PauseState::Requested
                ));
                // Outstanding pauses while running are always already signalled.
                if counters.pause_requests() > 0 {
                    assert_eq!(self.core.pause_state(), PauseState::Requested);
                }
            }
            TaskState::AfterPaused => {
                assert!(!matches!(
                    self.core.pause_state(),
                    PauseState::NotRequested | PauseState::Requested
                ));
                if counters.pause_requests() > 0 {
                    assert_ne!(self.core.pause_state(), PauseState::UnpauseRequested);
                }
            }
            other => panic!("unexpected state {other:?}"),
        }
    }

    /// Resume every holder, then let everybody run until quiescent.
    fn settle(&mut self) {
        while self.holders > 0 {
            self.apply(Step::Resume);
            self.check_invariants();
        }
        for _ in 0..1_000 {
            if self.is_settled() {
                return;
            }
            self.apply(Step::Driver);
            self.check_invariants();
            self.apply(Step::Acknowledge);
            self.check_invariants();
        }
        panic!("simulation did not settle: {:?}", self.core.snapshot());
    }

    fn is_settled(&self) -> bool {
        self.core.state() == TaskState::Running
            && self.core.pause_state() == PauseState::NotRequested
            && self.pending_acks.is_empty()
            && self.returning.is_empty()
    }
}

#[test]
fn drain_resumes_only_once_both_counters_settle() {
    let mut sim = Sim::new();
    sim.apply(Step::Pause);
    sim.apply(Step::Driver);
    sim.apply(Step::Resume);
    sim.apply(Step::Driver);
    assert_eq!(sim.core.pause_state(), PauseState::Continue);

    // A new pause lands after the drain began: the drain ends paused.
    sim.apply(Step::Pause);
    sim.apply(Step::Acknowledge);
    assert_eq!(
        sim.core.try_finish_unpause(SuspensionToken::linked_to(None)),
        DrainStep::Repaused
    );
    assert_eq!(sim.core.state(), TaskState::AfterPaused);
    assert!(!sim.core.counters().is_settled());

    sim.phase = Phase::WaitingForResumes;
    sim.apply(Step::Resume);
    sim.apply(Step::Driver);
    sim.apply(Step::Acknowledge);
    assert!(sim.core.counters().is_settled());
    assert_eq!(
        sim.core.try_finish_unpause(SuspensionToken::linked_to(None)),
        DrainStep::Resumed { episode: 2 }
    );
    assert_eq!(sim.core.state(), TaskState::Running);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn counters_are_conserved(steps in prop::collection::vec(step_strategy(), 0..80)) {
        let mut sim = Sim::new();
        for step in steps {
            sim.apply(step);
            sim.check_invariants();
        }
        sim.settle();

        let counters = sim.core.counters();
        prop_assert!(counters.is_settled());
        prop_assert_eq!(sim.core.episode(), sim.pauses_seen + 1);
    }

    #[test]
    fn abandoned_callers_never_block_the_drain(
        pausers in 2u32..8,
        abandoned in 1u32..8,
    ) {
        let abandoned = abandoned.min(pausers - 1);
        let mut sim = Sim::new();
        for _ in 0..pausers {
            sim.apply(Step::Pause);
        }
        sim.apply(Step::Driver);
        prop_assert_eq!(sim.core.state(), TaskState::AfterPaused);

        // Early resumers give up while later pauses still hold the task.
        for _ in 0..abandoned {
            sim.apply(Step::Resume);
            sim.apply(Step::AbandonResume);
            sim.check_invariants();
        }
        prop_assert_eq!(sim.core.counters().unpause_requests(), 0);
        prop_assert_eq!(sim.core.state(), TaskState::AfterPaused);

        sim.settle();
        prop_assert_eq!(sim.pauses_seen, 1);
        prop_assert_eq!(sim.core.episode(), 2);
    }

    #[test]
    fn matched_pauses_and_resumes_end_running(pausers in 1u32..8) {
        let mut sim = Sim::new();
        for _ in 0..pausers {
            sim.apply(Step::Pause);
        }
        sim.apply(Step::Driver);
        prop_assert_eq!(sim.core.state(), TaskState::AfterPaused);

        // Paused until the very last resume.
        for remaining in (0..pausers).rev() {
            sim.apply(Step::Resume);
            for _ in 0..4 {
                sim.apply(Step::Driver);
                sim.apply(Step::Acknowledge);
            }
            sim.check_invariants();
            if remaining > 0 {
                prop_assert_eq!(sim.core.state(), TaskState::AfterPaused);
            }
        }
        sim.settle();
        prop_assert_eq!(sim.pauses_seen, 1);
        prop_assert_eq!(sim.core.episode(), 2);
    }
}
