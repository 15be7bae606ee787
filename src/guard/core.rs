// src/guard/core.rs

//! Pure guard state machine.
//!
//! [`GuardCore`] consumes classified filesystem events and produces
//! [`GuardCommand`]s describing what the IO shell (`guard::session`) should
//! do next: register watches, stop the previous run, start a new one.
//!
//! It has no channels, no Tokio types and performs no IO; time is passed in,
//! so debouncing is unit tested with synthetic instants.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::matcher::MatchResult;
use crate::types::{Op, StopPolicy};
use crate::watch::GuardEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardPhase {
    Idle,
    Watching,
    Stopped,
}

/// Instruction for the IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardCommand {
    /// Walk the whole root and watch everything that qualifies.
    RegisterRoot,
    /// Walk a newly appeared directory.
    RegisterTree(PathBuf),
    /// Make sure the directory holding a newly created file is watched.
    RegisterFile(PathBuf),
    /// Drop watches at or below a path that went away.
    ForgetPath(PathBuf),
    /// Kill run `seq` if it is still going and wait for its completion.
    StopPrevious { seq: u64 },
    /// Start run `seq`; `trigger` is `None` for the initial run.
    StartRun { seq: u64, trigger: Option<GuardEvent> },
    /// Release the underlying watcher.
    CloseWatcher,
}

#[derive(Debug)]
pub struct GuardCore {
    debounce: Duration,
    no_init_run: bool,
    phase: GuardPhase,
    last_event: Option<Instant>,
    run_counter: u64,
    last_run: Option<u64>,
}

impl GuardCore {
    pub fn new(debounce: Duration, no_init_run: bool) -> Self {
        Self {
            debounce,
            no_init_run,
            phase: GuardPhase::Idle,
            last_event: None,
            run_counter: 0,
            last_run: None,
        }
    }

    pub fn phase(&self) -> GuardPhase {
        self.phase
    }

    /// Number of runs started so far (also the last sequence number).
    pub fn runs_started(&self) -> u64 {
        self.run_counter
    }

    /// Idle → Watching.
    pub fn start(&mut self) -> Vec<GuardCommand> {
        if self.phase != GuardPhase::Idle {
            return Vec::new();
        }
        self.phase = GuardPhase::Watching;

        let mut commands = vec![GuardCommand::RegisterRoot];
        if !self.no_init_run {
            commands.push(self.next_run(None));
        }
        commands
    }

    /// Handle one event whose path has already been matched.
    pub fn on_event(
        &mut self,
        event: GuardEvent,
        result: MatchResult,
        now: Instant,
    ) -> Vec<GuardCommand> {
        if self.phase != GuardPhase::Watching {
            return Vec::new();
        }

        let mut commands = Vec::new();

        if matches!(event.op, Op::Remove | Op::Rename) {
            commands.push(GuardCommand::ForgetPath(event.path.clone()));
        }

        if event.is_dir && matches!(event.op, Op::Create | Op::Rename) && !result.negative {
            commands.push(GuardCommand::RegisterTree(event.path.clone()));
        }

        // The created path was not watched yet: register it, never restart.
        if event.op == Op::Create {
            if !event.is_dir && result.matched {
                commands.push(GuardCommand::RegisterFile(event.path));
            }
            return commands;
        }

        if !result.matched {
            return commands;
        }

        let within_window = self
            .last_event
            .is_some_and(|last| now.saturating_duration_since(last) < self.debounce);
        self.last_event = Some(now);
        if within_window {
            return commands;
        }

        if let Some(seq) = self.last_run {
            commands.push(GuardCommand::StopPrevious { seq });
        }
        commands.push(self.next_run(Some(event)));
        commands
    }

    /// Any state → Stopped.
    pub fn stop(&mut self, policy: StopPolicy) -> Vec<GuardCommand> {
        if self.phase == GuardPhase::Stopped {
            return Vec::new();
        }
        self.phase = GuardPhase::Stopped;

        let mut commands = vec![GuardCommand::CloseWatcher];
        if let (StopPolicy::Kill, Some(seq)) = (policy, self.last_run) {
            commands.push(GuardCommand::StopPrevious { seq });
        }
        commands
    }

    fn next_run(&mut self, trigger: Option<GuardEvent>) -> GuardCommand {
        self.run_counter += 1;
        self.last_run = Some(self.run_counter);
        GuardCommand::StartRun {
            seq: self.run_counter,
            trigger,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MATCHED: MatchResult = MatchResult {
        matched: true,
        negative: false,
    };
    const UNMATCHED: MatchResult = MatchResult {
        matched: false,
        negative: false,
    };
    const EXCLUDED: MatchResult = MatchResult {
        matched: false,
        negative: true,
    };

    fn ev(path: &str, op: Op) -> GuardEvent {
        GuardEvent {
            path: PathBuf::from(path),
            is_dir: false,
            op,
        }
    }

    fn dir_ev(path: &str, op: Op) -> GuardEvent {
        GuardEvent {
            is_dir: true,
            ..ev(path, op)
        }
    }

    fn started(commands: &[GuardCommand]) -> Vec<u64> {
        commands
            .iter()
            .filter_map(|c| match c {
                GuardCommand::StartRun { seq, .. } => Some(*seq),
                _ => None,
            })
            .collect()
    }

    fn watching(debounce_ms: u64, no_init_run: bool) -> GuardCore {
        let mut core = GuardCore::new(Duration::from_millis(debounce_ms), no_init_run);
        core.start();
        core
    }

    #[test]
    fn start_registers_then_runs_once() {
        let mut core = GuardCore::new(Duration::from_millis(300), false);
        let cmds = core.start();
        assert_eq!(cmds[0], GuardCommand::RegisterRoot);
        assert_eq!(cmds[1], GuardCommand::StartRun { seq: 1, trigger: None });
        assert_eq!(core.phase(), GuardPhase::Watching);
        assert!(core.start().is_empty());
    }

    #[test]
    fn no_init_run_only_registers() {
        let mut core = GuardCore::new(Duration::from_millis(300), true);
        assert_eq!(core.start(), vec![GuardCommand::RegisterRoot]);
        assert_eq!(core.runs_started(), 0);
    }

    #[test]
    fn events_within_the_window_restart_once() {
        let mut core = watching(300, true);
        let t0 = Instant::now();

        let first = core.on_event(ev("/r/a", Op::Write), MATCHED, t0);
        let second = core.on_event(ev("/r/a", Op::Write), MATCHED, t0 + Duration::from_millis(100));

        assert_eq!(started(&first), vec![1]);
        assert!(started(&second).is_empty());
        assert_eq!(core.runs_started(), 1);
    }

    #[test]
    fn events_outside_the_window_restart_twice() {
        let mut core = watching(300, true);
        let t0 = Instant::now();

        core.on_event(ev("/r/a", Op::Write), MATCHED, t0);
        let second = core.on_event(ev("/r/a", Op::Write), MATCHED, t0 + Duration::from_millis(400));

        assert_eq!(
            second,
            vec![
                GuardCommand::StopPrevious { seq: 1 },
                GuardCommand::StartRun {
                    seq: 2,
                    trigger: Some(ev("/r/a", Op::Write))
                },
            ]
        );
    }

    #[test]
    fn swallowed_events_extend_the_window() {
        let mut core = watching(300, true);
        let t0 = Instant::now();
        let ms = Duration::from_millis;

        core.on_event(ev("/r/a", Op::Write), MATCHED, t0);
        core.on_event(ev("/r/a", Op::Write), MATCHED, t0 + ms(200));
        let third = core.on_event(ev("/r/a", Op::Write), MATCHED, t0 + ms(400));

        assert!(started(&third).is_empty());
    }

    #[test]
    fn zero_debounce_restarts_every_time() {
        let mut core = watching(0, true);
        let t0 = Instant::now();
        for _ in 0..3 {
            core.on_event(ev("/r/a", Op::Write), MATCHED, t0);
        }
        assert_eq!(core.runs_started(), 3);
    }

    #[test]
    fn unmatched_events_are_discarded() {
        let mut core = watching(0, true);
        let cmds = core.on_event(ev("/r/a.tmp", Op::Write), UNMATCHED, Instant::now());
        assert!(cmds.is_empty());
        assert_eq!(core.runs_started(), 0);
    }

    #[test]
    fn creates_register_but_never_restart() {
        let mut core = watching(0, true);
        let now = Instant::now();

        let dir = core.on_event(dir_ev("/r/new", Op::Create), UNMATCHED, now);
        assert_eq!(dir, vec![GuardCommand::RegisterTree(PathBuf::from("/r/new"))]);

        let file = core.on_event(ev("/r/new/f", Op::Create), MATCHED, now);
        assert_eq!(file, vec![GuardCommand::RegisterFile(PathBuf::from("/r/new/f"))]);

        let pruned = core.on_event(dir_ev("/r/target", Op::Create), EXCLUDED, now);
        assert!(pruned.is_empty());

        assert_eq!(core.runs_started(), 0);
    }

    #[test]
    fn removals_forget_watches_and_restart() {
        let mut core = watching(0, true);
        let cmds = core.on_event(ev("/r/a", Op::Remove), MATCHED, Instant::now());
        assert_eq!(cmds[0], GuardCommand::ForgetPath(PathBuf::from("/r/a")));
        assert_eq!(started(&cmds), vec![1]);
    }

    #[test]
    fn stop_policy_decides_whether_the_run_is_killed() {
        let mut core = watching(0, false);
        assert_eq!(
            core.stop(StopPolicy::Kill),
            vec![GuardCommand::CloseWatcher, GuardCommand::StopPrevious { seq: 1 }]
        );

        let mut core = watching(0, false);
        assert_eq!(core.stop(StopPolicy::LetFinish), vec![GuardCommand::CloseWatcher]);
        assert!(core
            .on_event(ev("/r/a", Op::Write), MATCHED, Instant::now())
            .is_empty());
        assert!(core.stop(StopPolicy::Kill).is_empty());
    }
}
