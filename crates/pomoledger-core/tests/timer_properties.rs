//! Property tests for timer accrual under pause/resume.

use std::sync::mpsc;
use std::sync::Arc;

use pomoledger_core::{ManualClock, Timer, TimerEvent, TimerSpec};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Step {
    Pause,
    Resume,
    Advance(u64),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Pause),
        Just(Step::Resume),
        (1u64..4).prop_map(Step::Advance),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn elapsed_counts_only_unpaused_ticks(steps in prop::collection::vec(step(), 1..12)) {
        let clock = ManualClock::default();
        let (tx, rx) = mpsc::channel();
        let mut timer = Timer::new(TimerSpec::focus(1_000), Arc::new(clock.clone()), move |e| {
            let _ = tx.send(e);
        });
        timer.start().unwrap();

        let mut paused = false;
        let mut expected = 0u64;
        for step in &steps {
            match step {
                Step::Pause => {
                    timer.pause();
                    paused = true;
                }
                Step::Resume => {
                    timer.resume();
                    paused = false;
                }
                Step::Advance(n) => {
                    clock.advance(*n);
                    if !paused {
                        expected += n;
                    }
                }
            }
        }

        prop_assert_eq!(timer.elapsed_secs(), expected);
        timer.stop();
        timer.join();

        let ticks = rx
            .try_iter()
            .filter(|e| matches!(e, TimerEvent::Tick { .. }))
            .count() as u64;
        prop_assert_eq!(ticks, expected);
        prop_assert_eq!(clock.active_loops(), 0);
    }

    #[test]
    fn rest_timer_finishes_exactly_once(target in 1u64..6, extra in 0u64..4) {
        let clock = ManualClock::default();
        let (tx, rx) = mpsc::channel();
        let mut timer = Timer::new(TimerSpec::rest(target), Arc::new(clock.clone()), move |e| {
            let _ = tx.send(e);
        });
        timer.start().unwrap();
        clock.advance(target + extra);
        timer.join();

        let events: Vec<TimerEvent> = rx.try_iter().collect();
        let finishes = events
            .iter()
            .filter(|e| matches!(e, TimerEvent::NaturalFinish { .. }))
            .count();
        prop_assert_eq!(finishes, 1);
        prop_assert_eq!(timer.elapsed_secs(), target);
    }
}
