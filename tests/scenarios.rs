// SPDX-License-Identifier: Apache-2.0

//! End-to-end scenarios against the public API, exercising ordering,
//! wraparound, repeats, and peer-cancellation during dispatch.

use std::cell::RefCell;
use std::rc::Rc;

use tickmux::{HardwareTimer, Scheduler, StatusToken, Timer, TimerType};

struct Call(Rc<RefCell<Vec<(&'static str, u64)>>>, &'static str);

fn record(log: &Rc<RefCell<Vec<(&'static str, u64)>>>, tag: &'static str) -> (fn(*mut ()), *mut ()) {
    let call = Box::leak(Box::new(Call(log.clone(), tag)));
    fn handler(ctx: *mut ()) {
        let call = unsafe { &*(ctx as *const Call) };
        let at = call.0.borrow().len() as u64;
        call.0.borrow_mut().push((call.1, at));
    }
    (handler, call as *mut Call as *mut ())
}

// Integration tests can't reach `Scheduler`'s private `hw: UnsafeCell<H>`
// field, so the driving clock is shared through an `Rc<RefCell<u32>>` that
// both the test and the hardware double hold.
struct DrivenHa {
    clock: Rc<RefCell<u32>>,
    max: u32,
}

impl HardwareTimer for DrivenHa {
    fn init(&mut self) -> bool {
        true
    }
    fn units_to_ticks(&self, duration: u64) -> u64 {
        duration
    }
    fn read(&self) -> u32 {
        *self.clock.borrow()
    }
    fn set_target(&mut self, _counts: u32) {}
    fn set_running(&mut self, _on: bool) {}
    fn set_interrupts(&mut self, _on: bool, _token: &mut StatusToken) {}
    fn max_count(&self) -> u32 {
        self.max
    }
}

fn new_driven(max: u32) -> (&'static Scheduler<DrivenHa>, Rc<RefCell<u32>>) {
    let clock = Rc::new(RefCell::new(0u32));
    let hw = DrivenHa {
        clock: clock.clone(),
        max,
    };
    let sched: &'static Scheduler<DrivenHa> = Box::leak(Box::new(Scheduler::new(hw)));
    sched.init().unwrap();
    (sched, clock)
}

fn tick(clock: &Rc<RefCell<u32>>, ticks: u32) {
    *clock.borrow_mut() = clock.borrow().wrapping_add(ticks);
}

#[test]
fn scenario_1_single_shot_ordinary_period() {
    let (sched, clock) = new_driven(0xFFFF);
    static T1: Timer = Timer::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let (h, ctx) = record(&log, "t1");

    sched.create(&T1, h, TimerType::SingleShot).unwrap();
    sched.start(&T1, 1000, ctx).unwrap();

    tick(&clock, 1000);
    sched.target_count_reached();

    assert_eq!(log.borrow().as_slice(), &[("t1", 0)]);
    assert!(!T1.is_active());
    assert_eq!(sched.stats().active_count, 0);
    assert_eq!(sched.stats().running_clock, 0);
}

#[test]
fn scenario_2_three_single_shots_distinct_expiries() {
    let (sched, clock) = new_driven(0xFFFF);
    static T1: Timer = Timer::new();
    static T2: Timer = Timer::new();
    static T3: Timer = Timer::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let (h1, c1) = record(&log, "t1");
    let (h2, c2) = record(&log, "t2");
    let (h3, c3) = record(&log, "t3");

    sched.create(&T1, h1, TimerType::SingleShot).unwrap();
    sched.create(&T2, h2, TimerType::SingleShot).unwrap();
    sched.create(&T3, h3, TimerType::SingleShot).unwrap();
    sched.start(&T1, 1000, c1).unwrap();
    sched.start(&T2, 1200, c2).unwrap();
    sched.start(&T3, 1300, c3).unwrap();

    tick(&clock, 1000);
    sched.target_count_reached();
    tick(&clock, 200);
    sched.target_count_reached();
    tick(&clock, 100);
    sched.target_count_reached();

    let order: Vec<&str> = log.borrow().iter().map(|(tag, _)| *tag).collect();
    assert_eq!(order, vec!["t1", "t2", "t3"]);
    assert_eq!(sched.stats().active_count, 0);
}

#[test]
fn scenario_3_three_identical_expiries_fire_in_insertion_order() {
    let (sched, clock) = new_driven(0xFFFF);
    static T1: Timer = Timer::new();
    static T2: Timer = Timer::new();
    static T3: Timer = Timer::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let (h1, c1) = record(&log, "t1");
    let (h2, c2) = record(&log, "t2");
    let (h3, c3) = record(&log, "t3");

    sched.create(&T1, h1, TimerType::SingleShot).unwrap();
    sched.create(&T2, h2, TimerType::SingleShot).unwrap();
    sched.create(&T3, h3, TimerType::SingleShot).unwrap();
    sched.start(&T1, 1000, c1).unwrap();
    sched.start(&T2, 1000, c2).unwrap();
    sched.start(&T3, 1000, c3).unwrap();

    tick(&clock, 1000);
    sched.target_count_reached();

    let order: Vec<&str> = log.borrow().iter().map(|(tag, _)| *tag).collect();
    assert_eq!(order, vec!["t1", "t2", "t3"]);
}

#[test]
fn scenario_4_period_exceeds_max_count() {
    let max = 0xFFFFu32;
    let (sched, clock) = new_driven(max);
    static T1: Timer = Timer::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let (h, ctx) = record(&log, "t1");

    sched.create(&T1, h, TimerType::SingleShot).unwrap();
    sched.start(&T1, 3 * max as u64, ctx).unwrap();

    tick(&clock, max);
    sched.target_count_reached();
    assert!(log.borrow().is_empty());
    assert!(T1.is_active());

    tick(&clock, max);
    sched.target_count_reached();
    assert!(log.borrow().is_empty());
    assert!(T1.is_active());

    tick(&clock, max);
    sched.target_count_reached();
    assert_eq!(log.borrow().as_slice(), &[("t1", 0)]);
    assert!(!T1.is_active());
}

#[test]
fn scenario_5_repeating_timer_self_restarts_then_stops() {
    let (sched, clock) = new_driven(0xFFFF);
    static T1: Timer = Timer::new();

    thread_local! {
        static COUNT: RefCell<u32> = const { RefCell::new(0) };
    }
    fn self_restart(ctx: *mut ()) {
        let sched = unsafe { &*(ctx as *const Scheduler<DrivenHa>) };
        COUNT.with(|c| *c.borrow_mut() += 1);
        sched.start(&T1, 1000, ctx).unwrap();
    }

    sched.create(&T1, self_restart, TimerType::Repeating).unwrap();
    let ctx = sched as *const Scheduler<DrivenHa> as *mut ();
    sched.start(&T1, 1000, ctx).unwrap();

    tick(&clock, 1000);
    sched.target_count_reached();
    tick(&clock, 1000);
    sched.target_count_reached();

    assert_eq!(COUNT.with(|c| *c.borrow()), 2);
    assert!(T1.is_active());

    sched.stop(&T1).unwrap();
    assert!(!T1.is_active());
    assert_eq!(sched.stats().active_count, 0);
}

#[test]
fn scenario_6_stop_during_own_handler_suppresses_repeat() {
    let (sched, clock) = new_driven(0xFFFF);
    static T1: Timer = Timer::new();

    thread_local! {
        static COUNT: RefCell<u32> = const { RefCell::new(0) };
    }
    fn stop_on_third(ctx: *mut ()) {
        let sched = unsafe { &*(ctx as *const Scheduler<DrivenHa>) };
        let n = COUNT.with(|c| {
            *c.borrow_mut() += 1;
            *c.borrow()
        });
        if n == 3 {
            sched.stop(&T1).unwrap();
        }
    }

    sched.create(&T1, stop_on_third, TimerType::Repeating).unwrap();
    let ctx = sched as *const Scheduler<DrivenHa> as *mut ();
    sched.start(&T1, 200, ctx).unwrap();

    for _ in 0..4 {
        tick(&clock, 200);
        sched.target_count_reached();
    }

    assert_eq!(COUNT.with(|c| *c.borrow()), 3);
    assert!(!T1.is_active());
    assert_eq!(sched.stats().active_count, 0);
}

#[test]
fn scenario_7_stop_of_peer_pending_in_same_dispatch() {
    let (sched, clock) = new_driven(0xFFFF);
    static T1: Timer = Timer::new();
    static T2: Timer = Timer::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    thread_local! {
        static STOPPER: RefCell<Option<*const Scheduler<DrivenHa>>> = const { RefCell::new(None) };
    }
    STOPPER.with(|s| *s.borrow_mut() = Some(sched as *const Scheduler<DrivenHa>));

    fn stop_peer(_ctx: *mut ()) {
        STOPPER.with(|s| {
            let sched = unsafe { &*s.borrow().unwrap() };
            sched.stop(&T2).unwrap();
        });
    }

    let (h2, c2) = record(&log, "t2");
    sched.create(&T1, stop_peer, TimerType::SingleShot).unwrap();
    sched.create(&T2, h2, TimerType::SingleShot).unwrap();
    sched.start(&T1, 500, core::ptr::null_mut()).unwrap();
    sched.start(&T2, 500, c2).unwrap();

    tick(&clock, 500);
    sched.target_count_reached();

    assert!(log.borrow().is_empty());
    assert!(!T2.is_active());
}
