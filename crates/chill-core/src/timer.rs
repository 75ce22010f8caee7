//! Work/break countdown state machine.
//!
//! Pure state: no threads, no audio. The engine feeds it one `tick` per
//! elapsed second and reacts to the events it returns.

use serde::{Deserialize, Serialize};

use crate::error::{ChillError, ChillResult};

pub const DEFAULT_WORK_MINUTES: u32 = 25;
pub const DEFAULT_BREAK_MINUTES: u32 = 5;
pub const DEFAULT_NOTICE_SECONDS: u32 = 20;
pub const DEFAULT_TICKING_THRESHOLD: u32 = 10;

/// Longest interval whose length in seconds still fits the countdown.
pub const MAX_MINUTES: u32 = u32::MAX / 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Work,
    Break,
}

impl Mode {
    pub fn flipped(self) -> Self {
        match self {
            Mode::Work => Mode::Break,
            Mode::Break => Mode::Work,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Work => "work",
            Mode::Break => "break",
        }
    }
}

/// Derived view of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running(Mode),
    BreakNotice,
}

/// What a transition produced, for the owner to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Exactly `ticking_threshold` seconds remain.
    TickingCue,
    /// The countdown hit zero; the machine is now in `BreakNotice` for `next`.
    Expired { next: Mode },
    /// The break notice ran out on its own.
    NoticeEnded,
}

/// Everything a UI needs to render the timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub time_left: u32,
    pub mode: Mode,
    pub is_running: bool,
    pub is_break_notice: bool,
    pub break_countdown: u32,
    pub work_minutes: u32,
    pub break_minutes: u32,
}

#[derive(Debug, Clone)]
pub struct Timer {
    mode: Mode,
    time_left: u32,
    running: bool,
    /// Seconds left on the end-of-interval notice, while it is showing.
    break_notice: Option<u32>,
    work_minutes: u32,
    break_minutes: u32,
    notice_seconds: u32,
    ticking_threshold: u32,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new(DEFAULT_WORK_MINUTES, DEFAULT_BREAK_MINUTES)
    }
}

impl Timer {
    /// Idle in work mode with a full work interval. Zero durations fall back
    /// to the defaults.
    pub fn new(work_minutes: u32, break_minutes: u32) -> Self {
        let work_minutes = positive_or(work_minutes, DEFAULT_WORK_MINUTES);
        let break_minutes = positive_or(break_minutes, DEFAULT_BREAK_MINUTES);
        Self {
            mode: Mode::Work,
            time_left: work_minutes * 60,
            running: false,
            break_notice: None,
            work_minutes,
            break_minutes,
            notice_seconds: DEFAULT_NOTICE_SECONDS,
            ticking_threshold: DEFAULT_TICKING_THRESHOLD,
        }
    }

    pub fn with_notice_seconds(mut self, seconds: u32) -> Self {
        self.notice_seconds = seconds;
        self
    }

    pub fn with_ticking_threshold(mut self, seconds: u32) -> Self {
        self.ticking_threshold = seconds;
        self
    }

    pub fn phase(&self) -> Phase {
        if self.running {
            Phase::Running(self.mode)
        } else if self.break_notice.is_some() {
            Phase::BreakNotice
        } else {
            Phase::Idle
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn time_left(&self) -> u32 {
        self.time_left
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn break_countdown(&self) -> Option<u32> {
        self.break_notice
    }

    pub fn work_minutes(&self) -> u32 {
        self.work_minutes
    }

    pub fn break_minutes(&self) -> u32 {
        self.break_minutes
    }

    /// Configured length of `mode` in seconds.
    pub fn duration_of(&self, mode: Mode) -> u32 {
        match mode {
            Mode::Work => self.work_minutes * 60,
            Mode::Break => self.break_minutes * 60,
        }
    }

    /// Begin counting down from the current `time_left`. Starting over a
    /// break notice dismisses it. Returns false when already running.
    pub fn start(&mut self) -> bool {
        if self.running {
            return false;
        }
        self.break_notice = None;
        self.running = true;
        true
    }

    /// Stop counting, keeping `time_left`. Returns false when not running.
    pub fn pause(&mut self) -> bool {
        let was_running = self.running;
        self.running = false;
        was_running
    }

    /// Stop and refill the current mode. Allowed from any phase.
    pub fn reset(&mut self) {
        self.running = false;
        self.break_notice = None;
        self.time_left = self.duration_of(self.mode);
    }

    /// Close the break notice early. Returns false when none was showing.
    pub fn dismiss_notice(&mut self) -> bool {
        self.break_notice.take().is_some()
    }

    /// One elapsed second of the main countdown. No-op unless running.
    pub fn tick(&mut self) -> Vec<TimerEvent> {
        let mut events = Vec::new();
        if !self.running {
            return events;
        }

        let prev = self.time_left;
        if prev <= self.ticking_threshold.saturating_add(1) && prev > self.ticking_threshold {
            events.push(TimerEvent::TickingCue);
        }

        if prev <= 1 {
            let next = self.mode.flipped();
            self.running = false;
            self.mode = next;
            self.time_left = self.duration_of(next);
            self.break_notice = (self.notice_seconds > 0).then_some(self.notice_seconds);
            events.push(TimerEvent::Expired { next });
        } else {
            self.time_left = prev - 1;
        }
        events
    }

    /// One elapsed second of the break notice. No-op unless it is showing.
    pub fn tick_notice(&mut self) -> Option<TimerEvent> {
        match self.break_notice {
            Some(n) if n <= 1 => {
                self.break_notice = None;
                Some(TimerEvent::NoticeEnded)
            }
            Some(n) => {
                self.break_notice = Some(n - 1);
                None
            }
            None => None,
        }
    }

    /// Change the work length. Ignored by a running countdown until the next
    /// reset or flip; refills `time_left` right away when idle in work mode.
    pub fn set_work_minutes(&mut self, minutes: u32) -> ChillResult<()> {
        self.work_minutes = validate_minutes(minutes)?;
        self.refill_if_idle(Mode::Work);
        Ok(())
    }

    pub fn set_break_minutes(&mut self, minutes: u32) -> ChillResult<()> {
        self.break_minutes = validate_minutes(minutes)?;
        self.refill_if_idle(Mode::Break);
        Ok(())
    }

    /// Force a mode, refilling `time_left`. Stops the countdown.
    pub fn set_mode(&mut self, mode: Mode) {
        self.running = false;
        self.mode = mode;
        self.time_left = self.duration_of(mode);
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            time_left: self.time_left,
            mode: self.mode,
            is_running: self.running,
            is_break_notice: self.break_notice.is_some(),
            break_countdown: self.break_notice.unwrap_or(0),
            work_minutes: self.work_minutes,
            break_minutes: self.break_minutes,
        }
    }

    fn refill_if_idle(&mut self, changed: Mode) {
        if !self.running && self.mode == changed {
            self.time_left = self.duration_of(changed);
        }
    }
}

/// `MM:SS`, minutes unbounded.
pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

fn validate_minutes(minutes: u32) -> ChillResult<u32> {
    if minutes == 0 {
        return Err(ChillError::InvalidInput("duration must be at least one minute".into()));
    }
    if minutes > MAX_MINUTES {
        return Err(ChillError::InvalidInput(format!(
            "duration of {} minutes exceeds {}",
            minutes, MAX_MINUTES
        )));
    }
    Ok(minutes)
}

fn positive_or(value: u32, fallback: u32) -> u32 {
    if value == 0 || value > MAX_MINUTES {
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(timer: &mut Timer, seconds: u32) -> Vec<TimerEvent> {
        (0..seconds).flat_map(|_| timer.tick()).collect()
    }

    #[test]
    fn initial_state_is_idle_work() {
        let timer = Timer::new(25, 5);
        assert_eq!(timer.phase(), Phase::Idle);
        assert_eq!(timer.mode(), Mode::Work);
        assert_eq!(timer.time_left(), 1500);
    }

    #[test]
    fn tick_is_noop_while_idle() {
        let mut timer = Timer::new(1, 1);
        assert!(timer.tick().is_empty());
        assert_eq!(timer.time_left(), 60);
    }

    #[test]
    fn ticking_cue_fires_once_on_the_ten_second_edge() {
        let mut timer = Timer::new(1, 1);
        timer.start();
        let mut cue_at = Vec::new();
        for _ in 0..59 {
            let prev = timer.time_left();
            if timer.tick().contains(&TimerEvent::TickingCue) {
                cue_at.push(prev);
            }
        }
        assert_eq!(cue_at, vec![11]);
        assert_eq!(timer.time_left(), 1);
    }

    #[test]
    fn no_cue_when_started_below_threshold() {
        let mut timer = Timer::new(1, 1);
        timer.start();
        run(&mut timer, 52);
        assert_eq!(timer.time_left(), 8);
        timer.pause();
        timer.start();
        let events = run(&mut timer, 7);
        assert!(!events.contains(&TimerEvent::TickingCue));
    }

    #[test]
    fn work_expiry_flips_to_break_with_notice() {
        let mut timer = Timer::new(1, 5);
        timer.start();
        let events = run(&mut timer, 60);
        assert!(events.contains(&TimerEvent::Expired { next: Mode::Break }));
        assert_eq!(timer.mode(), Mode::Break);
        assert_eq!(timer.time_left(), 300);
        assert_eq!(timer.phase(), Phase::BreakNotice);
        assert_eq!(timer.break_countdown(), Some(20));
        assert!(!timer.is_running());
    }

    #[test]
    fn break_expiry_flips_to_work() {
        let mut timer = Timer::new(25, 1);
        timer.set_mode(Mode::Break);
        timer.start();
        run(&mut timer, 60);
        assert_eq!(timer.mode(), Mode::Work);
        assert_eq!(timer.time_left(), 1500);
        assert_eq!(timer.phase(), Phase::BreakNotice);
    }

    #[test]
    fn full_pomodoro_then_notice_runs_out() {
        let mut timer = Timer::new(25, 5);
        timer.start();
        let events = run(&mut timer, 1500);
        assert_eq!(
            events,
            vec![TimerEvent::TickingCue, TimerEvent::Expired { next: Mode::Break }]
        );
        let snap = timer.snapshot();
        assert_eq!(snap.mode, Mode::Break);
        assert_eq!(snap.time_left, 300);
        assert!(snap.is_break_notice);
        assert_eq!(snap.break_countdown, 20);

        let mut seen = vec![timer.break_countdown().unwrap()];
        let mut ended = false;
        for _ in 0..20 {
            if timer.tick_notice() == Some(TimerEvent::NoticeEnded) {
                ended = true;
                break;
            }
            seen.push(timer.break_countdown().unwrap());
        }
        assert!(ended);
        assert_eq!(seen, (1..=20).rev().collect::<Vec<_>>());
        assert_eq!(timer.phase(), Phase::Idle);
        assert_eq!(timer.mode(), Mode::Break);
        assert_eq!(timer.time_left(), 300);
    }

    #[test]
    fn pause_keeps_time_and_reset_refills() {
        let mut timer = Timer::new(25, 5);
        timer.start();
        run(&mut timer, 100);
        assert!(timer.pause());
        assert!(!timer.pause());
        assert_eq!(timer.time_left(), 1400);
        timer.reset();
        assert_eq!(timer.time_left(), 1500);
        assert_eq!(timer.phase(), Phase::Idle);
    }

    #[test]
    fn reset_from_notice_closes_it() {
        let mut timer = Timer::new(1, 1);
        timer.start();
        run(&mut timer, 60);
        timer.reset();
        assert_eq!(timer.phase(), Phase::Idle);
        assert_eq!(timer.mode(), Mode::Break);
    }

    #[test]
    fn start_dismisses_notice() {
        let mut timer = Timer::new(1, 1);
        timer.start();
        run(&mut timer, 60);
        assert!(timer.start());
        assert_eq!(timer.phase(), Phase::Running(Mode::Break));
        assert!(!timer.start());
    }

    #[test]
    fn dismiss_returns_to_idle() {
        let mut timer = Timer::new(1, 1);
        timer.start();
        run(&mut timer, 60);
        assert!(timer.dismiss_notice());
        assert!(!timer.dismiss_notice());
        assert_eq!(timer.phase(), Phase::Idle);
    }

    #[test]
    fn duration_change_while_running_waits_for_reset() {
        let mut timer = Timer::new(25, 5);
        timer.start();
        run(&mut timer, 10);
        timer.set_work_minutes(45).unwrap();
        assert_eq!(timer.time_left(), 1490);
        timer.reset();
        assert_eq!(timer.time_left(), 2700);
    }

    #[test]
    fn duration_change_while_idle_refills_matching_mode_only() {
        let mut timer = Timer::new(25, 5);
        timer.set_work_minutes(90).unwrap();
        assert_eq!(timer.time_left(), 5400);
        timer.set_break_minutes(30).unwrap();
        assert_eq!(timer.time_left(), 5400);
        assert_eq!(timer.duration_of(Mode::Break), 1800);
    }

    #[test]
    fn zero_duration_is_rejected() {
        let mut timer = Timer::new(25, 5);
        assert!(timer.set_work_minutes(0).is_err());
        assert_eq!(timer.work_minutes(), 25);
        assert_eq!(Timer::new(0, 0).work_minutes(), 25);
    }

    #[test]
    fn any_positive_duration_is_accepted() {
        let mut timer = Timer::new(7, 3);
        assert_eq!(timer.time_left(), 420);
        timer.set_break_minutes(1).unwrap();
        assert_eq!(timer.break_minutes(), 1);
    }

    #[test]
    fn oversized_duration_is_rejected_without_overflow() {
        let mut timer = Timer::new(25, 5);
        assert!(matches!(
            timer.set_work_minutes(100_000_000),
            Err(ChillError::InvalidInput(_))
        ));
        assert!(timer.set_break_minutes(u32::MAX).is_err());
        assert_eq!(timer.time_left(), 1500);

        timer.set_work_minutes(MAX_MINUTES).unwrap();
        assert_eq!(timer.time_left(), MAX_MINUTES * 60);

        let fallback = Timer::new(u32::MAX, u32::MAX);
        assert_eq!(fallback.work_minutes(), DEFAULT_WORK_MINUTES);
        assert_eq!(fallback.break_minutes(), DEFAULT_BREAK_MINUTES);
    }

    #[test]
    fn huge_ticking_threshold_does_not_overflow() {
        let mut timer = Timer::new(1, 1).with_ticking_threshold(u32::MAX);
        timer.start();
        assert!(timer.tick().is_empty());
        assert_eq!(timer.time_left(), 59);
    }

    #[test]
    fn clock_formatting() {
        assert_eq!(format_clock(1500), "25:00");
        assert_eq!(format_clock(61), "01:01");
        assert_eq!(format_clock(5400), "90:00");
    }
}
