use super::*;
use chrono::{Duration, TimeZone};

const INSTAGRAM: &str = "com.instagram.android";
const TIKTOK: &str = "com.zhiliaoapp.musically";
const TIKTOK_TRILL: &str = "com.ss.android.ugc.trill";
const BROWSER: &str = "com.android.chrome";

fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
}

fn at_millis(millis: i64) -> DateTime<Utc> {
    at(0) + Duration::milliseconds(millis)
}

fn app(id: &str) -> AppId {
    AppId::from(id)
}

fn start(target: &str) -> Action {
    Action::StartSession {
        target: app(target),
        previous: None,
    }
}

fn warn(target: &str, elapsed_seconds: u64) -> Action {
    Action::SendWarning {
        target: app(target),
        elapsed_seconds,
    }
}

#[test]
fn test_first_watched_detection_starts_session() {
    let tracker = SessionTracker::default();
    let mut state = DetectionState::new();

    let action = tracker.on_tick(&mut state, Some(&app(INSTAGRAM)), at(0));

    assert_eq!(action, start(INSTAGRAM));
    let session = state.session().unwrap();
    assert_eq!(session.started_at, at(0));
    assert_eq!(session.last_notified_at, at(0));
    assert_eq!(state.last_detection(), Some(at(0)));
}

#[test]
fn test_escalation_scenario() {
    let tracker = SessionTracker::default();
    let mut state = DetectionState::new();
    let insta = app(INSTAGRAM);

    assert_eq!(tracker.on_tick(&mut state, Some(&insta), at(0)), start(INSTAGRAM));
    assert_eq!(tracker.on_tick(&mut state, Some(&insta), at(65)), warn(INSTAGRAM, 65));
    // 25s since last warning, 30s interval in the second minute
    assert_eq!(tracker.on_tick(&mut state, Some(&insta), at(90)), Action::NoAction);
    assert_eq!(tracker.on_tick(&mut state, Some(&insta), at(96)), warn(INSTAGRAM, 96));
}

#[test]
fn test_repeated_detection_inside_interval_is_noop() {
    let tracker = SessionTracker::default();
    let mut state = DetectionState::new();
    let insta = app(INSTAGRAM);

    tracker.on_tick(&mut state, Some(&insta), at(0));
    // 200ms cadence through the whole first minute
    for tick in 1..300 {
        let action = tracker.on_tick(&mut state, Some(&insta), at_millis(tick * 200));
        assert_eq!(action, Action::NoAction, "tick {tick}");
    }
    assert_eq!(tracker.on_tick(&mut state, Some(&insta), at(60)), warn(INSTAGRAM, 60));
}

#[test]
fn test_target_switch_starts_new_session() {
    let tracker = SessionTracker::default();
    let mut state = DetectionState::new();

    tracker.on_tick(&mut state, Some(&app(INSTAGRAM)), at(0));
    tracker.on_tick(&mut state, Some(&app(INSTAGRAM)), at(70));

    let action = tracker.on_tick(&mut state, Some(&app(TIKTOK)), at(71));
    assert_eq!(
        action,
        Action::StartSession {
            target: app(TIKTOK),
            previous: Some(app(INSTAGRAM)),
        }
    );
    let session = state.session().unwrap();
    assert_eq!(session.target, app(TIKTOK));
    assert_eq!(session.elapsed_seconds(at(71)), 0);
}

#[test]
fn test_same_display_name_different_id_is_new_session() {
    let tracker = SessionTracker::default();
    let mut state = DetectionState::new();

    tracker.on_tick(&mut state, Some(&app(TIKTOK)), at(0));
    tracker.on_tick(&mut state, Some(&app(TIKTOK)), at(90));

    let action = tracker.on_tick(&mut state, Some(&app(TIKTOK_TRILL)), at(91));
    assert_eq!(
        action,
        Action::StartSession {
            target: app(TIKTOK_TRILL),
            previous: Some(app(TIKTOK)),
        }
    );
}

#[test]
fn test_grace_window_absorbs_nine_misses() {
    let tracker = SessionTracker::default();
    let mut state = DetectionState::new();

    tracker.on_tick(&mut state, Some(&app(INSTAGRAM)), at(0));
    for tick in 1..=9 {
        let action = tracker.on_tick(&mut state, None, at_millis(tick * 200));
        assert_eq!(action, Action::NoAction, "miss {tick}");
        assert_eq!(state.active_target(), Some(&app(INSTAGRAM)));
    }
    assert_eq!(state.missed_ticks(), 9);

    let action = tracker.on_tick(&mut state, None, at(2));
    assert_eq!(
        action,
        Action::EndSession {
            target: app(INSTAGRAM)
        }
    );
    assert!(state.is_idle());
}

#[test]
fn test_watched_detection_resets_grace_counter() {
    let tracker = SessionTracker::default();
    let mut state = DetectionState::new();
    let insta = app(INSTAGRAM);

    tracker.on_tick(&mut state, Some(&insta), at(0));
    for tick in 1..=8 {
        tracker.on_tick(&mut state, None, at_millis(tick * 200));
    }
    tracker.on_tick(&mut state, Some(&insta), at(2));
    assert_eq!(state.missed_ticks(), 0);

    for tick in 1..=9 {
        let action = tracker.on_tick(&mut state, None, at(2) + Duration::milliseconds(tick * 200));
        assert_eq!(action, Action::NoAction);
    }
    assert_eq!(state.active_target(), Some(&insta));
}

#[test]
fn test_non_watched_app_ends_session_immediately() {
    let tracker = SessionTracker::default();
    let mut state = DetectionState::new();

    tracker.on_tick(&mut state, Some(&app(INSTAGRAM)), at(0));
    let action = tracker.on_tick(&mut state, Some(&app(BROWSER)), at(1));

    assert_eq!(
        action,
        Action::EndSession {
            target: app(INSTAGRAM)
        }
    );
    assert!(state.is_idle());
    assert_eq!(state.missed_ticks(), 1);
}

#[test]
fn test_fresh_run_with_no_detection_stays_idle() {
    let tracker = SessionTracker::default();
    let mut state = DetectionState::new();

    for tick in 0..9 {
        let action = tracker.on_tick(&mut state, None, at_millis(tick * 200));
        assert_eq!(action, Action::NoAction);
        assert!(state.is_idle());
    }
    assert_eq!(state.last_detection(), None);
}

#[test]
fn test_session_resumes_after_end() {
    let tracker = SessionTracker::default();
    let mut state = DetectionState::new();

    tracker.on_tick(&mut state, Some(&app(INSTAGRAM)), at(0));
    tracker.on_tick(&mut state, Some(&app(BROWSER)), at(10));
    let action = tracker.on_tick(&mut state, Some(&app(INSTAGRAM)), at(20));

    assert_eq!(action, start(INSTAGRAM));
    assert_eq!(state.session().unwrap().started_at, at(20));
}

#[test]
fn test_clock_going_backwards_keeps_notification_time_monotonic() {
    let tracker = SessionTracker::default();
    let mut state = DetectionState::new();
    let insta = app(INSTAGRAM);

    tracker.on_tick(&mut state, Some(&insta), at(100));
    let action = tracker.on_tick(&mut state, Some(&insta), at(40));

    assert_eq!(action, Action::NoAction);
    let session = state.session().unwrap();
    assert_eq!(session.last_notified_at, at(100));
    assert!(session.last_notified_at >= session.started_at);
}

#[test]
fn test_custom_grace_and_policy() {
    let policy = IntervalPolicy::new(vec![crate::interval::IntervalStep::new(0, 5)]).unwrap();
    let tracker = SessionTracker::new(WatchSet::default(), policy, 2);
    let mut state = DetectionState::new();
    let insta = app(INSTAGRAM);

    tracker.on_tick(&mut state, Some(&insta), at(0));
    assert_eq!(tracker.on_tick(&mut state, Some(&insta), at(5)), warn(INSTAGRAM, 5));
    assert_eq!(tracker.on_tick(&mut state, None, at(6)), Action::NoAction);
    assert_eq!(
        tracker.on_tick(&mut state, None, at(7)),
        Action::EndSession {
            target: app(INSTAGRAM)
        }
    );
}

#[test]
fn test_zero_grace_ticks_is_clamped() {
    let tracker = SessionTracker::new(WatchSet::default(), IntervalPolicy::default(), 0);
    assert_eq!(tracker.grace_ticks(), 1);
}

#[test]
fn test_reset_clears_state() {
    let tracker = SessionTracker::default();
    let mut state = DetectionState::new();

    tracker.on_tick(&mut state, Some(&app(INSTAGRAM)), at(0));
    tracker.on_tick(&mut state, None, at(1));
    state.reset();

    assert_eq!(state, DetectionState::new());
}
