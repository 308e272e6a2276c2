use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::OverlayError;
use crate::telemetry::{SessionInfo, SessionLaps, TelemetryContext, Throttled, store::Selected};

/// Session counters change slowly, one refresh a second is plenty.
pub const SESSION_THROTTLE: Duration = Duration::from_millis(1000);

/// Lap and clock summary of the current session.
///
/// `state` and `current_lap` are carried as the simulator reports them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLapCount {
    pub state: f64,
    pub current_lap: f64,
    pub total_laps: u32,
    pub time: f64,
    pub time_total: f64,
    pub time_remaining: f64,
}

/// Every input the summary depends on; the memo key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LapCountInputs {
    pub session_laps: Option<SessionLaps>,
    pub session_state: Option<f64>,
    pub current_lap: Option<f64>,
    pub time: Option<f64>,
    pub time_total: Option<f64>,
    pub time_remaining: Option<f64>,
}

/// Folds the inputs into a summary.
///
/// Without a usable session-laps entry the all-zero default is returned. Text entries
/// such as `"unlimited"` still fill every field except `total_laps`.
pub fn session_lap_count(inputs: &LapCountInputs) -> SessionLapCount {
    let Some(laps) = inputs.session_laps.as_ref().filter(|laps| laps.is_set()) else {
        return SessionLapCount::default();
    };

    SessionLapCount {
        state: inputs.session_state.unwrap_or(0.),
        current_lap: inputs.current_lap.unwrap_or(0.),
        total_laps: laps.laps().unwrap_or(0),
        time: inputs.time.unwrap_or(0.),
        time_total: inputs.time_total.unwrap_or(0.),
        time_remaining: inputs.time_remaining.unwrap_or(0.),
    }
}

/// Live [`SessionLapCount`] built from six throttled telemetry reads and the session
/// info entry selected by `SessionNum`.
pub struct SessionLapCountView {
    session_num: Throttled<Option<f64>>,
    session_state: Throttled<Option<f64>>,
    current_lap: Throttled<Option<f64>>,
    time: Throttled<Option<f64>>,
    time_total: Throttled<Option<f64>>,
    time_remaining: Throttled<Option<f64>>,
    sessions: Selected<Option<SessionInfo>>,
    memo: Option<(LapCountInputs, SessionLapCount)>,
    computations: usize,
}

impl SessionLapCountView {
    pub fn new(ctx: &TelemetryContext) -> Self {
        Self::with_throttle(ctx, SESSION_THROTTLE)
    }

    pub fn with_throttle(ctx: &TelemetryContext, throttle: Duration) -> Self {
        Self {
            session_num: ctx.telemetry_value("SessionNum", throttle),
            session_state: ctx.telemetry_value("SessionState", throttle),
            current_lap: ctx.telemetry_value("Lap", throttle),
            time: ctx.telemetry_value("SessionTime", throttle),
            time_total: ctx.telemetry_value("SessionTimeTotal", throttle),
            time_remaining: ctx.telemetry_value("SessionTimeRemain", throttle),
            sessions: ctx
                .sessions
                .watch(
                    |info: Option<&SessionInfo>| info.cloned(),
                    |a: &Option<SessionInfo>, b: &Option<SessionInfo>| a == b,
                ),
            memo: None,
            computations: 0,
        }
    }

    fn inputs(&self) -> LapCountInputs {
        let session_laps = self.session_num.get().and_then(|num| {
            self.sessions
                .get()
                .and_then(|info| info.session_laps(num as i64).cloned())
        });
        LapCountInputs {
            session_laps,
            session_state: self.session_state.get(),
            current_lap: self.current_lap.get(),
            time: self.time.get(),
            time_total: self.time_total.get(),
            time_remaining: self.time_remaining.get(),
        }
    }

    /// The summary for the latest emitted inputs, recomputed only when one of them
    /// changed since the previous call.
    pub fn current(&mut self) -> SessionLapCount {
        let inputs = self.inputs();
        self.mark_seen();
        if let Some((previous, summary)) = &self.memo {
            if *previous == inputs {
                return *summary;
            }
        }
        let summary = session_lap_count(&inputs);
        self.computations += 1;
        self.memo = Some((inputs, summary));
        summary
    }

    pub fn has_changed(&self) -> bool {
        self.session_num.has_changed()
            || self.session_state.has_changed()
            || self.current_lap.has_changed()
            || self.time.has_changed()
            || self.time_total.has_changed()
            || self.time_remaining.has_changed()
            || self.sessions.has_changed()
    }

    fn mark_seen(&mut self) {
        self.session_num.mark_seen();
        self.session_state.mark_seen();
        self.current_lap.mark_seen();
        self.time.mark_seen();
        self.time_total.mark_seen();
        self.time_remaining.mark_seen();
        self.sessions.mark_seen();
    }

    /// Resolves once any input emits a new value.
    pub async fn changed(&mut self) -> Result<(), OverlayError> {
        tokio::select! {
            r = self.session_num.changed() => r,
            r = self.session_state.changed() => r,
            r = self.current_lap.changed() => r,
            r = self.time.changed() => r,
            r = self.time_total.changed() => r,
            r = self.time_remaining.changed() => r,
            r = self.sessions.changed() => r,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::telemetry::{ManualScheduler, SessionEntry, Telemetry};

    fn race_session(laps: SessionLaps) -> SessionInfo {
        SessionInfo {
            sessions: vec![SessionEntry {
                session_num: 0,
                session_type: "Race".to_string(),
                session_name: "RACE".to_string(),
                session_laps: laps,
            }],
        }
    }

    fn session_telemetry(lap: f64, time: f64) -> Telemetry {
        Telemetry::new()
            .with("SessionNum", vec![0.])
            .with("SessionState", vec![4.])
            .with("Lap", vec![lap])
            .with("SessionTime", vec![time])
            .with("SessionTimeTotal", vec![1800.])
            .with("SessionTimeRemain", vec![1800. - time])
    }

    #[test]
    fn test_lap_count_without_session_laps_is_zero() {
        let inputs = LapCountInputs {
            current_lap: Some(3.),
            session_state: Some(4.),
            ..Default::default()
        };
        assert_eq!(session_lap_count(&inputs), SessionLapCount::default());

        let zero_laps = LapCountInputs {
            session_laps: Some(SessionLaps::Laps(0)),
            ..inputs
        };
        assert_eq!(session_lap_count(&zero_laps), SessionLapCount::default());
    }

    #[test]
    fn test_lap_count_with_unlimited_laps() {
        let inputs = LapCountInputs {
            session_laps: Some(SessionLaps::Text("unlimited".to_string())),
            session_state: Some(4.),
            current_lap: Some(7.),
            time: Some(60.),
            time_total: Some(3600.),
            time_remaining: Some(3540.),
        };
        assert_eq!(
            session_lap_count(&inputs),
            SessionLapCount {
                state: 4.,
                current_lap: 7.,
                total_laps: 0,
                time: 60.,
                time_total: 3600.,
                time_remaining: 3540.,
            }
        );
    }

    #[test]
    fn test_lap_count_keeps_fractional_and_large_values() {
        let inputs = LapCountInputs {
            session_laps: Some(SessionLaps::Laps(3)),
            session_state: Some(2.5),
            current_lap: Some(3e10),
            ..Default::default()
        };
        let summary = session_lap_count(&inputs);
        assert_eq!(summary.state, 2.5);
        assert_eq!(summary.current_lap, 3e10);
    }

    #[test]
    fn test_view_follows_throttled_inputs() {
        let scheduler = ManualScheduler::new();
        let ctx = TelemetryContext::new(Arc::new(scheduler.clone()));
        let mut view = SessionLapCountView::new(&ctx);
        assert_eq!(view.current(), SessionLapCount::default());

        ctx.sessions.set_session(Some(race_session(SessionLaps::Laps(20))));
        ctx.telemetry.set_telemetry(Some(session_telemetry(1., 100.)));
        // session info is not throttled, telemetry is
        assert!(view.has_changed());
        assert_eq!(view.current(), SessionLapCount::default());

        scheduler.advance(SESSION_THROTTLE);
        assert!(view.has_changed());
        let summary = view.current();
        assert_eq!(summary.total_laps, 20);
        assert_eq!(summary.current_lap, 1.);
        assert_eq!(summary.state, 4.);
        assert_eq!(summary.time_remaining, 1700.);
        assert!(!view.has_changed());
    }

    #[test]
    fn test_view_is_memoized_on_inputs() {
        let scheduler = ManualScheduler::new();
        let ctx = TelemetryContext::new(Arc::new(scheduler.clone()));
        ctx.sessions.set_session(Some(race_session(SessionLaps::Laps(20))));
        ctx.telemetry.set_telemetry(Some(session_telemetry(2., 200.)));
        let mut view = SessionLapCountView::new(&ctx);

        let first = view.current();
        assert_eq!(first.current_lap, 2.);
        assert_eq!(view.current(), first);
        assert_eq!(view.computations, 1);

        ctx.telemetry.set_telemetry(Some(session_telemetry(2., 200.)));
        scheduler.advance(SESSION_THROTTLE);
        assert_eq!(view.current(), first);
        assert_eq!(view.computations, 1);

        ctx.telemetry.set_telemetry(Some(session_telemetry(3., 290.)));
        scheduler.advance(SESSION_THROTTLE);
        assert_eq!(view.current().current_lap, 3.);
        assert_eq!(view.computations, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_view_changed_wakes_on_emission() {
        let ctx = TelemetryContext::with_tokio().unwrap();
        ctx.sessions.set_session(Some(race_session(SessionLaps::Laps(10))));
        let mut view = SessionLapCountView::new(&ctx);
        view.current();

        ctx.telemetry.set_telemetry(Some(session_telemetry(5., 500.)));
        view.changed().await.unwrap();
        let start = tokio::time::Instant::now();
        // the first input emits after one window, the rest in the same instant
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(start.elapsed() < SESSION_THROTTLE);
        assert_eq!(view.current().current_lap, 5.);
        assert_eq!(view.current().total_laps, 10);
    }
}
