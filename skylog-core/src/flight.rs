//! Flight-state inference over groundspeed.
//!
//! Pure logic — no I/O, no clock. A three-deep ring of states with
//! hysteresis thresholds; every state change is matched against a pattern
//! table to produce at most one semantic event plus an optional session-leg
//! effect (touch-and-go or full-stop close-out). The caller decides what to
//! do with the transition (persist an event row, update the session summary).

/// Default thresholds, knots.
pub const DEFAULT_START_TAXIING_SPEED: f64 = 5.0;
pub const DEFAULT_STOP_TAXIING_SPEED: f64 = 0.0;
pub const DEFAULT_START_FLYING_SPEED: f64 = 55.0;
pub const DEFAULT_STOP_FLYING_SPEED: f64 = 45.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightState {
    Unknown,
    Stopped,
    Taxiing,
    Flying,
}

/// Groundspeed thresholds, knots. Asymmetric start/stop pairs give the
/// machine its hysteresis.
#[derive(Debug, Clone, Copy)]
pub struct FlightThresholds {
    pub start_taxiing: f64,
    pub stop_taxiing: f64,
    pub start_flying: f64,
    pub stop_flying: f64,
}

impl Default for FlightThresholds {
    fn default() -> Self {
        FlightThresholds {
            start_taxiing: DEFAULT_START_TAXIING_SPEED,
            stop_taxiing: DEFAULT_STOP_TAXIING_SPEED,
            start_flying: DEFAULT_START_FLYING_SPEED,
            stop_flying: DEFAULT_STOP_FLYING_SPEED,
        }
    }
}

/// Semantic flight events, matched from the state ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightEventKind {
    Startup,
    Restart,
    Taxiing,
    Stopped,
    Takeoff,
    Touchdown,
    Landing,
    TouchAndGoLanding,
}

impl FlightEventKind {
    /// Name as persisted in the events table.
    pub fn name(self) -> &'static str {
        match self {
            FlightEventKind::Startup => "Startup",
            FlightEventKind::Restart => "Restart",
            FlightEventKind::Taxiing => "Taxiing",
            FlightEventKind::Stopped => "Stopped",
            FlightEventKind::Takeoff => "Takeoff",
            FlightEventKind::Touchdown => "Touchdown",
            FlightEventKind::Landing => "Landing",
            FlightEventKind::TouchAndGoLanding => "Landing (T/G)",
        }
    }
}

/// How the session summary's current leg should be closed as part of a
/// transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegEffect {
    None,
    /// Close the leg as a touch-and-go (emits `Landing (T/G)`), leaving the
    /// session open for the climb-out.
    TouchAndGo,
    /// Close the leg as a full-stop landing (emits `Landing`).
    FullStop,
}

/// Result of a state change.
#[derive(Debug, Clone, Copy)]
pub struct Transition {
    /// New current state.
    pub state: FlightState,
    /// Event to record, if the ring matched a pattern. The leg-close events
    /// (`Landing`, `Landing (T/G)`) come from `leg`, not from here.
    pub event: Option<FlightEventKind>,
    pub leg: LegEffect,
    /// The machine woke up already moving; the log may be missing the start
    /// of this flight.
    pub restart: bool,
}

pub struct FlightStateMachine {
    thresholds: FlightThresholds,
    s0: FlightState,
    s1: FlightState,
    s2: FlightState,
}

impl FlightStateMachine {
    pub fn new(thresholds: FlightThresholds) -> Self {
        FlightStateMachine {
            thresholds,
            s0: FlightState::Unknown,
            s1: FlightState::Unknown,
            s2: FlightState::Unknown,
        }
    }

    pub fn state(&self) -> FlightState {
        self.s0
    }

    /// The ring as `(s2, s1, s0)`, oldest first.
    pub fn ring(&self) -> (FlightState, FlightState, FlightState) {
        (self.s2, self.s1, self.s0)
    }

    /// Force the ring to a known history. Used when resuming inference over
    /// a sequence whose earlier samples were not observed.
    pub fn seed(&mut self, s2: FlightState, s1: FlightState, s0: FlightState) {
        self.s2 = s2;
        self.s1 = s1;
        self.s0 = s0;
    }

    /// Feed one groundspeed sample. Returns a transition when the state
    /// changed, `None` otherwise.
    pub fn advance(&mut self, groundspeed: f64) -> Option<Transition> {
        let next = self.classify(groundspeed);
        if next == self.s0 {
            return None;
        }

        self.s2 = self.s1;
        self.s1 = self.s0;
        self.s0 = next;

        Some(self.match_pattern())
    }

    /// Hysteresis rules, first match wins.
    fn classify(&self, v: f64) -> FlightState {
        use FlightState::*;
        let t = &self.thresholds;

        if matches!(self.s0, Stopped | Unknown) && v > t.start_taxiing && v <= t.start_flying {
            Taxiing
        } else if matches!(self.s0, Taxiing | Unknown) && v > t.start_flying {
            Flying
        } else if self.s0 == Taxiing && v <= t.stop_taxiing {
            Stopped
        } else if self.s0 == Flying && v <= t.stop_flying {
            Taxiing
        } else if v > t.start_flying {
            Flying
        } else if v > t.start_taxiing {
            Taxiing
        } else {
            Stopped
        }
    }

    fn match_pattern(&self) -> Transition {
        use FlightEventKind::*;
        use FlightState::*;

        use FlightState::Stopped as StateStopped;
        use FlightState::Taxiing as StateTaxiing;

        let (event, leg, restart) = match (self.s2, self.s1, self.s0) {
            (Unknown, Unknown, StateStopped) => (Some(Startup), LegEffect::None, false),
            // Woke up already taxiing or flying: treat as restart.
            (Unknown, Unknown, StateTaxiing) => (Some(Restart), LegEffect::None, true),
            (Unknown, Unknown, Flying) => (Some(Restart), LegEffect::None, true),
            (Unknown, StateStopped, StateTaxiing) => (Some(FlightEventKind::Taxiing), LegEffect::None, false),
            (StateStopped, StateTaxiing, StateStopped) => (Some(FlightEventKind::Stopped), LegEffect::None, false),
            (StateTaxiing, StateStopped, StateTaxiing) => (Some(FlightEventKind::Taxiing), LegEffect::None, false),
            (StateStopped, StateTaxiing, Flying) => (Some(Takeoff), LegEffect::None, false),
            (StateTaxiing, Flying, StateTaxiing) => (Some(Touchdown), LegEffect::None, false),
            (Flying, StateTaxiing, Flying) => (Some(Takeoff), LegEffect::TouchAndGo, false),
            (Flying, StateTaxiing, StateStopped) => (None, LegEffect::FullStop, false),
            _ => (None, LegEffect::None, false),
        };

        Transition {
            state: self.s0,
            event,
            leg,
            restart,
        }
    }
}

impl Default for FlightStateMachine {
    fn default() -> Self {
        Self::new(FlightThresholds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::FlightState::*;
    use super::*;

    fn machine() -> FlightStateMachine {
        FlightStateMachine::default()
    }

    /// Run a groundspeed sequence, collecting event names in emission order
    /// (leg-close event first, then the pattern event, as the logger does).
    fn run(m: &mut FlightStateMachine, speeds: &[f64]) -> Vec<&'static str> {
        let mut events = Vec::new();
        for &v in speeds {
            if let Some(t) = m.advance(v) {
                match t.leg {
                    LegEffect::TouchAndGo => events.push(FlightEventKind::TouchAndGoLanding.name()),
                    LegEffect::FullStop => events.push(FlightEventKind::Landing.name()),
                    LegEffect::None => {}
                }
                if let Some(e) = t.event {
                    events.push(e.name());
                }
            }
        }
        events
    }

    #[test]
    fn test_startup_taxi_takeoff() {
        // Scenario: cold start, taxi out, depart.
        let mut m = machine();
        let events = run(&mut m, &[0.0, 0.0, 8.0, 12.0, 40.0, 60.0]);
        assert_eq!(events, vec!["Startup", "Taxiing", "Takeoff"]);
        assert_eq!(m.state(), Flying);
    }

    #[test]
    fn test_touch_and_go() {
        let mut m = machine();
        m.seed(Stopped, Taxiing, Flying);
        let events = run(&mut m, &[70.0, 40.0, 35.0, 60.0, 70.0]);
        assert_eq!(events, vec!["Touchdown", "Landing (T/G)", "Takeoff"]);
        assert_eq!(m.state(), Flying);
    }

    #[test]
    fn test_full_stop_landing() {
        let mut m = machine();
        m.seed(Stopped, Taxiing, Flying);
        let events = run(&mut m, &[70.0, 40.0, 30.0, 2.0, 0.0]);
        assert_eq!(events, vec!["Touchdown", "Landing"]);
        assert_eq!(m.state(), Stopped);
    }

    #[test]
    fn test_restart_while_flying() {
        let mut m = machine();
        let t = m.advance(120.0).unwrap();
        assert_eq!(t.state, Flying);
        assert_eq!(t.event, Some(FlightEventKind::Restart));
        assert!(t.restart);
    }

    #[test]
    fn test_restart_while_taxiing() {
        let mut m = machine();
        let t = m.advance(10.0).unwrap();
        assert_eq!(t.state, Taxiing);
        assert_eq!(t.event, Some(FlightEventKind::Restart));
        assert!(t.restart);
    }

    #[test]
    fn test_reposition_stop_and_resume() {
        let mut m = machine();
        let events = run(&mut m, &[0.0, 8.0, 0.0, 8.0]);
        assert_eq!(events, vec!["Startup", "Taxiing", "Stopped", "Taxiing"]);
    }

    #[test]
    fn test_flying_holds_above_start_speed() {
        // Above start_flying the fall-through keeps the flying state.
        let mut m = machine();
        m.seed(Stopped, Taxiing, Flying);
        assert!(m.advance(70.0).is_none());
        assert!(m.advance(56.0).is_none());
        assert_eq!(m.state(), Flying);
        // At or below start_flying the fall-through reclassifies to taxiing.
        let t = m.advance(50.0).unwrap();
        assert_eq!(t.state, Taxiing);
        assert_eq!(t.event, Some(FlightEventKind::Touchdown));
    }

    #[test]
    fn test_slow_taxi_drops_to_stopped() {
        let mut m = machine();
        run(&mut m, &[0.0, 8.0]);
        assert_eq!(m.state(), Taxiing);
        // Below start_taxiing the fall-through classifies as stopped even
        // though stop_taxiing is lower.
        let t = m.advance(4.0).unwrap();
        assert_eq!(t.state, Stopped);
        assert_eq!(t.event, Some(FlightEventKind::Stopped));
    }

    #[test]
    fn test_boundary_speeds() {
        let mut m = machine();
        m.advance(0.0); // Startup
        // Exactly start_taxiing is not yet taxiing.
        assert!(m.advance(5.0).is_none());
        assert_eq!(m.state(), Stopped);
        assert!(m.advance(5.1).is_some());
        assert_eq!(m.state(), Taxiing);
        // Exactly start_flying stays taxiing.
        assert!(m.advance(55.0).is_none());
        assert_eq!(m.state(), Taxiing);
        assert!(m.advance(55.1).is_some());
        assert_eq!(m.state(), Flying);
    }

    #[test]
    fn test_no_event_on_steady_state() {
        let mut m = machine();
        m.advance(0.0);
        for _ in 0..100 {
            assert!(m.advance(0.0).is_none());
        }
    }

    #[test]
    fn test_ring_shifts() {
        let mut m = machine();
        m.advance(0.0);
        m.advance(10.0);
        m.advance(60.0);
        assert_eq!(m.ring(), (Stopped, Taxiing, Flying));
    }

    #[test]
    fn test_determinism_from_seeded_ring() {
        // Same seed + same sequence must give identical events.
        let seq = [70.0, 40.0, 60.0, 30.0, 0.0, 8.0, 70.0];
        let mut a = machine();
        a.seed(Stopped, Taxiing, Flying);
        let mut b = machine();
        b.seed(Stopped, Taxiing, Flying);
        assert_eq!(run(&mut a, &seq), run(&mut b, &seq));
        assert_eq!(a.ring(), b.ring());
    }
}
