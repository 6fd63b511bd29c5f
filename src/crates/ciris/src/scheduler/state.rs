//! Cognitive state machine: {WAKEUP, WORK, PLAY, SOLITUDE, DREAM, SHUTDOWN}.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CognitiveState {
    Shutdown,
    Wakeup,
    Work,
    Play,
    Solitude,
    Dream,
}

impl CognitiveState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shutdown => "SHUTDOWN",
            Self::Wakeup => "WAKEUP",
            Self::Work => "WORK",
            Self::Play => "PLAY",
            Self::Solitude => "SOLITUDE",
            Self::Dream => "DREAM",
        }
    }
}

/// What a state processor recommends after a round. `None` stays put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionRecommendation {
    None,
    ToWakeup,
    ToWork,
    ToPlay,
    ToSolitude,
    ToDream,
    Shutdown,
}

/// Applies a recommendation to the current state, rejecting transitions the
/// state graph doesn't permit. `Shutdown` is always accepted from any state
/// (any state -> SHUTDOWN on stop/emergency/shutdown-task-acceptance);
/// nothing transitions out of SHUTDOWN except an explicit `ToWakeup` (the
/// `start_processing` entry point).
pub fn next_state(
    current: CognitiveState,
    recommendation: TransitionRecommendation,
) -> Result<CognitiveState, String> {
    use CognitiveState::*;
    use TransitionRecommendation::*;

    if recommendation == TransitionRecommendation::Shutdown {
        return Ok(CognitiveState::Shutdown);
    }

    match (current, recommendation) {
        (_, None) => Ok(current),
        (CognitiveState::Shutdown, ToWakeup) => Ok(Wakeup),
        (Wakeup, ToWork) => Ok(Work),
        (Work, ToDream) => Ok(Dream),
        (Work, ToPlay) => Ok(Play),
        (Work, ToSolitude) => Ok(Solitude),
        (Dream, ToWork) => Ok(Work),
        (Play, ToWork) => Ok(Work),
        (Solitude, ToWork) => Ok(Work),
        (from, rec) => Err(format!("illegal transition from {:?} via {:?}", from, rec)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wakeup_to_work_on_success() {
        assert_eq!(
            next_state(CognitiveState::Wakeup, TransitionRecommendation::ToWork).unwrap(),
            CognitiveState::Work
        );
    }

    #[test]
    fn any_state_can_shutdown() {
        for state in [
            CognitiveState::Wakeup,
            CognitiveState::Work,
            CognitiveState::Play,
            CognitiveState::Solitude,
            CognitiveState::Dream,
        ] {
            assert_eq!(
                next_state(state, TransitionRecommendation::Shutdown).unwrap(),
                CognitiveState::Shutdown
            );
        }
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        assert!(next_state(CognitiveState::Shutdown, TransitionRecommendation::ToWork).is_err());
        assert!(next_state(CognitiveState::Play, TransitionRecommendation::ToDream).is_err());
    }

    #[test]
    fn shutdown_can_restart_via_wakeup() {
        assert_eq!(
            next_state(CognitiveState::Shutdown, TransitionRecommendation::ToWakeup).unwrap(),
            CognitiveState::Wakeup
        );
    }
}
