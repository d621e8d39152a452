//! TAP controller state tracking.
//!
//! One transition table serves both sides of the crate: the sequencer uses
//! it to plan TMS walks and track where the hardware is, and the emulated
//! backend replays the exact same table to follow the wire.

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum RegisterState {
    Select,
    Capture,
    Shift,
    Exit1,
    Pause,
    Exit2,
    Update,
}

impl RegisterState {
    fn step_toward(self, target: Self) -> bool {
        match self {
            Self::Select => false,
            Self::Capture if target == Self::Shift => false,
            Self::Exit1 if target == Self::Pause => false,
            Self::Exit2 if target == Self::Shift => false,
            Self::Update => unreachable!(),
            _ => true,
        }
    }

    fn update(self, tms: bool) -> Self {
        if tms {
            match self {
                Self::Capture | Self::Shift => Self::Exit1,
                Self::Exit1 | Self::Exit2 => Self::Update,
                Self::Pause => Self::Exit2,
                // Handled one level up, where the column is known.
                Self::Select | Self::Update => unreachable!(),
            }
        } else {
            match self {
                Self::Select => Self::Capture,
                Self::Capture | Self::Shift => Self::Shift,
                Self::Exit1 | Self::Pause => Self::Pause,
                Self::Exit2 => Self::Shift,
                Self::Update => unreachable!(),
            }
        }
    }
}

/// Position of the TAP controller in the IEEE 1149.1 state graph.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum JtagState {
    Reset,
    Idle,
    Dr(RegisterState),
    Ir(RegisterState),
}

impl JtagState {
    /// The TMS level that moves one step closer to `target`, or `None`
    /// when the controller is already there.
    pub(crate) fn step_toward(self, target: Self) -> Option<bool> {
        let tms = match self {
            state if target == state => return None,
            // Test-Logic-Reset only has one exit, through Run-Test/Idle.
            Self::Reset => false,
            Self::Idle => true,
            Self::Dr(RegisterState::Select) => !matches!(target, Self::Dr(_)),
            Self::Ir(RegisterState::Select) => !matches!(target, Self::Ir(_)),
            Self::Dr(RegisterState::Update) | Self::Ir(RegisterState::Update) => {
                matches!(target, Self::Ir(_) | Self::Dr(_))
            }
            Self::Dr(state) => {
                let next = if let Self::Dr(target) = target {
                    target
                } else {
                    RegisterState::Update
                };
                state.step_toward(next)
            }
            Self::Ir(state) => {
                let next = if let Self::Ir(target) = target {
                    target
                } else {
                    RegisterState::Update
                };
                state.step_toward(next)
            }
        };
        Some(tms)
    }

    /// Advance by one TCK cycle with the given TMS level.
    pub(crate) fn update(&mut self, tms: bool) {
        *self = match *self {
            Self::Reset if tms => Self::Reset,
            Self::Reset => Self::Idle,
            Self::Idle if tms => Self::Dr(RegisterState::Select),
            Self::Idle => Self::Idle,
            Self::Dr(RegisterState::Select) if tms => Self::Ir(RegisterState::Select),
            Self::Ir(RegisterState::Select) if tms => Self::Reset,
            Self::Dr(RegisterState::Update) | Self::Ir(RegisterState::Update) => {
                if tms {
                    Self::Dr(RegisterState::Select)
                } else {
                    Self::Idle
                }
            }
            Self::Dr(state) => Self::Dr(state.update(tms)),
            Self::Ir(state) => Self::Ir(state.update(tms)),
        };
    }
}
