//! The reactor handle's `{New -> Running -> Stopping -> Stopped}` state
//! machine.

use std::sync::atomic::{AtomicU8, Ordering};

/// Reactor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactorState {
    New,
    Running,
    Stopping,
    Stopped,
}

impl ReactorState {
    fn to_u8(self) -> u8 {
        match self {
            ReactorState::New => 0,
            ReactorState::Running => 1,
            ReactorState::Stopping => 2,
            ReactorState::Stopped => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => ReactorState::New,
            1 => ReactorState::Running,
            2 => ReactorState::Stopping,
            _ => ReactorState::Stopped,
        }
    }
}

pub(crate) struct AtomicReactorState(AtomicU8);

impl AtomicReactorState {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(ReactorState::New.to_u8()))
    }

    pub(crate) fn get(&self) -> ReactorState {
        ReactorState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: ReactorState) {
        self.0.store(state.to_u8(), Ordering::Release);
    }
}
