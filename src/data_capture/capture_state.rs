//! The armed/idle state machine gating every store operation.

use tokio::sync::watch;

/// Capture lifecycle state. There is exactly one instance per process and
/// it lives as long as the process does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Ingestion disabled; the log may be cleared or exported.
    Idle,
    /// Inbound records are appended; clear and export are refused.
    Armed,
}

/// Tracks the current [`CaptureState`] and publishes transitions through
/// a watch channel, so observers may poll or subscribe as they prefer.
pub struct CaptureStateMachine {
    state_tx: watch::Sender<CaptureState>,
}

impl CaptureStateMachine {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(CaptureState::Idle);
        Self { state_tx }
    }

    /// Arms the capture. Returns `true` on an effective Idle->Armed
    /// transition; calling while already armed is a no-op.
    pub fn start(&self) -> bool {
        self.state_tx.send_if_modified(|state| {
            if *state == CaptureState::Idle {
                *state = CaptureState::Armed;
                true
            } else {
                false
            }
        })
    }

    /// Disarms the capture. Returns `true` on an effective Armed->Idle
    /// transition; calling while already idle is a no-op.
    pub fn stop(&self) -> bool {
        self.state_tx.send_if_modified(|state| {
            if *state == CaptureState::Armed {
                *state = CaptureState::Idle;
                true
            } else {
                false
            }
        })
    }

    pub fn current(&self) -> CaptureState {
        *self.state_tx.borrow()
    }

    pub fn is_armed(&self) -> bool {
        self.current() == CaptureState::Armed
    }

    pub fn can_start(&self) -> bool {
        !self.is_armed()
    }

    pub fn can_stop(&self) -> bool {
        self.is_armed()
    }

    pub fn can_clear(&self) -> bool {
        !self.is_armed()
    }

    pub fn can_export(&self) -> bool {
        !self.is_armed()
    }

    /// New subscription to state transitions. Delivery is coalescing:
    /// a slow observer sees the latest state, not every intermediate one.
    pub fn subscribe(&self) -> watch::Receiver<CaptureState> {
        self.state_tx.subscribe()
    }
}

impl Default for CaptureStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let machine = CaptureStateMachine::new();

        assert_eq!(machine.current(), CaptureState::Idle);
        assert!(machine.can_start());
        assert!(!machine.can_stop());
        assert!(machine.can_clear());
        assert!(machine.can_export());
    }

    #[test]
    fn start_and_stop_flip_the_gates() {
        let machine = CaptureStateMachine::new();

        assert!(machine.start());
        assert!(machine.is_armed());
        assert!(!machine.can_start());
        assert!(machine.can_stop());
        assert!(!machine.can_clear());
        assert!(!machine.can_export());

        assert!(machine.stop());
        assert!(!machine.is_armed());
    }

    #[test]
    fn transitions_are_idempotent() {
        let machine = CaptureStateMachine::new();

        assert!(!machine.stop());
        assert!(machine.start());
        assert!(!machine.start());
        assert!(machine.stop());
        assert!(!machine.stop());
    }

    #[test]
    fn only_effective_transitions_notify() {
        let machine = CaptureStateMachine::new();
        let mut rx = machine.subscribe();
        assert!(!rx.has_changed().unwrap());

        machine.stop();
        assert!(!rx.has_changed().unwrap());

        machine.start();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), CaptureState::Armed);

        machine.start();
        assert!(!rx.has_changed().unwrap());
    }
}
