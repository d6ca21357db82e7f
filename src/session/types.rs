//! Session data types

/// What an active session is doing between steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveMode {
    /// Rendering at the configured cadence
    #[default]
    Rendering,
    /// Blocking the simulation until the viewer resumes it
    Paused,
}

/// Lifecycle state of a visualization session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Created, `start` not yet called
    #[default]
    Uninitialized,
    /// Endpoint unreachable; the next render cycle retries
    Connecting,
    /// Connected
    Active(ActiveMode),
    /// Permanently off (configuration, connect failure or shutdown)
    Disabled,
    /// Stopped at the viewer's request or by a fatal error
    Terminated,
}

impl SessionState {
    /// Check if connected
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active(_))
    }

    /// Check if paused by the viewer
    pub fn is_paused(&self) -> bool {
        matches!(self, SessionState::Active(ActiveMode::Paused))
    }

    /// Check if the session can never render again
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Disabled | SessionState::Terminated)
    }

    /// Check if `on_step` does any work in this state
    pub fn accepts_steps(&self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Active(_))
    }

    /// Display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "Uninitialized",
            SessionState::Connecting => "Connecting",
            SessionState::Active(ActiveMode::Rendering) => "Rendering",
            SessionState::Active(ActiveMode::Paused) => "Paused",
            SessionState::Disabled => "Disabled",
            SessionState::Terminated => "Terminated",
        }
    }
}

/// Result of one [`on_step`](super::VisSession::on_step) call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Session is not running; nothing was done
    Inactive,
    /// The notification period excludes this step
    NotScheduled,
    /// Counted towards the render interval, no render
    Skipped,
    /// Rendered `cycles` frames (more than one when paused)
    Rendered { cycles: u32 },
    /// The viewer link was lost and the session gave up on it
    Interrupted,
}

impl StepOutcome {
    pub fn rendered(&self) -> bool {
        matches!(self, StepOutcome::Rendered { .. })
    }
}
