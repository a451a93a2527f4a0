pub mod config;
pub mod input;
pub mod link;
pub mod mode;
pub mod server;
pub mod transmitter;
pub mod video;

/// Fatal fault raised by a background subsystem.
///
/// The orchestrator treats any fault as unrecoverable and shuts the whole
/// process down: a broken serial transport or capture device must not be
/// masked while a physical robot is under manual control.
#[derive(Debug)]
pub struct Fault {
    pub subsystem: &'static str,
    pub message: String,
}

impl Fault {
    pub fn new(subsystem: &'static str, error: impl std::fmt::Display) -> Self {
        Self {
            subsystem,
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} subsystem failed: {}", self.subsystem, self.message)
    }
}
