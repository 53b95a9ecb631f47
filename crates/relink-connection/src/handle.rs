//! Exclusive ownership of the live connection

use relink_core::Connection;

/// The connection owned by one session plus its reconnect generation
///
/// The generation starts at zero and increases by one on every successful
/// reconnect. Work that was started on an older generation (an open
/// transaction, for instance) no longer exists on the server.
pub struct ConnectionHandle {
    connection: Box<dyn Connection>,
    generation: u64,
}

impl ConnectionHandle {
    pub fn new(connection: Box<dyn Connection>) -> Self {
        Self {
            connection,
            generation: 0,
        }
    }

    pub fn connection(&self) -> &dyn Connection {
        self.connection.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Record a successful reconnect and return the new generation.
    pub(crate) fn advance_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("driver", &self.connection.driver_name())
            .field("generation", &self.generation)
            .finish()
    }
}
