use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Process-wide broker connection flag.
///
/// Written only by the transport event loop, read by anything that gates a
/// publish. Also counts completed connects so callers can tell a reconnect
/// from the initial connect.
#[derive(Debug, Default)]
pub struct ConnectionState {
    connected: AtomicBool,
    connects: AtomicU32,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn set_connected(&self) {
        self.connected.store(true, Ordering::Relaxed);
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_disconnected(&self) {
        self.connected.store(false, Ordering::Relaxed);
    }

    /// Number of successful connects since startup.
    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected() {
        let state = ConnectionState::new();
        assert!(!state.is_connected());
        assert_eq!(state.connect_count(), 0);
    }

    #[test]
    fn transitions_and_counts() {
        let state = ConnectionState::new();
        state.set_connected();
        assert!(state.is_connected());
        assert_eq!(state.connect_count(), 1);

        state.set_disconnected();
        assert!(!state.is_connected());

        state.set_connected();
        assert_eq!(state.connect_count(), 2);
    }
}
