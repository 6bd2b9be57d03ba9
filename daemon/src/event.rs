use crate::config::Config;

pub enum DaemonEvent {
    /// The terminate shortcut was pressed.
    TerminateRequested,
    /// The config file changed on disk and was successfully re-parsed.
    ConfigReloaded(Config),
    /// Ctrl+C received; the daemon should release the shortcut and exit.
    Shutdown,
}
