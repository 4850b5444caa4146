use slog::{o, Drain, Logger};

/// Builds the process-wide root logger. Every node takes this (or a logger
/// derived from it via `Logger::new`) at construction time rather than
/// reaching for a module-global -- the logging sink itself stays an external,
/// pluggable collaborator; this is just the default terminal
/// drain used when nothing else is wired in.
pub fn get_root_logger() -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!())
}

/// A logger that never prints, for use in tests that would otherwise be
/// noisy under `cargo test -- --nocapture`.
pub fn get_test_logger() -> Logger {
    Logger::root(slog::Discard, o!())
}
