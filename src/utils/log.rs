use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT_LOGGER: std::sync::Once = std::sync::Once::new();

/// Installs the global `tracing` subscriber. `RUST_LOG` overrides the INFO default;
/// hyper and reqwest internals stay quiet unless asked for explicitly.
pub fn init_logger_once() {
    INIT_LOGGER.call_once(|| {
        let env_filter = EnvFilter::builder()
            .with_default_directive(Level::INFO.into())
            .from_env_lossy()
            .add_directive("hyper=warn".parse().expect("static directive"))
            .add_directive("reqwest=warn".parse().expect("static directive"));
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    });
}
