use crate::config::{self, Config};
use crate::error::InitError;
use crate::layer::EntryLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Route `tracing` events through the process-wide configuration.
///
/// **Effects**
///
/// Installs a [`Registry`] combined with [`EntryLayer`] as the global
/// default subscriber, so `tracing` events from dependencies end up in the
/// same outputs as entries logged directly.
///
/// **Errors**
///
/// [`InitError::SubscriberSet`] if a global subscriber was already
/// installed.
pub fn init_tracing() -> Result<(), InitError> {
    let subscriber = Registry::default().with(EntryLayer::new());
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Install `config` as the process-wide configuration, then call
/// [`init_tracing`].
pub fn init_tracing_with_config(config: Config) -> Result<(), InitError> {
    config::install(config);
    init_tracing()
}
