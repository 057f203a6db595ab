//! Diagnostics setup for hosts that have no subscriber of their own

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install a formatting subscriber at `level` as the global default
///
/// Returns `false` when a global subscriber is already set.
pub fn init_logging(level: Level) -> bool {
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).is_ok()
}
