use std::sync::Arc;

use async_trait::async_trait;

pub mod intake;
pub mod telegram;

pub use intake::{Admission, Intake};
pub use telegram::TelegramAdapter;

/// Inbound chat transports implement this trait.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Human-readable adapter name for logging.
    fn name(&self) -> &str;

    /// Run the adapter's receive loop until the transport shuts down,
    /// passing every inbound event through `intake`.
    async fn start(&self, intake: Arc<Intake>) -> anyhow::Result<()>;
}
