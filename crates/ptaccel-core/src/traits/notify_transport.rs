// # Notify Transport Trait
//
// Delivers one message to one channel.
//
// The dispatcher has already decided that the channel is dispatchable and
// resolved its hitokoto flag. Transports only perform delivery; errors are
// logged by the dispatcher and never abort other channels.

use async_trait::async_trait;

use crate::config::ChannelKind;

/// A flattened, validated channel ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPayload {
    /// Channel key in the notify configuration
    pub channel: String,
    /// Family with its fields
    pub kind: ChannelKind,
    /// Append a hitokoto line to the content
    pub hitokoto: bool,
}

/// Trait for notification delivery
#[async_trait]
pub trait NotifyTransport: Send + Sync {
    /// Send `title`/`content` over the channel described by `payload`
    async fn send(
        &self,
        title: &str,
        content: &str,
        payload: &ChannelPayload,
    ) -> Result<(), crate::Error>;
}
