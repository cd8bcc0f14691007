//! Webhook notifications.
//!
//! The [`EventSubscriber`] tails every run's event stream and hands each
//! event to the [`WebhookDispatcher`], which maps it to the public event
//! vocabulary and POSTs a signed payload to the run owner's webhooks.

mod dispatcher;
mod subscriber;

pub use dispatcher::{
    sign, DispatchError, TestDelivery, WebhookDispatcher, WebhookPayload, SIGNATURE_HEADER,
    WEBHOOK_ID_HEADER,
};
pub use subscriber::EventSubscriber;
