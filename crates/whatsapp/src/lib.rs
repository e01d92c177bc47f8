//! WhatsApp Business Cloud API channel.
//!
//! Meta pushes `entry[].changes[].value` batches signed with the app secret
//! (`X-Hub-Signature-256`); replies go out through the Graph API `messages`
//! endpoint of the business phone number.

pub mod adapter;
pub mod outbound;
pub mod types;
pub mod webhook;

pub use {
    adapter::WhatsAppCloudAdapter,
    outbound::WhatsAppCloudSender,
    webhook::verify_webhook_subscription,
};
