//! WhatsApp over the Twilio Messaging API.
//!
//! Twilio relays inbound messages as `application/x-www-form-urlencoded`
//! posts signed with `X-Twilio-Signature` (HMAC-SHA1 over the request URL and
//! the sorted form parameters); replies go through `Messages.json`.

pub mod adapter;
pub mod form;
pub mod outbound;
pub mod verify;

pub use {adapter::TwilioAdapter, outbound::TwilioSender};
