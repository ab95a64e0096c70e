pub mod log;
pub mod sms;
pub mod webhook;
