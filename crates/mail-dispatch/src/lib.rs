pub mod classify;
pub mod dispatcher;
pub mod providers;

pub use classify::{classify, Classification, InvalidDestination};
pub use dispatcher::{DispatchConfig, DispatchOutcome, Dispatcher, Overrides};
pub use providers::{
    EmailAttachment, EmailOutcome, EmailPayload, EmailProvider, ProviderError, SmsOutcome, SmsProvider,
};

/// Twilio's documented magic test number, resolved from the CLI's `-p/--phone
/// twilio` override value.
pub const TWILIO_MAGIC_TEST_NUMBER: &str = "+15005550006";
