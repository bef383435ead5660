mod dispatcher;
mod mailer;
pub mod template;

pub use dispatcher::{NotificationDispatcher, RecipientClass};
pub use mailer::{Mailer, OutboundEmail, SmtpMailer};
