//! Concrete senders behind the scheduler's dispatch traits.
//!
//! - [`SmtpDigestSender`] — daily digest over SMTP (async lettre)
//! - [`HttpPushSender`] — push payload POSTed to each subscription endpoint

pub mod email;
pub mod push;

pub use email::{SmtpDigestSender, SmtpTls};
pub use push::HttpPushSender;
