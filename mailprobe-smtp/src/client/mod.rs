//! SMTP client used to submit probe messages.
//!
//! Supports plain TCP, implicit TLS, STARTTLS upgrade and `AUTH PLAIN`.
//!
//! ```no_run
//! use mailprobe_smtp::client::SmtpClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = SmtpClient::connect("localhost:2525", "localhost".to_string()).await?;
//! client.read_greeting().await?;
//! client.ehlo("probe.example.com").await?;
//! client.mail_from("sender@example.com").await?;
//! client.rcpt_to("recipient@example.com").await?;
//! client.data().await?;
//! let accepted = client.send_data("Subject: Test\r\n\r\n").await?;
//! assert!(accepted.is_success());
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod response;
mod smtp_client;

pub use error::{ClientError, Result};
pub use response::{Response, ResponseLine};
pub use smtp_client::SmtpClient;
