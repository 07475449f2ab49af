pub mod slack;

use anyhow::Result;

pub trait Notifier {
    fn send_message(&self, channel: &str, text: &str) -> Result<()>;
}
