use crossbeam_channel::Sender;

/// Short user-visible messages, the desktop stand-in for a toast.
pub trait Notifier: Send + 'static {
    fn notify(&self, message: &str);
}

/// Writes notifications to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        log::warn!("{message}");
    }
}

/// Forwards notifications to whoever renders them; drops them if nobody keeps up.
#[derive(Clone, Debug)]
pub struct ChannelNotifier {
    tx: Sender<String>,
}

impl ChannelNotifier {
    pub fn new(tx: Sender<String>) -> Self {
        Self { tx }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, message: &str) {
        if self.tx.try_send(message.to_string()).is_err() {
            log::debug!("dropping notification: {message}");
        }
    }
}
