use std::{fmt, future::Future};

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Interrupt,
    Terminate,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopReason::Interrupt => "interrupt",
            StopReason::Terminate => "terminate",
        })
    }
}

/// Stop signal for the app loop, processor and scheduler. The first reason sticks.
#[derive(Clone)]
pub struct Shutdown {
    sender: watch::Sender<Option<StopReason>>,
}

#[derive(Clone)]
pub struct ShutdownListener {
    receiver: watch::Receiver<Option<StopReason>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender }
    }

    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            receiver: self.sender.subscribe(),
        }
    }

    /// Returns false when a stop was already requested.
    pub fn trigger(&self, reason: StopReason) -> bool {
        self.sender.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }
}

impl ShutdownListener {
    pub fn reason(&self) -> Option<StopReason> {
        *self.receiver.borrow()
    }

    /// Resolves with the stop reason, immediately when one is already set.
    pub async fn stopped(&mut self) -> StopReason {
        loop {
            if let Some(reason) = *self.receiver.borrow_and_update() {
                return reason;
            }
            if self.receiver.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }
}

pub fn install_signal_handlers(shutdown: &Shutdown) {
    forward(shutdown.clone(), StopReason::Interrupt, async {
        tokio::signal::ctrl_c().await.is_ok()
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        forward(shutdown.clone(), StopReason::Terminate, async {
            match signal(SignalKind::terminate()) {
                Ok(mut sig) => sig.recv().await.is_some(),
                Err(err) => {
                    tracing::warn!(error = %err, "SIGTERM handler unavailable");
                    false
                }
            }
        });
    }
}

fn forward<F>(shutdown: Shutdown, reason: StopReason, received: F)
where
    F: Future<Output = bool> + Send + 'static,
{
    tokio::spawn(async move {
        if received.await && shutdown.trigger(reason) {
            tracing::info!(%reason, "stop signal received");
        }
    });
}
