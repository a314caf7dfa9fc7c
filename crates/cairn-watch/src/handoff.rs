//! Rendezvous channel between discovery producers and the single consumer.
//!
//! A send completes only once the consumer has taken the item. Every wait on
//! either side also watches the shutdown signal, so closing the watcher
//! releases blocked producers and ends the consumer's stream.

use tokio::sync::{mpsc, oneshot, watch};

type Slot<T> = (T, oneshot::Sender<()>);

/// Create a connected sender/receiver pair governed by `shutdown`.
pub(crate) fn channel<T>(shutdown: watch::Receiver<bool>) -> (Sender<T>, Receiver<T>) {
    let (tx, rx) = mpsc::channel(1);
    (
        Sender {
            tx,
            shutdown: shutdown.clone(),
        },
        Receiver { rx, shutdown },
    )
}

/// Resolves once shutdown has been signalled or its sender is gone.
pub(crate) async fn closed(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|closed| *closed).await;
}

pub(crate) struct Sender<T> {
    tx: mpsc::Sender<Slot<T>>,
    shutdown: watch::Receiver<bool>,
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<T> Sender<T> {
    /// Hand `item` to the consumer and wait until it has been taken.
    ///
    /// Returns `false` if the watcher closed or the consumer went away
    /// first; the item is then dropped.
    pub(crate) async fn send(&self, item: T) -> bool {
        let mut shutdown = self.shutdown.clone();
        if *shutdown.borrow_and_update() {
            return false;
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        tokio::select! {
            biased;
            _ = closed(&mut shutdown) => return false,
            sent = self.tx.send((item, ack_tx)) => {
                if sent.is_err() {
                    return false;
                }
            }
        }

        tokio::select! {
            biased;
            _ = closed(&mut shutdown) => false,
            ack = ack_rx => ack.is_ok(),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.shutdown.borrow() || self.tx.is_closed()
    }
}

pub(crate) struct Receiver<T> {
    rx: mpsc::Receiver<Slot<T>>,
    shutdown: watch::Receiver<bool>,
}

impl<T> Receiver<T> {
    /// Take the next item, acknowledging it to its producer.
    ///
    /// Returns `None` once shutdown is signalled or every sender is gone.
    pub(crate) async fn recv(&mut self) -> Option<T> {
        if *self.shutdown.borrow_and_update() {
            return None;
        }
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            biased;
            _ = closed(&mut shutdown) => None,
            slot = self.rx.recv() => {
                let (item, ack) = slot?;
                // The producer may have given up in the meantime.
                let _ = ack.send(());
                Some(item)
            }
        }
    }
}
