//! Actors are long-lived tasks that own their state and receive events over
//! a channel. Every event carries the span it was sent from, so work done by
//! the actor shows up under the caller in the trace tree.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendError;
use tracing::Span;

pub mod command_queue;
pub mod frontmost;

pub struct Sender<Event>(mpsc::UnboundedSender<(Span, Event)>);

pub type Receiver<Event> = mpsc::UnboundedReceiver<(Span, Event)>;

pub fn channel<Event>() -> (Sender<Event>, Receiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Sender(tx), rx)
}

impl<Event> Sender<Event> {
    pub fn try_send(&self, event: Event) -> Result<(), SendError<(Span, Event)>> {
        self.0.send((Span::current(), event))
    }
}

impl<Event> Clone for Sender<Event> {
    fn clone(&self) -> Self { Sender(self.0.clone()) }
}

impl<Event> std::fmt::Debug for Sender<Event> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender").field("closed", &self.0.is_closed()).finish()
    }
}
