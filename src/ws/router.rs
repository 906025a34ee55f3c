//! Channel-keyed dispatch of decoded feed messages.
//!
//! Each channel has at most one handler, and each handler receives the
//! payload type of its own channel only.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use super::events::{BookMessage, Channel, FeedMessage, StatusMessage, SubscriptionAck};

type Handler<T> = Box<dyn Fn(&T) + Send + Sync>;

/// A handler bound to the channel whose payload it accepts.
pub enum ChannelHandler {
    Status(Handler<StatusMessage>),
    Heartbeat(Box<dyn Fn() + Send + Sync>),
    Book(Handler<BookMessage>),
    Subscription(Handler<SubscriptionAck>),
}

impl ChannelHandler {
    pub fn status(f: impl Fn(&StatusMessage) + Send + Sync + 'static) -> Self {
        ChannelHandler::Status(Box::new(f))
    }

    pub fn heartbeat(f: impl Fn() + Send + Sync + 'static) -> Self {
        ChannelHandler::Heartbeat(Box::new(f))
    }

    pub fn book(f: impl Fn(&BookMessage) + Send + Sync + 'static) -> Self {
        ChannelHandler::Book(Box::new(f))
    }

    pub fn subscription(f: impl Fn(&SubscriptionAck) + Send + Sync + 'static) -> Self {
        ChannelHandler::Subscription(Box::new(f))
    }

    pub fn channel(&self) -> Channel {
        match self {
            ChannelHandler::Status(_) => Channel::Status,
            ChannelHandler::Heartbeat(_) => Channel::Heartbeat,
            ChannelHandler::Book(_) => Channel::Book,
            ChannelHandler::Subscription(_) => Channel::Subscription,
        }
    }
}

/// Result of [`MessageRouter::dispatch`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Routed,
    /// No handler registered for the message's channel; the message was
    /// dropped.
    Unrouted,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub routed: u64,
    pub unrouted: u64,
}

#[derive(Default)]
pub struct MessageRouter {
    status: Option<Handler<StatusMessage>>,
    heartbeat: Option<Box<dyn Fn() + Send + Sync>>,
    book: Option<Handler<BookMessage>>,
    subscription: Option<Handler<SubscriptionAck>>,
    routed: AtomicU64,
    unrouted: AtomicU64,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to its channel, replacing any previous handler.
    /// Returns `true` if one was replaced.
    pub fn register(&mut self, handler: ChannelHandler) -> bool {
        match handler {
            ChannelHandler::Status(h) => self.status.replace(h).is_some(),
            ChannelHandler::Heartbeat(h) => self.heartbeat.replace(h).is_some(),
            ChannelHandler::Book(h) => self.book.replace(h).is_some(),
            ChannelHandler::Subscription(h) => self.subscription.replace(h).is_some(),
        }
    }

    pub fn is_registered(&self, channel: Channel) -> bool {
        match channel {
            Channel::Status => self.status.is_some(),
            Channel::Heartbeat => self.heartbeat.is_some(),
            Channel::Book => self.book.is_some(),
            Channel::Subscription => self.subscription.is_some(),
        }
    }

    /// Run the handler for the message's channel synchronously.
    pub fn dispatch(&self, message: &FeedMessage) -> Dispatch {
        let handled = match message {
            FeedMessage::Status(msg) => self.status.as_ref().map(|h| h(msg)),
            FeedMessage::Heartbeat => self.heartbeat.as_ref().map(|h| h()),
            FeedMessage::Book(msg) => self.book.as_ref().map(|h| h(msg)),
            FeedMessage::SubscriptionAck(msg) => self.subscription.as_ref().map(|h| h(msg)),
        };

        match handled {
            Some(()) => {
                self.routed.fetch_add(1, Ordering::Relaxed);
                Dispatch::Routed
            }
            None => {
                self.unrouted.fetch_add(1, Ordering::Relaxed);
                warn!(channel = %message.channel(), "no handler registered for channel");
                Dispatch::Unrouted
            }
        }
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            routed: self.routed.load(Ordering::Relaxed),
            unrouted: self.unrouted.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use super::*;
    use crate::ws::events::{BookKind, BookUpdate};

    fn book_message() -> FeedMessage {
        FeedMessage::Book(BookMessage {
            kind: BookKind::Snapshot,
            data: vec![BookUpdate::default()],
        })
    }

    #[test]
    fn unregistered_channel_is_dropped_and_counted() {
        let router = MessageRouter::new();
        assert_eq!(router.dispatch(&book_message()), Dispatch::Unrouted);
        assert_eq!(router.dispatch(&FeedMessage::Heartbeat), Dispatch::Unrouted);
        assert_eq!(router.stats(), RouterStats { routed: 0, unrouted: 2 });
    }

    #[test]
    fn routes_to_the_matching_handler_only() {
        let books = Arc::new(AtomicUsize::new(0));
        let beats = Arc::new(AtomicUsize::new(0));

        let mut router = MessageRouter::new();
        let b = Arc::clone(&books);
        router.register(ChannelHandler::book(move |msg| {
            assert_eq!(msg.kind, BookKind::Snapshot);
            b.fetch_add(1, Ordering::SeqCst);
        }));
        let h = Arc::clone(&beats);
        router.register(ChannelHandler::heartbeat(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(router.dispatch(&book_message()), Dispatch::Routed);
        assert_eq!(router.dispatch(&FeedMessage::Heartbeat), Dispatch::Routed);
        assert_eq!(router.dispatch(&FeedMessage::Heartbeat), Dispatch::Routed);

        assert_eq!(books.load(Ordering::SeqCst), 1);
        assert_eq!(beats.load(Ordering::SeqCst), 2);
        assert_eq!(router.stats().routed, 3);
    }

    #[test]
    fn re_registering_replaces_the_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut router = MessageRouter::new();

        assert!(!router.register(ChannelHandler::book(|_| panic!("replaced handler ran"))));
        let h = Arc::clone(&hits);
        assert!(router.register(ChannelHandler::book(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        })));

        router.dispatch(&book_message());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_reports_its_channel() {
        assert_eq!(ChannelHandler::status(|_| {}).channel(), Channel::Status);
        assert_eq!(ChannelHandler::subscription(|_| {}).channel(), Channel::Subscription);
    }

    #[test]
    fn is_registered_reflects_registrations() {
        let mut router = MessageRouter::new();
        assert!(!router.is_registered(Channel::Book));
        router.register(ChannelHandler::book(|_| {}));
        assert!(router.is_registered(Channel::Book));
        assert!(!router.is_registered(Channel::Status));
    }
}
