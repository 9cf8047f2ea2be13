//! Topic filters and the fixed-capacity subscription table.

use core::convert::Infallible;

use heapless::{String, Vec};

use super::handler::MessageHandler;
use crate::error::{MqttError, ProtocolError};

/// Maximum length for a single topic filter.
pub const MAX_TOPIC_LEN: usize = 128;

/// Default number of subscription slots.
pub const MAX_MESSAGE_HANDLERS: usize = 5;

/// Matches a topic name against a topic filter with MQTT wildcards.
///
/// `+` matches exactly one level, `#` (last level only) matches the parent level
/// and everything below it. Topics starting with `$` are not matched by a leading
/// wildcard.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return filter_levels.next().is_none(),
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Checks wildcard placement: `+` and `#` must fill a whole level, `#` must be last.
pub fn is_valid_filter(filter: &str) -> bool {
    if filter.is_empty() || filter.contains('\0') {
        return false;
    }
    let mut levels = filter.split('/').peekable();
    while let Some(level) = levels.next() {
        if level.contains('#') && (level != "#" || levels.peek().is_some()) {
            return false;
        }
        if level.contains('+') && level != "+" {
            return false;
        }
    }
    true
}

struct Subscription<'h> {
    filter: String<MAX_TOPIC_LEN>,
    handler: &'h dyn MessageHandler,
}

/// Maps topic filters to handlers, in insertion order.
///
/// The table owns copies of the filters, so callers may pass temporaries. When
/// full, inserting a new filter fails with `CapacityExceeded` and the existing
/// entries are left untouched.
pub struct SubscriptionTable<'h, const N: usize> {
    entries: Vec<Subscription<'h>, N>,
    default_handler: Option<&'h dyn MessageHandler>,
}

impl<const N: usize> Default for SubscriptionTable<'_, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'h, const N: usize> SubscriptionTable<'h, N> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            default_handler: None,
        }
    }

    /// Inserts, replaces or (with `None`) removes the handler for `filter`.
    ///
    /// Returns the handler previously registered for the filter.
    pub fn set(
        &mut self,
        filter: &str,
        handler: Option<&'h dyn MessageHandler>,
    ) -> Result<Option<&'h dyn MessageHandler>, MqttError<Infallible>> {
        match handler {
            Some(handler) => self.insert(filter, handler),
            None => Ok(self.remove(filter)),
        }
    }

    /// Registers `handler` for `filter`, replacing an existing entry in place.
    pub fn insert(
        &mut self,
        filter: &str,
        handler: &'h dyn MessageHandler,
    ) -> Result<Option<&'h dyn MessageHandler>, MqttError<Infallible>> {
        if !is_valid_filter(filter) {
            return Err(MqttError::Protocol(ProtocolError::InvalidTopic));
        }
        if let Some(entry) = self.entries.iter_mut().find(|e| e.filter == filter) {
            return Ok(Some(core::mem::replace(&mut entry.handler, handler)));
        }
        let mut owned = String::new();
        owned
            .push_str(filter)
            .map_err(|_| MqttError::BufferOverflow)?;
        self.entries
            .push(Subscription {
                filter: owned,
                handler,
            })
            .map_err(|_| MqttError::CapacityExceeded)?;
        Ok(None)
    }

    /// Removes the entry for `filter`, keeping the order of the others.
    pub fn remove(&mut self, filter: &str) -> Option<&'h dyn MessageHandler> {
        let index = self.entries.iter().position(|e| e.filter == filter)?;
        Some(self.entries.remove(index).handler)
    }

    /// Puts back what `insert` replaced: the previous handler, or nothing.
    pub fn restore(&mut self, filter: &str, previous: Option<&'h dyn MessageHandler>) {
        match previous {
            Some(handler) => {
                if let Some(entry) = self.entries.iter_mut().find(|e| e.filter == filter) {
                    entry.handler = handler;
                }
            }
            None => {
                self.remove(filter);
            }
        }
    }

    /// The handler registered for exactly this filter.
    pub fn get(&self, filter: &str) -> Option<&'h dyn MessageHandler> {
        self.entries
            .iter()
            .find(|e| e.filter == filter)
            .map(|e| e.handler)
    }

    /// The first handler whose filter matches `topic`, else the default handler.
    pub fn find(&self, topic: &str) -> Option<&'h dyn MessageHandler> {
        self.entries
            .iter()
            .find(|e| topic_matches(&e.filter, topic))
            .map(|e| e.handler)
            .or(self.default_handler)
    }

    /// Sets the handler used when no filter matches.
    pub fn set_default(&mut self, handler: Option<&'h dyn MessageHandler>) {
        self.default_handler = handler;
    }

    pub fn filters(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.filter.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
