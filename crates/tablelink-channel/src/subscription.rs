use std::fmt;

/// Registration returned by handler-adding methods.
///
/// Call [`Subscription::unsubscribe`] to remove the handler. Dropping a
/// subscription leaves the handler registered; use
/// [`RequestHandlerGuard`](crate::RequestHandlerGuard) or
/// [`StateWatch`](crate::StateWatch) for scope-bound registrations.
#[must_use = "dropping a Subscription keeps the handler registered"]
pub struct Subscription {
    remove: Vec<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(remove: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            remove: vec![Box::new(remove)],
        }
    }

    /// Combine several subscriptions into one that removes them all.
    pub fn merge(subscriptions: impl IntoIterator<Item = Subscription>) -> Self {
        Self {
            remove: subscriptions
                .into_iter()
                .flat_map(|s| s.remove)
                .collect(),
        }
    }

    pub fn unsubscribe(self) {
        for remove in self.remove {
            remove();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("registrations", &self.remove.len())
            .finish()
    }
}
