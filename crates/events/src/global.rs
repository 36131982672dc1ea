//! Process-wide default publisher.
//!
//! Library code should take an `Arc<DomainEventPublisher>` explicitly. This
//! slot exists for the outermost composition root and for tests.

use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use crate::error::{PublisherError, Result};
use crate::publisher::{DomainEventPublisher, PublisherConfig, PublisherState};

static INSTANCE: LazyLock<RwLock<Option<Arc<DomainEventPublisher>>>> =
    LazyLock::new(|| RwLock::new(None));

/// Returns the installed publisher, creating a default one on first use.
pub fn instance() -> Arc<DomainEventPublisher> {
    {
        let slot = INSTANCE.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(publisher) = slot.as_ref() {
            return publisher.clone();
        }
    }

    let mut slot = INSTANCE.write().unwrap_or_else(PoisonError::into_inner);
    slot.get_or_insert_with(|| {
        tracing::debug!("creating default event publisher");
        Arc::new(DomainEventPublisher::new(PublisherConfig::default()))
    })
    .clone()
}

/// Returns the installed publisher without creating one.
pub fn current() -> Option<Arc<DomainEventPublisher>> {
    INSTANCE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Installs `publisher` as the process-wide instance and returns the previous one.
///
/// A publisher that has already been shut down is rejected.
pub fn set_instance(
    publisher: Arc<DomainEventPublisher>,
) -> Result<Option<Arc<DomainEventPublisher>>> {
    if publisher.state() == PublisherState::Stopped {
        return Err(PublisherError::InvalidArgument(
            "cannot install a stopped publisher".to_string(),
        ));
    }

    let previous = INSTANCE
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(publisher);
    Ok(previous)
}

/// Clears the slot and returns what was installed.
pub fn reset() -> Option<Arc<DomainEventPublisher>> {
    INSTANCE
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
}

/// Shuts down the installed publisher, if any. The slot keeps it.
pub fn shutdown() {
    if let Some(publisher) = current() {
        publisher.shutdown();
    }
}
