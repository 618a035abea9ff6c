//! Events published by sync engines.
//!
//! Each engine owns one ordered channel of [`RepositoryEvent`]s. Engines that
//! show the same kind of item share a process-scoped
//! `EventBus<ItemChange<I>>`, through which one engine's edit reaches the
//! in-memory lists of the others.

/// Lifecycle and data notifications from one engine, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum RepositoryEvent<I, D> {
    StartLoadingCache,
    CompleteLoadingCache,
    StartLoadingLatest,
    CompleteLoadingLatest,
    FailToLoadLatest { message: String, recoverable: bool },
    StartLoadingNext,
    CompleteLoadingNext,
    FailToLoadNext { message: String, recoverable: bool },
    /// A derived artifact was resolved for `item`
    CompleteLoadingDerived { item: I, artifact: D },
    /// The item at this index of `get_items()` was removed
    RemovedAt(usize),
    /// The item at this index of `get_items()` was replaced
    UpdatedAt(usize),
}

impl<I, D> RepositoryEvent<I, D> {
    pub fn name(&self) -> &'static str {
        match self {
            RepositoryEvent::StartLoadingCache => "start_loading_cache",
            RepositoryEvent::CompleteLoadingCache => "complete_loading_cache",
            RepositoryEvent::StartLoadingLatest => "start_loading_latest",
            RepositoryEvent::CompleteLoadingLatest => "complete_loading_latest",
            RepositoryEvent::FailToLoadLatest { .. } => "fail_to_load_latest",
            RepositoryEvent::StartLoadingNext => "start_loading_next",
            RepositoryEvent::CompleteLoadingNext => "complete_loading_next",
            RepositoryEvent::FailToLoadNext { .. } => "fail_to_load_next",
            RepositoryEvent::CompleteLoadingDerived { .. } => "complete_loading_derived",
            RepositoryEvent::RemovedAt(_) => "removed_at",
            RepositoryEvent::UpdatedAt(_) => "updated_at",
        }
    }
}

/// A mutation announced on the shared change bus.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemChange<I> {
    /// Replace the item with the same id
    Updated(I),
    /// Remove the item with this id
    Removed(String),
}
