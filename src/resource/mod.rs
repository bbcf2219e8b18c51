//! CRUD framework shared by the Anti-DDoS resources.
//!
//! A [`ResourceHandler`] knows how to create, read, update, and delete one
//! kind of remote entity. The lifecycle drivers in this module apply those
//! operations to a [`ResourceState`], decide when local state is stored or
//! cleared, and wrap every call in a `tracing` span carrying a fresh log id.

mod error;
mod id;

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;

use tokio::time::Instant;
use tracing::{Instrument, debug, error, info_span, warn};
use uuid::Uuid;

pub use error::ResourceError;
pub use id::{ID_SEPARATOR, join_id, split_id};

/// Future returned by resource handler operations.
pub type HandlerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ResourceError>> + Send + 'a>>;

/// Entity returned by a successful create.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Created<M> {
    /// Identifier under which the entity is tracked.
    pub id: String,
    /// Attributes to store for the entity.
    pub model: M,
}

/// Operations implemented by each resource type.
pub trait ResourceHandler: Send + Sync {
    /// Resource type name used in logs and errors.
    const TYPE_NAME: &'static str;

    /// Desired configuration, also stored as the tracked attributes.
    type Model: Clone + Debug + Send + Sync;

    /// Creates the entity and waits until it is usable.
    fn create<'a>(&'a self, model: &'a Self::Model) -> HandlerFuture<'a, Created<Self::Model>>;

    /// Reads the entity, returning `None` when the provider no longer reports
    /// it. `prior` holds the stored attributes when the entity is already
    /// tracked and is `None` during import.
    fn read<'a>(
        &'a self,
        id: &'a str,
        prior: Option<&'a Self::Model>,
    ) -> HandlerFuture<'a, Option<Self::Model>>;

    /// Applies `model` to an existing entity.
    ///
    /// The default implementation rejects in-place updates so callers
    /// replace the entity instead.
    fn update<'a>(&'a self, _id: &'a str, _model: &'a Self::Model) -> HandlerFuture<'a, Self::Model> {
        Box::pin(async {
            Err(ResourceError::Immutable {
                resource: Self::TYPE_NAME,
            })
        })
    }

    /// Deletes the entity and waits until it is gone.
    fn delete<'a>(&'a self, id: &'a str, model: &'a Self::Model) -> HandlerFuture<'a, ()>;
}

/// Locally tracked identity and attributes of one entity.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceState<M> {
    tracked: Option<Created<M>>,
}

impl<M> Default for ResourceState<M> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<M> ResourceState<M> {
    /// State with nothing tracked.
    #[must_use]
    pub const fn empty() -> Self {
        Self { tracked: None }
    }

    /// State tracking `model` under `id`.
    #[must_use]
    pub fn tracking(id: impl Into<String>, model: M) -> Self {
        Self {
            tracked: Some(Created {
                id: id.into(),
                model,
            }),
        }
    }

    /// Identifier of the tracked entity.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.tracked.as_ref().map(|entry| entry.id.as_str())
    }

    /// Attributes of the tracked entity.
    #[must_use]
    pub fn model(&self) -> Option<&M> {
        self.tracked.as_ref().map(|entry| &entry.model)
    }

    /// Returns true when an entity is tracked.
    #[must_use]
    pub const fn is_tracked(&self) -> bool {
        self.tracked.is_some()
    }

    fn clear(&mut self) {
        self.tracked = None;
    }
}

/// Runs `work` inside a span tagged with the resource type and a fresh
/// log id, logging the elapsed time on completion.
async fn traced<T, Fut>(resource: &'static str, action: &'static str, work: Fut) -> Result<T, ResourceError>
where
    Fut: Future<Output = Result<T, ResourceError>>,
{
    let log_id = Uuid::new_v4();
    let span = info_span!("resource", resource, action, %log_id);
    async move {
        let started = Instant::now();
        let result = work.await;
        let elapsed = started.elapsed();
        match &result {
            Ok(_) => debug!(?elapsed, "resource call finished"),
            Err(err) => error!(?elapsed, error = %err, "resource call failed"),
        }
        result
    }
    .instrument(span)
    .await
}

/// Creates the entity described by `model` and tracks it in `state`.
///
/// # Errors
///
/// Propagates the handler's create error; `state` is left untouched.
pub async fn create<H: ResourceHandler>(
    handler: &H,
    model: &H::Model,
    state: &mut ResourceState<H::Model>,
) -> Result<(), ResourceError> {
    traced(H::TYPE_NAME, "create", async {
        let created = handler.create(model).await?;
        debug!(id = %created.id, "resource created");
        state.tracked = Some(created);
        Ok(())
    })
    .await
}

/// Re-reads the tracked entity, clearing `state` when it has vanished.
///
/// # Errors
///
/// Propagates the handler's read error; `state` is left untouched.
pub async fn refresh<H: ResourceHandler>(
    handler: &H,
    state: &mut ResourceState<H::Model>,
) -> Result<(), ResourceError> {
    traced(H::TYPE_NAME, "read", async {
        let Some(tracked) = state.tracked.as_ref() else {
            return Ok(());
        };
        let Some(model) = handler.read(&tracked.id, Some(&tracked.model)).await? else {
            warn!(id = %tracked.id, "resource not found; removing it from state");
            state.clear();
            return Ok(());
        };
        if let Some(entry) = state.tracked.as_mut() {
            entry.model = model;
        }
        Ok(())
    })
    .await
}

/// Applies `model` to the tracked entity.
///
/// # Errors
///
/// Returns [`ResourceError::Untracked`] when nothing is tracked and
/// propagates the handler's update error otherwise.
pub async fn update<H: ResourceHandler>(
    handler: &H,
    model: &H::Model,
    state: &mut ResourceState<H::Model>,
) -> Result<(), ResourceError> {
    traced(H::TYPE_NAME, "update", async {
        let entry = state.tracked.as_mut().ok_or(ResourceError::Untracked {
            resource: H::TYPE_NAME,
        })?;
        entry.model = handler.update(&entry.id, model).await?;
        Ok(())
    })
    .await
}

/// Deletes the tracked entity, clearing `state` only once the delete
/// succeeded.
///
/// # Errors
///
/// Propagates the handler's delete error, including convergence timeouts;
/// `state` still tracks the entity afterwards.
pub async fn destroy<H: ResourceHandler>(
    handler: &H,
    state: &mut ResourceState<H::Model>,
) -> Result<(), ResourceError> {
    traced(H::TYPE_NAME, "delete", async {
        let Some(tracked) = state.tracked.as_ref() else {
            return Ok(());
        };
        handler.delete(&tracked.id, &tracked.model).await?;
        state.clear();
        Ok(())
    })
    .await
}

/// Builds state for an existing entity identified by `id`.
///
/// # Errors
///
/// Returns [`ResourceError::ImportNotFound`] when the provider does not
/// report the entity.
pub async fn import<H: ResourceHandler>(
    handler: &H,
    id: &str,
) -> Result<ResourceState<H::Model>, ResourceError> {
    traced(H::TYPE_NAME, "import", async {
        let model = handler
            .read(id, None)
            .await?
            .ok_or_else(|| ResourceError::ImportNotFound {
                resource: H::TYPE_NAME,
                id: id.to_owned(),
            })?;
        Ok(ResourceState::tracking(id, model))
    })
    .await
}
