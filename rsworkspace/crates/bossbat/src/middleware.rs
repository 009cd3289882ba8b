//! QA chain: wrappers composed around every job's work.
//!
//! ```rust,no_run
//! # async fn example(boss: &bossbat::Bossbat<bossbat::RedisStore>) {
//! boss.qa(|name, _definition, next: bossbat::Next| async move {
//!     tracing::info!(job = %name, "starting");
//!     let result = next.run().await;
//!     tracing::info!(job = %name, ok = result.is_ok(), "finished");
//!     result
//! });
//! # }
//! ```

use std::future::Future;
use std::sync::{Arc, RwLock};

use crate::job::{BoxFuture, JobDefinition, WorkResult};

/// Wraps one occurrence of a job.
///
/// Call [`Next::run`] to continue the chain, or return without calling it to
/// short-circuit: the job's work then never runs.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, name: String, definition: JobDefinition, next: Next) -> BoxFuture<WorkResult>;
}

impl<F, Fut> Middleware for F
where
    F: Fn(String, JobDefinition, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = WorkResult> + Send + 'static,
{
    fn handle(&self, name: String, definition: JobDefinition, next: Next) -> BoxFuture<WorkResult> {
        Box::pin(self(name, definition, next))
    }
}

type Continuation = Box<dyn FnOnce(JobDefinition) -> BoxFuture<WorkResult> + Send>;

/// The rest of the chain, ending with the job's work.
pub struct Next {
    definition: JobDefinition,
    continuation: Continuation,
}

impl Next {
    fn new<F>(definition: JobDefinition, continuation: F) -> Self
    where
        F: FnOnce(JobDefinition) -> BoxFuture<WorkResult> + Send + 'static,
    {
        Self {
            definition,
            continuation: Box::new(continuation),
        }
    }

    /// Run the inner layers with the definition this layer received.
    pub fn run(self) -> BoxFuture<WorkResult> {
        (self.continuation)(self.definition)
    }

    /// Run the inner layers with a replacement definition.
    pub fn run_with(self, definition: JobDefinition) -> BoxFuture<WorkResult> {
        (self.continuation)(definition)
    }

    pub fn definition(&self) -> &JobDefinition {
        &self.definition
    }
}

/// Fold `layers` right-to-left around the work of `definition`.
///
/// The first layer is outermost: its pre-logic runs first and its post-logic last.
pub fn compose(layers: &[Arc<dyn Middleware>], name: String, definition: JobDefinition) -> Next {
    let work_name = name.clone();
    let terminal = Next::new(definition.clone(), move |def: JobDefinition| def.perform(work_name));

    layers.iter().rev().fold(terminal, |inner, layer| {
        let layer = Arc::clone(layer);
        let name = name.clone();
        Next::new(definition.clone(), move |def: JobDefinition| {
            let mut inner = inner;
            inner.definition = def.clone();
            layer.handle(name, def, inner)
        })
    })
}

/// Process-wide, ordered list of registered middleware.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    layers: Arc<RwLock<Vec<Arc<dyn Middleware>>>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<M: Middleware>(&self, middleware: M) {
        self.layers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(middleware));
    }

    pub fn len(&self) -> usize {
        self.layers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build the chain for one occurrence from the layers registered right now.
    pub fn compose(&self, name: String, definition: JobDefinition) -> Next {
        let layers = self.layers.read().unwrap_or_else(|e| e.into_inner()).clone();
        compose(&layers, name, definition)
    }
}
