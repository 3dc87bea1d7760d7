//! Name -> operation registry for pipeline tokens.
//!
//! Operations are typed closures resolved at registration time. Both
//! synchronous and asynchronous forms share the same contract: take the
//! current state and an optional argument, return the next state.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use super::state::PipelineState;
use super::PipelineResult;

pub type SyncOperation =
    Arc<dyn Fn(PipelineState, Option<&str>) -> PipelineResult<PipelineState> + Send + Sync>;

pub type AsyncOperation = Arc<
    dyn Fn(PipelineState, Option<String>, CancellationToken) -> BoxFuture<'static, PipelineResult<PipelineState>>
        + Send
        + Sync,
>;

/// A token's callable.
#[derive(Clone)]
pub enum TokenOperation {
    Sync(SyncOperation),
    Async(AsyncOperation),
}

impl TokenOperation {
    /// Run against `state`. Async operations receive a clone of `cancel`.
    pub async fn invoke(
        &self,
        state: PipelineState,
        argument: Option<&str>,
        cancel: &CancellationToken,
    ) -> PipelineResult<PipelineState> {
        match self {
            Self::Sync(op) => op(state, argument),
            Self::Async(op) => op(state, argument.map(str::to_string), cancel.clone()).await,
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }
}

/// A registered pipeline operation.
#[derive(Clone)]
pub struct TokenInfo {
    pub name: String,
    pub description: String,
    pub operation: TokenOperation,
}

impl std::fmt::Debug for TokenInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenInfo")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("async", &self.operation.is_async())
            .finish()
    }
}

/// Case-sensitive token lookup that remembers registration order for listing.
#[derive(Default)]
pub struct TokenRegistry {
    order: Vec<String>,
    tokens: HashMap<String, TokenInfo>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a token. A replaced token keeps its listing slot.
    pub fn register(&mut self, info: TokenInfo) {
        if !self.tokens.contains_key(&info.name) {
            self.order.push(info.name.clone());
        }
        tracing::debug!(token = %info.name, "registered pipeline token");
        self.tokens.insert(info.name.clone(), info);
    }

    pub fn register_sync<F>(&mut self, name: &str, description: &str, op: F)
    where
        F: Fn(PipelineState, Option<&str>) -> PipelineResult<PipelineState> + Send + Sync + 'static,
    {
        self.register(TokenInfo {
            name: name.to_string(),
            description: description.to_string(),
            operation: TokenOperation::Sync(Arc::new(op)),
        });
    }

    pub fn register_async<F>(&mut self, name: &str, description: &str, op: F)
    where
        F: Fn(PipelineState, Option<String>, CancellationToken) -> BoxFuture<'static, PipelineResult<PipelineState>>
            + Send
            + Sync
            + 'static,
    {
        self.register(TokenInfo {
            name: name.to_string(),
            description: description.to_string(),
            operation: TokenOperation::Async(Arc::new(op)),
        });
    }

    /// Exact, case-sensitive lookup.
    pub fn get(&self, name: &str) -> Option<&TokenInfo> {
        self.tokens.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tokens.contains_key(name)
    }

    /// Names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The first `limit` tokens in registration order, and how many were left out.
    pub fn list(&self, limit: usize) -> (Vec<&TokenInfo>, usize) {
        let shown: Vec<&TokenInfo> = self
            .order
            .iter()
            .take(limit)
            .filter_map(|n| self.tokens.get(n))
            .collect();
        let hidden = self.order.len().saturating_sub(shown.len());
        (shown, hidden)
    }

    /// Human-readable listing, as shown by `list tokens`.
    pub fn render_listing(&self, limit: usize) -> String {
        let (shown, hidden) = self.list(limit);
        let mut out = format!("{} pipeline tokens:\n", self.len());
        for info in shown {
            out.push_str(&format!("  {:<16} {}\n", info.name, info.description));
        }
        if hidden > 0 {
            out.push_str(&format!("  ... and {hidden} more\n"));
        }
        out
    }
}
