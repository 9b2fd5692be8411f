//! Extension point helpers shared by dyn-compatible async traits.

use std::future::Future;
use std::pin::Pin;

/// Boxed `Send` future returned by dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
