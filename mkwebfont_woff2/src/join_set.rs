use anyhow::Result;
use tokio::task::JoinHandle;

/// A set of blocking tasks whose results are collected in spawn order.
pub struct JoinSet<T> {
    joins: Vec<JoinHandle<Result<T>>>,
}
impl<T: Send + 'static> JoinSet<T> {
    pub fn new() -> Self {
        JoinSet { joins: Vec::new() }
    }

    pub fn spawn_blocking(&mut self, func: impl FnOnce() -> Result<T> + Send + 'static) {
        let span = tracing::Span::current();
        self.joins
            .push(tokio::task::spawn_blocking(move || span.in_scope(func)));
    }

    pub async fn join(self) -> Result<Vec<T>> {
        let mut result = Vec::new();
        for join in self.joins {
            result.push(join.await??)
        }
        Ok(result)
    }
}
