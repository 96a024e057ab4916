//! Per-gene worker pool
//!
//! Every per-gene loop in the pipeline runs through [`GeneExecutor::map_genes`].
//! Results come back in gene order regardless of how work was scheduled, and
//! any reduction over genes is done by the caller on the collected vector.

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::error::{EdgerError, Result};

/// A dedicated rayon pool for gene-level work
pub struct GeneExecutor {
    pool: ThreadPool,
}

impl GeneExecutor {
    /// Build a pool with `threads` workers (0 = one per logical CPU)
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("edger-worker-{}", i))
            .build()
            .map_err(|e| EdgerError::InvalidConfig {
                reason: format!("could not start worker pool with {} threads: {}", threads, e),
            })?;
        log::debug!("Gene worker pool started with {} threads", pool.current_num_threads());
        Ok(Self { pool })
    }

    /// Number of worker threads in the pool
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `f` for every gene index in `0..n_genes` and collect in index order
    pub fn map_genes<T, F>(&self, n_genes: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        self.pool
            .install(|| (0..n_genes).into_par_iter().map(f).collect())
    }
}

impl std::fmt::Debug for GeneExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneExecutor")
            .field("threads", &self.threads())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_genes_preserves_order() {
        let exec = GeneExecutor::new(4).unwrap();
        let out = exec.map_genes(1000, |i| i * 2);
        assert_eq!(out.len(), 1000);
        assert!(out.iter().enumerate().all(|(i, &v)| v == i * 2));
    }

    #[test]
    fn test_thread_count() {
        let exec = GeneExecutor::new(2).unwrap();
        assert_eq!(exec.threads(), 2);
    }
}
