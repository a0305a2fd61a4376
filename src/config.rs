use serde::{Deserialize, Serialize};

use crate::utils::default_n_workers;
use crate::{getter_fn, with_field_fn};

/// Default number of rows per streamed chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

/// Runtime configuration of the pipelines.
///
/// `chunk_size` bounds the rows held in memory by every streaming stage and
/// is also the block size of tables written to the store. `n_workers` is the
/// size of the pool built for each statistics chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquireConfig {
    chunk_size: usize,
    n_workers:  usize,
}

impl Default for SquireConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            n_workers:  default_n_workers(),
        }
    }
}

impl SquireConfig {
    getter_fn!(chunk_size, usize);
    getter_fn!(n_workers, usize);
    with_field_fn!(chunk_size, usize);
    with_field_fn!(n_workers, usize);

    /// Replaces zero values with the defaults.
    pub fn normalized(self) -> Self {
        let default = Self::default();
        Self {
            chunk_size: if self.chunk_size == 0 {
                default.chunk_size
            }
            else {
                self.chunk_size
            },
            n_workers:  if self.n_workers == 0 {
                default.n_workers
            }
            else {
                self.n_workers
            },
        }
    }
}
