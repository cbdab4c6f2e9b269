//! Random number streams.
//!
//! The simulation draws from one global stream and any number of named
//! streams. All of them share the configured seed and differ by ChaCha
//! stream number, so adding a named stream never perturbs the others.
//!
//! A [`RandomState`] records the word position of every stream; restoring it
//! continues each sequence exactly where the checkpoint left it.

use std::fmt;

use indexmap::IndexMap;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};


/// Uniform draws used by the sampler.
pub trait RandomSource {
    /// Uniform double in `[0, 1)`.
    fn next_f64(&mut self) -> f64;

    /// Uniform index in `0..bound`. `bound` must be positive.
    fn next_index(&mut self, bound: usize) -> usize;
}

impl<R: RngCore> RandomSource for R {
    #[inline]
    fn next_f64(&mut self) -> f64 {
        self.gen::<f64>()
    }

    #[inline]
    fn next_index(&mut self, bound: usize) -> usize {
        self.gen_range(0..bound)
    }
}

/// Identifier of a named random stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RandomStreamId(pub u32);

impl fmt::Display for RandomStreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stream({})", self.0)
    }
}

/// Checkpoint of every stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomState {
    pub seed: u64,
    pub global: u128,
    pub named: Vec<(RandomStreamId, u128)>,
}

const GLOBAL_STREAM: u64 = 0;

fn stream_rng(seed: u64, stream: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream);
    rng
}

/// The simulation-global stream plus named streams.
#[derive(Clone, Debug)]
pub struct RandomStreams {
    seed: u64,
    global: ChaCha8Rng,
    named: IndexMap<RandomStreamId, ChaCha8Rng>,
}

impl RandomStreams {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            global: stream_rng(seed, GLOBAL_STREAM),
            named: IndexMap::new(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn global(&mut self) -> &mut ChaCha8Rng {
        &mut self.global
    }

    /// Named stream `id`, created on first use.
    pub fn stream(&mut self, id: RandomStreamId) -> &mut ChaCha8Rng {
        let seed = self.seed;
        self.named
            .entry(id)
            .or_insert_with(|| stream_rng(seed, u64::from(id.0) + 1))
    }

    /// Stream `id` if given, otherwise the global stream.
    pub fn select(&mut self, id: Option<RandomStreamId>) -> &mut ChaCha8Rng {
        match id {
            Some(id) => self.stream(id),
            None => &mut self.global,
        }
    }

    pub fn checkpoint(&self) -> RandomState {
        RandomState {
            seed: self.seed,
            global: self.global.get_word_pos(),
            named: self
                .named
                .iter()
                .map(|(&id, rng)| (id, rng.get_word_pos()))
                .collect(),
        }
    }

    pub fn restore(state: &RandomState) -> Self {
        let mut streams = Self::new(state.seed);
        streams.global.set_word_pos(state.global);
        for &(id, position) in &state.named {
            streams.stream(id).set_word_pos(position);
        }
        streams
    }
}
