//! Core identifiers, time, and storage layout constants.
//!
//! Every entity the group subsystem tracks is addressed by a small, copyable
//! integer identifier. The identifiers double as dense slots into the sparse
//! arrays used by the membership index and the property columns, so the
//! `index()` accessors here are the only place where an id becomes a `usize`.
//!
//! ## Layout
//!
//! Property columns are split into fixed-size chunks of [`COLUMN_CHUNK`] rows.
//! Each chunk carries an occupancy bitset of [`WORDS_PER_CHUNK`] `u64` words.
//! The sizes are validated at compile time.
//!
//! Group and person ids index sparse arrays directly, so both are capped at
//! [`MAX_ID`].

use std::fmt;

use serde::{Deserialize, Serialize};


/// Simulation time.
pub type Time = f64;

/// Number of bits in one occupancy word.
pub const WORD_BITS: usize = 64;

/// Rows per property column chunk.
pub const COLUMN_CHUNK: usize = 1024;

/// Occupancy words per property column chunk.
pub const WORDS_PER_CHUNK: usize = COLUMN_CHUNK / WORD_BITS;

const _: [(); 1] = [(); (COLUMN_CHUNK % WORD_BITS == 0) as usize];
const _: [(); 1] = [(); (COLUMN_CHUNK.is_power_of_two()) as usize];

/// Bits of an id usable as a dense slot.
pub const ID_INDEX_BITS: u32 = 32;

/// Largest group or person id the sparse arrays accept.
pub const MAX_ID: u64 = (1u64 << ID_INDEX_BITS) - 1;

const _: [(); 1] = [(); (ID_INDEX_BITS < 64) as usize];
const _: [(); 1] = [(); (MAX_ID as u128 <= usize::MAX as u128) as usize];

/// Default length of the weighted sampler's scratch buffers.
pub const DEFAULT_SAMPLER_CAPACITY: usize = 64;

macro_rules! integer_id {
    ($(#[$meta:meta])* $name:ident, $repr:ty, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $repr);

        impl $name {
            /// Dense slot for sparse-array addressing.
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "({})"), self.0)
            }
        }

        impl From<$repr> for $name {
            #[inline]
            fn from(value: $repr) -> Self {
                Self(value)
            }
        }
    };
}

integer_id!(
    /// Identifier of a group instance. Assigned from a counter that only
    /// increases; a value is never handed out twice.
    GroupId, u64, "Group"
);

integer_id!(
    /// Identifier of a simulated person. Owned by the person registry.
    PersonId, u64, "Person"
);

integer_id!(
    /// Identifier of a category of groups (household, school, ...).
    GroupTypeId, u32, "GroupType"
);

integer_id!(
    /// Identifier of a property, scoped to one group type.
    GroupPropertyId, u32, "GroupProperty"
);

/// Returns true if `id` fits the dense slot range.
#[inline]
pub fn id_in_range(id: u64) -> bool {
    id <= MAX_ID
}

impl GroupId {
    /// The id following this one, `None` on overflow.
    #[inline]
    pub fn checked_next(self) -> Option<GroupId> {
        self.0.checked_add(1).map(GroupId)
    }
}

/// Splits a dense row into its `(chunk, row-in-chunk)` position.
#[inline]
pub fn chunk_position(index: usize) -> (usize, usize) {
    (index / COLUMN_CHUNK, index % COLUMN_CHUNK)
}
