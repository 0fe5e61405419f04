//! The indexed-alignment reader (§6 external interface): random access by
//! contig range, yielding records with CIGAR, sequence, strand, reference
//! start and read name.

pub mod reader;
pub mod record;

pub use reader::AlignmentIndex;
pub use record::{CigarOp, RawAlignedRead};
