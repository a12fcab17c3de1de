//! Value types shared across the client.

mod hsbk;
mod sequence;
mod source;

pub use hsbk::Hsbk;
pub use sequence::SequenceCounter;
pub use source::Source;
