//! Keyring models: raw packet lists as decoded and their canonical form.

mod canonical;
mod raw;

pub use canonical::{CanonicalizedKeyRing, SubkeyInfo, UserAttributeInfo, UserIdInfo};
pub use raw::{KeyRingIterator, RawKeyRing};

pub(crate) use raw::{group_packets, ComponentId, Group, Grouped};
