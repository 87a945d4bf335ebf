//! Derived views over a parsed container.
//!
//! Cross-references between entities, labelled hex windows, and layout
//! data for presentation. Nothing here mutates the model.

pub mod hex_range;
pub mod layout;
pub mod xrefs;
