//! Proptest strategies for ClaimTrie domain types.
//!
//! Reusable generators for property-based testing across crates. Strategies
//! produce well-formed domain values while exploring edge cases through
//! random variation.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod strategies;
