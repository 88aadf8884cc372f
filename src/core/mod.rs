//! Core XML parsing primitives
//!
//! This module contains the fundamental building blocks for reading an export:
//! - Scanner: SIMD-accelerated delimiter detection using memchr
//! - Entities: XML entity decoding with Cow (zero-copy when possible)
//! - Attributes: Attribute parsing and extraction

pub mod attributes;
pub mod entities;
pub mod scanner;
