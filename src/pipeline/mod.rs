//! Pipeline stages for document structure normalization.
//!
//! Each submodule implements exactly one transformation step. Pages only
//! pass through the stages their backend needs.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ probe ──▶ {cloud | direct} ──▶ page ──────────────────────────▶ PageOutcome
//! (bytes)  (OCR?)      (backend)           ├─ merge     (direct only)
//!                                          ├─ associate (cloud only)
//!                                          ├─ segment
//!                                          └─ tables
//! ```
//!
//! 1. [`input`]: read a path or download a URL, check the `%PDF` magic
//! 2. [`probe`]: decide whether the text layer can be trusted
//! 3. [`merge`]: fold fragment blocks into their successor
//! 4. [`associate`]: recover which cloud lines make up each paragraph
//! 5. [`segment`]: sentence splitting with list/abbreviation corrections
//! 6. [`tables`]: normalize table, cell and key/value geometry
//! 7. [`page`]: run the above for one page

pub mod associate;
pub mod input;
pub mod merge;
pub mod page;
pub mod probe;
pub mod segment;
pub mod tables;
