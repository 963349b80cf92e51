//! Pipeline stages between a captured frame and an upload.
//!
//! Each submodule implements exactly one transformation step, so every stage
//! can be tested without a network or a camera.
//!
//! ## Data Flow
//!
//! ```text
//! frame ──▶ filter ──▶ encode ──▶ queue … ──▶ assemble ──▶ sink
//! (pixels)  (mono)     (PNG)                 (PDF/pages)
//! ```
//!
//! 1. [`filter`]   — optional monochrome transform (luma + threshold)
//! 2. [`encode`]   — PNG bytes for the queue; JPEG bytes for PDF embedding
//! 3. [`naming`]   — pure artifact file-name derivation
//! 4. [`assemble`] — turn a queue snapshot into a [`assemble::BatchArtifact`]

pub mod assemble;
pub mod encode;
pub mod filter;
pub mod naming;
