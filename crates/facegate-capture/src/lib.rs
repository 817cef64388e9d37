//! facegate-capture — Image capture for the enrollment engine.
//!
//! Every source hands out one fully decoded RGB bitmap with non-zero
//! dimensions. Anything else fails fast with a [`CaptureError`].

pub mod frame;
pub mod source;

pub use frame::{Frame, FrameError};
pub use source::{CaptureError, FileSource, ImageSource, MemorySource};
