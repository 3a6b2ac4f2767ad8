pub mod accumulate;
pub mod blit;
pub mod trace;

pub use accumulate::AccumulatePass;
pub use blit::BlitPass;
pub use trace::{TraceBindings, TracePass};
