//! Compile-time configuration constants (spec.md §6 "Configuration constants").

pub const FRAMES_MAX: usize = 512;
pub const STACK_MAX: usize = FRAMES_MAX * (u8::MAX as usize + 1);
pub const MAX_PARAMETERS: usize = 255;
pub const MAX_ARGUMENTS: usize = 255;
pub const INTERPOLATION_MAX_DEPTH: usize = 8;
pub const MAX_EXCEPTION_HANDLERS: usize = 16;
pub const TABLE_MAX_LOAD: f64 = 6.0 / 7.0;
pub const GC_GROWTH_FACTOR: usize = 2;
pub const DEFAULT_NEXT_GC: usize = 1024 * 1024;
