pub mod apply;
pub mod bdd;
pub mod builder;
pub mod count;
pub mod diagram;
pub mod intercut;
pub mod nested;
pub mod policy;
pub mod prod2u;
pub mod quantify;
pub mod reduce;
pub mod select;
pub mod zdd;

// Re-export commonly used types
pub use builder::{BddBuilder, ZddBuilder};
pub use diagram::{Bdd, BddKind, DiagramKind, Zdd, ZddKind};
pub use strata_core::{Error, ExecPolicy, Level, Ptr, Result};

/// Sets the engine's memory budget; see [`strata_io::memory::init`].
pub fn init(memory_bytes: u64) -> Result<()> {
    strata_io::memory::init(memory_bytes)
}

/// Releases the engine; see [`strata_io::memory::deinit`].
pub fn deinit() {
    strata_io::memory::deinit()
}
