//! Windows implementation: named sections, the low-level keyboard hook and
//! process/key-state queries.

mod listen;
mod shm;
mod system;

pub use listen::run_hook_host;
pub use shm::{MappedView, create_mapping, open_mapping};
pub use system::{foreground_executable, numlock_off};
