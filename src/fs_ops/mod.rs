//! Filesystem primitives: atomic rename, verified copy, relocation, free-name search.

mod atomic;
mod copy;
mod duplicate;
mod helpers;
mod io_copy;
mod lock;
mod meta;
mod relocate;
pub mod util;

pub use atomic::{OnExisting, RenameFn, rename_file, try_atomic_move, try_atomic_move_new};
pub use copy::copy_atomic;
pub use duplicate::find_sibling;
pub use helpers::io_error_with_help;
pub use io_copy::CopyResult;
pub use lock::{DestClaim, DestLocks};
pub use relocate::{Relocated, Via, relocate_with};
pub use util::{is_cross_device, is_within, normalize_lexically, relative_path, unique_temp_path};
