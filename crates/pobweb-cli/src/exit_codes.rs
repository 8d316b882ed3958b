//! Process exit codes. Scripts driving releases branch on these.

use pobweb_packer::PackError;

pub const SUCCESS: i32 = 0;
pub const INTERNAL_ERROR: i32 = 1; // Unexpected failure, local output I/O
pub const CONFIG_ERROR: i32 = 2; // Bad tag, product, config or store URL
pub const SOURCE_TREE_ERROR: i32 = 3; // Missing or unreadable checkout
pub const TRANSPORT_ERROR: i32 = 4; // Clone or upload failed; retry is safe

/// Exit code for a failed command, from the first pipeline error in the chain.
pub fn for_error(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<PackError>())
        .map_or(INTERNAL_ERROR, PackError::exit_code)
}
