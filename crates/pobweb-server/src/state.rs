use std::sync::Arc;

use pobweb_vfs::VfsService;

use crate::auth::TokenValidator;

/// Shared by every request; both halves are cheap to clone.
#[derive(Clone, Debug)]
pub struct AppState {
    pub vfs: VfsService,
    pub validator: Arc<TokenValidator>,
}

impl AppState {
    pub fn new(vfs: VfsService, validator: TokenValidator) -> Self {
        Self {
            vfs,
            validator: Arc::new(validator),
        }
    }
}
