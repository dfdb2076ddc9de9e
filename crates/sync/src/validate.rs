//! Header consensus validation, as an external collaborator. Which rule set
//! applies is determined by the header's block number (the fork schedule);
//! the core only needs to be able to ask "is this header valid given its
//! parent", not to know anything about the EVM or fork activation heights.

use lcsync_common::BlockHeader;

use crate::error::ValidationError;

pub trait HeaderValidator: Send + Sync {
    /// Validates `header` against its already-persisted `parent`, selecting
    /// the applicable consensus rule set by `header.block_number`.
    fn validate_header(
        &self,
        header: &BlockHeader,
        parent: &BlockHeader,
    ) -> Result<(), ValidationError>;
}
