//! Units of resolved work waiting to be committed to the immediate context.

mod command_list;
mod commit_step;

pub use command_list::{CommandList, CommandListId, CommandListMetrics, CommitProgress};
pub use commit_step::{CommitStep, DeferredCopy, DeferredDefragCopy};
