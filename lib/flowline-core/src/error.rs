//! Shared error-context alias used at component boundaries.

use rootcause::Report;

/// Workspace-wide result alias. `C` is the context type attached via
/// [`rootcause::Report::context`]; components that don't need a typed
/// context default it to `()`.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
