/*!
 * Live caption preview.
 *
 * - `cache`: bounded, time-expiring artifact store
 * - `coordinator`: debounced, cancellable render requests
 */

pub use self::cache::{CacheStats, PreviewCache};
pub use self::coordinator::{ChangeOutcome, PreviewCoordinator, PreviewState, PreviewStatus};

pub mod cache;
pub mod coordinator;
