pub mod background;
pub mod cache;
pub mod engine;
pub mod events;
pub mod filter;
pub mod monitor;
pub mod provider;
pub mod query;
pub mod record;
pub mod resources;
pub mod source;
pub mod viewport;

pub use background::{BackgroundProcessor, BackgroundTask, CancelOutcome, TaskId, TaskInfo, TaskPriority, TaskState};
pub use cache::{CacheManager, CacheStats, CacheWeight};
pub use engine::{CacheKey, FilterEngine, FilteredResults};
pub use events::{EngineEvent, EventBus, EventKind, SubscriptionId, TaskOutcome};
pub use filter::{Filter, FilterGroup, GroupKind, Sorter};
pub use monitor::{OpStats, PerformanceMonitor, Regression, TimingGuard};
pub use provider::{load_into, resync_task, DataProvider, StaticProvider};
pub use query::{ParsedQuery, QueryLanguageParser};
pub use record::{Annotation, Priority, Record, Status, Task};
pub use resources::{BufferPool, PoolStats, ResourceManager};
pub use source::VirtualDataSource;
pub use tasklens_common::{Result, TaskLensError};
pub use viewport::{
    ItemRenderer, LineBuffer, LineStyle, RenderBuffer, RenderError, RenderStats, StyledLine,
    VirtualScrollingViewport,
};
