pub mod dispatcher;
pub mod document;
pub mod errors;
pub mod registry;
pub mod reloadable;
pub mod source;

pub use dispatcher::{
    handler_fn, ConfigUpdate, DispatchEvent, DispatchReport, DispatcherBuilder, DispatcherState,
    HandlerOutcome, OutcomeResult, ReloadDispatcher, ReloadHandler, ReloadResult, ReloadStatus,
    StatsSnapshot,
};
pub use document::{decode_section, ConfigPath, Document, DocumentFormat, DocumentLoader, FileLoader, Node};
pub use errors::{
    ConfigError, DispatchError, DocumentError, HotReloadError, ReloadError, ReloadErrorKind, SourceError,
};
pub use registry::{Subscription, SubscriptionRegistry};
pub use reloadable::{AbsentPolicy, LiveConfig, ReloadableComponent, ReloadableSubscriber};
pub use source::{
    ChangeSignal, EventSink, EventSource, ManualSource, ManualTrigger, NotifySource, PollSource,
    SignalOrigin,
};
#[cfg(unix)]
pub use source::SignalSource;
