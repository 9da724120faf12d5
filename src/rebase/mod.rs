pub mod cancel;
pub mod collaborators;
pub mod inspector;
pub mod machine;
pub mod model;
pub mod notifier;
pub mod orchestrator;
pub mod prompt;
pub mod refresher;
pub mod resolver;
pub mod saver;
pub mod store;

#[cfg(test)]
mod testing;

pub use cancel::CancellationToken;
pub use collaborators::{
    ChangeSaver, Collaborators, CommandRunner, ConflictResolver, Notifier, Prompter, Refresher,
    Report, ReportAction, ReportLevel, ResolveResult, ResourceInspector, StateStore,
};
pub use inspector::GitInspector;
pub use model::{
    OperationSpec, OrchestrationState, OutcomeKind, Resource, ResourceId, ResourceOutcome,
    ResumeMode, ResumePoint, RunSummary, SkippedItem, SuccessType,
};
pub use notifier::{ConsoleNotifier, MemoryNotifier};
pub use orchestrator::{AbortSummary, RebaseOptions, RebaseOrchestrator};
pub use prompt::{DialoguerPrompter, FixedAnswer};
pub use refresher::IndexRefresher;
pub use resolver::IndexConflictResolver;
pub use saver::StashSaver;
pub use store::{FileStateStore, MemoryStateStore};
