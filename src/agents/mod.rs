//! Downstream coordination agents
//!
//! Everything past the decision engine lives here: the roadmap single
//! writer, progress tracking, per-user compilers, the edit coordinator, the
//! code extractor, and the [`AgentManager`] composition root that wires the
//! whole system together.

pub mod compiler;
pub mod editor;
pub mod extractor;
pub mod manager;
pub mod progress;
pub mod roadmap;

pub use compiler::UserCompiler;
pub use editor::EditCoordinator;
pub use extractor::CodeExtractor;
pub use manager::{AgentManager, AgentStatus};
pub use progress::ProgressCoordinator;
pub use roadmap::RoadmapOrchestrator;
