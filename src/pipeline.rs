pub mod chain;
pub mod config;
pub mod context;
pub mod declaration;
pub mod error_handler;
pub mod processing;
pub mod registry;
pub mod stage;
pub mod validity;

pub use chain::Chain;
pub use config::PipelineConfig;
pub use context::{Environment, ExecutionStats, Parameters, Request, SetupContext};
pub use declaration::{PipelineDeclaration, StageSpec};
pub use error_handler::{DeclaredErrorHandler, ErrorHandler, Notification};
pub use processing::{PipelineState, ProcessingPipeline};
pub use registry::StageRegistry;
pub use stage::{Generator, Serializer, Stage, StageDeclaration, StageRole, Transformer};
pub use validity::{CacheInfo, Cacheable, Validity, ValidityState};
