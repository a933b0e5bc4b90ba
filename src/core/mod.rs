//! 编排核心：动作模型、上下文累积、回退判定、执行状态与执行图，以及从配置组装服务的构建器

pub mod action;
pub mod builder;
pub mod context;
pub mod error;
pub mod fallback;
pub mod graph;
pub mod state;

pub use action::{default_plan, plan_with_web_step, Action, Plan, RetrieveLimits};
pub use builder::{create_llm_from_config, QaServiceBuilder};
pub use context::{ContextAccumulator, ContextChunk, SourceSet, WEB_SOURCE};
pub use error::QaError;
pub use fallback::{FallbackController, DEFAULT_INSUFFICIENCY_PHRASES};
pub use graph::{next_node, ExecutionGraph, GraphOutcome};
pub use state::{ExecutionState, GraphNode};
