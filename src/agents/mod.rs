//! 执行图各节点背后的代理：规划、检索、综合

pub mod planner;
pub mod reader;
pub mod retriever;

pub use planner::{normalize_plan, PlanGenerator, DEFAULT_PLANNER_PROMPT};
pub use reader::{Reader, DEFAULT_READER_PROMPT};
pub use retriever::{augment_query, RetrieverAgent};
