//! StreamHouse HAVING Plan
//!
//! Provides the post-aggregation filtering stage of the StreamHouse streaming
//! SQL engine, and the typed-value expression evaluator it runs on.
//! The stage sits after the window, join and group-by stages of a rule and
//! drops whatever fails the HAVING condition.
//!
//! ## Supported SQL
//!
//! ```sql
//! -- Aggregate over a whole window
//! SELECT id1 FROM src1 HAVING avg(id1) > 1;
//!
//! -- Per-group filtering
//! SELECT id1 FROM src1 GROUP BY TUMBLINGWINDOW(ss, 10), f1 HAVING f1 = "v2";
//!
//! -- Join output, qualified fields and aggregates over the join set
//! SELECT count(*) AS c FROM test INNER JOIN test1 ON test.id = test1.id
//! GROUP BY TUMBLINGWINDOW(ss, 10), test1.color
//! HAVING test.a > 100 AND count(*) >= 2;
//! ```
//!
//! ## Usage
//!
//! ```
//! use streamhouse_plans::{Batch, HavingPlan, Message, StageContext, Tuple, WindowTuples, WindowTuplesSet};
//!
//! let plan = HavingPlan::from_sql("SELECT id1 FROM src1 HAVING sum(id1) > 1").unwrap();
//! let tuples = [1, 2, 5]
//!     .into_iter()
//!     .map(|id| Tuple::new("src1", [("id1", id)].into_iter().collect::<Message>()))
//!     .collect();
//! let batch = Batch::Window(WindowTuplesSet(vec![WindowTuples {
//!     emitter: "src1".to_string(),
//!     tuples,
//! }]));
//! assert_eq!(plan.apply(&StageContext::background(), batch.clone()), Some(batch));
//! ```
//!
//! ## Limitations
//!
//! - Only the HAVING clause is interpreted; windowing, joins and grouping
//!   happen in upstream stages
//! - Aggregates take a single argument; no DISTINCT
//! - No subqueries

mod context;
mod error;
mod evaluator;
mod expr;
mod functions;
mod having;
mod parser;
mod pipeline;
mod plan;
mod types;
mod value;
mod valuer;

pub use context::StageContext;
pub use error::PlanError;
pub use evaluator::Evaluator;
pub use expr::{BinaryOp, Expr, FieldRef};
pub use functions::{call_scalar, is_aggregate, Accumulator, AggregateFunction};
pub use having::HavingPlan;
pub use parser::{parse_condition, parse_having};
pub use pipeline::{spawn_stage, StageConfig, StageHandle, StageStats};
pub use plan::{Plan, PlanChain};
pub use types::*;
pub use value::Value;
pub use valuer::AggregateScope;

/// Result type for plan operations
pub type Result<T> = std::result::Result<T, PlanError>;
