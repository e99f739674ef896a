//! Slate evaluator -- environments, control forms, calls, units, modules.
//!
//! The back half of the pipeline: `slate-core` turns source text into
//! nested `Expr` lists; this crate reduces them. Evaluation is
//! single-threaded and cooperative (one async state machine, no
//! parallelism); hosts inject module loading, foreign functions, and
//! currency rates through the traits in `loader` and `units`.

pub mod call;
pub mod env;
pub mod eval;
pub mod globals;
pub mod loader;
pub mod range;
pub mod statement;
pub mod units;

pub use env::{Env, SharedEnv};
pub use eval::{DocumentEval, Interp};
pub use globals::{display, Natives};
pub use loader::{
    from_json, to_json, FfiTable, ForeignFn, MemoryLoader, ModuleHandle, ModuleLoader,
    RawForeignFn,
};
pub use range::EvalRange;
pub use units::{ConversionContext, RateStore, StaticRates};
