//! Rule compilation and mining engine.
//!
//! The engine is split into focused submodules under `src/engine/` while the
//! public paths stay flat (for example `crate::engine::Metric` and
//! `crate::engine::translate`).
//!
//! ## How the parts work together
//!
//! ```text
//! template text ── parse_rule ─────────────┐       (grammar.rs)
//!                                          v
//!                            wildcards + substitutions (search.rs)
//!                              - column regexes vs schema
//!                              - value regexes vs distinct values
//!                              - then-part narrowed by if-part mask
//!                                          │ one RuleAst per combination
//!                                          v
//!                               canonical_key  (canonical.rs)
//!                                 - dedup within the run
//!                                          │
//!                                          v
//!                                 translate  (translate.rs)
//!                                   - reformulate / tolerance tags
//!                                   - validation
//!                                          │
//!                                          v
//!                     Translation::execute (translate.rs + interp.rs)
//!                       - lazy X / Y masks, per-partition counts or rows
//!                                          │
//!                                          v
//!                       calculate + filter  (metrics.rs, miner.rs)
//!                                          │
//!                                          v
//!                                      Vec<Rule>
//! ```
//!
//! ## Responsibilities by module
//!
//! - `grammar.rs`: lexer and packrat parser for rule text.
//! - `canonical.rs`: dedup keys with commutative operands sorted.
//! - `partition.rs`: the eight partition variables and their bitflag sets.
//! - `metrics.rs`: association metrics over partition counts.
//! - `tolerance.rs`: magnitude-bucketed rounding tolerance.
//! - `interp.rs`: typed interpreter evaluating expressions against a table.
//! - `translate.rs`: rule → partition operations.
//! - `search.rs`: wildcard discovery and Cartesian enumeration.
//! - `miner.rs`: the mining and evaluation passes and their statistics.
//!
//! ## Debugging
//!
//! The engine logs through the `log` facade. With `env_logger`, set
//! `RUST_LOG=rulequarry=debug` to see every duplicate, inapplicable and
//! rejected candidate, or `trace` for state transitions.

#[path = "engine/canonical.rs"]
mod canonical;
#[path = "engine/grammar.rs"]
mod grammar;
#[path = "engine/interp.rs"]
mod interp;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/miner.rs"]
mod miner;
#[path = "engine/partition.rs"]
mod partition;
#[path = "engine/search.rs"]
mod search;
#[path = "engine/tolerance.rs"]
mod tolerance;
#[path = "engine/translate.rs"]
mod translate;

#[allow(unused_imports)]
pub use canonical::{canonical_expr, canonical_key};
#[allow(unused_imports)]
pub use grammar::{parse_condition, parse_rule};
#[allow(unused_imports)]
pub use metrics::{Metric, MetricValues, calculate, required_variables};
#[allow(unused_imports)]
pub use miner::{MINED, MiningStats};
#[allow(unused_imports)]
pub use partition::{Partition, PartitionCounts, PartitionSet};
#[allow(unused_imports)]
pub use tolerance::{DEFAULT_KEY, ToleranceBand, ToleranceTable};
#[allow(unused_imports)]
pub use translate::{OutputMode, Outcome, Outcomes, Selection, TranslateContext, Translation, translate};

pub(crate) use miner::{Miner, evaluate_rules};
