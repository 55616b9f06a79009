pub use executor::Executor;
pub use translate_and_validate::{QueryInfo, TranslateAndValidate};

mod executor;
mod translate_and_validate;

// Query flow: TranslateAndValidate turns the parsed statement into an
// analyzed QueryInfo, the optimizer rewrites it into a plan tree and
// lowers that to a PhysicalPlan, and Executor turns the physical plan
// into a tree of OpIterators and drives it.
