//! Function signature optimizations over the ownership-SSA IR.
//!
//! Currently one transform: [`existential`] specialization, which turns
//! protocol-boxed parameters into generic ones so that later inlining and
//! devirtualization can see through them.
//!
//! # Crate Dependencies
//!
//! `ossa_opt` depends only on `ossa_ir` for the IR, the type pool and the
//! function table. It runs no pass scheduling of its own: callers pick the
//! candidate and the arguments to specialize.

pub mod existential;

#[cfg(test)]
mod test_helpers;

use std::sync::Once;

pub use existential::descriptor::{
    check_candidate, ArgumentDescriptor, Candidate, CandidateError, ExistentialArgDescriptor,
};
pub use existential::{
    specialize_existential_args, ExistentialTransform, Specialization, TransformOptions,
};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing subscriber for debug output.
///
/// Reads the `RUST_LOG` environment variable to configure log levels, for
/// example `RUST_LOG=ossa_opt=debug`. Does nothing when `RUST_LOG` is unset.
/// Safe to call more than once.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
