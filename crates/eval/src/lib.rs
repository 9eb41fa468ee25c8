//! sqexport-eval: the evaluation engine boundary and a built-in reference
//! engine for it.
//!
//! The [`Engine`] trait is the only surface the export pipeline depends
//! on. [`Project`] implements it by parsing each source unit with
//! `sqexport-core` and evaluating it with a tree-walking interpreter.
//!
//! Results are tagged [`Value`]s; distribution values are [`Dist`]s that
//! can be sampled on demand through a [`Sampler`].

mod builtins;
pub mod dist;
pub mod error;
mod interp;
pub mod project;
mod scope;
pub mod value;

pub use dist::{Dist, Sampler};
pub use error::EvalError;
pub use project::{Engine, Environment, Project};
pub use value::{Lambda, Value};
