//! sqexport-codegen: turns a JSON parameter object into modeling-language
//! source that binds one `$`-prefixed variable per top-level key.
//!
//! The generated text is registered as its own source unit ahead of the
//! user's model so the model can refer to `$key` directly.

pub mod params;

pub use params::{
    encode_params, encode_params_with, encode_value, is_valid_key, CodegenError, EncodeOptions,
    NO_VALID_IMPORTS,
};
