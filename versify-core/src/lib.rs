//! # versify-core
//!
//! Inference library behind the `caption` and `verse` command-line tools,
//! built on the [Candle](https://github.com/huggingface/candle) framework.
//!
//! Each tool wraps a single heavyweight model call behind a fixed JSON
//! request/reply contract: an image path goes in and a caption comes out, or
//! a caption goes in and a short poem comes out. The handler logic is written
//! against small traits so it can be exercised without loading checkpoints.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |---|---|
//! | [`adapter`] | Request/reply types and the handler logic for both tools |
//! | [`models`] | Candle model wrappers (BLIP captioner, Qwen2 generator) |
//! | [`generation`] | Sampling configuration for text generation |
//! | [`error`] | Error taxonomy shared by the library |
//! | [`utils`] | Device selection and Hugging Face Hub file resolution |

pub mod adapter;
pub mod error;
pub mod generation;
pub mod models;
pub mod utils;

pub use error::AdapterError;
