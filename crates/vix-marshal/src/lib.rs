//!
//! # VIX Marshal
//!
//! Marshaling layer between the handle based, asynchronous job API of the VIX virtualization
//! library and typed Rust values.
//!
//! Every operation against the virtualization engine hands back an opaque job handle, results
//! are pulled out of the job afterwards, field by field, by property identifier. This crate
//! covers that second half:
//! - waiting for a job and decoding the fields it produced, all of them or none;
//! - decoding records of jobs producing a listing, one index at a time;
//! - relaying events the engine fires on its own thread into host code;
//! - owning the buffers the engine allocates and releasing each exactly once;
//! - mapping native error codes into a host side taxonomy.
//!
//! The native library sits behind the [`Engine`] trait. [`MemoryEngine`] implements it in
//! process memory, the `native` feature links the real library through [`NativeEngine`].
//!
//! ## Basic example
//!
//! ```
//! use std::sync::Arc;
//!
//! use vix_marshal::{
//! 	memory::MemoryValue, model::FILE_LISTING, GuestFile, Marshaler, MemoryEngine, PropertyId,
//! };
//!
//! let engine = Arc::new(MemoryEngine::new());
//! let job = engine
//! 	.job()
//! 	.record([
//! 		(PropertyId::JOB_RESULT_ITEM_NAME, MemoryValue::from("notes.txt")),
//! 		(PropertyId::JOB_RESULT_FILE_SIZE, MemoryValue::from(4096i64)),
//! 		(PropertyId::JOB_RESULT_FILE_FLAGS, MemoryValue::from(0i32)),
//! 		(PropertyId::JOB_RESULT_FILE_MOD_TIME, MemoryValue::from(1_700_000_000i64)),
//! 	])
//! 	.finish();
//!
//! let marshaler = Marshaler::new(engine);
//! marshaler.wait(job, &Default::default()).unwrap();
//!
//! let file = GuestFile::try_from(marshaler.decode_at(job, 0, &FILE_LISTING).unwrap()).unwrap();
//! assert_eq!(file.name, "notes.txt");
//! assert_eq!(file.size, 4096);
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

pub mod engine;
pub mod model;
pub mod sys;

mod codec;
mod error;
mod event;
mod indexed;
mod job;
mod marshaler;
mod property;
mod record;
mod value;

pub use engine::{memory, Engine, EventProc, Failure, MemoryEngine, RawOut, RawSlot};
#[cfg(feature = "native")]
pub use engine::NativeEngine;
pub use error::{classify, describe, Error, ErrorKind, NativeCode};
pub use event::{
	find_items_callback, DiscoveryContext, DiscoveryReport, DiscoverySink, EventType,
};
pub use indexed::Records;
pub use marshaler::{Marshaler, MarshalerBuilder};
pub use model::{GuestFile, GuestProcess, ProgramOutput, Screenshot, SharedFolder};
pub use property::{Catalogue, Handle, PropertyId, PropertyKind};
pub use record::{Field, FieldSpec, ResultRecord};
pub use value::{NativeBlob, NativeString, Value};
