//! The native boundary.
//!
//! [`Engine`] mirrors the handful of job and property primitives of the VIX library the
//! marshaling layer is built on. Output slots are typed descriptors ([`RawSlot`]) instead of the
//! sentinel-terminated `(id, pointer)` varargs of the C API, the sentinel is an implementation
//! detail of [`NativeEngine`].

use crate::{
	error::NativeCode,
	property::{Handle, PropertyId, PropertyKind},
	sys,
};

use std::{
	ffi::{c_char, c_int, c_uchar, c_void},
	ptr,
};

pub mod memory;
#[cfg(feature = "native")]
pub mod native;

pub use memory::MemoryEngine;
#[cfg(feature = "native")]
pub use native::NativeEngine;

/// Shape of the event procedure the engine invokes on its own thread, `VixEventProc` in C.
pub type EventProc = unsafe extern "C" fn(
	handle: sys::VixHandle,
	event_type: sys::VixEventType,
	more_event_info: sys::VixHandle,
	client_data: *mut c_void,
);

/// Storage for one property read, filled in by the engine.
///
/// String and blob pointers are allocated by the engine and must be released with
/// [`Engine::free_buffer`].
#[derive(Debug)]
pub enum RawOut {
	Int(c_int),
	Int64(i64),
	/// Native `Bool` is a single `char`, any non zero value is true.
	Bool(c_char),
	String(*mut c_char),
	Blob { len: c_int, data: *mut c_uchar },
	Handle(sys::VixHandle),
}

impl RawOut {
	#[must_use]
	pub const fn empty(kind: PropertyKind) -> Self {
		match kind {
			PropertyKind::Int => Self::Int(0),
			PropertyKind::Int64 => Self::Int64(0),
			PropertyKind::Bool => Self::Bool(0),
			PropertyKind::String => Self::String(ptr::null_mut()),
			PropertyKind::Blob => Self::Blob {
				len: 0,
				data: ptr::null_mut(),
			},
			PropertyKind::Handle => Self::Handle(sys::VIX_INVALID_HANDLE),
		}
	}

	#[must_use]
	pub const fn kind(&self) -> PropertyKind {
		match self {
			Self::Int(_) => PropertyKind::Int,
			Self::Int64(_) => PropertyKind::Int64,
			Self::Bool(_) => PropertyKind::Bool,
			Self::String(_) => PropertyKind::String,
			Self::Blob { .. } => PropertyKind::Blob,
			Self::Handle(_) => PropertyKind::Handle,
		}
	}

	/// Pointer handed to the C API for single pointer kinds. Blobs take two output pointers and
	/// must be special cased by the caller.
	pub fn as_mut_ptr(&mut self) -> *mut c_void {
		match self {
			Self::Int(value) => ptr::from_mut(value).cast(),
			Self::Int64(value) => ptr::from_mut(value).cast(),
			Self::Bool(value) => ptr::from_mut(value).cast(),
			Self::String(value) => ptr::from_mut(value).cast(),
			Self::Blob { data, .. } => ptr::from_mut(data).cast(),
			Self::Handle(value) => ptr::from_mut(value).cast(),
		}
	}

	/// Detaches the engine allocated buffer of this output, if any, leaving a null pointer behind.
	pub fn take_buffer(&mut self) -> Option<*mut c_void> {
		let buffer: *mut c_void = match self {
			Self::String(value) => std::mem::replace(value, ptr::null_mut()).cast(),
			Self::Blob { len, data } => {
				*len = 0;
				std::mem::replace(data, ptr::null_mut()).cast()
			}
			_ => return None,
		};

		(!buffer.is_null()).then_some(buffer)
	}
}

/// One `(identifier, output)` pair of a property request.
#[derive(Debug)]
pub struct RawSlot {
	pub id: PropertyId,
	pub out: RawOut,
}

impl RawSlot {
	#[must_use]
	pub const fn new(id: PropertyId, kind: PropertyKind) -> Self {
		Self {
			id,
			out: RawOut::empty(kind),
		}
	}

	#[must_use]
	pub const fn kind(&self) -> PropertyKind {
		self.out.kind()
	}
}

/// A failed property request: the native code and, when the engine can tell, the position of
/// the slot that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Failure {
	pub code: NativeCode,
	pub slot: Option<usize>,
}

impl Failure {
	#[must_use]
	pub const fn new(code: NativeCode) -> Self {
		Self { code, slot: None }
	}

	#[must_use]
	pub const fn at(code: NativeCode, slot: usize) -> Self {
		Self {
			code,
			slot: Some(slot),
		}
	}
}

/// The job and property primitives of a VIX compatible engine.
///
/// Property requests are atomic: when `get_properties` or `get_nth_properties` fail, no slot
/// holds a buffer that still needs releasing.
pub trait Engine: Send + Sync {
	/// Blocks until `job` completes and returns the job's own status.
	fn wait(&self, job: Handle) -> NativeCode;

	/// The kind of value `handle` holds for `id`.
	fn property_kind(&self, handle: Handle, id: PropertyId) -> Result<PropertyKind, NativeCode>;

	/// Reads every slot from `handle`'s property bag in a single request, without waiting.
	fn get_properties(&self, handle: Handle, slots: &mut [RawSlot]) -> Result<(), Failure>;

	/// Reads every slot from the `index`th record of a completed job.
	fn get_nth_properties(
		&self,
		job: Handle,
		index: c_int,
		slots: &mut [RawSlot],
	) -> Result<(), Failure>;

	/// How many records of a completed job carry `id`.
	fn num_properties(&self, job: Handle, id: PropertyId) -> c_int;

	/// Releases a string or blob buffer previously written to a [`RawSlot`].
	///
	/// # Safety
	///
	/// `buffer` must have been produced by this engine and must not have been released before.
	unsafe fn free_buffer(&self, buffer: *mut c_void);

	/// Human readable text for a native error, if the engine can render one.
	fn error_text(&self, code: NativeCode) -> Option<String>;
}
