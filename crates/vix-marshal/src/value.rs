use crate::{
	engine::Engine,
	property::{Handle, PropertyKind},
};

use std::{
	borrow::Cow,
	ffi::{c_char, c_uchar, CStr},
	fmt,
	ptr, slice,
	str::Utf8Error,
	sync::Arc,
};

/// A NUL terminated string allocated by the engine.
///
/// The buffer is released through the engine exactly once, when this value is dropped. Copy
/// whatever must outlive it.
pub struct NativeString {
	ptr: *mut c_char,
	engine: Arc<dyn Engine>,
}

impl NativeString {
	/// # Safety
	///
	/// `ptr` must be null or a NUL terminated buffer allocated by `engine` that nobody else owns.
	pub(crate) unsafe fn from_raw(ptr: *mut c_char, engine: Arc<dyn Engine>) -> Self {
		Self { ptr, engine }
	}

	#[must_use]
	pub fn as_c_str(&self) -> &CStr {
		if self.ptr.is_null() {
			return c"";
		}

		// SAFETY: non null pointers are NUL terminated and live until `self` is dropped
		unsafe { CStr::from_ptr(self.ptr) }
	}

	pub fn to_str(&self) -> Result<&str, Utf8Error> {
		self.as_c_str().to_str()
	}

	#[must_use]
	pub fn to_string_lossy(&self) -> Cow<'_, str> {
		self.as_c_str().to_string_lossy()
	}

	/// Copies the contents into host memory and releases the native buffer.
	#[must_use]
	pub fn into_string(self) -> String {
		self.to_string_lossy().into_owned()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.as_c_str().is_empty()
	}
}

impl Drop for NativeString {
	fn drop(&mut self) {
		if !self.ptr.is_null() {
			unsafe { self.engine.free_buffer(self.ptr.cast()) };
			self.ptr = ptr::null_mut();
		}
	}
}

// SAFETY: The buffer is exclusively owned by this value and the engine is `Send + Sync`, so
// moving it to another thread and releasing it there is fine.
unsafe impl Send for NativeString {}

impl PartialEq for NativeString {
	fn eq(&self, other: &Self) -> bool {
		self.as_c_str() == other.as_c_str()
	}
}

impl Eq for NativeString {}

impl fmt::Debug for NativeString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(&self.to_string_lossy(), f)
	}
}

impl fmt::Display for NativeString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_string_lossy())
	}
}

/// A byte buffer with an explicit length allocated by the engine, released on drop.
pub struct NativeBlob {
	data: *mut c_uchar,
	len: usize,
	engine: Arc<dyn Engine>,
}

impl NativeBlob {
	/// # Safety
	///
	/// `data` must be null or point to at least `len` bytes allocated by `engine` that nobody
	/// else owns.
	pub(crate) unsafe fn from_raw(data: *mut c_uchar, len: usize, engine: Arc<dyn Engine>) -> Self {
		Self { data, len, engine }
	}

	#[must_use]
	pub fn as_bytes(&self) -> &[u8] {
		if self.data.is_null() || self.len == 0 {
			return &[];
		}

		// SAFETY: `data` holds `len` bytes until `self` is dropped
		unsafe { slice::from_raw_parts(self.data, self.len) }
	}

	/// Copies the contents into host memory and releases the native buffer.
	#[must_use]
	pub fn into_vec(self) -> Vec<u8> {
		self.as_bytes().to_vec()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.as_bytes().len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.as_bytes().is_empty()
	}
}

impl Drop for NativeBlob {
	fn drop(&mut self) {
		if !self.data.is_null() {
			unsafe { self.engine.free_buffer(self.data.cast()) };
			self.data = ptr::null_mut();
			self.len = 0;
		}
	}
}

// SAFETY: same as `NativeString`
unsafe impl Send for NativeBlob {}

impl PartialEq for NativeBlob {
	fn eq(&self, other: &Self) -> bool {
		self.as_bytes() == other.as_bytes()
	}
}

impl Eq for NativeBlob {}

impl fmt::Debug for NativeBlob {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("NativeBlob")
			.field("len", &self.len)
			.finish_non_exhaustive()
	}
}

/// A decoded property value.
#[derive(Debug, PartialEq, Eq)]
pub enum Value {
	Int(i32),
	Int64(i64),
	Bool(bool),
	String(NativeString),
	Blob(NativeBlob),
	Handle(Handle),
}

impl Value {
	#[must_use]
	pub const fn kind(&self) -> PropertyKind {
		match self {
			Self::Int(_) => PropertyKind::Int,
			Self::Int64(_) => PropertyKind::Int64,
			Self::Bool(_) => PropertyKind::Bool,
			Self::String(_) => PropertyKind::String,
			Self::Blob(_) => PropertyKind::Blob,
			Self::Handle(_) => PropertyKind::Handle,
		}
	}

	#[must_use]
	pub const fn as_int(&self) -> Option<i32> {
		match self {
			Self::Int(value) => Some(*value),
			_ => None,
		}
	}

	#[must_use]
	pub const fn as_int64(&self) -> Option<i64> {
		match self {
			Self::Int64(value) => Some(*value),
			_ => None,
		}
	}

	#[must_use]
	pub const fn as_bool(&self) -> Option<bool> {
		match self {
			Self::Bool(value) => Some(*value),
			_ => None,
		}
	}

	#[must_use]
	pub const fn as_handle(&self) -> Option<Handle> {
		match self {
			Self::Handle(value) => Some(*value),
			_ => None,
		}
	}

	#[must_use]
	pub const fn as_native_string(&self) -> Option<&NativeString> {
		match self {
			Self::String(value) => Some(value),
			_ => None,
		}
	}

	#[must_use]
	pub const fn as_native_blob(&self) -> Option<&NativeBlob> {
		match self {
			Self::Blob(value) => Some(value),
			_ => None,
		}
	}
}
