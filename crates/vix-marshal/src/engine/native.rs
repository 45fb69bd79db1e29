use super::{Engine, Failure, RawOut, RawSlot};
use crate::{
	error::NativeCode,
	property::{Handle, PropertyId, PropertyKind},
	sys,
};

use std::{
	ffi::{c_int, c_void, CStr},
	ptr,
};

use tracing::error;

/// [`Engine`] over the VIX library linked into the process.
///
/// Property requests are issued one identifier at a time, each call carrying a single
/// `(id, output, VIX_PROPERTY_NONE)` list, so a request of any length maps onto fixed arity
/// native calls. Buffers returned by earlier calls are released when a later one fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeEngine;

impl NativeEngine {
	#[must_use]
	pub const fn new() -> Self {
		Self
	}

	fn request(
		&self,
		slots: &mut [RawSlot],
		mut call: impl FnMut(sys::VixPropertyID, &mut RawOut) -> sys::VixError,
	) -> Result<(), Failure> {
		for position in 0..slots.len() {
			let slot = &mut slots[position];
			let code = NativeCode(call(slot.id.0, &mut slot.out));

			if !code.is_ok() {
				for filled in &mut slots[..position] {
					if let Some(buffer) = filled.out.take_buffer() {
						// SAFETY: written by a successful native call and never handed out
						unsafe { self.free_buffer(buffer) };
					}
				}

				return Err(Failure::at(code, position));
			}
		}

		Ok(())
	}
}

impl Engine for NativeEngine {
	fn wait(&self, job: Handle) -> NativeCode {
		// SAFETY: an empty property list is terminated right away
		NativeCode(unsafe { sys::VixJob_Wait(job.0, sys::VIX_PROPERTY_NONE) })
	}

	fn property_kind(&self, handle: Handle, id: PropertyId) -> Result<PropertyKind, NativeCode> {
		let mut raw = sys::VIX_PROPERTYTYPE_ANY;

		// SAFETY: `raw` outlives the call
		let code = NativeCode(unsafe { sys::Vix_GetPropertyType(handle.0, id.0, &mut raw) });
		if !code.is_ok() {
			return Err(code);
		}

		PropertyKind::from_raw(raw).ok_or_else(|| {
			error!(%handle, %id, raw, "Engine reported an unknown property type");
			NativeCode(sys::VIX_E_PROPERTY_TYPE_MISMATCH)
		})
	}

	fn get_properties(&self, handle: Handle, slots: &mut [RawSlot]) -> Result<(), Failure> {
		self.request(slots, |id, out| {
			// SAFETY: every output pointer matches the kind requested for `id` and outlives the
			// call, the list is terminated with `VIX_PROPERTY_NONE`
			unsafe {
				match out {
					RawOut::Blob { len, data } => sys::Vix_GetProperties(
						handle.0,
						id,
						ptr::from_mut(len),
						ptr::from_mut(data),
						sys::VIX_PROPERTY_NONE,
					),
					out => sys::Vix_GetProperties(
						handle.0,
						id,
						out.as_mut_ptr(),
						sys::VIX_PROPERTY_NONE,
					),
				}
			}
		})
	}

	fn get_nth_properties(
		&self,
		job: Handle,
		index: c_int,
		slots: &mut [RawSlot],
	) -> Result<(), Failure> {
		self.request(slots, |id, out| {
			// SAFETY: same as `get_properties`
			unsafe {
				match out {
					RawOut::Blob { len, data } => sys::VixJob_GetNthProperties(
						job.0,
						index,
						id,
						ptr::from_mut(len),
						ptr::from_mut(data),
						sys::VIX_PROPERTY_NONE,
					),
					out => sys::VixJob_GetNthProperties(
						job.0,
						index,
						id,
						out.as_mut_ptr(),
						sys::VIX_PROPERTY_NONE,
					),
				}
			}
		})
	}

	fn num_properties(&self, job: Handle, id: PropertyId) -> c_int {
		unsafe { sys::VixJob_GetNumProperties(job.0, id.0) }
	}

	unsafe fn free_buffer(&self, buffer: *mut c_void) {
		unsafe { sys::Vix_FreeBuffer(buffer) };
	}

	fn error_text(&self, code: NativeCode) -> Option<String> {
		// SAFETY: a null locale selects the default one
		let text = unsafe { sys::Vix_GetErrorText(code.0, ptr::null()) };
		if text.is_null() {
			return None;
		}

		// SAFETY: the library returns static NUL terminated strings, which must not be freed
		Some(unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned())
	}
}
