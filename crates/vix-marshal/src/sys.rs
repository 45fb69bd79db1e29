//! Raw values and declarations of the VIX C API.
//!
//! Extracted from `vix.h` (VIX API 1.x). Only the subset the marshaling layer needs is mirrored
//! here, the property catalogue lives in [`crate::property`].

#![allow(non_camel_case_types, non_upper_case_globals)]

use std::ffi::c_int;

pub type VixHandle = c_int;
pub type VixError = u64;
pub type VixPropertyID = c_int;
pub type VixPropertyType = c_int;
pub type VixEventType = c_int;

pub const VIX_INVALID_HANDLE: VixHandle = 0;

pub const VIX_OK: VixError = 0;

// Generic errors
pub const VIX_E_FAIL: VixError = 1;
pub const VIX_E_OUT_OF_MEMORY: VixError = 2;
pub const VIX_E_INVALID_ARG: VixError = 3;
pub const VIX_E_FILE_NOT_FOUND: VixError = 4;
pub const VIX_E_OBJECT_IS_BUSY: VixError = 5;
pub const VIX_E_NOT_SUPPORTED: VixError = 6;
pub const VIX_E_CANCELLED: VixError = 10;
pub const VIX_E_UNFINISHED_JOB: VixError = 29;
pub const VIX_E_HOST_CONNECTION_LOST: VixError = 36;

// Handle errors
pub const VIX_E_INVALID_HANDLE: VixError = 1000;
pub const VIX_E_NOT_SUPPORTED_ON_HANDLE_TYPE: VixError = 1001;

// Generic property errors
pub const VIX_E_NOT_FOUND: VixError = 2000;
pub const VIX_E_TYPE_MISMATCH: VixError = 2001;

// Guest errors
pub const VIX_E_VM_NOT_RUNNING: VixError = 3006;

// Property list errors
pub const VIX_E_UNRECOGNIZED_PROPERTY: VixError = 6000;
pub const VIX_E_INVALID_PROPERTY_VALUE: VixError = 6001;
pub const VIX_E_PROPERTY_TYPE_MISMATCH: VixError = 6005;

pub const VIX_PROPERTYTYPE_ANY: VixPropertyType = 0;
pub const VIX_PROPERTYTYPE_INTEGER: VixPropertyType = 1;
pub const VIX_PROPERTYTYPE_STRING: VixPropertyType = 2;
pub const VIX_PROPERTYTYPE_BOOL: VixPropertyType = 3;
pub const VIX_PROPERTYTYPE_HANDLE: VixPropertyType = 4;
pub const VIX_PROPERTYTYPE_INT64: VixPropertyType = 5;
pub const VIX_PROPERTYTYPE_BLOB: VixPropertyType = 6;

pub const VIX_EVENTTYPE_JOB_COMPLETED: VixEventType = 2;
pub const VIX_EVENTTYPE_JOB_PROGRESS: VixEventType = 3;
pub const VIX_EVENTTYPE_FIND_ITEM: VixEventType = 8;

pub const VIX_PROPERTY_NONE: VixPropertyID = 0;

pub const VIX_FILE_ATTRIBUTES_DIRECTORY: c_int = 0x0001;
pub const VIX_FILE_ATTRIBUTES_SYMLINK: c_int = 0x0002;

#[cfg(feature = "native")]
pub use self::native::*;

#[cfg(feature = "native")]
mod native {
	use super::{VixError, VixHandle, VixPropertyID, VixPropertyType};

	use std::ffi::{c_char, c_int, c_void};

	#[link(name = "vixAllProducts")]
	extern "C" {
		pub fn VixJob_Wait(job_handle: VixHandle, first_property_id: VixPropertyID, ...)
			-> VixError;

		pub fn VixJob_GetNumProperties(
			job_handle: VixHandle,
			result_property_id: VixPropertyID,
		) -> c_int;

		pub fn VixJob_GetNthProperties(
			job_handle: VixHandle,
			index: c_int,
			first_property_id: VixPropertyID,
			...
		) -> VixError;

		pub fn Vix_GetProperties(
			handle: VixHandle,
			first_property_id: VixPropertyID,
			...
		) -> VixError;

		pub fn Vix_GetPropertyType(
			handle: VixHandle,
			property_id: VixPropertyID,
			property_type: *mut VixPropertyType,
		) -> VixError;

		pub fn Vix_FreeBuffer(p: *mut c_void);

		pub fn Vix_GetErrorText(err: VixError, locale: *const c_char) -> *const c_char;
	}
}
