use crate::sys;

use std::{collections::HashMap, ffi::c_int, fmt};

use serde::{Deserialize, Serialize};
use strum::Display;

/// Opaque reference to a native object: a job, a host, a virtual machine or an event.
///
/// Handles are never owned by this crate, whoever created them is responsible for releasing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Handle(pub c_int);

impl Handle {
	pub const INVALID: Self = Self(sys::VIX_INVALID_HANDLE);

	#[must_use]
	pub const fn is_valid(self) -> bool {
		self.0 != sys::VIX_INVALID_HANDLE
	}
}

impl fmt::Display for Handle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// The kind of value a property holds, numerically equal to `VIX_PROPERTYTYPE_*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[repr(i32)]
pub enum PropertyKind {
	Int = sys::VIX_PROPERTYTYPE_INTEGER,
	String = sys::VIX_PROPERTYTYPE_STRING,
	Bool = sys::VIX_PROPERTYTYPE_BOOL,
	Handle = sys::VIX_PROPERTYTYPE_HANDLE,
	Int64 = sys::VIX_PROPERTYTYPE_INT64,
	Blob = sys::VIX_PROPERTYTYPE_BLOB,
}

impl PropertyKind {
	#[must_use]
	pub const fn from_raw(raw: sys::VixPropertyType) -> Option<Self> {
		match raw {
			sys::VIX_PROPERTYTYPE_INTEGER => Some(Self::Int),
			sys::VIX_PROPERTYTYPE_STRING => Some(Self::String),
			sys::VIX_PROPERTYTYPE_BOOL => Some(Self::Bool),
			sys::VIX_PROPERTYTYPE_HANDLE => Some(Self::Handle),
			sys::VIX_PROPERTYTYPE_INT64 => Some(Self::Int64),
			sys::VIX_PROPERTYTYPE_BLOB => Some(Self::Blob),
			_ => None,
		}
	}

	#[must_use]
	pub const fn as_raw(self) -> sys::VixPropertyType {
		self as sys::VixPropertyType
	}
}

/// Identifier of a named field in a job's, handle's or event's property bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PropertyId(pub sys::VixPropertyID);

impl PropertyId {
	/// Sentinel terminating native property lists, never a valid request.
	pub const NONE: Self = Self(sys::VIX_PROPERTY_NONE);

	pub const HOST_HOSTTYPE: Self = Self(50);
	pub const HOST_API_VERSION: Self = Self(51);

	pub const VM_NUM_VCPUS: Self = Self(101);
	pub const VM_VMX_PATHNAME: Self = Self(103);
	pub const VM_VMTEAM_PATHNAME: Self = Self(105);
	pub const VM_MEMORY_SIZE: Self = Self(106);
	pub const VM_READ_ONLY: Self = Self(107);
	pub const VM_NAME: Self = Self(108);
	pub const VM_GUESTOS: Self = Self(109);
	pub const VM_IN_VMTEAM: Self = Self(128);
	pub const VM_POWER_STATE: Self = Self(129);
	pub const VM_TOOLS_STATE: Self = Self(152);
	pub const VM_IS_RUNNING: Self = Self(196);
	pub const VM_SUPPORTED_FEATURES: Self = Self(197);

	pub const JOB_RESULT_ERROR_CODE: Self = Self(3000);
	pub const JOB_RESULT_HANDLE: Self = Self(3010);
	pub const JOB_RESULT_GUEST_OBJECT_EXISTS: Self = Self(3011);
	pub const JOB_RESULT_GUEST_PROGRAM_ELAPSED_TIME: Self = Self(3017);
	pub const JOB_RESULT_GUEST_PROGRAM_EXIT_CODE: Self = Self(3018);
	pub const JOB_RESULT_ITEM_NAME: Self = Self(3035);
	pub const JOB_RESULT_FOUND_ITEM_DESCRIPTION: Self = Self(3036);
	pub const JOB_RESULT_SHARED_FOLDER_COUNT: Self = Self(3046);
	pub const JOB_RESULT_SHARED_FOLDER_HOST: Self = Self(3048);
	pub const JOB_RESULT_SHARED_FOLDER_FLAGS: Self = Self(3049);
	pub const JOB_RESULT_PROCESS_ID: Self = Self(3051);
	pub const JOB_RESULT_PROCESS_OWNER: Self = Self(3052);
	pub const JOB_RESULT_PROCESS_COMMAND: Self = Self(3053);
	pub const JOB_RESULT_FILE_FLAGS: Self = Self(3054);
	pub const JOB_RESULT_PROCESS_START_TIME: Self = Self(3055);
	pub const JOB_RESULT_VM_VARIABLE_STRING: Self = Self(3056);
	pub const JOB_RESULT_PROCESS_BEING_DEBUGGED: Self = Self(3057);
	pub const JOB_RESULT_SCREEN_IMAGE_SIZE: Self = Self(3058);
	pub const JOB_RESULT_SCREEN_IMAGE_DATA: Self = Self(3059);
	pub const JOB_RESULT_FILE_SIZE: Self = Self(3061);
	pub const JOB_RESULT_FILE_MOD_TIME: Self = Self(3062);

	pub const FOUND_ITEM_LOCATION: Self = Self(4010);

	pub const GUEST_SHAREDFOLDERS_SHARES_PATH: Self = Self(4525);

	/// Kind declared for the identifiers this crate knows about out of the box.
	#[must_use]
	pub const fn builtin_kind(self) -> Option<PropertyKind> {
		use PropertyKind::{Blob, Bool, Handle, Int, Int64, String};

		Some(match self {
			Self::HOST_HOSTTYPE
			| Self::HOST_API_VERSION
			| Self::VM_NUM_VCPUS
			| Self::VM_MEMORY_SIZE
			| Self::VM_POWER_STATE
			| Self::VM_TOOLS_STATE
			| Self::VM_SUPPORTED_FEATURES
			| Self::JOB_RESULT_ERROR_CODE
			| Self::JOB_RESULT_GUEST_PROGRAM_ELAPSED_TIME
			| Self::JOB_RESULT_GUEST_PROGRAM_EXIT_CODE
			| Self::JOB_RESULT_SHARED_FOLDER_COUNT
			| Self::JOB_RESULT_SHARED_FOLDER_FLAGS
			| Self::JOB_RESULT_FILE_FLAGS
			| Self::JOB_RESULT_PROCESS_START_TIME
			| Self::JOB_RESULT_SCREEN_IMAGE_SIZE => Int,

			Self::JOB_RESULT_PROCESS_ID | Self::JOB_RESULT_FILE_SIZE | Self::JOB_RESULT_FILE_MOD_TIME => {
				Int64
			}

			Self::VM_READ_ONLY
			| Self::VM_IN_VMTEAM
			| Self::VM_IS_RUNNING
			| Self::JOB_RESULT_GUEST_OBJECT_EXISTS
			| Self::JOB_RESULT_PROCESS_BEING_DEBUGGED => Bool,

			Self::VM_VMX_PATHNAME
			| Self::VM_VMTEAM_PATHNAME
			| Self::VM_NAME
			| Self::VM_GUESTOS
			| Self::JOB_RESULT_ITEM_NAME
			| Self::JOB_RESULT_FOUND_ITEM_DESCRIPTION
			| Self::JOB_RESULT_SHARED_FOLDER_HOST
			| Self::JOB_RESULT_PROCESS_OWNER
			| Self::JOB_RESULT_PROCESS_COMMAND
			| Self::JOB_RESULT_VM_VARIABLE_STRING
			| Self::FOUND_ITEM_LOCATION
			| Self::GUEST_SHAREDFOLDERS_SHARES_PATH => String,

			Self::JOB_RESULT_HANDLE => Handle,

			Self::JOB_RESULT_SCREEN_IMAGE_DATA => Blob,

			_ => return None,
		})
	}
}

impl fmt::Display for PropertyId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Maps property identifiers to the kind of value they are declared to hold.
///
/// Starts from [`PropertyId::builtin_kind`] and can be extended, or overridden, with
/// [`Catalogue::declare`] for identifiers the built-in subset doesn't cover.
#[derive(Debug, Clone, Default)]
pub struct Catalogue {
	declared: HashMap<PropertyId, PropertyKind>,
}

impl Catalogue {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn declare(&mut self, id: PropertyId, kind: PropertyKind) -> &mut Self {
		self.declared.insert(id, kind);
		self
	}

	#[must_use]
	pub fn kind(&self, id: PropertyId) -> Option<PropertyKind> {
		if id == PropertyId::NONE {
			return None;
		}

		self.declared
			.get(&id)
			.copied()
			.or_else(|| id.builtin_kind())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn kinds_round_trip_through_native_values() {
		for kind in [
			PropertyKind::Int,
			PropertyKind::String,
			PropertyKind::Bool,
			PropertyKind::Handle,
			PropertyKind::Int64,
			PropertyKind::Blob,
		] {
			assert_eq!(PropertyKind::from_raw(kind.as_raw()), Some(kind));
		}

		assert_eq!(PropertyKind::from_raw(sys::VIX_PROPERTYTYPE_ANY), None);
	}

	#[test]
	fn catalogue_declarations_extend_builtins() {
		let custom = PropertyId(9001);
		let mut catalogue = Catalogue::new();

		assert_eq!(catalogue.kind(custom), None);
		assert_eq!(
			catalogue.kind(PropertyId::JOB_RESULT_FILE_SIZE),
			Some(PropertyKind::Int64)
		);

		catalogue.declare(custom, PropertyKind::Blob);
		assert_eq!(catalogue.kind(custom), Some(PropertyKind::Blob));

		assert_eq!(catalogue.kind(PropertyId::NONE), None);
	}
}
