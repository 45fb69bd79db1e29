use crate::{
	engine::{Engine, Failure},
	property::{Handle, PropertyId, PropertyKind},
	record::{Field, FieldSpec},
	sys,
};

use std::{fmt, time::Duration};

use strum::Display;
use thiserror::Error;
use tokio::task::JoinError;

/// A raw `VixError` as returned by the engine.
///
/// The error code lives in the low 16 bits, the remaining bits carry extra information the
/// engine may attach.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct NativeCode(pub sys::VixError);

impl NativeCode {
	pub const OK: Self = Self(sys::VIX_OK);

	#[must_use]
	#[allow(clippy::cast_possible_truncation)]
	pub const fn code(self) -> u16 {
		(self.0 & 0xFFFF) as u16
	}

	#[must_use]
	pub const fn is_ok(self) -> bool {
		self.0 == sys::VIX_OK
	}
}

impl fmt::Display for NativeCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.code())
	}
}

impl From<sys::VixError> for NativeCode {
	fn from(code: sys::VixError) -> Self {
		Self(code)
	}
}

/// Host side taxonomy of everything that can go wrong while marshaling a job's results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ErrorKind {
	Success,
	/// The operation itself did not succeed, terminal for that job.
	JobFailed,
	TypeMismatch,
	NotFound,
	IndexOutOfRange,
	/// Any other native error, the code is preserved for diagnostics.
	NativeFailure,
	InvalidRequest,
	Timeout,
	/// The worker running a blocking wait panicked or was cancelled.
	Aborted,
}

/// Maps a native error code into the host taxonomy.
#[must_use]
pub const fn classify(code: NativeCode) -> ErrorKind {
	if code.is_ok() {
		return ErrorKind::Success;
	}

	#[allow(clippy::cast_lossless)]
	let raw = code.code() as sys::VixError;

	match raw {
		sys::VIX_E_TYPE_MISMATCH | sys::VIX_E_PROPERTY_TYPE_MISMATCH => ErrorKind::TypeMismatch,
		sys::VIX_E_NOT_FOUND | sys::VIX_E_UNRECOGNIZED_PROPERTY => ErrorKind::NotFound,
		_ => ErrorKind::NativeFailure,
	}
}

/// Renders a native error for diagnostics, never fails.
#[must_use]
pub fn describe(engine: &dyn Engine, code: NativeCode) -> String {
	engine
		.error_text(code)
		.filter(|text| !text.trim().is_empty())
		.unwrap_or_else(|| format!("native error {code}"))
}

#[derive(Debug, Error)]
pub enum Error {
	#[error("job <handle='{handle}'> failed: {text}; code: {code}")]
	JobFailed {
		handle: Handle,
		code: NativeCode,
		text: String,
	},
	#[error(
		"property <id='{id}'> of <handle='{handle}'> is {}, expected {expected}",
		kind_name(.actual)
	)]
	TypeMismatch {
		handle: Handle,
		id: PropertyId,
		expected: PropertyKind,
		actual: Option<PropertyKind>,
	},
	#[error("property <id='{id}'> not found on <handle='{handle}'>")]
	NotFound {
		handle: Handle,
		id: PropertyId,
		code: Option<NativeCode>,
	},
	#[error("index {index} out of range for <handle='{handle}'> holding {count} records")]
	IndexOutOfRange {
		handle: Handle,
		index: i64,
		count: usize,
	},
	#[error("native failure on <handle='{handle}'>: {text}; code: {code}")]
	NativeFailure {
		handle: Handle,
		id: Option<PropertyId>,
		index: Option<i64>,
		code: NativeCode,
		text: String,
	},
	#[error("invalid request on <handle='{handle}'>: {reason}")]
	InvalidRequest { handle: Handle, reason: String },
	#[error("timed out after {timeout:?} waiting for job <handle='{handle}'>")]
	Timeout { handle: Handle, timeout: Duration },
	#[error("background wait failed: {0}")]
	BackgroundTaskFailed(#[from] JoinError),
}

fn kind_name(kind: &Option<PropertyKind>) -> String {
	kind.map_or_else(|| "of an unknown kind".to_string(), |kind| kind.to_string())
}

impl Error {
	#[must_use]
	pub const fn kind(&self) -> ErrorKind {
		match self {
			Self::JobFailed { .. } => ErrorKind::JobFailed,
			Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
			Self::NotFound { .. } => ErrorKind::NotFound,
			Self::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
			Self::NativeFailure { .. } => ErrorKind::NativeFailure,
			Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
			Self::Timeout { .. } => ErrorKind::Timeout,
			Self::BackgroundTaskFailed(_) => ErrorKind::Aborted,
		}
	}

	/// The native code behind this error, if it came from the engine.
	#[must_use]
	pub const fn native_code(&self) -> Option<NativeCode> {
		match self {
			Self::JobFailed { code, .. } | Self::NativeFailure { code, .. } => Some(*code),
			Self::NotFound { code, .. } => *code,
			_ => None,
		}
	}

	pub(crate) fn job_failed(engine: &dyn Engine, handle: Handle, code: NativeCode) -> Self {
		Self::JobFailed {
			handle,
			code,
			text: describe(engine, code),
		}
	}

	pub(crate) fn invalid_request(handle: Handle, reason: impl Into<String>) -> Self {
		Self::InvalidRequest {
			handle,
			reason: reason.into(),
		}
	}

	/// Builds the error for a native `code` raised while reading `field`, if known.
	pub(crate) fn from_native(
		engine: &dyn Engine,
		code: NativeCode,
		handle: Handle,
		field: Option<Field>,
		index: Option<i64>,
	) -> Self {
		match (classify(code), field) {
			(ErrorKind::TypeMismatch, Some(field)) => Self::TypeMismatch {
				handle,
				id: field.id,
				expected: field.kind,
				actual: None,
			},
			(ErrorKind::NotFound, Some(field)) => Self::NotFound {
				handle,
				id: field.id,
				code: Some(code),
			},
			_ => Self::NativeFailure {
				handle,
				id: field.map(|field| field.id),
				index,
				code,
				text: describe(engine, code),
			},
		}
	}

	pub(crate) fn from_failure(
		engine: &dyn Engine,
		failure: Failure,
		handle: Handle,
		spec: &FieldSpec,
		index: Option<i64>,
	) -> Self {
		let field = failure
			.slot
			.and_then(|slot| spec.fields().get(slot).copied());

		Self::from_native(engine, failure.code, handle, field, index)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::engine::MemoryEngine;

	#[test]
	fn classify_maps_the_native_space() {
		assert_eq!(classify(NativeCode::OK), ErrorKind::Success);
		assert_eq!(
			classify(NativeCode(sys::VIX_E_TYPE_MISMATCH)),
			ErrorKind::TypeMismatch
		);
		assert_eq!(
			classify(NativeCode(sys::VIX_E_PROPERTY_TYPE_MISMATCH)),
			ErrorKind::TypeMismatch
		);
		assert_eq!(classify(NativeCode(sys::VIX_E_NOT_FOUND)), ErrorKind::NotFound);
		assert_eq!(
			classify(NativeCode(sys::VIX_E_UNRECOGNIZED_PROPERTY)),
			ErrorKind::NotFound
		);
		assert_eq!(
			classify(NativeCode(sys::VIX_E_VM_NOT_RUNNING)),
			ErrorKind::NativeFailure
		);
	}

	#[test]
	fn classify_ignores_extra_bits() {
		let code = NativeCode((0xABCDu64 << 32) | sys::VIX_E_NOT_FOUND);

		assert_eq!(code.code(), 2000);
		assert_eq!(classify(code), ErrorKind::NotFound);
		assert!(!code.is_ok());
	}

	#[test]
	fn describe_falls_back_to_a_generic_message() {
		let engine = MemoryEngine::new();

		assert_eq!(
			describe(&engine, NativeCode(sys::VIX_E_NOT_FOUND)),
			"The object was not found"
		);
		assert_eq!(describe(&engine, NativeCode(4242)), "native error 4242");
	}

	#[test]
	fn errors_render_their_context() {
		let error = Error::TypeMismatch {
			handle: Handle(12),
			id: PropertyId::JOB_RESULT_FILE_SIZE,
			expected: PropertyKind::Int,
			actual: Some(PropertyKind::Int64),
		};

		assert_eq!(error.kind(), ErrorKind::TypeMismatch);
		assert_eq!(
			error.to_string(),
			"property <id='3061'> of <handle='12'> is int64, expected int"
		);

		let error = Error::IndexOutOfRange {
			handle: Handle(3),
			index: -1,
			count: 5,
		};
		assert_eq!(
			error.to_string(),
			"index -1 out of range for <handle='3'> holding 5 records"
		);

		let engine = MemoryEngine::new();
		let error = Error::from_native(
			&engine,
			NativeCode((1u64 << 40) | sys::VIX_E_VM_NOT_RUNNING),
			Handle(9),
			None,
			Some(2),
		);
		assert_eq!(
			error.to_string(),
			"native failure on <handle='9'>: The virtual machine needs to be powered on; code: 3006"
		);
	}
}
