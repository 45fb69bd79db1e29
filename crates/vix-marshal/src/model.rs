//! Typed views over the listings and results the guest operations produce.
//!
//! Every view comes with the [`FieldSpec`] to decode it with, either through
//! [`Marshaler::decode_at`](crate::Marshaler::decode_at) for listings or
//! [`Marshaler::wait`](crate::Marshaler::wait) for single results.

use crate::{
	error::Error,
	property::{PropertyId, PropertyKind},
	record::{Field, FieldSpec, ResultRecord},
	sys,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of a guest directory listing.
pub const FILE_LISTING: FieldSpec = FieldSpec::from_static(&[
	Field::new(PropertyId::JOB_RESULT_ITEM_NAME, PropertyKind::String),
	Field::new(PropertyId::JOB_RESULT_FILE_SIZE, PropertyKind::Int64),
	Field::new(PropertyId::JOB_RESULT_FILE_FLAGS, PropertyKind::Int),
	Field::new(PropertyId::JOB_RESULT_FILE_MOD_TIME, PropertyKind::Int64),
]);

/// Attributes of a single guest file, the name isn't part of the result.
pub const FILE_INFO: FieldSpec = FieldSpec::from_static(&[
	Field::new(PropertyId::JOB_RESULT_FILE_SIZE, PropertyKind::Int64),
	Field::new(PropertyId::JOB_RESULT_FILE_FLAGS, PropertyKind::Int),
	Field::new(PropertyId::JOB_RESULT_FILE_MOD_TIME, PropertyKind::Int64),
]);

pub const PROCESS_LISTING: FieldSpec = FieldSpec::from_static(&[
	Field::new(PropertyId::JOB_RESULT_ITEM_NAME, PropertyKind::String),
	Field::new(PropertyId::JOB_RESULT_PROCESS_ID, PropertyKind::Int64),
	Field::new(PropertyId::JOB_RESULT_PROCESS_OWNER, PropertyKind::String),
	Field::new(PropertyId::JOB_RESULT_PROCESS_COMMAND, PropertyKind::String),
	Field::new(PropertyId::JOB_RESULT_PROCESS_BEING_DEBUGGED, PropertyKind::Bool),
	Field::new(PropertyId::JOB_RESULT_PROCESS_START_TIME, PropertyKind::Int),
]);

pub const SHARED_FOLDER_STATE: FieldSpec = FieldSpec::from_static(&[
	Field::new(PropertyId::JOB_RESULT_ITEM_NAME, PropertyKind::String),
	Field::new(PropertyId::JOB_RESULT_SHARED_FOLDER_HOST, PropertyKind::String),
	Field::new(PropertyId::JOB_RESULT_SHARED_FOLDER_FLAGS, PropertyKind::Int),
]);

/// Result of running a program in the guest.
pub const PROGRAM_OUTPUT: FieldSpec = FieldSpec::from_static(&[
	Field::new(PropertyId::JOB_RESULT_PROCESS_ID, PropertyKind::Int64),
	Field::new(
		PropertyId::JOB_RESULT_GUEST_PROGRAM_ELAPSED_TIME,
		PropertyKind::Int,
	),
	Field::new(
		PropertyId::JOB_RESULT_GUEST_PROGRAM_EXIT_CODE,
		PropertyKind::Int,
	),
]);

/// The blob carries its own length, the image size property isn't requested.
pub const SCREENSHOT: FieldSpec = FieldSpec::from_static(&[Field::new(
	PropertyId::JOB_RESULT_SCREEN_IMAGE_DATA,
	PropertyKind::Blob,
)]);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestFile {
	/// Empty when decoded with [`FILE_INFO`].
	pub name: String,
	pub size: i64,
	pub flags: i32,
	/// Seconds since the unix epoch.
	pub modified: i64,
}

impl GuestFile {
	#[must_use]
	pub const fn is_dir(&self) -> bool {
		self.flags & sys::VIX_FILE_ATTRIBUTES_DIRECTORY != 0
	}

	#[must_use]
	pub const fn is_symlink(&self) -> bool {
		self.flags & sys::VIX_FILE_ATTRIBUTES_SYMLINK != 0
	}

	#[must_use]
	pub fn modified_at(&self) -> Option<DateTime<Utc>> {
		DateTime::from_timestamp(self.modified, 0)
	}
}

impl TryFrom<ResultRecord> for GuestFile {
	type Error = Error;

	fn try_from(mut record: ResultRecord) -> Result<Self, Self::Error> {
		let name = if record.get(PropertyId::JOB_RESULT_ITEM_NAME).is_some() {
			record
				.take_string(PropertyId::JOB_RESULT_ITEM_NAME)?
				.into_string()
		} else {
			String::new()
		};

		Ok(Self {
			name,
			size: record.int64(PropertyId::JOB_RESULT_FILE_SIZE)?,
			flags: record.int(PropertyId::JOB_RESULT_FILE_FLAGS)?,
			modified: record.int64(PropertyId::JOB_RESULT_FILE_MOD_TIME)?,
		})
	}
}

/// Process ids are reported as signed 64 bit integers but are never negative.
fn process_id(record: &ResultRecord) -> Result<u64, Error> {
	let pid = record.int64(PropertyId::JOB_RESULT_PROCESS_ID)?;

	u64::try_from(pid)
		.map_err(|_| Error::invalid_request(record.handle(), format!("negative process id {pid}")))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestProcess {
	pub name: String,
	pub pid: u64,
	pub owner: String,
	pub command: String,
	pub being_debugged: bool,
	pub start_time: i32,
}

impl TryFrom<ResultRecord> for GuestProcess {
	type Error = Error;

	fn try_from(record: ResultRecord) -> Result<Self, Self::Error> {
		Ok(Self {
			name: record.string(PropertyId::JOB_RESULT_ITEM_NAME)?,
			pid: process_id(&record)?,
			owner: record.string(PropertyId::JOB_RESULT_PROCESS_OWNER)?,
			command: record.string(PropertyId::JOB_RESULT_PROCESS_COMMAND)?,
			being_debugged: record.bool(PropertyId::JOB_RESULT_PROCESS_BEING_DEBUGGED)?,
			start_time: record.int(PropertyId::JOB_RESULT_PROCESS_START_TIME)?,
		})
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedFolder {
	pub name: String,
	pub host_path: String,
	pub flags: i32,
}

impl TryFrom<ResultRecord> for SharedFolder {
	type Error = Error;

	fn try_from(record: ResultRecord) -> Result<Self, Self::Error> {
		Ok(Self {
			name: record.string(PropertyId::JOB_RESULT_ITEM_NAME)?,
			host_path: record.string(PropertyId::JOB_RESULT_SHARED_FOLDER_HOST)?,
			flags: record.int(PropertyId::JOB_RESULT_SHARED_FOLDER_FLAGS)?,
		})
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramOutput {
	pub pid: u64,
	/// Seconds the program ran for.
	pub elapsed_time: i32,
	pub exit_code: i32,
}

impl TryFrom<ResultRecord> for ProgramOutput {
	type Error = Error;

	fn try_from(record: ResultRecord) -> Result<Self, Self::Error> {
		Ok(Self {
			pid: process_id(&record)?,
			elapsed_time: record.int(PropertyId::JOB_RESULT_GUEST_PROGRAM_ELAPSED_TIME)?,
			exit_code: record.int(PropertyId::JOB_RESULT_GUEST_PROGRAM_EXIT_CODE)?,
		})
	}
}

/// A PNG capture of the guest screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Screenshot {
	pub bytes: Vec<u8>,
}

impl TryFrom<ResultRecord> for Screenshot {
	type Error = Error;

	fn try_from(record: ResultRecord) -> Result<Self, Self::Error> {
		Ok(Self {
			bytes: record.bytes(PropertyId::JOB_RESULT_SCREEN_IMAGE_DATA)?,
		})
	}
}
