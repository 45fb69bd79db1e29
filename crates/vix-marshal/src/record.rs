use crate::{
	error::Error,
	property::{Catalogue, Handle, PropertyId, PropertyKind},
	value::{NativeString, Value},
};

use std::{borrow::Cow, collections::HashSet};

/// A requested property and the kind the caller expects it to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Field {
	pub id: PropertyId,
	pub kind: PropertyKind,
}

impl Field {
	#[must_use]
	pub const fn new(id: PropertyId, kind: PropertyKind) -> Self {
		Self { id, kind }
	}
}

/// Ordered list of the fields to decode from a handle.
///
/// Replaces the sentinel-terminated `(id, pointer)` lists of the C API: the list is validated
/// against the [`Catalogue`] before anything reaches the engine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldSpec {
	fields: Cow<'static, [Field]>,
}

impl FieldSpec {
	/// An empty spec, waiting on a job with it only checks for completion.
	#[must_use]
	pub const fn new() -> Self {
		Self::from_static(&[])
	}

	#[must_use]
	pub const fn from_static(fields: &'static [Field]) -> Self {
		Self {
			fields: Cow::Borrowed(fields),
		}
	}

	#[must_use]
	pub fn field(mut self, id: PropertyId, kind: PropertyKind) -> Self {
		self.fields.to_mut().push(Field::new(id, kind));
		self
	}

	/// Builds a spec from identifiers alone, taking each kind from the catalogue.
	pub fn declared(
		catalogue: &Catalogue,
		ids: impl IntoIterator<Item = PropertyId>,
	) -> Result<Self, Error> {
		ids.into_iter()
			.map(|id| {
				catalogue
					.kind(id)
					.map(|kind| Field::new(id, kind))
					.ok_or(Error::NotFound {
						handle: Handle::INVALID,
						id,
						code: None,
					})
			})
			.collect::<Result<Vec<_>, _>>()
			.map(|fields| Self {
				fields: Cow::Owned(fields),
			})
	}

	#[must_use]
	pub fn fields(&self) -> &[Field] {
		&self.fields
	}

	#[must_use]
	pub fn first(&self) -> Option<&Field> {
		self.fields.first()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Field> + '_ {
		self.fields.iter()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.fields.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}

	/// Checks every field belongs to the catalogue with the declared kind, and appears once.
	pub(crate) fn validate(&self, catalogue: &Catalogue, handle: Handle) -> Result<(), Error> {
		let mut seen = HashSet::with_capacity(self.fields.len());

		for field in self.iter() {
			match catalogue.kind(field.id) {
				None => {
					return Err(Error::NotFound {
						handle,
						id: field.id,
						code: None,
					})
				}
				Some(declared) if declared != field.kind => {
					return Err(Error::TypeMismatch {
						handle,
						id: field.id,
						expected: field.kind,
						actual: Some(declared),
					})
				}
				Some(_) => {}
			}

			if !seen.insert(field.id) {
				return Err(Error::invalid_request(
					handle,
					format!("property <id='{}'> requested more than once", field.id),
				));
			}
		}

		Ok(())
	}
}

impl FromIterator<Field> for FieldSpec {
	fn from_iter<T: IntoIterator<Item = Field>>(iter: T) -> Self {
		Self {
			fields: Cow::Owned(iter.into_iter().collect()),
		}
	}
}

impl FromIterator<(PropertyId, PropertyKind)> for FieldSpec {
	fn from_iter<T: IntoIterator<Item = (PropertyId, PropertyKind)>>(iter: T) -> Self {
		iter.into_iter()
			.map(|(id, kind)| Field::new(id, kind))
			.collect()
	}
}

/// The values decoded by one wait, read or indexed decode, in request order.
#[derive(Debug, PartialEq, Eq)]
pub struct ResultRecord {
	handle: Handle,
	entries: Vec<(PropertyId, Value)>,
}

impl ResultRecord {
	pub(crate) const fn new(handle: Handle) -> Self {
		Self {
			handle,
			entries: Vec::new(),
		}
	}

	pub(crate) fn with_entries(handle: Handle, entries: Vec<(PropertyId, Value)>) -> Self {
		Self { handle, entries }
	}

	/// The handle these values were decoded from.
	#[must_use]
	pub const fn handle(&self) -> Handle {
		self.handle
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	#[must_use]
	pub fn get(&self, id: PropertyId) -> Option<&Value> {
		self.entries
			.iter()
			.find_map(|(entry_id, value)| (*entry_id == id).then_some(value))
	}

	/// Moves a value out of the record, handing over ownership of its native buffer.
	pub fn take(&mut self, id: PropertyId) -> Option<Value> {
		self.entries
			.iter()
			.position(|(entry_id, _)| *entry_id == id)
			.map(|position| self.entries.remove(position).1)
	}

	pub fn ids(&self) -> impl Iterator<Item = PropertyId> + '_ {
		self.entries.iter().map(|(id, _)| *id)
	}

	pub fn iter(&self) -> impl Iterator<Item = (PropertyId, &Value)> + '_ {
		self.entries.iter().map(|(id, value)| (*id, value))
	}

	pub fn int(&self, id: PropertyId) -> Result<i32, Error> {
		self.typed(id, PropertyKind::Int, Value::as_int)
	}

	pub fn int64(&self, id: PropertyId) -> Result<i64, Error> {
		self.typed(id, PropertyKind::Int64, Value::as_int64)
	}

	pub fn bool(&self, id: PropertyId) -> Result<bool, Error> {
		self.typed(id, PropertyKind::Bool, Value::as_bool)
	}

	pub fn handle_value(&self, id: PropertyId) -> Result<Handle, Error> {
		self.typed(id, PropertyKind::Handle, Value::as_handle)
	}

	/// Copies a string value into host memory, the native buffer stays owned by the record.
	pub fn string(&self, id: PropertyId) -> Result<String, Error> {
		self.typed(id, PropertyKind::String, |value| {
			value
				.as_native_string()
				.map(|string| string.to_string_lossy().into_owned())
		})
	}

	pub fn bytes(&self, id: PropertyId) -> Result<Vec<u8>, Error> {
		self.typed(id, PropertyKind::Blob, |value| {
			value.as_native_blob().map(|blob| blob.as_bytes().to_vec())
		})
	}

	/// Moves a string value out of the record without copying it.
	pub fn take_string(&mut self, id: PropertyId) -> Result<NativeString, Error> {
		match self.take(id) {
			Some(Value::String(string)) => Ok(string),
			Some(other) => Err(self.mismatch(id, PropertyKind::String, &other)),
			None => Err(self.not_found(id)),
		}
	}

	fn typed<T>(
		&self,
		id: PropertyId,
		expected: PropertyKind,
		extract: impl FnOnce(&Value) -> Option<T>,
	) -> Result<T, Error> {
		let value = self.get(id).ok_or_else(|| self.not_found(id))?;

		extract(value).ok_or_else(|| self.mismatch(id, expected, value))
	}

	fn not_found(&self, id: PropertyId) -> Error {
		Error::NotFound {
			handle: self.handle,
			id,
			code: None,
		}
	}

	fn mismatch(&self, id: PropertyId, expected: PropertyKind, value: &Value) -> Error {
		Error::TypeMismatch {
			handle: self.handle,
			id,
			expected,
			actual: Some(value.kind()),
		}
	}
}

impl IntoIterator for ResultRecord {
	type Item = (PropertyId, Value);
	type IntoIter = std::vec::IntoIter<(PropertyId, Value)>;

	fn into_iter(self) -> Self::IntoIter {
		self.entries.into_iter()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::ErrorKind;

	#[test]
	fn validation_rejects_unknown_mismatched_and_repeated_fields() {
		let catalogue = Catalogue::new();
		let handle = Handle(1);

		let unknown = FieldSpec::new().field(PropertyId(424_242), PropertyKind::Int);
		assert_eq!(
			unknown.validate(&catalogue, handle).map_err(|e| e.kind()),
			Err(ErrorKind::NotFound)
		);

		let mismatched = FieldSpec::new().field(PropertyId::JOB_RESULT_FILE_SIZE, PropertyKind::Int);
		assert_eq!(
			mismatched.validate(&catalogue, handle).map_err(|e| e.kind()),
			Err(ErrorKind::TypeMismatch)
		);

		let repeated = FieldSpec::new()
			.field(PropertyId::JOB_RESULT_ITEM_NAME, PropertyKind::String)
			.field(PropertyId::JOB_RESULT_ITEM_NAME, PropertyKind::String);
		assert_eq!(
			repeated.validate(&catalogue, handle).map_err(|e| e.kind()),
			Err(ErrorKind::InvalidRequest)
		);

		assert!(FieldSpec::new().validate(&catalogue, handle).is_ok());
	}

	#[test]
	fn declared_specs_take_kinds_from_the_catalogue() {
		let catalogue = Catalogue::new();

		let spec = FieldSpec::declared(
			&catalogue,
			[
				PropertyId::JOB_RESULT_PROCESS_ID,
				PropertyId::JOB_RESULT_GUEST_PROGRAM_EXIT_CODE,
			],
		)
		.unwrap();

		assert_eq!(
			spec.fields(),
			&[
				Field::new(PropertyId::JOB_RESULT_PROCESS_ID, PropertyKind::Int64),
				Field::new(
					PropertyId::JOB_RESULT_GUEST_PROGRAM_EXIT_CODE,
					PropertyKind::Int
				),
			]
		);

		assert!(FieldSpec::declared(&catalogue, [PropertyId(77_777)]).is_err());
	}

	#[test]
	fn typed_accessors_check_presence_and_kind() {
		let record = ResultRecord::with_entries(
			Handle(9),
			vec![
				(PropertyId::JOB_RESULT_FILE_SIZE, Value::Int64(4096)),
				(PropertyId::JOB_RESULT_FILE_FLAGS, Value::Int(1)),
			],
		);

		assert_eq!(record.int64(PropertyId::JOB_RESULT_FILE_SIZE).unwrap(), 4096);
		assert_eq!(record.int(PropertyId::JOB_RESULT_FILE_FLAGS).unwrap(), 1);
		assert_eq!(
			record
				.int(PropertyId::JOB_RESULT_FILE_SIZE)
				.map_err(|e| e.kind()),
			Err(ErrorKind::TypeMismatch)
		);
		assert_eq!(
			record
				.string(PropertyId::JOB_RESULT_ITEM_NAME)
				.map_err(|e| e.kind()),
			Err(ErrorKind::NotFound)
		);
		assert_eq!(
			record.ids().collect::<Vec<_>>(),
			vec![
				PropertyId::JOB_RESULT_FILE_SIZE,
				PropertyId::JOB_RESULT_FILE_FLAGS
			]
		);
	}
}
